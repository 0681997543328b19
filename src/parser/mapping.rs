use std::collections::BTreeSet;

use crate::db::{PlantRecord, UNRESOLVED_NAME};
use crate::parser::properties::{PropertyBag, PropertyValue};
use crate::utils::{capitalize, page_name, split_list};

const BOTANICAL_NAME_KEYS: &[&str] = &["Has taxonomy name", "Taxonomy name", "Binomial name"];
const PLANT_TYPE_KEYS: &[&str] = &["Is deciduous or evergreen", "Has type"];
const SOIL_TEXTURES: &[&str] = &["sandy", "loamy", "clay", "heavy clay"];
const DEFAULT_SIZE_UNIT: &str = "m";

const AFFIRMATIVE: &str = "Yes";
const NITROGEN_FIXER: &str = "Nitrogen fixer";
const POLLINATOR_TERMS: &[&str] = &["Bee attractor", "Pollinator attractor"];

const NOTE_FIELDS: &[(&str, &str)] = &[
    ("Native climate", "Native climate zones"),
    ("Adapted climate", "Adapted climate zones"),
    ("Lifecycle", "Has lifecycle type"),
    ("Family", "Belongs to family"),
    ("Genus", "Belongs to genus"),
];

/// Map a raw property bag onto the fixed plant record. Total and deterministic:
/// unresolved fields come back as `None`/`false`, an unresolved name as
/// [`UNRESOLVED_NAME`].
pub fn map(bag: &PropertyBag, source: &str) -> PlantRecord {
    let (nitrogen_fixing, pollinator_attractant, other_ecological_functions) = ecology(bag);

    PlantRecord {
        botanical_name: botanical_name(bag, source),
        common_name: scalar(bag, "Has common name"),
        plant_type: PLANT_TYPE_KEYS.iter().find_map(|k| scalar(bag, k)),
        growth_habit: growth_habit(bag),
        sun_exposure: scalar(bag, "Has sun preference"),
        water_needs: scalar(bag, "Has water requirements"),
        soil_preferences: soil_preferences(bag),
        hardiness_zones: scalar(bag, "Has hardiness zone"),
        edible_parts: uses(bag, "edible"),
        medicinal_uses: uses(bag, "medicinal"),
        nitrogen_fixing,
        pollinator_attractant,
        other_ecological_functions,
        notes: notes(bag),
    }
}

/// The one place a list is collapsed to a single string: its first element.
/// Empty values count as absent.
fn scalar(bag: &PropertyBag, key: &str) -> Option<String> {
    bag.get(key)
        .and_then(PropertyValue::first)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Every non-empty value stored under `key`.
fn all_values<'a>(bag: &'a PropertyBag, key: &str) -> impl Iterator<Item = &'a str> {
    bag.get(key)
        .map(PropertyValue::values)
        .unwrap_or_default()
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn join_sorted<'a>(items: impl IntoIterator<Item = &'a str>, sep: &str) -> Option<String> {
    let set: BTreeSet<&str> = items.into_iter().collect();
    if set.is_empty() {
        None
    } else {
        Some(set.into_iter().collect::<Vec<_>>().join(sep))
    }
}

fn botanical_name(bag: &PropertyBag, source: &str) -> String {
    page_name(source)
        .or_else(|| BOTANICAL_NAME_KEYS.iter().find_map(|k| scalar(bag, k)))
        .unwrap_or_else(|| UNRESOLVED_NAME.to_string())
}

fn growth_habit(bag: &PropertyBag) -> Option<String> {
    let mut parts = Vec::new();

    let habit: Vec<&str> = all_values(bag, "Has habit").collect();
    if !habit.is_empty() {
        parts.push(habit.join(", "));
    }

    let height = scalar(bag, "Has mature height");
    let width = scalar(bag, "Has mature width");
    let unit = scalar(bag, "Uses mature size measurement unit")
        .unwrap_or_else(|| DEFAULT_SIZE_UNIT.to_string());
    match (height, width) {
        (Some(h), Some(w)) => parts.push(format!("Size: {} x {} {}", h, w, unit)),
        (Some(h), None) => parts.push(format!("Height: {} {}", h, unit)),
        _ => {}
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn soil_preferences(bag: &PropertyBag) -> Option<String> {
    let mut segments = Vec::new();

    if let Some(ph) = scalar(bag, "Has soil ph preference") {
        segments.push(format!("pH: {}", ph.replace(" and ", ", ")));
    }

    let mut textures: BTreeSet<String> = SOIL_TEXTURES
        .iter()
        .filter(|t| bag.contains_key(&format!("Has soil te{}ture preference", t)))
        .map(|t| capitalize(t))
        .collect();
    if textures.is_empty() {
        if let Some(general) = scalar(bag, "Has soil texture") {
            textures.extend(split_list(&general).map(str::to_string));
        }
    }
    if !textures.is_empty() {
        let joined: Vec<String> = textures.into_iter().collect();
        segments.push(format!("Texture: {}", joined.join(", ")));
    }

    if let Some(retention) = scalar(bag, "Has soil water retention preference") {
        segments.push(format!("Water Retention: {}", retention));
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("; "))
    }
}

/// Parts and uses for one category (`edible`, `medicinal`), split, deduplicated and sorted.
fn uses(bag: &PropertyBag, category: &str) -> Option<String> {
    let part_key = format!("Has {} part", category);
    let use_key = format!("Has {} use", category);
    let items = all_values(bag, &part_key)
        .chain(all_values(bag, &use_key))
        .flat_map(split_list);
    join_sorted(items, "; ")
}

fn is_pollinator_term(value: &str) -> bool {
    POLLINATOR_TERMS.iter().any(|t| value.contains(t))
}

/// (nitrogen_fixing, pollinator_attractant, other_ecological_functions)
fn ecology(bag: &PropertyBag) -> (bool, bool, Option<String>) {
    let functions: Vec<&str> = all_values(bag, "Functions as").collect();

    let nitrogen_fixing = all_values(bag, "Is nitrogen fixer").any(|v| v == AFFIRMATIVE)
        || functions.iter().any(|f| *f == NITROGEN_FIXER);
    let pollinator_attractant = functions.iter().any(|f| is_pollinator_term(f));

    let others = functions.iter().copied().filter(|f| {
        let consumed_by_nitrogen = nitrogen_fixing && *f == NITROGEN_FIXER;
        let consumed_by_pollinator = pollinator_attractant && is_pollinator_term(f);
        !consumed_by_nitrogen && !consumed_by_pollinator
    });

    (
        nitrogen_fixing,
        pollinator_attractant,
        join_sorted(others, "; "),
    )
}

fn notes(bag: &PropertyBag) -> Option<String> {
    let segments: Vec<String> = NOTE_FIELDS
        .iter()
        .filter_map(|(label, key)| scalar(bag, key).map(|v| format!("{}: {}", label, v)))
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("; "))
    }
}
