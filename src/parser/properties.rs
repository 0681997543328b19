use std::sync::LazyLock;

use indexmap::map::Entry;
use indexmap::IndexMap;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());
static LI_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static SMWPROP_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"li[id^="smwprop_"]"#).unwrap());

const PROPERTY_HREF: &str = "/wiki/Property:";
const SMWPROP_PREFIX: &str = "smwprop_";
const MORE_VALUES_MARKER: &str = "+";

/// One property value: a single string, or every value in document order
/// when the key was seen more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Scalar(String),
    List(Vec<String>),
}

impl PropertyValue {
    /// Collapse to a single string: the scalar itself, or the first list element.
    pub fn first(&self) -> Option<&str> {
        match self {
            PropertyValue::Scalar(s) => Some(s.as_str()),
            PropertyValue::List(items) => items.first().map(String::as_str),
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            PropertyValue::Scalar(s) => std::slice::from_ref(s),
            PropertyValue::List(items) => items,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            PropertyValue::Scalar(first) => {
                let first = std::mem::take(first);
                *self = PropertyValue::List(vec![first, value]);
            }
            PropertyValue::List(items) => items.push(value),
        }
    }
}

/// Raw key → value(s) bag recovered from a facts block, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PropertyBag(IndexMap<String, PropertyValue>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scalar on first sight, promoted to a list on every repeat.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.0.entry(key.into()) {
            Entry::Occupied(mut e) => e.get_mut().push(value),
            Entry::Vacant(e) => {
                e.insert(PropertyValue::Scalar(value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = PropertyBag::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

/// Where the property items came from; the attribute fallback loosens key detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemSource {
    FactsHeading,
    SmwpropIds,
}

/// Recover the facts block of `doc` as a property bag. Never fails: any
/// structural miss yields an empty bag.
pub fn extract(doc: &Html, subject: &str) -> PropertyBag {
    let (items, source) = match find_facts_heading(doc, subject) {
        Some(heading) => {
            let items = find_container(heading)
                .map(container_items)
                .unwrap_or_default();
            (items, ItemSource::FactsHeading)
        }
        None => (
            doc.select(&SMWPROP_SEL).collect(),
            ItemSource::SmwpropIds,
        ),
    };

    let mut bag = PropertyBag::new();
    for item in items {
        let Some(key_el) = find_key_element(item, source) else {
            continue;
        };
        let key = visible_text(key_el);
        if key.is_empty() {
            continue;
        }
        bag.insert(key, value_after(item, key_el));
    }
    bag
}

fn find_facts_heading<'a>(doc: &'a Html, subject: &str) -> Option<ElementRef<'a>> {
    let needle = format!("Facts about {}", subject.trim());
    doc.select(&HEADING_SEL)
        .find(|h| collapse_whitespace(&h.text().collect::<String>()).contains(&needle))
}

/// First `ul` after the heading, or after the heading's wrapper.
fn find_container(heading: ElementRef<'_>) -> Option<ElementRef<'_>> {
    next_sibling_list(heading).or_else(|| {
        heading
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(next_sibling_list)
    })
}

fn next_sibling_list(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "ul")
}

/// Direct `li` children, else every nested `li`.
fn container_items(container: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let direct: Vec<_> = container
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "li")
        .collect();
    if !direct.is_empty() {
        return direct;
    }
    container.select(&LI_SEL).collect()
}

fn find_key_element(item: ElementRef<'_>, source: ItemSource) -> Option<ElementRef<'_>> {
    let property_link = item.select(&LINK_SEL).find(|a| {
        a.value()
            .attr("href")
            .is_some_and(|href| href.contains(PROPERTY_HREF))
    });
    if property_link.is_some() {
        return property_link;
    }

    let has_smwprop_id = item
        .value()
        .id()
        .is_some_and(|id| id.starts_with(SMWPROP_PREFIX));
    if source == ItemSource::SmwpropIds && has_smwprop_id {
        return item.select(&LINK_SEL).next();
    }
    None
}

/// Text and link content following the key element, stopping at a trailing
/// `+` nofollow link.
fn value_after(item: ElementRef<'_>, key_el: ElementRef<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut after_key = false;

    for child in item.children() {
        if child.id() == key_el.id() {
            after_key = true;
            continue;
        }
        if !after_key {
            continue;
        }
        match child.value() {
            Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            Node::Element(el) if el.name() == "a" => {
                let Some(link) = ElementRef::wrap(child) else {
                    continue;
                };
                let text = visible_text(link);
                if is_nofollow(link) && text == MORE_VALUES_MARKER {
                    break;
                }
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            _ => {}
        }
    }

    parts.join(" ").replace(" , ", ", ").trim().to_string()
}

fn is_nofollow(link: ElementRef<'_>) -> bool {
    link.value()
        .attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")))
}

fn visible_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(html: &str, subject: &str) -> PropertyBag {
        extract(&Html::parse_document(html), subject)
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn scalar(s: &str) -> PropertyValue {
        PropertyValue::Scalar(s.to_string())
    }

    #[test]
    fn heading_with_sibling_list() {
        let html = r#"
            <h2>Facts about Malus domestica</h2>
            <ul>
              <li><a href="/wiki/Property:Has_common_name">Has common name</a> <a href="/wiki/Apple">Apple</a></li>
              <li><a href="/wiki/Property:Has_sun_preference">Has sun preference</a> Full sun</li>
            </ul>"#;
        let b = bag(html, "Malus domestica");
        assert_eq!(b.len(), 2);
        assert_eq!(b.get("Has common name"), Some(&scalar("Apple")));
        assert_eq!(b.get("Has sun preference"), Some(&scalar("Full sun")));
    }

    #[test]
    fn repeated_key_becomes_list_in_order() {
        let html = r#"
            <h3>Facts about Allium sativum</h3>
            <ul>
              <li><a href="/wiki/Property:Has_edible_part">Has edible part</a> <a href="/wiki/Leaves">Leaves</a></li>
              <li><a href="/wiki/Property:Has_edible_part">Has edible part</a> <a href="/wiki/Root">Root</a></li>
            </ul>"#;
        let b = bag(html, "Allium sativum");
        assert_eq!(
            b.get("Has edible part"),
            Some(&PropertyValue::List(vec!["Leaves".into(), "Root".into()]))
        );
    }

    #[test]
    fn third_repeat_appends() {
        let mut b = PropertyBag::new();
        b.insert("Functions as", "Ground cover");
        b.insert("Functions as", "Nitrogen fixer");
        b.insert("Functions as", "Bee attractor");
        assert_eq!(b.get("Functions as").unwrap().values().len(), 3);
        assert_eq!(b.get("Functions as").unwrap().first(), Some("Ground cover"));
    }

    #[test]
    fn stops_at_more_values_link() {
        let html = r#"
            <h2>Facts about Trifolium repens</h2>
            <ul>
              <li><a href="/wiki/Property:Has_hardiness_zone">Has hardiness zone</a> 4
                <a href="/wiki/Special:SearchByProperty" rel="nofollow">+</a> ignored tail</li>
            </ul>"#;
        let b = bag(html, "Trifolium repens");
        assert_eq!(b.get("Has hardiness zone"), Some(&scalar("4")));
    }

    #[test]
    fn plus_link_without_nofollow_is_kept() {
        let html = r#"
            <h2>Facts about X</h2>
            <ul><li><a href="/wiki/Property:Has_type">Has type</a> <a href="/wiki/Plus">+</a></li></ul>"#;
        assert_eq!(bag(html, "X").get("Has type"), Some(&scalar("+")));
    }

    #[test]
    fn comma_artifact_normalized() {
        let html = r#"
            <h2>Facts about X</h2>
            <ul><li><a href="/wiki/Property:Has_soil_texture">Has soil texture</a>
                <a href="/wiki/Sandy">sandy</a> , <a href="/wiki/Loamy">loamy</a></li></ul>"#;
        assert_eq!(bag(html, "X").get("Has soil texture"), Some(&scalar("sandy, loamy")));
    }

    #[test]
    fn heading_wrapped_in_block() {
        let html = r#"
            <div class="wrap"><h2><span class="mw-headline">Facts about Lavandula angustifolia</span></h2></div>
            <ul><li><a href="/wiki/Property:Has_habit">Has habit</a> Shrub</li></ul>"#;
        let b = bag(html, "Lavandula angustifolia");
        assert_eq!(b.get("Has habit"), Some(&scalar("Shrub")));
    }

    #[test]
    fn nested_list_items() {
        let html = r#"
            <h2>Facts about X</h2>
            <ul><div><li><a href="/wiki/Property:Has_type">Has type</a> Tree</li></div></ul>"#;
        assert_eq!(bag(html, "X").get("Has type"), Some(&scalar("Tree")));
    }

    #[test]
    fn items_without_property_link_skipped() {
        let html = r#"
            <h2>Facts about X</h2>
            <ul>
              <li><a href="/wiki/Tree">Tree</a> not a property</li>
              <li>plain text only</li>
              <li><a href="/wiki/Property:Has_type">Has type</a> Tree</li>
            </ul>"#;
        let b = bag(html, "X");
        assert_eq!(b.len(), 1);
        assert!(b.contains_key("Has type"));
    }

    #[test]
    fn smwprop_fallback_without_heading() {
        let html = r#"
            <div>
              <li id="smwprop_Has_common_name"><a href="/wiki/Has_common_name">Has common name</a> White clover</li>
              <li id="other"><a href="/wiki/Nope">Nope</a> skipped</li>
            </div>"#;
        let b = bag(html, "Trifolium repens");
        assert_eq!(b.len(), 1);
        assert_eq!(b.get("Has common name"), Some(&scalar("White clover")));
    }

    #[test]
    fn no_facts_block_yields_empty_bag() {
        let b = bag("<html><body><h1>Something else</h1><ul><li>x</li></ul></body></html>", "X");
        assert!(b.is_empty());
        assert!(bag("", "X").is_empty());
    }

    #[test]
    fn heading_without_list_yields_empty_bag() {
        let b = bag("<h2>Facts about X</h2><p>nothing here</p>", "X");
        assert!(b.is_empty());
    }

    #[test]
    fn fixture_malus_domestica() {
        let b = bag(&fixture("malus_domestica"), "Malus domestica");
        assert_eq!(b.get("Has common name"), Some(&scalar("Apple")));
        assert_eq!(b.get("Has mature height"), Some(&scalar("5")));
        assert_eq!(
            b.get("Functions as"),
            Some(&PropertyValue::List(vec![
                "Bee attractor".into(),
                "Wildlife food".into()
            ]))
        );
        assert_eq!(b.get("Has hardiness zone"), Some(&scalar("3")));
        assert_eq!(b.get("Has soil ph preference"), Some(&scalar("Acid and Neutral")));
    }

    #[test]
    fn fixture_no_facts() {
        assert!(bag(&fixture("no_facts"), "Allium sativum").is_empty());
    }
}
