use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Botanical name given to records whose identity could not be resolved.
pub const UNRESOLVED_NAME: &str = "Unknown";
/// Botanical name sentinel left by failed name parsing in older data.
pub const ERROR_NAME: &str = "Error_Parsing_Botanical_Name";

pub fn connect(path: &Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

/// Explicit setup step. Runs never call this; they check [`ensure_plants_table`].
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS plants (
            id                         INTEGER PRIMARY KEY AUTOINCREMENT,
            botanical_name             TEXT NOT NULL UNIQUE,
            common_name                TEXT,
            plant_type                 TEXT,
            growth_habit               TEXT,
            sun_exposure               TEXT,
            water_needs                TEXT,
            soil_preferences           TEXT,
            hardiness_zones            TEXT,
            edible_parts               TEXT,
            medicinal_uses             TEXT,
            nitrogen_fixing            INTEGER NOT NULL DEFAULT 0,
            pollinator_attractant      INTEGER NOT NULL DEFAULT 0,
            other_ecological_functions TEXT,
            notes                      TEXT
        );
        ",
    )?;
    Ok(())
}

pub fn ensure_plants_table(conn: &Connection) -> Result<()> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'plants'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    if found.is_none() {
        let path = conn.path().unwrap_or(":memory:").to_string();
        return Err(StoreError::MissingTable(path).into());
    }
    Ok(())
}

// ── Records ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantRecord {
    pub botanical_name: String,
    pub common_name: Option<String>,
    pub plant_type: Option<String>,
    pub growth_habit: Option<String>,
    pub sun_exposure: Option<String>,
    pub water_needs: Option<String>,
    pub soil_preferences: Option<String>,
    pub hardiness_zones: Option<String>,
    pub edible_parts: Option<String>,
    pub medicinal_uses: Option<String>,
    #[serde(default)]
    pub nitrogen_fixing: bool,
    #[serde(default)]
    pub pollinator_attractant: bool,
    pub other_ecological_functions: Option<String>,
    pub notes: Option<String>,
}

impl PlantRecord {
    /// A record carrying only its name; every other field null/false.
    pub fn named(botanical_name: impl Into<String>) -> Self {
        PlantRecord {
            botanical_name: botanical_name.into(),
            common_name: None,
            plant_type: None,
            growth_habit: None,
            sun_exposure: None,
            water_needs: None,
            soil_preferences: None,
            hardiness_zones: None,
            edible_parts: None,
            medicinal_uses: None,
            nitrogen_fixing: false,
            pollinator_attractant: false,
            other_ecological_functions: None,
            notes: None,
        }
    }

    pub fn has_valid_name(&self) -> bool {
        let name = self.botanical_name.trim();
        !name.is_empty() && name != UNRESOLVED_NAME && name != ERROR_NAME
    }
}

// ── Persisting ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    AlreadyExists,
    Rejected(String),
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Inserted => write!(f, "inserted"),
            Outcome::AlreadyExists => write!(f, "already exists"),
            Outcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            Outcome::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Insert-or-ignore keyed by botanical name. Storage errors come back as
/// [`Outcome::Failed`] so the caller can move on to the next record.
pub fn persist(conn: &Connection, record: &PlantRecord) -> Outcome {
    if !record.has_valid_name() {
        return Outcome::Rejected("invalid botanical name".to_string());
    }

    match insert_plant(conn, record) {
        Ok(n) if n > 0 => Outcome::Inserted,
        // Ignored insert: only a uniqueness hit is expected here.
        Ok(_) => match plant_exists(conn, &record.botanical_name) {
            Ok(true) => Outcome::AlreadyExists,
            Ok(false) => Outcome::Failed(format!(
                "insert of {} was ignored but no existing row was found",
                record.botanical_name
            )),
            Err(e) => Outcome::Failed(format!("{:#}", e)),
        },
        Err(e) => Outcome::Failed(format!("{:#}", e)),
    }
}

pub fn insert_plant(conn: &Connection, r: &PlantRecord) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO plants
         (botanical_name, common_name, plant_type, growth_habit, sun_exposure, water_needs,
          soil_preferences, hardiness_zones, edible_parts, medicinal_uses, nitrogen_fixing,
          pollinator_attractant, other_ecological_functions, notes)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
    )?;
    let n = stmt.execute(params![
        r.botanical_name, r.common_name, r.plant_type, r.growth_habit, r.sun_exposure,
        r.water_needs, r.soil_preferences, r.hardiness_zones, r.edible_parts, r.medicinal_uses,
        r.nitrogen_fixing, r.pollinator_attractant, r.other_ecological_functions, r.notes,
    ])?;
    Ok(n)
}

pub fn plant_exists(conn: &Connection, botanical_name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM plants WHERE botanical_name = ?1",
            params![botanical_name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

// ── Queries ──

const RECORD_COLUMNS: &str = "botanical_name, common_name, plant_type, growth_habit,
    sun_exposure, water_needs, soil_preferences, hardiness_zones, edible_parts, medicinal_uses,
    nitrogen_fixing, pollinator_attractant, other_ecological_functions, notes";

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlantRecord> {
    Ok(PlantRecord {
        botanical_name: row.get(0)?,
        common_name: row.get(1)?,
        plant_type: row.get(2)?,
        growth_habit: row.get(3)?,
        sun_exposure: row.get(4)?,
        water_needs: row.get(5)?,
        soil_preferences: row.get(6)?,
        hardiness_zones: row.get(7)?,
        edible_parts: row.get(8)?,
        medicinal_uses: row.get(9)?,
        nitrogen_fixing: row.get(10)?,
        pollinator_attractant: row.get(11)?,
        other_ecological_functions: row.get(12)?,
        notes: row.get(13)?,
    })
}

pub fn fetch_plant(conn: &Connection, botanical_name: &str) -> Result<Option<PlantRecord>> {
    let sql = format!("SELECT {} FROM plants WHERE botanical_name = ?1", RECORD_COLUMNS);
    let record = conn
        .query_row(&sql, params![botanical_name], record_from_row)
        .optional()?;
    Ok(record)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlantFilter {
    pub nitrogen_fixing: bool,
    pub pollinator_attractant: bool,
}

pub fn fetch_plants(conn: &Connection, filter: PlantFilter, limit: usize) -> Result<Vec<PlantRecord>> {
    let mut conditions = Vec::new();
    if filter.nitrogen_fixing {
        conditions.push("nitrogen_fixing = 1");
    }
    if filter.pollinator_attractant {
        conditions.push("pollinator_attractant = 1");
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM plants{} ORDER BY botanical_name LIMIT {}",
        RECORD_COLUMNS, where_clause, limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub nitrogen_fixers: usize,
    pub pollinator_attractants: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM plants", [], |r| r.get(0))?;
    let nitrogen_fixers: usize = conn.query_row(
        "SELECT COUNT(*) FROM plants WHERE nitrogen_fixing = 1",
        [],
        |r| r.get(0),
    )?;
    let pollinator_attractants: usize = conn.query_row(
        "SELECT COUNT(*) FROM plants WHERE pollinator_attractant = 1",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        nitrogen_fixers,
        pollinator_attractants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn apple() -> PlantRecord {
        PlantRecord {
            common_name: Some("Apple".into()),
            pollinator_attractant: true,
            ..PlantRecord::named("Malus domestica")
        }
    }

    #[test]
    fn persist_twice_inserts_once() {
        let conn = memory_db();
        assert_eq!(persist(&conn, &apple()), Outcome::Inserted);
        assert_eq!(persist(&conn, &apple()), Outcome::AlreadyExists);
        assert_eq!(get_stats(&conn).unwrap().total, 1);
    }

    #[test]
    fn sentinel_names_rejected_before_storage() {
        let conn = memory_db();
        for name in [UNRESOLVED_NAME, ERROR_NAME, "", "   "] {
            let outcome = persist(&conn, &PlantRecord::named(name));
            assert_eq!(outcome, Outcome::Rejected("invalid botanical name".into()));
        }
        assert_eq!(get_stats(&conn).unwrap().total, 0);
    }

    #[test]
    fn ignored_insert_without_row_is_failure() {
        let conn = memory_db();
        // A second silent-ignore cause: a trigger that drops every insert.
        conn.execute_batch(
            "CREATE TRIGGER drop_all BEFORE INSERT ON plants BEGIN SELECT RAISE(IGNORE); END;",
        )
        .unwrap();
        assert!(matches!(persist(&conn, &apple()), Outcome::Failed(_)));
    }

    #[test]
    fn storage_error_is_failure_not_panic() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(persist(&conn, &apple()), Outcome::Failed(_)));
    }

    #[test]
    fn missing_table_is_detected() {
        let conn = Connection::open_in_memory().unwrap();
        let err = ensure_plants_table(&conn).unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
        init_schema(&conn).unwrap();
        assert!(ensure_plants_table(&conn).is_ok());
    }

    #[test]
    fn round_trip_through_storage() {
        let conn = memory_db();
        persist(&conn, &apple());
        let stored = fetch_plant(&conn, "Malus domestica").unwrap().unwrap();
        assert_eq!(stored, apple());
        assert!(fetch_plant(&conn, "NonExistentPlantus").unwrap().is_none());
    }

    #[test]
    fn filters_and_stats() {
        let conn = memory_db();
        persist(&conn, &apple());
        persist(
            &conn,
            &PlantRecord {
                nitrogen_fixing: true,
                ..PlantRecord::named("Trifolium repens")
            },
        );

        let fixers = fetch_plants(
            &conn,
            PlantFilter {
                nitrogen_fixing: true,
                ..Default::default()
            },
            10,
        )
        .unwrap();
        assert_eq!(fixers.len(), 1);
        assert_eq!(fixers[0].botanical_name, "Trifolium repens");

        let s = get_stats(&conn).unwrap();
        assert_eq!((s.total, s.nitrogen_fixers, s.pollinator_attractants), (2, 1, 1));
    }
}
