#![allow(dead_code)]

use rowmap_core::{
    EnumTable, FieldDef, FieldValues, MappingResult, NamedParams, Record, RecordSchema,
    SqlEnum, SqliteEntityStore,
};
use std::sync::Arc;

pub const DESIGNS_DDL: &str = "CREATE TABLE designs (
    id INTEGER PRIMARY KEY,
    main_color TEXT NOT NULL,
    rank INTEGER NOT NULL,
    state TEXT,
    score REAL
)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub enum PublishState {
    Draft,
    Published,
    Archived,
}

impl SqlEnum for PublishState {
    const TABLE: &'static EnumTable =
        &EnumTable::new("PublishState", &["DRAFT", "PUBLISHED", "ARCHIVED"]);

    fn ordinal(self) -> usize {
        self as usize
    }

    fn from_ordinal(ordinal: usize) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Draft),
            1 => Some(Self::Published),
            2 => Some(Self::Archived),
            _ => None,
        }
    }
}

rowmap_core::enum_field!(PublishState);

#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    pub id: i64,
    pub main_color: String,
    pub rank: i64,
    pub state: PublishState,
    pub score: Option<f64>,
}

impl Record for Design {
    const ARITY: usize = 5;

    fn schema() -> RecordSchema<Self> {
        RecordSchema::entity("designs")
            .field(FieldDef::id("id", |d: &Design| &d.id))
            .field(FieldDef::new("mainColor", |d: &Design| &d.main_color))
            .field(FieldDef::new("rank", |d: &Design| &d.rank))
            .field(FieldDef::new("state", |d: &Design| &d.state))
            .field(FieldDef::new("score", |d: &Design| &d.score))
    }

    fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
        Ok(Self {
            id: values.next()?,
            main_color: values.next()?,
            rank: values.next()?,
            state: values.next()?,
            score: values.next()?,
        })
    }
}

/// Projection of `Design` carrying only its identity and color.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignColor {
    pub id: i64,
    pub main_color: String,
}

impl Record for DesignColor {
    const ARITY: usize = 2;

    fn schema() -> RecordSchema<Self> {
        RecordSchema::projection_of::<Design>()
            .field(FieldDef::new("id", |d: &DesignColor| &d.id))
            .field(FieldDef::new("mainColor", |d: &DesignColor| &d.main_color))
    }

    fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
        Ok(Self {
            id: values.next()?,
            main_color: values.next()?,
        })
    }
}

pub fn design(id: i64, rank: i64) -> Design {
    Design {
        id,
        main_color: if id % 2 == 0 { "red" } else { "blue" }.to_string(),
        rank,
        state: PublishState::Draft,
        score: None,
    }
}

pub fn empty_store() -> Arc<SqliteEntityStore> {
    let conn = rowmap_core::db::open_db_in_memory().expect("in-memory db should open");
    let store = SqliteEntityStore::new(conn);
    store
        .execute(DESIGNS_DDL, &NamedParams::new())
        .expect("designs table should be created");
    Arc::new(store)
}

/// Store seeded with one design per `(id, rank)` pair.
pub fn seeded_store(rows: impl IntoIterator<Item = (i64, i64)>) -> Arc<SqliteEntityStore> {
    let store = empty_store();
    let designs: Vec<Design> = rows.into_iter().map(|(id, rank)| design(id, rank)).collect();
    store.insert_all(&designs).expect("designs should be seeded");
    store
}
