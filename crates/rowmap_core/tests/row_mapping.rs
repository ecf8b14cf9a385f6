mod common;

use common::{design, seeded_store, Design, DesignColor, PublishState};
use rowmap_core::mapping::{FieldValue, RowAccess};
use rowmap_core::{MappingError, MappingRegistry, MappingResult, NamedParams, SqlType, StoreError};
use rusqlite::types::Value;
use std::collections::HashMap;

/// In-memory row used to drive the mapper without a database.
struct MapRow(HashMap<&'static str, Value>);

impl RowAccess for MapRow {
    fn column_count(&self) -> usize {
        self.0.len()
    }

    fn value(&self, column: &str) -> MappingResult<Value> {
        self.0
            .get(column)
            .cloned()
            .ok_or_else(|| MappingError::InvalidValue {
                field: column.to_string(),
                message: "no such column".to_string(),
            })
    }
}

fn design_row() -> MapRow {
    MapRow(HashMap::from([
        ("id", Value::Integer(7)),
        ("main_color", Value::Text("teal".to_string())),
        ("rank", Value::Integer(3)),
        ("state", Value::Text("PUBLISHED".to_string())),
        ("score", Value::Real(4.5)),
    ]))
}

#[test]
fn maps_row_by_column_name() {
    let registry = MappingRegistry::new();
    let descriptor = registry.describe::<Design>().unwrap();

    let mapped = descriptor.mapper().map_row(&design_row()).unwrap();

    assert_eq!(
        mapped,
        Design {
            id: 7,
            main_color: "teal".to_string(),
            rank: 3,
            state: PublishState::Published,
            score: Some(4.5),
        }
    );
}

#[test]
fn extra_column_is_a_schema_mismatch() {
    let registry = MappingRegistry::new();
    let descriptor = registry.describe::<Design>().unwrap();
    let mut row = design_row();
    row.0.insert("legacy_flag", Value::Integer(1));

    let err = descriptor.mapper().map_row(&row).unwrap_err();

    assert!(matches!(
        err,
        MappingError::SchemaMismatch {
            field_count: 5,
            column_count: 6,
            ..
        }
    ));
}

#[test]
fn missing_column_is_a_schema_mismatch() {
    let registry = MappingRegistry::new();
    let descriptor = registry.describe::<Design>().unwrap();
    let mut row = design_row();
    row.0.remove("score");

    let err = descriptor.mapper().map_row(&row).unwrap_err();

    assert!(matches!(
        err,
        MappingError::SchemaMismatch {
            field_count: 5,
            column_count: 4,
            ..
        }
    ));
}

#[test]
fn reordered_select_still_maps_by_name() {
    let store = seeded_store([(1, 10), (2, 20)]);

    let loaded: Vec<Design> = store
        .find_by_sql(
            "SELECT score, state, rank, main_color, id FROM designs ORDER BY id",
            &NamedParams::new(),
        )
        .unwrap();

    assert_eq!(loaded, vec![design(1, 10), design(2, 20)]);
}

#[test]
fn drifted_select_fails_instead_of_mapping_partially() {
    let store = seeded_store([(1, 10)]);

    let err = store
        .find_by_sql::<Design>("SELECT * , rank AS rank_copy FROM designs", &NamedParams::new())
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::Mapping(MappingError::SchemaMismatch { .. })
    ));
}

#[test]
fn projection_maps_its_subset_from_the_entity_table() {
    let store = seeded_store([(1, 10), (2, 20)]);

    let colors: Vec<DesignColor> = store.find_all().unwrap();

    assert_eq!(
        colors,
        vec![
            DesignColor {
                id: 1,
                main_color: "blue".to_string()
            },
            DesignColor {
                id: 2,
                main_color: "red".to_string()
            },
        ]
    );
}

#[test]
fn parameter_source_is_keyed_by_field_name() {
    let registry = MappingRegistry::new();
    let descriptor = registry.describe::<Design>().unwrap();
    let mut record = design(4, 40);
    record.state = PublishState::Archived;

    let params = descriptor.mapper().parameter_source(&record);

    assert_eq!(
        params.names().collect::<Vec<_>>(),
        vec!["id", "mainColor", "rank", "state", "score"]
    );
    assert_eq!(params.value("rank"), Some(&FieldValue::I64(40)));
    assert_eq!(
        params.value("state"),
        Some(&FieldValue::Text("ARCHIVED".to_string()))
    );
    assert_eq!(params.value("score"), Some(&FieldValue::Null));
    assert_eq!(params.sql_type("state"), SqlType::Varchar);
    assert_eq!(params.sql_type("rank"), SqlType::BigInt);
    assert_eq!(params.type_name("rank"), Some("i64"));
    assert!(params.has_value("mainColor"));
    assert!(!params.has_value("main_color"));
}
