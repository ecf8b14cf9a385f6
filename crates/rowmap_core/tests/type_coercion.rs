mod common;

use chrono::{NaiveDate, NaiveDateTime};
use common::{empty_store, Design, PublishState};
use rowmap_core::mapping::{Clob, Decimal, FieldValue, RowAccess};
use rowmap_core::{
    FieldDef, FieldValues, MappingError, MappingResult, NamedParams, Record, RecordSchema,
    SqlType, SqliteEntityStore, StoreError,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    id: i64,
    flag: Option<bool>,
    tiny: Option<i8>,
    small: Option<i16>,
    count: Option<i32>,
    ratio: Option<f32>,
    amount: Option<f64>,
    price: Option<Decimal>,
    label: Option<String>,
    notes: Option<Clob>,
    payload: Option<Vec<u8>>,
    due_on: Option<NaiveDate>,
    seen_at: Option<NaiveDateTime>,
    token: Option<Uuid>,
}

impl Record for Sample {
    const ARITY: usize = 14;

    fn schema() -> RecordSchema<Self> {
        RecordSchema::entity("samples")
            .field(FieldDef::id("id", |s: &Sample| &s.id))
            .field(FieldDef::new("flag", |s: &Sample| &s.flag))
            .field(FieldDef::new("tiny", |s: &Sample| &s.tiny))
            .field(FieldDef::new("small", |s: &Sample| &s.small))
            .field(FieldDef::new("count", |s: &Sample| &s.count))
            .field(FieldDef::new("ratio", |s: &Sample| &s.ratio))
            .field(FieldDef::new("amount", |s: &Sample| &s.amount))
            .field(FieldDef::new("price", |s: &Sample| &s.price))
            .field(FieldDef::new("label", |s: &Sample| &s.label))
            .field(FieldDef::new("notes", |s: &Sample| &s.notes))
            .field(FieldDef::new("payload", |s: &Sample| &s.payload))
            .field(FieldDef::new("dueOn", |s: &Sample| &s.due_on))
            .field(FieldDef::new("seenAt", |s: &Sample| &s.seen_at))
            .field(FieldDef::new("token", |s: &Sample| &s.token))
    }

    fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
        Ok(Self {
            id: values.next()?,
            flag: values.next()?,
            tiny: values.next()?,
            small: values.next()?,
            count: values.next()?,
            ratio: values.next()?,
            amount: values.next()?,
            price: values.next()?,
            label: values.next()?,
            notes: values.next()?,
            payload: values.next()?,
            due_on: values.next()?,
            seen_at: values.next()?,
            token: values.next()?,
        })
    }
}

/// Same table, but `count` declared as a required primitive.
#[derive(Debug)]
struct StrictCount {
    id: i64,
    count: i32,
}

impl Record for StrictCount {
    const ARITY: usize = 2;

    fn schema() -> RecordSchema<Self> {
        RecordSchema::entity("samples")
            .field(FieldDef::id("id", |s: &StrictCount| &s.id))
            .field(FieldDef::new("count", |s: &StrictCount| &s.count))
    }

    fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
        Ok(Self {
            id: values.next()?,
            count: values.next()?,
        })
    }
}

fn samples_store() -> SqliteEntityStore {
    let conn = rowmap_core::db::open_db_in_memory().unwrap();
    let store = SqliteEntityStore::new(conn);
    store
        .execute(
            "CREATE TABLE samples (
                id INTEGER PRIMARY KEY, flag INTEGER, tiny INTEGER, small INTEGER,
                count INTEGER, ratio REAL, amount REAL, price TEXT, label TEXT,
                notes TEXT, payload BLOB, due_on TEXT, seen_at TEXT, token TEXT
            )",
            &NamedParams::new(),
        )
        .unwrap();
    store
        .execute("INSERT INTO samples (id) VALUES (1)", &NamedParams::new())
        .unwrap();
    store
}

fn insert_state(store: &SqliteEntityStore, id: i64, state: FieldValue) {
    let params = NamedParams::new()
        .with_value("id", FieldValue::I64(id), SqlType::BigInt)
        .with_value("state", state, SqlType::Varchar);
    store
        .execute(
            "INSERT INTO designs (id, main_color, rank, state) VALUES (:id, 'red', 1, :state)",
            &params,
        )
        .unwrap();
}

#[test]
fn stored_nulls_surface_as_absent_values_for_every_type() {
    let store = samples_store();

    let loaded: Vec<Sample> = store.find_all().unwrap();

    assert_eq!(
        loaded,
        vec![Sample {
            id: 1,
            flag: None,
            tiny: None,
            small: None,
            count: None,
            ratio: None,
            amount: None,
            price: None,
            label: None,
            notes: None,
            payload: None,
            due_on: None,
            seen_at: None,
            token: None,
        }]
    );
}

#[test]
fn zero_values_are_not_confused_with_null() {
    let store = samples_store();
    store
        .execute(
            "INSERT INTO samples (id, flag, count, amount, label) VALUES (2, 0, 0, 0.0, '')",
            &NamedParams::new(),
        )
        .unwrap();

    let loaded: Option<Sample> = store.find_by_id(2_i64).unwrap();
    let loaded = loaded.unwrap();
    assert_eq!(loaded.flag, Some(false));
    assert_eq!(loaded.count, Some(0));
    assert_eq!(loaded.amount, Some(0.0));
    assert_eq!(loaded.label.as_deref(), Some(""));
}

#[test]
fn null_in_required_primitive_is_a_required_value_error() {
    let store = samples_store();

    let err = store.find_all::<StrictCount>().unwrap_err();

    assert!(matches!(
        err,
        StoreError::Mapping(MappingError::RequiredValue {
            field: "count",
            ..
        })
    ));
}

#[test]
fn typed_values_round_trip_through_the_store() {
    let store = samples_store();
    let sample = Sample {
        id: 3,
        flag: Some(true),
        tiny: Some(-8),
        small: Some(300),
        count: Some(70_000),
        ratio: Some(0.5),
        amount: Some(12.25),
        price: Decimal::parse("1999.990"),
        label: Some("label".to_string()),
        notes: Some(Clob("long text".to_string())),
        payload: Some(vec![0, 1, 2]),
        due_on: NaiveDate::from_ymd_opt(2024, 2, 29),
        seen_at: NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(8, 30, 0)),
        token: Some(Uuid::new_v4()),
    };

    store.insert(&sample).unwrap();

    let loaded: Option<Sample> = store.find_by_id(3_i64).unwrap();
    assert_eq!(loaded, Some(sample));
}

#[test]
fn enum_written_by_name_reads_back_as_the_variant() {
    let store = empty_store();
    let mut design = common::design(1, 1);
    design.state = PublishState::Archived;
    store.insert(&design).unwrap();

    let loaded: Vec<Design> = store.find_all().unwrap();
    assert_eq!(loaded[0].state, PublishState::Archived);

    let by_name = store
        .execute(
            "UPDATE designs SET rank = 9 WHERE state = 'ARCHIVED'",
            &NamedParams::new(),
        )
        .unwrap();
    assert_eq!(by_name, 1);
}

#[test]
fn legacy_numeric_enum_values_resolve_by_ordinal() {
    let store = empty_store();
    insert_state(&store, 1, FieldValue::I64(1));
    insert_state(&store, 2, FieldValue::Text("DRAFT".to_string()));
    insert_state(&store, 3, FieldValue::F64(2.0));

    let states: Vec<PublishState> = store
        .find_all::<Design>()
        .unwrap()
        .into_iter()
        .map(|d| d.state)
        .collect();

    assert_eq!(
        states,
        vec![
            PublishState::Published,
            PublishState::Draft,
            PublishState::Archived
        ]
    );
}

#[test]
fn unknown_enum_name_is_an_invalid_value_error() {
    let store = empty_store();
    insert_state(&store, 1, FieldValue::Text("RETIRED".to_string()));

    let err = store.find_all::<Design>().unwrap_err();

    match err {
        StoreError::Mapping(MappingError::InvalidValue { field, message }) => {
            assert_eq!(field, "state");
            assert!(message.contains("RETIRED"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn null_enum_in_required_field_is_a_required_value_error() {
    let store = empty_store();
    insert_state(&store, 1, FieldValue::Null);

    let err = store.find_all::<Design>().unwrap_err();

    assert!(matches!(
        err,
        StoreError::Mapping(MappingError::RequiredValue { field: "state", .. })
    ));
}

#[test]
fn registered_extractor_overrides_builtin_coercion() {
    let store = samples_store();
    store
        .execute(
            "UPDATE samples SET label = 'quiet' WHERE id = 1",
            &NamedParams::new(),
        )
        .unwrap();
    store.shared_registry().types().register_extractor::<String, _>(|row, column| {
        let value = row.value(column)?;
        Ok(match value {
            rusqlite::types::Value::Text(text) => FieldValue::Text(text.to_uppercase()),
            _ => FieldValue::Null,
        })
    });

    let loaded: Vec<Sample> = store.find_all().unwrap();

    assert_eq!(loaded[0].label.as_deref(), Some("QUIET"));
}

#[test]
fn registered_sql_type_is_used_for_new_descriptors() {
    let store = empty_store();
    store
        .shared_registry()
        .types()
        .register_sql_type::<String>(SqlType::Clob);

    let descriptor = store.describe::<Design>().unwrap();

    let color = descriptor.field("mainColor").unwrap();
    assert_eq!(color.sql_type(), SqlType::Clob);
    assert_eq!(color.sql_type().code(), 2005);
    assert_eq!(descriptor.field("rank").unwrap().sql_type().code(), -5);
    assert_eq!(descriptor.field("state").unwrap().sql_type(), SqlType::Varchar);
}
