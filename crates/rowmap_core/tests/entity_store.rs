mod common;

use common::{design, empty_store, seeded_store, Design, PublishState, DESIGNS_DDL};
use rowmap_core::mapping::FieldValue;
use rowmap_core::{
    FieldDef, FieldValues, MappingError, MappingResult, NamedParams, Record, RecordSchema,
    SqlType, SqliteEntityStore, StoreConfig, StoreError,
};
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq)]
struct Note {
    id: i32,
    body: String,
}

impl Record for Note {
    const ARITY: usize = 2;

    fn schema() -> RecordSchema<Self> {
        RecordSchema::entity("notes")
            .field(FieldDef::id("id", |n: &Note| &n.id))
            .field(FieldDef::new("body", |n: &Note| &n.body))
    }

    fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
        Ok(Self {
            id: values.next()?,
            body: values.next()?,
        })
    }
}

fn color_params(color: &str) -> NamedParams {
    NamedParams::new().with_value("color", FieldValue::Text(color.to_string()), SqlType::Varchar)
}

#[test]
fn insert_and_find_by_id_roundtrip() {
    let store = empty_store();
    let mut record = design(1, 10);
    record.state = PublishState::Published;
    record.score = Some(9.5);

    assert_eq!(store.insert(&record).unwrap(), 1);

    let loaded: Option<Design> = store.find_by_id(1_i64).unwrap();
    assert_eq!(loaded, Some(record));
    assert_eq!(store.find_by_id::<Design>(2_i64).unwrap(), None);
}

#[test]
fn insert_generated_echoes_the_database_key() {
    let store = SqliteEntityStore::open(&StoreConfig::in_memory()).unwrap();
    store
        .execute(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT NOT NULL)",
            &NamedParams::new(),
        )
        .unwrap();

    let first = store
        .insert_generated(&Note {
            id: 0,
            body: "first".to_string(),
        })
        .unwrap();
    let second = store
        .insert_generated(&Note {
            id: 0,
            body: "second".to_string(),
        })
        .unwrap();

    assert_eq!(first.id, 1);
    assert_eq!(second.id, 2);
    assert_eq!(second.body, "second");
    assert_eq!(store.find_by_id::<Note>(2).unwrap(), Some(second));
}

#[test]
fn update_and_update_all_change_only_targeted_rows() {
    let store = seeded_store([(1, 10), (2, 20), (3, 30)]);

    let mut first = design(1, 11);
    first.main_color = "green".to_string();
    assert_eq!(store.update(&first).unwrap(), 1);

    let mut second = design(2, 22);
    second.state = PublishState::Archived;
    let mut third = design(3, 33);
    third.score = Some(1.0);
    assert_eq!(store.update_all(&[second.clone(), third.clone()]).unwrap(), 2);

    let all: Vec<Design> = store.find_all().unwrap();
    assert_eq!(all, vec![first, second, third]);
}

#[test]
fn delete_and_delete_all_remove_rows_by_identity() {
    let store = seeded_store((1..=5).map(|id| (id, id * 10)));

    assert_eq!(store.delete(&design(2, 0)).unwrap(), 1);
    assert_eq!(store.delete_all(&[design(4, 0), design(5, 0)]).unwrap(), 2);
    assert_eq!(store.delete_all::<Design>(&[]).unwrap(), 0);

    let ids: Vec<i64> = store
        .find_all::<Design>()
        .unwrap()
        .iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn find_by_sql_binds_named_parameters() {
    let store = seeded_store((1..=6).map(|id| (id, id)));

    let reds: Vec<Design> = store
        .find_by_sql(
            "SELECT id, main_color, rank, state, score FROM designs WHERE main_color = :color ORDER BY id",
            &color_params("red"),
        )
        .unwrap();

    assert_eq!(
        reds.iter().map(|d| d.id).collect::<Vec<_>>(),
        vec![2, 4, 6]
    );
}

#[test]
fn missing_named_parameter_is_reported_by_name() {
    let store = seeded_store([(1, 1)]);

    let err = store
        .find_by_sql::<Design>(
            "SELECT * FROM designs WHERE main_color = :color AND rank > :min_rank",
            &color_params("red"),
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::MissingParameter(name) if name == "min_rank"));
}

#[test]
fn execute_batch_runs_statement_per_parameter_bag() {
    let store = seeded_store((1..=4).map(|id| (id, id)));
    let batch: Vec<NamedParams> = [1_i64, 3]
        .iter()
        .map(|id| {
            NamedParams::new()
                .with_value("id", FieldValue::I64(*id), SqlType::BigInt)
                .with_value("state", FieldValue::Text("PUBLISHED".to_string()), SqlType::Varchar)
        })
        .collect();

    let affected = store
        .execute_batch("UPDATE designs SET state = :state WHERE id = :id", &batch)
        .unwrap();

    assert_eq!(affected, 2);
    let published: Vec<i64> = store
        .find_all::<Design>()
        .unwrap()
        .into_iter()
        .filter(|d| d.state == PublishState::Published)
        .map(|d| d.id)
        .collect();
    assert_eq!(published, vec![1, 3]);
}

#[test]
fn for_each_chunk_streams_bounded_batches() {
    let store = seeded_store((1..=7).map(|id| (id, id)));
    let sizes = RefCell::new(Vec::new());

    let delivered = store
        .for_each_chunk::<Design, _>(
            "SELECT id, main_color, rank, state, score FROM designs ORDER BY id",
            &NamedParams::new(),
            3,
            |chunk| {
                sizes.borrow_mut().push(chunk.len());
                Ok(())
            },
        )
        .unwrap();

    assert_eq!(delivered, 7);
    assert_eq!(sizes.into_inner(), vec![3, 3, 1]);
}

#[test]
fn for_each_chunk_stops_on_consumer_error_and_rejects_tiny_chunks() {
    let store = seeded_store((1..=7).map(|id| (id, id)));
    let sql = "SELECT id, main_color, rank, state, score FROM designs ORDER BY id";

    let mut seen = 0;
    let err = store
        .for_each_chunk::<Design, _>(sql, &NamedParams::new(), 2, |chunk| {
            seen += chunk.len();
            Err(StoreError::InvalidArgument("stop".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(message) if message == "stop"));
    assert_eq!(seen, 2);

    let err = store
        .for_each_chunk::<Design, _>(sql, &NamedParams::new(), 1, |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn read_only_store_rejects_writes_but_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("designs.sqlite3");
    {
        let writable = SqliteEntityStore::open(&StoreConfig::file(&path)).unwrap();
        writable.execute(DESIGNS_DDL, &NamedParams::new()).unwrap();
        writable.insert(&design(1, 1)).unwrap();
    }

    let store = SqliteEntityStore::open(&StoreConfig::file(&path).read_only(true)).unwrap();

    assert!(store.is_read_only());
    assert!(matches!(store.insert(&design(2, 2)), Err(StoreError::ReadOnly)));
    assert!(matches!(
        store.execute("DELETE FROM designs", &NamedParams::new()),
        Err(StoreError::ReadOnly)
    ));
    assert_eq!(store.find_all::<Design>().unwrap(), vec![design(1, 1)]);
}

#[test]
fn read_only_in_memory_store_is_a_configuration_error() {
    let err = SqliteEntityStore::open(&StoreConfig::in_memory().read_only(true)).unwrap_err();

    assert!(matches!(
        err,
        StoreError::Db(rowmap_core::db::DbError::InvalidConfig(_))
    ));
}

#[test]
fn misdeclared_record_fails_before_any_statement_runs() {
    #[derive(Debug)]
    struct Orphan {
        id: i64,
    }

    impl Record for Orphan {
        const ARITY: usize = 1;

        fn schema() -> RecordSchema<Self> {
            RecordSchema::entity("orphans").field(FieldDef::new("id", |o: &Orphan| &o.id))
        }

        fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
            Ok(Self { id: values.next()? })
        }
    }

    let store = empty_store();

    let err = store.insert(&Orphan { id: 1 }).unwrap_err();

    assert!(matches!(
        err,
        StoreError::Mapping(MappingError::Configuration { .. })
    ));
}
