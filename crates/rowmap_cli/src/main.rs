//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `rowmap_core` linkage end to end: describe a record, seed an
//!   in-memory table and paginate it in parallel.
//! - Keep output deterministic for quick local sanity checks.

use rowmap_core::{
    core_version, FieldDef, FieldValues, MappingResult, NamedParams, PaginationDao,
    PaginationQueryComponents, Record, RecordSchema, SortingKey, SqliteEntityStore, StoreConfig,
};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SEED_ROWS: i64 = 95;
const LANES_PER_ROUND: usize = 3;
const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct Reading {
    id: i64,
    sensor_name: String,
    bucket: i64,
}

impl Record for Reading {
    const ARITY: usize = 3;

    fn schema() -> RecordSchema<Self> {
        RecordSchema::entity("readings")
            .field(FieldDef::id("id", |r: &Reading| &r.id))
            .field(FieldDef::new("sensorName", |r: &Reading| &r.sensor_name))
            .field(FieldDef::new("bucket", |r: &Reading| &r.bucket))
    }

    fn from_values(values: &mut FieldValues) -> MappingResult<Self> {
        Ok(Self {
            id: values.next()?,
            sensor_name: values.next()?,
            bucket: values.next()?,
        })
    }
}

fn main() -> ExitCode {
    println!("rowmap_core version={}", core_version());
    match run() {
        Ok((rounds, rows)) => {
            println!("rowmap_core paginate rounds={rounds} rows={rows}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("rowmap_core smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteEntityStore::open(&StoreConfig::in_memory())?);
    store.execute(
        "CREATE TABLE readings (id INTEGER PRIMARY KEY, sensor_name TEXT NOT NULL, bucket INTEGER NOT NULL)",
        &NamedParams::new(),
    )?;

    // Buckets of 25 rows force runs of equal keys longer than a page.
    let seed: Vec<Reading> = (1..=SEED_ROWS)
        .map(|id| Reading {
            id,
            sensor_name: format!("sensor-{}", id % 7),
            bucket: id / 25,
        })
        .collect();
    store.insert_all(&seed)?;

    let delivered = AtomicUsize::new(0);
    let components = PaginationQueryComponents::new(SortingKey::asc("bucket", |r: &Reading| r.bucket));
    let summary = PaginationDao::new(Arc::clone(&store)).paginate_in_parallel(
        LANES_PER_ROUND,
        PAGE_SIZE,
        &components,
        |chunk: Vec<Reading>| {
            delivered.fetch_add(chunk.len(), Ordering::Relaxed);
        },
    )?;

    log::info!(
        "event=cli_smoke module=cli status=ok rounds={} rows={}",
        summary.rounds,
        delivered.load(Ordering::Relaxed)
    );
    Ok((summary.rounds, summary.rows))
}
