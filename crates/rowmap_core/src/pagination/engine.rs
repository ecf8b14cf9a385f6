//! Round loop and lane execution of parallel keyset pagination.
//!
//! Each round fans out `lanes_per_round` page queries over a bounded set of
//! scoped worker threads and waits for all of them. The key predicate is
//! inclusive, so after a round the next base offset skips exactly the rows
//! already delivered that carry the new frontier key.

use super::{
    LaneCause, LaneFailure, PaginationError, PaginationFailed, PaginationOutcome,
    PaginationQuery, PaginationQueryComponents, PaginationResult, PaginationSummary, SortKey,
};
use crate::mapping::{FieldDescriptor, MappingError, Record, SqlType, ToFieldValue, TypeDescriptor};
use crate::sql::PageClause;
use crate::store::{QueryExecutor, StoreError, StoreResult};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use uuid::Uuid;

const FALLBACK_WORKERS: usize = 4;

/// Runs parallel keyset pagination against a [`QueryExecutor`].
///
/// Lanes only query concurrently when the executor does. A
/// [`SqliteEntityStore`](crate::store::SqliteEntityStore) serializes
/// statements on its single connection, so there only the consumer calls
/// overlap; an executor over a connection pool runs lane queries in parallel.
pub struct PaginationDao<E> {
    executor: Arc<E>,
    max_workers: usize,
}

/// Per-run state shared by every lane.
struct RunPlan<'a, T, K> {
    run_id: Uuid,
    descriptor: &'a TypeDescriptor<T>,
    components: &'a PaginationQueryComponents<T, K>,
    key_column: &'a str,
    key_sql_type: SqlType,
    key_type_name: &'static str,
}

impl<E: QueryExecutor> PaginationDao<E> {
    /// Uses one worker per available CPU.
    pub fn new(executor: Arc<E>) -> Self {
        let max_workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(FALLBACK_WORKERS);
        Self {
            executor,
            max_workers,
        }
    }

    /// Bounds the number of lanes that execute at the same time.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Delivers every row selected by `components` to `consumer`, one chunk
    /// per non-empty lane, fetching `lanes_per_round` pages concurrently.
    ///
    /// `consumer` may run on several threads at once. On failure, chunks of
    /// lanes that succeeded before the abort have already been delivered.
    ///
    /// # Errors
    /// - `InvalidArgument` when `lanes_per_round` or `page_size` is zero.
    /// - `Mapping` when `T` cannot be described or the sort field is not one
    ///   of its fields.
    /// - `Failed` when any lane fails; carries every failed lane.
    pub fn paginate_in_parallel<T, K, C>(
        &self,
        lanes_per_round: usize,
        page_size: usize,
        components: &PaginationQueryComponents<T, K>,
        consumer: C,
    ) -> PaginationOutcome<PaginationSummary>
    where
        T: Record,
        K: SortKey,
        C: Fn(Vec<T>) + Sync,
    {
        if lanes_per_round == 0 {
            return Err(PaginationError::InvalidArgument(
                "lanes per round must be greater than 0".to_string(),
            ));
        }
        if page_size == 0 {
            return Err(PaginationError::InvalidArgument(
                "page size must be greater than 0".to_string(),
            ));
        }

        let descriptor = self.executor.registry().describe::<T>()?;
        let key_field = sort_field(&descriptor, components.sorting_key().field())?;
        let plan = RunPlan {
            run_id: Uuid::new_v4(),
            descriptor: &descriptor,
            components,
            key_column: key_field.column(),
            key_sql_type: key_field.sql_type(),
            key_type_name: key_field.type_key().name(),
        };
        let order = components.sorting_key().order();
        let started_at = Instant::now();
        info!(
            "event=paginate_start module=pagination status=start run_id={} type={} key={} order={} lanes={} page_size={} workers={}",
            plan.run_id,
            descriptor.type_name(),
            plan.key_column,
            order.keyword(),
            lanes_per_round,
            page_size,
            self.max_workers.min(lanes_per_round)
        );

        let mut frontier: Option<K> = None;
        let mut base = 0;
        let mut summary = PaginationSummary::default();
        loop {
            let round = summary.rounds;
            let queries = (0..lanes_per_round)
                .map(|lane| PaginationQuery::new(frontier.clone(), page_size, base + lane * page_size))
                .collect();
            let results = self.run_round(&plan, queries, &consumer);
            summary.rounds += 1;

            let mut failures = Vec::new();
            let mut next: Option<(K, usize)> = None;
            let mut delivered = 0;
            for result in results {
                if let Some(cause) = result.failure {
                    failures.push(LaneFailure {
                        offset: result.query.offset(),
                        key: result.query.key().map(|key| format!("{key:?}")),
                        sql: result.query.sql().map(str::to_string),
                        cause,
                    });
                    continue;
                }
                delivered += result.rows;
                if let Some((key, count)) = result.extreme {
                    next = match next {
                        Some((current, carried)) if !order.is_beyond(&key, &current) => {
                            let carried = if key == current { carried + count } else { carried };
                            Some((current, carried))
                        }
                        _ => Some((key, count)),
                    };
                }
            }
            summary.rows += delivered;

            if !failures.is_empty() {
                error!(
                    "event=paginate_finish module=pagination status=error run_id={} round={} failed_lanes={} rows={} duration_ms={}",
                    plan.run_id,
                    round,
                    failures.len(),
                    summary.rows,
                    started_at.elapsed().as_millis()
                );
                return Err(PaginationFailed {
                    run_id: plan.run_id,
                    round,
                    failures,
                }
                .into());
            }

            let Some((key, carried)) = next else {
                break;
            };
            base = if frontier.as_ref() == Some(&key) {
                base + carried
            } else {
                carried
            };
            info!(
                "event=paginate_round module=pagination status=ok run_id={} round={} rows={} frontier={:?} next_offset={}",
                plan.run_id, round, delivered, key, base
            );
            frontier = Some(key);
        }

        info!(
            "event=paginate_finish module=pagination status=ok run_id={} rounds={} rows={} duration_ms={}",
            plan.run_id,
            summary.rounds,
            summary.rows,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Executes one round and returns the lane results in lane order.
    fn run_round<T, K, C>(
        &self,
        plan: &RunPlan<'_, T, K>,
        queries: Vec<PaginationQuery<K>>,
        consumer: &C,
    ) -> Vec<PaginationResult<K>>
    where
        T: Record,
        K: SortKey,
        C: Fn(Vec<T>) + Sync,
    {
        let workers = self.max_workers.min(queries.len()).max(1);
        let pending = Mutex::new(queries.into_iter().enumerate().collect::<VecDeque<_>>());

        let mut finished: Vec<(usize, PaginationResult<K>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let next = pending.lock().pop_front();
                            let Some((lane, query)) = next else {
                                break;
                            };
                            done.push((lane, self.run_lane(plan, lane, query, consumer)));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|payload| resume_unwind(payload)))
                .collect()
        });

        finished.sort_by_key(|(lane, _)| *lane);
        finished.into_iter().map(|(_, result)| result).collect()
    }

    fn run_lane<T, K, C>(
        &self,
        plan: &RunPlan<'_, T, K>,
        lane: usize,
        query: PaginationQuery<K>,
        consumer: &C,
    ) -> PaginationResult<K>
    where
        T: Record,
        K: SortKey,
        C: Fn(Vec<T>) + Sync,
    {
        let started_at = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.fetch_and_deliver(plan, &query, consumer)));

        let (extreme, rows, failure) = match outcome {
            Ok(Ok((extreme, rows))) => (extreme, rows, None),
            Ok(Err(err)) => (None, 0, Some(LaneCause::Store(err))),
            Err(payload) => (None, 0, Some(LaneCause::Panicked(panic_message(payload)))),
        };

        match &failure {
            None => debug!(
                "event=paginate_lane module=pagination status=ok run_id={} lane={} offset={} rows={} duration_ms={}",
                plan.run_id,
                lane,
                query.offset(),
                rows,
                started_at.elapsed().as_millis()
            ),
            Some(cause) => error!(
                "event=paginate_lane module=pagination status=error run_id={} lane={} offset={} error={}",
                plan.run_id,
                lane,
                query.offset(),
                cause
            ),
        }

        PaginationResult {
            query,
            extreme,
            rows,
            failure,
        }
    }

    fn fetch_and_deliver<T, K, C>(
        &self,
        plan: &RunPlan<'_, T, K>,
        query: &PaginationQuery<K>,
        consumer: &C,
    ) -> StoreResult<(Option<(K, usize)>, usize)>
    where
        T: Record,
        K: SortKey,
        C: Fn(Vec<T>) + Sync,
    {
        let components = plan.components;
        let sql = query.sql_or_init(|| {
            plan.descriptor.sql().pagination_query(&PageClause {
                key_column: plan.key_column,
                key_param: plan.key_column,
                order: components.sorting_key().order(),
                filter: components.filter(),
                group_by: components.group_by(),
                initial: query.is_initial(),
                limit: query.page_size(),
                offset: query.offset(),
            })
        });

        let mut params = components.params().clone();
        if let Some(key) = query.key() {
            params.add_typed(
                plan.key_column,
                key.to_field_value().into_written(),
                plan.key_sql_type,
                plan.key_type_name,
            );
        }

        let records = self
            .executor
            .query_records(plan.descriptor, sql, &params)?;
        if let Some(position) = records.iter().position(|record| {
            components.sorting_key().key_of(record).to_field_value().is_null()
        }) {
            return Err(StoreError::InvalidArgument(format!(
                "null sort key `{}` at offset {}",
                components.sorting_key().field(),
                query.offset() + position
            )));
        }
        let extreme = components.sorting_key().extreme(&records);
        let rows = records.len();
        if rows > 0 {
            consumer(records);
        }
        Ok((extreme, rows))
    }
}

/// Resolves the sort field. Nullable fields cannot carry a frontier and enum
/// fields sort by stored name in SQL but by ordinal in Rust, so both are
/// rejected.
fn sort_field<'d, T: Record>(
    descriptor: &'d TypeDescriptor<T>,
    field: &str,
) -> Result<&'d FieldDescriptor<T>, MappingError> {
    let configuration = |message: String| MappingError::Configuration {
        type_name: descriptor.type_name(),
        message,
    };
    let found = descriptor.field(field).ok_or_else(|| {
        configuration(format!(
            "sort field `{field}` is not a field of {}",
            descriptor.type_name()
        ))
    })?;
    if found.is_nullable() {
        return Err(configuration(format!(
            "sort field `{field}` is nullable; null keys cannot advance the frontier"
        )));
    }
    if found.is_enum() {
        return Err(configuration(format!(
            "sort field `{field}` is an enum; stored names do not sort like its variants"
        )));
    }
    Ok(found)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
