//! Parallel keyset pagination.
//!
//! # Responsibility
//! - Stream a whole table (or a filtered part of it) to a consumer by issuing
//!   several page queries concurrently per round.
//! - Advance a monotonic key frontier between rounds so every row is
//!   delivered exactly once, including long runs of equal keys.
//!
//! # Invariants
//! - Rounds never overlap; a round ends only after all its lanes finished.
//! - Any lane failure aborts the run; chunks already delivered stay delivered.
//! - Results are totally ordered by `(key, identity)`.
//!
//! # See also
//! - `crate::sql::SqlGenerator::pagination_query`

use crate::mapping::{MappingError, NamedParams, ToFieldValue};
use crate::store::StoreError;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use uuid::Uuid;

mod engine;

pub use engine::PaginationDao;

pub type PaginationOutcome<T> = Result<T, PaginationError>;

/// Direction of the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    /// Whether `candidate` lies further along the scan than `current`.
    pub fn is_beyond<K: PartialOrd>(self, candidate: &K, current: &K) -> bool {
        match (self, candidate.partial_cmp(current)) {
            (Self::Ascending, Some(Ordering::Greater)) => true,
            (Self::Descending, Some(Ordering::Less)) => true,
            _ => false,
        }
    }
}

/// Value type usable as a pagination key.
pub trait SortKey: PartialOrd + Clone + Debug + Send + Sync + ToFieldValue + 'static {}

impl<K> SortKey for K where K: PartialOrd + Clone + Debug + Send + Sync + ToFieldValue + 'static {}

/// Sort field of a pagination run: the record field, how to read it and its
/// direction.
pub struct SortingKey<T, K> {
    field: &'static str,
    order: SortOrder,
    accessor: fn(&T) -> K,
}

impl<T, K: SortKey> SortingKey<T, K> {
    pub fn new(field: &'static str, order: SortOrder, accessor: fn(&T) -> K) -> Self {
        Self {
            field,
            order,
            accessor,
        }
    }

    pub fn asc(field: &'static str, accessor: fn(&T) -> K) -> Self {
        Self::new(field, SortOrder::Ascending, accessor)
    }

    pub fn desc(field: &'static str, accessor: fn(&T) -> K) -> Self {
        Self::new(field, SortOrder::Descending, accessor)
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn key_of(&self, record: &T) -> K {
        (self.accessor)(record)
    }

    /// The furthest key of `records` in scan order and how many records
    /// carry it.
    pub fn extreme(&self, records: &[T]) -> Option<(K, usize)> {
        let mut extreme: Option<(K, usize)> = None;
        for record in records {
            let key = self.key_of(record);
            extreme = match extreme {
                Some((current, count)) if !self.order.is_beyond(&key, &current) => {
                    let count = if key == current { count + 1 } else { count };
                    Some((current, count))
                }
                _ => Some((key, 1)),
            };
        }
        extreme
    }
}

/// Caller-supplied parts shared by every query of one run.
pub struct PaginationQueryComponents<T, K> {
    sorting_key: SortingKey<T, K>,
    filter: Option<String>,
    group_by: Option<String>,
    params: NamedParams,
}

impl<T, K: SortKey> PaginationQueryComponents<T, K> {
    pub fn new(sorting_key: SortingKey<T, K>) -> Self {
        Self {
            sorting_key,
            filter: None,
            group_by: None,
            params: NamedParams::new(),
        }
    }

    /// Predicate ANDed in front of the key predicate, e.g. `status = :status`.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    /// Named parameters referenced by the filter.
    pub fn with_params(mut self, params: NamedParams) -> Self {
        self.params = params;
        self
    }

    pub fn sorting_key(&self) -> &SortingKey<T, K> {
        &self.sorting_key
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    pub fn params(&self) -> &NamedParams {
        &self.params
    }
}

/// One lane's page request.
///
/// The SQL text is attached at most once, right before execution.
#[derive(Debug)]
pub struct PaginationQuery<K> {
    key: Option<K>,
    page_size: usize,
    offset: usize,
    sql: OnceCell<String>,
}

impl<K: SortKey> PaginationQuery<K> {
    pub fn new(key: Option<K>, page_size: usize, offset: usize) -> Self {
        Self {
            key,
            page_size,
            offset,
            sql: OnceCell::new(),
        }
    }

    /// The first round reads from the start without a key predicate.
    pub fn is_initial(&self) -> bool {
        self.key.is_none()
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.get().map(String::as_str)
    }

    pub(crate) fn sql_or_init(&self, generate: impl FnOnce() -> String) -> &str {
        self.sql.get_or_init(generate)
    }
}

/// Outcome of one lane in one round.
#[derive(Debug)]
pub struct PaginationResult<K> {
    pub query: PaginationQuery<K>,
    /// Furthest key of the delivered chunk and the number of rows carrying it.
    pub extreme: Option<(K, usize)>,
    pub rows: usize,
    pub failure: Option<LaneCause>,
}

/// Why a lane failed.
#[derive(Debug)]
pub enum LaneCause {
    Store(StoreError),
    /// The lane (query or consumer) panicked; the payload text is kept.
    Panicked(String),
}

impl Display for LaneCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Panicked(message) => write!(f, "lane panicked: {message}"),
        }
    }
}

impl Error for LaneCause {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Panicked(_) => None,
        }
    }
}

/// One failed lane of an aborted run.
#[derive(Debug)]
pub struct LaneFailure {
    pub offset: usize,
    /// Frontier key of the failed query, `None` in the first round.
    pub key: Option<String>,
    pub sql: Option<String>,
    pub cause: LaneCause,
}

/// Aggregate error of a run aborted by lane failures.
#[derive(Debug)]
pub struct PaginationFailed {
    pub run_id: Uuid,
    pub round: usize,
    pub failures: Vec<LaneFailure>,
}

impl PaginationFailed {
    /// The reported primary cause.
    pub fn first_cause(&self) -> Option<&LaneCause> {
        self.failures.first().map(|failure| &failure.cause)
    }

    pub fn causes(&self) -> impl Iterator<Item = &LaneCause> {
        self.failures.iter().map(|failure| &failure.cause)
    }
}

impl Display for PaginationFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pagination run {} failed in round {} ({} lanes)",
            self.run_id,
            self.round,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\noffset {}: {}", failure.offset, failure.cause)?;
        }
        Ok(())
    }
}

impl Error for PaginationFailed {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.first_cause().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Failure of a pagination run.
#[derive(Debug)]
pub enum PaginationError {
    InvalidArgument(String),
    Mapping(MappingError),
    Failed(PaginationFailed),
}

impl Display for PaginationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid pagination argument: {message}"),
            Self::Mapping(err) => write!(f, "{err}"),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PaginationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidArgument(_) => None,
            Self::Mapping(err) => Some(err),
            Self::Failed(err) => Some(err),
        }
    }
}

impl From<MappingError> for PaginationError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

impl From<PaginationFailed> for PaginationError {
    fn from(value: PaginationFailed) -> Self {
        Self::Failed(value)
    }
}

/// Totals of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaginationSummary {
    pub rounds: usize,
    pub rows: usize,
}
