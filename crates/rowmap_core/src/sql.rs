//! SQL text generation for mapped tables (SQLite dialect).
//!
//! # Responsibility
//! - Produce CRUD statements whose positional placeholders line up with the
//!   layouts of `crate::mapping::ParamGenerator`.
//! - Produce keyset pagination queries ordered by `(key, identity)`.
//!
//! # Invariants
//! - Table and column names come from validated descriptors only.
//! - Pagination queries always carry the identity column as tiebreak.

use crate::pagination::SortOrder;

/// One page request of a keyset pagination query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageClause<'a> {
    pub key_column: &'a str,
    /// Named parameter bound to the frontier key, without the `:` prefix.
    pub key_param: &'a str,
    pub order: SortOrder,
    pub filter: Option<&'a str>,
    pub group_by: Option<&'a str>,
    /// The first round of a run reads from the start and has no key predicate.
    pub initial: bool,
    pub limit: usize,
    pub offset: usize,
}

/// Statement builder bound to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlGenerator {
    table: &'static str,
    columns: Vec<String>,
    identity: usize,
}

impl SqlGenerator {
    pub fn new(table: &'static str, columns: Vec<String>, identity: usize) -> Self {
        Self {
            table,
            columns,
            identity,
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn identity_column(&self) -> &str {
        &self.columns[self.identity]
    }

    pub fn select_all(&self) -> String {
        format!("SELECT {} FROM {}", self.columns.join(", "), self.table)
    }

    pub fn select_by_id(&self) -> String {
        format!("{} WHERE {} = ?", self.select_all(), self.identity_column())
    }

    pub fn insert(&self, with_identity: bool) -> String {
        self.insert_batch(1, with_identity)
    }

    /// Multi-row insert of `count` records.
    pub fn insert_batch(&self, count: usize, with_identity: bool) -> String {
        let columns = self.write_columns(with_identity);
        let row = placeholders(columns.len());
        let rows = vec![format!("({row})"); count].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            rows
        )
    }

    pub fn update(&self) -> String {
        let assignments = self
            .write_columns(false)
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table,
            assignments,
            self.identity_column()
        )
    }

    /// Single-statement update of `count` records keyed by identity.
    pub fn update_batch(&self, count: usize) -> String {
        let id = self.identity_column();
        let whens = vec!["WHEN ? THEN ?"; count].join(" ");
        let assignments = self
            .write_columns(false)
            .iter()
            .map(|column| format!("{column} = CASE {id} {whens} END"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {} WHERE {} IN ({})",
            self.table,
            assignments,
            id,
            placeholders(count)
        )
    }

    pub fn delete_by_id(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {} = ?",
            self.table,
            self.identity_column()
        )
    }

    pub fn delete_by_ids(&self, count: usize) -> String {
        format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.table,
            self.identity_column(),
            placeholders(count)
        )
    }

    /// `SELECT ... [WHERE (filter) AND] key >= :key [GROUP BY ...]
    /// ORDER BY key, id LIMIT n OFFSET m`, with `<=` and `DESC` for
    /// descending runs.
    pub fn pagination_query(&self, page: &PageClause<'_>) -> String {
        let mut predicates = Vec::with_capacity(2);
        if let Some(filter) = page.filter.map(str::trim).filter(|f| !f.is_empty()) {
            predicates.push(format!("({filter})"));
        }
        if !page.initial {
            let comparison = match page.order {
                SortOrder::Ascending => ">=",
                SortOrder::Descending => "<=",
            };
            predicates.push(format!(
                "{} {} :{}",
                page.key_column, comparison, page.key_param
            ));
        }

        let mut sql = self.select_all();
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        if let Some(group_by) = page.group_by.map(str::trim).filter(|g| !g.is_empty()) {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }

        let direction = page.order.keyword();
        sql.push_str(&format!(" ORDER BY {} {}", page.key_column, direction));
        if page.key_column != self.identity_column() {
            sql.push_str(&format!(", {} {}", self.identity_column(), direction));
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
        sql
    }

    fn write_columns(&self, with_identity: bool) -> Vec<&str> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(index, _)| with_identity || *index != self.identity)
            .map(|(_, column)| column.as_str())
            .collect()
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
