//! SQL warehouse access: a session trait, the Snowflake REST session behind
//! it, and the bulk-copy statements the load job issues.

pub mod copy;
pub mod snowflake;

use async_trait::async_trait;

use crate::error::Result;

pub use snowflake::SnowflakeSession;

/// Rows come back as text; callers parse the columns they care about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// Column position, ignoring case.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell at `row` for column `name`, `None` when absent or NULL.
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column(name)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// An open warehouse session. Statements run one at a time.
#[async_trait]
pub trait Warehouse: Send {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult>;

    fn is_open(&self) -> bool;

    /// Idempotent.
    async fn close(&mut self) -> Result<()>;
}
