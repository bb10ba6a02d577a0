//! Relational row sources
//!
//! A [`RowSource`] runs one query and hands back every result row fully
//! materialised. Control-plane tables are bounded inventories, so there is
//! no streaming contract.

mod memory;
mod mysql;

pub use memory::StaticRowSource;
pub use mysql::{MysqlRowSource, MysqlSourceConfig};

use crate::schema::Row;
use crate::Result;
use async_trait::async_trait;

/// Something that can execute a query and return its rows
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Execute `query` exactly once and return all rows in result order.
    async fn fetch(&self, query: &str) -> Result<Vec<Row>>;

    /// Release connections held by the source
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
