//! The boundary to a real database. The core renders SQL and hands it over;
//! drivers implement this trait and own all I/O.

use std::collections::BTreeMap;

use scalar::Value;
use sqltree::Dialect;

/// One raw result row as delivered by a driver: flat column alias to value,
/// wire-typed (booleans may arrive as 0/1, numbers as strings).
pub type FlatRow = BTreeMap<String, Value>;

/// Driver-side failure, opaque to the core.
#[derive(Debug)]
pub struct ConnectorError {
    message: String,
}

impl ConnectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connector error: {}", self.message)
    }
}

impl std::error::Error for ConnectorError {}

/// A database driver. The core never opens sockets or files itself.
pub trait Connector {
    /// The SQL dialect this connection speaks.
    fn dialect(&self) -> &dyn Dialect;

    /// Run a SELECT and return its rows.
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<FlatRow>, ConnectorError>;

    /// Run a statement for its side effects.
    fn execute(&mut self, sql: &str) -> Result<(), ConnectorError>;

    /// Release the connection.
    fn close(self: Box<Self>) -> Result<(), ConnectorError>;
}
