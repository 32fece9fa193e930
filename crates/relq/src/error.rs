use compiler::CompileError;
use scalar::TypeError;

use crate::connector::ConnectorError;
use crate::materialize::MaterializeError;

/// Anything that can go wrong between a query tree and materialized rows.
#[derive(Debug)]
pub enum Error {
    Type(TypeError),
    Compile(CompileError),
    Connector(ConnectorError),
    Materialize(MaterializeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Type(e) => write!(f, "{}", e),
            Error::Compile(e) => write!(f, "{}", e),
            Error::Connector(e) => write!(f, "{}", e),
            Error::Materialize(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Type(e) => Some(e),
            Error::Compile(e) => Some(e),
            Error::Connector(e) => Some(e),
            Error::Materialize(e) => Some(e),
        }
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Error::Type(e)
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Self {
        Error::Compile(e)
    }
}

impl From<ConnectorError> for Error {
    fn from(e: ConnectorError) -> Self {
        Error::Connector(e)
    }
}

impl From<MaterializeError> for Error {
    fn from(e: MaterializeError) -> Self {
        Error::Materialize(e)
    }
}
