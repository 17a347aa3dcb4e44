//! Error kinds produced while validating a token list.
//!
//! Everything except [`ConnectionError`] and [`DataDirNotFound`] is local to
//! one token: it is rendered into that token's report and never aborts the run.

use std::path::PathBuf;

use serde_json::Value;

use crate::{
    fetch::TokenProperty,
    schema::{ExtensionKind, MAX_DECIMALS, MIN_DECIMALS},
};

/// The descriptor file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("data.json not found in {dir}/ directory")]
    NotFound { dir: String },

    #[error("Cannot read data.json: {0}")]
    Io(#[source] std::io::Error),

    #[error("Invalid JSON5 in data.json: {0}")]
    Syntax(String),

    #[error("Invalid data.json: top-level value must be an object")]
    NotAnObject,
}

/// A static structural violation in a descriptor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid chainId: expected {expected}, got {}", display_value(.actual))]
    InvalidChainId { expected: u64, actual: Value },

    #[error("Invalid address: {}", display_value(.0))]
    InvalidAddress(Value),

    #[error("Invalid name: must be a non-empty string")]
    InvalidName,

    #[error("Invalid symbol: must be a non-empty string")]
    InvalidSymbol,

    #[error("Symbol mismatch: folder name is '{directory}' but symbol is '{symbol}'")]
    SymbolMismatch { directory: String, symbol: String },

    #[error(
        "Invalid decimals: must be an integer between {} and {}",
        MIN_DECIMALS,
        MAX_DECIMALS
    )]
    InvalidDecimals,

    #[error("Invalid extensions: must be a dictionary")]
    InvalidExtensions,

    #[error("Invalid extension tag: {tag}. Allowed tags are: {allowed}")]
    UnknownExtensionTag { tag: String, allowed: String },

    #[error("Invalid type for extension '{tag}': expected {expected}, got {actual}")]
    ExtensionType {
        tag: String,
        expected: ExtensionKind,
        actual: &'static str,
    },
}

/// The logo asset is not present next to the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing logo: expected logo.svg or logo.png")]
pub struct AssetMissingError;

/// Reading one on-chain property failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Timeouts, rate limiting, flaky nodes; worth another attempt.
    #[error("{0}")]
    Transient(String),

    /// Reverts, missing methods, undecodable data; retrying cannot help.
    #[error("{0}")]
    Permanent(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A declared descriptor value disagrees with the contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} mismatch: on-chain is {on_chain} but declared is {declared}", .property.label())]
pub struct MismatchError {
    pub property: TokenProperty,
    pub on_chain: String,
    pub declared: String,
}

/// The directory holding the token list does not exist. Fatal for the run.
#[derive(Debug, thiserror::Error)]
#[error("Data directory not found: {}", .0.display())]
pub struct DataDirNotFound(pub PathBuf);

/// The RPC endpoint cannot be used. Fatal for the whole run.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid RPC endpoint URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("RPC endpoint {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("RPC endpoint {url} serves chain {actual}, expected {expected}")]
    WrongChain {
        url: String,
        expected: u64,
        actual: u64,
    },
}

/// Anything that makes a single token invalid.
#[derive(Debug, thiserror::Error)]
pub enum TokenIssue {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    AssetMissing(#[from] AssetMissingError),

    #[error("Cannot verify on-chain: address is missing")]
    AddressMissing,

    #[error("Cannot verify on-chain: invalid address '{0}'")]
    UnverifiableAddress(String),

    #[error("Failed to fetch {property} on-chain: {source}")]
    Fetch {
        property: TokenProperty,
        source: FetchError,
    },

    #[error(transparent)]
    Mismatch(#[from] MismatchError),
}

/// Renders a JSON value the way a human wrote it: strings without quotes.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
