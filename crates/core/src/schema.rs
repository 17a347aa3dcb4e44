use std::{
    fmt::{self, Display},
    path::Path,
};

use serde_json::Value;

use crate::{
    descriptor::{TokenDescriptor, dir_name},
    error::{AssetMissingError, SchemaError, TokenIssue},
};

pub const REQUIRED_FIELDS: [&str; 5] = ["chainId", "address", "name", "symbol", "decimals"];
pub const MIN_DECIMALS: i64 = 0;
pub const MAX_DECIMALS: i64 = 36;
pub const LOGO_FILES: [&str; 2] = ["logo.svg", "logo.png"];

/// Extension tags a descriptor may carry, with the value kind each one takes.
pub const ALLOWED_EXTENSIONS: &[(&str, ExtensionKind)] = &[("coinGeckoId", ExtensionKind::String)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    String,
    Integer,
    Boolean,
}

impl ExtensionKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a JSON value's kind, as shown in type mismatch messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `0x` followed by exactly 40 hex digits, any case.
pub fn is_valid_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Static structural checks on a token descriptor.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    expected_chain_id: u64,
    require_logo: bool,
}

impl SchemaValidator {
    pub fn new(expected_chain_id: u64) -> Self {
        Self {
            expected_chain_id,
            require_logo: false,
        }
    }

    pub fn with_logo_rule(mut self, require_logo: bool) -> Self {
        self.require_logo = require_logo;
        self
    }

    /// Checks a descriptor against the schema and the name of its directory.
    ///
    /// All checks run and accumulate, except that missing required fields are
    /// reported alone.
    pub fn validate(&self, descriptor: &TokenDescriptor, directory: &str) -> Vec<SchemaError> {
        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .into_iter()
            .filter(|field| !descriptor.contains(field))
            .collect();
        if !missing.is_empty() {
            return vec![SchemaError::MissingFields(missing)];
        }

        let mut errors = Vec::new();
        let field = |name| required(descriptor, name);

        let chain_id = field("chainId");
        if chain_id.as_u64() != Some(self.expected_chain_id) {
            errors.push(SchemaError::InvalidChainId {
                expected: self.expected_chain_id,
                actual: chain_id.clone(),
            });
        }

        let address = field("address");
        if !address.as_str().is_some_and(is_valid_address) {
            errors.push(SchemaError::InvalidAddress(address.clone()));
        }

        if !is_non_empty_string(field("name")) {
            errors.push(SchemaError::InvalidName);
        }

        match field("symbol") {
            Value::String(symbol) if !symbol.trim().is_empty() => {
                if symbol != directory {
                    errors.push(SchemaError::SymbolMismatch {
                        directory: directory.to_string(),
                        symbol: symbol.clone(),
                    });
                }
            }
            _ => errors.push(SchemaError::InvalidSymbol),
        }

        let decimals = field("decimals").as_i64();
        if !decimals.is_some_and(|d| (MIN_DECIMALS..=MAX_DECIMALS).contains(&d)) {
            errors.push(SchemaError::InvalidDecimals);
        }

        if let Some(extensions) = descriptor.get("extensions") {
            errors.extend(check_extensions(extensions));
        }

        errors
    }

    /// Like [`validate`](Self::validate), taking the directory name from
    /// `dir` and additionally enforcing the logo rule when enabled.
    pub fn validate_dir(&self, descriptor: &TokenDescriptor, dir: &Path) -> Vec<TokenIssue> {
        let errors = self.validate(descriptor, &dir_name(dir));
        let short_circuited = matches!(errors.first(), Some(SchemaError::MissingFields(_)));

        let mut issues: Vec<TokenIssue> = errors.into_iter().map(TokenIssue::from).collect();
        if self.require_logo && !short_circuited {
            if let Err(e) = check_logo(dir) {
                issues.push(e.into());
            }
        }
        issues
    }
}

/// At least one of [`LOGO_FILES`] must exist in `dir`.
pub fn check_logo(dir: &Path) -> Result<(), AssetMissingError> {
    if LOGO_FILES.iter().any(|file| dir.join(file).is_file()) {
        Ok(())
    } else {
        Err(AssetMissingError)
    }
}

static NULL: Value = Value::Null;

// Only called once presence of every required field has been checked.
fn required<'a>(descriptor: &'a TokenDescriptor, name: &str) -> &'a Value {
    descriptor.get(name).unwrap_or(&NULL)
}

fn is_non_empty_string(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.trim().is_empty())
}

fn check_extensions(extensions: &Value) -> Vec<SchemaError> {
    let Value::Object(extensions) = extensions else {
        return vec![SchemaError::InvalidExtensions];
    };

    extensions
        .iter()
        .filter_map(|(tag, value)| {
            match ALLOWED_EXTENSIONS.iter().find(|(allowed, _)| *allowed == tag.as_str()) {
                Some((_, kind)) if kind.matches(value) => None,
                Some((_, kind)) => Some(SchemaError::ExtensionType {
                    tag: tag.clone(),
                    expected: *kind,
                    actual: value_kind(value),
                }),
                None => Some(SchemaError::UnknownExtensionTag {
                    tag: tag.clone(),
                    allowed: allowed_tags(),
                }),
            }
        })
        .collect()
}

fn allowed_tags() -> String {
    ALLOWED_EXTENSIONS
        .iter()
        .map(|(tag, _)| *tag)
        .collect::<Vec<_>>()
        .join(", ")
}
