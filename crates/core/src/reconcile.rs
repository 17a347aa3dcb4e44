use std::str::FromStr;

use alloy::primitives::Address;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    descriptor::TokenDescriptor,
    error::{FetchError, MismatchError, TokenIssue, display_value},
    fetch::{Fetcher, OnChainSnapshot, TokenProperty, TokenReader},
};

/// Compares descriptors with what their contracts report on-chain.
#[derive(Debug, Clone)]
pub struct Reconciler<R> {
    fetcher: Fetcher<R>,
}

impl<R: TokenReader> Reconciler<R> {
    pub fn new(fetcher: Fetcher<R>) -> Self {
        Self { fetcher }
    }

    /// Returns one issue per failed fetch and one per mismatching property.
    ///
    /// The null address marks a placeholder token and is never queried.
    #[instrument(skip_all, fields(token.address = tracing::field::Empty))]
    pub async fn reconcile(&self, descriptor: &TokenDescriptor) -> Vec<TokenIssue> {
        let raw = match descriptor.get("address") {
            None => return vec![TokenIssue::AddressMissing],
            Some(raw) => raw,
        };
        let Some(address) = raw.as_str().and_then(|s| Address::from_str(s).ok()) else {
            return vec![TokenIssue::UnverifiableAddress(display_value(raw))];
        };
        tracing::Span::current().record("token.address", tracing::field::display(address));

        if address.is_zero() {
            debug!("null address, skipping on-chain checks");
            return Vec::new();
        }

        let snapshot = self.fetcher.snapshot(address).await;
        compare(descriptor, snapshot)
    }
}

fn compare(descriptor: &TokenDescriptor, snapshot: OnChainSnapshot) -> Vec<TokenIssue> {
    let OnChainSnapshot {
        name,
        symbol,
        decimals,
    } = snapshot;

    [
        check_string(descriptor, TokenProperty::Name, name),
        check_string(descriptor, TokenProperty::Symbol, symbol),
        check_decimals(descriptor, decimals),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn check_string(
    descriptor: &TokenDescriptor,
    property: TokenProperty,
    fetched: Result<String, FetchError>,
) -> Option<TokenIssue> {
    let on_chain = match fetched {
        Ok(value) => value,
        Err(source) => return Some(TokenIssue::Fetch { property, source }),
    };
    // absent fields are already reported by the schema validator
    let declared = descriptor.get(&property.to_string())?;

    (declared.as_str() != Some(on_chain.as_str())).then(|| {
        MismatchError {
            property,
            on_chain: format!("'{on_chain}'"),
            declared: quoted(declared),
        }
        .into()
    })
}

fn check_decimals(
    descriptor: &TokenDescriptor,
    fetched: Result<u8, FetchError>,
) -> Option<TokenIssue> {
    let property = TokenProperty::Decimals;
    let on_chain = match fetched {
        Ok(value) => value,
        Err(source) => return Some(TokenIssue::Fetch { property, source }),
    };
    let declared = descriptor.get("decimals")?;

    (declared.as_i64() != Some(i64::from(on_chain))).then(|| {
        MismatchError {
            property,
            on_chain: on_chain.to_string(),
            declared: display_value(declared),
        }
        .into()
    })
}

fn quoted(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}
