//! Reads ERC-20 metadata from a contract, retrying transient RPC failures.
//!
//! Every property has its own retry budget: a flaky `symbol()` call never
//! causes `name()` or `decimals()` to be requested again.

use std::{
    fmt::{self, Display},
    time::Duration,
};

use alloy::{
    primitives::{Address, Bytes},
    sol,
    sol_types::SolCall as _,
};
use tracing::{debug, instrument, warn};

use crate::{config::RetryConfig, error::FetchError};

sol! {
    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// The three contract reads a descriptor is reconciled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenProperty {
    Name,
    Symbol,
    Decimals,
}

impl TokenProperty {
    pub const ALL: [TokenProperty; 3] = [Self::Name, Self::Symbol, Self::Decimals];

    pub fn calldata(self) -> Bytes {
        match self {
            Self::Name => IERC20Metadata::nameCall {}.abi_encode(),
            Self::Symbol => IERC20Metadata::symbolCall {}.abi_encode(),
            Self::Decimals => IERC20Metadata::decimalsCall {}.abi_encode(),
        }
        .into()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Symbol => "Symbol",
            Self::Decimals => "Decimals",
        }
    }
}

impl Display for TokenProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Name => "name",
            Self::Symbol => "symbol",
            Self::Decimals => "decimals",
        })
    }
}

/// Anything that can perform a read-only contract call.
pub trait TokenReader: Send + Sync {
    /// Executes `calldata` against `address` once, returning the raw return
    /// data. Implementations classify failures as transient or permanent.
    fn call(
        &self,
        address: Address,
        calldata: Bytes,
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

impl<T: TokenReader> TokenReader for &T {
    fn call(
        &self,
        address: Address,
        calldata: Bytes,
    ) -> impl Future<Output = Result<Bytes, FetchError>> + Send {
        (**self).call(address, calldata)
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self::new(cfg.max_attempts, cfg.initial_backoff, cfg.max_backoff)
    }
}

/// The on-chain side of a reconciliation, each property fetched independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainSnapshot {
    pub name: Result<String, FetchError>,
    pub symbol: Result<String, FetchError>,
    pub decimals: Result<u8, FetchError>,
}

/// Fetches token metadata through a shared [`TokenReader`].
#[derive(Debug, Clone)]
pub struct Fetcher<R> {
    reader: R,
    retry: RetryPolicy,
}

impl<R: TokenReader> Fetcher<R> {
    pub fn new(reader: R, retry: RetryPolicy) -> Self {
        Self { reader, retry }
    }

    pub async fn fetch_name(&self, address: Address) -> Result<String, FetchError> {
        let data = self.call_with_retry(address, TokenProperty::Name).await?;
        decode_string(TokenProperty::Name, &data)
    }

    pub async fn fetch_symbol(&self, address: Address) -> Result<String, FetchError> {
        let data = self.call_with_retry(address, TokenProperty::Symbol).await?;
        decode_string(TokenProperty::Symbol, &data)
    }

    pub async fn fetch_decimals(&self, address: Address) -> Result<u8, FetchError> {
        let data = self.call_with_retry(address, TokenProperty::Decimals).await?;
        decode_decimals(&data)
    }

    /// Reads all three properties concurrently.
    pub async fn snapshot(&self, address: Address) -> OnChainSnapshot {
        let (name, symbol, decimals) = tokio::join!(
            self.fetch_name(address),
            self.fetch_symbol(address),
            self.fetch_decimals(address),
        );
        OnChainSnapshot {
            name,
            symbol,
            decimals,
        }
    }

    #[instrument(level = "debug", skip_all, fields(%address, %property))]
    async fn call_with_retry(
        &self,
        address: Address,
        property: TokenProperty,
    ) -> Result<Bytes, FetchError> {
        let calldata = property.calldata();
        let mut attempt = 1;
        loop {
            match self.reader.call(address, calldata.clone()).await {
                Ok(data) => {
                    debug!(attempt, len = data.len(), "fetched");
                    return Ok(data);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(attempt, ?delay, error = %err, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    warn!(attempt, error = %err, "retry budget exhausted");
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn decode_string(property: TokenProperty, data: &[u8]) -> Result<String, FetchError> {
    if data.is_empty() {
        return Err(not_implemented(property));
    }

    let decoded = match property {
        TokenProperty::Symbol => IERC20Metadata::symbolCall::abi_decode_returns(data),
        _ => IERC20Metadata::nameCall::abi_decode_returns(data),
    };

    match decoded {
        Ok(value) => Ok(value.trim_matches('\0').to_string()),
        // Some early tokens return bytes32 instead of string.
        Err(_) if data.len() == 32 => {
            let end = data.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            String::from_utf8(data[..end].to_vec()).map_err(|e| {
                FetchError::Permanent(format!("{property}() returned invalid UTF-8: {e}"))
            })
        }
        Err(e) => Err(FetchError::Permanent(format!(
            "failed to decode {property}(): {e}"
        ))),
    }
}

fn decode_decimals(data: &[u8]) -> Result<u8, FetchError> {
    if data.is_empty() {
        return Err(not_implemented(TokenProperty::Decimals));
    }

    IERC20Metadata::decimalsCall::abi_decode_returns(data)
        .map_err(|e| FetchError::Permanent(format!("failed to decode decimals(): {e}")))
}

fn not_implemented(property: TokenProperty) -> FetchError {
    FetchError::Permanent(format!(
        "{property}() returned no data; the contract does not implement it"
    ))
}
