use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    transports::{RpcError, TransportError},
};
use tracing::{info, instrument};

use crate::{
    chain::{DEFAULT_RPC_URL, Network},
    error::{ConnectionError, FetchError},
    fetch::TokenReader,
};

/// Picks the endpoint URL: explicit flag, then configured value, then default.
pub fn resolve_rpc_url<'a>(explicit: Option<&'a str>, configured: Option<&'a str>) -> &'a str {
    explicit
        .filter(|url| !url.trim().is_empty())
        .or(configured.filter(|url| !url.trim().is_empty()))
        .unwrap_or(DEFAULT_RPC_URL)
}

/// A verified connection to an RPC node, shared by every fetch of a run.
#[derive(Clone)]
pub struct Endpoint {
    provider: DynProvider,
    url: String,
    request_timeout: Duration,
}

impl Endpoint {
    /// Resolves the URL, connects, and checks that the node is alive and
    /// serves `network`.
    pub async fn connect(
        explicit_url: Option<&str>,
        configured_url: Option<&str>,
        network: Network,
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let url = resolve_rpc_url(explicit_url, configured_url);
        Self::connect_to(url, network, request_timeout).await
    }

    #[instrument(skip(network, request_timeout), fields(%network))]
    pub async fn connect_to(
        url: &str,
        network: Network,
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let provider = ProviderBuilder::new()
            .connect_http(url.parse().map_err(|e| ConnectionError::InvalidUrl {
                url: url.to_string(),
                reason: format!("{e}"),
            })?)
            .erased();

        let actual = match tokio::time::timeout(request_timeout, provider.get_chain_id()).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                return Err(ConnectionError::Unreachable {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ConnectionError::Unreachable {
                    url: url.to_string(),
                    reason: format!(
                        "timed out after {}",
                        humantime::format_duration(request_timeout)
                    ),
                });
            }
        };

        if actual != network.chain_id() {
            return Err(ConnectionError::WrongChain {
                url: url.to_string(),
                expected: network.chain_id(),
                actual,
            });
        }

        info!(chain.id = actual, "🔗 Connected to RPC endpoint");

        Ok(Self {
            provider,
            url: url.to_string(),
            request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TokenReader for Endpoint {
    async fn call(&self, address: Address, calldata: Bytes) -> Result<Bytes, FetchError> {
        let tx = TransactionRequest::default().to(address).input(calldata.into());

        match tokio::time::timeout(self.request_timeout, self.provider.call(tx)).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => Err(classify(&e)),
            Err(_) => Err(FetchError::Transient(format!(
                "request timed out after {}",
                humantime::format_duration(self.request_timeout)
            ))),
        }
    }
}

/// Splits RPC failures into ones worth retrying and ones that are final.
pub(crate) fn classify(err: &TransportError) -> FetchError {
    match err {
        RpcError::ErrorResp(payload) => {
            let message = payload.message.to_ascii_lowercase();
            if payload.code == 3 || message.contains("revert") {
                FetchError::Permanent(format!("call reverted: {}", payload.message))
            } else if matches!(payload.code, -32601 | -32602) {
                FetchError::Permanent(format!("node rejected call: {}", payload.message))
            } else {
                // rate limits, overloaded nodes, header not found, ...
                FetchError::Transient(format!("RPC error {}: {}", payload.code, payload.message))
            }
        }
        RpcError::Transport(_) | RpcError::NullResp | RpcError::DeserError { .. } => {
            FetchError::Transient(err.to_string())
        }
        _ => FetchError::Permanent(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use alloy::{rpc::json_rpc::ErrorPayload, transports::TransportErrorKind};
    use serde_json::{Value, json};
    use tokio::{
        io::{AsyncReadExt as _, AsyncWriteExt as _},
        net::{TcpListener, TcpStream},
    };

    use super::*;
    use crate::fetch::TokenProperty;

    async fn local_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    /// Minimal node answering every JSON-RPC request with `result`.
    async fn answer_with(listener: TcpListener, result: Value) {
        while let Ok((mut socket, _)) = listener.accept().await {
            let result = result.clone();
            tokio::spawn(async move {
                let Some(body) = read_request(&mut socket).await else {
                    return;
                };
                let id = serde_json::from_slice::<Value>(&body)
                    .ok()
                    .and_then(|request| request.get("id").cloned())
                    .unwrap_or(json!(0));
                let payload = json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }

    /// Reads one HTTP request and returns its body.
    async fn read_request(socket: &mut TcpStream) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = end + 4;
            if buf.len() >= start + len {
                return Some(buf[start..start + len].to_vec());
            }
        }
    }

    fn error_resp(code: i64, message: &'static str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: Cow::Borrowed(message),
            data: None,
        })
    }

    #[test]
    fn explicit_url_wins() {
        let url = resolve_rpc_url(Some("https://flag.example"), Some("https://env.example"));
        assert_eq!(url, "https://flag.example");
    }

    #[test]
    fn configured_url_beats_default() {
        assert_eq!(
            resolve_rpc_url(None, Some("https://env.example")),
            "https://env.example"
        );
        assert_eq!(resolve_rpc_url(Some("  "), Some("https://env.example")), "https://env.example");
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(resolve_rpc_url(None, None), DEFAULT_RPC_URL);
        assert_eq!(resolve_rpc_url(None, Some("")), DEFAULT_RPC_URL);
    }

    #[test]
    fn reverts_are_permanent() {
        let err = classify(&error_resp(3, "execution reverted"));
        assert!(matches!(err, FetchError::Permanent(_)));

        let err = classify(&error_resp(-32000, "Execution Reverted: no data"));
        assert!(matches!(err, FetchError::Permanent(_)));
    }

    #[test]
    fn rate_limits_are_transient() {
        assert!(classify(&error_resp(-32005, "limit exceeded")).is_transient());
        assert!(classify(&error_resp(429, "Too Many Requests")).is_transient());
    }

    #[test]
    fn transport_failures_are_transient() {
        assert!(classify(&TransportErrorKind::custom_str("connection reset")).is_transient());
        assert!(classify(&RpcError::NullResp).is_transient());
    }

    #[test]
    fn malformed_requests_are_permanent() {
        assert!(!classify(&error_resp(-32602, "invalid argument 0")).is_transient());
    }

    #[tokio::test]
    async fn invalid_url_fails_fast() {
        let err = Endpoint::connect_to("not a url", Network::default(), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_reported() {
        let err = Endpoint::connect_to(
            "http://127.0.0.1:1",
            Network::default(),
            Duration::from_secs(5),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ConnectionError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn node_on_expected_chain_connects() {
        let (listener, url) = local_listener().await;
        tokio::spawn(answer_with(listener, json!("0x8f")));

        let endpoint = Endpoint::connect_to(&url, Network::default(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(endpoint.url(), url);
    }

    #[tokio::test]
    async fn node_on_another_chain_is_rejected() {
        let (listener, url) = local_listener().await;
        tokio::spawn(answer_with(listener, json!("0x1")));

        let err = Endpoint::connect_to(&url, Network::default(), Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConnectionError::WrongChain {
                expected: 143,
                actual: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn silent_node_times_out_as_transient() {
        let (listener, url) = local_listener().await;
        tokio::spawn(async move {
            // accept and hold connections without ever replying
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let endpoint = Endpoint {
            provider: ProviderBuilder::new()
                .connect_http(url.parse().unwrap())
                .erased(),
            url,
            request_timeout: Duration::from_millis(200),
        };
        let err = endpoint
            .call(Address::ZERO, TokenProperty::Name.calldata())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(
            err,
            FetchError::Transient("request timed out after 200ms".to_string())
        );
    }
}
