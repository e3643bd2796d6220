use std::future::IntoFuture;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::sol;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tokio::time::timeout;

use crate::chain::{ChainClient, ChainError};
use crate::types::TokenMetadata;

// ERC-20 read-only ABI
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }
}

type HttpProvider = RootProvider<Http<Client>>;

/// ERC20 reader for one EVM chain over JSON-RPC.
pub struct EvmChainClient {
    provider: HttpProvider,
    request_timeout: Duration,
}

impl EvmChainClient {
    /// Builds the provider once; it is reused for every call on this chain.
    pub fn new(rpc_url: &str, request_timeout: Duration) -> Result<Self, ChainError> {
        let url = rpc_url
            .parse()
            .map_err(|e| ChainError::Transport(format!("invalid rpc url {rpc_url}: {e}")))?;

        Ok(Self {
            provider: ProviderBuilder::new().on_http(url),
            request_timeout,
        })
    }

    async fn bounded<F, T>(&self, call: F) -> Result<T, ChainError>
    where
        F: IntoFuture<Output = Result<T, alloy::contract::Error>>,
    {
        match timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(ChainError::Timeout(self.request_timeout)),
        }
    }
}

fn parse_address(address: &str) -> Result<Address, ChainError> {
    address
        .parse()
        .map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

fn classify(err: alloy::contract::Error) -> ChainError {
    use alloy::contract::Error;

    match err {
        Error::TransportError(e) if e.is_error_resp() => ChainError::ContractCall(e.to_string()),
        Error::TransportError(e) => ChainError::Transport(e.to_string()),
        err @ Error::AbiError(_) => ChainError::Decode(err.to_string()),
        other => ChainError::ContractCall(other.to_string()),
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn get_raw_balance(&self, token: &str, owner: &str) -> Result<U256, ChainError> {
        let token_addr = parse_address(token)?;
        let owner_addr = parse_address(owner)?;

        let contract = IERC20::new(token_addr, self.provider.clone());
        let call = contract.balanceOf(owner_addr);
        let balance = self.bounded(call.call()).await?;

        Ok(balance._0)
    }

    async fn get_token_metadata(&self, token: &str) -> Result<TokenMetadata, ChainError> {
        let token_addr = parse_address(token)?;
        let contract = IERC20::new(token_addr, self.provider.clone());

        let symbol_call = contract.symbol();
        let name_call = contract.name();
        let decimals_call = contract.decimals();

        let (symbol, name, decimals) = tokio::try_join!(
            self.bounded(symbol_call.call()),
            self.bounded(name_call.call()),
            self.bounded(decimals_call.call()),
        )?;

        Ok(TokenMetadata {
            symbol: symbol._0,
            name: name._0,
            decimals: decimals._0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::transports::TransportErrorKind;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const HOLDER: &str = "0x28C6c06298d514Db089934071355E5743bf21d60";

    /// Answers every JSON-RPC call with `payload`, echoing the request id.
    struct JsonRpcReply(Value);

    impl Respond for JsonRpcReply {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let id = serde_json::from_slice::<Value>(&request.body)
                .ok()
                .and_then(|body| body.get("id").cloned())
                .unwrap_or(Value::Null);

            let mut payload = self.0.clone();
            payload["jsonrpc"] = json!("2.0");
            payload["id"] = id;
            ResponseTemplate::new(200).set_body_json(payload)
        }
    }

    async fn stub_node(payload: Value) -> (MockServer, EvmChainClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(JsonRpcReply(payload))
            .mount(&server)
            .await;

        let client = EvmChainClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        (server, client)
    }

    fn client() -> EvmChainClient {
        EvmChainClient::new("https://ethereum-rpc.publicnode.com", Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_rejects_malformed_rpc_url() {
        let result = EvmChainClient::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(ChainError::Transport(_))));
    }

    #[tokio::test]
    async fn test_invalid_addresses_fail_before_any_request() {
        let client = client();

        let result = client.get_raw_balance("0xnothex", USDC).await;
        assert!(matches!(result, Err(ChainError::InvalidAddress(a)) if a == "0xnothex"));

        let result = client.get_token_metadata("0x1234").await;
        assert!(matches!(result, Err(ChainError::InvalidAddress(_))));
    }

    #[test]
    fn test_connectivity_failures_classify_as_transport() {
        let err = alloy::contract::Error::TransportError(TransportErrorKind::custom_str(
            "connection refused",
        ));
        assert!(matches!(classify(err), ChainError::Transport(_)));
    }

    #[tokio::test]
    async fn test_empty_call_result_is_decode_error() {
        let (_server, client) = stub_node(json!({ "result": "0x" })).await;

        let result = client.get_raw_balance(USDC, HOLDER).await;
        assert!(matches!(result, Err(ChainError::Decode(_))), "{result:?}");

        let result = client.get_token_metadata(USDC).await;
        assert!(matches!(result, Err(ChainError::Decode(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_reverted_call_is_contract_call_error() {
        let (_server, client) = stub_node(json!({
            "error": { "code": 3, "message": "execution reverted" }
        }))
        .await;

        let result = client.get_raw_balance(USDC, HOLDER).await;
        assert!(
            matches!(&result, Err(ChainError::ContractCall(msg)) if msg.contains("execution reverted")),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn test_balance_decodes_from_node_reply() {
        // 1_500_000 as a 32-byte word
        let word = format!("0x{:064x}", 1_500_000u64);
        let (_server, client) = stub_node(json!({ "result": word })).await;

        let balance = client.get_raw_balance(USDC, HOLDER).await.unwrap();
        assert_eq!(balance, U256::from(1_500_000u64));
    }

    #[tokio::test]
    async fn test_unresponsive_node_times_out() {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let request_timeout = Duration::from_millis(200);
        let client = EvmChainClient::new(&format!("http://{addr}"), request_timeout).unwrap();

        let started = std::time::Instant::now();
        let result = client.get_raw_balance(USDC, HOLDER).await;
        assert!(
            matches!(result, Err(ChainError::Timeout(d)) if d == request_timeout),
            "{result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(2));

        let result = client.get_token_metadata(USDC).await;
        assert!(matches!(result, Err(ChainError::Timeout(_))), "{result:?}");

        silent.abort();
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_mainnet_usdc_metadata_and_balance() {
        let client = client();

        let metadata = client.get_token_metadata(USDC).await.unwrap();
        assert_eq!(metadata.symbol, "USDC");
        assert_eq!(metadata.decimals, 6);

        assert!(client.get_raw_balance(USDC, USDC).await.is_ok());
    }
}
