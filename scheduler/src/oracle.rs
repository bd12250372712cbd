//! Gas-price oracles.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::OracleError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Current network gas price, in wei.
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_price(&self) -> Result<u128, OracleError>;
}

/// A constant price. Useful when the substrate is in-process.
pub struct FixedGasOracle {
    price: u128,
}

impl FixedGasOracle {
    pub fn new(price: u128) -> Self {
        Self { price }
    }
}

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn gas_price(&self) -> Result<u128, OracleError> {
        Ok(self.price)
    }
}

/// Queries `eth_gasPrice` on a JSON-RPC endpoint.
pub struct RpcGasOracle {
    http_client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcGasOracle {
    pub fn new(url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            url: url.into(),
        }
    }
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex).
pub fn parse_quantity(raw: &str) -> Result<u128, OracleError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| OracleError::InvalidResponse(format!("quantity {raw:?} lacks 0x prefix")))?;
    if digits.is_empty() {
        return Err(OracleError::InvalidResponse("empty quantity".into()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| OracleError::InvalidResponse(format!("quantity {raw:?}: {e}")))
}

#[async_trait]
impl GasOracle for RpcGasOracle {
    async fn gas_price(&self) -> Result<u128, OracleError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_gasPrice",
            "params": [],
        });
        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Unreachable(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    OracleError::Unreachable(format!("connection failed: {e}"))
                } else {
                    OracleError::Unreachable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(OracleError::Unreachable(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        if let Some(err) = rpc.error {
            return Err(OracleError::InvalidResponse(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }
        let result = rpc
            .result
            .ok_or_else(|| OracleError::InvalidResponse("missing result".into()))?;
        parse_quantity(&result)
    }
}
