//! # Chain RPC Client
//!
//! JSON-RPC client for the forked-chain environment: standard read/write
//! methods plus the sandbox-only extensions (bulk block advance, time
//! advance, balance injection, mine-with-timestamp). All waits are bounded
//! by the global timeout; the timer losing the race is a failure, never a
//! crash.

use crate::constants::{GLOBAL_TIMEOUT, RECEIPT_POLL_INTERVAL};
use crate::encoding::{parse_hex_u64, to_be_hex};
use crate::error::{SimulatorError, SimulatorResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Parameters for `eth_sendTransaction` against the sandbox
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub data: String,
    pub value: String,
    pub gas: String,
    pub gas_price: String,
}

/// Mined transaction receipt, camelCase per the Ethereum wire format
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub status: Option<String>,
    pub contract_address: Option<String>,
    pub block_number: Option<String>,
}

impl TxReceipt {
    /// Classify as success only when the status flag is exactly the success
    /// value; anything else counts as failed.
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }
}

/// Header fields of the latest block
#[derive(Debug, Clone, Copy)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: u64,
}

/// One entry returned by `eth_getLogs`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub data: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub block_number: Option<String>,
}

/// HTTP JSON-RPC client bound to one environment endpoint
#[derive(Debug)]
pub struct ChainRpcClient {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl ChainRpcClient {
    pub fn new(endpoint: impl Into<String>) -> SimulatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(GLOBAL_TIMEOUT)
            .user_agent(format!("govsim/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one JSON-RPC call; a response-level error object maps to
    /// [`SimulatorError::Rpc`].
    pub async fn call(&self, method: &str, params: Value) -> SimulatorResult<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!(method, "sending JSON-RPC request");

        let response: JsonRpcResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(SimulatorError::rpc_error(
                method,
                format!("{} (code {})", error.message, error.code),
            ));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Submit a transaction and return its hash
    pub async fn send_transaction(&self, tx: &TxRequest) -> SimulatorResult<String> {
        let result = self
            .call("eth_sendTransaction", json!([tx]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SimulatorError::rpc_error("eth_sendTransaction", "No hash in response"))
    }

    /// Fetch a receipt if the transaction has been mined
    pub async fn get_transaction_receipt(
        &self,
        hash: &str,
    ) -> SimulatorResult<Option<TxReceipt>> {
        let result = self
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    /// Poll for a mined receipt, bounded by the global timeout
    pub async fn wait_for_receipt(&self, hash: &str) -> SimulatorResult<TxReceipt> {
        let poll = async {
            loop {
                if let Some(receipt) = self.get_transaction_receipt(hash).await? {
                    return Ok(receipt);
                }
                sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };

        match timeout(GLOBAL_TIMEOUT, poll).await {
            Ok(result) => result,
            Err(_) => Err(SimulatorError::timeout(format!("receipt for {hash}"))),
        }
    }

    pub async fn block_number(&self) -> SimulatorResult<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| SimulatorError::rpc_error("eth_blockNumber", "Non-string result"))?;
        parse_hex_u64(hex)
    }

    /// Latest block number and timestamp
    pub async fn latest_block(&self) -> SimulatorResult<BlockHeader> {
        let result = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;

        let number = result
            .get("number")
            .and_then(Value::as_str)
            .ok_or_else(|| SimulatorError::rpc_error("eth_getBlockByNumber", "Missing number"))?;
        let timestamp = result
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SimulatorError::rpc_error("eth_getBlockByNumber", "Missing timestamp")
            })?;

        Ok(BlockHeader {
            number: parse_hex_u64(number)?,
            timestamp: parse_hex_u64(timestamp)?,
        })
    }

    /// Fetch contract event logs filtered by topic0, scanning from the given
    /// block to the chain head
    pub async fn get_logs(
        &self,
        address: &str,
        topic0: &str,
        from_block: u64,
    ) -> SimulatorResult<Vec<LogEntry>> {
        let filter = json!([{
            "address": address,
            "topics": [topic0],
            "fromBlock": to_be_hex(from_block),
            "toBlock": "latest",
        }]);
        let result = self.call("eth_getLogs", filter).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Sandbox extension: instantly mine the given number of blocks.
    /// The count is hex-encoded; the sandbox rejects decimal here.
    pub async fn increase_blocks(&self, blocks: u64) -> SimulatorResult<()> {
        self.call("evm_increaseBlocks", json!([to_be_hex(blocks)]))
            .await?;
        Ok(())
    }

    /// Sandbox extension: advance wall-clock time by the given seconds
    /// (decimal parameter, unlike the block advance)
    pub async fn increase_time(&self, seconds: u64) -> SimulatorResult<()> {
        self.call("evm_increaseTime", json!([seconds])).await?;
        Ok(())
    }

    /// Sandbox extension: mine a single block stamped with an explicit
    /// timestamp
    pub async fn mine_with_timestamp(&self, timestamp: u64) -> SimulatorResult<()> {
        self.call("evm_mine", json!([timestamp])).await?;
        Ok(())
    }

    /// Sandbox extension: inject balance onto an account. Two method names
    /// exist across sandbox versions; try each in order.
    pub async fn set_balance(&self, address: &str, wei_hex: &str) -> SimulatorResult<()> {
        match self
            .call("tenderly_setBalance", json!([address, wei_hex]))
            .await
        {
            Ok(_) => Ok(()),
            Err(first) => {
                warn!(address, error = %first, "tenderly_setBalance failed, trying tenderly_addBalance");
                self.call("tenderly_addBalance", json!([address, wei_hex]))
                    .await?;
                Ok(())
            }
        }
    }
}

/// Bound an arbitrary future by the global timeout, classifying the timer
/// winning as a failed operation
pub async fn with_global_timeout<T>(
    operation: &str,
    fut: impl std::future::Future<Output = SimulatorResult<T>>,
) -> SimulatorResult<T> {
    match timeout(GLOBAL_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(SimulatorError::timeout(operation.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rpc_result(result: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"jsonrpc":"2.0","id":1,"result":{result}}}"#
        ))
    }

    fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"jsonrpc":"2.0","id":1,"error":{{"code":{code},"message":"{message}"}}}}"#
        ))
    }

    #[tokio::test]
    async fn block_number_parses_hex_quantity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("eth_blockNumber"))
            .respond_with(rpc_result(r#""0x64""#))
            .mount(&server)
            .await;

        let client = ChainRpcClient::new(server.uri()).unwrap();
        assert_eq!(client.block_number().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn rpc_error_object_maps_to_rpc_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_error(-32601, "Method not found"))
            .mount(&server)
            .await;

        let client = ChainRpcClient::new(server.uri()).unwrap();
        let err = client.increase_time(86400).await.unwrap_err();
        assert!(matches!(err, SimulatorError::Rpc { .. }));
        assert!(err.to_string().contains("Method not found"));
    }

    #[tokio::test]
    async fn null_receipt_means_not_yet_mined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_result("null"))
            .mount(&server)
            .await;

        let client = ChainRpcClient::new(server.uri()).unwrap();
        assert!(client
            .get_transaction_receipt("0xabc")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn set_balance_falls_back_to_second_method_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("tenderly_setBalance"))
            .respond_with(rpc_error(-32601, "unknown method"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("tenderly_addBalance"))
            .respond_with(rpc_result(r#""0x0""#))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChainRpcClient::new(server.uri()).unwrap();
        client
            .set_balance("0x4F6F977aCDD1177DCD81aB83074855EcB9C2D49e", "0x1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn receipt_status_classification_is_exact() {
        let success = TxReceipt {
            status: Some("0x1".into()),
            contract_address: None,
            block_number: None,
        };
        let failed = TxReceipt {
            status: Some("0x0".into()),
            contract_address: None,
            block_number: None,
        };
        let missing = TxReceipt {
            status: None,
            contract_address: None,
            block_number: None,
        };
        assert!(success.succeeded());
        assert!(!failed.succeeded());
        assert!(!missing.succeeded());
    }
}
