// =============================================================================
// Solana RPC Client — JSON-RPC 2.0 over the resilient client
// =============================================================================
//
// Batched fetches (one `getTransaction` per signature) pace themselves
// independently of the retry loop: a fixed delay before every item and a
// longer one between batches.  A failed item is logged and skipped; it never
// aborts the batch.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::transaction::{whale_transfers_in, TransactionInfo};
use crate::client::{
    is_rate_limit_message, ClientError, Endpoint, EndpointPool, HttpMethod, HttpRequest,
    RequestEnvelope, ResilientClient, RetryPolicy, Transport, WireFormat,
};

/// The system program touches almost every transaction; its signature list is
/// a cheap proxy for "recent network activity".
const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";

/// Upper bound on signatures pulled per sample.
const MAX_SAMPLE_SIGNATURES: usize = 25;

// -----------------------------------------------------------------------------
// Wire format
// -----------------------------------------------------------------------------

/// `{"jsonrpc":"2.0","id":<uuid>,"method":...,"params":[...]}` POSTed to the
/// endpoint root.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRpcFormat;

impl WireFormat for JsonRpcFormat {
    type Params = Value;

    fn encode(
        &self,
        endpoint: &Endpoint,
        envelope: &RequestEnvelope<'_, Value>,
    ) -> Result<HttpRequest, ClientError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: endpoint.url().to_string(),
            headers: Vec::new(),
            body: Some(json!({
                "jsonrpc": "2.0",
                "id": envelope.id.to_string(),
                "method": envelope.method,
                "params": envelope.params,
            })),
        })
    }

    fn decode(&self, endpoint: &Endpoint, mut body: Value) -> Result<Value, ClientError> {
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let message = error["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            let code = error["code"].as_i64();
            // -32429 is the de-facto "too many requests" code on public RPC nodes.
            if code == Some(-32429) || is_rate_limit_message(&message) {
                return Err(ClientError::RateLimited {
                    endpoint: endpoint.url().to_string(),
                    message,
                    retry_after: None,
                });
            }
            return Err(ClientError::Upstream {
                endpoint: endpoint.url().to_string(),
                status: None,
                message: match code {
                    Some(c) => format!("RPC error {c}: {message}"),
                    None => format!("RPC error: {message}"),
                },
            });
        }

        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(ClientError::Upstream {
                endpoint: endpoint.url().to_string(),
                status: None,
                message: "response has neither result nor error".into(),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// Pacing
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub batch_size: usize,
    pub item_delay: Duration,
    pub batch_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            batch_size: 5,
            item_delay: Duration::from_millis(200),
            batch_delay: Duration::from_secs(1),
        }
    }
}

// -----------------------------------------------------------------------------
// Client
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
}

pub struct ChainClient {
    inner: ResilientClient<JsonRpcFormat>,
    pacing: Pacing,
}

impl ChainClient {
    pub fn new(
        pool: EndpointPool,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
        pacing: Pacing,
    ) -> Self {
        debug!(endpoints = pool.len(), "chain client initialised");
        Self {
            inner: ResilientClient::new("solana-rpc", pool, policy, JsonRpcFormat, transport),
            pacing,
        }
    }

    /// Raw JSON-RPC call.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        self.inner.call(method, &params).await
    }

    /// getSignaturesForAddress, newest first.
    #[instrument(skip(self), name = "chain::signatures_for_address")]
    pub async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ClientError> {
        let result = self
            .call("getSignaturesForAddress", json!([address, { "limit": limit }]))
            .await?;
        let rows = result.as_array().map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(SignatureInfo {
                    signature: row["signature"].as_str()?.to_string(),
                    slot: row["slot"].as_u64().unwrap_or(0),
                    block_time: row["blockTime"].as_i64(),
                    failed: row.get("err").is_some_and(|e| !e.is_null()),
                })
            })
            .collect())
    }

    /// getTransaction with `jsonParsed` encoding.  `None` when the node does
    /// not (yet) know the signature.
    #[instrument(skip(self), name = "chain::transaction")]
    pub async fn transaction(&self, signature: &str) -> Result<Option<TransactionInfo>, ClientError> {
        let result = self
            .call(
                "getTransaction",
                json!([signature, { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }]),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(TransactionInfo::from_rpc(signature, &result)))
    }

    /// Recent network transactions, fetched one by one under the pacing
    /// schedule.  Individual failures are skipped.
    #[instrument(skip(self), name = "chain::recent_transactions")]
    pub async fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionInfo>, ClientError> {
        let wanted = limit.min(MAX_SAMPLE_SIGNATURES);
        let signatures = self.signatures_for_address(SYSTEM_PROGRAM, wanted).await?;
        if signatures.is_empty() {
            warn!("no recent signatures returned");
            return Ok(Vec::new());
        }

        let batch_size = self.pacing.batch_size.max(1);
        let mut transactions = Vec::with_capacity(signatures.len());

        for (batch_no, batch) in signatures.chunks(batch_size).enumerate() {
            if batch_no > 0 {
                tokio::time::sleep(self.pacing.batch_delay).await;
            }
            for sig in batch {
                tokio::time::sleep(self.pacing.item_delay).await;
                match self.transaction(&sig.signature).await {
                    Ok(Some(tx)) => transactions.push(tx),
                    Ok(None) => {
                        warn!(signature = %sig.signature, "transaction not found, skipping");
                    }
                    Err(e) => {
                        warn!(signature = %sig.signature, error = %e, "transaction fetch failed, skipping");
                    }
                }
            }
        }

        info!(fetched = transactions.len(), requested = signatures.len(), "recent transactions fetched");
        Ok(transactions)
    }

    /// Transactions per second from the latest performance sample.
    #[instrument(skip(self), name = "chain::tps")]
    pub async fn tps(&self) -> Result<f64, ClientError> {
        let result = self.call("getRecentPerformanceSamples", json!([1])).await?;
        let Some(sample) = result.as_array().and_then(|s| s.first()) else {
            return Ok(0.0);
        };
        let count = sample["numTransactions"].as_f64().unwrap_or(0.0);
        let period = sample["samplePeriodSecs"].as_f64().unwrap_or(1.0).max(1.0);
        Ok(count / period)
    }

    /// Successful transfers of at least `threshold_sol` in the recent sample.
    pub async fn whale_transfers(&self, threshold_sol: u64) -> Result<Vec<TransactionInfo>, ClientError> {
        let sample = self.recent_transactions(MAX_SAMPLE_SIGNATURES).await?;
        Ok(whale_transfers_in(&sample, threshold_sol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::resilient::tests::ScriptedTransport;
    use tokio::time::Instant;

    fn chain(transport: Arc<ScriptedTransport>) -> ChainClient {
        ChainClient::new(
            EndpointPool::new(["https://rpc-a", "https://rpc-b"]).unwrap(),
            RetryPolicy::default(),
            transport,
            Pacing::default(),
        )
    }

    fn rpc_ok(result: Value) -> String {
        json!({"jsonrpc": "2.0", "id": "x", "result": result}).to_string()
    }

    #[tokio::test]
    async fn envelope_carries_unique_id_per_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond(200, r#"{"jsonrpc":"2.0","id":"1","error":{"code":429,"message":"Too many requests for a specific RPC call"}}"#)
            .respond(200, &rpc_ok(json!(42)));
        let client = chain(transport.clone());

        let value = client.call("getSlot", json!([])).await.unwrap();
        assert_eq!(value, json!(42));

        let requests = transport.requests.lock();
        let ids: Vec<&str> = requests
            .iter()
            .map(|r| r.body.as_ref().unwrap()["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(requests[1].url, "https://rpc-b");
        let body = requests[0].body.as_ref().unwrap();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "getSlot");
    }

    #[tokio::test]
    async fn rpc_error_is_upstream_and_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            200,
            r#"{"jsonrpc":"2.0","id":"1","error":{"code":-32602,"message":"Invalid param: WrongSize"}}"#,
        );
        let client = chain(transport.clone());

        let err = client.call("getTransaction", json!(["bad"])).await.unwrap_err();
        assert!(matches!(err, ClientError::Upstream { status: None, .. }));
        assert!(err.to_string().contains("-32602"));
        assert_eq!(transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn tps_divides_by_sample_period() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            200,
            &rpc_ok(json!([{"numTransactions": 126000, "samplePeriodSecs": 60, "slot": 1}])),
        );
        let client = chain(transport);
        assert!((client.tps().await.unwrap() - 2100.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_transactions_are_paced_and_skip_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        let sigs: Vec<Value> = (0..7)
            .map(|i| json!({"signature": format!("s{i}"), "slot": i, "err": null}))
            .collect();
        transport.respond(200, &rpc_ok(Value::Array(sigs)));
        for i in 0..7 {
            if i == 2 {
                // Non-retryable error for one item: skipped, batch goes on.
                transport.respond(
                    200,
                    r#"{"jsonrpc":"2.0","id":"1","error":{"code":-32009,"message":"slot skipped"}}"#,
                );
            } else if i == 4 {
                transport.respond(200, &rpc_ok(Value::Null));
            } else {
                transport.respond(
                    200,
                    &rpc_ok(json!({"slot": i, "meta": {"fee": 5000, "err": null},
                        "transaction": {"message": {"instructions": []}}})),
                );
            }
        }
        let client = chain(transport.clone());

        let started = Instant::now();
        let txs = client.recent_transactions(100).await.unwrap();

        assert_eq!(txs.len(), 5);
        assert_eq!(txs[0].signature, "s0");
        // 7 item delays of 200 ms plus one batch gap of 1 s.
        assert_eq!(started.elapsed(), Duration::from_millis(7 * 200 + 1000));

        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 8);
        // The batch boundary sits between the 5th and 6th item.
        assert_eq!(calls[6].1 - calls[5].1, Duration::from_millis(1200));
        assert_eq!(calls[2].1 - calls[1].1, Duration::from_millis(200));
    }

    #[tokio::test]
    async fn signature_request_is_capped() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(200, &rpc_ok(json!([])));
        let client = chain(transport.clone());

        let txs = client.recent_transactions(100).await.unwrap();
        assert!(txs.is_empty());
        let requests = transport.requests.lock();
        assert_eq!(requests[0].body.as_ref().unwrap()["params"][1]["limit"], 25);
    }
}
