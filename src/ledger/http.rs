//! JSON-RPC ledger client
//!
//! Talks to a full or light node exposing agent state over JSON-RPC 2.0.
//! Every collaborator call is a single POST; nothing is cached here.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

use super::{AgentDirectory, LedgerError, PriceFeedRefresher, StateOracle};
use crate::curve::{CurveParams, CurveState};

// ============================================
// RPC ENVELOPE
// ============================================

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Error code nodes use for a failed getter evaluation
const GETTER_FAILED_CODE: i64 = -32010;

/// Error code nodes use for an unknown agent
const NOT_FOUND_CODE: i64 = -32004;

// ============================================
// CLIENT
// ============================================

pub struct HttpLedgerClient {
    http_client: Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpLedgerClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<Option<Value>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("rpc #{} {} {}", id, method, params);

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response: RpcResponse = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(match error.code {
                NOT_FOUND_CODE => LedgerError::NotFound(error.message),
                _ => LedgerError::Rpc {
                    code: error.code,
                    message: error.message,
                },
            });
        }

        Ok(response.result)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let result = self
            .call_raw(method, params)
            .await?
            .ok_or_else(|| LedgerError::Decode(format!("{} returned no result", method)))?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl StateOracle for HttpLedgerClient {
    async fn read_params(&self, agent: &str) -> Result<CurveParams, LedgerError> {
        self.call("agent.params", json!({ "address": agent })).await
    }

    async fn execute_getter(
        &self,
        agent: &str,
        getter: &str,
        args: &[Value],
    ) -> Result<Value, LedgerError> {
        let params = json!({
            "address": agent,
            "getter": getter,
            "args": args,
            "state": "pending",
        });

        match self.call_raw("agent.execute_getter", params).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Ok(Value::Null),
            Err(LedgerError::Rpc { code, message }) if code == GETTER_FAILED_CODE => {
                Err(LedgerError::Getter {
                    getter: getter.to_string(),
                    reason: message,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn pending_state_vars(&self, agent: &str) -> Result<CurveState, LedgerError> {
        self.call("agent.pending_state", json!({ "address": agent })).await
    }

    async fn track(&self, agent: &str) -> Result<(), LedgerError> {
        self.call_raw("agent.follow", json!({ "address": agent })).await?;
        Ok(())
    }

    async fn read_state_var(&self, agent: &str, var: &str) -> Result<Option<Value>, LedgerError> {
        let result = self
            .call_raw("agent.state_var", json!({ "address": agent, "var": var }))
            .await?;
        Ok(result.filter(|v| !v.is_null()))
    }
}

#[async_trait]
impl AgentDirectory for HttpLedgerClient {
    async fn agents_by_templates(&self, templates: &[String]) -> Result<Vec<String>, LedgerError> {
        if templates.is_empty() {
            return Ok(Vec::new());
        }
        self.call("agents.by_templates", json!({ "templates": templates })).await
    }

    async fn watch_template(&self, template: &str) -> Result<(), LedgerError> {
        self.call_raw("agents.watch_template", json!({ "template": template }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PriceFeedRefresher for HttpLedgerClient {
    async fn pull(&self, oracle: &str, feed_name: &str, force: bool) -> Result<bool, LedgerError> {
        let params = json!({
            "oracle": oracle,
            "feed_name": feed_name,
            "force": force,
        });
        let result = self.call_raw("feed.refresh", params).await?;
        Ok(result.and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "agent.params",
            params: json!({ "address": "AGENT" }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["params"]["address"], "AGENT");
    }

    #[test]
    fn test_error_response_decodes() {
        let response: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": GETTER_FAILED_CODE, "message": "bailed out" }
        }))
        .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, GETTER_FAILED_CODE);
        assert!(response.result.is_none());
    }

    #[test]
    fn test_client_builds() {
        let client = HttpLedgerClient::new("http://localhost:6611", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url(), "http://localhost:6611");
    }
}
