//! Access node REST client with timeout and failover.
//!
//! # Responsibilities
//! - Talk to the access API (`/v1/...`) of one or more access nodes
//! - Enforce a deadline on every call
//! - Fall through to failover endpoints on error or timeout

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::chain::envelope::SignedTransaction;
use crate::chain::gateway::ChainGateway;
use crate::chain::types::{
    Account, AccountKey, Address, BlockHeader, ChainConfig, ChainError, ChainEvent, ChainResult,
    TransactionId, TransactionInfo, TransactionResult, TransactionStatus,
};
use crate::observability::metrics;

/// REST gateway over a primary access node plus failovers.
#[derive(Clone)]
pub struct FlowRestGateway {
    endpoints: Vec<Url>,
    http: reqwest::Client,
    timeout_duration: Duration,
    timeout_secs: u64,
}

impl FlowRestGateway {
    pub fn new(config: &ChainConfig) -> ChainResult<Self> {
        let mut endpoints = vec![parse_endpoint(&config.access_api_url)?];

        for url_str in &config.failover_urls {
            match parse_endpoint(url_str) {
                Ok(url) => endpoints.push(url),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover access URL"),
            }
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ChainError::Rpc(format!("HTTP client: {}", e)))?;

        tracing::info!(
            access_api_url = %config.access_api_url,
            failovers = endpoints.len() - 1,
            "Access API client initialized"
        );

        Ok(Self {
            endpoints,
            http,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
            timeout_secs: config.rpc_timeout_secs,
        })
    }

    /// Check if the access API is reachable.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.get_latest_block_header().await.is_ok();
        metrics::record_chain_health(healthy);
        healthy
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ChainResult<T> {
        let mut timed_out = false;
        for (i, base) in self.endpoints.iter().enumerate() {
            let url = base
                .join(path)
                .map_err(|e| ChainError::Rpc(format!("Invalid path '{}': {}", path, e)))?;
            let fut = async {
                let resp = self.http.get(url).query(query).send().await?;
                resp.error_for_status()?.json::<T>().await
            };
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    tracing::warn!(endpoint_idx = i, path, error = %e, "RPC error, trying next endpoint");
                }
                Err(_) => {
                    timed_out = true;
                    tracing::warn!(endpoint_idx = i, path, "RPC timeout, trying next endpoint");
                }
            }
        }
        metrics::record_chain_health(false);
        if timed_out && self.endpoints.len() == 1 {
            return Err(ChainError::Timeout(self.timeout_secs));
        }
        Err(ChainError::Rpc(format!("All access endpoints failed for {}", path)))
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ChainResult<T> {
        for (i, base) in self.endpoints.iter().enumerate() {
            let url = base
                .join(path)
                .map_err(|e| ChainError::Rpc(format!("Invalid path '{}': {}", path, e)))?;
            let fut = async {
                let resp = self.http.post(url).json(body).send().await?;
                resp.error_for_status()?.json::<T>().await
            };
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => tracing::warn!(endpoint_idx = i, path, error = %e, "RPC error"),
                Err(_) => tracing::warn!(endpoint_idx = i, path, "RPC timeout"),
            }
        }
        metrics::record_chain_health(false);
        Err(ChainError::Rpc(format!("All access endpoints failed for {}", path)))
    }
}

fn parse_endpoint(raw: &str) -> ChainResult<Url> {
    // Url::join drops the last path segment unless it ends with '/'.
    let normalized = if raw.ends_with('/') { raw.to_string() } else { format!("{}/", raw) };
    normalized
        .parse()
        .map_err(|e| ChainError::Rpc(format!("Invalid access API URL '{}': {}", raw, e)))
}

#[async_trait]
impl ChainGateway for FlowRestGateway {
    async fn send_transaction(&self, tx: &SignedTransaction) -> ChainResult<TransactionId> {
        let body = SendTransactionRequest::from_signed(tx);
        let resp: SendTransactionResponse = self.post_json("v1/transactions", &body).await?;
        Ok(resp.id)
    }

    async fn get_transaction_result(&self, id: &str) -> ChainResult<TransactionResult> {
        let dto: TransactionResultDto =
            self.get_json(&format!("v1/transaction_results/{}", id), &[]).await?;
        let error_message = Some(dto.error_message).filter(|m| !m.is_empty());
        Ok(TransactionResult { status: TransactionStatus::parse(&dto.status), error_message })
    }

    async fn get_latest_block_header(&self) -> ChainResult<BlockHeader> {
        let blocks: Vec<BlockDto> =
            self.get_json("v1/blocks", &[("height", "sealed".to_string())]).await?;
        let block = blocks
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::Decode("empty block response".into()))?;
        Ok(BlockHeader { id: block.header.id, height: block.header.height })
    }

    async fn get_events_for_height_range(
        &self,
        event_type: &str,
        start_height: u64,
        end_height: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        let query = [
            ("type", event_type.to_string()),
            ("start_height", start_height.to_string()),
            ("end_height", end_height.to_string()),
        ];
        let blocks: Vec<BlockEventsDto> = self.get_json("v1/events", &query).await?;

        let mut events = Vec::new();
        for block in blocks {
            for event in block.events {
                let raw = BASE64
                    .decode(event.payload.as_bytes())
                    .map_err(|e| ChainError::Decode(format!("event payload: {}", e)))?;
                let payload = serde_json::from_slice(&raw)
                    .map_err(|e| ChainError::Decode(format!("event payload: {}", e)))?;
                events.push(ChainEvent {
                    event_type: event.event_type,
                    transaction_id: event.transaction_id,
                    block_height: block.block_height,
                    payload,
                });
            }
        }
        Ok(events)
    }

    async fn get_transaction(&self, id: &str) -> ChainResult<TransactionInfo> {
        let dto: TransactionDto = self.get_json(&format!("v1/transactions/{}", id), &[]).await?;
        let authorizers = dto
            .authorizers
            .iter()
            .map(|a| a.parse())
            .collect::<ChainResult<Vec<Address>>>()?;
        Ok(TransactionInfo { id: dto.id, authorizers })
    }

    async fn get_account(&self, address: &Address) -> ChainResult<Account> {
        let dto: AccountDto = self
            .get_json(&format!("v1/accounts/{}", address.to_hex()), &[("expand", "keys".to_string())])
            .await?;
        let keys = dto
            .keys
            .into_iter()
            .map(|k| AccountKey {
                index: k.index as u32,
                sequence_number: k.sequence_number,
                revoked: k.revoked,
            })
            .collect();
        Ok(Account { address: *address, keys })
    }
}

impl std::fmt::Debug for FlowRestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRestGateway")
            .field("endpoints", &self.endpoints.len())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Integers arrive as decimal strings.
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

#[derive(Debug, Deserialize)]
struct BlockDto {
    header: BlockHeaderDto,
}

#[derive(Debug, Deserialize)]
struct BlockHeaderDto {
    id: String,
    #[serde(deserialize_with = "de_u64")]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct BlockEventsDto {
    #[serde(deserialize_with = "de_u64")]
    block_height: u64,
    #[serde(default)]
    events: Vec<EventDto>,
}

#[derive(Debug, Deserialize)]
struct EventDto {
    #[serde(rename = "type")]
    event_type: String,
    transaction_id: String,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResultDto {
    status: String,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct TransactionDto {
    id: String,
    #[serde(default)]
    authorizers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AccountDto {
    #[serde(default)]
    keys: Vec<AccountKeyDto>,
}

#[derive(Debug, Deserialize)]
struct AccountKeyDto {
    #[serde(deserialize_with = "de_u64")]
    index: u64,
    #[serde(deserialize_with = "de_u64")]
    sequence_number: u64,
    #[serde(default)]
    revoked: bool,
}

#[derive(Debug, Serialize)]
struct ProposalKeyDto {
    address: String,
    key_index: String,
    sequence_number: String,
}

#[derive(Debug, Serialize)]
struct SignatureDto {
    address: String,
    key_index: String,
    signature: String,
}

#[derive(Debug, Serialize)]
struct SendTransactionRequest {
    script: String,
    arguments: Vec<String>,
    reference_block_id: String,
    gas_limit: String,
    payer: String,
    proposal_key: ProposalKeyDto,
    authorizers: Vec<String>,
    payload_signatures: Vec<SignatureDto>,
    envelope_signatures: Vec<SignatureDto>,
}

impl SendTransactionRequest {
    fn from_signed(signed: &SignedTransaction) -> Self {
        let tx = &signed.transaction;
        Self {
            script: BASE64.encode(tx.script.as_bytes()),
            arguments: tx.arguments.iter().map(|a| BASE64.encode(a)).collect(),
            reference_block_id: tx.reference_block_id.clone(),
            gas_limit: tx.gas_limit.to_string(),
            payer: tx.payer.to_hex(),
            proposal_key: ProposalKeyDto {
                address: tx.proposal_key.address.to_hex(),
                key_index: tx.proposal_key.key_index.to_string(),
                sequence_number: tx.proposal_key.sequence_number.to_string(),
            },
            authorizers: tx.authorizers.iter().map(Address::to_hex).collect(),
            payload_signatures: Vec::new(),
            envelope_signatures: signed
                .envelope_signatures
                .iter()
                .map(|s| SignatureDto {
                    address: s.address.to_hex(),
                    key_index: s.key_index.to_string(),
                    signature: BASE64.encode(&s.signature),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendTransactionResponse {
    id: String,
}
