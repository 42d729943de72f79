//! In-memory file-transfer audit journal with optional webhook delivery.
//!
//! Every stream interception request against a tunnel is recorded here,
//! whether or not the transfer itself succeeds.
//!
//! ## Design
//!
//! - **Ring buffer**: `VecDeque<TransferEvent>` capped at `max_entries`.
//!   Old entries are silently dropped when the buffer is full. A cap of 0
//!   disables the journal: events still get ids and reach the webhook, but
//!   nothing is kept for [`TransferLog::read_since`].
//! - **Monotonic IDs**: each entry gets a unique, always-increasing `id` so
//!   readers can ask for "everything since ID N" without gaps.
//! - **Webhook**: when configured, each event is POSTed as JSON from a
//!   spawned task. Delivery is fire-and-forget; failures are logged and never
//!   affect the request that produced the event.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::util::epoch_millis;

/// One intercepted stream request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub id: u64,
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub url: String,
    pub method: String,
    pub tunnel_id: Uuid,
    pub stream_index: u32,
    pub filename: String,
    pub media_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<String>,
    pub username: String,
}

/// Fields supplied by the caller; id and timestamp are assigned on record.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub url: String,
    pub method: String,
    pub tunnel_id: Uuid,
    pub stream_index: u32,
    pub filename: String,
    pub media_type: String,
    pub content_length: Option<String>,
    pub username: String,
}

struct Webhook {
    url: String,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

/// Ring buffer of transfer events.
pub struct TransferLog {
    entries: RwLock<VecDeque<TransferEvent>>,
    next_id: AtomicU64,
    max_entries: usize,
    webhook: Option<Webhook>,
}

impl TransferLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries)),
            next_id: AtomicU64::new(1),
            max_entries,
            webhook: None,
        }
    }

    /// Also POST every event to `url`. Must be called inside a tokio runtime
    /// before the first [`Self::record`].
    pub fn with_webhook(mut self, url: String, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        self.webhook = Some(Webhook {
            url,
            timeout,
            client,
        });
        self
    }

    /// Append an event and return its ID.
    pub async fn record(&self, record: TransferRecord) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let event = TransferEvent {
            id,
            timestamp: epoch_millis(SystemTime::now()),
            url: record.url,
            method: record.method,
            tunnel_id: record.tunnel_id,
            stream_index: record.stream_index,
            filename: record.filename,
            media_type: record.media_type,
            content_length: record.content_length,
            username: record.username,
        };

        if let Some(ref webhook) = self.webhook {
            self.deliver(webhook, &event);
        }

        if self.max_entries == 0 {
            return id;
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(event);

        id
    }

    fn deliver(&self, webhook: &Webhook, event: &TransferEvent) {
        let body = match serde_json::to_vec(event) {
            Ok(b) => b,
            Err(e) => {
                warn!(id = event.id, "Failed to encode transfer event: {e}");
                return;
            }
        };
        let request = match hyper::Request::post(&webhook.url)
            .header("content-type", "application/json; charset=UTF-8")
            .body(Full::new(Bytes::from(body)))
        {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %webhook.url, "Invalid audit webhook request: {e}");
                return;
            }
        };

        let client = webhook.client.clone();
        let timeout = webhook.timeout;
        let id = event.id;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, client.request(request)).await {
                Ok(Ok(resp)) if resp.status().is_success() => {
                    debug!(id, "Transfer event delivered");
                }
                Ok(Ok(resp)) => warn!(id, status = %resp.status(), "Audit webhook rejected event"),
                Ok(Err(e)) => warn!(id, "Audit webhook request failed: {e}"),
                Err(_) => warn!(id, "Audit webhook timed out"),
            }
        });
    }

    /// Entries with `id > since_id`, oldest first, up to `limit`.
    pub async fn read_since(&self, since_id: u64, limit: usize) -> Vec<TransferEvent> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.id > since_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
