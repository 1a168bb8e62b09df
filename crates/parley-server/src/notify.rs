//! Friend-request notification fan-out.
//!
//! Every lifecycle transition pushes the updated record to both
//! participants' status topics.  Fresh subscribers additionally get a full
//! snapshot of their pending traffic, pushed after a short delay so the
//! subscription has settled before the payload arrives.

use std::time::Duration;

use parley_broker::Broker;
use parley_shared::topics::friend_request_status_topic;
use parley_store::FriendRequest;
use serde::Serialize;
use tracing::warn;

use crate::error::ChatError;
use crate::state::Db;

/// Snapshot of a user's pending friend-request traffic.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "friend-request-snapshot", rename_all = "camelCase")]
pub struct RequestSnapshot {
    /// Pending requests addressed to the user.
    pub pending: Vec<FriendRequest>,
    /// Pending requests the user has sent.
    pub sent: Vec<FriendRequest>,
}

#[derive(Clone)]
pub struct Notifier {
    db: Db,
    broker: Broker,
    snapshot_delay: Duration,
}

impl Notifier {
    pub fn new(db: Db, broker: Broker, snapshot_delay: Duration) -> Self {
        Self {
            db,
            broker,
            snapshot_delay,
        }
    }

    /// Build the snapshot for a user (both lists PENDING-only).
    pub async fn snapshot_for(&self, user: &str) -> Result<RequestSnapshot, ChatError> {
        let db = self.db.lock().await;
        let pending = db.pending_requests_to(user)?;
        let sent = db.pending_requests_from(user)?;
        Ok(RequestSnapshot { pending, sent })
    }

    /// Push the snapshot to the user's status topic immediately.
    pub async fn push_snapshot(&self, user: &str) {
        let snapshot = match self.snapshot_for(user).await {
            Ok(s) => s,
            Err(e) => {
                warn!(user = %user, error = %e, "failed to build friend-request snapshot");
                return;
            }
        };

        match serde_json::to_value(&snapshot) {
            Ok(payload) => {
                self.broker
                    .publish(&friend_request_status_topic(user), payload)
                    .await;
            }
            Err(e) => warn!(user = %user, error = %e, "failed to serialize snapshot"),
        }
    }

    /// Push the snapshot after the configured delay.
    ///
    /// Used when a client subscribes to its status topic; the deferred task
    /// gives the subscription time to settle before the payload lands.
    pub fn push_snapshot_later(&self, user: &str) {
        let notifier = self.clone();
        let user = user.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(notifier.snapshot_delay).await;
            notifier.push_snapshot(&user).await;
        });
    }

    /// Publish an updated request record to both participants' status topics.
    pub async fn push_request_update(&self, request: &FriendRequest) {
        let payload = match serde_json::to_value(request) {
            Ok(p) => p,
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "failed to serialize request update");
                return;
            }
        };

        for user in [&request.from_user, &request.to_user] {
            self.broker
                .publish(&friend_request_status_topic(user), payload.clone())
                .await;
        }
    }
}
