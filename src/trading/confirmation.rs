//! Registry of trades waiting for operator approval.
//!
//! Each request moves `Pending -> Confirmed | Cancelled | TimedOut` exactly
//! once. The first transition removes the entry, so a later `resolve` on the
//! same id fails with [`ConfirmationError::NotFound`]. The waiter is woken
//! through a oneshot channel; a resolution that lands while the timeout fires
//! still wins, because the timeout path only claims entries that are still
//! pending.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ConfirmationError;
use crate::models::{ConfirmationState, PendingConfirmation, TradeInfo};

struct PendingEntry {
    confirmation: PendingConfirmation,
    decision: oneshot::Sender<bool>,
}

#[derive(Default)]
struct RegistryState {
    pending: HashMap<String, PendingEntry>,
    // Receivers parked until the engine starts waiting. A decision sent
    // before `await_resolution` is called stays buffered in the channel.
    waiters: HashMap<String, oneshot::Receiver<bool>>,
}

/// Pending approval requests, shared between the execution round and the
/// approval listener.
#[derive(Default)]
pub struct ConfirmationRegistry {
    state: Mutex<RegistryState>,
}

impl ConfirmationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trade for approval and return its id.
    pub async fn register(&self, strategy_name: &str, trade_info: TradeInfo) -> String {
        let mut state = self.state.lock().await;

        let mut trade_id = Uuid::new_v4().simple().to_string();
        while state.pending.contains_key(&trade_id) || state.waiters.contains_key(&trade_id) {
            trade_id = Uuid::new_v4().simple().to_string();
        }

        let (tx, rx) = oneshot::channel();
        let confirmation = PendingConfirmation {
            trade_id: trade_id.clone(),
            strategy_name: strategy_name.to_string(),
            trade_info,
            state: ConfirmationState::Pending,
            created_at: Utc::now(),
        };
        state.pending.insert(
            trade_id.clone(),
            PendingEntry {
                confirmation,
                decision: tx,
            },
        );
        state.waiters.insert(trade_id.clone(), rx);

        debug!(strategy = %strategy_name, trade_id = %trade_id, "Trade awaiting confirmation");
        trade_id
    }

    /// Record the operator's decision. Only the first resolution of an id is
    /// honored.
    pub async fn resolve(&self, trade_id: &str, approved: bool) -> Result<ConfirmationState, ConfirmationError> {
        let entry = {
            let mut state = self.state.lock().await;
            let entry = state.pending.remove(trade_id);
            // Send while holding the lock so a timing-out waiter that finds
            // the entry gone always finds the decision in its channel.
            entry.map(|entry| {
                let _ = entry.decision.send(approved);
                entry.confirmation
            })
        };

        let Some(confirmation) = entry else {
            warn!(trade_id = %trade_id, approved, "Resolution for unknown or finished trade ignored");
            return Err(ConfirmationError::NotFound {
                trade_id: trade_id.to_string(),
            });
        };

        let outcome = if approved {
            ConfirmationState::Confirmed
        } else {
            ConfirmationState::Cancelled
        };
        info!(
            strategy = %confirmation.strategy_name,
            trade_id = %trade_id,
            outcome = ?outcome,
            "Trade resolved"
        );
        Ok(outcome)
    }

    /// Wait until the trade is resolved or `timeout` elapses.
    ///
    /// On timeout the entry is removed and `TimedOut` returned, unless a
    /// resolution claimed it first.
    pub async fn await_resolution(
        &self,
        trade_id: &str,
        timeout: Duration,
    ) -> Result<ConfirmationState, ConfirmationError> {
        let mut rx = {
            let mut state = self.state.lock().await;
            state
                .waiters
                .remove(trade_id)
                .ok_or_else(|| ConfirmationError::NotFound {
                    trade_id: trade_id.to_string(),
                })?
        };

        let decided = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(approved)) => Some(approved),
            Ok(Err(_)) => None,
            Err(_) => {
                let claimed = {
                    let mut state = self.state.lock().await;
                    state.pending.remove(trade_id).is_some()
                };
                if claimed {
                    None
                } else {
                    // Resolved between the timer firing and the lock.
                    rx.try_recv().ok()
                }
            }
        };

        let outcome = match decided {
            Some(true) => ConfirmationState::Confirmed,
            Some(false) => ConfirmationState::Cancelled,
            None => {
                self.state.lock().await.pending.remove(trade_id);
                warn!(trade_id = %trade_id, timeout_secs = timeout.as_secs(), "Trade confirmation timed out");
                ConfirmationState::TimedOut
            }
        };

        Ok(outcome)
    }

    /// Look up a pending request.
    pub async fn get(&self, trade_id: &str) -> Option<PendingConfirmation> {
        let state = self.state.lock().await;
        state.pending.get(trade_id).map(|e| e.confirmation.clone())
    }

    /// All requests still waiting, oldest first.
    pub async fn pending(&self) -> Vec<PendingConfirmation> {
        let state = self.state.lock().await;
        let mut pending: Vec<_> = state.pending.values().map(|e| e.confirmation.clone()).collect();
        pending.sort_by_key(|c| c.created_at);
        pending
    }
}
