//! Per-connection retry / offline state machine.
//!
//! ```text
//!   Normal ──EnterOffline──▶ Offline ──set_online()──▶ Normal
//!     │                         ▲
//!     └──Cooldown(d)──▶ CoolingDown(now+d) ──(expired, next gate)──▶ Normal
//! ```
//!
//! Every write consults [`SyncConnection::check_gate`] first. State lives
//! behind one async mutex that is only held for the check or update itself,
//! never across a remote call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use cloudseed_core::{RecordId, RemoteError};

use crate::classifier::{classify, RecoveryAction};
use crate::error::SyncError;

/// Externally visible state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Normal,
    CoolingDown { until: Instant },
    Offline,
}

/// Read-only copy of the connection state, for UI and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    pub is_offline: bool,
    pub cooldown_ends_at: Option<Instant>,
}

impl ConnectionSnapshot {
    pub fn status(&self) -> ConnectionStatus {
        if self.is_offline {
            ConnectionStatus::Offline
        } else if let Some(until) = self.cooldown_ends_at {
            ConnectionStatus::CoolingDown { until }
        } else {
            ConnectionStatus::Normal
        }
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.cooldown_ends_at
            .map(|until| until.saturating_duration_since(Instant::now()))
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    is_offline: bool,
    cooldown_ends_at: Option<Instant>,
}

impl ConnectionState {
    /// Drop an expired cooldown. Returns `true` if one was cleared.
    fn expire_cooldown(&mut self, now: Instant) -> bool {
        match self.cooldown_ends_at {
            Some(until) if until <= now => {
                self.cooldown_ends_at = None;
                true
            }
            _ => false,
        }
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            is_offline: self.is_offline,
            cooldown_ends_at: self.cooldown_ends_at,
        }
    }
}

type RecordLocks = std::sync::Mutex<HashMap<RecordId, Arc<Mutex<()>>>>;

struct Shared {
    state: Mutex<ConnectionState>,
    status_tx: watch::Sender<ConnectionStatus>,
    record_locks: Arc<RecordLocks>,
}

/// One logical connection to a remote store.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncConnection {
    shared: Arc<Shared>,
}

impl Default for SyncConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConnection {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Normal);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::default()),
                status_tx,
                record_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
            }),
        }
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let mut state = self.shared.state.lock().await;
        if state.expire_cooldown(Instant::now()) {
            self.publish(&state);
        }
        state.snapshot()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.snapshot().await.status()
    }

    pub async fn is_offline(&self) -> bool {
        self.shared.state.lock().await.is_offline
    }

    /// Watch status transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Connectivity has been restored; leave the offline state.
    pub async fn set_online(&self) {
        let mut state = self.shared.state.lock().await;
        if state.is_offline {
            tracing::info!("connection back online");
        }
        state.is_offline = false;
        state.expire_cooldown(Instant::now());
        self.publish(&state);
    }

    /// Fail with [`SyncError::Offline`] while offline. Cooldowns do not
    /// block reads.
    pub async fn ensure_online(&self) -> Result<(), SyncError> {
        if self.is_offline().await {
            return Err(SyncError::Offline);
        }
        Ok(())
    }

    /// Decide whether a write may contact the store right now.
    pub async fn check_gate(&self) -> Result<(), SyncError> {
        let mut state = self.shared.state.lock().await;
        if state.is_offline {
            return Err(SyncError::Offline);
        }
        let now = Instant::now();
        if state.expire_cooldown(now) {
            tracing::debug!("cooldown expired");
            self.publish(&state);
        }
        if let Some(until) = state.cooldown_ends_at {
            return Err(SyncError::CoolingDown {
                remaining: until.saturating_duration_since(now),
            });
        }
        Ok(())
    }

    /// Classify a failed write, apply any state transition, and return the
    /// error to surface.
    pub async fn record_failure(&self, error: RemoteError) -> SyncError {
        let action = classify(&error);
        match action {
            RecoveryAction::EnterOffline => {
                let mut state = self.shared.state.lock().await;
                if !state.is_offline {
                    tracing::warn!("connection offline after {}", error);
                }
                state.is_offline = true;
                self.publish(&state);
            }
            RecoveryAction::Cooldown(delay) if !delay.is_zero() => {
                let mut state = self.shared.state.lock().await;
                let until = Instant::now() + delay;
                tracing::warn!("rate limited, cooling down for {:?}", delay);
                state.cooldown_ends_at = Some(match state.cooldown_ends_at {
                    Some(existing) if existing > until => existing,
                    _ => until,
                });
                self.publish(&state);
            }
            _ => {}
        }
        action.into_error(error)
    }

    /// Serialize writes to one record. Held for a whole save, including
    /// conflict resolution.
    pub async fn lock_record(&self, id: &RecordId) -> RecordGuard {
        let lock = {
            let mut locks = self
                .shared
                .record_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        RecordGuard {
            id: id.clone(),
            locks: self.shared.record_locks.clone(),
            guard: Some(guard),
        }
    }

    fn publish(&self, state: &ConnectionState) {
        let status = state.snapshot().status();
        self.shared.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    #[cfg(test)]
    pub(crate) fn tracked_record_locks(&self) -> usize {
        self.shared
            .record_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Exclusive claim on one record's write path.
pub struct RecordGuard {
    id: RecordId,
    locks: Arc<RecordLocks>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let idle = locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.id);
        }
    }
}
