use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Live sessions by connection time. Each session's cancellation token is a
/// child of one server-wide shutdown token.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
    shutdown: CancellationToken,
}

/// Membership in the registry. Dropping it cancels the session and removes
/// it from the registry.
pub struct SessionTicket {
    id: Uuid,
    cancel: CancellationToken,
    registry: SessionRegistry,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn register(&self) -> SessionTicket {
        let id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        self.lock().insert(id, Utc::now());
        SessionTicket {
            id,
            cancel,
            registry: self.clone(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Cancels every current session; sessions registered afterwards start
    /// out cancelled.
    pub fn cancel_all(&self) {
        log_info!("cancelling {} session(s)", self.active_count());
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn release(&self, id: &Uuid) {
        if let Some(connected_at) = self.lock().remove(id) {
            log_debug!(
                "session {} released after {}s",
                id,
                (Utc::now() - connected_at).num_seconds()
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, DateTime<Utc>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.release(&self.id);
    }
}
