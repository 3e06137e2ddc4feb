use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, trace};

use crate::auth::Role;

/// Default capacity of the session event channel
pub const SESSION_EVENT_CAPACITY: usize = 64;

/// Why a session was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    /// The user asked to log out
    Logout,
    /// The refresh token was rejected with a 401
    RefreshRejected,
}

/// What happened to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    /// A fresh token pair was stored after a login
    LoggedIn,
    /// The token pair was replaced by a refresh
    TokensRefreshed,
    /// Tokens and cached profile were removed
    SessionCleared { reason: ClearReason },
}

/// Event emitted by a session manager whenever its session changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub role: Role,
    pub kind: SessionEventKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SessionEvent {
    pub fn new(role: Role, kind: SessionEventKind) -> Self {
        Self {
            role,
            kind,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Whether this event ends the session
    pub fn is_cleared(&self) -> bool {
        matches!(self.kind, SessionEventKind::SessionCleared { .. })
    }
}

/// Statistics about event bus activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Number of events delivered to at least one subscriber
    pub events_published: u64,
    /// Number of events dropped (no receivers)
    pub events_dropped: u64,
    /// Count of events by role
    pub role_counts: HashMap<Role, u64>,
}

/// Broadcast bus that replaces polling for session validity
pub struct SessionEventBus {
    /// The broadcast channel sender
    sender: broadcast::Sender<SessionEvent>,
    /// Configured capacity of the channel
    capacity: usize,
    /// Statistics about event bus activity
    stats: Arc<RwLock<EventBusStats>>,
}

impl SessionEventBus {
    /// Create a new event bus with the specified capacity
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Creating session event bus");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
        }
    }

    /// Get a receiver to subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        trace!("New subscriber registered to session event bus");
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it.
    ///
    /// Having nobody listening is normal and only counted.
    pub async fn publish(&self, event: SessionEvent) -> usize {
        let role = event.role;
        trace!(role = %role, kind = ?event.kind, "Publishing session event");

        let mut stats = self.stats.write().await;
        *stats.role_counts.entry(role).or_insert(0) += 1;
        match self.sender.send(event) {
            Ok(receivers) => {
                stats.events_published += 1;
                receivers
            }
            Err(_) => {
                stats.events_dropped += 1;
                trace!(role = %role, "No subscribers for session event");
                0
            }
        }
    }

    /// Get current event bus statistics
    pub async fn get_stats(&self) -> EventBusStats {
        self.stats.read().await.clone()
    }

    /// Get the configured capacity of the event bus
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new(SESSION_EVENT_CAPACITY)
    }
}

impl Clone for SessionEventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
            stats: Arc::clone(&self.stats),
        }
    }
}
