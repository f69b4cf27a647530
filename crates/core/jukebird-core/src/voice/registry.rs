//! Voice session registry
//!
//! Lazily creates and caches one [`VoiceSession`] per call group. Creation
//! happens at most once per group even under concurrent lookups; the
//! backend's factory methods are only ever called while holding the
//! registry lock.

use crate::types::GroupId;
use crate::voice::ports::VoiceBackend;
use crate::voice::session::VoiceSession;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-wide map of call groups to their voice sessions.
pub struct VoiceRegistry {
    backend: Arc<dyn VoiceBackend>,
    sessions: tokio::sync::Mutex<HashMap<GroupId, Arc<VoiceSession>>>,
}

impl VoiceRegistry {
    /// Creates an empty registry backed by the given session factory.
    pub fn new(backend: Arc<dyn VoiceBackend>) -> Self {
        Self {
            backend,
            sessions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for the group, creating it on first use.
    ///
    /// The frame source is (re-)registered with the transport on every
    /// call, so a transport handle recreated by the platform layer picks
    /// the bridge up again.
    pub async fn get_or_create(&self, group: GroupId) -> Arc<VoiceSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(group)
            .or_insert_with(|| {
                debug!(group = %group, "no session for group yet, creating one");
                VoiceSession::new(
                    group,
                    self.backend.create_player(group),
                    self.backend.create_transport(group),
                    self.backend.resolver(),
                )
            })
            .clone();
        session.register_frame_source();
        session
    }

    /// Returns the session for the group only if one already exists.
    pub async fn get(&self, group: GroupId) -> Option<Arc<VoiceSession>> {
        self.sessions.lock().await.get(&group).cloned()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session exists yet.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
