use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::pool::Pool;
use crate::protocol::{Packet, PacketHeader};
use crate::session::{Session, SessionId, Transport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterSessionError {
    #[error("connection limit reached ({current}/{limit})")]
    LimitExceeded { current: usize, limit: usize },
}

/// Live sessions of every engine, keyed by id. One registry is shared by
/// the TCP and UDP engines, so the limit counts both transports.
///
/// Ids are handed out from a wrapping counter, skipping 0 and any id still
/// registered, so an id is never reused while its session is alive.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    next_id: AtomicU32,
    reserved: AtomicUsize,
    max_sessions: usize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self::starting_at(1, max_sessions)
    }

    /// Start allocating from `first_id`; lets tests exercise wrap-around.
    #[must_use]
    pub fn starting_at(first_id: SessionId, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU32::new(first_id),
            reserved: AtomicUsize::new(0),
            max_sessions,
        }
    }

    /// Allocate an id and register a new session for `transport`.
    pub fn register(
        &self,
        transport: Transport,
        packets: &Arc<Pool<Packet>>,
    ) -> Result<Arc<Session>, RegisterSessionError> {
        if let Err(current) = self.try_reserve_slot() {
            warn!(
                current,
                limit = self.max_sessions,
                %transport,
                "connection limit reached"
            );
            return Err(RegisterSessionError::LimitExceeded {
                current,
                limit: self.max_sessions,
            });
        }

        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.sessions.entry(id) {
                let session = Arc::new(Session::new(id, transport, Arc::clone(packets)));
                slot.insert(Arc::clone(&session));
                debug!(session_id = id, %transport, "session registered");
                return Ok(session);
            }
        }
    }

    fn try_reserve_slot(&self) -> Result<(), usize> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_sessions).then_some(current + 1)
            })
            .map(|_| ())
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Queue a copy of `body` under `header` to every connected session not in
    /// `exclude`. Each target gets its own pooled packet. Returns the number of
    /// sessions the frame was queued for.
    pub fn broadcast(&self, header: PacketHeader, body: &[u8], exclude: &[SessionId]) -> usize {
        let mut delivered = 0;
        for session in self.sessions() {
            if exclude.contains(&session.id()) {
                continue;
            }
            match session.send(header, |packet| packet.copy_buffer(body)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(session_id = session.id(), %header, error = %e, "broadcast skipped session");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}
