//! Sign-in, sign-up, rank and record flows.
//!
//! Each request is parsed on the receive path, then the persistence call runs
//! on its own task and the reply is queued on the session when it completes.
//! A persistence failure never reaches the client as an error: it becomes a
//! deny or an empty list.

use std::io::ErrorKind;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::metrics::ServerMetrics;
use crate::persistence::PersistenceError;
use crate::protocol::{BinaryStruct, Packet, PacketHeader, RankEntry, RecordEntry};
use crate::session::Session;

use super::RoomServer;

impl RoomServer {
    pub fn handle_sign_in(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<JoinHandle<()>> {
        let name = packet.read_string()?;
        let password = packet.read_string()?;
        let persistence = Arc::clone(&self.persistence);
        let metrics = Arc::clone(&self.metrics);
        let session = Arc::clone(session);

        Ok(tokio::spawn(async move {
            let allowed = match persistence.check_account(&name, &password).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    record_failure(&metrics, "check_account", &e);
                    false
                }
            };
            let sent = if allowed {
                session.set_user_name(name.clone());
                info!(session_id = session.id(), user = %name, "signed in");
                session.send(PacketHeader::SignInAllow, |out| out.write_string(&name))
            } else {
                debug!(session_id = session.id(), user = %name, "sign-in denied");
                session.send(PacketHeader::SignInDeny, |_| Ok(()))
            };
            if let Err(e) = sent {
                debug!(session_id = session.id(), error = %e, "sign-in reply not sent");
            }
        }))
    }

    pub fn handle_sign_up(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<JoinHandle<()>> {
        let name = packet.read_string()?;
        let password = packet.read_string()?;
        let persistence = Arc::clone(&self.persistence);
        let metrics = Arc::clone(&self.metrics);
        let session = Arc::clone(session);

        Ok(tokio::spawn(async move {
            let sent = match persistence.create_user(&name, &password).await {
                Ok(()) => {
                    info!(session_id = session.id(), user = %name, "account created");
                    session.send(PacketHeader::SignUpAllow, |out| out.write_string(&name))
                }
                Err(e) => {
                    // A taken name is an ordinary deny, not a backend fault.
                    if !is_already_exists(&e) {
                        record_failure(&metrics, "create_user", &e);
                    }
                    debug!(session_id = session.id(), user = %name, error = %e, "sign-up denied");
                    session.send(PacketHeader::SignUpDeny, |_| Ok(()))
                }
            };
            if let Err(e) = sent {
                debug!(session_id = session.id(), error = %e, "sign-up reply not sent");
            }
        }))
    }

    pub fn handle_rank_request(&self, session: &Arc<Session>) -> JoinHandle<()> {
        let persistence = Arc::clone(&self.persistence);
        let metrics = Arc::clone(&self.metrics);
        let session = Arc::clone(session);
        let limit = self.config.rank_limit;

        tokio::spawn(async move {
            let entries: Vec<RankEntry> = persistence.get_rank(limit).await.unwrap_or_else(|e| {
                record_failure(&metrics, "get_rank", &e);
                Vec::new()
            });
            send_list(&session, PacketHeader::Rank, &entries);
        })
    }

    pub fn handle_record_request(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<JoinHandle<()>> {
        let name = packet.read_string()?;
        let persistence = Arc::clone(&self.persistence);
        let metrics = Arc::clone(&self.metrics);
        let session = Arc::clone(session);
        let limit = self.config.record_limit;

        Ok(tokio::spawn(async move {
            let entries: Vec<RecordEntry> =
                persistence.get_record(&name, limit).await.unwrap_or_else(|e| {
                    record_failure(&metrics, "get_record", &e);
                    Vec::new()
                });
            send_list(&session, PacketHeader::Record, &entries);
        }))
    }

    /// Fire and forget; the client gets no reply either way.
    pub fn handle_create_record(&self, session: &Arc<Session>, packet: &mut Packet) -> EngineResult<JoinHandle<()>> {
        let user_name = packet.read_string()?;
        let kill_count = packet.read_i32()?;
        let persistence = Arc::clone(&self.persistence);
        let metrics = Arc::clone(&self.metrics);
        let session_id = session.id();

        Ok(tokio::spawn(async move {
            match persistence.create_record(&user_name, kill_count).await {
                Ok(()) => debug!(session_id, user = %user_name, kill_count, "record stored"),
                Err(e) => record_failure(&metrics, "create_record", &e),
            }
        }))
    }
}

/// List replies always go out: entries past what one packet holds are cut.
fn send_list<T: BinaryStruct>(session: &Session, header: PacketHeader, entries: &[T]) {
    let mut written = 0;
    let sent = session.send(header, |out| {
        written = out.write_list_truncated(entries)?;
        Ok(())
    });
    match sent {
        Ok(()) if written < entries.len() => {
            debug!(session_id = session.id(), %header, written, total = entries.len(), "list reply truncated");
        }
        Ok(()) => {}
        Err(e) => debug!(session_id = session.id(), %header, error = %e, "list reply not sent"),
    }
}

fn record_failure(metrics: &ServerMetrics, operation: &'static str, error: &PersistenceError) {
    metrics.increment_persistence_failures();
    warn!(operation, error = %error, "persistence call failed");
}

fn is_already_exists(error: &PersistenceError) -> bool {
    match error {
        PersistenceError::Io(e) => e.kind() == ErrorKind::AlreadyExists,
    }
}
