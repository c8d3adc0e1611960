//! Logical sessions.
//!
//! A [`Session`] pairs a connection with a server-side session id. The
//! session stays alive as long as any clone of it does: every command
//! that gets a reply pushes its liveness deadline forward and tells the
//! owner, and dropping the last clone tells the owner to end it.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use docwire_common::{Binary, Document, Result};
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::mpsc, time::Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    command::{
        AdministrativeCommand, Command, Database, DatabaseCommand, Transaction,
        TransactableCommand, decode_reply,
    },
    connection::Connection,
    handshake::Handshake,
};

/// Server-side session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// The `lsid` document sent with every command on this session.
    pub fn to_document(&self) -> Document {
        Document::new().with("id", Binary::from_uuid(self.0))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Receives keep-alive and release notifications for sessions it handed
/// out. Implemented by whatever layer pools sessions.
///
/// Calls for one session arrive one at a time and in order, and `release`
/// is the last call made for it.
#[async_trait]
pub trait SessionOwner: Send + Sync + 'static {
    /// The session was used and will stay alive until at least `deadline`.
    async fn refresh(&self, id: SessionId, deadline: Instant) -> Result<()>;

    /// The last handle to the session was dropped.
    async fn release(&self, id: SessionId) -> Result<()>;
}

/// What a session tells its owner.
#[derive(Debug)]
enum Notice {
    Refresh(Instant),
    Release,
}

/// Shared state behind every clone of a session. Dropping it releases the
/// session.
struct Lease {
    id: SessionId,
    timeout: Duration,
    deadline: Mutex<Instant>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let _ = self.notices.send(Notice::Release);
    }
}

/// Deliver a session's notices to its owner one at a time, in the order
/// they were sent. A release is always the last thing the owner hears.
async fn notify(id: SessionId, owner: Weak<dyn SessionOwner>, mut notices: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        let Some(owner) = owner.upgrade() else {
            debug!(session = %id, "session owner gone, skipping notifications");
            return;
        };
        match notice {
            Notice::Refresh(deadline) => {
                if let Err(e) = owner.refresh(id, deadline).await {
                    debug!(session = %id, error = %e, "session refresh failed");
                }
            }
            Notice::Release => {
                if let Err(e) = owner.release(id).await {
                    debug!(session = %id, error = %e, "session release failed");
                }
                return;
            }
        }
    }
}

/// A logical session bound to one connection.
///
/// Cloning is cheap; all clones share the id and the deadline.
#[derive(Clone)]
pub struct Session {
    connection: Arc<Connection>,
    lease: Arc<Lease>,
}

impl Session {
    /// Bind `id` to `connection`.
    ///
    /// The connection's handshake guarantees an idle timeout, so the
    /// deadline is known from the start.
    pub fn new<O: SessionOwner>(connection: Arc<Connection>, owner: &Arc<O>, id: SessionId) -> Self {
        let timeout = keep_alive(connection.handshake());
        let owner: Weak<O> = Arc::downgrade(owner);
        let owner: Weak<dyn SessionOwner> = owner;

        let (notices, receiver) = mpsc::unbounded_channel();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(notify(id, owner, receiver));
            }
            Err(_) => warn!(session = %id, "no runtime available, owner will not be notified"),
        }

        Self {
            lease: Arc::new(Lease {
                id,
                timeout,
                deadline: Mutex::new(Instant::now() + timeout),
                notices,
            }),
            connection,
        }
    }

    pub fn id(&self) -> SessionId {
        self.lease.id
    }

    /// Until when the server is expected to keep this session alive.
    pub fn deadline(&self) -> Instant {
        *self.lease.deadline.lock()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Run a database-scoped command.
    pub async fn run<C: DatabaseCommand>(&self, command: &C, database: &Database) -> Result<C::Response> {
        self.execute(command, database, None).await
    }

    /// Run an administrative command against `admin`.
    pub async fn run_admin<C: AdministrativeCommand>(&self, command: &C) -> Result<C::Response> {
        self.execute(command, &Database::admin(), None).await
    }

    /// Run a command as part of a transaction.
    pub async fn run_in_transaction<C: TransactableCommand>(
        &self,
        command: &C,
        database: &Database,
        transaction: &Transaction,
    ) -> Result<C::Response> {
        self.execute(command, database, Some(transaction)).await
    }

    async fn execute<C: Command>(
        &self,
        command: &C,
        database: &Database,
        transaction: Option<&Transaction>,
    ) -> Result<C::Response> {
        let reply = self
            .connection
            .run(command.fields(), database, transaction, Some(&self.lease.id))
            .await?;
        self.touch();
        decode_reply::<C>(reply)
    }

    /// Push the deadline forward and notify the owner.
    fn touch(&self) {
        let deadline = Instant::now() + self.lease.timeout;
        *self.lease.deadline.lock() = deadline;
        let _ = self.lease.notices.send(Notice::Refresh(deadline));
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.lease.id)
            .field("host", self.connection.host())
            .field("deadline", &self.deadline())
            .finish()
    }
}

/// The server's idle timeout less a minute of margin.
fn keep_alive(handshake: &Handshake) -> Duration {
    let minutes = handshake.logical_session_timeout_minutes.saturating_sub(1);
    Duration::from_secs(u64::from(minutes) * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwire_common::BinarySubtype;

    #[test]
    fn test_lsid_shape() {
        let id = SessionId::new();
        let lsid = id.to_document();
        let binary = lsid.get("id").and_then(|v| v.as_binary()).unwrap();
        assert_eq!(binary.subtype, BinarySubtype::Uuid);
        assert_eq!(binary.bytes.len(), 16);
        assert_eq!(binary.to_uuid(), Some(id.uuid()));
    }

    #[test]
    fn test_keep_alive_margin() {
        let mut handshake = Handshake::for_tests(30);
        assert_eq!(keep_alive(&handshake), Duration::from_secs(29 * 60));
        handshake.logical_session_timeout_minutes = 0;
        assert_eq!(keep_alive(&handshake), Duration::ZERO);
    }
}
