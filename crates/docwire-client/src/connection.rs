//! Connections to a server.
//!
//! A connection owns two background tasks. The writer drains a channel of
//! fully encoded messages onto the socket; the reader frames replies off
//! the socket and hands each one to whichever caller is waiting on its
//! request id. Any number of commands may be in flight at once, and
//! replies may arrive in any order.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use docwire_common::{
    DocwireError, Document, ProtocolError, Result, TransportError,
    protocol::{FrameDecoder, Message, MessageEncoder},
};
use futures::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, trace, warn};

use crate::{
    command::{Command, Database, Transaction, decode_reply, envelope},
    handshake::{Handshake, Hello},
    session::SessionId,
    settings::{ConnectionSettings, Host},
    transport::Stream,
};

/// Encoded messages waiting for the writer.
const OUTBOUND_CAPACITY: usize = 256;

/// Most messages the writer takes off the channel before flushing.
const MAX_BATCH: usize = 64;

/// State shared by the caller side and the reader task.
struct Shared {
    pending: DashMap<i32, oneshot::Sender<Result<Message>>>,
    closed: AtomicBool,
}

impl Shared {
    /// Mark the connection dead and fail every waiting caller with `error`.
    fn close(&self, error: DocwireError) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(error = %error, "connection closed");

        let ids: Vec<i32> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }
}

/// Removes a caller's pending entry if it stops waiting early.
struct PendingGuard<'a> {
    shared: &'a Shared,
    request_id: i32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.remove(&self.request_id);
    }
}

/// The request/reply machinery under a [`Connection`].
struct Channel {
    outbound: mpsc::Sender<Bytes>,
    encoder: MessageEncoder,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    query_timeout: Duration,
}

impl Channel {
    fn spawn<S>(stream: S, settings: &ConnectionSettings) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let (outbound, receiver) = mpsc::channel(OUTBOUND_CAPACITY);
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        });

        let frames = FramedRead::new(
            read,
            FrameDecoder::with_max_message_size(settings.max_message_size),
        );
        let reader = tokio::spawn(reader_loop(frames, shared.clone()));
        tokio::spawn(writer_loop(write, receiver, shared.clone()));

        Self {
            outbound,
            encoder: MessageEncoder::new().with_checksum(settings.checksum),
            shared,
            reader,
            query_timeout: settings.query_timeout(),
        }
    }

    /// Send one message and wait for the reply that answers it.
    ///
    /// Nothing is sent if the caller goes away while waiting for room in
    /// the outbound channel. Once sent, a caller that goes away or times
    /// out only leaves behind a reply the reader will discard.
    async fn round_trip(&self, message: &Message) -> Result<Message> {
        let permit = self
            .outbound
            .reserve()
            .await
            .map_err(|_| TransportError::Closed)?;

        let (request_id, bytes) = self.encoder.encode(message);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(request_id, tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            request_id,
        };

        // Checked after registering so a concurrent close either sees our
        // entry or we see its flag.
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed.into());
        }

        permit.send(bytes);
        trace!(request_id, "request queued");

        match tokio::time::timeout(self.query_timeout, rx).await {
            Ok(reply) => reply.map_err(|_| TransportError::Closed)?,
            Err(_) => {
                debug!(request_id, timeout = ?self.query_timeout, "no reply in time");
                Err(TransportError::Timeout(self.query_timeout).into())
            }
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.close(TransportError::Closed.into());
    }
}

async fn reader_loop<R>(mut frames: FramedRead<ReadHalf<R>, FrameDecoder>, shared: Arc<Shared>)
where
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    let error = loop {
        match frames.next().await {
            Some(Ok(raw)) => {
                let response_to = raw.header.response_to;
                let Some((_, waiter)) = shared.pending.remove(&response_to) else {
                    warn!(
                        response_to,
                        request_id = raw.header.request_id,
                        "discarding reply with no waiting request"
                    );
                    continue;
                };
                let _ = waiter.send(Message::decode(&raw));
            }
            Some(Err(e)) => {
                error!(error = %e, "connection reader failed");
                break e;
            }
            None => break TransportError::Closed.into(),
        }
    };
    shared.close(error);
}

async fn writer_loop<W>(mut writer: WriteHalf<W>, mut outbound: mpsc::Receiver<Bytes>, shared: Arc<Shared>)
where
    W: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut batch = Vec::with_capacity(MAX_BATCH);
    while let Some(first) = outbound.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH {
            match outbound.try_recv() {
                Ok(bytes) => batch.push(bytes),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            error!(error = %e, "connection writer failed");
            shared.close(e.into());
            return;
        }
        batch.clear();
    }
    let _ = writer.shutdown().await;
}

async fn write_batch<W: AsyncWrite + Unpin>(writer: &mut W, batch: &[Bytes]) -> std::io::Result<()> {
    for bytes in batch {
        writer.write_all(bytes).await?;
    }
    writer.flush().await
}

/// An established connection: transport up, handshake done.
///
/// Shared between sessions behind an `Arc`. Dropping it stops both
/// background tasks and fails anything still waiting.
pub struct Connection {
    host: Host,
    channel: Channel,
    handshake: Handshake,
}

impl Connection {
    /// Open a transport to `host` and perform the handshake.
    pub async fn connect(host: Host, settings: &ConnectionSettings) -> Result<Self> {
        let stream = Stream::connect(&host, settings).await?;
        Self::establish(host, stream, settings).await
    }

    /// Perform the handshake over an already open stream.
    pub async fn establish<S>(host: Host, stream: S, settings: &ConnectionSettings) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let channel = Channel::spawn(stream, settings);
        let hello = Hello {
            user: settings.user.clone(),
            app_name: settings.app_name.clone(),
        };

        let reply = execute(&channel, hello.fields(), &Database::admin(), None, None).await?;
        let handshake = decode_reply::<Hello>(reply)?;
        debug!(
            %host,
            max_wire_version = handshake.max_wire_version,
            session_timeout_minutes = handshake.logical_session_timeout_minutes,
            "handshake complete"
        );

        Ok(Self {
            host,
            channel,
            handshake,
        })
    }

    /// Send a command document and return the single reply document.
    ///
    /// `$db`, `lsid` and transaction fields are merged in here. The reply's
    /// status is not interpreted.
    pub async fn run(
        &self,
        command: Document,
        database: &Database,
        transaction: Option<&Transaction>,
        session: Option<&SessionId>,
    ) -> Result<Document> {
        execute(&self.channel, command, database, transaction, session).await
    }

    /// Run a command outside any session.
    pub async fn run_command<C: Command>(&self, command: &C, database: &Database) -> Result<C::Response> {
        let reply = self.run(command.fields(), database, None, None).await?;
        decode_reply::<C>(reply)
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// True once the transport has failed or the peer has hung up.
    pub fn is_closed(&self) -> bool {
        self.channel.shared.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn execute(
    channel: &Channel,
    command: Document,
    database: &Database,
    transaction: Option<&Transaction>,
    session: Option<&SessionId>,
) -> Result<Document> {
    let body = envelope(command, database, transaction, session);
    let reply = channel.round_trip(&Message::new(body)).await?;

    let mut documents = reply.into_documents();
    match documents.len() {
        0 => Err(ProtocolError::NoDocuments.into()),
        1 => Ok(documents.remove(0)),
        n => Err(ProtocolError::MultipleDocuments(n).into()),
    }
}
