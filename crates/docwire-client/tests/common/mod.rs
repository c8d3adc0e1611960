//! An in-process server speaking just enough of the protocol to drive a
//! client connection.

#![allow(dead_code)]

use docwire_client::{Connection, ConnectionSettings, Host};
use docwire_common::{
    Document, Result,
    protocol::{FrameDecoder, Message, MessageEncoder},
};
use futures::StreamExt;
use tokio::{
    io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
    task::JoinHandle,
};
use tokio_util::codec::FramedRead;

pub struct MockServer {
    frames: FramedRead<ReadHalf<DuplexStream>, FrameDecoder>,
    writer: WriteHalf<DuplexStream>,
    encoder: MessageEncoder,
}

impl MockServer {
    pub fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            frames: FramedRead::new(read, FrameDecoder::new()),
            writer,
            encoder: MessageEncoder::new(),
        }
    }

    /// The next request, or `None` once the client hangs up.
    pub async fn next_request(&mut self) -> Option<(i32, Message)> {
        let raw = self.frames.next().await?.expect("request framing");
        let message = Message::decode(&raw).expect("request body");
        Some((raw.header.request_id, message))
    }

    /// The next request's id and body.
    pub async fn expect_request(&mut self) -> (i32, Document) {
        let (id, message) = self.next_request().await.expect("client hung up");
        (id, message.body().cloned().expect("body section"))
    }

    pub async fn reply(&mut self, response_to: i32, body: Document) {
        self.send(response_to, &Message::new(body)).await;
    }

    pub async fn send(&mut self, response_to: i32, message: &Message) {
        let (_, bytes) = self.encoder.encode_reply(message, response_to);
        self.writer.write_all(&bytes).await.expect("write reply");
    }

    /// Answer every request with `respond(body)` until the client hangs up.
    pub fn serve<F>(mut self, respond: F) -> JoinHandle<()>
    where
        F: Fn(&Document) -> Document + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some((id, message)) = self.next_request().await {
                let body = message.body().cloned().unwrap_or_default();
                self.reply(id, respond(&body)).await;
            }
        })
    }
}

pub fn hello_reply() -> Document {
    Document::new()
        .with("isWritablePrimary", true)
        .with("maxBsonObjectSize", 16_777_216)
        .with("maxMessageSizeBytes", 48_000_000)
        .with("maxWireVersion", 21)
        .with("minWireVersion", 0)
        .with("logicalSessionTimeoutMinutes", 30)
        .with("connectionId", 42)
        .with("ok", 1.0)
}

/// Open a connection whose handshake is answered with `hello`.
pub async fn connect_with(
    settings: ConnectionSettings,
    hello: Document,
) -> (Result<Connection>, MockServer, Document) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut mock = MockServer::new(server);

    let (connection, request) = tokio::join!(
        Connection::establish(Host::new("mock", 27017), client, &settings),
        async {
            let (id, request) = mock.expect_request().await;
            mock.reply(id, hello).await;
            request
        }
    );
    (connection, mock, request)
}

pub async fn connect() -> (Connection, MockServer) {
    let (connection, mock, _) = connect_with(ConnectionSettings::default(), hello_reply()).await;
    (connection.expect("handshake"), mock)
}
