mod common;

use std::{sync::Arc, time::Duration};

use common::{MockServer, connect, connect_with, hello_reply};
use docwire_client::{Connection, ConnectionSettings, Database, Host, RawCommand};
use docwire_common::{
    DocwireError, Document, ProtocolError, ServerError, TransportError, Value,
    protocol::{Message, MessageFlags},
};
use pretty_assertions::assert_eq;

fn ping() -> Document {
    Document::new().with("ping", 1)
}

#[tokio::test]
async fn test_handshake_request_and_record() {
    let settings = ConnectionSettings {
        app_name: Some("inventory".into()),
        user: Some("alice".into()),
        ..ConnectionSettings::default()
    };
    let (connection, _mock, request) = connect_with(settings, hello_reply()).await;
    let connection = connection.unwrap();

    assert_eq!(request.keys().next(), Some("hello"));
    assert_eq!(request["$db"], Value::from("admin"));
    assert_eq!(request["saslSupportedMechs"], Value::from("admin.alice"));
    assert!(!request.contains_key("lsid"));
    let client = request["client"].as_document().unwrap();
    assert_eq!(
        client["application"].as_document().unwrap()["name"],
        Value::from("inventory")
    );

    let handshake = connection.handshake();
    assert_eq!(handshake.max_wire_version, 21);
    assert_eq!(handshake.logical_session_timeout_minutes, 30);
    assert_eq!(handshake.connection_id, Some(42));
    assert_eq!(connection.host(), &Host::new("mock", 27017));
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_handshake_without_session_timeout_is_rejected() {
    let mut hello = hello_reply();
    hello.remove("logicalSessionTimeoutMinutes");
    let (connection, _mock, _) = connect_with(ConnectionSettings::default(), hello).await;
    assert!(matches!(connection, Err(DocwireError::Configuration(_))));
}

#[tokio::test]
async fn test_handshake_server_failure_aborts_setup() {
    let hello = Document::new()
        .with("ok", 0)
        .with("errmsg", "not authorized")
        .with("code", 13);
    let (connection, _mock, _) = connect_with(ConnectionSettings::default(), hello).await;
    assert_eq!(
        connection.unwrap_err(),
        DocwireError::Server(ServerError {
            message: "not authorized".into(),
            code: Some(13),
            code_name: None,
        })
    );
}

#[tokio::test]
async fn test_handshake_garbage_reply_aborts_setup() {
    let (client, server) = tokio::io::duplex(4096);
    let mut mock = MockServer::new(server);
    let settings = ConnectionSettings::default();

    let (connection, _) = tokio::join!(
        Connection::establish(Host::new("mock", 1), client, &settings),
        async {
            let (id, _) = mock.expect_request().await;
            let mut message = Message::new(hello_reply());
            // Two body sections.
            message.sections.push(message.sections[0].clone());
            mock.send(id, &message).await;
        }
    );
    assert!(matches!(connection, Err(DocwireError::Framing(_))));
}

#[tokio::test]
async fn test_replies_matched_by_request_id() {
    let (connection, mut mock) = connect().await;
    let connection = Arc::new(connection);

    let first = tokio::spawn({
        let connection = connection.clone();
        async move {
            connection
                .run(Document::new().with("find", "a"), &Database::new("app"), None, None)
                .await
        }
    });
    let second = tokio::spawn({
        let connection = connection.clone();
        async move {
            connection
                .run(Document::new().with("find", "b"), &Database::new("app"), None, None)
                .await
        }
    });

    let (id_one, body_one) = mock.expect_request().await;
    let (id_two, body_two) = mock.expect_request().await;
    assert_ne!(id_one, id_two);

    // Answer in reverse arrival order, echoing the collection.
    for (id, body) in [(id_two, body_two), (id_one, body_one)] {
        let reply = Document::new()
            .with("collection", body["find"].clone())
            .with("ok", 1);
        mock.reply(id, reply).await;
    }

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first["collection"], Value::from("a"));
    assert_eq!(second["collection"], Value::from("b"));
}

#[tokio::test]
async fn test_run_command_interprets_status() {
    let (connection, mock) = connect().await;
    let _server = mock.serve(|body| {
        if body.contains_key("drop") {
            Document::new()
                .with("ok", 0.0)
                .with("errmsg", "ns not found")
                .with("code", 26)
                .with("codeName", "NamespaceNotFound")
        } else {
            Document::new().with("ok", 1i64).with("pong", true)
        }
    });

    let reply = connection
        .run_command(&RawCommand(ping()), &Database::admin())
        .await
        .unwrap();
    assert_eq!(reply["pong"], Value::Bool(true));

    let error = connection
        .run_command(&RawCommand(Document::new().with("drop", "x")), &Database::new("app"))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), "server_error");
    assert_eq!(error.message(), "ns not found");
    assert_eq!(
        error,
        DocwireError::Server(ServerError {
            message: "ns not found".into(),
            code: Some(26),
            code_name: Some("NamespaceNotFound".into()),
        })
    );
}

#[tokio::test]
async fn test_reply_with_extra_documents_is_rejected() {
    let (connection, mut mock) = connect().await;

    let admin = Database::admin();
    let (result, _) = tokio::join!(connection.run(ping(), &admin, None, None), async {
        let (id, _) = mock.expect_request().await;
        let message = Message::new(Document::new().with("ok", 1))
            .with_sequence("documents", vec![Document::new().with("n", 1)]);
        mock.send(id, &message).await;
    });
    assert_eq!(result, Err(ProtocolError::MultipleDocuments(2).into()));
}

#[tokio::test]
async fn test_abandoned_request_leaves_connection_usable() {
    let (connection, mut mock) = connect().await;

    let admin = Database::admin();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        connection.run(ping(), &admin, None, None),
    )
    .await;
    assert!(abandoned.is_err());

    // The late reply has nobody waiting for it.
    let (late, _) = mock.expect_request().await;
    mock.reply(late, Document::new().with("ok", 1).with("late", true))
        .await;

    let (result, _) = tokio::join!(connection.run(ping(), &admin, None, None), async {
        let (id, _) = mock.expect_request().await;
        mock.reply(id, Document::new().with("ok", 1).with("late", false))
            .await;
    });
    assert_eq!(result.unwrap()["late"], Value::Bool(false));
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_peer_hangup_fails_waiting_requests() {
    let (connection, mut mock) = connect().await;

    let admin = Database::admin();
    let (result, _) = tokio::join!(connection.run(ping(), &admin, None, None), async {
        mock.expect_request().await;
        drop(mock);
    });
    assert_eq!(result, Err(TransportError::Closed.into()));
    assert!(connection.is_closed());

    let again = connection.run(ping(), &admin, None, None).await;
    assert_eq!(again, Err(TransportError::Closed.into()));
}

#[tokio::test]
async fn test_checksummed_requests() {
    let settings = ConnectionSettings {
        checksum: true,
        ..ConnectionSettings::default()
    };
    let (connection, mut mock, _) = connect_with(settings, hello_reply()).await;
    let connection = connection.unwrap();

    let admin = Database::admin();
    let (result, flags) = tokio::join!(connection.run(ping(), &admin, None, None), async {
        let (id, message) = mock.next_request().await.unwrap();
        mock.reply(id, Document::new().with("ok", 1)).await;
        message.flags
    });
    assert!(result.is_ok());
    assert!(flags.contains(MessageFlags::CHECKSUM_PRESENT));
}

#[tokio::test]
async fn test_oversized_reply_closes_connection() {
    let settings = ConnectionSettings {
        max_message_size: 512,
        ..ConnectionSettings::default()
    };
    let (connection, mut mock, _) = connect_with(settings, hello_reply()).await;
    let connection = connection.unwrap();

    let admin = Database::admin();
    let (result, _) = tokio::join!(connection.run(ping(), &admin, None, None), async {
        let (id, _) = mock.expect_request().await;
        let reply = Document::new().with("ok", 1).with("blob", "x".repeat(1024));
        mock.reply(id, reply).await;
    });
    assert!(matches!(result, Err(DocwireError::Framing(_))));
    assert!(connection.is_closed());
}

#[tokio::test]
async fn test_request_dropped_before_polling_is_never_sent() {
    let (connection, mut mock) = connect().await;
    let app = Database::new("app");

    let cancelled = connection.run(Document::new().with("find", "cancelled"), &app, None, None);
    drop(cancelled);

    let (result, request) = tokio::join!(
        connection.run(Document::new().with("find", "kept"), &app, None, None),
        async {
            let (id, body) = mock.expect_request().await;
            mock.reply(id, Document::new().with("ok", 1)).await;
            body
        }
    );
    assert!(result.is_ok());
    assert_eq!(request["find"], Value::from("kept"));
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_aborts_handshake() {
    let (client, server) = tokio::io::duplex(4096);
    let mut mock = MockServer::new(server);
    let settings = ConnectionSettings {
        query_timeout_ms: 1_000,
        ..ConnectionSettings::default()
    };

    // The server reads the hello and never answers.
    let (connection, (_, hello)) = tokio::join!(
        Connection::establish(Host::new("mock", 27017), client, &settings),
        mock.expect_request()
    );
    assert_eq!(hello.keys().next(), Some("hello"));
    assert_eq!(
        connection.unwrap_err(),
        DocwireError::Transport(TransportError::Timeout(Duration::from_secs(1)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_command_times_out() {
    let settings = ConnectionSettings {
        query_timeout_ms: 500,
        ..ConnectionSettings::default()
    };
    let (connection, mut mock, _) = connect_with(settings, hello_reply()).await;
    let connection = connection.unwrap();
    let admin = Database::admin();

    let (result, (late, _)) = tokio::join!(
        connection.run(ping(), &admin, None, None),
        mock.expect_request()
    );
    assert_eq!(
        result,
        Err(TransportError::Timeout(Duration::from_millis(500)).into())
    );

    // A reply after the deadline is dropped and the connection carries on.
    mock.reply(late, Document::new().with("ok", 1).with("late", true))
        .await;
    let (result, _) = tokio::join!(connection.run(ping(), &admin, None, None), async {
        let (id, _) = mock.expect_request().await;
        mock.reply(id, Document::new().with("ok", 1).with("late", false))
            .await;
    });
    assert_eq!(result.unwrap()["late"], Value::Bool(false));
    assert!(!connection.is_closed());
}
