//! The `hello` handshake and the capability record it produces.

use std::time::Duration;

use docwire_common::{DateTime, DocwireError, Document, Fields, ProtocolError, Result, Value};

use crate::command::{AdministrativeCommand, Command};

const DRIVER_NAME: &str = "docwire";

/// The first command sent on every connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hello {
    pub user: Option<String>,
    pub app_name: Option<String>,
}

impl Command for Hello {
    type Response = Handshake;

    fn fields(&self) -> Document {
        let mut fields = Document::new().with("hello", 1);

        if let Some(user) = &self.user {
            let mechs = if user.contains('.') {
                user.clone()
            } else {
                format!("admin.{user}")
            };
            fields.insert("saslSupportedMechs", mechs);
        }

        let mut client = Document::new();
        if let Some(name) = &self.app_name {
            client.insert("application", Document::new().with("name", name.as_str()));
        }
        client.insert(
            "driver",
            Document::new()
                .with("name", DRIVER_NAME)
                .with("version", docwire_common::VERSION),
        );
        client.insert("os", Document::new().with("type", std::env::consts::OS));
        fields.insert("client", client);

        fields
    }

    fn decode(reply: Fields<'_>) -> Result<Handshake> {
        Handshake::from_reply(&reply)
    }
}

impl AdministrativeCommand for Hello {}

/// What the server told us about itself when the connection opened.
///
/// Immutable for the life of the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub max_wire_version: i32,
    pub min_wire_version: i32,
    /// Minutes a session may sit idle before the server discards it.
    pub logical_session_timeout_minutes: u32,
    pub is_writable_primary: bool,
    pub max_bson_object_size: Option<i64>,
    pub max_message_size_bytes: Option<i64>,
    pub max_write_batch_size: Option<i64>,
    pub local_time: Option<DateTime>,
    pub read_only: bool,
    pub connection_id: Option<i64>,
    pub set_name: Option<String>,
    pub hosts: Vec<String>,
    pub sasl_supported_mechs: Vec<String>,
}

impl Handshake {
    fn from_reply(reply: &Fields<'_>) -> Result<Self> {
        let max_wire_version = required_integer(reply, "maxWireVersion")?;
        let timeout = required_integer(reply, "logicalSessionTimeoutMinutes")?;

        let max_wire_version = i32::try_from(max_wire_version).map_err(|_| {
            DocwireError::Configuration(format!("maxWireVersion out of range: {max_wire_version}"))
        })?;
        let logical_session_timeout_minutes = u32::try_from(timeout).map_err(|_| {
            DocwireError::Configuration(format!(
                "logicalSessionTimeoutMinutes out of range: {timeout}"
            ))
        })?;

        let min_wire_version = reply
            .optional_integer("minWireVersion")?
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0);

        let is_writable_primary = match reply.optional_bool("isWritablePrimary")? {
            Some(primary) => primary,
            None => reply.optional_bool("ismaster")?.unwrap_or(false),
        };

        let local_time = match reply.get("localTime") {
            Some(Value::DateTime(t)) => Some(*t),
            _ => None,
        };

        Ok(Self {
            max_wire_version,
            min_wire_version,
            logical_session_timeout_minutes,
            is_writable_primary,
            max_bson_object_size: reply.optional_integer("maxBsonObjectSize")?,
            max_message_size_bytes: reply.optional_integer("maxMessageSizeBytes")?,
            max_write_batch_size: reply.optional_integer("maxWriteBatchSize")?,
            local_time,
            read_only: reply.optional_bool("readOnly")?.unwrap_or(false),
            connection_id: reply.optional_integer("connectionId")?,
            set_name: reply.optional_str("setName")?.map(str::to_string),
            hosts: strings(reply, "hosts")?,
            sasl_supported_mechs: strings(reply, "saslSupportedMechs")?,
        })
    }

    /// How long a session may sit idle on the server.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.logical_session_timeout_minutes) * 60)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(timeout_minutes: u32) -> Self {
        Self {
            max_wire_version: 21,
            min_wire_version: 0,
            logical_session_timeout_minutes: timeout_minutes,
            is_writable_primary: true,
            max_bson_object_size: None,
            max_message_size_bytes: None,
            max_write_batch_size: None,
            local_time: None,
            read_only: false,
            connection_id: None,
            set_name: None,
            hosts: Vec::new(),
            sasl_supported_mechs: Vec::new(),
        }
    }
}

/// A field the server must report. Absent and null are both a server we
/// cannot work with.
fn required_integer(reply: &Fields<'_>, key: &str) -> Result<i64> {
    match reply.get(key) {
        None | Some(Value::Null) => Err(DocwireError::Configuration(format!(
            "server did not report {key}"
        ))),
        Some(_) => Ok(reply.integer(key)?),
    }
}

fn strings(reply: &Fields<'_>, key: &str) -> Result<Vec<String>> {
    if !reply.contains(key) {
        return Ok(Vec::new());
    }
    reply
        .array(key)?
        .values()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                DocwireError::from(ProtocolError::FieldType {
                    field: key.to_string(),
                    expected: "array of strings",
                    actual: v.value_type(),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode(reply: &Document) -> Result<Handshake> {
        Hello::decode(Fields::new(reply).unwrap())
    }

    fn reply() -> Document {
        Document::new()
            .with("isWritablePrimary", true)
            .with("maxBsonObjectSize", 16_777_216)
            .with("maxWireVersion", 21)
            .with("minWireVersion", 0)
            .with("logicalSessionTimeoutMinutes", 30)
            .with("connectionId", 7)
            .with("ok", 1.0)
    }

    #[test]
    fn test_hello_fields() {
        let hello = Hello {
            user: Some("alice".into()),
            app_name: Some("reports".into()),
        };
        let fields = hello.fields();
        assert_eq!(fields.keys().next(), Some("hello"));
        assert_eq!(fields["saslSupportedMechs"], Value::from("admin.alice"));

        let client = fields["client"].as_document().unwrap();
        assert_eq!(client["application"].as_document().unwrap()["name"], Value::from("reports"));
        assert_eq!(client["driver"].as_document().unwrap()["name"], Value::from("docwire"));
        assert!(client["os"].as_document().unwrap().contains_key("type"));

        let qualified = Hello {
            user: Some("app.bob".into()),
            app_name: None,
        };
        let fields = qualified.fields();
        assert_eq!(fields["saslSupportedMechs"], Value::from("app.bob"));
        assert!(!fields["client"].as_document().unwrap().contains_key("application"));

        assert!(!Hello::default().fields().contains_key("saslSupportedMechs"));
    }

    #[test]
    fn test_decode_handshake() {
        let handshake = decode(&reply()).unwrap();
        assert_eq!(handshake.max_wire_version, 21);
        assert_eq!(handshake.logical_session_timeout_minutes, 30);
        assert_eq!(handshake.idle_timeout(), Duration::from_secs(1800));
        assert!(handshake.is_writable_primary);
        assert_eq!(handshake.max_bson_object_size, Some(16_777_216));
        assert_eq!(handshake.connection_id, Some(7));
        assert!(handshake.hosts.is_empty());
    }

    #[test]
    fn test_legacy_primary_flag() {
        let mut reply = reply();
        reply.remove("isWritablePrimary");
        reply.insert("ismaster", true);
        assert!(decode(&reply).unwrap().is_writable_primary);
    }

    #[test]
    fn test_missing_required_fields_are_configuration_errors() {
        for key in ["maxWireVersion", "logicalSessionTimeoutMinutes"] {
            let mut missing = reply();
            missing.remove(key);
            assert!(matches!(decode(&missing), Err(DocwireError::Configuration(_))));

            let mut null = reply();
            null.insert(key, Value::Null);
            assert!(matches!(decode(&null), Err(DocwireError::Configuration(_))));
        }
    }

    #[test]
    fn test_wrong_types_are_protocol_errors() {
        let mut reply = reply();
        reply.insert("logicalSessionTimeoutMinutes", "30");
        assert!(matches!(decode(&reply), Err(DocwireError::Protocol(_))));

        let mut reply = super::tests::reply();
        reply.insert("hosts", Value::array([Value::from(1)]));
        assert!(matches!(decode(&reply), Err(DocwireError::Protocol(_))));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let mut reply = reply();
        reply.insert("logicalSessionTimeoutMinutes", -1);
        assert!(matches!(decode(&reply), Err(DocwireError::Configuration(_))));
    }
}
