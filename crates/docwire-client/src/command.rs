//! The command envelope.
//!
//! A command contributes its own fields and knows how to read its reply.
//! Everything else on the wire (target database, session, transaction
//! metadata) and the generic reply checks live here, so concrete commands
//! never repeat them.

use std::fmt;

use docwire_common::{Document, Fields, ProtocolError, Result, ServerError, Value};

use crate::session::SessionId;

/// A request/reply operation.
///
/// Implementors also pick where they may be routed by implementing
/// [`DatabaseCommand`], [`AdministrativeCommand`] and/or
/// [`TransactableCommand`].
pub trait Command: Send + Sync {
    type Response: Send;

    /// The command's own fields. The command name must come first.
    fn fields(&self) -> Document;

    /// Read the response out of a successful reply.
    fn decode(reply: Fields<'_>) -> Result<Self::Response>;
}

/// A command that runs against a named database.
pub trait DatabaseCommand: Command {}

/// A command that only runs against the `admin` database.
pub trait AdministrativeCommand: Command {}

/// A command that may run inside a multi-statement transaction.
pub trait TransactableCommand: DatabaseCommand {}

/// Name of the database a command targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Database(String);

impl Database {
    pub const ADMIN: &'static str = "admin";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Database {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Transaction metadata attached to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub number: i64,
    /// Set on the first command of the transaction.
    pub start: bool,
}

impl Transaction {
    pub fn start(number: i64) -> Self {
        Self {
            number,
            start: true,
        }
    }

    pub fn resume(number: i64) -> Self {
        Self {
            number,
            start: false,
        }
    }
}

/// A command given as a ready-made document. Its response is the whole
/// reply.
///
/// # Example
/// ```rust
/// use docwire_client::{Command, RawCommand};
/// use docwire_common::Document;
///
/// let ping = RawCommand(Document::new().with("ping", 1));
/// assert_eq!(ping.fields().keys().next(), Some("ping"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand(pub Document);

impl Command for RawCommand {
    type Response = Document;

    fn fields(&self) -> Document {
        self.0.clone()
    }

    fn decode(reply: Fields<'_>) -> Result<Document> {
        Ok(reply.document().clone())
    }
}

impl DatabaseCommand for RawCommand {}
impl AdministrativeCommand for RawCommand {}
impl TransactableCommand for RawCommand {}

/// Merge routing and session metadata into a command's fields.
pub(crate) fn envelope(
    mut fields: Document,
    database: &Database,
    transaction: Option<&Transaction>,
    session: Option<&SessionId>,
) -> Document {
    fields.insert("$db", database.name());
    if let Some(session) = session {
        fields.insert("lsid", session.to_document());
    }
    if let Some(transaction) = transaction {
        fields.insert("txnNumber", transaction.number);
        if transaction.start {
            fields.insert("startTransaction", true);
        }
        fields.insert("autocommit", false);
    }
    fields
}

/// Check a reply's status and hand it to the command's decoder.
pub(crate) fn decode_reply<C: Command>(reply: Document) -> Result<C::Response> {
    let fields = Fields::new(&reply)?;
    status(&fields)?;
    C::decode(fields)
}

/// Interpret the `ok` field.
///
/// Success is `true` or a numeric 1; failure is `false` or a numeric 0.
/// A failed reply becomes a [`ServerError`] built from `errmsg`, `code`
/// and `codeName`.
pub(crate) fn status(reply: &Fields<'_>) -> Result<()> {
    let ok = match reply.require("ok")? {
        Value::Bool(ok) => *ok,
        Value::Int32(1) | Value::Int64(1) => true,
        Value::Int32(0) | Value::Int64(0) => false,
        Value::Double(d) if *d == 1.0 => true,
        Value::Double(d) if *d == 0.0 => false,
        other @ (Value::Int32(_) | Value::Int64(_) | Value::Double(_)) => {
            return Err(ProtocolError::InvalidStatusValue(other.to_string()).into());
        }
        other => return Err(ProtocolError::InvalidStatusType(other.value_type()).into()),
    };

    if ok {
        return Ok(());
    }

    let message = reply
        .get("errmsg")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Err(ServerError {
        message: message.to_string(),
        code: reply
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok()),
        code_name: reply
            .get("codeName")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwire_common::{DocwireError, ValueType};
    use pretty_assertions::assert_eq;

    fn check(ok: impl Into<Value>) -> Result<()> {
        let reply = Document::new().with("ok", ok);
        status(&Fields::new(&reply).unwrap())
    }

    #[test]
    fn test_status_accepts_every_success_form() {
        assert!(check(true).is_ok());
        assert!(check(1).is_ok());
        assert!(check(1i64).is_ok());
        assert!(check(1.0).is_ok());
    }

    #[test]
    fn test_status_failure_forms() {
        for ok in [
            Value::Bool(false),
            Value::Int32(0),
            Value::Int64(0),
            Value::Double(0.0),
        ] {
            assert_eq!(
                check(ok),
                Err(DocwireError::Server(ServerError::new("")))
            );
        }
    }

    #[test]
    fn test_status_rejects_other_types_and_values() {
        assert_eq!(
            check("1"),
            Err(ProtocolError::InvalidStatusType(ValueType::String).into())
        );
        assert_eq!(
            check(Value::Null),
            Err(ProtocolError::InvalidStatusType(ValueType::Null).into())
        );
        assert_eq!(
            check(2),
            Err(ProtocolError::InvalidStatusValue("2".into()).into())
        );

        let reply = Document::new().with("n", 1);
        assert_eq!(
            status(&Fields::new(&reply).unwrap()),
            Err(ProtocolError::MissingField("ok".into()).into())
        );
    }

    #[test]
    fn test_server_error_fields() {
        let reply = Document::new()
            .with("ok", 0.0)
            .with("errmsg", "ns not found")
            .with("code", 26)
            .with("codeName", "NamespaceNotFound");
        assert_eq!(
            status(&Fields::new(&reply).unwrap()),
            Err(DocwireError::Server(ServerError {
                message: "ns not found".into(),
                code: Some(26),
                code_name: Some("NamespaceNotFound".into()),
            }))
        );
    }

    #[test]
    fn test_envelope() {
        let session = SessionId::new();
        let doc = envelope(
            Document::new().with("find", "users"),
            &Database::new("app"),
            Some(&Transaction::start(3)),
            Some(&session),
        );
        assert_eq!(
            doc.keys().collect::<Vec<_>>(),
            ["find", "$db", "lsid", "txnNumber", "startTransaction", "autocommit"]
        );
        assert_eq!(doc["$db"], Value::from("app"));
        assert_eq!(doc["txnNumber"], Value::Int64(3));
        assert_eq!(doc["autocommit"], Value::Bool(false));
        assert_eq!(doc["lsid"], Value::Document(session.to_document()));

        let resumed = envelope(Document::new(), &Database::admin(), Some(&Transaction::resume(3)), None);
        assert!(!resumed.contains_key("startTransaction"));
        assert!(!resumed.contains_key("lsid"));
    }

    #[test]
    fn test_duplicate_reply_keys_rejected() {
        let mut reply = Document::new();
        reply.append("ok", 1);
        reply.append("ok", 0);
        assert_eq!(
            decode_reply::<RawCommand>(reply),
            Err(ProtocolError::DuplicateKey("ok".into()).into())
        );
    }
}
