//! Output formatting for shell results

use colored::*;
use docwire_client::{Handshake, Host};
use docwire_common::{DocwireError, Document, Value};

/// Renders replies and handshakes for the terminal.
pub struct Formatter {
    color: bool,
}

impl Formatter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Summary of the server's handshake reply.
    pub fn handshake(&self, host: &Host, handshake: &Handshake) -> String {
        let mut out = format!("{} {}\n", self.paint("Connected to", Style::Heading), host);

        let mut rows = vec![
            ("wire versions", format!("{}..={}", handshake.min_wire_version, handshake.max_wire_version)),
            (
                "session timeout",
                format!("{} min", handshake.logical_session_timeout_minutes),
            ),
            ("writable primary", handshake.is_writable_primary.to_string()),
        ];
        if let Some(name) = &handshake.set_name {
            rows.push(("replica set", name.clone()));
        }
        if let Some(id) = handshake.connection_id {
            rows.push(("connection id", id.to_string()));
        }
        if handshake.read_only {
            rows.push(("read only", "true".to_string()));
        }

        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, value) in rows {
            out.push_str(&format!(
                "  {}  {}\n",
                self.paint(&format!("{label:<width$}"), Style::Label),
                value
            ));
        }
        out
    }

    /// A document in shell notation, one field per line.
    pub fn document(&self, document: &Document) -> String {
        let mut out = String::new();
        self.write_document(&mut out, document, 0);
        out
    }

    /// A document as pretty-printed relaxed extended JSON.
    pub fn json(&self, document: &Document) -> String {
        serde_json::to_string_pretty(&document.to_json())
            .unwrap_or_else(|_| document.to_json().to_string())
    }

    pub fn error(&self, error: &DocwireError) -> String {
        format!(
            "{} {}",
            self.paint(&format!("{}:", error.kind()), Style::Error),
            error.message()
        )
    }

    fn write_document(&self, out: &mut String, document: &Document, indent: usize) {
        if document.is_empty() {
            out.push_str("{}");
            return;
        }

        let prefix = " ".repeat(indent);
        out.push_str("{\n");
        let last = document.len() - 1;
        for (i, (key, value)) in document.iter().enumerate() {
            out.push_str(&prefix);
            out.push_str("  ");
            out.push_str(&self.paint(&render_key(key), Style::Key));
            out.push_str(": ");
            self.write_value(out, value, indent + 2);
            if i < last {
                out.push(',');
            }
            out.push('\n');
        }
        out.push_str(&prefix);
        out.push('}');
    }

    fn write_value(&self, out: &mut String, value: &Value, indent: usize) {
        match value {
            Value::Document(doc) => self.write_document(out, doc, indent),
            Value::Array(items) if items.values().all(is_simple) => {
                // Simple array, print on one line
                out.push('[');
                for (i, item) in items.values().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.scalar(item));
                }
                out.push(']');
            }
            Value::Array(items) => {
                let prefix = " ".repeat(indent);
                out.push_str("[\n");
                let last = items.len().saturating_sub(1);
                for (i, item) in items.values().enumerate() {
                    out.push_str(&prefix);
                    out.push_str("  ");
                    self.write_value(out, item, indent + 2);
                    if i < last {
                        out.push(',');
                    }
                    out.push('\n');
                }
                out.push_str(&prefix);
                out.push(']');
            }
            Value::CodeWithScope { code, scope } => {
                out.push_str(&self.paint(&format!("Code({}, ", quote(code)), Style::Special));
                self.write_document(out, scope, indent);
                out.push_str(&self.paint(")", Style::Special));
            }
            _ => out.push_str(&self.scalar(value)),
        }
    }

    fn scalar(&self, value: &Value) -> String {
        match value {
            Value::Null => self.paint("null", Style::Dim),
            Value::Undefined => self.paint("undefined", Style::Dim),
            Value::Bool(b) => self.paint(&b.to_string(), Style::Bool),
            Value::Int32(i) => self.paint(&i.to_string(), Style::Number),
            Value::Int64(i) => self.paint(&format!("NumberLong({i})"), Style::Number),
            Value::Double(d) => self.paint(&format!("{d:?}"), Style::Number),
            Value::Decimal128(d) => self.paint(
                &format!("Decimal128Bits(\"{}\")", hex_words(d.high(), d.low())),
                Style::Number,
            ),
            Value::String(s) => self.paint(&quote(s), Style::String),
            Value::Symbol(s) => self.paint(&format!("Symbol({})", quote(s)), Style::String),
            Value::Code(code) => self.paint(&format!("Code({})", quote(code)), Style::Special),
            Value::Binary(b) => self.paint(
                &format!("BinData({}, \"{}\")", b.subtype.code(), hex::encode(&b.bytes)),
                Style::Special,
            ),
            Value::ObjectId(id) => self.paint(&format!("ObjectId(\"{id}\")"), Style::Special),
            Value::DateTime(dt) => {
                let text = match dt.to_chrono() {
                    Some(utc) => format!("ISODate(\"{}\")", utc.to_rfc3339()),
                    None => format!("Date({})", dt.millis()),
                };
                self.paint(&text, Style::Special)
            }
            Value::Timestamp(ts) => self.paint(
                &format!("Timestamp({}, {})", ts.seconds, ts.increment),
                Style::Special,
            ),
            Value::Regex(r) => {
                self.paint(&format!("/{}/{}", r.pattern(), r.options()), Style::String)
            }
            Value::DbPointer { namespace, id } => self.paint(
                &format!("DBPointer({}, ObjectId(\"{id}\"))", quote(namespace)),
                Style::Special,
            ),
            Value::MinKey => self.paint("MinKey", Style::Special),
            Value::MaxKey => self.paint("MaxKey", Style::Special),
            // Containers are handled by write_value.
            Value::Document(_) | Value::Array(_) | Value::CodeWithScope { .. } => value.to_string(),
        }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if !self.color {
            return text.to_string();
        }
        let colored = match style {
            Style::Heading => text.green().bold(),
            Style::Label => text.dimmed(),
            Style::Key => text.cyan(),
            Style::String => text.yellow(),
            Style::Number => text.cyan(),
            Style::Bool => text.green(),
            Style::Special => text.bright_blue(),
            Style::Dim => text.dimmed(),
            Style::Error => text.red().bold(),
        };
        colored.to_string()
    }
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Heading,
    Label,
    Key,
    String,
    Number,
    Bool,
    Special,
    Dim,
    Error,
}

fn is_simple(value: &Value) -> bool {
    !matches!(
        value,
        Value::Document(_) | Value::Array(_) | Value::CodeWithScope { .. }
    )
}

/// Keys that are plain identifiers print bare.
fn render_key(key: &str) -> String {
    let bare = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if bare { key.to_string() } else { quote(key) }
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn hex_words(high: u64, low: u64) -> String {
    format!("{high:016x}{low:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwire_common::{ObjectId, Regex};
    use pretty_assertions::assert_eq;

    fn plain() -> Formatter {
        Formatter::new(false)
    }

    #[test]
    fn test_document_layout() {
        let doc = Document::new()
            .with("ok", 1.0)
            .with("n", 3)
            .with("total", 9_000_000_000i64)
            .with("tags", Value::array(["a", "b"]))
            .with("cursor", Document::new().with("id", 0i64).with("first batch", Value::array(Vec::<Value>::new())));

        assert_eq!(
            plain().document(&doc),
            r#"{
  ok: 1.0,
  n: 3,
  total: NumberLong(9000000000),
  tags: ["a", "b"],
  cursor: {
    id: NumberLong(0),
    "first batch": []
  }
}"#
        );
    }

    #[test]
    fn test_nested_array_layout() {
        let doc = Document::new().with(
            "rows",
            Value::array([Value::from(Document::new().with("x", 1)), Value::Null]),
        );
        assert_eq!(
            plain().document(&doc),
            "{\n  rows: [\n    {\n      x: 1\n    },\n    null\n  ]\n}"
        );
    }

    #[test]
    fn test_special_scalars() {
        let f = plain();
        let id = ObjectId::from_hex("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(f.scalar(&Value::ObjectId(id)), r#"ObjectId("507f1f77bcf86cd799439011")"#);
        assert_eq!(
            f.scalar(&Value::Regex(Regex::new("^a", "im").unwrap())),
            "/^a/im"
        );
        assert_eq!(f.scalar(&Value::from("say \"hi\"")), r#""say \"hi\"""#);
        assert_eq!(f.scalar(&Value::MinKey), "MinKey");
        assert_eq!(plain().document(&Document::new()), "{}");
    }

    #[test]
    fn test_handshake_summary() {
        let handshake = Handshake {
            max_wire_version: 21,
            min_wire_version: 0,
            logical_session_timeout_minutes: 30,
            is_writable_primary: true,
            max_bson_object_size: None,
            max_message_size_bytes: None,
            max_write_batch_size: None,
            local_time: None,
            read_only: false,
            connection_id: Some(4),
            set_name: Some("rs0".into()),
            hosts: Vec::new(),
            sasl_supported_mechs: Vec::new(),
        };
        assert_eq!(
            plain().handshake(&Host::new("db", 27017), &handshake),
            "Connected to db:27017\n  \
             wire versions     0..=21\n  \
             session timeout   30 min\n  \
             writable primary  true\n  \
             replica set       rs0\n  \
             connection id     4\n"
        );
    }

    #[test]
    fn test_json_output() {
        let doc = Document::new().with("ok", 1);
        assert_eq!(plain().json(&doc), "{\n  \"ok\": 1\n}");
    }

    #[test]
    fn test_error_line() {
        let error = DocwireError::Configuration("server did not report maxWireVersion".into());
        assert_eq!(
            plain().error(&error),
            "configuration_error: server did not report maxWireVersion"
        );
    }

    #[test]
    fn test_color_only_when_enabled() {
        colored::control::set_override(true);
        let colored = Formatter::new(true).scalar(&Value::from("x"));
        assert!(colored.contains("\u{1b}["));
        assert_eq!(plain().scalar(&Value::from("x")), "\"x\"");
    }
}
