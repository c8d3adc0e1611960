//! Common library for docwire
//!
//! This crate provides the value model, the binary document codec and the
//! message framing shared by the docwire client and tools.
//!
//! Modules:
//! * `error`: Error families for every layer of the stack.
//! * `value`: Wire value types.
//! * `document`: Ordered documents and their duplicate-checked field view.
//! * `codec`: Document encoding and decoding.
//! * `canonical`: Canonical forms and document equivalence.
//! * `protocol`: Message headers, bodies and stream framing.

pub mod canonical;
pub mod codec;
pub mod document;
pub mod error;
pub mod fields;
pub mod protocol;
pub mod value;

// Re-export commonly used types at the base
pub use document::Document;
pub use error::*;
pub use fields::Fields;
pub use value::{
    Binary, BinarySubtype, DateTime, Decimal128, ObjectId, Regex, Timestamp, Value, ValueType,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
