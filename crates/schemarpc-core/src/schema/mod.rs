//! Schema descriptors.
//!
//! A schema declares services, their methods, and the message shape each
//! method takes and returns. It is loaded once at process start, validated,
//! and shared read-only afterwards.

mod loader;
mod types;

pub use loader::SchemaSet;
pub use types::{
    FieldDescriptor, FieldType, FieldValue, MessageShape, MethodDescriptor, MethodKey,
    ServiceDescriptor,
};
