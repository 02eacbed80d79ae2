//! Compile-time method descriptions.
//!
//! Implementing [`UnaryMethod`] ties a schema method to concrete Rust
//! request/response types. The schema stays the source of truth: typed
//! values are converted through the declared shapes on every call.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A unary method known at compile time.
pub trait UnaryMethod: Send + Sync + 'static {
    /// Service name as declared in the schema.
    const SERVICE: &'static str;
    /// Method name as declared in the schema.
    const METHOD: &'static str;

    type Request: Serialize + DeserializeOwned + Send + 'static;
    type Response: Serialize + DeserializeOwned + Send + 'static;
}
