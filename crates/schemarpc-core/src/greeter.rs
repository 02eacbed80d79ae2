//! Reference greeter service.
//!
//! `say_hello` is a plain function so any front end (this crate's server or
//! something else entirely) can reuse it unchanged.

use crate::error::Result;
use crate::method::UnaryMethod;
use crate::registry::HandlerRegistry;
use crate::schema::SchemaSet;
use serde::{Deserialize, Serialize};
use tracing::info;

/// The greeter schema, also shipped as `schema/greeter.json`.
pub const SCHEMA: &str = include_str!("../schema/greeter.json");

pub const SERVICE: &str = "Greeter";

/// Name greeted when the request leaves `name` out.
pub const DEFAULT_NAME: &str = "world";

/// Parse the embedded greeter schema.
pub fn schema() -> Result<SchemaSet> {
    SchemaSet::from_json(SCHEMA)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl HelloRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
}

/// `Greeter/SayHello`.
pub struct SayHello;

impl UnaryMethod for SayHello {
    const SERVICE: &'static str = SERVICE;
    const METHOD: &'static str = "SayHello";
    type Request = HelloRequest;
    type Response = HelloReply;
}

/// Greet the requested name. An empty or missing name greets the default.
pub fn say_hello(request: HelloRequest) -> Result<HelloReply> {
    let name = request
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string());
    info!("Received greeting request for: {}", name);

    Ok(HelloReply {
        message: format!("Hello, {}", name),
    })
}

/// Register every greeter handler.
pub fn register(registry: &mut HandlerRegistry) -> Result<()> {
    registry.register_typed::<SayHello, _>(say_hello)
}
