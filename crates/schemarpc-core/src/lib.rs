//! schemarpc - schema-defined unary RPC.
//!
//! A schema declares services, their methods and the request/response
//! message shapes. Servers bind handlers to declared methods in a
//! [`HandlerRegistry`] and serve them with [`RpcServer`]; clients call them
//! through an [`RpcClient`] built from the same schema.
//!
//! # Example
//!
//! ```rust,ignore
//! use schemarpc_core::{greeter, Address, HandlerRegistry, RpcClient, RpcServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> schemarpc_core::Result<()> {
//!     let schema = Arc::new(greeter::schema()?);
//!
//!     let mut registry = HandlerRegistry::new(schema.clone());
//!     greeter::register(&mut registry)?;
//!     let server = RpcServer::bind(&Address::new("127.0.0.1", 0), Arc::new(registry)).await?;
//!
//!     let client = RpcClient::new(server.local_address(), schema);
//!     let reply = client
//!         .call_typed::<greeter::SayHello>(&greeter::HelloRequest::named("Alice"))
//!         .await?;
//!     println!("{}", reply.message);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod greeter;
pub mod message;
pub mod method;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;
pub mod transport;

// Re-export commonly used types
pub use client::{CallState, RpcClient, UnaryCall};
pub use config::{ClientConfig, RpcConfig};
pub use error::{Result, RpcError};
pub use message::Message;
pub use method::UnaryMethod;
pub use registry::{Handler, HandlerRegistry};
pub use schema::{FieldType, FieldValue, MessageShape, MethodDescriptor, SchemaSet};
pub use server::{RpcServer, RpcServerHandle};
pub use transport::Address;
