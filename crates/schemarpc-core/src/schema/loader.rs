//! Schema source loader.
//!
//! Reads a JSON schema document, validates it and produces an immutable
//! [`SchemaSet`]. Any problem with the source is a `RpcError::Schema`.

use super::types::{
    FieldDescriptor, FieldType, MessageShape, MethodDescriptor, ServiceDescriptor,
};
use crate::error::{Result, RpcError};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw schema document as written on disk.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaSource {
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    messages: Vec<MessageSource>,
    services: Vec<ServiceSource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageSource {
    name: String,
    #[serde(default)]
    fields: Vec<FieldSource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldSource {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    variants: Vec<String>,
    #[serde(default)]
    default: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceSource {
    name: String,
    #[serde(default)]
    methods: Vec<MethodSource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodSource {
    name: String,
    request: String,
    response: String,
}

fn schema_error(message: impl Into<String>) -> RpcError {
    RpcError::Schema {
        message: message.into(),
    }
}

/// Every service declared by one schema source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSet {
    package: Option<String>,
    services: Vec<ServiceDescriptor>,
}

impl SchemaSet {
    /// Load a schema from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            schema_error(format!("Failed to read schema {}: {}", path.display(), e))
        })?;

        let schema = Self::from_json(&content).map_err(|e| match e {
            RpcError::Schema { message } => {
                schema_error(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;

        info!(
            "Loaded schema {} ({} services)",
            path.display(),
            schema.services.len()
        );
        Ok(schema)
    }

    /// Parse and validate a schema from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        let source: SchemaSource = serde_json::from_str(content)
            .map_err(|e| schema_error(format!("Malformed schema: {}", e)))?;
        Self::build(source)
    }

    fn build(source: SchemaSource) -> Result<Self> {
        let mut shapes: HashMap<String, Arc<MessageShape>> = HashMap::new();
        for message in source.messages {
            let shape = Self::build_shape(message)?;
            if shapes.contains_key(&shape.name) {
                return Err(schema_error(format!("Duplicate message: {}", shape.name)));
            }
            shapes.insert(shape.name.clone(), Arc::new(shape));
        }

        if source.services.is_empty() {
            return Err(schema_error("Schema declares no services"));
        }

        let mut services = Vec::with_capacity(source.services.len());
        let mut service_names = HashSet::new();
        for service in source.services {
            if service.name.is_empty() {
                return Err(schema_error("Service has empty name"));
            }
            if !service_names.insert(service.name.clone()) {
                return Err(schema_error(format!("Duplicate service: {}", service.name)));
            }

            let mut methods = Vec::with_capacity(service.methods.len());
            let mut method_names = HashSet::new();
            for method in service.methods {
                if method.name.is_empty() {
                    return Err(schema_error(format!(
                        "Service '{}' has a method with empty name",
                        service.name
                    )));
                }
                if !method_names.insert(method.name.clone()) {
                    return Err(schema_error(format!(
                        "Duplicate method: {}/{}",
                        service.name, method.name
                    )));
                }

                let lookup = |name: &str| {
                    shapes.get(name).cloned().ok_or_else(|| {
                        schema_error(format!(
                            "Method {}/{} references undeclared message '{}'",
                            service.name, method.name, name
                        ))
                    })
                };

                methods.push(MethodDescriptor {
                    service: service.name.clone(),
                    name: method.name.clone(),
                    request: lookup(&method.request)?,
                    response: lookup(&method.response)?,
                });
            }

            debug!("Service {} declares {} methods", service.name, methods.len());
            services.push(ServiceDescriptor {
                name: service.name,
                methods,
            });
        }

        Ok(Self {
            package: source.package,
            services,
        })
    }

    fn build_shape(message: MessageSource) -> Result<MessageShape> {
        if message.name.is_empty() {
            return Err(schema_error("Message has empty name"));
        }

        let mut fields = Vec::with_capacity(message.fields.len());
        let mut names = HashSet::new();
        for field in message.fields {
            if field.name.is_empty() {
                return Err(schema_error(format!(
                    "Message '{}' has a field with empty name",
                    message.name
                )));
            }
            if !names.insert(field.name.clone()) {
                return Err(schema_error(format!(
                    "Duplicate field '{}' in message '{}'",
                    field.name, message.name
                )));
            }
            fields.push(Self::build_field(&message.name, field)?);
        }

        Ok(MessageShape {
            name: message.name,
            fields,
        })
    }

    fn build_field(message: &str, field: FieldSource) -> Result<FieldDescriptor> {
        let field_type = match field.field_type.as_str() {
            "string" => FieldType::String,
            "integer" => FieldType::Integer,
            "boolean" => FieldType::Boolean,
            "enum" => {
                if field.variants.is_empty() {
                    return Err(schema_error(format!(
                        "Enum field {}.{} declares no variants",
                        message, field.name
                    )));
                }
                let mut seen = HashSet::new();
                if let Some(dup) = field.variants.iter().find(|v| !seen.insert(v.as_str())) {
                    return Err(schema_error(format!(
                        "Enum field {}.{} repeats variant '{}'",
                        message, field.name, dup
                    )));
                }
                FieldType::Enum(field.variants.clone())
            }
            other => {
                return Err(schema_error(format!(
                    "Unknown type '{}' for field {}.{}",
                    other, message, field.name
                )))
            }
        };

        if !matches!(field_type, FieldType::Enum(_)) && !field.variants.is_empty() {
            return Err(schema_error(format!(
                "Field {}.{} lists variants but is not an enum",
                message, field.name
            )));
        }

        let default = match &field.default {
            None | Some(serde_json::Value::Null) => field_type.zero_value(),
            Some(value) => field_type.from_json(value).ok_or_else(|| {
                schema_error(format!(
                    "Default {} for field {}.{} is not a valid {}",
                    value, message, field.name, field_type
                ))
            })?,
        };

        Ok(FieldDescriptor {
            name: field.name,
            field_type,
            default,
        })
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Resolve a method, failing with `UnknownMethod` if it is not declared.
    pub fn method(&self, service: &str, method: &str) -> Result<&MethodDescriptor> {
        self.service(service)
            .and_then(|s| s.method(method))
            .ok_or_else(|| RpcError::UnknownMethod {
                service: service.to_string(),
                method: method.to_string(),
            })
    }

    /// All declared methods, in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.services.iter().flat_map(|s| s.methods.iter())
    }
}
