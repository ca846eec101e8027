use std::collections::HashMap;
use std::fmt;

use super::payload::{AnyPayload, Payload};

type DecodeFn = fn(&str) -> Result<Box<dyn AnyPayload>, serde_json::Error>;

/// How to rebuild one payload type from its serialized body.
#[derive(Clone, Copy)]
pub struct PayloadType {
    type_tag: &'static str,
    decode: DecodeFn,
}

impl PayloadType {
    pub fn of<T: Payload>() -> Self {
        Self {
            type_tag: T::type_tag(),
            decode: decode_as::<T>,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        self.type_tag
    }

    pub fn decode(&self, body: &str) -> Result<Box<dyn AnyPayload>, serde_json::Error> {
        (self.decode)(body)
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PayloadType").field(&self.type_tag).finish()
    }
}

fn decode_as<T: Payload>(body: &str) -> Result<Box<dyn AnyPayload>, serde_json::Error> {
    let value: T = serde_json::from_str(body)?;
    Ok(Box::new(value))
}

/// A place type tags can be resolved from.
///
/// Sources are consulted in registration order and the first match wins.
pub trait TypeSource: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, type_tag: &str) -> Option<PayloadType>;
}

/// Explicit tag → type registry, populated before any decoding happens.
///
/// ```ignore
/// let registry = TypeRegistry::new("orders")
///     .register::<OrderPlaced>()
///     .register::<PlaceOrder>();
/// ```
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    name: String,
    types: HashMap<&'static str, PayloadType>,
}

impl TypeRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: HashMap::new(),
        }
    }

    pub fn register<T: Payload>(mut self) -> Self {
        self.insert::<T>();
        self
    }

    pub fn insert<T: Payload>(&mut self) {
        let payload_type = PayloadType::of::<T>();
        self.types.insert(payload_type.type_tag(), payload_type);
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.types.contains_key(type_tag)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeSource for TypeRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, type_tag: &str) -> Option<PayloadType> {
        self.types.get(type_tag).copied()
    }
}

/// Primitive payloads every codec understands.
pub fn builtin_types() -> TypeRegistry {
    TypeRegistry::new("builtin")
        .register::<String>()
        .register::<bool>()
        .register::<i32>()
        .register::<i64>()
        .register::<u32>()
        .register::<u64>()
        .register::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_registered_tags_only() {
        let registry = builtin_types();
        assert_eq!(registry.len(), 7);

        let payload_type = registry.resolve("i64").unwrap();
        let value = payload_type.decode("42").unwrap();
        assert_eq!(value.downcast_ref::<i64>(), Some(&42));

        assert!(registry.resolve("orders::OrderPlaced").is_none());
    }

    #[test]
    fn decode_reports_malformed_bodies() {
        let payload_type = PayloadType::of::<u32>();
        assert!(payload_type.decode("\"not a number\"").is_err());
    }
}
