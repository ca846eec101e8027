use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::cache::{SourceSetId, TypesCache};
use super::error::CodecError;
use super::payload::AnyPayload;
use super::registry::{builtin_types, PayloadType, TypeRegistry, TypeSource};

/// Stored form of one payload: its type tag plus its serialized body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub body: String,
}

/// Turns payloads into envelopes and back.
///
/// Type tags are resolved against the configured sources in order, the first
/// match wins, and successful resolutions are remembered in a [`TypesCache`]
/// (the process-wide one unless another cache is given) under this codec's
/// [`SourceSetId`].
#[derive(Clone)]
pub struct EnvelopeCodec {
    sources: Arc<Vec<Arc<dyn TypeSource>>>,
    source_set: SourceSetId,
    cache: Arc<TypesCache>,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("EnvelopeCodec")
            .field("sources", &sources)
            .finish()
    }
}

impl EnvelopeCodec {
    pub fn builder() -> EnvelopeCodecBuilder {
        EnvelopeCodecBuilder::default()
    }

    /// Key of this codec's entries in its [`TypesCache`].
    pub fn source_set(&self) -> SourceSetId {
        self.source_set
    }

    pub fn encode(&self, payload: &dyn AnyPayload) -> Result<String, CodecError> {
        let envelope = Envelope {
            type_tag: payload.tag().to_string(),
            body: payload.to_body()?,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Encode a sequence as a JSON array of envelopes.
    pub fn encode_all(&self, payloads: &[Box<dyn AnyPayload>]) -> Result<String, CodecError> {
        let envelopes = payloads
            .iter()
            .map(|payload| self.encode(payload.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::to_string(&envelopes)?)
    }

    pub fn decode(&self, value: &str) -> Result<Box<dyn AnyPayload>, CodecError> {
        let envelope: Envelope = serde_json::from_str(value)?;
        let payload_type = self.resolve(&envelope.type_tag)?;
        Ok(payload_type.decode(&envelope.body)?)
    }

    pub fn decode_all(&self, value: &str) -> Result<Vec<Box<dyn AnyPayload>>, CodecError> {
        let envelopes: Vec<String> = serde_json::from_str(value)?;
        envelopes.iter().map(|envelope| self.decode(envelope)).collect()
    }

    /// Resolve a type tag, consulting the cache first.
    pub fn resolve(&self, type_tag: &str) -> Result<PayloadType, CodecError> {
        self.cache.get_or_try_insert_with(self.source_set, type_tag, |tag| {
            self.sources
                .iter()
                .find_map(|source| source.resolve(tag))
                .ok_or_else(|| {
                    warn!(type_tag = tag, "type has not been found");
                    CodecError::UnresolvableType {
                        type_tag: tag.to_string(),
                    }
                })
        })
    }
}

/// Builder for [`EnvelopeCodec`]. The built-in primitive types are always the
/// first source.
pub struct EnvelopeCodecBuilder {
    sources: Vec<Arc<dyn TypeSource>>,
    cache: Option<Arc<TypesCache>>,
}

impl Default for EnvelopeCodecBuilder {
    fn default() -> Self {
        Self {
            sources: vec![Arc::new(builtin_types())],
            cache: None,
        }
    }
}

impl EnvelopeCodecBuilder {
    pub fn source(mut self, source: impl TypeSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn types(self, registry: TypeRegistry) -> Self {
        self.source(registry)
    }

    /// Use a private cache instead of the process-wide one.
    pub fn cache(mut self, cache: Arc<TypesCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> EnvelopeCodec {
        EnvelopeCodec {
            sources: Arc::new(self.sources),
            source_set: SourceSetId::next(),
            cache: self.cache.unwrap_or_else(TypesCache::global),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: u64,
        lines: Vec<String>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    enum Priority {
        Low,
        High { reason: String },
    }

    payload!(OrderPlaced => "codec.OrderPlaced");
    payload!(Priority => "codec.Priority");

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::builder()
            .types(
                TypeRegistry::new("orders")
                    .register::<OrderPlaced>()
                    .register::<Priority>(),
            )
            .cache(Arc::new(TypesCache::new()))
            .build()
    }

    #[test]
    fn envelope_carries_tag_and_body() {
        let encoded = codec()
            .encode(&OrderPlaced {
                order_id: 3,
                lines: vec!["a".into()],
            })
            .unwrap();

        let envelope: Envelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(envelope.type_tag, "codec.OrderPlaced");
        assert_eq!(envelope.body, r#"{"order_id":3,"lines":["a"]}"#);
    }

    #[test]
    fn decoded_values_equal_the_originals() {
        let codec = codec();
        let originals: Vec<Box<dyn AnyPayload>> = vec![
            Box::new(OrderPlaced {
                order_id: 9,
                lines: vec!["x".into(), "y".into()],
            }),
            Box::new(Priority::High {
                reason: "vip".into(),
            }),
            Box::new(Priority::Low),
            Box::new(String::from("done")),
            Box::new(-5i64),
            Box::new(true),
        ];

        let decoded = codec.decode_all(&codec.encode_all(&originals).unwrap()).unwrap();

        assert_eq!(decoded.len(), originals.len());
        assert_eq!(
            decoded[0].downcast_ref::<OrderPlaced>(),
            originals[0].downcast_ref::<OrderPlaced>()
        );
        assert_eq!(
            decoded[1].downcast_ref::<Priority>(),
            originals[1].downcast_ref::<Priority>()
        );
        assert_eq!(decoded[2].downcast_ref::<Priority>(), Some(&Priority::Low));
        assert_eq!(decoded[3].downcast_ref::<String>().map(String::as_str), Some("done"));
        assert_eq!(decoded[4].downcast_ref::<i64>(), Some(&-5));
        assert_eq!(decoded[5].downcast_ref::<bool>(), Some(&true));
    }

    #[test]
    fn unresolvable_tag_is_an_error_and_is_not_cached() {
        let cache = Arc::new(TypesCache::new());
        let without_orders = EnvelopeCodec::builder().cache(Arc::clone(&cache)).build();
        let encoded = without_orders
            .encode(&OrderPlaced {
                order_id: 1,
                lines: vec![],
            })
            .unwrap();

        let err = without_orders.decode(&encoded).unwrap_err();
        assert!(
            matches!(err, CodecError::UnresolvableType { ref type_tag } if type_tag == "codec.OrderPlaced")
        );
        assert!(!cache.contains(without_orders.source_set(), "codec.OrderPlaced"));

        let with_orders = EnvelopeCodec::builder()
            .types(TypeRegistry::new("orders").register::<OrderPlaced>())
            .cache(Arc::clone(&cache))
            .build();
        assert!(with_orders.decode(&encoded).is_ok());
        assert!(cache.contains(with_orders.source_set(), "codec.OrderPlaced"));
        assert!(without_orders.decode(&encoded).is_err());
    }

    #[test]
    fn first_source_wins() {
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        struct Shadow(String);
        payload!(Shadow => "i64");

        let codec = EnvelopeCodec::builder()
            .types(TypeRegistry::new("shadowing").register::<Shadow>())
            .cache(Arc::new(TypesCache::new()))
            .build();

        let decoded = codec.decode(&codec.encode(&7i64).unwrap()).unwrap();
        assert_eq!(decoded.downcast_ref::<i64>(), Some(&7));
    }

    #[test]
    fn codecs_sharing_a_cache_resolve_against_their_own_sources() {
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        struct Placed {
            id: u64,
        }
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        struct Raised {
            id: u64,
        }
        payload!(Placed => "shared.Tag");
        payload!(Raised => "shared.Tag");

        let cache = TypesCache::global();
        let orders = EnvelopeCodec::builder()
            .types(TypeRegistry::new("orders").register::<Placed>())
            .build();
        let invoices = EnvelopeCodec::builder()
            .types(TypeRegistry::new("invoices").register::<Raised>())
            .build();
        let builtin_only = EnvelopeCodec::builder().build();
        let encoded = orders.encode(&Placed { id: 4 }).unwrap();

        assert!(builtin_only.decode(&encoded).is_err());
        assert!(orders.decode(&encoded).unwrap().is::<Placed>());
        assert!(cache.contains(orders.source_set(), "shared.Tag"));

        let err = builtin_only.decode(&encoded).unwrap_err();
        assert!(matches!(err, CodecError::UnresolvableType { .. }));
        let decoded = invoices.decode(&encoded).unwrap();
        assert_eq!(decoded.downcast_ref::<Raised>(), Some(&Raised { id: 4 }));
        assert!(!decoded.is::<Placed>());
    }
}
