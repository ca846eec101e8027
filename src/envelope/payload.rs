use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can travel through the outbox: a response, an event or a
/// command.
///
/// The type tag names the type inside stored envelopes. It defaults to the
/// fully-qualified Rust type name; override it (or use [`crate::payload!`])
/// when stored records must survive a type being moved or renamed.
pub trait Payload: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    fn type_tag() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased [`Payload`], as held by an outbox.
pub trait AnyPayload: fmt::Debug + Send + Sync {
    /// Type tag of the concrete payload.
    fn tag(&self) -> &'static str;

    /// Serialized body, without the envelope.
    fn to_body(&self) -> Result<String, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;

    fn clone_payload(&self) -> Box<dyn AnyPayload>;
}

impl<T: Payload> AnyPayload for T {
    fn tag(&self) -> &'static str {
        <T as Payload>::type_tag()
    }

    fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_payload(&self) -> Box<dyn AnyPayload> {
        Box::new(self.clone())
    }
}

impl dyn AnyPayload {
    pub fn is<T: Payload>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl Clone for Box<dyn AnyPayload> {
    fn clone(&self) -> Self {
        (**self).clone_payload()
    }
}

/// Implement [`Payload`] for one or more types, optionally with an explicit
/// type tag.
///
/// ```ignore
/// payload!(OrderPlaced, OrderShipped);
/// payload!(PlaceOrder => "orders.PlaceOrder");
/// ```
#[macro_export]
macro_rules! payload {
    ($ty:ty => $tag:expr) => {
        impl $crate::Payload for $ty {
            fn type_tag() -> &'static str {
                $tag
            }
        }
    };
    ($($ty:ty),+ $(,)?) => {
        $(impl $crate::Payload for $ty {})+
    };
}

payload!(String, bool, i32, i64, u32, u64, f64);
