//! Envelope - type-tagged storage form of responses, events and commands.
//!
//! ```text
//! payload ──encode──▶ {"type": "orders.OrderPlaced", "body": "{...}"}
//!                                    │
//!            decode ◀── TypesCache ◀─┴─ TypeSource (builtin, registries...)
//! ```

mod cache;
mod codec;
mod error;
mod payload;
mod registry;

pub use cache::{SourceSetId, TypesCache};
pub use codec::{Envelope, EnvelopeCodec, EnvelopeCodecBuilder};
pub use error::CodecError;
pub use payload::{AnyPayload, Payload};
pub use registry::{builtin_types, PayloadType, TypeRegistry, TypeSource};
