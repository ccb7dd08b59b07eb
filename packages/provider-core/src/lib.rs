pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::ProviderError;
pub use registry::{Capability, Provider, ProviderInfo, ProviderRegistry};
pub use traits::{ApplyProvider, CaptureProvider, IdentityProvider};
pub use types::{ActorIdentity, AuxKind, AuxPayloads, CapturedState, ProfileId};
