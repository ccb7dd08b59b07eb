use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::traits::{ApplyProvider, CaptureProvider, IdentityProvider};

/// A capability an external provider may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Capture,
    Apply,
    Identity,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Capture => "capture",
            Self::Apply => "apply",
            Self::Identity => "identity",
        };
        f.write_str(name)
    }
}

/// An external integration. Each capability is probed explicitly; a provider
/// that does not implement one simply returns `None`.
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    fn as_capture(&self) -> Option<&dyn CaptureProvider> {
        None
    }

    fn as_apply(&self) -> Option<&dyn ApplyProvider> {
        None
    }

    fn as_identity(&self) -> Option<&dyn IdentityProvider> {
        None
    }
}

/// Public information about a registered provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub capabilities: Vec<Capability>,
}

/// Ordered set of providers. Capability lookups return the first provider
/// that exposes the capability.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let info = describe(provider.as_ref());
        info!(provider = %info.id, capabilities = ?info.capabilities, "Provider registered");
        self.providers.push(provider);
    }

    pub fn capture(&self) -> Option<&dyn CaptureProvider> {
        self.providers.iter().find_map(|p| p.as_capture())
    }

    pub fn apply(&self) -> Option<&dyn ApplyProvider> {
        self.providers.iter().find_map(|p| p.as_apply())
    }

    pub fn identity(&self) -> Option<&dyn IdentityProvider> {
        self.providers.iter().find_map(|p| p.as_identity())
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers.iter().map(|p| describe(p.as_ref())).collect()
    }
}

fn describe(provider: &dyn Provider) -> ProviderInfo {
    let mut capabilities = Vec::new();
    if provider.as_capture().is_some() {
        capabilities.push(Capability::Capture);
    }
    if provider.as_apply().is_some() {
        capabilities.push(Capability::Apply);
    }
    if provider.as_identity().is_some() {
        capabilities.push(Capability::Identity);
    }
    ProviderInfo {
        id: provider.id().to_string(),
        capabilities,
    }
}
