pub mod cache;
pub mod config;
pub mod normalize;
pub mod resolve;
pub mod twentyi;
pub mod types;
pub mod virtualizor;
pub mod vultr;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::{
    ChangePasswordParams, ConnectionInfo, ConnectionParams, CreateParams, InstanceId, IsoStatus,
    ReinstallParams, Reply, ResizeParams, ServerInfo,
};
use vb_core::{ClassifiedError, Result};

pub use config::ResizePolicy;

/// Failures while wiring providers up from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("http transport: {0}")]
    Transport(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Known backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Virtualizor,
    #[serde(alias = "20i")]
    TwentyI,
    Vultr,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Virtualizor => "virtualizor",
            Self::TwentyI => "twentyi",
            Self::Vultr => "vultr",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "virtualizor" => Ok(Self::Virtualizor),
            "twentyi" | "20i" => Ok(Self::TwentyI),
            "vultr" => Ok(Self::Vultr),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Uniform VPS lifecycle contract.
///
/// Each backend implements this independently and owns its configuration.
/// Operations a backend cannot perform keep the default body, which fails with
/// `Unsupported` before any remote call is made.
#[async_trait]
pub trait ServerProvider: Send + Sync + 'static {
    /// Provider identifier.
    fn name(&self) -> ProviderName;

    /// Resolve plan, image and placement, then order the instance.
    /// Not idempotent: a retry may create a second instance.
    async fn create(&self, params: &CreateParams) -> Result<Reply<ServerInfo>>;

    async fn get_info(&self, id: &InstanceId) -> Result<Reply<ServerInfo>>;

    async fn get_connection(
        &self,
        id: &InstanceId,
        params: &ConnectionParams,
    ) -> Result<Reply<ConnectionInfo>>;

    async fn change_root_password(
        &self,
        _id: &InstanceId,
        _params: &ChangePasswordParams,
    ) -> Result<Reply<ServerInfo>> {
        Err(ClassifiedError::unsupported("change_root_password"))
    }

    async fn resize(&self, _id: &InstanceId, _params: &ResizeParams) -> Result<Reply<ServerInfo>> {
        Err(ClassifiedError::unsupported("resize"))
    }

    /// Destructive. Returns as soon as the backend accepts the request.
    async fn reinstall(&self, id: &InstanceId, params: &ReinstallParams) -> Result<Reply<ServerInfo>>;

    async fn reboot(&self, id: &InstanceId) -> Result<Reply<ServerInfo>>;

    /// No-op success when the instance is already running.
    async fn power_on(&self, id: &InstanceId) -> Result<Reply<ServerInfo>>;

    /// No-op success when the instance is already off.
    async fn shutdown(&self, id: &InstanceId) -> Result<Reply<ServerInfo>>;

    async fn suspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>>;

    async fn unsuspend(&self, id: &InstanceId) -> Result<Reply<ServerInfo>>;

    async fn attach_recovery_iso(&self, _id: &InstanceId) -> Result<Reply<ServerInfo>> {
        Err(ClassifiedError::unsupported("attach_recovery_iso"))
    }

    async fn detach_recovery_iso(&self, _id: &InstanceId) -> Result<Reply<ServerInfo>> {
        Err(ClassifiedError::unsupported("detach_recovery_iso"))
    }

    async fn recovery_iso_status(&self, _id: &InstanceId) -> Result<Reply<IsoStatus>> {
        Err(ClassifiedError::unsupported("recovery_iso_status"))
    }

    /// Irreversible.
    async fn terminate(&self, _id: &InstanceId) -> Result<Reply<()>> {
        Err(ClassifiedError::unsupported("terminate"))
    }
}

/// Registry of all configured providers.
///
/// Each provider is constructed from environment variables at startup.
/// Providers whose required env vars are missing are skipped.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderName, Arc<dyn ServerProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: Arc<dyn ServerProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: ProviderName) -> Option<&Arc<dyn ServerProvider>> {
        self.providers.get(&name)
    }

    /// Names of all available providers, in a stable order.
    pub fn available(&self) -> Vec<ProviderName> {
        let mut names: Vec<_> = self.providers.keys().copied().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Build all providers whose required env vars are present.
///
/// Providers with missing configuration are skipped with a debug log.
/// Returns an error only if no providers could be constructed at all.
pub fn build_providers() -> std::result::Result<ProviderRegistry, ConfigError> {
    dotenvy::dotenv().ok();

    let mut registry = ProviderRegistry::new();

    match virtualizor::VirtualizorProvider::from_env() {
        Ok(p) => {
            tracing::info!("registered Virtualizor provider");
            registry.insert(Arc::new(p));
        }
        Err(e) => tracing::debug!("skipping Virtualizor provider: {e}"),
    }

    match twentyi::TwentyIProvider::from_env() {
        Ok(p) => {
            tracing::info!("registered 20i provider");
            registry.insert(Arc::new(p));
        }
        Err(e) => tracing::debug!("skipping 20i provider: {e}"),
    }

    match vultr::VultrProvider::from_env() {
        Ok(p) => {
            tracing::info!("registered Vultr provider");
            registry.insert(Arc::new(p));
        }
        Err(e) => tracing::debug!("skipping Vultr provider: {e}"),
    }

    if registry.is_empty() {
        return Err(ConfigError::MissingEnv(
            "no providers configured (set VIRTUALIZOR_HOSTNAME, TWENTYI_API_KEY, and/or VULTR_API_TOKEN)"
                .into(),
        ));
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip_through_str() {
        for name in [ProviderName::Virtualizor, ProviderName::TwentyI, ProviderName::Vultr] {
            assert_eq!(name.as_str().parse::<ProviderName>().unwrap(), name);
        }
        assert_eq!("20i".parse::<ProviderName>().unwrap(), ProviderName::TwentyI);
        assert!(matches!(
            "hetzner".parse::<ProviderName>(),
            Err(ConfigError::UnknownProvider(_))
        ));
    }
}
