//! Environment helpers shared by the providers' `from_env` constructors.

use std::str::FromStr;
use std::sync::Arc;

use vb_core::{ReqwestTransport, Transport, TransportConfig, with_logging};

use crate::ConfigError;

/// Whether a backend accepts a resize while the instance is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
    /// A running instance is rejected with `Conflict` unless the caller
    /// explicitly asks to resize it anyway.
    RequireStopped,
    AllowRunning,
}

impl FromStr for ResizePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require_stopped" | "stopped" => Ok(Self::RequireStopped),
            "allow_running" | "running" => Ok(Self::AllowRunning),
            other => Err(other.to_string()),
        }
    }
}

pub(crate) fn require(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(var.into())),
    }
}

pub(crate) fn parse_or<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var: var.into(),
            value,
        }),
        _ => Ok(default),
    }
}

pub(crate) fn flag(var: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidEnv {
                var: var.into(),
                value,
            }),
        },
        Err(_) => Ok(default),
    }
}

/// A reqwest transport, wrapped in request logging unless
/// `PROVISION_LOG_REQUESTS` turns it off.
pub(crate) fn transport(
    provider: &'static str,
    config: &TransportConfig,
) -> Result<Arc<dyn Transport>, ConfigError> {
    let inner = ReqwestTransport::new(config).map_err(|e| ConfigError::Transport(e.message))?;
    let log_requests = flag("PROVISION_LOG_REQUESTS", true)?;
    Ok(with_logging(Arc::new(inner), provider, log_requests))
}
