//! Server-managed resources addressed as `rs:/<path>`.

use std::path::PathBuf;

use tracing::debug;
use url::Url;

use crate::config::{SystemConfig, RESOURCE_BASE, RESOURCE_STORAGE};
use crate::error::{SubmitError, SubmitResult};

const RESOURCE_SCHEME: &str = "rs:";

/// Where `rs:/` resources live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceManager {
    /// A directory on the local (or mounted) file system.
    Local { root: PathBuf },
    /// An HTTP file server.
    Http { base: Url },
    /// No resource storage configured; `rs:/` references cannot be resolved.
    Disabled,
}

impl ResourceManager {
    pub fn from_system_config(config: &SystemConfig) -> SubmitResult<Self> {
        let Some(storage) = config
            .get(RESOURCE_STORAGE)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return Ok(Self::Disabled);
        };

        let base = config
            .get(RESOURCE_BASE)
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                SubmitError::Configuration(format!(
                    "`{}` is required when `{}` is `{}`",
                    RESOURCE_BASE, RESOURCE_STORAGE, storage
                ))
            })?;

        match storage.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local {
                root: PathBuf::from(base),
            }),
            "http" => {
                let mut base = Url::parse(base).map_err(|e| {
                    SubmitError::Configuration(format!("invalid `{}`: {}", RESOURCE_BASE, e))
                })?;
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                Ok(Self::Http { base })
            }
            other => Err(SubmitError::Configuration(format!(
                "unsupported `{}`: {}",
                RESOURCE_STORAGE, other
            ))),
        }
    }
}

/// Rewrites `rs:/` references into concrete paths or URLs.
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    manager: ResourceManager,
}

impl ResourceResolver {
    pub fn new(manager: ResourceManager) -> Self {
        Self { manager }
    }

    /// Resolve a reference. Anything that is not an `rs:` reference is
    /// returned unchanged.
    pub fn resolve(&self, reference: &str) -> SubmitResult<String> {
        let Some(rest) = reference.strip_prefix(RESOURCE_SCHEME) else {
            return Ok(reference.to_string());
        };
        let relative = rest.trim_start_matches('/');

        let resolved = match &self.manager {
            ResourceManager::Local { root } => root.join(relative).display().to_string(),
            ResourceManager::Http { base } => base
                .join(relative)
                .map_err(|e| SubmitError::registration(reference, e))?
                .to_string(),
            ResourceManager::Disabled => {
                return Err(SubmitError::registration(
                    reference,
                    "no resource storage is configured",
                ));
            }
        };

        debug!("Resolved {} to {}", reference, resolved);
        Ok(resolved)
    }
}
