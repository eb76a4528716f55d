// shot-lifter/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::contract::ObjectAcl;
use crate::resilience::{BreakerConfig, RetryConfig};
use crate::synchronise::UploadOptions;

/// Fully resolved configuration: the YAML file merged with the environment.
#[derive(Debug, Clone)]
pub struct LifterConfig {
    pub upload: UploadConfig,
    pub store: StoreConfig,
    pub resilience: ResilienceConfig,
}

impl LifterConfig {
    pub fn trace_loaded(&self) {
        self.upload.trace_loaded();
        info!(
            region = self.store.region.as_deref().unwrap_or("<default chain>"),
            endpoint_url = self.store.endpoint_url.as_deref().unwrap_or("<aws>"),
            force_path_style = self.store.force_path_style,
            "Loaded store config"
        );
        debug!(resilience = ?self.resilience, "Loaded resilience config");
    }
}

/// What to upload and where.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub source_dir: PathBuf,
    pub bucket: String,
    pub prefix: Option<String>,
    pub acl: ObjectAcl,
    pub max_concurrency: usize,
    pub absence_timeout: Duration,
}

impl UploadConfig {
    pub fn trace_loaded(&self) {
        info!(
            source_dir = %self.source_dir.display(),
            bucket = %self.bucket,
            prefix = self.prefix.as_deref().unwrap_or(""),
            acl = self.acl.as_str(),
            max_concurrency = self.max_concurrency,
            "Loaded upload config"
        );
    }

    pub fn options(&self) -> UploadOptions {
        UploadOptions {
            max_concurrency: self.max_concurrency,
            acl: Some(self.acl),
            absence_timeout: self.absence_timeout,
        }
    }
}

/// Object-store connection settings. Credentials are never part of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}
