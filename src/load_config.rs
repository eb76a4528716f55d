use crate::config::{LifterConfig, ResilienceConfig, StoreConfig, UploadConfig};
use crate::contract::ObjectAcl;
use crate::resilience::{BreakerConfig, RetryConfig};
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Environment variable that overrides `upload.bucket`.
pub const BUCKET_ENV: &str = "LIFTER_BUCKET";

pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StaticConfig {
    upload: UploadSection,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    resilience: ResilienceSection,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UploadSection {
    source_dir: PathBuf,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    acl: ObjectAcl,
    #[serde(default = "default_max_concurrency")]
    max_concurrency: usize,
    #[serde(default)]
    absence_timeout_secs: u64,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ResilienceSection {
    max_attempts: u32,
    attempt_timeout_secs: u64,
    retry_delay_ms: u64,
    failure_threshold: f64,
    window_secs: u64,
    cooldown_secs: u64,
    minimum_calls: usize,
}

impl Default for ResilienceSection {
    fn default() -> Self {
        let retry = RetryConfig::default();
        let breaker = BreakerConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            attempt_timeout_secs: retry.attempt_timeout.as_secs(),
            retry_delay_ms: retry.retry_delay.as_millis() as u64,
            failure_threshold: breaker.failure_threshold,
            window_secs: breaker.window.as_secs(),
            cooldown_secs: breaker.cooldown.as_secs(),
            minimum_calls: breaker.minimum_calls,
        }
    }
}

impl ResilienceSection {
    fn validate(self) -> Result<ResilienceConfig> {
        if self.max_attempts == 0 {
            anyhow::bail!("resilience.max_attempts must be at least 1");
        }
        if self.attempt_timeout_secs == 0 {
            anyhow::bail!("resilience.attempt_timeout_secs must be at least 1");
        }
        if self.window_secs == 0 {
            anyhow::bail!("resilience.window_secs must be at least 1");
        }
        if self.cooldown_secs == 0 {
            anyhow::bail!("resilience.cooldown_secs must be at least 1");
        }
        if self.minimum_calls == 0 {
            anyhow::bail!("resilience.minimum_calls must be at least 1");
        }
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            anyhow::bail!(
                "resilience.failure_threshold must be in (0, 1], got {}",
                self.failure_threshold
            );
        }
        Ok(ResilienceConfig {
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
                retry_delay: Duration::from_millis(self.retry_delay_ms),
            },
            breaker: BreakerConfig {
                failure_threshold: self.failure_threshold,
                window: Duration::from_secs(self.window_secs),
                cooldown: Duration::from_secs(self.cooldown_secs),
                minimum_calls: self.minimum_calls,
            },
        })
    }
}

/// Loads the static YAML config file and injects environment overrides.
/// Returns a fully merged LifterConfig or an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LifterConfig> {
    load_config_with(path, None)
}

/// Same as [`load_config`], with `bucket_override` taking precedence over
/// both `LIFTER_BUCKET` and the file.
pub fn load_config_with<P: AsRef<Path>>(
    path: P,
    bucket_override: Option<String>,
) -> Result<LifterConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let non_empty = |b: &String| !b.trim().is_empty();
    let env_bucket = std::env::var(BUCKET_ENV).ok().filter(non_empty);
    let bucket = if let Some(bucket) = bucket_override.filter(non_empty) {
        info!(bucket = %bucket, "Bucket given on the command line, overriding config");
        bucket
    } else if let Some(var) = env_bucket {
        info!(bucket = %var, "{BUCKET_ENV} found in env, overriding config");
        var
    } else if let Some(bucket) = static_conf.upload.bucket.filter(non_empty) {
        bucket
    } else {
        error!("No bucket configured in file, environment or command line");
        anyhow::bail!("upload.bucket must be set in the config file, via {BUCKET_ENV} or with --bucket");
    };

    if static_conf.upload.max_concurrency == 0 {
        error!("upload.max_concurrency must be positive");
        anyhow::bail!("upload.max_concurrency must be at least 1");
    }

    let resilience = static_conf.resilience.validate().map_err(|e| {
        error!(error = %e, "Invalid resilience section");
        e
    })?;

    let upload = UploadConfig {
        source_dir: static_conf.upload.source_dir,
        bucket,
        prefix: static_conf.upload.prefix.filter(|p| !p.is_empty()),
        acl: static_conf.upload.acl,
        max_concurrency: static_conf.upload.max_concurrency,
        absence_timeout: Duration::from_secs(static_conf.upload.absence_timeout_secs),
    };

    let config = LifterConfig {
        upload,
        store: static_conf.store,
        resilience,
    };
    config.trace_loaded();
    Ok(config)
}
