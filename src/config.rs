//! Configuration types for swift-output
//!
//! [`OutputConfig`] mirrors the plugin's configuration keys one to one. It is
//! plain data: [`OutputConfig::validate`] is the only place that decides whether
//! a configuration is usable, and it performs no I/O.

use crate::error::{Error, Result};
use crate::naming::SequenceNamer;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Output plugin configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Authentication method: "keystone", "tempauth" or "basic"
    pub auth_type: String,

    /// Authentication endpoint
    pub auth_url: String,

    /// Account user name
    pub username: String,

    /// Account password or key
    pub password: String,

    /// Keystone tenant ID
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Keystone tenant name
    #[serde(default)]
    pub tenant_name: Option<String>,

    /// Destination container
    pub container: String,

    /// Prefix prepended to every object key
    pub path_prefix: String,

    /// File name extension, with or without the leading dot
    pub file_ext: String,

    /// printf-style template taking (task index, file index) (default: "%03d.%02d")
    #[serde(default = "default_sequence_format")]
    pub sequence_format: String,

    /// Directory for staging files (default: system temp dir)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Per-request timeout for the object store (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for uploads
    #[serde(flatten)]
    pub retry: RetryConfig,
}

/// Retry configuration for uploads
///
/// Keys are flattened into [`OutputConfig`], so they keep the plugin's names.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (default: 10)
    #[serde(rename = "max_connection_retry", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait before the first retry (default: 500 ms)
    #[serde(
        rename = "initial_retry_wait",
        default = "default_initial_delay",
        with = "duration_millis_serde"
    )]
    pub initial_delay: Duration,

    /// Upper bound for any single wait (default: 30 s)
    #[serde(
        rename = "max_retry_wait",
        default = "default_max_delay",
        with = "duration_millis_serde"
    )]
    pub max_delay: Duration,

    /// Multiplier applied to the wait after each retry (default: 2.0)
    #[serde(rename = "retry_backoff_multiplier", default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to waits (default: false)
    #[serde(rename = "retry_jitter", default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(Error::config(
                "initial_retry_wait",
                "initial_retry_wait must be greater than zero",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                "max_retry_wait",
                "max_retry_wait must not be smaller than initial_retry_wait",
            ));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry_backoff_multiplier",
                "retry_backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

/// Authentication method resolved from `auth_type`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// Keystone v2.0 token API, scoped to a tenant
    Keystone {
        /// Tenant ID, if configured
        tenant_id: Option<String>,
        /// Tenant name, if configured
        tenant_name: Option<String>,
    },
    /// Swift TempAuth (X-Auth-User / X-Auth-Key)
    TempAuth,
    /// HTTP basic authorization against the auth endpoint
    Basic,
}

impl OutputConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolve `auth_type` and the tenant settings into an [`AuthMethod`]
    pub fn auth_method(&self) -> Result<AuthMethod> {
        match self.auth_type.as_str() {
            "keystone" => {
                if self.tenant_id.is_none() && self.tenant_name.is_none() {
                    return Err(Error::config(
                        "tenant_id",
                        "if you choose keystone auth, you must specify either tenant_id or tenant_name",
                    ));
                }
                Ok(AuthMethod::Keystone {
                    tenant_id: self.tenant_id.clone(),
                    tenant_name: self.tenant_name.clone(),
                })
            }
            "tempauth" => Ok(AuthMethod::TempAuth),
            "basic" => Ok(AuthMethod::Basic),
            _ => Err(Error::config(
                "auth_type",
                "auth_type has to be either keystone, tempauth or basic",
            )),
        }
    }

    /// Check every setting without touching the filesystem or the network
    pub fn validate(&self) -> Result<()> {
        self.auth_method()?;

        if url::Url::parse(&self.auth_url).is_err() {
            return Err(Error::config(
                "auth_url",
                format!("auth_url is not a valid URL: {}", self.auth_url),
            ));
        }

        if self.container.is_empty() || self.container.contains('/') {
            return Err(Error::config(
                "container",
                "container must be a non-empty name without '/'",
            ));
        }

        SequenceNamer::from_config(self)?;
        self.retry.validate()
    }

    /// Staging directory, falling back to the system temp dir
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

// Default value functions
fn default_sequence_format() -> String {
    "%03d.%02d".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
pub(crate) mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
