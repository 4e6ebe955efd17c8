use std::str::FromStr;
use std::time::Duration;

use storyreel_core::credentials::{Credential, CredentialPool};
use storyreel_vendors::api::{VendorEndpoints, DEFAULT_REQUEST_TIMEOUT};
use storyreel_vendors::poller::PollConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Dispatch configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub endpoints: VendorEndpoints,
    pub credentials: Vec<Credential>,
    pub poll: PollConfig,
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoints: VendorEndpoints::default(),
            credentials: Vec::new(),
            poll: PollConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                             |
    /// |------------------------|-------------------------------------|
    /// | `VENDOR_BASE_URL`      | `http://localhost:3000`             |
    /// | `VOLC_BASE_URL`        | `https://ark.cn-beijing.volces.com` |
    /// | `WAN_BASE_URL`         | `https://dashscope.aliyuncs.com`    |
    /// | `KLING_BASE_URL`       | `https://api-beijing.klingai.com`   |
    /// | `VENDOR_API_KEYS`      | (none)                              |
    /// | `POLL_INTERVAL_SECS`   | `5`                                 |
    /// | `POLL_MAX_ATTEMPTS`    | `180`                               |
    /// | `POLL_NOT_FOUND_GRACE` | `3`                                 |
    /// | `REQUEST_TIMEOUT_SECS` | `60`                                |
    ///
    /// `VENDOR_API_KEYS` is a comma-separated list of `label=key` or bare
    /// `key` entries, tried in order.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let url = |var: &str, default: String| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        let endpoints = VendorEndpoints {
            unified: url("VENDOR_BASE_URL", defaults.endpoints.unified),
            volc: url("VOLC_BASE_URL", defaults.endpoints.volc),
            wan: url("WAN_BASE_URL", defaults.endpoints.wan),
            kling: url("KLING_BASE_URL", defaults.endpoints.kling),
        };

        let credentials = match lookup("VENDOR_API_KEYS") {
            Some(list) => CredentialPool::parse(&list)
                .map_err(|_| ConfigError::Invalid {
                    var: "VENDOR_API_KEYS",
                    value: "<redacted>".to_string(),
                })?
                .into_credentials(),
            None => Vec::new(),
        };

        let interval_secs: u64 = parse_var(&lookup, "POLL_INTERVAL_SECS", 5)?;
        let max_attempts: u32 = parse_var(&lookup, "POLL_MAX_ATTEMPTS", defaults.poll.max_attempts)?;
        let not_found_grace: u32 =
            parse_var(&lookup, "POLL_NOT_FOUND_GRACE", defaults.poll.not_found_grace)?;
        let timeout_secs: u64 =
            parse_var(&lookup, "REQUEST_TIMEOUT_SECS", defaults.request_timeout.as_secs())?;

        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "POLL_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            endpoints,
            credentials,
            poll: PollConfig {
                interval: Duration::from_secs(interval_secs),
                max_attempts,
                not_found_grace,
            },
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
