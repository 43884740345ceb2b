//! Configuration data structures for Dendrite.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! intentionally serde‑friendly and include defaults so that minimal configs remain concise.
//! `RateLimits` doubles as the wire shape used by the admin registration API, so its
//! fields serialize in camelCase.
use serde::{Deserialize, Serialize};

fn default_per_minute() -> u32 {
    10
}

fn default_per_day() -> u32 {
    1000
}

/// Per-client request quotas over the two admission windows.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    /// Requests allowed within any trailing 60 seconds
    // aliases accept snake_case and the lowercased keys the config crate produces
    #[serde(
        default = "default_per_minute",
        alias = "per_minute",
        alias = "perminute"
    )]
    pub per_minute: u32,
    /// Requests allowed within any trailing 24 hours
    #[serde(default = "default_per_day", alias = "per_day", alias = "perday")]
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_day: default_per_day(),
        }
    }
}

/// The single upstream API the gateway fronts.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to (e.g. "https://api.example.com/v1")
    pub base_url: String,
    /// The upstream's own credential, attached to every forwarded request.
    /// Clients never see or supply this key.
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub listen_addr: String,
    /// Shared secret for the /admin endpoints
    pub admin_key: String,
    /// Externally visible base URL of this gateway, used when rewriting
    /// upstream resource URLs in proxied responses
    pub public_base_url: String,
    pub upstream: UpstreamConfig,
    /// Limits applied to clients registered without explicit limits
    #[serde(default)]
    pub default_limits: RateLimits,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7000".to_string(),
            admin_key: String::new(),
            public_base_url: "http://127.0.0.1:7000".to_string(),
            upstream: UpstreamConfig {
                base_url: "https://api.example.com/v1".to_string(),
                api_key: String::new(),
            },
            default_limits: RateLimits::default(),
        }
    }
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    admin_key: Option<String>,
    public_base_url: Option<String>,
    upstream: Option<UpstreamConfig>,
    default_limits: Option<RateLimits>,
}

impl GatewayConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin_key = Some(key.into());
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    pub fn upstream(mut self, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.upstream = Some(UpstreamConfig {
            base_url: base_url.into(),
            api_key: api_key.into(),
        });
        self
    }

    pub fn default_limits(mut self, limits: RateLimits) -> Self {
        self.default_limits = Some(limits);
        self
    }

    pub fn build(self) -> GatewayConfig {
        let defaults = GatewayConfig::default();
        GatewayConfig {
            listen_addr: self.listen_addr.unwrap_or(defaults.listen_addr),
            admin_key: self.admin_key.unwrap_or(defaults.admin_key),
            public_base_url: self.public_base_url.unwrap_or(defaults.public_base_url),
            upstream: self.upstream.unwrap_or(defaults.upstream),
            default_limits: self.default_limits.unwrap_or(defaults.default_limits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate_limits() {
        let limits = RateLimits::default();
        assert_eq!(limits.per_minute, 10);
        assert_eq!(limits.per_day, 1000);
    }

    #[test]
    fn test_rate_limits_camel_case_wire_shape() {
        let limits = RateLimits {
            per_minute: 2,
            per_day: 100,
        };
        let json = serde_json::to_value(&limits).unwrap();
        assert_eq!(json, serde_json::json!({"perMinute": 2, "perDay": 100}));
    }

    #[test]
    fn test_builder() {
        let config = GatewayConfig::builder()
            .listen_addr("0.0.0.0:7000")
            .admin_key("secret")
            .public_base_url("http://gateway.local:7000")
            .upstream("https://api.example.com/v1", "sk-upstream")
            .build();

        assert_eq!(config.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.admin_key, "secret");
        assert_eq!(config.upstream.base_url, "https://api.example.com/v1");
        assert_eq!(config.default_limits, RateLimits::default());
    }
}
