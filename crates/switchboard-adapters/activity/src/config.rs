//! Configuration types for the activity adapter.
//!
//! This module defines the configuration schema that can be loaded from
//! the global `switchboard.yaml` configuration file.
//!
//! # Example Configuration
//!
//! ```yaml
//! adapters:
//!   activity:
//!     application_id: teams
//!     path: /api/messages
//!     # Must appear in the `aud` claim of every inbound token
//!     audience: ${CHANNEL_APP_ID}
//!     issuer: https://api.botframework.com
//!     openid_metadata_url: https://login.botframework.com/v1/.well-known/openidconfiguration
//!     outbound_token: ${CHANNEL_TOKEN:-}
//!     push:
//!       max_attempts: 3
//!       backoff_ms: 250
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_core::auth::{DEFAULT_CLOCK_SKEW_SECS, DEFAULT_REFRESH_INTERVAL};

/// Activity adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Application id this instance serves.
    pub application_id: String,

    /// Inbound route.
    pub path: String,

    /// Verify the bearer token of inbound requests.
    ///
    /// Only meant for local testing against an emulator.
    pub verify_requests: bool,

    /// Expected `iss` claim.
    pub issuer: String,

    /// Expected `aud` claim.
    pub audience: String,

    /// Claim that must equal the activity's `serviceUrl`.
    pub binding_claim: String,

    /// OpenID metadata document locating the signing keys.
    pub openid_metadata_url: String,

    /// Signing key refresh interval in seconds.
    pub key_refresh_secs: u64,

    /// Tolerance on token lifetimes in seconds.
    pub clock_skew_secs: i64,

    /// Bearer token sent with outbound pushes.
    pub outbound_token: Option<String>,

    /// Outbound push settings.
    pub push: PushConfig,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            application_id: "activity".to_string(),
            path: "/api/messages".to_string(),
            verify_requests: true,
            issuer: "https://api.botframework.com".to_string(),
            audience: String::new(),
            binding_claim: "serviceurl".to_string(),
            openid_metadata_url:
                "https://login.botframework.com/v1/.well-known/openidconfiguration".to_string(),
            key_refresh_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            outbound_token: None,
            push: PushConfig::default(),
        }
    }
}

impl ActivityConfig {
    /// Returns the key refresh interval.
    pub fn key_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.key_refresh_secs.max(1))
    }

    /// Returns the outbound token, ignoring empty values.
    pub fn outbound_token(&self) -> Option<&str> {
        self.outbound_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Retry policy of outbound pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Attempts per message, the first one included.
    pub max_attempts: u32,

    /// Wait before the first retry in milliseconds, doubled after each retry.
    pub backoff_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

impl PushConfig {
    /// Wait before retry number `retry`, counting from zero.
    pub fn backoff(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << retry.min(16)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_config() {
        let yaml = r#"
application_id: teams
audience: app-123
push:
  max_attempts: 5
"#;
        let config: ActivityConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.application_id, "teams");
        assert_eq!(config.audience, "app-123");
        assert_eq!(config.path, "/api/messages");
        assert_eq!(config.binding_claim, "serviceurl");
        assert!(config.verify_requests);
        assert_eq!(config.push.max_attempts, 5);
        assert_eq!(config.push.backoff_ms, 250);
    }

    #[test]
    fn test_backoff_doubles() {
        let push = PushConfig {
            max_attempts: 4,
            backoff_ms: 100,
        };
        assert_eq!(push.backoff(0), Duration::from_millis(100));
        assert_eq!(push.backoff(1), Duration::from_millis(200));
        assert_eq!(push.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn test_empty_outbound_token_is_none() {
        let config = ActivityConfig {
            outbound_token: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.outbound_token(), None);
    }
}
