//! Configuration types for the REST adapter.
//!
//! # Example Configuration
//!
//! ```yaml
//! adapters:
//!   rest:
//!     application_id: web
//!     path: /io/web
//!     # Requests must carry `X-Switchboard-Token: <token>` when set
//!     token: ${REST_TOKEN:-}
//! ```

use serde::{Deserialize, Serialize};

/// Header checked by the shared-secret request filter.
pub const TOKEN_HEADER: &str = "x-switchboard-token";

/// REST adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Application id served by this instance.
    pub application_id: String,

    /// Route prefix. Messages are posted to `{path}/{locale}`.
    pub path: String,

    /// Shared secret expected in the `X-Switchboard-Token` header.
    pub token: Option<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            application_id: "rest".to_string(),
            path: "/io/rest".to_string(),
            token: None,
        }
    }
}

impl RestConfig {
    /// Route prefix without a trailing slash.
    pub fn base_path(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        if trimmed.is_empty() { "" } else { trimmed }
    }

    /// Configured token, ignoring empty values.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
application_id: web
path: /io/web/
token: secret
"#;

        let config: RestConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.application_id, "web");
        assert_eq!(config.base_path(), "/io/web");
        assert_eq!(config.token(), Some("secret"));
    }

    #[test]
    fn test_defaults_and_empty_token() {
        let config: RestConfig = serde_yaml::from_str("token: ''").unwrap();
        assert_eq!(config.application_id, "rest");
        assert_eq!(config.path, "/io/rest");
        assert_eq!(config.token(), None);
    }
}
