//! Lazily expiring user flags.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Set once the channel profile has been copied into the preferences.
pub const PROFILE_LOADED_FLAG: &str = "profile_loaded";
/// Expires when the channel profile should be fetched again.
pub const PROFILE_REFRESHED_FLAG: &str = "profile_refreshed";
/// Present while the bot must stay silent for this user.
pub const BOT_DISABLED_FLAG: &str = "bot_disabled";

/// A value with an optional expiration instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBoxedFlag {
    /// Flag value.
    pub value: String,
    /// Instant after which the flag is treated as absent; `None` is permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl TimeBoxedFlag {
    /// Creates a permanent flag.
    pub fn permanent(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expiration_date: None,
        }
    }

    /// Creates a flag expiring at `expiration`.
    pub fn until(value: impl Into<String>, expiration: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expiration_date: Some(expiration),
        }
    }

    /// Returns true when the flag is still valid at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_none_or(|expiration| now < expiration)
    }
}

/// Ephemeral per-user state.
///
/// Expired flags stay in the map until overwritten or removed, but every
/// read treats them as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    /// First contact.
    pub creation_date: DateTime<Utc>,
    /// Flags by name.
    #[serde(default)]
    pub flags: HashMap<String, TimeBoxedFlag>,
}

impl UserState {
    /// Creates an empty state dated now.
    pub fn new() -> Self {
        Self {
            creation_date: Utc::now(),
            flags: HashMap::new(),
        }
    }

    /// Returns the value of a flag valid now.
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flag_at(name, Utc::now())
    }

    /// Returns the value of a flag valid at `now`.
    pub fn flag_at(&self, name: &str, now: DateTime<Utc>) -> Option<&str> {
        self.flags
            .get(name)
            .filter(|flag| flag.is_valid_at(now))
            .map(|flag| flag.value.as_str())
    }

    /// Returns true when a flag is set and valid now.
    pub fn has_flag(&self, name: &str) -> bool {
        self.flag(name).is_some()
    }

    /// Sets a permanent flag.
    pub fn set_flag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.flags
            .insert(name.into(), TimeBoxedFlag::permanent(value));
    }

    /// Sets a flag expiring at `expiration`.
    pub fn set_flag_until(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        expiration: DateTime<Utc>,
    ) {
        self.flags
            .insert(name.into(), TimeBoxedFlag::until(value, expiration));
    }

    /// Sets a flag valid for `ttl` from now.
    pub fn set_flag_for(&mut self, name: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.set_flag_until(name, value, Utc::now() + ttl);
    }

    /// Removes a flag.
    pub fn remove_flag(&mut self, name: &str) -> Option<TimeBoxedFlag> {
        self.flags.remove(name)
    }

    /// Copies the flags of `other` that are not set here.
    pub fn copy_flags_if_absent(&mut self, other: &UserState) {
        for (name, flag) in &other.flags {
            self.flags
                .entry(name.clone())
                .or_insert_with(|| flag.clone());
        }
    }
}

impl Default for UserState {
    fn default() -> Self {
        Self::new()
    }
}
