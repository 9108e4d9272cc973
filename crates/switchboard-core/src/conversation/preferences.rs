//! User preferences.

use serde::{Deserialize, Serialize};

use crate::foundation::Locale;

/// Best-effort profile of a user, partly supplied by the channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// IANA timezone name.
    pub timezone: Option<String>,
    /// Current locale.
    pub locale: Option<Locale>,
    /// Avatar URL.
    pub picture: Option<String>,
    /// Free-form gender.
    pub gender: Option<String>,
    /// Test user.
    pub test: bool,
    /// Locale at first contact.
    pub initial_locale: Option<Locale>,
}

impl UserPreferences {
    /// Creates preferences holding only a locale.
    pub fn with_locale(locale: Locale) -> Self {
        Self {
            locale: Some(locale.clone()),
            initial_locale: Some(locale),
            ..Default::default()
        }
    }

    /// Copies every field the channel profile supplies into these preferences.
    ///
    /// `initial_locale` is only filled once.
    pub fn fill_with(&mut self, profile: &UserPreferences) {
        macro_rules! fill {
            ($($field:ident),*) => {
                $(if profile.$field.is_some() {
                    self.$field.clone_from(&profile.$field);
                })*
            };
        }
        fill!(first_name, last_name, email, timezone, locale, picture, gender);
        if self.initial_locale.is_none() {
            self.initial_locale = profile
                .initial_locale
                .clone()
                .or_else(|| profile.locale.clone());
        }
        self.test |= profile.test;
    }
}
