//! Locale values and normalization of the forms channels send.
//!
//! Channels send BCP-47 tags (`fr-FR`), legacy underscore forms (`fr_FR`)
//! or garbage. [`parse_locale`] accepts the first two and falls back to a
//! default for anything else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A language with optional script and region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    language: String,
    script: Option<String>,
    region: Option<String>,
}

impl Locale {
    /// Creates a locale from a language and optional region, normalizing case.
    pub fn new(language: &str, region: Option<&str>) -> Self {
        Self {
            language: language.to_ascii_lowercase(),
            script: None,
            region: region.map(str::to_ascii_uppercase),
        }
    }

    /// English, the process-wide fallback when nothing is configured.
    pub fn english() -> Self {
        Self::new("en", None)
    }

    /// Returns the lowercase language subtag.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Returns the title-case script subtag, if any.
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// Returns the uppercase region subtag, if any.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Returns the BCP-47 tag.
    pub fn to_tag(&self) -> String {
        self.to_string()
    }

    /// Parses a BCP-47 tag, accepting `_` as a separator.
    ///
    /// Variants and extensions after the region are ignored.
    pub fn parse_tag(raw: &str) -> Option<Self> {
        let normalized = raw.trim().replace('_', "-");
        let mut parts = normalized.split('-');

        let language = parts.next()?;
        if !is_alpha(language) || !matches!(language.len(), 2 | 3 | 5..=8) {
            return None;
        }

        let mut locale = Self::new(language, None);
        let mut next = parts.next();

        if let Some(script) = next.filter(|s| s.len() == 4 && is_alpha(s)) {
            let mut chars = script.chars();
            let title: String = chars
                .next()
                .map(|c| c.to_ascii_uppercase())
                .into_iter()
                .chain(chars.map(|c| c.to_ascii_lowercase()))
                .collect();
            locale.script = Some(title);
            next = parts.next();
        }

        if let Some(region) = next {
            let valid_region = (region.len() == 2 && is_alpha(region))
                || (region.len() == 3 && region.chars().all(|c| c.is_ascii_digit()));
            if valid_region {
                locale.region = Some(region.to_ascii_uppercase());
            } else if region.is_empty() {
                return None;
            }
        }

        Some(locale)
    }
}

fn is_alpha(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())
}

/// Normalizes a channel-supplied locale string.
///
/// `fr-FR` and `fr_FR` both yield French (France); a blank or unparsable
/// value yields `default`.
pub fn parse_locale(raw: &str, default: &Locale) -> Locale {
    if raw.trim().is_empty() {
        return default.clone();
    }
    Locale::parse_tag(raw).unwrap_or_else(|| default.clone())
}

impl Default for Locale {
    fn default() -> Self {
        Self::english()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.language)?;
        if let Some(script) = &self.script {
            write!(f, "-{script}")?;
        }
        if let Some(region) = &self.region {
            write!(f, "-{region}")?;
        }
        Ok(())
    }
}

/// Error returned when a string is not a language tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid locale '{0}'")]
pub struct InvalidLocale(pub String);

impl FromStr for Locale {
    type Err = InvalidLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_tag(s).ok_or_else(|| InvalidLocale(s.to_string()))
    }
}

impl Serialize for Locale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_separators_resolve_to_same_locale() {
        let default = Locale::english();
        let dashed = parse_locale("fr-FR", &default);
        let underscored = parse_locale("fr_FR", &default);

        assert_eq!(dashed, underscored);
        assert_eq!(dashed.language(), "fr");
        assert_eq!(dashed.region(), Some("FR"));
        assert_eq!(dashed.to_tag(), "fr-FR");
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let default = Locale::new("de", Some("DE"));
        assert_eq!(parse_locale("???", &default), default);
        assert_eq!(parse_locale("   ", &default), default);
        assert_eq!(parse_locale("fr-", &default), default);
    }

    #[test]
    fn case_is_normalized() {
        let locale = parse_locale("EN_us", &Locale::english());
        assert_eq!(locale.to_tag(), "en-US");
    }

    #[test]
    fn script_and_numeric_region() {
        let locale: Locale = "zh-hant-tw".parse().unwrap();
        assert_eq!(locale.script(), Some("Hant"));
        assert_eq!(locale.to_tag(), "zh-Hant-TW");

        let latam: Locale = "es-419".parse().unwrap();
        assert_eq!(latam.region(), Some("419"));
    }

    #[test]
    fn serde_uses_tag() {
        let locale = Locale::new("fr", Some("ca"));
        assert_eq!(serde_json::to_string(&locale).unwrap(), "\"fr-CA\"");
        let back: Locale = serde_json::from_str("\"fr_CA\"").unwrap();
        assert_eq!(back, locale);
    }
}
