//! Classification service interface.
//!
//! The engine treats intent classification as an opaque service. Failures
//! never reach bot logic: [`classify_or_unknown`] degrades them to the
//! [`UNKNOWN_INTENT`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::foundation::Locale;

/// Intent reported when nothing matched or the service failed.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Errors reported by a classifier.
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    /// The service could not be reached.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The service answered something unusable.
    #[error("invalid classifier answer: {0}")]
    InvalidAnswer(String),
}

/// Result type for classification.
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// A value found in the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Role of the entity in the intent.
    pub role: String,
    /// Matched text.
    pub value: String,
    /// Byte offset of the match start.
    pub start: usize,
    /// Byte offset of the match end.
    pub end: usize,
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Intent name.
    pub intent: String,
    /// Entities found.
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Classification {
    /// The unknown intent with no entities.
    pub fn unknown() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            entities: Vec::new(),
        }
    }

    /// Returns true for the unknown intent.
    pub fn is_unknown(&self) -> bool {
        self.intent == UNKNOWN_INTENT
    }
}

/// Intent classification service.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies `text` written in `locale`.
    async fn classify(&self, text: &str, locale: &Locale) -> ClassifierResult<Classification>;
}

/// A shared classifier.
pub type BoxedClassifier = Arc<dyn Classifier>;

/// Classifies `text`, degrading any failure to the unknown intent.
pub async fn classify_or_unknown(
    classifier: &dyn Classifier,
    text: &str,
    locale: &Locale,
) -> Classification {
    match classifier.classify(text, locale).await {
        Ok(classification) => classification,
        Err(e) => {
            warn!(error = %e, locale = %locale, "Classification failed, using unknown intent");
            Classification::unknown()
        }
    }
}

/// Matches intents by case-insensitive whole-word keywords, first rule wins.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    rules: Vec<(String, Vec<String>)>,
}

impl KeywordClassifier {
    /// Creates a classifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an intent triggered by any of `keywords`.
    pub fn intent<I, S>(mut self, intent: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self.rules.push((intent.into(), keywords));
        self
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str, _locale: &Locale) -> ClassifierResult<Classification> {
        let starts: Vec<usize> = word_starts(text).collect();
        for (intent, keywords) in &self.rules {
            for keyword in keywords {
                let found = starts
                    .iter()
                    .find_map(|&start| match_at(text, start, keyword).map(|end| (start, end)));
                if let Some((start, end)) = found {
                    return Ok(Classification {
                        intent: intent.clone(),
                        entities: vec![Entity {
                            role: "keyword".into(),
                            value: keyword.clone(),
                            start,
                            end,
                        }],
                    });
                }
            }
        }
        Ok(Classification::unknown())
    }
}

/// Byte offsets where a word begins.
fn word_starts(text: &str) -> impl Iterator<Item = usize> + '_ {
    let mut previous_in_word = false;
    text.char_indices().filter_map(move |(i, c)| {
        let in_word = c.is_alphanumeric();
        let starts = in_word && !previous_in_word;
        previous_in_word = in_word;
        starts.then_some(i)
    })
}

/// Matches a lowercase `keyword` case-insensitively at `start`, ending on a
/// word boundary. Returns the end offset in `text`.
fn match_at(text: &str, start: usize, keyword: &str) -> Option<usize> {
    let mut rest = keyword;
    let mut end = start;
    for (offset, c) in text[start..].char_indices() {
        if rest.is_empty() {
            break;
        }
        for lower in c.to_lowercase() {
            rest = rest.strip_prefix(lower)?;
        }
        end = start + offset + c.len_utf8();
    }
    let at_boundary = text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
    (rest.is_empty() && at_boundary).then_some(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Down;

    #[async_trait]
    impl Classifier for Down {
        async fn classify(&self, _: &str, _: &Locale) -> ClassifierResult<Classification> {
            Err(ClassifierError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn failure_degrades_to_unknown() {
        let result = classify_or_unknown(&Down, "hello", &Locale::english()).await;
        assert!(result.is_unknown());
    }

    #[tokio::test]
    async fn keywords_match_first_rule() {
        let classifier = KeywordClassifier::new()
            .intent("greetings", ["hello", "hi"])
            .intent("goodbye", ["bye"]);

        let result = classifier
            .classify("Well HELLO there, bye", &Locale::english())
            .await
            .unwrap();
        assert_eq!(result.intent, "greetings");
        assert_eq!(result.entities[0].start, 5);

        let result = classifier.classify("nothing", &Locale::english()).await.unwrap();
        assert!(result.is_unknown());
        let result = classifier.classify("this goodbyes", &Locale::english()).await.unwrap();
        assert!(result.is_unknown());
    }

    #[tokio::test]
    async fn keyword_offsets_index_the_original_text() {
        let classifier = KeywordClassifier::new()
            .intent("weather", ["été"])
            .intent("farewell", ["see you"]);
        let text = "Olá, ÉTÉ chaud";

        let result = classifier.classify(text, &Locale::english()).await.unwrap();
        let entity = &result.entities[0];
        assert_eq!((entity.start, entity.end), (6, 11));
        assert_eq!(&text[entity.start..entity.end], "ÉTÉ");

        let text = "ok, SEE   you? no: See You!";
        let result = classifier.classify(text, &Locale::english()).await.unwrap();
        assert_eq!(result.intent, "farewell");
        assert_eq!(&text[result.entities[0].start..result.entities[0].end], "See You");
    }
}
