//! Channel-agnostic message envelope.
//!
//! A [`GenericMessage`] describes what should be shown, never how. Every
//! adapter renders what it can and falls back to [`GenericMessage::text_fallback`]
//! for the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::ConnectorType;

/// Key of the main text variant.
pub const TEXT_PARAM: &str = "text";
/// Key of the title text variant.
pub const TITLE_PARAM: &str = "title";
/// Key of the subtitle text variant.
pub const SUBTITLE_PARAM: &str = "subtitle";

/// A quick reply or button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericChoice {
    /// Intent the choice triggers when selected.
    pub intent: String,
    /// Parameters sent back with the intent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    /// Displayed label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl GenericChoice {
    /// Builds a choice that replays `text` as free user input.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut parameters = BTreeMap::new();
        parameters.insert(super::action::NLP_PARAM.to_string(), text.clone());
        Self {
            intent: String::new(),
            parameters,
            label: Some(text),
        }
    }

    /// Returns the text to display.
    pub fn display_text(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.intent)
    }
}

/// Kind of attached media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    /// Still image.
    Image,
    /// Audio clip.
    Audio,
    /// Video clip.
    Video,
    /// Any other file.
    File,
}

/// An attached media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericAttachment {
    /// Public URL of the file.
    pub url: String,
    /// Media kind.
    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,
}

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// A located place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericLocation {
    /// Coordinates, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One card of a carousel or gallery.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericElement {
    /// Named text variants.
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
    /// Buttons.
    #[serde(default)]
    pub choices: Vec<GenericChoice>,
    /// Media.
    #[serde(default)]
    pub attachments: Vec<GenericAttachment>,
    /// Places.
    #[serde(default)]
    pub locations: Vec<GenericLocation>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// The channel-agnostic content envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericMessage {
    /// Channel the message was produced for, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<ConnectorType>,
    /// Named text variants.
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
    /// Quick replies.
    #[serde(default)]
    pub choices: Vec<GenericChoice>,
    /// Media.
    #[serde(default)]
    pub attachments: Vec<GenericAttachment>,
    /// Places.
    #[serde(default)]
    pub locations: Vec<GenericLocation>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Carousel cards.
    #[serde(default)]
    pub sub_elements: Vec<GenericElement>,
}

impl GenericMessage {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self {
            connector_type: None,
            texts: BTreeMap::new(),
            choices: Vec::new(),
            attachments: Vec::new(),
            locations: Vec::new(),
            metadata: BTreeMap::new(),
            sub_elements: Vec::new(),
        }
    }

    /// Creates a message with a main text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new().with_text(TEXT_PARAM, text)
    }

    /// Sets a named text variant.
    pub fn with_text(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(key.into(), text.into());
        self
    }

    /// Appends a quick reply.
    pub fn with_choice(mut self, choice: GenericChoice) -> Self {
        self.choices.push(choice);
        self
    }

    /// Appends a carousel card.
    pub fn with_element(mut self, element: GenericElement) -> Self {
        self.sub_elements.push(element);
        self
    }

    /// Returns the main text, if any.
    pub fn main_text(&self) -> Option<&str> {
        self.texts.get(TEXT_PARAM).map(String::as_str)
    }

    /// Returns true when the message holds carousel cards.
    pub fn is_carousel(&self) -> bool {
        !self.sub_elements.is_empty()
    }

    /// Degraded plain-text rendering usable by any channel.
    ///
    /// Texts come first (main text, then title and subtitle, then the rest in
    /// key order), followed by one line per card, location, attachment and
    /// choice.
    pub fn text_fallback(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        for key in [TEXT_PARAM, TITLE_PARAM, SUBTITLE_PARAM] {
            if let Some(text) = self.texts.get(key) {
                lines.push(text.clone());
            }
        }
        lines.extend(
            self.texts
                .iter()
                .filter(|(k, _)| ![TEXT_PARAM, TITLE_PARAM, SUBTITLE_PARAM].contains(&k.as_str()))
                .map(|(_, v)| v.clone()),
        );

        for element in &self.sub_elements {
            let title = element
                .texts
                .get(TITLE_PARAM)
                .or_else(|| element.texts.get(TEXT_PARAM));
            if let Some(title) = title {
                lines.push(format!("- {title}"));
            }
        }
        for location in &self.locations {
            match (&location.description, location.location) {
                (Some(d), _) => lines.push(d.clone()),
                (None, Some(p)) => lines.push(format!("{}, {}", p.lat, p.lng)),
                (None, None) => {}
            }
        }
        lines.extend(self.attachments.iter().map(|a| a.url.clone()));

        if !self.choices.is_empty() {
            let labels: Vec<&str> = self.choices.iter().map(GenericChoice::display_text).collect();
            lines.push(format!("[{}]", labels.join(" | ")));
        }

        lines.join("\n")
    }
}

impl Default for GenericMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// A message already rendered for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorMessage {
    /// Channel the payload is shaped for.
    pub connector_type: ConnectorType,
    /// Channel-specific JSON payload.
    pub payload: serde_json::Value,
}

impl ConnectorMessage {
    /// Creates a connector message.
    pub fn new(connector_type: ConnectorType, payload: serde_json::Value) -> Self {
        Self {
            connector_type,
            payload,
        }
    }
}
