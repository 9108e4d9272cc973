//! Wire format of the REST bridge.
//!
//! All field names are camelCase:
//!
//! ```json
//! {
//!   "message": { "type": "sentence", "text": "hello" },
//!   "userId": "u1",
//!   "recipientId": "bot",
//!   "targetConnectorType": { "id": "activity" },
//!   "debugEnabled": false
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::foundation::{GenericChoice, Sentence};
use switchboard_core::{ActionKind, ConnectorMessage, ConnectorType, GenericMessage, Locale};

/// Inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// What the user sent.
    pub message: ActionKind,

    /// Sender id.
    pub user_id: String,

    /// Bot id.
    pub recipient_id: String,

    /// Channel the message originally came from.
    #[serde(default = "ConnectorType::rest")]
    pub connector_type: ConnectorType,

    /// Channel the answer is rendered for.
    #[serde(default = "ConnectorType::rest")]
    pub target_connector_type: ConnectorType,

    /// Sent by a test harness.
    #[serde(default)]
    pub test: bool,

    /// Debug traces may be returned.
    #[serde(default)]
    pub debug_enabled: bool,

    /// Echo the source payload back.
    #[serde(default)]
    pub source_with_content: bool,
}

impl MessageRequest {
    /// Creates a text request rendered for REST.
    pub fn text(user_id: impl Into<String>, recipient_id: impl Into<String>, text: &str) -> Self {
        Self {
            message: ActionKind::Sentence(Sentence {
                text: Some(text.to_string()),
                messages: Vec::new(),
            }),
            user_id: user_id.into(),
            recipient_id: recipient_id.into(),
            connector_type: ConnectorType::rest(),
            target_connector_type: ConnectorType::rest(),
            test: false,
            debug_enabled: false,
            source_with_content: false,
        }
    }

    /// The message to dispatch: a choice carrying free text becomes a sentence.
    pub fn normalized_message(&self) -> ActionKind {
        match &self.message {
            ActionKind::Choice(choice) => match choice.nlp_text() {
                Some(text) => ActionKind::Sentence(Sentence {
                    text: Some(text.to_string()),
                    messages: Vec::new(),
                }),
                None => self.message.clone(),
            },
            other => other.clone(),
        }
    }
}

/// Answer to one [`MessageRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    /// Bot answers, in send order.
    pub messages: Vec<ActionKind>,

    /// Application that answered.
    pub application_id: String,

    /// Id of the inbound action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Locale the request was handled in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<Locale>,

    /// The inbound message was free text.
    #[serde(default)]
    pub is_sentence_request: bool,

    /// Failure cause, set when the dispatch failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of a [`ConnectorMessage`] rendered for REST.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestRendering {
    /// Generic messages, in display order.
    pub messages: Vec<GenericMessage>,
}

impl RestRendering {
    /// Wraps one message.
    pub fn single(message: GenericMessage) -> Self {
        Self {
            messages: vec![message],
        }
    }

    /// Reads a rendering back from a REST connector message.
    pub fn from_message(message: &ConnectorMessage) -> Option<Self> {
        if !message.connector_type.is_rest() {
            return None;
        }
        serde_json::from_value(message.payload.clone()).ok()
    }

    /// Gives the last message `suggestions` as choices, unless it already has some.
    pub fn suggest(&mut self, suggestions: &[String]) {
        if let Some(last) = self.messages.last_mut() {
            if last.choices.is_empty() {
                last.choices = suggestions.iter().map(GenericChoice::from_text).collect();
            }
        }
    }

    /// Converts into a REST connector message.
    pub fn into_message(self) -> ConnectorMessage {
        let payload = serde_json::to_value(&self).unwrap_or(Value::Null);
        ConnectorMessage::new(ConnectorType::rest(), payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::foundation::Choice;

    #[test]
    fn request_defaults_to_rest() {
        let request: MessageRequest = serde_json::from_value(json!({
            "message": { "type": "sentence", "text": "hi" },
            "userId": "u1",
            "recipientId": "bot"
        }))
        .unwrap();
        assert!(request.connector_type.is_rest());
        assert!(request.target_connector_type.is_rest());
        assert!(!request.debug_enabled);
    }

    #[test]
    fn nlp_choice_becomes_sentence() {
        let mut choice = Choice {
            intent: "search".into(),
            ..Default::default()
        };
        choice.parameters.insert("_nlp".into(), "trains to Lyon".into());
        let request = MessageRequest {
            message: ActionKind::Choice(choice.clone()),
            ..MessageRequest::text("u", "b", "")
        };
        match request.normalized_message() {
            ActionKind::Sentence(s) => assert_eq!(s.text.as_deref(), Some("trains to Lyon")),
            other => panic!("expected a sentence, got {other:?}"),
        }

        choice.parameters.clear();
        let request = MessageRequest {
            message: ActionKind::Choice(choice),
            ..MessageRequest::text("u", "b", "")
        };
        assert!(matches!(request.normalized_message(), ActionKind::Choice(_)));
    }

    #[test]
    fn response_uses_camel_case_and_hides_empty_error() {
        let response = MessageResponse {
            messages: Vec::new(),
            application_id: "web".into(),
            request_id: Some("r1".into()),
            locale: Some(Locale::new("fr", Some("FR"))),
            is_sentence_request: true,
            error: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["applicationId"], "web");
        assert_eq!(value["requestId"], "r1");
        assert_eq!(value["isSentenceRequest"], true);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn suggestions_only_fill_a_message_without_choices() {
        let mut rendering = RestRendering {
            messages: vec![
                GenericMessage::text("first"),
                GenericMessage::text("second"),
            ],
        };
        rendering.suggest(&["yes".into(), "no".into()]);
        assert!(rendering.messages[0].choices.is_empty());
        assert_eq!(rendering.messages[1].choices.len(), 2);

        rendering.suggest(&["maybe".into()]);
        assert_eq!(rendering.messages[1].choices.len(), 2);
        assert_eq!(rendering.messages[1].choices[0].display_text(), "yes");
    }
}
