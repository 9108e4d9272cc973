//! Inbound events and sendable actions.
//!
//! An [`Event`] is anything the engine processes. The only events recorded
//! in a dialog are [`Action`]s: user input and bot output alike.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{ConnectorType, PlayerId, PlayerType};
use super::locale::Locale;
use super::message::{AttachmentType, ConnectorMessage, GenericMessage, GeoPoint};

/// Choice parameter carrying free text that should be classified.
pub const NLP_PARAM: &str = "_nlp";

/// Routing state of an action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    /// Channel the action arrived on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_connector_type: Option<ConnectorType>,
    /// Channel the answer should be rendered for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_connector_type: Option<ConnectorType>,
    /// Locale the user wrote in, when the channel says so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_locale: Option<Locale>,
    /// Sent by a test harness.
    #[serde(default)]
    pub test_event: bool,
}

/// Delivery metadata of an action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    /// Debug traces may be sent back.
    #[serde(default)]
    pub debug_enabled: bool,
    /// The full source payload should be echoed back.
    #[serde(default)]
    pub source_with_content: bool,
    /// This is the last answer of the turn.
    #[serde(default)]
    pub last_answer: bool,
}

/// Free text, optionally with channel-rendered messages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    /// Plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Rich messages already rendered for a channel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ConnectorMessage>,
}

/// A selected button or postback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Intent name.
    pub intent: String,
    /// Parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Choice {
    /// Returns the free text to classify, when the choice carries one.
    pub fn nlp_text(&self) -> Option<&str> {
        self.parameters
            .get(NLP_PARAM)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }
}

/// A media file sent by a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// File URL.
    pub url: String,
    /// Media kind.
    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,
}

/// A shared position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Coordinates, when shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// A diagnostic trace only sent when debugging is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugTrace {
    /// Short description.
    pub text: String,
    /// Structured data.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// What an action carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    /// Text or rich messages.
    Sentence(Sentence),
    /// Button or postback.
    Choice(Choice),
    /// Media file.
    Attachment(Attachment),
    /// Position.
    Location(Location),
    /// Debug trace.
    Debug(DebugTrace),
}

impl ActionKind {
    /// Returns a stable label for logs and snapshots.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sentence(_) => "sentence",
            Self::Choice(_) => "choice",
            Self::Attachment(_) => "attachment",
            Self::Location(_) => "location",
            Self::Debug(_) => "debug",
        }
    }
}

/// Something sendable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Unique action id.
    pub id: String,
    /// Sender.
    pub player_id: PlayerId,
    /// Receiver.
    pub recipient_id: PlayerId,
    /// Configured bot/channel instance.
    pub application_id: String,
    /// Creation instant.
    pub date: DateTime<Utc>,
    /// Routing state.
    #[serde(default)]
    pub state: ActionState,
    /// Delivery metadata.
    #[serde(default)]
    pub metadata: ActionMetadata,
    /// Content.
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    /// Creates an action with a fresh id, dated now.
    pub fn new(
        player_id: PlayerId,
        recipient_id: PlayerId,
        application_id: impl Into<String>,
        kind: ActionKind,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            player_id,
            recipient_id,
            application_id: application_id.into(),
            date: Utc::now(),
            state: ActionState::default(),
            metadata: ActionMetadata::default(),
            kind,
        }
    }

    /// Creates a text sentence.
    pub fn sentence(
        player_id: PlayerId,
        recipient_id: PlayerId,
        application_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            player_id,
            recipient_id,
            application_id,
            ActionKind::Sentence(Sentence {
                text: Some(text.into()),
                messages: Vec::new(),
            }),
        )
    }

    /// Returns true when the sender is a user.
    pub fn is_from_user(&self) -> bool {
        self.player_id.player_type != PlayerType::Bot
    }

    /// Returns the text of a sentence, or the free text of a choice.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Sentence(s) => s.text.as_deref(),
            ActionKind::Choice(c) => c.nlp_text(),
            _ => None,
        }
    }

    /// Builds a bot answer addressed to the sender of this action.
    pub fn answer(&self, kind: ActionKind) -> Self {
        let mut answer = Self::new(
            self.recipient_id.clone(),
            self.player_id.clone(),
            self.application_id.clone(),
            kind,
        );
        answer.state = ActionState {
            source_connector_type: self.state.source_connector_type.clone(),
            target_connector_type: self.state.target_connector_type.clone(),
            user_locale: self.state.user_locale.clone(),
            test_event: self.state.test_event,
        };
        answer.metadata.debug_enabled = self.metadata.debug_enabled;
        answer
    }

    /// Builds a text answer.
    pub fn answer_text(&self, text: impl Into<String>) -> Self {
        self.answer(ActionKind::Sentence(Sentence {
            text: Some(text.into()),
            messages: Vec::new(),
        }))
    }

    /// Builds an answer carrying one channel-rendered message.
    pub fn answer_message(&self, message: ConnectorMessage) -> Self {
        self.answer(ActionKind::Sentence(Sentence {
            text: None,
            messages: vec![message],
        }))
    }

    /// Builds an answer from a generic message rendered as text.
    pub fn answer_generic(&self, message: &GenericMessage) -> Self {
        self.answer_text(message.text_fallback())
    }
}

/// Fields shared by lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    /// User.
    pub player_id: PlayerId,
    /// Bot.
    pub recipient_id: PlayerId,
    /// Configured bot/channel instance.
    pub application_id: String,
    /// Routing state.
    #[serde(default)]
    pub state: ActionState,
}

/// Anything the engine processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// User input.
    Action(Action),
    /// A conversation was opened by the channel.
    StartConversation(EventHeader),
    /// A conversation was closed by the channel.
    EndConversation(EventHeader),
}

impl Event {
    /// Returns the user the event belongs to.
    pub fn player_id(&self) -> &PlayerId {
        match self {
            Self::Action(a) => &a.player_id,
            Self::StartConversation(h) | Self::EndConversation(h) => &h.player_id,
        }
    }

    /// Returns the bot the event is addressed to.
    pub fn recipient_id(&self) -> &PlayerId {
        match self {
            Self::Action(a) => &a.recipient_id,
            Self::StartConversation(h) | Self::EndConversation(h) => &h.recipient_id,
        }
    }

    /// Returns the configured application id.
    pub fn application_id(&self) -> &str {
        match self {
            Self::Action(a) => &a.application_id,
            Self::StartConversation(h) | Self::EndConversation(h) => &h.application_id,
        }
    }

    /// Returns the routing state.
    pub fn state(&self) -> &ActionState {
        match self {
            Self::Action(a) => &a.state,
            Self::StartConversation(h) | Self::EndConversation(h) => &h.state,
        }
    }

    /// Returns the routing state mutably.
    pub fn state_mut(&mut self) -> &mut ActionState {
        match self {
            Self::Action(a) => &mut a.state,
            Self::StartConversation(h) | Self::EndConversation(h) => &mut h.state,
        }
    }

    /// Returns the action, if this event is one.
    pub fn as_action(&self) -> Option<&Action> {
        match self {
            Self::Action(a) => Some(a),
            _ => None,
        }
    }

    /// Returns a stable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Action(a) => a.kind.label(),
            Self::StartConversation(_) => "start_conversation",
            Self::EndConversation(_) => "end_conversation",
        }
    }
}

impl From<Action> for Event {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_sentence(text: &str) -> Action {
        Action::sentence(PlayerId::user("u1"), PlayerId::bot("b1"), "app", text)
    }

    #[test]
    fn answer_swaps_players_and_keeps_routing() {
        let mut input = user_sentence("hello");
        input.state.target_connector_type = Some(ConnectorType::activity());
        input.metadata.debug_enabled = true;

        let answer = input.answer_text("hi");

        assert_eq!(answer.player_id, PlayerId::bot("b1"));
        assert_eq!(answer.recipient_id, PlayerId::user("u1"));
        assert_eq!(answer.state.target_connector_type, Some(ConnectorType::activity()));
        assert!(answer.metadata.debug_enabled);
        assert!(!answer.metadata.last_answer);
        assert_ne!(answer.id, input.id);
    }

    #[test]
    fn choice_text_comes_from_nlp_parameter() {
        let mut choice = Choice {
            intent: "yes".into(),
            ..Default::default()
        };
        assert_eq!(choice.nlp_text(), None);
        choice.parameters.insert(NLP_PARAM.into(), "sure".into());
        assert_eq!(choice.nlp_text(), Some("sure"));
    }

    #[test]
    fn action_serializes_kind_inline() {
        let json = serde_json::to_value(user_sentence("hey")).unwrap();
        assert_eq!(json["type"], "sentence");
        assert_eq!(json["text"], "hey");
        assert_eq!(json["playerId"]["id"], "u1");
    }
}
