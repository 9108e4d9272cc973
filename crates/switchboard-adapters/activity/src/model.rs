//! Activity wire format.
//!
//! Inbound requests and outbound pushes share the same shape; field names
//! are camelCase and unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Activity type of user and bot messages.
pub const MESSAGE_TYPE: &str = "message";

/// A participant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    /// Channel-side id.
    pub id: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// `user` or `bot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The conversation an activity belongs to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    /// Conversation id.
    pub id: String,

    /// More than two participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

/// A quick reply button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardAction {
    /// Button behaviour, `imBack` for quick replies.
    #[serde(rename = "type")]
    pub action_type: String,

    /// Label.
    pub title: String,

    /// Value sent back when clicked.
    pub value: Value,
}

impl CardAction {
    /// A button sending its label back as text.
    pub fn im_back(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            action_type: "imBack".to_string(),
            value: Value::String(title.clone()),
            title,
        }
    }
}

/// Quick replies shown under a message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuggestedActions {
    /// Buttons.
    pub actions: Vec<CardAction>,
}

/// Media or card attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityAttachment {
    /// MIME type, or a card content type.
    pub content_type: String,

    /// Media URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,

    /// Card body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// One activity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Activity type.
    #[serde(rename = "type")]
    pub activity_type: String,

    /// Channel-assigned id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Base URL replies are pushed to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_url: String,

    /// Sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,

    /// Receiver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,

    /// Conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,

    /// Message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Structured payload of a button click.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// User locale, as a BCP 47 tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Activity this one answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,

    /// Quick replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<SuggestedActions>,

    /// `carousel` or `list`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_layout: Option<String>,

    /// Attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ActivityAttachment>,
}

impl Activity {
    /// An outbound text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            activity_type: MESSAGE_TYPE.to_string(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Returns true for `message` activities.
    pub fn is_message(&self) -> bool {
        self.activity_type == MESSAGE_TYPE
    }

    /// Returns true when the bot itself sent the activity.
    pub fn is_from_bot(&self) -> bool {
        match (&self.from, &self.recipient) {
            (Some(from), _) if from.role.as_deref() == Some("bot") => true,
            (Some(from), Some(recipient)) => from.id == recipient.id,
            _ => false,
        }
    }

    /// Replaces the quick replies.
    pub fn with_suggestions(mut self, suggestions: &[String]) -> Self {
        self.suggested_actions = Some(SuggestedActions {
            actions: suggestions.iter().map(CardAction::im_back).collect(),
        });
        self
    }
}

/// The only field authentication needs before the body is fully parsed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServiceUrlOnly {
    #[serde(default)]
    pub service_url: String,
}
