//! Rendering of actions and generic messages as outbound activities.

use serde_json::{Value, json};
use switchboard_core::foundation::message::{SUBTITLE_PARAM, TEXT_PARAM, TITLE_PARAM};
use switchboard_core::foundation::{AttachmentType, GenericElement};
use switchboard_core::{ActionKind, ConnectorMessage, ConnectorType, GenericMessage};
use tracing::{debug, warn};

use crate::model::{Activity, ActivityAttachment, CardAction};

/// Content type of hero cards.
pub const HERO_CARD: &str = "application/vnd.microsoft.card.hero";

/// Activities to push for one action, in order.
///
/// Actions the channel cannot show (choices, debug traces) yield nothing.
pub fn activities_for(kind: &ActionKind) -> Vec<Activity> {
    match kind {
        ActionKind::Sentence(sentence) if !sentence.messages.is_empty() => sentence
            .messages
            .iter()
            .filter_map(from_connector_message)
            .collect(),
        ActionKind::Sentence(sentence) => sentence
            .text
            .as_deref()
            .map(|text| vec![Activity::message(text)])
            .unwrap_or_default(),
        ActionKind::Attachment(attachment) => vec![Activity {
            attachments: vec![media(&attachment.url, attachment.attachment_type)],
            ..Activity::message("")
        }
        .without_empty_text()],
        ActionKind::Location(location) => location
            .location
            .map(|p| vec![Activity::message(format!("{}, {}", p.lat, p.lng))])
            .unwrap_or_default(),
        other => {
            debug!(kind = other.label(), "Nothing to push for action");
            Vec::new()
        }
    }
}

/// Reads an activity back from an activity connector message.
pub fn from_connector_message(message: &ConnectorMessage) -> Option<Activity> {
    if message.connector_type != ConnectorType::activity() {
        debug!(connector = %message.connector_type, "Skipping message for another channel");
        return None;
    }
    match serde_json::from_value(message.payload.clone()) {
        Ok(activity) => Some(activity),
        Err(e) => {
            warn!(error = %e, "Invalid activity payload");
            None
        }
    }
}

/// Wraps an activity into a connector message.
pub fn to_connector_message(activity: &Activity) -> ConnectorMessage {
    let payload = serde_json::to_value(activity).unwrap_or(Value::Null);
    ConnectorMessage::new(ConnectorType::activity(), payload)
}

/// Renders a generic message as one activity.
///
/// Cards become hero card attachments laid out as a carousel; choices
/// become quick replies.
pub fn render_generic(message: &GenericMessage) -> Activity {
    let mut activity = Activity::message(message.main_text().unwrap_or_default());

    activity.attachments = message
        .attachments
        .iter()
        .map(|a| media(&a.url, a.attachment_type))
        .collect();

    if message.is_carousel() {
        activity
            .attachments
            .extend(message.sub_elements.iter().map(hero_card));
        activity.attachment_layout = Some("carousel".to_string());
    }

    if !message.choices.is_empty() {
        let labels: Vec<String> = message
            .choices
            .iter()
            .map(|c| c.display_text().to_string())
            .collect();
        activity = activity.with_suggestions(&labels);
    }

    if activity.text.as_deref() == Some("") && activity.attachments.is_empty() {
        activity.text = Some(message.text_fallback());
    }
    activity.without_empty_text()
}

fn hero_card(element: &GenericElement) -> ActivityAttachment {
    let images: Vec<Value> = element
        .attachments
        .iter()
        .filter(|a| a.attachment_type == AttachmentType::Image)
        .map(|a| json!({ "url": a.url }))
        .collect();
    let buttons: Vec<CardAction> = element
        .choices
        .iter()
        .map(|c| CardAction::im_back(c.display_text()))
        .collect();

    ActivityAttachment {
        content_type: HERO_CARD.to_string(),
        content_url: None,
        content: Some(json!({
            "title": element.texts.get(TITLE_PARAM),
            "subtitle": element.texts.get(SUBTITLE_PARAM),
            "text": element.texts.get(TEXT_PARAM),
            "images": images,
            "buttons": buttons,
        })),
    }
}

fn media(url: &str, kind: AttachmentType) -> ActivityAttachment {
    let content_type = match kind {
        AttachmentType::Image => "image/*",
        AttachmentType::Audio => "audio/*",
        AttachmentType::Video => "video/*",
        AttachmentType::File => "application/octet-stream",
    };
    ActivityAttachment {
        content_type: content_type.to_string(),
        content_url: Some(url.to_string()),
        content: None,
    }
}

impl Activity {
    fn without_empty_text(mut self) -> Self {
        if self.text.as_deref() == Some("") {
            self.text = None;
        }
        self
    }
}
