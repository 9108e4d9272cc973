//! The HANDLED step: timeline bookkeeping around the bot logic.
//!
//! [`BotEngine::handle`] runs with the user lock held and the timeline
//! loaded. It fills the routing state of the event, refreshes the user
//! profile when its flags say so, records the action in the current story
//! and then hands a [`Turn`] to the [`BotLogic`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::callback::ConnectorCallback;
use crate::conversation::{
    BOT_DISABLED_FLAG, Dialog, PROFILE_LOADED_FLAG, PROFILE_REFRESHED_FLAG, UserTimeline,
};
use crate::foundation::{
    Action, ActionKind, ConnectorMessage, ConnectorType, Event, GenericMessage, Locale, Sentence,
};
use crate::integration::{Adapter, AdapterRegistry, SuggestionTarget};
use crate::nlp::{BoxedClassifier, Classification, classify_or_unknown};

/// How bot logic finished a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The turn produced its answer.
    Answered,
    /// The turn deliberately produced no answer.
    Skipped,
}

/// Business logic invoked once per dispatched event.
#[async_trait]
pub trait BotLogic: Send + Sync {
    /// Handles one event. Errors become a business failure of the dispatch.
    async fn handle(&self, turn: &mut Turn<'_>) -> anyhow::Result<()>;
}

/// A shared bot logic.
pub type BoxedBotLogic = Arc<dyn BotLogic>;

/// Everything bot logic may touch while handling one event.
pub struct Turn<'a> {
    event: &'a Event,
    timeline: &'a mut UserTimeline,
    callback: &'a mut dyn ConnectorCallback,
    adapter: &'a dyn Adapter,
    registry: &'a AdapterRegistry,
    classifier: Option<&'a BoxedClassifier>,
    completion: Option<Completion>,
}

impl<'a> Turn<'a> {
    /// The event being handled.
    pub fn event(&self) -> &Event {
        self.event
    }

    /// The event as an action, when it is one.
    pub fn action(&self) -> Option<&Action> {
        self.event.as_action()
    }

    /// Text of the inbound action.
    pub fn text(&self) -> Option<&str> {
        self.action().and_then(Action::text)
    }

    /// The user's timeline.
    pub fn timeline(&self) -> &UserTimeline {
        self.timeline
    }

    /// The user's timeline, mutably.
    pub fn timeline_mut(&mut self) -> &mut UserTimeline {
        self.timeline
    }

    /// The current dialog.
    pub fn dialog(&self) -> Option<&Dialog> {
        self.timeline.current_dialog()
    }

    /// Locale of the request.
    pub fn locale(&self) -> &Locale {
        self.callback.locale()
    }

    /// Channel the answer is rendered for.
    pub fn target_connector_type(&self) -> &ConnectorType {
        self.event
            .state()
            .target_connector_type
            .as_ref()
            .unwrap_or_else(|| self.adapter.connector_type())
    }

    /// Builds a bot answer to the current event.
    pub fn answer(&self, kind: ActionKind) -> Action {
        match self.event {
            Event::Action(action) => action.answer(kind),
            Event::StartConversation(header) | Event::EndConversation(header) => {
                let mut answer = Action::new(
                    header.recipient_id.clone(),
                    header.player_id.clone(),
                    header.application_id.clone(),
                    kind,
                );
                answer.state = header.state.clone();
                answer
            }
        }
    }

    /// Sends a text answer.
    pub async fn send(&mut self, text: impl Into<String>) {
        self.send_with_delay(text, Duration::ZERO).await;
    }

    /// Sends a text answer after `delay`.
    pub async fn send_with_delay(&mut self, text: impl Into<String>, delay: Duration) {
        let action = self.answer(text_kind(text));
        self.send_action(action, delay).await;
    }

    /// Sends channel-rendered messages.
    pub async fn send_messages(&mut self, messages: Vec<ConnectorMessage>) {
        let action = self.answer(ActionKind::Sentence(Sentence {
            text: None,
            messages,
        }));
        self.send_action(action, Duration::ZERO).await;
    }

    /// Sends a generic message, or its text fallback when the target
    /// channel has no rich rendering for it.
    pub async fn send_generic(&mut self, message: &GenericMessage) {
        let messages = self.to_connector_message(message);
        if messages.is_empty() {
            let connector_type = self.target_connector_type();
            debug!(%connector_type, "No rich rendering, sending text");
            self.send(message.text_fallback()).await;
        } else {
            self.send_messages(messages).await;
        }
    }

    /// Records an action in the current story and hands it to the adapter.
    pub async fn send_action(&mut self, action: Action, delay: Duration) {
        let recipient = self.event.recipient_id().clone();
        self.timeline
            .ensure_dialog(&recipient)
            .add_action(action.clone());
        self.adapter.send(action, &mut *self.callback, delay).await;
    }

    /// Sends the last answer of the turn.
    ///
    /// The callback is answered once the timeline has been saved.
    pub async fn end(&mut self, text: impl Into<String>) {
        let mut action = self.answer(text_kind(text));
        action.metadata.last_answer = true;
        self.send_action(action, Duration::ZERO).await;
        self.completion = Some(Completion::Answered);
    }

    /// Ends the turn without answering.
    pub fn skip(&mut self) {
        self.completion = Some(Completion::Skipped);
    }

    /// Moves the current dialog to another story.
    pub fn switch_story(&mut self, definition_id: &str) {
        let recipient = self.event.recipient_id().clone();
        self.timeline
            .ensure_dialog(&recipient)
            .switch_story(definition_id);
    }

    /// Re-enables the bot for this user.
    pub fn enable_bot(&mut self) {
        self.timeline.state.remove_flag(BOT_DISABLED_FLAG);
    }

    /// Disables the bot for this user, permanently or for `ttl`.
    pub fn disable_bot(&mut self, ttl: Option<chrono::Duration>) {
        match ttl {
            Some(ttl) => self
                .timeline
                .state
                .set_flag_for(BOT_DISABLED_FLAG, "true", ttl),
            None => self.timeline.state.set_flag(BOT_DISABLED_FLAG, "true"),
        }
    }

    /// Returns true when the target channel renders `feature`.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.adapter
            .has_feature(feature, self.target_connector_type(), self.registry)
    }

    /// Adds quick replies to a text or a message, rendered for the target channel.
    pub fn add_suggestions(
        &self,
        on: SuggestionTarget,
        suggestions: &[String],
    ) -> Option<ConnectorMessage> {
        self.adapter.add_suggestions(
            on,
            suggestions,
            self.target_connector_type(),
            self.registry,
        )
    }

    /// Renders a generic message for the target channel.
    ///
    /// Empty when the adapter has no rich rendering for that channel.
    /// [`Turn::send_generic`] sends the text fallback in that case.
    pub fn to_connector_message(&self, message: &GenericMessage) -> Vec<ConnectorMessage> {
        self.adapter
            .to_connector_message(message, self.target_connector_type(), self.registry)
    }

    /// Classifies text, or returns the unknown intent without a classifier.
    pub async fn classify(&self, text: &str) -> Classification {
        match self.classifier {
            Some(classifier) => classify_or_unknown(classifier.as_ref(), text, self.locale()).await,
            None => Classification::unknown(),
        }
    }

    /// How the logic ended the turn so far.
    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }
}

fn text_kind(text: impl Into<String>) -> ActionKind {
    ActionKind::Sentence(Sentence {
        text: Some(text.into()),
        messages: Vec::new(),
    })
}

/// Runs the bot logic against a loaded timeline.
pub struct BotEngine {
    logic: BoxedBotLogic,
    classifier: Option<BoxedClassifier>,
    profile_refresh: chrono::Duration,
}

impl BotEngine {
    /// Creates an engine around `logic`.
    pub fn new(logic: BoxedBotLogic) -> Self {
        Self {
            logic,
            classifier: None,
            profile_refresh: chrono::Duration::days(1),
        }
    }

    /// Sets the classifier exposed to bot logic.
    pub fn with_classifier(mut self, classifier: BoxedClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets how long a loaded profile stays fresh.
    pub fn with_profile_refresh(mut self, ttl: chrono::Duration) -> Self {
        self.profile_refresh = ttl;
        self
    }

    /// Handles one event for a locked, loaded timeline.
    pub async fn handle(
        &self,
        event: &mut Event,
        timeline: &mut UserTimeline,
        adapter: &dyn Adapter,
        callback: &mut dyn ConnectorCallback,
        registry: &AdapterRegistry,
    ) -> anyhow::Result<Completion> {
        {
            let state = event.state_mut();
            if state.source_connector_type.is_none() {
                state.source_connector_type = Some(adapter.connector_type().clone());
            }
            if state.target_connector_type.is_none() {
                state.target_connector_type = state.source_connector_type.clone();
            }
        }
        timeline.preferences.test |= event.state().test_event;

        self.refresh_profile(event, timeline, adapter, &*callback).await;
        if event.state().user_locale.is_none() {
            event.state_mut().user_locale = timeline.preferences.locale.clone();
        }

        let dialog = timeline.ensure_dialog(event.recipient_id());
        if let Event::Action(action) = &*event {
            dialog.add_action(action.clone());
        }

        if timeline.state.has_flag(BOT_DISABLED_FLAG) {
            debug!(user_id = %event.player_id(), "Bot disabled for user, not answering");
            return Ok(Completion::Skipped);
        }

        let mut turn = Turn {
            event: &*event,
            timeline,
            callback,
            adapter,
            registry,
            classifier: self.classifier.as_ref(),
            completion: None,
        };
        self.logic.handle(&mut turn).await?;
        Ok(turn.completion.unwrap_or(Completion::Answered))
    }

    async fn refresh_profile(
        &self,
        event: &Event,
        timeline: &mut UserTimeline,
        adapter: &dyn Adapter,
        callback: &dyn ConnectorCallback,
    ) {
        let fresh = timeline.state.has_flag(PROFILE_LOADED_FLAG)
            && timeline.state.has_flag(PROFILE_REFRESHED_FLAG);
        if !fresh {
            let profile = adapter.load_profile(callback, event.player_id()).await;
            timeline.preferences.fill_with(&profile);
            timeline.state.set_flag(PROFILE_LOADED_FLAG, "true");
            timeline
                .state
                .set_flag_until(PROFILE_REFRESHED_FLAG, "true", Utc::now() + self.profile_refresh);
            debug!(user_id = %event.player_id(), "User profile loaded");
        }
        if timeline.preferences.locale.is_none() {
            warn!(user_id = %event.player_id(), "Profile has no locale, using the request locale");
            timeline.preferences.locale = Some(callback.locale().clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{ScriptedLogic, TestAdapter, TestCallback};
    use crate::foundation::PlayerId;

    fn user_action(text: &str) -> Event {
        Event::from(Action::sentence(
            PlayerId::user("u1"),
            PlayerId::bot("bot"),
            "test",
            text,
        ))
    }

    #[tokio::test]
    async fn records_user_and_bot_actions() {
        let engine = BotEngine::new(Arc::new(ScriptedLogic::default()));
        let adapter = TestAdapter::new("test");
        let registry = AdapterRegistry::new();
        let mut callback = TestCallback::detached();
        let mut timeline = UserTimeline::new(PlayerId::user("u1"));
        let mut event = user_action("abc");

        let completion = engine
            .handle(&mut event, &mut timeline, &adapter, &mut callback, &registry)
            .await
            .unwrap();

        assert_eq!(completion, Completion::Answered);
        let dialog = timeline.current_dialog().unwrap();
        assert_eq!(dialog.actions_len(), 4);
        assert_eq!(dialog.last_user_action().unwrap().text(), Some("abc"));
        assert_eq!(callback.buffer.len(), 3);
        assert_eq!(
            event.state().target_connector_type,
            Some(ConnectorType::new("test"))
        );
    }

    #[tokio::test]
    async fn generic_message_degrades_to_text_without_rendering() {
        let engine = BotEngine::new(Arc::new(ScriptedLogic::default()));
        let adapter = TestAdapter::new("test");
        let registry = AdapterRegistry::new();
        let mut callback = TestCallback::detached();
        let mut timeline = UserTimeline::new(PlayerId::user("u1"));
        let mut event = user_action("card");

        engine
            .handle(&mut event, &mut timeline, &adapter, &mut callback, &registry)
            .await
            .unwrap();

        let texts: Vec<_> = callback
            .buffer
            .actions()
            .iter()
            .filter_map(|sent| sent.action.text())
            .collect();
        assert_eq!(texts, ["Card\ndetails", "done"]);
    }

    #[tokio::test]
    async fn disabled_bot_records_without_answering() {
        let logic = Arc::new(ScriptedLogic::default());
        let engine = BotEngine::new(logic.clone());
        let adapter = TestAdapter::new("test");
        let registry = AdapterRegistry::new();
        let mut callback = TestCallback::detached();
        let mut timeline = UserTimeline::new(PlayerId::user("u1"));
        timeline.state.set_flag(BOT_DISABLED_FLAG, "true");
        let mut event = user_action("hello");

        let completion = engine
            .handle(&mut event, &mut timeline, &adapter, &mut callback, &registry)
            .await
            .unwrap();

        assert_eq!(completion, Completion::Skipped);
        assert_eq!(logic.calls(), 0);
        assert_eq!(timeline.current_dialog().unwrap().actions_len(), 1);
        assert!(callback.buffer.is_empty());
    }

    #[tokio::test]
    async fn profile_loaded_once_while_fresh() {
        let engine = BotEngine::new(Arc::new(ScriptedLogic::default()));
        let adapter = TestAdapter::new("test");
        let registry = AdapterRegistry::new();
        let mut timeline = UserTimeline::new(PlayerId::user("u1"));

        for _ in 0..2 {
            let mut callback = TestCallback::detached();
            let mut event = user_action("hello");
            engine
                .handle(&mut event, &mut timeline, &adapter, &mut callback, &registry)
                .await
                .unwrap();
        }

        assert_eq!(adapter.profile_loads(), 1);
        assert_eq!(timeline.preferences.first_name.as_deref(), Some("Test"));
        assert!(timeline.state.has_flag(PROFILE_REFRESHED_FLAG));
    }

    #[tokio::test]
    async fn expired_refresh_flag_reloads_profile() {
        let engine = BotEngine::new(Arc::new(ScriptedLogic::default()));
        let adapter = TestAdapter::new("test");
        let registry = AdapterRegistry::new();
        let mut timeline = UserTimeline::new(PlayerId::user("u1"));
        timeline.state.set_flag(PROFILE_LOADED_FLAG, "true");
        timeline.state.set_flag_until(
            PROFILE_REFRESHED_FLAG,
            "true",
            Utc::now() - chrono::Duration::seconds(1),
        );

        let mut callback = TestCallback::detached();
        let mut event = user_action("hello");
        engine
            .handle(&mut event, &mut timeline, &adapter, &mut callback, &registry)
            .await
            .unwrap();

        assert_eq!(adapter.profile_loads(), 1);
    }

    #[tokio::test]
    async fn lifecycle_events_are_not_recorded() {
        let engine = BotEngine::new(Arc::new(ScriptedLogic::default()));
        let adapter = TestAdapter::new("test");
        let registry = AdapterRegistry::new();
        let mut callback = TestCallback::detached();
        let mut timeline = UserTimeline::new(PlayerId::user("u1"));
        let mut event = Event::StartConversation(crate::foundation::EventHeader {
            player_id: PlayerId::user("u1"),
            recipient_id: PlayerId::bot("bot"),
            application_id: "test".into(),
            state: Default::default(),
        });

        engine
            .handle(&mut event, &mut timeline, &adapter, &mut callback, &registry)
            .await
            .unwrap();

        let dialog = timeline.current_dialog().unwrap();
        assert!(dialog.all_actions().all(|a| !a.is_from_user()));
    }
}
