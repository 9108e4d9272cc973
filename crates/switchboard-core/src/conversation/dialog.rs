//! Dialogs and stories.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::foundation::{Action, ActionKind, PlayerId};

/// Story used when the bot logic has not chosen one.
pub const DEFAULT_STORY: &str = "default";

/// A run of actions sharing one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    /// Story definition id, usually the intent that started it.
    pub definition_id: String,
    /// Current step within the story.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Actions in order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Story {
    /// Creates an empty story.
    pub fn new(definition_id: impl Into<String>) -> Self {
        Self {
            definition_id: definition_id.into(),
            current_step: None,
            actions: Vec::new(),
        }
    }
}

/// One bounded conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dialog {
    /// Unique dialog id.
    pub id: String,
    /// Participants, migrated when a user re-authenticates.
    pub player_ids: HashSet<PlayerId>,
    /// Group conversation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Stories in order.
    #[serde(default)]
    pub stories: Vec<Story>,
    /// Last mutation.
    pub last_update: DateTime<Utc>,
}

impl Dialog {
    /// Creates an empty dialog between `players`.
    pub fn new(players: impl IntoIterator<Item = PlayerId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            player_ids: players.into_iter().collect(),
            group_id: None,
            stories: Vec::new(),
            last_update: Utc::now(),
        }
    }

    /// Starts a follow-up dialog: same players and group, the current story
    /// definition carried over without its actions.
    pub fn init_from(previous: &Dialog) -> Self {
        let mut dialog = Self::new(previous.player_ids.iter().cloned());
        dialog.group_id.clone_from(&previous.group_id);
        if let Some(story) = previous.current_story() {
            let mut carried = Story::new(story.definition_id.clone());
            carried.current_step.clone_from(&story.current_step);
            dialog.stories.push(carried);
        }
        dialog
    }

    /// Returns the current story.
    pub fn current_story(&self) -> Option<&Story> {
        self.stories.last()
    }

    /// Returns the current story mutably.
    pub fn current_story_mut(&mut self) -> Option<&mut Story> {
        self.stories.last_mut()
    }

    /// Iterates over every action in order.
    pub fn all_actions(&self) -> impl DoubleEndedIterator<Item = &Action> {
        self.stories.iter().flat_map(|s| s.actions.iter())
    }

    /// Returns the number of actions.
    pub fn actions_len(&self) -> usize {
        self.stories.iter().map(|s| s.actions.len()).sum()
    }

    /// Returns the last action.
    pub fn last_action(&self) -> Option<&Action> {
        self.all_actions().next_back()
    }

    /// Returns the last action sent by a user.
    pub fn last_user_action(&self) -> Option<&Action> {
        self.all_actions().rev().find(|a| a.is_from_user())
    }

    /// Starts a new story unless the current one already has this definition.
    pub fn switch_story(&mut self, definition_id: &str) {
        if self.current_story().map(|s| s.definition_id.as_str()) != Some(definition_id) {
            self.stories.push(Story::new(definition_id));
        }
    }

    /// Appends an action to the current story, opening the default story when
    /// there is none.
    pub fn add_action(&mut self, action: Action) {
        self.last_update = action.date.max(self.last_update);
        if self.stories.is_empty() {
            self.stories.push(Story::new(DEFAULT_STORY));
        }
        if let Some(story) = self.stories.last_mut() {
            story.actions.push(action);
        }
    }

    /// Replaces `old` by `new` in the participants.
    pub fn migrate_player(&mut self, old: &PlayerId, new: &PlayerId) {
        if self.player_ids.remove(old) {
            self.player_ids.insert(new.clone());
        }
    }

    /// Builds the snapshot recorded after each save.
    pub fn snapshot(&self) -> DialogSnapshot {
        let story = self.current_story();
        let last = self.last_action();
        DialogSnapshot {
            date: Utc::now(),
            story_definition_id: story.map(|s| s.definition_id.clone()),
            step: story.and_then(|s| s.current_step.clone()),
            intent: self.last_user_action().and_then(|a| match &a.kind {
                ActionKind::Choice(c) => Some(c.intent.clone()),
                _ => None,
            }),
            last_action_kind: last.map(|a| a.kind.label().to_string()),
            actions: self.actions_len(),
        }
    }
}

/// State of a dialog at one save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogSnapshot {
    /// Save instant.
    pub date: DateTime<Utc>,
    /// Current story definition.
    pub story_definition_id: Option<String>,
    /// Current step.
    pub step: Option<String>,
    /// Intent of the last user choice.
    pub intent: Option<String>,
    /// Kind of the last action.
    pub last_action_kind: Option<String>,
    /// Number of actions.
    pub actions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialog() -> Dialog {
        Dialog::new([PlayerId::user("u"), PlayerId::bot("b")])
    }

    fn user_text(text: &str) -> Action {
        Action::sentence(PlayerId::user("u"), PlayerId::bot("b"), "app", text)
    }

    #[test]
    fn last_actions_scan_backward_across_stories() {
        let mut d = dialog();
        let question = user_text("where is my train?");
        d.add_action(question.clone());
        d.switch_story("train");
        let answer = question.answer_text("platform 4");
        d.add_action(answer.clone());

        assert_eq!(d.stories.len(), 2);
        assert_eq!(d.last_action(), Some(&answer));
        assert_eq!(d.last_user_action(), Some(&question));
        assert_eq!(d.actions_len(), 2);
    }

    #[test]
    fn switch_to_same_story_is_noop() {
        let mut d = dialog();
        d.switch_story("greet");
        d.switch_story("greet");
        assert_eq!(d.stories.len(), 1);
    }

    #[test]
    fn init_from_carries_players_and_story_only() {
        let mut d = dialog();
        d.group_id = Some("g".into());
        d.switch_story("booking");
        d.add_action(user_text("book"));

        let next = Dialog::init_from(&d);

        assert_ne!(next.id, d.id);
        assert_eq!(next.player_ids, d.player_ids);
        assert_eq!(next.group_id.as_deref(), Some("g"));
        assert_eq!(next.stories.len(), 1);
        assert_eq!(next.stories[0].definition_id, "booking");
        assert_eq!(next.actions_len(), 0);
    }

    #[test]
    fn migrate_player_keeps_history() {
        let mut d = dialog();
        d.add_action(user_text("hi"));
        d.migrate_player(&PlayerId::user("u"), &PlayerId::user("known"));

        assert!(d.player_ids.contains(&PlayerId::user("known")));
        assert!(!d.player_ids.contains(&PlayerId::user("u")));
        assert_eq!(d.actions_len(), 1);
    }
}
