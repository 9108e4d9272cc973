//! The durable per-user session root.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dialog::Dialog;
use super::flag::UserState;
use super::preferences::UserPreferences;
use crate::foundation::PlayerId;

/// Preferences, flags and dialog history of one user.
///
/// `dialogs` only grows during normal operation; the current dialog is
/// always the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTimeline {
    /// Owner.
    pub player_id: PlayerId,
    /// Profile.
    #[serde(default)]
    pub preferences: UserPreferences,
    /// Flags.
    #[serde(default)]
    pub state: UserState,
    /// Dialogs in order.
    #[serde(default)]
    pub dialogs: Vec<Dialog>,
    /// Ids later reconciled to this timeline.
    #[serde(default)]
    pub temporary_ids: BTreeSet<String>,
    /// Applications the user talked to.
    #[serde(default)]
    pub application_ids: BTreeSet<String>,
    /// Date of the last user action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_user_action_date: Option<DateTime<Utc>>,
    /// Text of the last user action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_user_action_text: Option<String>,
}

impl UserTimeline {
    /// Creates the timeline of a first contact.
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            preferences: UserPreferences::default(),
            state: UserState::new(),
            dialogs: Vec::new(),
            temporary_ids: BTreeSet::new(),
            application_ids: BTreeSet::new(),
            last_user_action_date: None,
            last_user_action_text: None,
        }
    }

    /// Returns the current dialog.
    pub fn current_dialog(&self) -> Option<&Dialog> {
        self.dialogs.last()
    }

    /// Returns the current dialog mutably.
    pub fn current_dialog_mut(&mut self) -> Option<&mut Dialog> {
        self.dialogs.last_mut()
    }

    /// Returns the current dialog, opening one between the owner and
    /// `recipient` when there is none.
    pub fn ensure_dialog(&mut self, recipient: &PlayerId) -> &mut Dialog {
        if self.dialogs.is_empty() {
            self.dialogs
                .push(Dialog::new([self.player_id.clone(), recipient.clone()]));
        }
        let last = self.dialogs.len() - 1;
        &mut self.dialogs[last]
    }

    /// Opens a new dialog, making it current.
    pub fn push_dialog(&mut self, dialog: Dialog) -> &mut Dialog {
        self.dialogs.push(dialog);
        let last = self.dialogs.len() - 1;
        &mut self.dialogs[last]
    }
}
