//! Conversation store interface.
//!
//! The dispatch core only talks to storage through [`ConversationStore`].
//! Every operation is keyed by a namespace and a [`PlayerId`]; the store
//! knows nothing about channels.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::dialog::DialogSnapshot;
use super::timeline::UserTimeline;
use crate::foundation::{PlayerId, StoreResult};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "app";

/// Persistence of user timelines.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Saves a timeline and its dialogs.
    ///
    /// Application ids are merged with the stored ones, the last user action
    /// is recorded, a follow-up dialog is opened when the current one exceeds
    /// the action limit, one snapshot is appended per dialog and the client id
    /// mapping is updated.
    async fn save(&self, namespace: &str, timeline: &UserTimeline) -> StoreResult<()>;

    /// Loads a timeline with its last valid dialog.
    ///
    /// The dialog is looked up by `group_id` when given, otherwise by player.
    /// With a `prior_user_id`, the prior id is linked as a temporary id, its
    /// flags are copied where absent, and its last valid dialog is appended
    /// with `user_id` added to the participants.
    async fn load_with_last_valid_dialog(
        &self,
        namespace: &str,
        user_id: &PlayerId,
        prior_user_id: Option<&PlayerId>,
        group_id: Option<&str>,
    ) -> StoreResult<UserTimeline>;

    /// Loads a timeline without dialogs, creating a fresh one on a miss.
    async fn load_without_dialogs(
        &self,
        namespace: &str,
        user_id: &PlayerId,
    ) -> StoreResult<UserTimeline>;

    /// Deletes a timeline and its dialogs.
    async fn remove(&self, namespace: &str, user_id: &PlayerId) -> StoreResult<()>;

    /// Reattributes a timeline and its dialogs to a new player id.
    async fn update_player_id(
        &self,
        namespace: &str,
        old_id: &PlayerId,
        new_id: &PlayerId,
    ) -> StoreResult<()>;

    /// Returns the snapshots recorded for a dialog, oldest first.
    async fn get_snapshots(&self, dialog_id: &str) -> StoreResult<Vec<DialogSnapshot>>;

    /// Finds the timeline that lists `temporary_id` among its temporary ids.
    async fn load_by_temporary_id_without_dialogs(
        &self,
        namespace: &str,
        temporary_id: &str,
    ) -> StoreResult<Option<UserTimeline>>;

    /// Returns the user ids linked to a client id.
    async fn user_ids_for_client(&self, namespace: &str, client_id: &str)
    -> StoreResult<Vec<String>>;

    /// Deletes every timeline linked to a client id, then the link itself.
    async fn remove_client(&self, namespace: &str, client_id: &str) -> StoreResult<()>;

    /// Returns the story definition of the user's last valid dialog.
    async fn last_story_id(
        &self,
        namespace: &str,
        user_id: &PlayerId,
    ) -> StoreResult<Option<String>>;
}

/// A shared store.
pub type BoxedStore = Arc<dyn ConversationStore>;

/// Limits applied by store implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Actions a dialog may hold before a follow-up dialog is opened.
    pub max_actions_by_dialog: usize,
    /// Seconds after its last update during which a dialog stays current.
    pub dialog_max_validity_secs: u64,
}

impl StoreSettings {
    /// Returns the dialog validity window.
    pub fn dialog_max_validity(&self) -> Duration {
        i64::try_from(self.dialog_max_validity_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_actions_by_dialog: 1000,
            dialog_max_validity_secs: 60 * 60 * 24,
        }
    }
}
