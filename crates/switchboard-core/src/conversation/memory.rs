//! In-memory reference implementation of [`ConversationStore`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::dialog::{Dialog, DialogSnapshot};
use super::store::{ConversationStore, StoreSettings};
use super::timeline::UserTimeline;
use crate::foundation::{PlayerId, StoreResult};

/// Source of the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct StoredTimeline {
    namespace: String,
    timeline: UserTimeline,
}

struct StoredDialog {
    namespace: String,
    dialog: Dialog,
}

#[derive(Default)]
struct Inner {
    timelines: HashMap<String, StoredTimeline>,
    dialogs: HashMap<String, StoredDialog>,
    snapshots: HashMap<String, Vec<DialogSnapshot>>,
    clients: HashMap<String, BTreeSet<String>>,
}

impl Inner {
    fn last_valid_dialog(
        &self,
        namespace: &str,
        min_update: DateTime<Utc>,
        matches: impl Fn(&Dialog) -> bool,
    ) -> Option<Dialog> {
        self.dialogs
            .values()
            .filter(|d| d.namespace == namespace && d.dialog.last_update > min_update)
            .filter(|d| matches(&d.dialog))
            .max_by_key(|d| d.dialog.last_update)
            .map(|d| d.dialog.clone())
    }

    fn timeline_without_dialogs(&self, namespace: &str, user_id: &PlayerId) -> UserTimeline {
        match self.timelines.get(&timeline_key(namespace, &user_id.id)) {
            Some(stored) => {
                let mut timeline = stored.timeline.clone();
                timeline.player_id = user_id.clone();
                timeline
            }
            None => UserTimeline::new(user_id.clone()),
        }
    }
}

fn timeline_key(namespace: &str, id: &str) -> String {
    format!("_{namespace}_{id}")
}

/// Process-local store backed by hash maps.
///
/// Suitable for tests, demos and single-instance deployments that accept
/// losing history on restart.
pub struct InMemoryStore {
    settings: StoreSettings,
    clock: Clock,
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates a store with default settings.
    pub fn new() -> Self {
        Self::with_settings(StoreSettings::default())
    }

    /// Creates a store with explicit settings.
    pub fn with_settings(settings: StoreSettings) -> Self {
        Self {
            settings,
            clock: Arc::new(Utc::now),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Replaces the clock used for validity windows.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the settings.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Returns the number of stored timelines.
    pub fn timeline_count(&self) -> usize {
        self.inner.read().timelines.len()
    }

    /// Returns a stored dialog by id.
    pub fn dialog(&self, dialog_id: &str) -> Option<Dialog> {
        self.inner
            .read()
            .dialogs
            .get(dialog_id)
            .map(|d| d.dialog.clone())
    }

    fn min_valid_update(&self) -> DateTime<Utc> {
        (self.clock)()
            .checked_sub_signed(self.settings.dialog_max_validity())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn save(&self, namespace: &str, timeline: &UserTimeline) -> StoreResult<()> {
        let key = timeline_key(namespace, &timeline.player_id.id);
        let mut inner = self.inner.write();

        let mut stored = timeline.clone();
        stored.dialogs.clear();
        if let Some(old) = inner.timelines.get(&key) {
            stored
                .application_ids
                .extend(old.timeline.application_ids.iter().cloned());
        }
        if let Some(action) = timeline.current_dialog().and_then(Dialog::last_user_action) {
            stored.last_user_action_date = Some(action.date);
            stored.last_user_action_text = action.text().map(str::to_string);
        }
        inner.timelines.insert(
            key,
            StoredTimeline {
                namespace: namespace.to_string(),
                timeline: stored,
            },
        );

        let mut dialogs = timeline.dialogs.clone();
        if let Some(last) = timeline.current_dialog()
            && last.actions_len() > self.settings.max_actions_by_dialog
        {
            let mut next = Dialog::init_from(last);
            next.last_update = (self.clock)().max(last.last_update);
            debug!(
                user_id = %timeline.player_id,
                previous = %last.id,
                next = %next.id,
                "Dialog action limit reached, opening follow-up dialog"
            );
            dialogs.push(next);
        }

        for dialog in dialogs {
            inner
                .snapshots
                .entry(dialog.id.clone())
                .or_default()
                .push(dialog.snapshot());
            inner.dialogs.insert(
                dialog.id.clone(),
                StoredDialog {
                    namespace: namespace.to_string(),
                    dialog,
                },
            );
        }

        if let Some(client_id) = &timeline.player_id.client_id {
            inner
                .clients
                .entry(timeline_key(namespace, client_id))
                .or_default()
                .insert(timeline.player_id.id.clone());
        }

        trace!(user_id = %timeline.player_id, namespace, "Timeline saved");
        Ok(())
    }

    async fn load_with_last_valid_dialog(
        &self,
        namespace: &str,
        user_id: &PlayerId,
        prior_user_id: Option<&PlayerId>,
        group_id: Option<&str>,
    ) -> StoreResult<UserTimeline> {
        let min_update = self.min_valid_update();
        let inner = self.inner.read();

        let mut timeline = inner.timeline_without_dialogs(namespace, user_id);

        let dialog = match group_id {
            Some(group) => inner.last_valid_dialog(namespace, min_update, |d| {
                d.group_id.as_deref() == Some(group)
            }),
            None => inner.last_valid_dialog(namespace, min_update, |d| {
                d.player_ids.contains(user_id)
            }),
        };
        timeline.dialogs.extend(dialog);

        if let Some(prior) = prior_user_id {
            timeline.temporary_ids.insert(prior.id.clone());
            if let Some(stored) = inner.timelines.get(&timeline_key(namespace, &prior.id)) {
                timeline.state.copy_flags_if_absent(&stored.timeline.state);
            }
            let own_dialog = timeline.current_dialog().map(|d| d.id.clone());
            if let Some(mut dialog) =
                inner.last_valid_dialog(namespace, min_update, |d| d.player_ids.contains(prior))
                && own_dialog.as_deref() != Some(dialog.id.as_str())
            {
                dialog.player_ids.insert(user_id.clone());
                timeline.dialogs.push(dialog);
            }
            debug!(user_id = %user_id, prior_user_id = %prior, "Linked prior user timeline");
        }

        Ok(timeline)
    }

    async fn load_without_dialogs(
        &self,
        namespace: &str,
        user_id: &PlayerId,
    ) -> StoreResult<UserTimeline> {
        Ok(self
            .inner
            .read()
            .timeline_without_dialogs(namespace, user_id))
    }

    async fn remove(&self, namespace: &str, user_id: &PlayerId) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner
            .timelines
            .remove(&timeline_key(namespace, &user_id.id));

        let removed: Vec<String> = inner
            .dialogs
            .iter()
            .filter(|(_, d)| d.namespace == namespace && d.dialog.player_ids.contains(user_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed {
            inner.dialogs.remove(id);
            inner.snapshots.remove(id);
        }

        debug!(user_id = %user_id, namespace, dialogs = removed.len(), "Timeline removed");
        Ok(())
    }

    async fn update_player_id(
        &self,
        namespace: &str,
        old_id: &PlayerId,
        new_id: &PlayerId,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();

        if let Some(mut stored) = inner
            .timelines
            .remove(&timeline_key(namespace, &old_id.id))
        {
            stored.timeline.player_id = new_id.clone();
            inner
                .timelines
                .insert(timeline_key(namespace, &new_id.id), stored);
        }

        for stored in inner.dialogs.values_mut() {
            if stored.namespace == namespace {
                stored.dialog.migrate_player(old_id, new_id);
            }
        }

        let prefix = timeline_key(namespace, "");
        for (key, users) in inner.clients.iter_mut() {
            if key.starts_with(&prefix) && users.remove(&old_id.id) {
                users.insert(new_id.id.clone());
            }
        }

        debug!(old_id = %old_id, new_id = %new_id, namespace, "Player id updated");
        Ok(())
    }

    async fn get_snapshots(&self, dialog_id: &str) -> StoreResult<Vec<DialogSnapshot>> {
        Ok(self
            .inner
            .read()
            .snapshots
            .get(dialog_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_by_temporary_id_without_dialogs(
        &self,
        namespace: &str,
        temporary_id: &str,
    ) -> StoreResult<Option<UserTimeline>> {
        Ok(self
            .inner
            .read()
            .timelines
            .values()
            .find(|s| s.namespace == namespace && s.timeline.temporary_ids.contains(temporary_id))
            .map(|s| s.timeline.clone()))
    }

    async fn user_ids_for_client(
        &self,
        namespace: &str,
        client_id: &str,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .clients
            .get(&timeline_key(namespace, client_id))
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_client(&self, namespace: &str, client_id: &str) -> StoreResult<()> {
        let users = {
            let mut inner = self.inner.write();
            inner
                .clients
                .remove(&timeline_key(namespace, client_id))
                .unwrap_or_default()
        };
        for user in users {
            self.remove(namespace, &PlayerId::user(user)).await?;
        }
        Ok(())
    }

    async fn last_story_id(
        &self,
        namespace: &str,
        user_id: &PlayerId,
    ) -> StoreResult<Option<String>> {
        let min_update = self.min_valid_update();
        Ok(self
            .inner
            .read()
            .last_valid_dialog(namespace, min_update, |d| d.player_ids.contains(user_id))
            .and_then(|d| d.current_story().map(|s| s.definition_id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::Action;
    use chrono::Duration;
    use parking_lot::Mutex;

    const NS: &str = "test";

    fn manual_clock(start: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&now);
        (Arc::new(move || *handle.lock()), now)
    }

    fn user() -> PlayerId {
        PlayerId::user("u1")
    }

    fn bot() -> PlayerId {
        PlayerId::bot("b1")
    }

    fn timeline_with_message(text: &str) -> UserTimeline {
        let mut timeline = UserTimeline::new(user());
        timeline
            .ensure_dialog(&bot())
            .add_action(Action::sentence(user(), bot(), "app", text));
        timeline
    }

    #[tokio::test]
    async fn miss_creates_fresh_timeline() {
        let store = InMemoryStore::new();
        let timeline = store
            .load_with_last_valid_dialog(NS, &user(), None, None)
            .await
            .unwrap();
        assert_eq!(timeline.player_id, user());
        assert!(timeline.dialogs.is_empty());
        assert_eq!(store.timeline_count(), 0);
    }

    #[tokio::test]
    async fn save_then_load_returns_current_dialog() {
        let store = InMemoryStore::new();
        let mut timeline = timeline_with_message("hello");
        timeline.application_ids.insert("app".into());
        store.save(NS, &timeline).await.unwrap();

        let loaded = store
            .load_with_last_valid_dialog(NS, &user(), None, None)
            .await
            .unwrap();

        assert_eq!(loaded.dialogs.len(), 1);
        assert_eq!(loaded.current_dialog().unwrap().actions_len(), 1);
        assert_eq!(loaded.last_user_action_text.as_deref(), Some("hello"));
        assert!(loaded.application_ids.contains("app"));
    }

    #[tokio::test]
    async fn application_ids_are_merged() {
        let store = InMemoryStore::new();
        let mut first = timeline_with_message("a");
        first.application_ids.insert("web".into());
        store.save(NS, &first).await.unwrap();

        let mut second = UserTimeline::new(user());
        second.application_ids.insert("chat".into());
        store.save(NS, &second).await.unwrap();

        let loaded = store.load_without_dialogs(NS, &user()).await.unwrap();
        assert_eq!(
            loaded.application_ids.into_iter().collect::<Vec<_>>(),
            vec!["chat".to_string(), "web".to_string()]
        );
    }

    #[tokio::test]
    async fn stale_dialog_is_not_loaded() {
        let start = Utc::now();
        let (clock, now) = manual_clock(start);
        let store = InMemoryStore::with_settings(StoreSettings {
            dialog_max_validity_secs: 60,
            ..Default::default()
        })
        .with_clock(clock);

        store.save(NS, &timeline_with_message("hi")).await.unwrap();
        *now.lock() = start + Duration::seconds(120);

        let loaded = store
            .load_with_last_valid_dialog(NS, &user(), None, None)
            .await
            .unwrap();
        assert!(loaded.dialogs.is_empty());
    }

    #[tokio::test]
    async fn group_dialog_lookup() {
        let store = InMemoryStore::new();
        let mut timeline = timeline_with_message("in group");
        timeline.current_dialog_mut().unwrap().group_id = Some("room-1".into());
        store.save(NS, &timeline).await.unwrap();

        let other = PlayerId::user("u2");
        let loaded = store
            .load_with_last_valid_dialog(NS, &other, None, Some("room-1"))
            .await
            .unwrap();
        assert_eq!(loaded.current_dialog().unwrap().group_id.as_deref(), Some("room-1"));
    }

    #[tokio::test]
    async fn dialog_rolls_over_past_action_limit() {
        let store = InMemoryStore::with_settings(StoreSettings {
            max_actions_by_dialog: 2,
            ..Default::default()
        });
        let mut timeline = timeline_with_message("1");
        let dialog = timeline.current_dialog_mut().unwrap();
        dialog.add_action(Action::sentence(user(), bot(), "app", "2"));
        dialog.add_action(Action::sentence(user(), bot(), "app", "3"));
        let first_id = dialog.id.clone();

        store.save(NS, &timeline).await.unwrap();

        let loaded = store
            .load_with_last_valid_dialog(NS, &user(), None, None)
            .await
            .unwrap();
        let current = loaded.current_dialog().unwrap();
        assert_ne!(current.id, first_id);
        assert_eq!(current.actions_len(), 0);
        assert!(store.dialog(&first_id).is_some());
    }

    #[tokio::test]
    async fn snapshots_accumulate_per_save() {
        let store = InMemoryStore::new();
        let mut timeline = timeline_with_message("a");
        store.save(NS, &timeline).await.unwrap();
        timeline
            .current_dialog_mut()
            .unwrap()
            .add_action(Action::sentence(user(), bot(), "app", "b"));
        store.save(NS, &timeline).await.unwrap();

        let id = timeline.current_dialog().unwrap().id.clone();
        let snapshots = store.get_snapshots(&id).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].actions, 1);
        assert_eq!(snapshots[1].actions, 2);
        assert!(store.get_snapshots("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prior_user_is_merged() {
        let store = InMemoryStore::new();
        let anonymous = PlayerId::new("anon-1", crate::foundation::PlayerType::Temporary);
        let mut prior = UserTimeline::new(anonymous.clone());
        prior.state.set_flag("cart", "3 items");
        prior
            .ensure_dialog(&bot())
            .add_action(Action::sentence(anonymous.clone(), bot(), "app", "add to cart"));
        store.save(NS, &prior).await.unwrap();

        let loaded = store
            .load_with_last_valid_dialog(NS, &user(), Some(&anonymous), None)
            .await
            .unwrap();

        assert!(loaded.temporary_ids.contains("anon-1"));
        assert_eq!(loaded.state.flag("cart"), Some("3 items"));
        let dialog = loaded.current_dialog().unwrap();
        assert!(dialog.player_ids.contains(&user()));
        assert!(dialog.player_ids.contains(&anonymous));
        assert_eq!(dialog.actions_len(), 1);

        store.save(NS, &loaded).await.unwrap();
        let found = store
            .load_by_temporary_id_without_dialogs(NS, "anon-1")
            .await
            .unwrap();
        assert_eq!(found.map(|t| t.player_id), Some(user()));
    }

    #[tokio::test]
    async fn update_player_id_moves_timeline_and_dialogs() {
        let store = InMemoryStore::new();
        let timeline = timeline_with_message("hi");
        let dialog_id = timeline.current_dialog().unwrap().id.clone();
        store.save(NS, &timeline).await.unwrap();

        let known = PlayerId::user("known");
        store.update_player_id(NS, &user(), &known).await.unwrap();

        let loaded = store
            .load_with_last_valid_dialog(NS, &known, None, None)
            .await
            .unwrap();
        assert_eq!(loaded.current_dialog().unwrap().id, dialog_id);
        assert_eq!(loaded.last_user_action_text.as_deref(), Some("hi"));
        let old = store.load_without_dialogs(NS, &user()).await.unwrap();
        assert!(old.last_user_action_text.is_none());
    }

    #[tokio::test]
    async fn remove_deletes_timeline_and_dialogs() {
        let store = InMemoryStore::new();
        let timeline = timeline_with_message("bye");
        let dialog_id = timeline.current_dialog().unwrap().id.clone();
        store.save(NS, &timeline).await.unwrap();

        store.remove(NS, &user()).await.unwrap();

        assert_eq!(store.timeline_count(), 0);
        assert!(store.dialog(&dialog_id).is_none());
        assert!(store.get_snapshots(&dialog_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_mapping_and_removal() {
        let store = InMemoryStore::new();
        let mut timeline = timeline_with_message("hi");
        timeline.player_id = user().with_client_id("device-9");
        store.save(NS, &timeline).await.unwrap();

        assert_eq!(
            store.user_ids_for_client(NS, "device-9").await.unwrap(),
            vec!["u1".to_string()]
        );

        store.remove_client(NS, "device-9").await.unwrap();
        assert_eq!(store.timeline_count(), 0);
        assert!(store.user_ids_for_client(NS, "device-9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = InMemoryStore::new();
        store.save("a", &timeline_with_message("in a")).await.unwrap();

        let other = store
            .load_with_last_valid_dialog("b", &user(), None, None)
            .await
            .unwrap();
        assert!(other.dialogs.is_empty());
        assert_eq!(
            store.last_story_id("a", &user()).await.unwrap().as_deref(),
            Some(crate::conversation::dialog::DEFAULT_STORY)
        );
    }
}
