//! Conversation layer - durable user state and its access discipline.
//!
//! - Timelines, dialogs, stories and lazily expiring flags
//! - The [`ConversationStore`] interface and an in-memory implementation
//! - The per-user [`UserLock`]

pub mod dialog;
pub mod flag;
pub mod lock;
pub mod memory;
pub mod preferences;
pub mod store;
pub mod timeline;

pub use dialog::{DEFAULT_STORY, Dialog, DialogSnapshot, Story};
pub use flag::{
    BOT_DISABLED_FLAG, PROFILE_LOADED_FLAG, PROFILE_REFRESHED_FLAG, TimeBoxedFlag, UserState,
};
pub use lock::{BoxedUserLock, InMemoryUserLock, UserLock, UserLockGuard};
pub use memory::{Clock, InMemoryStore};
pub use preferences::UserPreferences;
pub use store::{BoxedStore, ConversationStore, DEFAULT_NAMESPACE, StoreSettings};
pub use timeline::UserTimeline;
