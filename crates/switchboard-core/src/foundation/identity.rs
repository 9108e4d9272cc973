//! Participant and channel identities.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// The role a participant plays in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerType {
    /// A human user.
    #[default]
    User,
    /// The bot itself.
    Bot,
    /// An anonymous id awaiting reconciliation with a known user.
    Temporary,
}

/// Identity of a conversation participant.
///
/// Two ids are the same participant when their `id` matches; `player_type`
/// and `client_id` are metadata and take no part in equality or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerId {
    /// Channel-scoped or global identifier.
    pub id: String,
    /// Participant role.
    #[serde(default, rename = "type")]
    pub player_type: PlayerType,
    /// Cross-channel linking key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl PlayerId {
    /// Creates a user id.
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, PlayerType::User)
    }

    /// Creates a bot id.
    pub fn bot(id: impl Into<String>) -> Self {
        Self::new(id, PlayerType::Bot)
    }

    /// Creates an id with an explicit role.
    pub fn new(id: impl Into<String>, player_type: PlayerType) -> Self {
        Self {
            id: id.into(),
            player_type,
            client_id: None,
        }
    }

    /// Attaches a cross-channel client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

impl PartialEq for PlayerId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PlayerId {}

impl Hash for PlayerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// How the user interacts with a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserInterface {
    /// Text chat.
    #[default]
    Text,
    /// Voice assistant.
    Voice,
}

/// Identifies a kind of channel (not a configured instance of it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorType {
    /// Channel kind identifier, e.g. `rest`.
    pub id: String,
    /// Interaction mode.
    #[serde(default)]
    pub user_interface: UserInterface,
}

impl ConnectorType {
    /// Creates a text connector type.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_interface: UserInterface::Text,
        }
    }

    /// Creates a voice connector type.
    pub fn voice(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_interface: UserInterface::Voice,
        }
    }

    /// The REST bridge.
    pub fn rest() -> Self {
        Self::new("rest")
    }

    /// The signed activity webhook channel.
    pub fn activity() -> Self {
        Self::new("activity")
    }

    /// Returns true for the REST bridge.
    pub fn is_rest(&self) -> bool {
        self.id == "rest"
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(id: &PlayerId) -> u64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn player_identity_ignores_metadata() {
        let a = PlayerId::new("42", PlayerType::User);
        let b = PlayerId::new("42", PlayerType::Temporary).with_client_id("client-7");

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn different_ids_differ() {
        assert_ne!(PlayerId::user("1"), PlayerId::user("2"));
    }

    #[test]
    fn player_id_wire_shape() {
        let json = serde_json::to_value(PlayerId::bot("b").with_client_id("c")).unwrap();
        assert_eq!(json["type"], "bot");
        assert_eq!(json["clientId"], "c");
    }
}
