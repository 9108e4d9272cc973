//! Outbound pushes to the channel's conversation API.
//!
//! Every action of a flushed dispatch gets its own push task, started at the
//! cumulative delay of the actions before it plus its own. Tasks start in
//! action order; a slow or failed push never holds back the next one.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use switchboard_core::{HttpClientCapability, TransportResult};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::PushConfig;
use crate::model::{Activity, ChannelAccount, ConversationAccount};

/// Where the replies of one inbound activity go.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyAddress {
    /// Base URL of the channel API.
    pub service_url: String,
    /// Conversation.
    pub conversation: ConversationAccount,
    /// The bot, sender of the replies.
    pub bot: Option<ChannelAccount>,
    /// The user.
    pub user: Option<ChannelAccount>,
    /// Activity being answered.
    pub reply_to_id: Option<String>,
}

impl ReplyAddress {
    /// Addresses the replies to `inbound`, when it names a service and a conversation.
    pub fn from_inbound(inbound: &Activity) -> Option<Self> {
        if inbound.service_url.is_empty() {
            return None;
        }
        Some(Self {
            service_url: inbound.service_url.clone(),
            conversation: inbound.conversation.clone()?,
            bot: inbound.recipient.clone(),
            user: inbound.from.clone(),
            reply_to_id: inbound.id.clone(),
        })
    }

    /// Endpoint receiving new activities.
    pub fn activities_url(&self) -> String {
        format!(
            "{}/v3/conversations/{}/activities",
            self.service_url.trim_end_matches('/'),
            self.conversation.id
        )
    }

    /// Fills the routing fields of an outbound activity.
    pub fn address(&self, mut activity: Activity) -> Activity {
        activity.from = self.bot.clone();
        activity.recipient = self.user.clone();
        activity.conversation = Some(self.conversation.clone());
        activity.reply_to_id = self.reply_to_id.clone();
        activity
    }
}

/// Pushes activities with retries.
pub struct Pusher {
    client: Arc<dyn HttpClientCapability>,
    token: Option<String>,
    policy: PushConfig,
}

impl Pusher {
    /// Creates a pusher sending `token` as bearer.
    pub fn new(
        client: Arc<dyn HttpClientCapability>,
        token: Option<String>,
        policy: PushConfig,
    ) -> Self {
        Self {
            client,
            token,
            policy,
        }
    }

    /// Pushes every entry, each at its own offset.
    ///
    /// Entry *i* starts once the delays of entries `0..=i` have elapsed, on
    /// its own task. Entries with nothing to send still count towards the
    /// delay. The returned task ends when every push is done.
    pub fn schedule(
        self: &Arc<Self>,
        address: Arc<ReplyAddress>,
        entries: Vec<(Duration, Vec<Activity>)>,
    ) -> JoinHandle<()> {
        let pusher = Arc::clone(self);
        let start = Instant::now();
        tokio::spawn(async move {
            let mut offset = Duration::ZERO;
            let mut pushes = Vec::with_capacity(entries.len());

            for (index, (delay, activities)) in entries.into_iter().enumerate() {
                offset += delay;
                if activities.is_empty() {
                    continue;
                }
                tokio::time::sleep_until(start + offset).await;
                let pusher = Arc::clone(&pusher);
                let address = Arc::clone(&address);
                pushes.push(tokio::spawn(async move {
                    for activity in activities {
                        if let Err(e) = pusher.push(&address, activity).await {
                            error!(
                                index,
                                conversation = %address.conversation.id,
                                error = %e,
                                "Failed to push message"
                            );
                        }
                    }
                }));
            }
            for push in pushes {
                if let Err(e) = push.await {
                    error!(error = %e, "Push task failed");
                }
            }
        })
    }

    /// Sends one activity, retrying transient failures with exponential backoff.
    pub async fn push(&self, address: &ReplyAddress, activity: Activity) -> TransportResult<()> {
        let url = address.activities_url();
        let body = serde_json::to_value(address.address(activity)).unwrap_or(Value::Null);
        let attempts = self.policy.max_attempts.max(1);

        let mut retry = 0;
        loop {
            match self.client.post_json(&url, &body, self.token.as_deref()).await {
                Ok(_) => {
                    debug!(url = %url, attempt = retry + 1, "Message pushed");
                    return Ok(());
                }
                Err(e) if e.is_transient() && retry + 1 < attempts => {
                    let wait = self.policy.backoff(retry);
                    warn!(url = %url, error = %e, ?wait, "Push failed, retrying");
                    tokio::time::sleep(wait).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
