//! Chat activities: the inbound event received on the webhook and the reply sent back.

use serde::{Deserialize, Serialize};

/// Activity type string for chat messages.
pub const MESSAGE_TYPE: &str = "message";

#[derive(Debug, thiserror::Error)]
#[error("malformed activity: {reason}")]
pub struct MalformedActivity {
    pub reason: String,
}

impl MalformedActivity {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityType {
    Message,
    /// Typing indicators, conversation updates and anything else; acknowledged without a reply.
    Other(String),
}

impl ActivityType {
    fn parse(s: &str) -> Self {
        if s == MESSAGE_TYPE {
            ActivityType::Message
        } else {
            ActivityType::Other(s.to_string())
        }
    }
}

/// A user or bot account as it appears in `from` / `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Everything needed to post a reply into the same conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationReference {
    pub service_url: String,
    pub channel_id: String,
    pub conversation_id: String,
    /// Id of the inbound activity; replies are threaded to it when present.
    pub activity_id: Option<String>,
    /// The bot (inbound `recipient`).
    pub bot: Option<ChannelAccount>,
    /// The user (inbound `from`).
    pub user: Option<ChannelAccount>,
}

/// One received chat event. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundActivity {
    pub activity_type: ActivityType,
    pub text: String,
    pub reference: ConversationReference,
}

impl InboundActivity {
    pub fn channel_id(&self) -> &str {
        &self.reference.channel_id
    }

    pub fn is_message(&self) -> bool {
        self.activity_type == ActivityType::Message
    }

    /// Parse a webhook body. `type`, `channelId`, `serviceUrl` and `conversation.id` are required;
    /// a missing or null `text` becomes the empty string.
    pub fn from_slice(body: &[u8]) -> Result<Self, MalformedActivity> {
        let raw: RawActivity =
            serde_json::from_slice(body).map_err(|e| MalformedActivity::new(e.to_string()))?;
        raw.try_into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActivity {
    #[serde(rename = "type")]
    activity_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    service_url: Option<String>,
    #[serde(default)]
    conversation: Option<RawConversation>,
    #[serde(default)]
    from: Option<ChannelAccount>,
    #[serde(default)]
    recipient: Option<ChannelAccount>,
}

#[derive(Debug, Deserialize)]
struct RawConversation {
    #[serde(default)]
    id: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, MalformedActivity> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MalformedActivity::new(format!("missing field `{}`", field)))
}

impl TryFrom<RawActivity> for InboundActivity {
    type Error = MalformedActivity;

    fn try_from(raw: RawActivity) -> Result<Self, Self::Error> {
        if raw.activity_type.trim().is_empty() {
            return Err(MalformedActivity::new("missing field `type`"));
        }
        let reference = ConversationReference {
            service_url: required(raw.service_url, "serviceUrl")?,
            channel_id: required(raw.channel_id, "channelId")?,
            conversation_id: required(raw.conversation.and_then(|c| c.id), "conversation.id")?,
            activity_id: raw.id.filter(|id| !id.is_empty()),
            bot: raw.recipient,
            user: raw.from,
        };
        Ok(Self {
            activity_type: ActivityType::parse(&raw.activity_type),
            text: raw.text.unwrap_or_default(),
            reference,
        })
    }
}

/// The single reply produced for a message activity. Its type is always `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundActivity {
    pub text: String,
}

impl OutboundActivity {
    pub fn message(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Connector API body for replying within `reference`'s conversation.
    pub fn to_payload(&self, reference: &ConversationReference) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "type": MESSAGE_TYPE,
            "text": self.text,
            "channelId": reference.channel_id,
            "conversation": { "id": reference.conversation_id },
        });
        if let Some(bot) = &reference.bot {
            payload["from"] = serde_json::json!(bot);
        }
        if let Some(user) = &reference.user {
            payload["recipient"] = serde_json::json!(user);
        }
        if let Some(id) = &reference.activity_id {
            payload["replyToId"] = serde_json::Value::String(id.clone());
        }
        payload
    }
}
