use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MAX_ATTACHMENT_SIZE: usize = 50 * 1024 * 1024;
pub const MAX_PREVIEW_LENGTH: usize = 120;
pub const DEFAULT_MESSAGE_LIMIT: u32 = 64;
pub const MAX_MESSAGE_LIMIT: u32 = 100;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

impl AttachmentKind {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            Self::Image
        } else if content_type.starts_with("video/") {
            Self::Video
        } else {
            Self::File
        }
    }

    pub fn preview_label(&self) -> &'static str {
        match self {
            Self::Image => "[image]",
            Self::Video => "[video]",
            Self::File => "[file]",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
    pub name: String,
}

// Copied at send time so unsending the original never corrupts the quote.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplySnapshot {
    pub message_id: String,
    pub preview: String,
    pub sender_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<ReplySnapshot>,
    pub created_at: u64,
    pub is_pinned: bool,
    pub is_unsent: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub conversation_id: String,
    pub participant_ids: Vec<String>,
    pub names: HashMap<String, String>,
    pub profile_pics: HashMap<String, String>,
    pub last_message: String,
    pub last_timestamp: u64,
    pub unread: HashMap<String, u32>,
    pub created_at: u64,
}

impl Conversation {
    pub fn other_participant<'a>(&'a self, user_id: &'a str) -> &'a str {
        self.participant_ids
            .iter()
            .find(|id| id.as_str() != user_id)
            .map(String::as_str)
            .unwrap_or(user_id)
    }

    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread.get(user_id).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub data: bytes::Bytes,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GetMessagesQuery {
    pub limit: Option<u32>,
    pub before: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinMessageRequest {
    pub pinned: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<ReplySnapshot>,
    pub created_at: u64,
    pub is_pinned: bool,
    pub is_unsent: bool,
}

impl From<Message> for MessageResponse {
    fn from(msg: Message) -> Self {
        // Unsent messages keep their slot; content is hidden, not deleted.
        let hidden = msg.is_unsent;
        Self {
            message_id: msg.message_id,
            conversation_id: msg.conversation_id,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            text: if hidden { None } else { msg.text },
            attachment: if hidden { None } else { msg.attachment },
            reply_to: if hidden { None } else { msg.reply_to },
            created_at: msg.created_at,
            is_pinned: msg.is_pinned,
            is_unsent: msg.is_unsent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub other_participant_id: String,
    pub other_name: String,
    pub other_profile_pic: Option<String>,
    pub last_message: String,
    pub last_timestamp: u64,
    pub unread_count: u32,
    pub presence: super::presence::Presence,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(is_unsent: bool) -> Message {
        Message {
            message_id: "m1".to_string(),
            conversation_id: "a_b".to_string(),
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            text: Some("hello".to_string()),
            attachment: Some(Attachment {
                url: "https://blobs.example/x".to_string(),
                kind: AttachmentKind::Image,
                name: "x.png".to_string(),
            }),
            reply_to: None,
            created_at: 1000,
            is_pinned: true,
            is_unsent,
        }
    }

    #[test]
    fn attachment_kind_from_content_type() {
        assert_eq!(
            AttachmentKind::from_content_type("image/png"),
            AttachmentKind::Image
        );
        assert_eq!(
            AttachmentKind::from_content_type("video/mp4"),
            AttachmentKind::Video
        );
        assert_eq!(
            AttachmentKind::from_content_type("application/pdf"),
            AttachmentKind::File
        );
        assert_eq!(
            AttachmentKind::from_content_type("text/plain"),
            AttachmentKind::File
        );
    }

    #[test]
    fn unsent_message_content_is_hidden_in_response() {
        let response = MessageResponse::from(message(true));
        assert!(response.text.is_none());
        assert!(response.attachment.is_none());
        assert!(response.is_unsent);
        assert_eq!(response.created_at, 1000);
        assert!(response.is_pinned);
    }

    #[test]
    fn sent_message_content_survives_in_response() {
        let response = MessageResponse::from(message(false));
        assert_eq!(response.text.as_deref(), Some("hello"));
        assert!(response.attachment.is_some());
    }

    #[test]
    fn other_participant_and_unread_lookup() {
        let mut unread = HashMap::new();
        unread.insert("a".to_string(), 0u32);
        unread.insert("b".to_string(), 3u32);
        let conversation = Conversation {
            conversation_id: "a_b".to_string(),
            participant_ids: vec!["a".to_string(), "b".to_string()],
            names: HashMap::new(),
            profile_pics: HashMap::new(),
            last_message: "hello".to_string(),
            last_timestamp: 10,
            unread,
            created_at: 1,
        };
        assert_eq!(conversation.other_participant("a"), "b");
        assert_eq!(conversation.other_participant("b"), "a");
        // A caller outside the pair falls back to an arbitrary member.
        assert_eq!(conversation.other_participant("z"), "a");
        assert_eq!(conversation.unread_for("b"), 3);
        assert_eq!(conversation.unread_for("missing"), 0);
    }
}
