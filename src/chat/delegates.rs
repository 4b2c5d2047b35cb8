use bytes::Bytes;
use futures::TryStreamExt;
use mongodb::{
    Collection,
    bson::{Document, doc},
    options::FindOptions,
};
use reqwest::multipart::{Form, Part};
use serde_json::json;
use std::{
    collections::{HashMap, HashSet},
    env::var,
    sync::{
        LazyLock, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::warn;
use uuid::Uuid;

use super::live::LIVE;
use super::schemas::*;
use crate::{DB, apex::utils::ChatError, auth::schemas::Account};

const COLLECTION_MESSAGES: &str = "messages";
const COLLECTION_CONVERSATIONS: &str = "conversations";
const COLLECTION_USERS: &str = "users";

/// One ledger record per participant pair: the id is derivable from the two
/// ids alone, in either order.
pub fn conversation_id_for(a: &str, b: &str) -> String {
    let mut pair = [a, b];
    pair.sort_unstable();
    format!("{}_{}", pair[0], pair[1])
}

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

// Milliseconds, strictly monotonic per process: two appends that land within
// the same millisecond still get distinct stamps, so sorting by created_at
// always reproduces append order within a conversation.
fn now_millis() -> u64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;

    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => last = observed,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[inline]
pub fn is_allowed_attachment_type(content_type: &str) -> bool {
    matches!(
        content_type,
        "image/jpeg"
            | "image/jpg"
            | "image/png"
            | "image/gif"
            | "image/webp"
            | "video/mp4"
            | "video/quicktime"
            | "video/x-msvideo"
            | "text/plain"
            | "application/pdf"
            | "application/octet-stream"
    )
}

/// Compose precondition: a message needs text or an attachment. Returns the
/// trimmed text, so a whitespace-only body with an attachment becomes a pure
/// attachment message.
pub fn validate_compose(
    text: Option<&str>,
    has_attachment: bool,
) -> Result<Option<String>, ChatError> {
    let trimmed = text.map(str::trim).filter(|t| !t.is_empty());

    if trimmed.is_none() && !has_attachment {
        return Err(ChatError::Validation(
            "Message must contain text or an attachment".to_string(),
        ));
    }

    if let Some(t) = trimmed {
        if t.len() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::Validation(format!(
                "Message cannot exceed {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }
    }

    Ok(trimmed.map(str::to_string))
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= MAX_PREVIEW_LENGTH {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_PREVIEW_LENGTH).collect();
    format!("{}…", truncated)
}

/// Ledger preview line for a message: its text, or a kind label for pure
/// attachments, or the unsent placeholder.
pub fn message_preview(
    text: Option<&str>,
    attachment: Option<&Attachment>,
    is_unsent: bool,
) -> String {
    if is_unsent {
        return "Message unsent".to_string();
    }
    if let Some(text) = text {
        return truncate_preview(text);
    }
    attachment
        .map(|a| a.kind.preview_label().to_string())
        .unwrap_or_default()
}

/// The single ledger write for a delivered message: refresh the preview and
/// the sender's denormalized display data, bump only the recipient's counter.
pub fn ledger_update_doc(sender: &Account, recipient_id: &str, preview: &str, now: u64) -> Document {
    let mut set = doc! {
        "last_message": preview,
        "last_timestamp": now as i64,
    };
    set.insert(format!("names.{}", sender.uid), &sender.display_name);
    if let Some(url) = &sender.avatar_url {
        set.insert(format!("profile_pics.{}", sender.uid), url);
    }

    let mut inc = Document::new();
    inc.insert(format!("unread.{}", recipient_id), 1i32);

    doc! { "$set": set, "$inc": inc }
}

/// Zeroing an already-zero counter is a no-op, so repeated opens are safe.
pub fn clear_unread_doc(user_id: &str) -> Document {
    let mut set = Document::new();
    set.insert(format!("unread.{}", user_id), 0i32);
    doc! { "$set": set }
}

static SENDS_IN_FLIGHT: LazyLock<Mutex<HashSet<(String, String)>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// At-most-one-outstanding-send per (sender, conversation). Released on drop
/// so every failure path in the pipeline frees the slot.
pub struct SendGuard {
    key: (String, String),
}

impl SendGuard {
    pub fn acquire(user_id: &str, conversation_id: &str) -> Result<Self, ChatError> {
        let key = (user_id.to_string(), conversation_id.to_string());
        let mut held = SENDS_IN_FLIGHT.lock().unwrap();
        if !held.insert(key.clone()) {
            return Err(ChatError::InFlight);
        }
        Ok(Self { key })
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = SENDS_IN_FLIGHT.lock() {
            held.remove(&self.key);
        }
    }
}

#[derive(serde::Deserialize)]
struct FilebaseUploadResponse {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Name")]
    _name: String,
    #[serde(rename = "Size")]
    _size: String,
}

pub async fn upload_attachment(
    file_name: &str,
    file_data: Bytes,
    content_type: &str,
) -> Result<String, ChatError> {
    let ipfs_endpoint =
        var("FILEBASE_IPFS_ENDPOINT").unwrap_or_else(|_| "https://api.filebase.io".to_string());
    let access_key = var("FILEBASE_ACCESS_KEY")
        .map_err(|_| ChatError::Upload("Missing blob storage configuration".to_string()))?;

    let file_part = Part::bytes(file_data.to_vec())
        .file_name(file_name.to_string())
        .mime_str(content_type)
        .map_err(|_| ChatError::Upload("Invalid attachment content type".to_string()))?;

    let form = Form::new().part("file", file_part);

    let response = reqwest::Client::new()
        .post(format!("{}/api/v0/add?pin=true", ipfs_endpoint))
        .header("Authorization", format!("Bearer {}", access_key))
        .multipart(form)
        .send()
        .await
        .map_err(|_| ChatError::Upload("Failed to upload attachment".to_string()))?;

    if !response.status().is_success() {
        return Err(ChatError::Upload(format!(
            "Attachment upload failed: {}",
            response.status()
        )));
    }

    let upload_result: FilebaseUploadResponse = response
        .json()
        .await
        .map_err(|_| ChatError::Upload("Failed to parse upload response".to_string()))?;

    Ok(format!(
        "https://ipfs.filebase.io/ipfs/{}",
        upload_result.hash
    ))
}

pub async fn get_or_create_conversation(
    user: &Account,
    other_user_id: &str,
) -> Result<Conversation, ChatError> {
    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let conversations: Collection<Conversation> = database.collection(COLLECTION_CONVERSATIONS);
    let conversation_id = conversation_id_for(&user.uid, other_user_id);

    if let Ok(Some(conversation)) = conversations
        .find_one(doc! { "conversation_id": &conversation_id })
        .await
    {
        return Ok(conversation);
    }

    let now = now_millis();
    let mut participant_ids = vec![user.uid.clone(), other_user_id.to_string()];
    participant_ids.sort_unstable();

    let mut names = HashMap::new();
    names.insert(user.uid.clone(), user.display_name.clone());
    let mut profile_pics = HashMap::new();
    if let Some(url) = &user.avatar_url {
        profile_pics.insert(user.uid.clone(), url.clone());
    }
    let mut unread = HashMap::new();
    for id in &participant_ids {
        unread.insert(id.clone(), 0u32);
    }

    let conversation = Conversation {
        conversation_id: conversation_id.clone(),
        participant_ids,
        names,
        profile_pics,
        last_message: String::new(),
        last_timestamp: now,
        unread,
        created_at: now,
    };

    match conversations.insert_one(&conversation).await {
        Ok(_) => Ok(conversation),
        // Lost a first-message race; the other participant created it.
        Err(_) => conversations
            .find_one(doc! { "conversation_id": &conversation_id })
            .await
            .ok()
            .flatten()
            .ok_or_else(|| ChatError::Write("Failed to create conversation".to_string())),
    }
}

pub async fn verify_conversation_access(
    conversation_id: &str,
    user_id: &str,
) -> Result<Conversation, ChatError> {
    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let conversations: Collection<Conversation> = database.collection(COLLECTION_CONVERSATIONS);

    match conversations
        .find_one(doc! {
            "conversation_id": conversation_id,
            "participant_ids": user_id
        })
        .await
    {
        Ok(Some(conversation)) => Ok(conversation),
        Ok(None) => Err(ChatError::Forbidden(
            "Access denied to this conversation".to_string(),
        )),
        Err(_) => Err(ChatError::Write("Database error".to_string())),
    }
}

// Quoted-sender display name resolved from live accounts, not the ledger,
// so a quote can be built before the conversation record exists.
fn reply_sender_name(sender_id: &str, user: &Account, sender_account: Option<&Account>) -> String {
    if sender_id == user.uid {
        return user.display_name.clone();
    }
    sender_account
        .map(|account| account.display_name.clone())
        .unwrap_or_else(|| sender_id.to_string())
}

async fn reply_snapshot(
    user: &Account,
    conversation_id: &str,
    message_id: &str,
) -> Result<ReplySnapshot, ChatError> {
    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let messages: Collection<Message> = database.collection(COLLECTION_MESSAGES);

    let original = messages
        .find_one(doc! {
            "message_id": message_id,
            "conversation_id": conversation_id
        })
        .await
        .map_err(|_| ChatError::Write("Database error".to_string()))?
        .ok_or_else(|| ChatError::NotFound("Quoted message not found".to_string()))?;

    let quoted_account = if original.sender_id == user.uid {
        None
    } else {
        let users: Collection<Account> = database.collection(COLLECTION_USERS);
        users
            .find_one(doc! { "uid": &original.sender_id })
            .await
            .ok()
            .flatten()
    };

    Ok(ReplySnapshot {
        preview: message_preview(
            original.text.as_deref(),
            original.attachment.as_ref(),
            original.is_unsent,
        ),
        sender_name: reply_sender_name(&original.sender_id, user, quoted_account.as_ref()),
        message_id: original.message_id,
    })
}

/// Composition pipeline: validate, upload, append, then update the ledger.
/// A failure before the append leaves no trace; a failure after a successful
/// upload may orphan the blob (accepted, logged).
pub async fn send_message(
    user: &Account,
    other_user_id: &str,
    text: Option<String>,
    attachment_upload: Option<AttachmentUpload>,
    reply_to: Option<String>,
) -> Result<Message, ChatError> {
    if other_user_id == user.uid {
        return Err(ChatError::Validation(
            "Cannot start a conversation with yourself".to_string(),
        ));
    }

    let text = validate_compose(text.as_deref(), attachment_upload.is_some())?;

    if let Some(upload) = &attachment_upload {
        if !is_allowed_attachment_type(&upload.content_type) {
            return Err(ChatError::Validation("File type not allowed".to_string()));
        }
        if upload.data.len() > MAX_ATTACHMENT_SIZE {
            return Err(ChatError::Validation(format!(
                "Attachment cannot exceed {} bytes",
                MAX_ATTACHMENT_SIZE
            )));
        }
    }

    let conversation_id = conversation_id_for(&user.uid, other_user_id);
    let _guard = SendGuard::acquire(&user.uid, &conversation_id)?;

    // Blob upload comes first so a failed upload mutates nothing.
    let attachment = match attachment_upload {
        Some(upload) => {
            let url =
                upload_attachment(&upload.file_name, upload.data.clone(), &upload.content_type)
                    .await?;
            Some(Attachment {
                url,
                kind: AttachmentKind::from_content_type(&upload.content_type),
                name: upload.file_name,
            })
        }
        None => None,
    };

    let reply_to = match reply_to {
        Some(message_id) => Some(reply_snapshot(user, &conversation_id, &message_id).await?),
        None => None,
    };

    let message = Message {
        message_id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.clone(),
        sender_id: user.uid.clone(),
        receiver_id: other_user_id.to_string(),
        text,
        attachment,
        reply_to,
        created_at: now_millis(),
        is_pinned: false,
        is_unsent: false,
    };

    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let messages: Collection<Message> = database.collection(COLLECTION_MESSAGES);
    let conversations: Collection<Conversation> = database.collection(COLLECTION_CONVERSATIONS);

    if messages.insert_one(&message).await.is_err() {
        if let Some(att) = &message.attachment {
            warn!(url = %att.url, "attachment orphaned by failed message append");
        }
        return Err(ChatError::Write("Failed to send message".to_string()));
    }

    // Ledger record is created or refreshed only after the append succeeds;
    // a failed send leaves no empty conversation behind.
    get_or_create_conversation(user, other_user_id).await?;

    let preview = message_preview(message.text.as_deref(), message.attachment.as_ref(), false);
    conversations
        .update_one(
            doc! { "conversation_id": &conversation_id },
            ledger_update_doc(user, other_user_id, &preview, message.created_at),
        )
        .await
        .map_err(|_| ChatError::Write("Failed to update conversation".to_string()))?;

    broadcast_message(&message).await;
    notify_recipient(user, other_user_id).await;

    Ok(message)
}

async fn broadcast_message(message: &Message) {
    let response = MessageResponse::from(message.clone());
    let payload = json!({
        "type": "message",
        "conversation_id": &message.conversation_id,
        "message": response,
    });
    LIVE.publish_conversation(&message.conversation_id, &payload.to_string())
        .await;

    let Some(database) = DB.get() else {
        return;
    };
    let conversations: Collection<Conversation> = database.collection(COLLECTION_CONVERSATIONS);
    let Ok(Some(updated)) = conversations
        .find_one(doc! { "conversation_id": &message.conversation_id })
        .await
    else {
        return;
    };

    for participant_id in &updated.participant_ids {
        let payload = json!({
            "type": "conversation_updated",
            "conversation_id": &updated.conversation_id,
            "last_message": &updated.last_message,
            "last_timestamp": updated.last_timestamp,
            "unread_count": updated.unread_for(participant_id),
        });
        LIVE.publish_user(participant_id, &payload.to_string()).await;
    }
}

pub async fn mark_conversation_read(user_id: &str, conversation_id: &str) -> Result<(), ChatError> {
    let conversation = verify_conversation_access(conversation_id, user_id).await?;

    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let conversations: Collection<Conversation> = database.collection(COLLECTION_CONVERSATIONS);

    conversations
        .update_one(
            doc! { "conversation_id": conversation_id },
            clear_unread_doc(user_id),
        )
        .await
        .map_err(|_| ChatError::Write("Failed to clear unread counter".to_string()))?;

    let payload = json!({
        "type": "conversation_updated",
        "conversation_id": conversation_id,
        "last_message": &conversation.last_message,
        "last_timestamp": conversation.last_timestamp,
        "unread_count": 0u32,
    });
    LIVE.publish_user(user_id, &payload.to_string()).await;

    Ok(())
}

pub async fn set_pinned(
    user: &Account,
    message_id: &str,
    pinned: bool,
) -> Result<(), ChatError> {
    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let messages: Collection<Message> = database.collection(COLLECTION_MESSAGES);

    let message = messages
        .find_one(doc! { "message_id": message_id })
        .await
        .map_err(|_| ChatError::Write("Database error".to_string()))?
        .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))?;

    verify_conversation_access(&message.conversation_id, &user.uid).await?;

    messages
        .update_one(
            doc! { "message_id": message_id },
            doc! { "$set": { "is_pinned": pinned } },
        )
        .await
        .map_err(|_| ChatError::Write("Failed to update message".to_string()))?;

    Ok(())
}

/// Soft delete: the record keeps its slot and timestamp; content is hidden
/// at the response layer.
pub async fn unsend_message(user: &Account, message_id: &str) -> Result<(), ChatError> {
    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let messages: Collection<Message> = database.collection(COLLECTION_MESSAGES);

    let message = messages
        .find_one(doc! { "message_id": message_id })
        .await
        .map_err(|_| ChatError::Write("Database error".to_string()))?
        .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))?;

    if message.sender_id != user.uid {
        return Err(ChatError::Forbidden(
            "Only the sender can unsend a message".to_string(),
        ));
    }

    messages
        .update_one(
            doc! { "message_id": message_id },
            doc! { "$set": { "is_unsent": true } },
        )
        .await
        .map_err(|_| ChatError::Write("Failed to unsend message".to_string()))?;

    Ok(())
}

pub async fn get_messages(
    user: &Account,
    conversation_id: &str,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageResponse>, ChatError> {
    verify_conversation_access(conversation_id, &user.uid).await?;

    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let messages: Collection<Message> = database.collection(COLLECTION_MESSAGES);

    let mut filter = doc! { "conversation_id": conversation_id };

    if let Some(before_id) = before {
        if let Ok(Some(before_message)) = messages.find_one(doc! { "message_id": before_id }).await
        {
            filter.insert(
                "created_at",
                doc! { "$lt": before_message.created_at as i64 },
            );
        }
    }

    let find_options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .limit(limit as i64)
        .build();

    let cursor = messages
        .find(filter)
        .with_options(find_options)
        .await
        .map_err(|_| ChatError::Write("Failed to retrieve messages".to_string()))?;

    let page: Vec<Message> = cursor
        .try_collect()
        .await
        .map_err(|_| ChatError::Write("Failed to collect messages".to_string()))?;

    // Stored newest-first for the page; returned oldest-first.
    Ok(page.into_iter().rev().map(MessageResponse::from).collect())
}

pub async fn get_user_conversations(
    user: &Account,
) -> Result<Vec<ConversationSummary>, ChatError> {
    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let conversations: Collection<Conversation> = database.collection(COLLECTION_CONVERSATIONS);
    let users: Collection<Account> = database.collection(COLLECTION_USERS);

    let cursor = conversations
        .find(doc! { "participant_ids": &user.uid })
        .await
        .map_err(|_| ChatError::Write("Failed to retrieve conversations".to_string()))?;

    let records: Vec<Conversation> = cursor
        .try_collect()
        .await
        .map_err(|_| ChatError::Write("Failed to collect conversations".to_string()))?;

    let now = now_secs();
    let mut summaries = Vec::with_capacity(records.len());

    for conversation in records {
        let other_id = conversation.other_participant(&user.uid).to_string();
        // Live profile lookup; the denormalized ledger copy is only a
        // fallback for deleted accounts.
        let other_account = users.find_one(doc! { "uid": &other_id }).await.ok().flatten();
        let last_active = other_account.as_ref().map(|account| account.last_active_at);

        summaries.push(ConversationSummary {
            other_name: other_account
                .as_ref()
                .map(|account| account.display_name.clone())
                .or_else(|| conversation.names.get(&other_id).cloned())
                .unwrap_or_else(|| other_id.clone()),
            other_profile_pic: other_account
                .as_ref()
                .and_then(|account| account.avatar_url.clone())
                .or_else(|| conversation.profile_pics.get(&other_id).cloned()),
            last_message: conversation.last_message.clone(),
            last_timestamp: conversation.last_timestamp,
            unread_count: conversation.unread_for(&user.uid),
            presence: super::presence::estimate(last_active, now),
            conversation_id: conversation.conversation_id,
            other_participant_id: other_id,
        });
    }

    summaries.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
    Ok(summaries)
}

pub async fn presence_for_user(user_id: &str) -> Result<super::presence::Presence, ChatError> {
    let Some(database) = DB.get() else {
        return Err(ChatError::Unavailable);
    };
    let users: Collection<Account> = database.collection(COLLECTION_USERS);

    let account = users
        .find_one(doc! { "uid": user_id })
        .await
        .map_err(|_| ChatError::Write("Database error".to_string()))?
        .ok_or_else(|| ChatError::NotFound("User not found".to_string()))?;

    Ok(super::presence::estimate(
        Some(account.last_active_at),
        now_secs(),
    ))
}

async fn notify_recipient(sender: &Account, recipient_user_id: &str) {
    let Some(database) = DB.get() else {
        return;
    };
    let users: Collection<Account> = database.collection(COLLECTION_USERS);
    let Ok(Some(recipient)) = users.find_one(doc! { "uid": recipient_user_id }).await else {
        return;
    };

    let body = format!(
        "{} sent you a message - Check your messages: https://worklink.app/chat",
        sender.display_name
    );

    if crate::notifications::delegates::send_email_internal(
        &recipient.email,
        Some(&recipient.display_name),
        "New Message - Worklink",
        &body,
    )
    .await
    .is_err()
    {
        warn!(recipient = recipient_user_id, "message notification email failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(uid: &str, name: &str) -> Account {
        Account {
            uid: uid.to_string(),
            username: name.to_lowercase(),
            email: format!("{}@example.com", name.to_lowercase()),
            display_name: name.to_string(),
            avatar_url: Some(format!("https://cdn.example/{}.png", uid)),
            password: String::new(),
            salt: String::new(),
            auth: crate::auth::schemas::AuthObject {
                cookie: String::new(),
                cookie_expire: "0".to_string(),
            },
            last_active_at: 0,
            enabled: true,
        }
    }

    #[test]
    fn sequential_timestamps_never_tie() {
        let mut previous = now_millis();
        for _ in 0..1000 {
            let next = now_millis();
            assert!(next > previous, "expected {} > {}", next, previous);
            previous = next;
        }
    }

    #[test]
    fn conversation_identity_is_symmetric() {
        assert_eq!(conversation_id_for("alice", "bob"), "alice_bob");
        assert_eq!(
            conversation_id_for("alice", "bob"),
            conversation_id_for("bob", "alice")
        );
        assert_ne!(
            conversation_id_for("alice", "bob"),
            conversation_id_for("alice", "carol")
        );
    }

    #[test]
    fn empty_compose_is_rejected_before_any_store_access() {
        assert!(matches!(
            validate_compose(None, false),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            validate_compose(Some("   \t\n"), false),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn attachment_only_compose_is_accepted() {
        assert_eq!(validate_compose(None, true).unwrap(), None);
        assert_eq!(validate_compose(Some("  "), true).unwrap(), None);
    }

    #[test]
    fn compose_trims_and_bounds_text() {
        assert_eq!(
            validate_compose(Some("  hello  "), false).unwrap().as_deref(),
            Some("hello")
        );
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            validate_compose(Some(&long), false),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn preview_prefers_text_over_attachment() {
        let attachment = Attachment {
            url: "u".to_string(),
            kind: AttachmentKind::Image,
            name: "pic.png".to_string(),
        };
        assert_eq!(
            message_preview(Some("hello"), Some(&attachment), false),
            "hello"
        );
        assert_eq!(message_preview(None, Some(&attachment), false), "[image]");
        assert_eq!(
            message_preview(Some("hello"), Some(&attachment), true),
            "Message unsent"
        );
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let long = "é".repeat(MAX_PREVIEW_LENGTH + 10);
        let preview = message_preview(Some(&long), None, false);
        assert_eq!(preview.chars().count(), MAX_PREVIEW_LENGTH + 1);
        assert!(preview.ends_with('…'));

        let short = "é".repeat(MAX_PREVIEW_LENGTH);
        assert_eq!(message_preview(Some(&short), None, false), short);
    }

    #[test]
    fn quoted_sender_name_resolves_without_a_ledger_record() {
        let me = account("alice", "Alice");
        let other = account("bob", "Bob");
        assert_eq!(reply_sender_name("alice", &me, None), "Alice");
        assert_eq!(reply_sender_name("bob", &me, Some(&other)), "Bob");
        // Deleted quoted sender: fall back to the raw id.
        assert_eq!(reply_sender_name("bob", &me, None), "bob");
    }

    #[test]
    fn ledger_update_bumps_only_the_recipient() {
        let sender = account("alice", "Alice");
        let update = ledger_update_doc(&sender, "bob", "hello", 1000);

        let inc = update.get_document("$inc").unwrap();
        assert_eq!(inc.get_i32("unread.bob").unwrap(), 1);
        assert!(inc.get("unread.alice").is_none());

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("last_message").unwrap(), "hello");
        assert_eq!(set.get_i64("last_timestamp").unwrap(), 1000);
        assert_eq!(set.get_str("names.alice").unwrap(), "Alice");
        assert_eq!(
            set.get_str("profile_pics.alice").unwrap(),
            "https://cdn.example/alice.png"
        );
    }

    #[test]
    fn clear_unread_writes_a_plain_zero() {
        let update = clear_unread_doc("bob");
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_i32("unread.bob").unwrap(), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn send_guard_blocks_concurrent_sends_for_one_conversation() {
        let guard = SendGuard::acquire("guard-user", "guard-conv").unwrap();
        assert!(matches!(
            SendGuard::acquire("guard-user", "guard-conv"),
            Err(ChatError::InFlight)
        ));
        // A different conversation for the same user is unaffected.
        let other = SendGuard::acquire("guard-user", "guard-conv-2").unwrap();
        drop(other);

        drop(guard);
        assert!(SendGuard::acquire("guard-user", "guard-conv").is_ok());
    }
}
