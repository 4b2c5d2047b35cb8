use axum::{
    Json,
    extract::{Extension, Multipart, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use super::{
    delegates::{
        get_messages, get_user_conversations, is_allowed_attachment_type, mark_conversation_read,
        presence_for_user, send_message, set_pinned, unsend_message,
    },
    schemas::{
        AttachmentUpload, DEFAULT_MESSAGE_LIMIT, GetMessagesQuery, MAX_ATTACHMENT_SIZE,
        MAX_MESSAGE_LIMIT, MessageResponse, PinMessageRequest,
    },
};
use crate::{apex::utils::VerboseHTTPError, auth::schemas::Account};

pub(crate) async fn send_message_endpoint(
    Extension(user): Extension<Account>,
    Path(other_user_id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut text_content: Option<String> = None;
    let mut attachment_upload: Option<AttachmentUpload> = None;
    let mut reply_to: Option<String> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(field_name) = field.name() else {
            continue;
        };

        match field_name {
            "content" => {
                if let Ok(bytes) = field.bytes().await {
                    text_content = Some(String::from_utf8_lossy(&bytes).to_string());
                }
            }
            "reply_to" => {
                if let Ok(bytes) = field.bytes().await {
                    let value = String::from_utf8_lossy(&bytes).trim().to_string();
                    if !value.is_empty() {
                        reply_to = Some(value);
                    }
                }
            }
            "attachment" => {
                if let Some(file_name) = field.file_name() {
                    let file_name = file_name.to_string();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    if let Ok(bytes) = field.bytes().await {
                        if is_allowed_attachment_type(&content_type)
                            && bytes.len() <= MAX_ATTACHMENT_SIZE
                        {
                            attachment_upload = Some(AttachmentUpload {
                                file_name,
                                data: bytes,
                                content_type,
                            });
                        } else {
                            return VerboseHTTPError::Standard(
                                StatusCode::BAD_REQUEST,
                                "Invalid file type or size".to_string(),
                            )
                            .into_response();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    match send_message(&user, &other_user_id, text_content, attachment_upload, reply_to).await {
        Ok(message) => Json(json!({
            "status": "ok",
            "message": MessageResponse::from(message)
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_messages_endpoint(
    Extension(user): Extension<Account>,
    Path(conversation_id): Path<String>,
    Query(params): Query<GetMessagesQuery>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .min(MAX_MESSAGE_LIMIT);

    match get_messages(&user, &conversation_id, limit, params.before.as_deref()).await {
        Ok(messages) => Json(json!({
            "status": "ok",
            "messages": messages
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_conversations_endpoint(
    Extension(user): Extension<Account>,
) -> impl IntoResponse {
    match get_user_conversations(&user).await {
        Ok(conversations) => Json(json!({
            "status": "ok",
            "conversations": conversations
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn mark_read_endpoint(
    Extension(user): Extension<Account>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    match mark_conversation_read(&user.uid, &conversation_id).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn pin_message_endpoint(
    Extension(user): Extension<Account>,
    Path(message_id): Path<String>,
    body: String,
) -> impl IntoResponse {
    let payload: PinMessageRequest = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => {
            return VerboseHTTPError::Standard(
                StatusCode::BAD_REQUEST,
                format!("Invalid request format: {}", e),
            )
            .into_response();
        }
    };

    match set_pinned(&user, &message_id, payload.pinned).await {
        Ok(()) => Json(json!({
            "status": "ok",
            "message_id": message_id,
            "pinned": payload.pinned
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn unsend_message_endpoint(
    Extension(user): Extension<Account>,
    Path(message_id): Path<String>,
) -> impl IntoResponse {
    match unsend_message(&user, &message_id).await {
        Ok(()) => Json(json!({
            "status": "ok",
            "message_id": message_id
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_presence_endpoint(
    Extension(_user): Extension<Account>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match presence_for_user(&user_id).await {
        Ok(presence) => Json(json!({
            "status": "ok",
            "presence": presence
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}
