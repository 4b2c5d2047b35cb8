use axum::{
    Extension,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use super::{
    delegates,
    live::{LIVE, SubscriberId},
    schemas::DEFAULT_MESSAGE_LIMIT,
    session::{ChatSession, Effects},
};
use crate::{apex::utils::ChatError, auth::schemas::Account};

/// Client-driven session transitions, one JSON object per frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SessionCommand {
    Open { conversation_id: String },
    Minimize,
    SelectBubble { conversation_id: String },
    CloseBubble { conversation_id: String },
    Close,
}

/// The live tail of the one conversation the session is reading.
struct ConversationTail {
    conversation_id: String,
    subscriber_id: SubscriberId,
    rx: UnboundedReceiver<String>,
    // Message ids already delivered through the history replay; live
    // duplicates are dropped so resubscribing neither repeats nor loses
    // messages.
    replayed: HashSet<String>,
}

pub(crate) async fn chat_socket_endpoint(
    Extension(user): Extension<Account>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(user, socket))
}

async fn handle_socket(user: Account, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    // The summary feed is live for the whole connection, whatever the
    // session state; message tails come and go with the state machine.
    let (user_subscriber, mut user_rx) = LIVE.subscribe_user(&user.uid).await;
    let mut session = ChatSession::new();
    let mut tail: Option<ConversationTail> = None;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<SessionCommand>(&text) {
                            Ok(command) => {
                                let effects = apply_command(&mut session, command);
                                if !run_effects(&user, effects, &mut tail, &mut sender).await {
                                    break;
                                }
                            }
                            Err(_) => {
                                let error = json!({
                                    "type": "error",
                                    "message": "Unrecognized command",
                                });
                                if sender
                                    .send(WsMessage::Text(error.to_string().into()))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            maybe = user_rx.recv() => {
                match maybe {
                    Some(payload) => {
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe = tail_recv(&mut tail), if tail.is_some() => {
                match maybe {
                    Some(payload) => {
                        let forward = match tail.as_mut() {
                            Some(tail) => !is_replay_duplicate(tail, &payload),
                            None => true,
                        };
                        if forward
                            && sender.send(WsMessage::Text(payload.into())).await.is_err()
                        {
                            break;
                        }
                    }
                    None => {
                        // Publisher pruned us (receiver starved); drop the tail.
                        tail = None;
                    }
                }
            }
        }
    }

    debug!(user = %user.uid, "chat socket closed");
    if let Some(tail) = tail.take() {
        LIVE.unsubscribe_conversation(&tail.conversation_id, tail.subscriber_id)
            .await;
    }
    LIVE.unsubscribe_user(&user.uid, user_subscriber).await;
}

async fn tail_recv(tail: &mut Option<ConversationTail>) -> Option<String> {
    match tail {
        Some(tail) => tail.rx.recv().await,
        // Unreachable behind the select! precondition.
        None => None,
    }
}

fn apply_command(session: &mut ChatSession, command: SessionCommand) -> Effects {
    match command {
        SessionCommand::Open { conversation_id } => session.open(&conversation_id),
        SessionCommand::Minimize => session.minimize(),
        SessionCommand::SelectBubble { conversation_id } => {
            session.select_bubble(&conversation_id)
        }
        SessionCommand::CloseBubble { conversation_id } => session.close_bubble(&conversation_id),
        SessionCommand::Close => session.close(),
    }
}

// The deterministic conversation id embeds both participant ids.
fn is_participant(conversation_id: &str, user_id: &str) -> bool {
    conversation_id.split('_').any(|part| part == user_id)
}

fn is_replay_duplicate(tail: &mut ConversationTail, payload: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return false;
    };
    match value
        .get("message")
        .and_then(|m| m.get("message_id"))
        .and_then(|id| id.as_str())
    {
        Some(id) => tail.replayed.remove(id),
        None => false,
    }
}

/// Executes a transition's side effects in order: drop the old tail,
/// register-then-replay the new one, clear the unread counter.
/// Returns false when the client socket is gone.
async fn run_effects(
    user: &Account,
    effects: Effects,
    tail: &mut Option<ConversationTail>,
    sender: &mut SplitSink<WebSocket, WsMessage>,
) -> bool {
    for conversation_id in &effects.unsubscribe {
        let matches_current = tail
            .as_ref()
            .map(|t| &t.conversation_id == conversation_id)
            .unwrap_or(false);
        if matches_current {
            if let Some(old) = tail.take() {
                LIVE.unsubscribe_conversation(&old.conversation_id, old.subscriber_id)
                    .await;
            }
        }
    }

    if let Some(conversation_id) = &effects.subscribe {
        if !is_participant(conversation_id, &user.uid) {
            let error = json!({
                "type": "error",
                "message": "Access denied to this conversation",
            });
            return sender
                .send(WsMessage::Text(error.to_string().into()))
                .await
                .is_ok();
        }

        // Register before fetching so messages appended during the fetch
        // land in the tail instead of a gap.
        let (subscriber_id, rx) = LIVE.subscribe_conversation(conversation_id).await;
        let history =
            match delegates::get_messages(user, conversation_id, DEFAULT_MESSAGE_LIMIT, None).await
            {
                Ok(messages) => messages,
                // No ledger record yet: opening a chat before its first
                // message. An empty backlog is the right answer.
                Err(ChatError::Forbidden(_)) => Vec::new(),
                Err(err) => {
                    LIVE.unsubscribe_conversation(conversation_id, subscriber_id)
                        .await;
                    warn!(?err, conversation_id, "failed to load conversation history");
                    let error = json!({
                        "type": "error",
                        "message": "Failed to open conversation",
                    });
                    return sender
                        .send(WsMessage::Text(error.to_string().into()))
                        .await
                        .is_ok();
                }
            };

        let replayed = history
            .iter()
            .map(|message| message.message_id.clone())
            .collect();
        let payload = json!({
            "type": "history",
            "conversation_id": conversation_id,
            "messages": history,
        });
        if sender
            .send(WsMessage::Text(payload.to_string().into()))
            .await
            .is_err()
        {
            LIVE.unsubscribe_conversation(conversation_id, subscriber_id)
                .await;
            return false;
        }

        *tail = Some(ConversationTail {
            conversation_id: conversation_id.clone(),
            subscriber_id,
            rx,
            replayed,
        });
    }

    if let Some(conversation_id) = &effects.clear_unread {
        // Missing record just means no messages yet; nothing to clear.
        if let Err(err) = delegates::mark_conversation_read(&user.uid, conversation_id).await {
            debug!(?err, conversation_id, "unread clear skipped");
        }
    }

    true
}
