use std::collections::HashMap;
use std::sync::LazyLock;
use tokio::sync::{
    RwLock,
    mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::debug;
use uuid::Uuid;

/// Process-wide fan-out registry. Two channel spaces: per-conversation
/// (message tails) and per-user (ledger/summary updates).
pub static LIVE: LazyLock<LiveRouter> = LazyLock::new(LiveRouter::default);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
pub struct LiveRouter {
    conversations: RwLock<HashMap<String, Vec<Subscriber>>>,
    users: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl LiveRouter {
    pub async fn subscribe_conversation(
        &self,
        conversation_id: &str,
    ) -> (SubscriberId, UnboundedReceiver<String>) {
        Self::subscribe(&self.conversations, conversation_id).await
    }

    pub async fn unsubscribe_conversation(&self, conversation_id: &str, id: SubscriberId) {
        Self::unsubscribe(&self.conversations, conversation_id, id).await;
    }

    /// Delivery is FIFO per subscriber; dead senders are pruned on publish.
    pub async fn publish_conversation(&self, conversation_id: &str, payload: &str) {
        Self::publish(&self.conversations, conversation_id, payload).await;
    }

    pub async fn subscribe_user(&self, user_id: &str) -> (SubscriberId, UnboundedReceiver<String>) {
        Self::subscribe(&self.users, user_id).await
    }

    pub async fn unsubscribe_user(&self, user_id: &str, id: SubscriberId) {
        Self::unsubscribe(&self.users, user_id, id).await;
    }

    pub async fn publish_user(&self, user_id: &str, payload: &str) {
        Self::publish(&self.users, user_id, payload).await;
    }

    async fn subscribe(
        space: &RwLock<HashMap<String, Vec<Subscriber>>>,
        key: &str,
    ) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = SubscriberId::new();

        let mut guard = space.write().await;
        let entry = guard.entry(key.to_string()).or_default();
        entry.push(Subscriber { id, sender: tx });
        debug!(key, subscribers = entry.len(), "live subscriber added");

        (id, rx)
    }

    async fn unsubscribe(
        space: &RwLock<HashMap<String, Vec<Subscriber>>>,
        key: &str,
        id: SubscriberId,
    ) {
        let mut guard = space.write().await;
        if let Some(subscribers) = guard.get_mut(key) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                guard.remove(key);
                debug!(key, "last live subscriber removed");
            }
        }
    }

    async fn publish(space: &RwLock<HashMap<String, Vec<Subscriber>>>, key: &str, payload: &str) {
        let mut guard = space.write().await;
        if let Some(subscribers) = guard.get_mut(key) {
            subscribers.retain(|s| s.sender.send(payload.to_string()).is_ok());
            if subscribers.is_empty() {
                guard.remove(key);
            }
        }
    }

    #[cfg(test)]
    async fn conversation_subscriber_count(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_payloads_arrive_in_order() {
        let router = LiveRouter::default();
        let (_id, mut rx) = router.subscribe_conversation("a_b").await;

        router.publish_conversation("a_b", "first").await;
        router.publish_conversation("a_b", "second").await;

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_of_the_same_conversation() {
        let router = LiveRouter::default();
        let (_a, mut rx_a) = router.subscribe_conversation("a_b").await;
        let (_b, mut rx_b) = router.subscribe_conversation("a_b").await;
        let (_c, mut rx_other) = router.subscribe_conversation("a_c").await;

        router.publish_conversation("a_b", "hello").await;

        assert_eq!(rx_a.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx_b.recv().await.as_deref(), Some("hello"));
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_empty_entries() {
        let router = LiveRouter::default();
        let (id, _rx) = router.subscribe_conversation("a_b").await;
        assert_eq!(router.conversation_subscriber_count("a_b").await, 1);

        router.unsubscribe_conversation("a_b", id).await;
        assert_eq!(router.conversation_subscriber_count("a_b").await, 0);
    }

    #[tokio::test]
    async fn dead_receivers_are_pruned_on_publish() {
        let router = LiveRouter::default();
        let (_id, rx) = router.subscribe_conversation("a_b").await;
        drop(rx);

        router.publish_conversation("a_b", "into the void").await;
        assert_eq!(router.conversation_subscriber_count("a_b").await, 0);
    }

    #[tokio::test]
    async fn user_channels_are_independent_from_conversation_channels() {
        let router = LiveRouter::default();
        let (_id, mut rx) = router.subscribe_user("user-1").await;

        router.publish_conversation("user-1", "wrong space").await;
        router.publish_user("user-1", "summary").await;

        assert_eq!(rx.recv().await.as_deref(), Some("summary"));
        assert!(rx.try_recv().is_err());
    }
}
