use std::mem;

/// Which view is expanded while the chat is in minimized (bubble) mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveBubble {
    /// Aggregate inbox pseudo-state: conversation list, no message tail.
    Inbox,
    Bubble(String),
}

/// Connection-local chat presentation state. Never persisted; one per
/// websocket session. A conversation lives in at most one of the focused
/// slot and the bubble set at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatSession {
    Idle,
    Focused {
        conversation_id: String,
        bubbles: Vec<String>,
    },
    Minimized {
        bubbles: Vec<String>,
        active: ActiveBubble,
    },
}

/// Side effects a transition asks the caller to perform, in order:
/// drop old subscriptions, start the new one, clear the unread counter.
/// The machine itself never touches the ledger or the registry.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Effects {
    pub clear_unread: Option<String>,
    pub subscribe: Option<String>,
    pub unsubscribe: Vec<String>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::Idle
    }

    /// Conversation whose message tail is currently subscribed, if any.
    pub fn subscribed(&self) -> Option<&str> {
        match self {
            Self::Focused {
                conversation_id, ..
            } => Some(conversation_id),
            Self::Minimized {
                active: ActiveBubble::Bubble(conversation_id),
                ..
            } => Some(conversation_id),
            _ => None,
        }
    }

    fn take_bubbles(&mut self) -> Vec<String> {
        match mem::replace(self, Self::Idle) {
            Self::Idle => Vec::new(),
            Self::Focused { bubbles, .. } => bubbles,
            Self::Minimized { bubbles, .. } => bubbles,
        }
    }

    /// Select a conversation for full view. Clears its unread counter every
    /// time; repeated opens are idempotent because the counter is already
    /// zero. If the conversation was a bubble it transfers out of the set.
    pub fn open(&mut self, conversation_id: &str) -> Effects {
        let mut effects = Effects::default();
        let current = self.subscribed().map(str::to_string);

        if current.as_deref() != Some(conversation_id) {
            if let Some(previous) = current {
                effects.unsubscribe.push(previous);
            }
            effects.subscribe = Some(conversation_id.to_string());
        }
        effects.clear_unread = Some(conversation_id.to_string());

        let mut bubbles = self.take_bubbles();
        bubbles.retain(|c| c != conversation_id);
        *self = Self::Focused {
            conversation_id: conversation_id.to_string(),
            bubbles,
        };
        effects
    }

    /// Shrink the focused conversation to a bubble. The message subscription
    /// stays live for the now-active bubble.
    pub fn minimize(&mut self) -> Effects {
        if matches!(self, Self::Focused { .. }) {
            if let Self::Focused {
                conversation_id,
                mut bubbles,
            } = mem::replace(self, Self::Idle)
            {
                bubbles.retain(|c| c != &conversation_id);
                bubbles.push(conversation_id.clone());
                *self = Self::Minimized {
                    bubbles,
                    active: ActiveBubble::Bubble(conversation_id),
                };
            }
        }
        Effects::default()
    }

    /// Expand a bubble while minimized, inserting it into the set first if
    /// the caller picked a conversation that was not a bubble yet.
    pub fn select_bubble(&mut self, conversation_id: &str) -> Effects {
        let Self::Minimized { bubbles, active } = self else {
            return Effects::default();
        };

        let mut effects = Effects::default();
        if !bubbles.iter().any(|c| c == conversation_id) {
            bubbles.push(conversation_id.to_string());
        }

        match active {
            ActiveBubble::Bubble(previous) if previous == conversation_id => {}
            ActiveBubble::Bubble(previous) => {
                effects.unsubscribe.push(previous.clone());
                effects.subscribe = Some(conversation_id.to_string());
            }
            ActiveBubble::Inbox => {
                effects.subscribe = Some(conversation_id.to_string());
            }
        }
        effects.clear_unread = Some(conversation_id.to_string());
        *active = ActiveBubble::Bubble(conversation_id.to_string());
        effects
    }

    /// Dismiss a bubble (explicit close or drag-to-trash). If it was the
    /// active one, another member takes over, or the set going empty drops
    /// the whole session back to idle.
    pub fn close_bubble(&mut self, conversation_id: &str) -> Effects {
        let mut effects = Effects::default();
        match self {
            Self::Minimized { bubbles, active } => {
                bubbles.retain(|c| c != conversation_id);
                let was_active =
                    matches!(active, ActiveBubble::Bubble(c) if c == conversation_id);
                if was_active {
                    effects.unsubscribe.push(conversation_id.to_string());
                    match bubbles.last() {
                        Some(next) => {
                            effects.subscribe = Some(next.clone());
                            *active = ActiveBubble::Bubble(next.clone());
                        }
                        None => *active = ActiveBubble::Inbox,
                    }
                }
                if bubbles.is_empty() && *active == ActiveBubble::Inbox {
                    *self = Self::Idle;
                }
            }
            Self::Focused { bubbles, .. } => {
                bubbles.retain(|c| c != conversation_id);
            }
            Self::Idle => {}
        }
        effects
    }

    /// Close the focused conversation outright, ending its subscription.
    pub fn close(&mut self) -> Effects {
        let mut effects = Effects::default();
        if let Self::Focused { .. } = self {
            match mem::replace(self, Self::Idle) {
                Self::Focused {
                    conversation_id,
                    bubbles,
                } => {
                    effects.unsubscribe.push(conversation_id);
                    if !bubbles.is_empty() {
                        *self = Self::Minimized {
                            bubbles,
                            active: ActiveBubble::Inbox,
                        };
                    }
                }
                other => *self = other,
            }
        }
        effects
    }

    /// Coarse cancellation: the client navigated away from the chat view.
    pub fn reset(&mut self) -> Effects {
        let mut effects = Effects::default();
        if let Some(current) = self.subscribed() {
            effects.unsubscribe.push(current.to_string());
        }
        *self = Self::Idle;
        effects
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_from_idle_subscribes_and_clears() {
        let mut session = ChatSession::new();
        let effects = session.open("a_b");
        assert_eq!(effects.clear_unread.as_deref(), Some("a_b"));
        assert_eq!(effects.subscribe.as_deref(), Some("a_b"));
        assert!(effects.unsubscribe.is_empty());
        assert_eq!(session.subscribed(), Some("a_b"));
    }

    #[test]
    fn reopening_same_conversation_clears_again_without_resubscribing() {
        let mut session = ChatSession::new();
        session.open("a_b");
        let effects = session.open("a_b");
        assert_eq!(effects.clear_unread.as_deref(), Some("a_b"));
        assert!(effects.subscribe.is_none());
        assert!(effects.unsubscribe.is_empty());
    }

    #[test]
    fn opening_another_conversation_swaps_subscriptions() {
        let mut session = ChatSession::new();
        session.open("a_b");
        let effects = session.open("a_c");
        assert_eq!(effects.unsubscribe, vec!["a_b".to_string()]);
        assert_eq!(effects.subscribe.as_deref(), Some("a_c"));
        assert_eq!(session.subscribed(), Some("a_c"));
    }

    #[test]
    fn minimize_keeps_subscription_live() {
        let mut session = ChatSession::new();
        session.open("a_b");
        let effects = session.minimize();
        assert_eq!(effects, Effects::default());
        assert_eq!(session.subscribed(), Some("a_b"));
        assert!(matches!(
            &session,
            ChatSession::Minimized { bubbles, active }
                if bubbles == &vec!["a_b".to_string()]
                    && *active == ActiveBubble::Bubble("a_b".to_string())
        ));
    }

    #[test]
    fn focused_and_bubble_set_are_exclusive() {
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        // Re-focusing a bubble transfers it out of the set.
        session.open("a_b");
        match &session {
            ChatSession::Focused {
                conversation_id,
                bubbles,
            } => {
                assert_eq!(conversation_id, "a_b");
                assert!(!bubbles.contains(&"a_b".to_string()));
            }
            other => panic!("expected focused state, got {:?}", other),
        }
    }

    #[test]
    fn select_bubble_inserts_missing_member() {
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        let effects = session.select_bubble("a_c");
        assert_eq!(effects.unsubscribe, vec!["a_b".to_string()]);
        assert_eq!(effects.subscribe.as_deref(), Some("a_c"));
        assert_eq!(effects.clear_unread.as_deref(), Some("a_c"));
        assert!(matches!(
            &session,
            ChatSession::Minimized { bubbles, .. } if bubbles.len() == 2
        ));
    }

    #[test]
    fn bubble_round_trip_clears_idempotently() {
        // Scenario: minimize chat with B, switch to C, come back to B.
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        session.select_bubble("a_c");
        let effects = session.select_bubble("a_b");
        assert_eq!(effects.clear_unread.as_deref(), Some("a_b"));
        assert_eq!(effects.unsubscribe, vec!["a_c".to_string()]);
        assert_eq!(effects.subscribe.as_deref(), Some("a_b"));

        // Selecting the already-active bubble clears again, no resubscribe.
        let effects = session.select_bubble("a_b");
        assert_eq!(effects.clear_unread.as_deref(), Some("a_b"));
        assert!(effects.subscribe.is_none());
        assert!(effects.unsubscribe.is_empty());
    }

    #[test]
    fn closing_active_bubble_falls_back_to_another_member() {
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        session.select_bubble("a_c");
        let effects = session.close_bubble("a_c");
        assert_eq!(effects.unsubscribe, vec!["a_c".to_string()]);
        assert_eq!(effects.subscribe.as_deref(), Some("a_b"));
        assert_eq!(session.subscribed(), Some("a_b"));
    }

    #[test]
    fn closing_last_bubble_goes_idle() {
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        let effects = session.close_bubble("a_b");
        assert_eq!(effects.unsubscribe, vec!["a_b".to_string()]);
        assert!(effects.subscribe.is_none());
        assert_eq!(session, ChatSession::Idle);
    }

    #[test]
    fn closing_inactive_bubble_keeps_active_subscription() {
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        session.select_bubble("a_c");
        let effects = session.close_bubble("a_b");
        assert_eq!(effects, Effects::default());
        assert_eq!(session.subscribed(), Some("a_c"));
    }

    #[test]
    fn close_with_remaining_bubbles_drops_to_inbox() {
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        session.open("a_c");
        let effects = session.close();
        assert_eq!(effects.unsubscribe, vec!["a_c".to_string()]);
        assert!(matches!(
            &session,
            ChatSession::Minimized { active: ActiveBubble::Inbox, bubbles }
                if bubbles == &vec!["a_b".to_string()]
        ));
        assert_eq!(session.subscribed(), None);
    }

    #[test]
    fn close_without_bubbles_goes_idle() {
        let mut session = ChatSession::new();
        session.open("a_b");
        let effects = session.close();
        assert_eq!(effects.unsubscribe, vec!["a_b".to_string()]);
        assert_eq!(session, ChatSession::Idle);
    }

    #[test]
    fn reset_discards_all_session_state() {
        let mut session = ChatSession::new();
        session.open("a_b");
        session.minimize();
        session.select_bubble("a_c");
        let effects = session.reset();
        assert_eq!(effects.unsubscribe, vec!["a_c".to_string()]);
        assert_eq!(session, ChatSession::Idle);

        // Resetting an idle session is harmless.
        assert_eq!(session.reset(), Effects::default());
    }
}
