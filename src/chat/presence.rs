use serde::{Deserialize, Serialize};

const ACTIVE_WINDOW_SECS: u64 = 3 * 60;
const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Presence {
    pub label: String,
    pub is_online: bool,
}

impl Presence {
    fn offline() -> Self {
        Self {
            label: "Offline".to_string(),
            is_online: false,
        }
    }
}

/// Maps an account's last-activity timestamp to a display tier. Stateless;
/// callers re-evaluate on their own polling cadence.
pub fn estimate(last_active_at: Option<u64>, now: u64) -> Presence {
    let Some(last_active_at) = last_active_at else {
        return Presence::offline();
    };

    let age = now.saturating_sub(last_active_at);

    if age < ACTIVE_WINDOW_SECS {
        Presence {
            label: "Active Now".to_string(),
            is_online: true,
        }
    } else if age < HOUR_SECS {
        Presence {
            label: format!("Last seen {}m ago", age / 60),
            is_online: false,
        }
    } else if age < DAY_SECS {
        Presence {
            label: format!("Last seen {}h ago", age / HOUR_SECS),
            is_online: false,
        }
    } else {
        Presence::offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn missing_timestamp_is_offline() {
        let presence = estimate(None, NOW);
        assert_eq!(presence.label, "Offline");
        assert!(!presence.is_online);
    }

    #[test]
    fn recent_activity_is_online() {
        let presence = estimate(Some(NOW - 179), NOW);
        assert_eq!(presence.label, "Active Now");
        assert!(presence.is_online);
    }

    #[test]
    fn minute_tier_starts_at_three_minutes() {
        let presence = estimate(Some(NOW - 180), NOW);
        assert_eq!(presence.label, "Last seen 3m ago");
        assert!(!presence.is_online);

        let presence = estimate(Some(NOW - 3599), NOW);
        assert_eq!(presence.label, "Last seen 59m ago");
    }

    #[test]
    fn hour_tier_uses_whole_hours() {
        let presence = estimate(Some(NOW - 3600), NOW);
        assert_eq!(presence.label, "Last seen 1h ago");

        let presence = estimate(Some(NOW - 86_399), NOW);
        assert_eq!(presence.label, "Last seen 23h ago");
    }

    #[test]
    fn older_than_a_day_is_offline() {
        let presence = estimate(Some(NOW - 86_400), NOW);
        assert_eq!(presence.label, "Offline");
        assert!(!presence.is_online);
    }

    #[test]
    fn future_timestamp_counts_as_active() {
        // Clock skew between writer and reader should not panic or go offline.
        let presence = estimate(Some(NOW + 60), NOW);
        assert!(presence.is_online);
    }
}
