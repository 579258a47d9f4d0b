//! Turns a state snapshot into the payload shown by the presence service

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::traits::{PresencePayload, StateSnapshot};

/// Fixed strings and image keys used when formatting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceText {
    pub details: String,
    pub in_menu: String,
    pub in_session: String,
    pub not_logged_in: String,
    pub default_image_key: String,
    /// Small image shown next to a user thumbnail
    pub thumbnail_marker_key: String,
}

impl Default for PresenceText {
    fn default() -> Self {
        Self {
            details: "Playing".to_string(),
            in_menu: "In Menu".to_string(),
            in_session: "In Session".to_string(),
            not_logged_in: "Not logged".to_string(),
            default_image_key: "default".to_string(),
            thumbnail_marker_key: "default".to_string(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Build the payload for `snapshot` at `now` (seconds since the Unix epoch)
pub fn format_presence(snapshot: &StateSnapshot, text: &PresenceText, now: i64) -> PresencePayload {
    let state = match &snapshot.session {
        None => text.in_menu.clone(),
        Some(session) => non_blank(session.title.as_deref())
            .unwrap_or(text.in_session.as_str())
            .to_string(),
    };

    let thumbnail = snapshot.user.as_ref().and_then(|u| u.thumbnail());
    let display = non_blank(snapshot.user.as_ref().map(|u| u.display_name.as_str()));

    let (party_size, party_max, party_id) = match &snapshot.instance {
        Some(instance) => (
            instance.player_count,
            instance.capacity,
            Some(instance.id.to_string()),
        ),
        None => (0, 0, None),
    };

    PresencePayload {
        details: text.details.clone(),
        state,
        large_image_key: thumbnail.unwrap_or(text.default_image_key.as_str()).to_string(),
        large_image_text: display.unwrap_or(text.not_logged_in.as_str()).to_string(),
        small_image_key: if thumbnail.is_some() {
            text.thumbnail_marker_key.clone()
        } else {
            String::new()
        },
        start_timestamp: now,
        party_size,
        party_max,
        party_id,
    }
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{InstanceId, InstanceSnapshot, SessionSnapshot, UserSnapshot};

    const NOW: i64 = 1_700_000_000;

    fn full_snapshot() -> StateSnapshot {
        StateSnapshot {
            user: Some(UserSnapshot::new(
                "Alice#0",
                Some("https://cdn.example/alice.png".to_string()),
            )),
            session: Some(SessionSnapshot {
                title: Some("Arena Match".to_string()),
                instance: Some(InstanceId::new("abc123")),
            }),
            instance: Some(InstanceSnapshot {
                id: InstanceId::new("abc123"),
                capacity: 10,
                player_count: 4,
            }),
        }
    }

    #[test]
    fn full_snapshot_maps_every_field() {
        let payload = format_presence(&full_snapshot(), &PresenceText::default(), NOW);

        assert_eq!(payload.details, "Playing");
        assert_eq!(payload.state, "Arena Match");
        assert_eq!(payload.large_image_key, "https://cdn.example/alice.png");
        assert_eq!(payload.large_image_text, "Alice#0");
        assert_eq!(payload.small_image_key, "default");
        assert_eq!(payload.start_timestamp, NOW);
        assert_eq!(payload.party_size, 4);
        assert_eq!(payload.party_max, 10);
        assert_eq!(payload.party_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_snapshot_uses_defaults() {
        let payload = format_presence(&StateSnapshot::default(), &PresenceText::default(), NOW);

        assert_eq!(payload.state, "In Menu");
        assert_eq!(payload.large_image_key, "default");
        assert_eq!(payload.large_image_text, "Not logged");
        assert_eq!(payload.small_image_key, "");
        assert_eq!(payload.party_size, 0);
        assert_eq!(payload.party_max, 0);
        assert_eq!(payload.party_id, None);
    }

    #[test]
    fn formatting_is_deterministic_for_a_fixed_clock() {
        let text = PresenceText::default();
        let first = format_presence(&full_snapshot(), &text, NOW);
        let second = format_presence(&full_snapshot(), &text, NOW);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );

        let later = format_presence(&full_snapshot(), &text, NOW + 5);
        assert_eq!(later.start_timestamp, NOW + 5);
    }

    #[test]
    fn missing_session_means_in_menu_whatever_else_is_known() {
        let mut snapshot = full_snapshot();
        snapshot.session = None;

        let payload = format_presence(&snapshot, &PresenceText::default(), NOW);
        assert_eq!(payload.state, "In Menu");
        assert_eq!(payload.large_image_text, "Alice#0");
    }

    #[test]
    fn untitled_session_is_in_session() {
        let mut snapshot = full_snapshot();
        snapshot.session = Some(SessionSnapshot {
            title: Some("   ".to_string()),
            instance: None,
        });

        let payload = format_presence(&snapshot, &PresenceText::default(), NOW);
        assert_eq!(payload.state, "In Session");
    }

    #[test]
    fn missing_instance_means_no_party() {
        let mut snapshot = full_snapshot();
        snapshot.instance = None;

        let payload = format_presence(&snapshot, &PresenceText::default(), NOW);
        assert_eq!(payload.state, "Arena Match");
        assert_eq!((payload.party_size, payload.party_max), (0, 0));
        assert_eq!(payload.party_id, None);
    }

    #[test]
    fn missing_user_means_not_logged_and_no_marker() {
        let mut snapshot = full_snapshot();
        snapshot.user = None;

        let payload = format_presence(&snapshot, &PresenceText::default(), NOW);
        assert_eq!(payload.large_image_text, "Not logged");
        assert_eq!(payload.large_image_key, "default");
        assert_eq!(payload.small_image_key, "");
    }

    #[test]
    fn user_without_thumbnail_keeps_display_name() {
        let mut snapshot = full_snapshot();
        snapshot.user = Some(UserSnapshot::new("Bob", Some(String::new())));

        let payload = format_presence(&snapshot, &PresenceText::default(), NOW);
        assert_eq!(payload.large_image_text, "Bob");
        assert_eq!(payload.large_image_key, "default");
        assert_eq!(payload.small_image_key, "");
    }

    #[test]
    fn configured_text_overrides_defaults() {
        let text = PresenceText {
            details: "Exploring worlds".into(),
            in_menu: "Browsing".into(),
            default_image_key: "logo".into(),
            ..PresenceText::default()
        };

        let payload = format_presence(&StateSnapshot::default(), &text, NOW);
        assert_eq!(payload.details, "Exploring worlds");
        assert_eq!(payload.state, "Browsing");
        assert_eq!(payload.large_image_key, "logo");
    }
}
