//! User-facing synchronization state.

use serde::Serialize;

/// What the application should tell the user about their unsent work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Offline; work is being saved on the device.
    OfflineSavedLocally,
    /// Online with work still queued.
    Synchronizing,
    /// Online and nothing queued.
    FullySynchronized,
}

impl SyncState {
    /// Derive the state from connectivity and the total pending count.
    #[must_use]
    pub const fn derive(online: bool, pending: u64) -> Self {
        match (online, pending) {
            (false, _) => Self::OfflineSavedLocally,
            (true, 0) => Self::FullySynchronized,
            (true, _) => Self::Synchronizing,
        }
    }
}

/// Pending counts per queue plus the derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub pending_mutations: u64,
    pub pending_photos: u64,
    pub state: SyncState,
}

impl SyncStatus {
    /// Build a status from raw counts.
    #[must_use]
    pub const fn new(online: bool, pending_mutations: u64, pending_photos: u64) -> Self {
        Self {
            online,
            pending_mutations,
            pending_photos,
            state: SyncState::derive(online, pending_mutations + pending_photos),
        }
    }

    /// Total entries waiting in both queues.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.pending_mutations + self.pending_photos
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(false, 0, SyncState::OfflineSavedLocally)]
    #[case(false, 4, SyncState::OfflineSavedLocally)]
    #[case(true, 2, SyncState::Synchronizing)]
    #[case(true, 0, SyncState::FullySynchronized)]
    fn derives_state(#[case] online: bool, #[case] pending: u64, #[case] expected: SyncState) {
        assert_eq!(SyncState::derive(online, pending), expected);
    }

    #[test]
    fn status_serializes_with_snake_case_state() {
        insta::assert_json_snapshot!(SyncStatus::new(true, 1, 2), @r#"
        {
          "online": true,
          "pending_mutations": 1,
          "pending_photos": 2,
          "state": "synchronizing"
        }
        "#);
    }
}
