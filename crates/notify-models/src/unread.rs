//! Derived unread counts.

use serde::{Deserialize, Serialize};

/// Unread counts for one subscriber at poll time.
///
/// `total` is always `channels + im + groups`. `mentions` is informational
/// (already included in the buckets) and `ignored` counts unread items in
/// records whose type code is not recognised; neither contributes to
/// `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadSnapshot {
    pub total: u64,
    pub channels: u64,
    pub im: u64,
    pub groups: u64,
    #[serde(default)]
    pub mentions: u64,
    #[serde(default)]
    pub ignored: u64,
}

impl UnreadSnapshot {
    /// Builds a snapshot from bucket values, computing the total.
    pub fn from_buckets(channels: u64, im: u64, groups: u64) -> Self {
        Self {
            total: channels + im + groups,
            channels,
            im,
            groups,
            mentions: 0,
            ignored: 0,
        }
    }

    /// Whether there is nothing unread.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_buckets_totals() {
        let snapshot = UnreadSnapshot::from_buckets(1, 2, 3);
        assert_eq!(snapshot.total, 6);
        assert!(!snapshot.is_empty());
        assert!(UnreadSnapshot::default().is_empty());
    }
}
