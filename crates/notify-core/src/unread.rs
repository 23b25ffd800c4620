//! Unread aggregation.
//!
//! Turns raw subscription records into an [`UnreadSnapshot`]. Pure and
//! total: malformed numeric fields count as zero instead of failing.

use serde_json::Value;
use tracing::debug;

use notify_models::{SubscriptionKind, SubscriptionRecord, UnreadSnapshot};

/// Base unread signal, in precedence order. The first field that is
/// present (and not null) wins, even if its value is malformed.
const BASE_UNREAD_FIELDS: &[&str] = &["unread", "unreadCount", "msgs"];

/// Mention counters added on top of the base signal.
const MENTION_FIELDS: &[&str] = &["userMentions", "groupMentions"];

/// Thread unread field. Newer servers send the list of unread thread ids
/// instead of a number.
const THREAD_UNREAD_FIELD: &str = "tunread";

/// Coerces a JSON value into a non-negative count.
///
/// Numbers and numeric strings are truncated towards zero; negative,
/// non-finite and non-numeric values become 0.
pub fn coerce_count(value: &Value) -> u64 {
    let numeric = match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => return v,
            None => n.as_f64(),
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    };

    match numeric {
        Some(v) if v.is_finite() && v > 0.0 => v.trunc() as u64,
        _ => 0,
    }
}

fn field_count(record: &SubscriptionRecord, name: &str) -> u64 {
    record.field(name).map(coerce_count).unwrap_or(0)
}

fn thread_unread(record: &SubscriptionRecord) -> u64 {
    match record.field(THREAD_UNREAD_FIELD) {
        Some(Value::Array(ids)) => ids.len() as u64,
        Some(other) => coerce_count(other),
        None => 0,
    }
}

fn mentions(record: &SubscriptionRecord) -> u64 {
    MENTION_FIELDS
        .iter()
        .fold(0u64, |acc, name| acc.saturating_add(field_count(record, name)))
}

/// Unread total for one record: base signal + mentions + thread unread.
pub fn unread_for_record(record: &SubscriptionRecord) -> u64 {
    let base = BASE_UNREAD_FIELDS
        .iter()
        .find_map(|name| record.field(name))
        .map(coerce_count)
        .unwrap_or(0);

    base.saturating_add(mentions(record))
        .saturating_add(thread_unread(record))
}

/// Aggregates records into per-type buckets.
///
/// Records with an unrecognised type code land in none of the buckets;
/// their unread counts are reported in `ignored` only.
pub fn aggregate(records: &[SubscriptionRecord]) -> UnreadSnapshot {
    let mut snapshot = UnreadSnapshot::default();

    for record in records {
        let unread = unread_for_record(record);
        let bucket = match record.kind() {
            SubscriptionKind::Channel => &mut snapshot.channels,
            SubscriptionKind::Direct => &mut snapshot.im,
            SubscriptionKind::PrivateGroup => &mut snapshot.groups,
            SubscriptionKind::Other => {
                snapshot.ignored = snapshot.ignored.saturating_add(unread);
                continue;
            }
        };
        *bucket = bucket.saturating_add(unread);
        snapshot.mentions = snapshot.mentions.saturating_add(mentions(record));
    }

    snapshot.total = snapshot
        .channels
        .saturating_add(snapshot.im)
        .saturating_add(snapshot.groups);

    if snapshot.ignored > 0 {
        debug!(ignored = snapshot.ignored, "unread in records with unknown type");
    }

    snapshot
}
