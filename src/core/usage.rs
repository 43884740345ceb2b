//! Per-client usage counters for observability.
//!
//! One record per registered client, created on registration and removed
//! with the client. The counter is bumped exactly once per admitted request,
//! before the upstream call is issued, so a request that later fails
//! upstream still counts as used.
use chrono::{DateTime, Utc};
use scc::HashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub request_count: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct UsageTracker {
    records: HashMap<String, UsageRecord>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Create an empty record for a freshly registered client.
    pub async fn create(&self, api_key: &str) {
        let _ = self
            .records
            .insert_async(api_key.to_string(), UsageRecord::default())
            .await;
    }

    /// Count one admitted request at `now`.
    pub async fn record(&self, api_key: &str, now: DateTime<Utc>) {
        let mut entry = self
            .records
            .entry_async(api_key.to_string())
            .await
            .or_insert_with(UsageRecord::default);
        let record = entry.get_mut();
        record.request_count += 1;
        record.last_request_at = Some(now);
    }

    pub async fn snapshot(&self, api_key: &str) -> Option<UsageRecord> {
        self.records
            .read_async(api_key, |_, record| record.clone())
            .await
    }

    /// Drop a client's usage record (client deletion cascade).
    pub async fn remove(&self, api_key: &str) {
        let _ = self.records.remove_async(api_key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_starts_at_zero() {
        let tracker = UsageTracker::new();
        tracker.create("k1").await;

        let record = tracker.snapshot("k1").await.unwrap();
        assert_eq!(record.request_count, 0);
        assert_eq!(record.last_request_at, None);
    }

    #[tokio::test]
    async fn test_record_increments_and_stamps() {
        let tracker = UsageTracker::new();
        tracker.create("k1").await;

        let first = Utc::now();
        tracker.record("k1", first).await;
        let second = Utc::now();
        tracker.record("k1", second).await;

        let record = tracker.snapshot("k1").await.unwrap();
        assert_eq!(record.request_count, 2);
        assert_eq!(record.last_request_at, Some(second));
    }

    #[tokio::test]
    async fn test_remove() {
        let tracker = UsageTracker::new();
        tracker.create("k1").await;
        tracker.remove("k1").await;
        assert!(tracker.snapshot("k1").await.is_none());
    }
}
