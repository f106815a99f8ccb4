use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every connection
#[derive(Debug, Default)]
pub struct HubStats {
    active_connections: AtomicU64,
    total_connections: AtomicU64,
    shots_ingested: AtomicU64,
    messages_ingested: AtomicU64,
    submissions_rejected: AtomicU64,
}

/// Point-in-time copy of the hub counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HubStatsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub shots_ingested: u64,
    pub messages_ingested: u64,
    pub submissions_rejected: u64,
    pub storage_fallbacks: u64,
}

impl HubStats {
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Never wraps below zero even if close is reported twice
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_shot(&self) {
        self.shots_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, storage_fallbacks: u64) -> HubStatsSnapshot {
        HubStatsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            shots_ingested: self.shots_ingested.load(Ordering::Relaxed),
            messages_ingested: self.messages_ingested.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            storage_fallbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let stats = HubStats::default();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();
        stats.connection_closed();
        stats.connection_closed();

        let snapshot = stats.snapshot(3);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.storage_fallbacks, 3);
    }
}
