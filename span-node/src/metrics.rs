use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use span_bridge::engine::BlockReceipt;

/// Node-wide Prometheus metrics.
pub struct NodeMetrics {
    pub bridge_height: Gauge,
    pub current_dynasty: Gauge,
    pub deferred_events: Gauge,
    pub pending_messages: Gauge,
    pub blocks_produced: Counter,
    pub blocks_aborted: Counter,
    pub attestations_accepted: Counter,
    pub attestations_rejected: Counter,
    pub calls_applied: Counter,
    pub events_finalized: Counter,
    pub watcher_messages: Counter,
    pub registry: Registry,
}

impl NodeMetrics {
    /// Create a new metrics registry with all node metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let bridge_height = Gauge::default();
        let current_dynasty = Gauge::default();
        let deferred_events = Gauge::default();
        let pending_messages = Gauge::default();
        let blocks_produced = Counter::default();
        let blocks_aborted = Counter::default();
        let attestations_accepted = Counter::default();
        let attestations_rejected = Counter::default();
        let calls_applied = Counter::default();
        let events_finalized = Counter::default();
        let watcher_messages = Counter::default();

        registry.register(
            "span_bridge_height",
            "Height of the last executed bridge block",
            bridge_height.clone(),
        );
        registry.register(
            "span_current_dynasty",
            "Identifier of the active validator dynasty",
            current_dynasty.clone(),
        );
        registry.register(
            "span_deferred_events",
            "Finalized events waiting for an earlier nonce",
            deferred_events.clone(),
        );
        registry.register(
            "span_pending_messages",
            "Foreign messages queued for the next block",
            pending_messages.clone(),
        );
        registry.register(
            "span_blocks_produced",
            "Total bridge blocks produced",
            blocks_produced.clone(),
        );
        registry.register(
            "span_blocks_aborted",
            "Total block candidates aborted by an invariant violation",
            blocks_aborted.clone(),
        );
        registry.register(
            "span_attestations_accepted",
            "Total attestations counted toward quorum",
            attestations_accepted.clone(),
        );
        registry.register(
            "span_attestations_rejected",
            "Total attestations and calls rejected",
            attestations_rejected.clone(),
        );
        registry.register(
            "span_calls_applied",
            "Total user lock and burn calls applied",
            calls_applied.clone(),
        );
        registry.register(
            "span_events_finalized",
            "Total cross-chain events that reached quorum",
            events_finalized.clone(),
        );
        registry.register(
            "span_watcher_messages",
            "Total foreign messages delivered by chain watchers",
            watcher_messages.clone(),
        );

        Self {
            bridge_height,
            current_dynasty,
            deferred_events,
            pending_messages,
            blocks_produced,
            blocks_aborted,
            attestations_accepted,
            attestations_rejected,
            calls_applied,
            events_finalized,
            watcher_messages,
            registry,
        }
    }

    /// Fold the outcome of an executed block into the counters.
    pub fn record_block(&self, receipt: &BlockReceipt, deferred_now: usize) {
        self.blocks_produced.inc();
        self.bridge_height.set(receipt.height as i64);
        self.current_dynasty.set(receipt.dynasty as i64);
        self.deferred_events.set(deferred_now as i64);
        self.calls_applied.inc_by(receipt.applied_calls as u64);
        self.attestations_accepted
            .inc_by(receipt.accepted_attestations as u64);
        self.attestations_rejected
            .inc_by(receipt.rejections.len() as u64);
        self.events_finalized.inc_by(receipt.finalized as u64);
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = NodeMetrics::new();
        metrics.bridge_height.set(42);
        metrics.current_dynasty.set(2);
        metrics.blocks_produced.inc();
        metrics.blocks_produced.inc();

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("span_bridge_height"));
        assert!(encoded.contains("span_current_dynasty"));
        assert!(encoded.contains("span_blocks_produced"));
        assert!(encoded.contains("span_watcher_messages"));
    }

    #[test]
    fn test_record_block() {
        let metrics = NodeMetrics::new();
        let receipt = BlockReceipt {
            height: 7,
            dynasty: 1,
            rotated: None,
            applied_calls: 2,
            accepted_attestations: 3,
            finalized: 1,
            executed: 1,
            deferred: 0,
            rejections: Vec::new(),
            events: Vec::new(),
        };
        metrics.record_block(&receipt, 4);

        assert_eq!(metrics.bridge_height.get(), 7);
        assert_eq!(metrics.deferred_events.get(), 4);
        assert_eq!(metrics.calls_applied.get(), 2);
        assert_eq!(metrics.attestations_accepted.get(), 3);
        assert_eq!(metrics.events_finalized.get(), 1);
        assert_eq!(metrics.blocks_produced.get(), 1);
    }
}
