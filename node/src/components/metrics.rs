//! Metrics of the bootstrap subsystem.

use prometheus::{Gauge, IntCounter, IntCounterVec, Opts, Registry};

/// Bootstrap metrics, registered on construction and unregistered on drop.
#[derive(Debug)]
pub struct Metrics {
    /// Wall-clock duration of the last completed bootstrap.
    pub bootstrap_duration_seconds: Gauge,
    /// Completed bootstraps by path taken (`epoch_zero`, `local_storage`,
    /// `network_sync`).
    pub bootstrap_path: IntCounterVec,
    /// Shard headers resolved during network syncs.
    pub resolved_headers: IntCounter,
    /// Trie nodes downloaded during network syncs.
    pub resolved_trie_nodes: IntCounter,
    /// Pending mini-block bodies resolved during network syncs.
    pub resolved_mini_blocks: IntCounter,
    registry: Registry,
}

impl Metrics {
    /// Creates and registers the bootstrap metrics.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let bootstrap_duration_seconds = Gauge::new(
            "bootstrap_duration_seconds",
            "wall-clock duration of the last completed bootstrap in seconds",
        )?;
        let bootstrap_path = IntCounterVec::new(
            Opts::new("bootstrap_path_total", "completed bootstraps by path"),
            &["path"],
        )?;
        let resolved_headers = IntCounter::new(
            "bootstrap_resolved_headers_total",
            "shard headers resolved during network syncs",
        )?;
        let resolved_trie_nodes = IntCounter::new(
            "bootstrap_resolved_trie_nodes_total",
            "trie nodes downloaded during network syncs",
        )?;
        let resolved_mini_blocks = IntCounter::new(
            "bootstrap_resolved_mini_blocks_total",
            "pending mini-block bodies resolved during network syncs",
        )?;

        registry.register(Box::new(bootstrap_duration_seconds.clone()))?;
        registry.register(Box::new(bootstrap_path.clone()))?;
        registry.register(Box::new(resolved_headers.clone()))?;
        registry.register(Box::new(resolved_trie_nodes.clone()))?;
        registry.register(Box::new(resolved_mini_blocks.clone()))?;

        Ok(Metrics {
            bootstrap_duration_seconds,
            bootstrap_path,
            resolved_headers,
            resolved_trie_nodes,
            resolved_mini_blocks,
            registry: registry.clone(),
        })
    }
}

impl Drop for Metrics {
    fn drop(&mut self) {
        let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
            Box::new(self.bootstrap_duration_seconds.clone()),
            Box::new(self.bootstrap_path.clone()),
            Box::new(self.resolved_headers.clone()),
            Box::new(self.resolved_trie_nodes.clone()),
            Box::new(self.resolved_mini_blocks.clone()),
        ];
        for collector in collectors {
            // Unregistration failure is unproblematic on shutdown.
            let _ = self.registry.unregister(collector);
        }
    }
}
