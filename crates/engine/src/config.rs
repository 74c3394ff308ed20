//! Resource caps and retry policy, threaded in by the caller.
//!
//! No global mutable state: an `EngineConfig` is a plain struct constructed
//! once at boot and passed to the collaborators that need it, the same way
//! the rest of this codebase threads an explicit handle rather than reaching
//! for a `lazy_static`.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Forward-distance cap within one receiving chain (`ratchet::MAX_SKIP_PER_CHAIN`).
    pub max_skip_per_chain: u64,
    /// Total skipped-key store cap across every chain (`ratchet::MAX_SKIP_TOTAL`).
    pub max_skip_total: usize,
    /// Retired receiving-chain ring size (`ratchet::MAX_HISTORY_SHARDS`).
    pub max_history_shards: usize,
    /// Dead-letter jobs older than this count (per conversation) are pruned oldest-first.
    pub inbox_max_dead_per_conv: usize,
    /// Maximum jobs processed per conversation per `process_for_conversation` sweep.
    pub inbox_fairness_cap: usize,
    /// Maximum counters fetched in one gap-fill pass.
    pub gap_fill_cap: u64,
    /// A single failure dead-letters a job (policy: zero retries).
    pub max_retries: u32,
    pub retry_backoff_base_secs: u64,
    pub retry_backoff_cap_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_skip_per_chain: ratchet_crypto::ratchet::MAX_SKIP_PER_CHAIN,
            max_skip_total: ratchet_crypto::ratchet::MAX_SKIP_TOTAL,
            max_history_shards: ratchet_crypto::ratchet::MAX_HISTORY_SHARDS,
            inbox_max_dead_per_conv: 50,
            inbox_fairness_cap: 50,
            gap_fill_cap: 50,
            max_retries: 0,
            retry_backoff_base_secs: 1,
            retry_backoff_cap_secs: 60,
        }
    }
}

impl EngineConfig {
    /// `min(cap, base * 2^retry_count)`, in seconds.
    pub fn retry_backoff_secs(&self, retry_count: u32) -> u64 {
        let scaled = self.retry_backoff_base_secs.saturating_mul(1u64 << retry_count.min(32));
        scaled.min(self.retry_backoff_cap_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.retry_backoff_secs(0), 1);
        assert_eq!(cfg.retry_backoff_secs(10), cfg.retry_backoff_cap_secs);
    }
}
