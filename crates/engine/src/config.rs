use std::time::Duration;

/// Tuning knobs for the resumption worker and stats.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the worker polls the resume queue for due tickets.
    pub resume_poll_interval: Duration,
    /// Maximum tickets taken per poll.
    pub resume_batch_size: usize,
    /// Default look-back for workflow stats.
    pub stats_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resume_poll_interval: Duration::from_secs(1),
            resume_batch_size: 100,
            stats_window_days: 30,
        }
    }
}
