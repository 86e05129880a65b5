use std::time::Duration;

/// Tunables for the process-wide [`crate::pool::SelectorPool`].
///
/// There is no file or environment-variable surface for these — the core
/// has no persisted or external configuration at all — this is a plain,
/// in-process `Default`-implementing struct, the same shape
/// `tokio::runtime::Builder` uses for its own tunables.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How often the reaper looks for an idle worker task to retire.
    pub reaper_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reaper_interval: Duration::from_secs(5),
        }
    }
}
