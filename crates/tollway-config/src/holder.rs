use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::Config;

/// Process-wide reloadable configuration
///
/// Components never read from here directly. They receive an immutable
/// snapshot at construction; only the outermost boundary swaps in new ones.
#[derive(Debug)]
pub struct ConfigHolder {
    current: ArcSwap<Config>,
}

impl ConfigHolder {
    pub fn new(config: Config) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Current configuration snapshot
    pub fn snapshot(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Swap in a new configuration, returning the previous snapshot
    ///
    /// Holders of earlier snapshots keep seeing the values they were built with.
    pub fn replace(&self, config: Config) -> Arc<Config> {
        self.current.swap(Arc::new(config))
    }
}
