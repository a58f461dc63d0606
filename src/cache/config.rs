//! Page cache settings.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_REVALIDATE: Duration = Duration::from_secs(60);
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCacheConfig {
    pub enabled: bool,
    /// How long a rendered page is served before the next request regenerates it.
    pub revalidate: Duration,
    pub capacity: NonZeroUsize,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            revalidate: DEFAULT_REVALIDATE,
            capacity: NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl PageCacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
