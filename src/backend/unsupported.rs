use std::sync::Arc;
use tracing::warn;

use super::{BackendState, BackendStats, HotplugBackend, StatsCounters};
use crate::config::ListenerConfig;
use crate::filter::HotplugFilter;
use crate::notify::NotificationHub;

/// Backend for platforms without a hotplug mechanism (currently Windows).
///
/// Accepts every call, never creates a context and never notifies. The first
/// registration logs a warning so the missing support is visible.
pub struct UnsupportedBackend {
    filter: Option<HotplugFilter>,
    hub: Arc<NotificationHub>,
    stats: StatsCounters,
    warned: bool,
}

impl UnsupportedBackend {
    pub fn new(config: &ListenerConfig) -> Self {
        Self {
            filter: None,
            hub: Arc::new(NotificationHub::new(config.channel_capacity)),
            stats: StatsCounters::default(),
            warned: false,
        }
    }
}

impl HotplugBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn register(&mut self, filter: HotplugFilter) {
        self.filter = Some(filter);
        StatsCounters::bump(&self.stats.init_attempts);
        StatsCounters::bump(&self.stats.init_failures);

        if !self.warned {
            warn!("USB hotplug notifications are not supported on this platform");
            self.warned = true;
        }
    }

    fn deregister(&mut self) {}

    fn shutdown(&mut self) {
        self.hub.close();
    }

    fn state(&self) -> BackendState {
        BackendState::Uninitialized
    }

    fn filter(&self) -> Option<HotplugFilter> {
        self.filter
    }

    fn stats(&self) -> BackendStats {
        self.stats.snapshot()
    }

    fn hub(&self) -> Arc<NotificationHub> {
        Arc::clone(&self.hub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_never_initializes() {
        let mut backend = UnsupportedBackend::new(&ListenerConfig::default());
        backend.register(HotplugFilter::all());
        backend.register(HotplugFilter::all());
        backend.deregister();

        assert_eq!(backend.state(), BackendState::Uninitialized);
        assert_eq!(backend.filter(), Some(HotplugFilter::all()));
        assert_eq!(backend.stats().init_failures, 2);
        assert_eq!(backend.stats().registrations, 0);
    }

    #[test]
    fn test_shutdown_closes_stream() {
        let mut backend = UnsupportedBackend::new(&ListenerConfig::default());
        let hub = backend.hub();
        backend.shutdown();
        assert!(hub.is_closed());
    }
}
