use std::sync::Arc;

use super::libusb::LibUsbBackend;
use super::rusb_native::RusbLibrary;
use super::{BackendState, BackendStats, HotplugBackend};
use crate::config::ListenerConfig;
use crate::filter::HotplugFilter;
use crate::notify::{NativeHandle, NotificationHub};

/// macOS backend.
///
/// Device arrival and removal come from IOKit matching notifications, which
/// libusb's darwin backend already subscribes to. This type keeps the macOS
/// entry point separate while the notification plumbing stays shared.
pub struct IoKitBackend {
    inner: LibUsbBackend<RusbLibrary>,
}

impl IoKitBackend {
    pub fn new(config: &ListenerConfig) -> Self {
        Self {
            inner: LibUsbBackend::new(RusbLibrary::new(config), config),
        }
    }
}

impl HotplugBackend for IoKitBackend {
    fn name(&self) -> &'static str {
        "iokit"
    }

    fn register(&mut self, filter: HotplugFilter) {
        self.inner.register(filter);
    }

    fn deregister(&mut self) {
        self.inner.deregister();
    }

    fn shutdown(&mut self) {
        self.inner.shutdown();
    }

    fn state(&self) -> BackendState {
        self.inner.state()
    }

    fn filter(&self) -> Option<HotplugFilter> {
        self.inner.filter()
    }

    fn stats(&self) -> BackendStats {
        self.inner.stats()
    }

    fn hub(&self) -> Arc<NotificationHub> {
        self.inner.hub()
    }

    fn context_handle(&self) -> Option<NativeHandle> {
        self.inner.context_handle()
    }
}
