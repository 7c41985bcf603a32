use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::backend::{
    platform_backend, BackendState, BackendStats, HotplugBackend, LibUsbBackend, NativeUsb,
};
use crate::config::ListenerConfig;
use crate::filter::{HotplugFilter, MatchId};
use crate::notify::{DeviceNotification, HandlerId, NativeHandle, NotificationHub};

/// Platform-independent USB hotplug listener.
///
/// Owns one platform backend for its whole lifetime and forwards to it. A
/// listener has at most one active registration; registering again replaces
/// it. No operation reports an error: native failures are logged and result
/// in no notifications.
///
/// Notifications arrive on the native event thread. Handlers added with
/// [`DeviceListener::on_notification`] run there and must return quickly and
/// must not call back into this listener; [`DeviceListener::subscribe`] hands
/// them to any other context instead.
pub struct DeviceListener {
    backend: Mutex<Box<dyn HotplugBackend>>,
    hub: Arc<NotificationHub>,
}

impl DeviceListener {
    /// Listener on this platform's backend with default configuration
    pub fn new() -> Self {
        Self::with_config(ListenerConfig::default())
    }

    pub fn with_config(config: ListenerConfig) -> Self {
        Self::with_backend(platform_backend(&config))
    }

    /// Listener over an explicit native library
    pub fn with_native<N: NativeUsb>(native: N, config: &ListenerConfig) -> Self {
        Self::with_backend(Box::new(LibUsbBackend::new(native, config)))
    }

    pub fn with_backend(backend: Box<dyn HotplugBackend>) -> Self {
        info!("Device listener using {} backend", backend.name());
        let hub = backend.hub();
        Self {
            backend: Mutex::new(backend),
            hub,
        }
    }

    fn backend(&self) -> MutexGuard<'_, Box<dyn HotplugBackend>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register for arrival and/or removal of devices matching the filter.
    ///
    /// Any previous registration on this listener is removed first. Passing
    /// `false` for both kinds is accepted and never notifies.
    pub fn register_hotplug_callback(
        &self,
        arrived: bool,
        left: bool,
        vendor_id: impl Into<MatchId>,
        product_id: impl Into<MatchId>,
    ) {
        self.register(HotplugFilter::new(arrived, left, vendor_id.into(), product_id.into()));
    }

    /// Same as [`register_hotplug_callback`](Self::register_hotplug_callback)
    /// for any vendor and product
    pub fn register_any_device(&self, arrived: bool, left: bool) {
        self.register(HotplugFilter::new(arrived, left, MatchId::Any, MatchId::Any));
    }

    pub fn register(&self, filter: HotplugFilter) {
        debug!("Registering hotplug callback for {}", filter);
        self.backend().register(filter);
    }

    /// Remove the active registration. No-op when nothing is registered.
    pub fn deregister_hotplug_callback(&self) {
        self.backend().deregister();
    }

    /// Add a handler run for every notification, on the native event thread
    pub fn on_notification<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&DeviceNotification) + Send + Sync + 'static,
    {
        self.hub.add_handler(handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.hub.remove_handler(id)
    }

    /// Bounded stream of notifications, ending when the listener shuts down
    pub fn subscribe(&self) -> mpsc::Receiver<DeviceNotification> {
        self.hub.subscribe()
    }

    pub fn state(&self) -> BackendState {
        self.backend().state()
    }

    /// Most recently requested filter
    pub fn filter(&self) -> Option<HotplugFilter> {
        self.backend().filter()
    }

    pub fn stats(&self) -> BackendStats {
        self.backend().stats()
    }

    /// Native context that notifications from this listener will carry
    pub fn context_handle(&self) -> Option<NativeHandle> {
        self.backend().context_handle()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend().name()
    }

    /// Deregister and release the native context. The listener stays usable
    /// as an object but will not register or notify again.
    pub fn shutdown(&self) {
        self.backend().shutdown();
        info!("Device listener shut down");
    }
}

impl Default for DeviceListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceListener {
    fn drop(&mut self) {
        self.backend().shutdown();
    }
}

impl fmt::Debug for DeviceListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = self.backend();
        f.debug_struct("DeviceListener")
            .field("backend", &backend.name())
            .field("state", &backend.state())
            .field("filter", &backend.filter())
            .field("hub", &self.hub)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SimulatedDevice, SimulatedUsb, UnsupportedBackend};
    use crate::notify::DeviceState;

    #[test]
    fn test_listener_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeviceListener>();
    }

    #[test]
    fn test_register_forwards_filter() {
        let sim = SimulatedUsb::new();
        let listener = DeviceListener::with_native(sim.clone(), &ListenerConfig::default());

        listener.register_hotplug_callback(true, false, 0x1234u16, MatchId::Any);

        let expected = HotplugFilter::new(true, false, MatchId::Id(0x1234), MatchId::Any);
        assert_eq!(listener.filter(), Some(expected));
        assert_eq!(sim.active_filters(), vec![expected]);
        assert_eq!(listener.state(), BackendState::Registered);
        assert_eq!(listener.backend_name(), "simulated-usb");
    }

    #[test]
    fn test_option_ids() {
        let sim = SimulatedUsb::new();
        let listener = DeviceListener::with_native(sim.clone(), &ListenerConfig::default());
        listener.register_hotplug_callback(true, true, None::<u16>, Some(0x0001u16));

        let filter = listener.filter().unwrap();
        assert!(filter.vendor_id.is_any());
        assert_eq!(filter.product_id, MatchId::Id(0x0001));
    }

    #[test]
    fn test_removed_handler_stops_receiving() {
        let sim = SimulatedUsb::new();
        let listener = DeviceListener::with_native(sim.clone(), &ListenerConfig::default());
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let id = listener.on_notification(move |_| *sink.lock().unwrap() += 1);

        listener.register_any_device(true, true);
        let device = SimulatedDevice::new(0x1234, 0x0001);
        sim.emit(DeviceState::Arrived, device);
        assert!(listener.remove_handler(id));
        sim.emit(DeviceState::Left, device);

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_unsupported_backend_is_quiet() {
        let listener = DeviceListener::with_backend(Box::new(UnsupportedBackend::new(
            &ListenerConfig::default(),
        )));
        listener.register_any_device(true, true);
        listener.deregister_hotplug_callback();
        assert_eq!(listener.state(), BackendState::Uninitialized);
        assert_eq!(listener.stats().notifications, 0);
    }

    #[test]
    fn test_debug_output() {
        let listener = DeviceListener::with_native(SimulatedUsb::new(), &ListenerConfig::default());
        let debug = format!("{:?}", listener);
        assert!(debug.contains("simulated-usb"));
        assert!(debug.contains("Uninitialized"));
    }
}
