use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

use super::native::{NativeCallback, NativeEvent, NativeUsb};
use super::{BackendState, BackendStats, HotplugBackend, StatsCounters};
use crate::config::{InitPolicy, ListenerConfig};
use crate::filter::{EventMask, HotplugFilter};
use crate::logging::log_hotplug_event;
use crate::notify::{Delivery, DeviceNotification, DeviceState, NativeHandle, NotificationHub};

/// What a trampoline forwards into. Owned by the active registration only, so
/// once that registration is gone every trampoline still holding a `Weak` to
/// it turns into a no-op.
struct TrampolineTarget {
    events: EventMask,
    hub: Arc<NotificationHub>,
    stats: Arc<StatsCounters>,
}

impl TrampolineTarget {
    fn dispatch(&self, event: NativeEvent) {
        let wanted = match event.state {
            DeviceState::Arrived => EventMask::ARRIVED,
            DeviceState::Left => EventMask::LEFT,
        };
        if !self.events.contains(wanted) {
            trace!("Ignoring {} event for {}", event.state, event.device);
            return;
        }

        let notification = DeviceNotification {
            state: event.state,
            context: event.context,
            device: event.device,
        };

        match self.hub.deliver(notification) {
            Delivery::Delivered { dropped } => {
                StatsCounters::bump(&self.stats.notifications);
                for _ in 0..dropped {
                    StatsCounters::bump(&self.stats.dropped_notifications);
                }
                log_hotplug_event(&notification);
            }
            Delivery::Closed => StatsCounters::bump(&self.stats.stale_callbacks),
        }
    }
}

fn trampoline(target: Weak<TrampolineTarget>, stats: Arc<StatsCounters>) -> NativeCallback {
    Box::new(move |event: NativeEvent| match target.upgrade() {
        Some(target) => target.dispatch(event),
        None => {
            StatsCounters::bump(&stats.stale_callbacks);
            trace!("Stale hotplug callback for {}", event.device);
        }
    })
}

struct ActiveRegistration<R> {
    registration: R,
    target: Arc<TrampolineTarget>,
}

/// Backend over a native hotplug library such as libusb.
///
/// Holds at most one native registration. Registering again deregisters the
/// previous one first; the native context is created on demand and released
/// only by [`HotplugBackend::shutdown`] or drop.
pub struct LibUsbBackend<N: NativeUsb> {
    native: N,
    context: Option<N::Context>,
    active: Option<ActiveRegistration<N::Registration>>,
    filter: Option<HotplugFilter>,
    hub: Arc<NotificationHub>,
    stats: Arc<StatsCounters>,
    shut_down: bool,
}

impl<N: NativeUsb> LibUsbBackend<N> {
    pub fn new(native: N, config: &ListenerConfig) -> Self {
        let hub = Arc::new(NotificationHub::new(config.channel_capacity));
        Self::with_hub(native, config, hub)
    }

    pub fn with_hub(native: N, config: &ListenerConfig, hub: Arc<NotificationHub>) -> Self {
        let mut backend = Self {
            native,
            context: None,
            active: None,
            filter: None,
            hub,
            stats: Arc::new(StatsCounters::default()),
            shut_down: false,
        };

        if config.init_policy == InitPolicy::Eager {
            // Failure here is retried by the next register call
            backend.ensure_context();
        }

        backend
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    fn ensure_context(&mut self) -> bool {
        if self.context.is_some() {
            return true;
        }

        StatsCounters::bump(&self.stats.init_attempts);
        match self.native.init() {
            Ok(context) => {
                info!(
                    "Initialized {} context {}",
                    self.native.name(),
                    self.native.context_handle(&context)
                );
                self.context = Some(context);
                true
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.init_failures);
                warn!(
                    "Unable to initialize {}: {}. USB devices may not be detected properly.",
                    self.native.name(),
                    e
                );
                false
            }
        }
    }
}

impl<N: NativeUsb> HotplugBackend for LibUsbBackend<N> {
    fn name(&self) -> &'static str {
        self.native.name()
    }

    fn register(&mut self, filter: HotplugFilter) {
        if self.shut_down {
            warn!("Hotplug backend already shut down, ignoring registration for {}", filter);
            return;
        }

        self.filter = Some(filter);

        // The native library allows several callbacks per context; one is kept
        // per listener so every platform behaves alike.
        self.deregister();

        if !self.ensure_context() {
            return;
        }

        let target = Arc::new(TrampolineTarget {
            events: filter.events,
            hub: Arc::clone(&self.hub),
            stats: Arc::clone(&self.stats),
        });
        let callback = trampoline(Arc::downgrade(&target), Arc::clone(&self.stats));

        let result = match self.context.as_ref() {
            Some(context) => self.native.register(context, &filter, callback),
            None => return,
        };

        match result {
            Ok(registration) => {
                StatsCounters::bump(&self.stats.registrations);
                info!("Registered {} hotplug callback for {}", self.native.name(), filter);
                self.active = Some(ActiveRegistration { registration, target });
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.registration_failures);
                warn!("Failed to register USB listener callback: {}", e);
            }
        }
    }

    fn deregister(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        // Trampolines of this registration go stale before libusb forgets it
        drop(active.target);

        if let Some(context) = self.context.as_ref() {
            self.native.deregister(context, active.registration);
            StatsCounters::bump(&self.stats.deregistrations);
            debug!("Deregistered {} hotplug callback", self.native.name());
        }
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        self.hub.close();
        self.deregister();

        if let Some(context) = self.context.take() {
            let handle = self.native.context_handle(&context);
            drop(context);
            info!("Released {} context {}", self.native.name(), handle);
        }

        self.shut_down = true;
    }

    fn state(&self) -> BackendState {
        match (&self.context, &self.active) {
            (None, _) => BackendState::Uninitialized,
            (Some(_), None) => BackendState::ContextReady,
            (Some(_), Some(_)) => BackendState::Registered,
        }
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

    fn context_handle(&self) -> Option<NativeHandle> {
        self.context
            .as_ref()
            .map(|context| self.native.context_handle(context))
    }
}

impl<N: NativeUsb> Drop for LibUsbBackend<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
