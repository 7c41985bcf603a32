use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::native::{NativeCallback, NativeEvent, NativeUsb};
use crate::config::ListenerConfig;
use crate::error::{HotplugError, HotplugResult};
use crate::filter::HotplugFilter;
use crate::notify::{DeviceRef, DeviceState, NativeHandle};

/// libusb, through `rusb`
#[derive(Debug, Clone)]
pub struct RusbLibrary {
    event_timeout: Duration,
    enumerate: bool,
}

impl RusbLibrary {
    pub fn new(config: &ListenerConfig) -> Self {
        Self {
            event_timeout: config.event_timeout,
            enumerate: config.enumerate_existing,
        }
    }
}

impl Default for RusbLibrary {
    fn default() -> Self {
        Self::new(&ListenerConfig::default())
    }
}

/// A libusb context plus the thread that drives its event handling
pub struct RusbSession {
    context: Context,
    running: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl RusbSession {
    fn start(context: Context, timeout: Duration) -> HotplugResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let pump_running = Arc::clone(&running);
        let pump_context = context.clone();

        let pump = std::thread::Builder::new()
            .name("usb-hotplug-events".to_string())
            .spawn(move || {
                debug!("USB event pump started");
                while pump_running.load(Ordering::Acquire) {
                    match pump_context.handle_events(Some(timeout)) {
                        Ok(()) => {}
                        Err(rusb::Error::Interrupted) => {
                            info!("USB event handling interrupted");
                            break;
                        }
                        Err(e) => {
                            error!("USB event handling error: {}", e);
                            std::thread::sleep(timeout);
                        }
                    }
                }
                debug!("USB event pump stopped");
            })
            .map_err(|e| HotplugError::InitializationFailed(format!("event thread: {}", e)))?;

        Ok(Self {
            context,
            running,
            pump: Some(pump),
        })
    }
}

impl Drop for RusbSession {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            // Wakes within one event timeout
            if pump.join().is_err() {
                warn!("USB event pump panicked");
            }
        }
    }
}

/// Adapts libusb's per-kind hotplug calls to one [`NativeCallback`]
struct HotplugTrampoline {
    context: NativeHandle,
    callback: NativeCallback,
}

impl HotplugTrampoline {
    fn forward(&mut self, state: DeviceState, device: &Device<Context>) {
        let event = NativeEvent {
            state,
            context: self.context,
            device: device_ref(device),
        };
        (self.callback)(event);
    }
}

impl Hotplug<Context> for HotplugTrampoline {
    fn device_arrived(&mut self, device: Device<Context>) {
        self.forward(DeviceState::Arrived, &device);
    }

    fn device_left(&mut self, device: Device<Context>) {
        self.forward(DeviceState::Left, &device);
    }
}

/// Descriptor fields come from libusb's cached copy; no device I/O
fn device_ref(device: &Device<Context>) -> DeviceRef {
    let (vendor_id, product_id) = match device.device_descriptor() {
        Ok(descriptor) => (descriptor.vendor_id(), descriptor.product_id()),
        Err(e) => {
            debug!("No descriptor for hotplug device: {}", e);
            (0, 0)
        }
    };

    DeviceRef {
        handle: NativeHandle::from_ptr(device.as_raw()),
        bus_number: device.bus_number(),
        address: device.address(),
        vendor_id,
        product_id,
    }
}

impl NativeUsb for RusbLibrary {
    type Context = RusbSession;
    type Registration = Registration<Context>;

    fn name(&self) -> &'static str {
        "libusb"
    }

    fn init(&self) -> HotplugResult<RusbSession> {
        if !rusb::has_hotplug() {
            return Err(HotplugError::Unsupported("libusb was built without hotplug support"));
        }

        let context = Context::new()
            .map_err(|e| HotplugError::InitializationFailed(e.to_string()))?;

        RusbSession::start(context, self.event_timeout)
    }

    fn context_handle(&self, session: &RusbSession) -> NativeHandle {
        NativeHandle::from_ptr(session.context.as_raw())
    }

    fn register(
        &self,
        session: &RusbSession,
        filter: &HotplugFilter,
        callback: NativeCallback,
    ) -> HotplugResult<Registration<Context>> {
        let trampoline: Box<dyn Hotplug<Context>> = Box::new(HotplugTrampoline {
            context: self.context_handle(session),
            callback,
        });

        // libusb is always asked for both kinds here; the backend applies the mask
        let mut builder = HotplugBuilder::new();
        if let Some(vendor_id) = filter.vendor_id.id() {
            builder.vendor_id(vendor_id);
        }
        if let Some(product_id) = filter.product_id.id() {
            builder.product_id(product_id);
        }
        builder.enumerate(self.enumerate);

        builder
            .register(&session.context, trampoline)
            .map_err(HotplugError::from)
    }

    fn deregister(&self, session: &RusbSession, registration: Registration<Context>) {
        session.context.unregister_callback(registration);
    }
}
