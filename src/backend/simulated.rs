//! An in-process stand-in for a native hotplug library.
//!
//! `SimulatedUsb` behaves like libusb from a backend's point of view: contexts
//! are created and released, callbacks are registered with a vendor/product
//! filter applied on the native side, and events are delivered either on the
//! caller's thread ([`SimulatedUsb::emit`]) or on a separate "native" thread
//! ([`SimulatedUsb::spawn_stream`]). Failures can be forced and every native
//! call is counted, so listener behavior can be checked without hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

use super::native::{NativeCallback, NativeEvent, NativeUsb};
use crate::error::{HotplugError, HotplugResult};
use crate::filter::{EventMask, HotplugFilter};
use crate::notify::{DeviceRef, DeviceState, NativeHandle};

const CONTEXT_HANDLE_BASE: usize = 0xc0_0000;
const DEVICE_HANDLE_BASE: usize = 0xd0_0000;

static NEXT_DEVICE: AtomicUsize = AtomicUsize::new(0);

/// A fake USB device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimulatedDevice {
    pub handle: NativeHandle,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
}

impl SimulatedDevice {
    /// Device with a fresh native handle, on bus 1
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        let n = NEXT_DEVICE.fetch_add(1, Ordering::Relaxed);
        Self {
            handle: NativeHandle::from_raw(DEVICE_HANDLE_BASE + n * 0x100),
            vendor_id,
            product_id,
            bus_number: 1,
            address: (n % 127) as u8 + 1,
        }
    }

    pub fn with_location(mut self, bus_number: u8, address: u8) -> Self {
        self.bus_number = bus_number;
        self.address = address;
        self
    }

    pub fn device_ref(&self) -> DeviceRef {
        DeviceRef {
            handle: self.handle,
            bus_number: self.bus_number,
            address: self.address,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
        }
    }
}

type SharedCallback = Arc<Mutex<NativeCallback>>;

/// A native callback kept alive outside the library, as a late-firing native
/// thread would.
#[derive(Clone)]
pub struct RetainedCallback(SharedCallback);

impl RetainedCallback {
    pub fn invoke(&self, event: NativeEvent) {
        let mut callback = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        (*callback)(event);
    }
}

struct SimEntry {
    id: u64,
    context: NativeHandle,
    filter: HotplugFilter,
    callback: SharedCallback,
}

#[derive(Default)]
struct BusState {
    next_context: usize,
    next_registration: u64,
    fail_inits: usize,
    fail_registrations: usize,
    no_native_masking: bool,
    live_contexts: Vec<NativeHandle>,
    entries: Vec<SimEntry>,
    inits: usize,
    releases: usize,
    registrations: usize,
    deregistrations: usize,
}

#[derive(Default)]
struct SimBus {
    state: Mutex<BusState>,
}

impl SimBus {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to one simulated USB subsystem; clones see the same bus
#[derive(Clone, Default)]
pub struct SimulatedUsb {
    bus: Arc<SimBus>,
}

/// Context created by [`SimulatedUsb`]; dropping it releases it
pub struct SimContext {
    handle: NativeHandle,
    bus: Arc<SimBus>,
}

impl Drop for SimContext {
    fn drop(&mut self) {
        let mut state = self.bus.lock();
        state.live_contexts.retain(|c| *c != self.handle);
        state.entries.retain(|e| e.context != self.handle);
        state.releases += 1;
        debug!("Simulated context {} released", self.handle);
    }
}

/// Registration token issued by [`SimulatedUsb`]
#[derive(Debug, PartialEq, Eq)]
pub struct SimRegistration {
    id: u64,
}

impl SimulatedUsb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` context initializations fail
    pub fn fail_next_inits(&self, count: usize) {
        self.bus.lock().fail_inits = count;
    }

    /// Make the next `count` callback registrations fail
    pub fn fail_next_registrations(&self, count: usize) {
        self.bus.lock().fail_registrations = count;
    }

    /// When disabled, every event kind reaches every callback, as with
    /// libusb through rusb
    pub fn set_native_masking(&self, enabled: bool) {
        self.bus.lock().no_native_masking = !enabled;
    }

    /// Event as the most recently created live context would report it
    pub fn event(&self, state: DeviceState, device: SimulatedDevice) -> NativeEvent {
        let context = self
            .bus
            .lock()
            .live_contexts
            .last()
            .copied()
            .unwrap_or(NativeHandle::from_raw(0));
        NativeEvent {
            state,
            context,
            device: device.device_ref(),
        }
    }

    /// Deliver one event to every matching callback on the calling thread.
    /// Returns how many callbacks were invoked.
    pub fn emit(&self, state: DeviceState, device: SimulatedDevice) -> usize {
        let targets: Vec<(NativeHandle, SharedCallback)> = {
            let state_guard = self.bus.lock();
            let mask_natively = !state_guard.no_native_masking;
            state_guard
                .entries
                .iter()
                .filter(|e| e.filter.matches_device(device.vendor_id, device.product_id))
                .filter(|e| !mask_natively || e.filter.events.contains(kind_mask(state)))
                .map(|e| (e.context, Arc::clone(&e.callback)))
                .collect()
        };

        for (context, callback) in targets.iter() {
            let event = NativeEvent {
                state,
                context: *context,
                device: device.device_ref(),
            };
            RetainedCallback(Arc::clone(callback)).invoke(event);
        }

        targets.len()
    }

    /// Play `events` in order on a dedicated thread, pausing `gap` between them
    pub fn spawn_stream(
        &self,
        events: Vec<(DeviceState, SimulatedDevice)>,
        gap: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        let usb = self.clone();
        std::thread::Builder::new()
            .name("simulated-usb-events".to_string())
            .spawn(move || {
                for (state, device) in events {
                    usb.emit(state, device);
                    if !gap.is_zero() {
                        std::thread::sleep(gap);
                    }
                }
            })
    }

    /// Keep the newest registration's callback reachable outside the bus
    pub fn retain_last_callback(&self) -> Option<RetainedCallback> {
        self.bus
            .lock()
            .entries
            .last()
            .map(|e| RetainedCallback(Arc::clone(&e.callback)))
    }

    /// Filters of the registrations currently active on the bus
    pub fn active_filters(&self) -> Vec<HotplugFilter> {
        self.bus.lock().entries.iter().map(|e| e.filter).collect()
    }

    pub fn active_registrations(&self) -> usize {
        self.bus.lock().entries.len()
    }

    pub fn live_contexts(&self) -> usize {
        self.bus.lock().live_contexts.len()
    }

    /// Successful context initializations
    pub fn init_count(&self) -> usize {
        self.bus.lock().inits
    }

    pub fn release_count(&self) -> usize {
        self.bus.lock().releases
    }

    /// Successful callback registrations
    pub fn registration_count(&self) -> usize {
        self.bus.lock().registrations
    }

    pub fn deregistration_count(&self) -> usize {
        self.bus.lock().deregistrations
    }
}

fn kind_mask(state: DeviceState) -> EventMask {
    match state {
        DeviceState::Arrived => EventMask::ARRIVED,
        DeviceState::Left => EventMask::LEFT,
    }
}

impl NativeUsb for SimulatedUsb {
    type Context = SimContext;
    type Registration = SimRegistration;

    fn name(&self) -> &'static str {
        "simulated-usb"
    }

    fn init(&self) -> HotplugResult<SimContext> {
        let mut state = self.bus.lock();
        if state.fail_inits > 0 {
            state.fail_inits -= 1;
            return Err(HotplugError::InitializationFailed(
                "simulated init failure".to_string(),
            ));
        }

        let handle = NativeHandle::from_raw(CONTEXT_HANDLE_BASE + state.next_context * 0x1000);
        state.next_context += 1;
        state.live_contexts.push(handle);
        state.inits += 1;

        Ok(SimContext {
            handle,
            bus: Arc::clone(&self.bus),
        })
    }

    fn context_handle(&self, context: &SimContext) -> NativeHandle {
        context.handle
    }

    fn register(
        &self,
        context: &SimContext,
        filter: &HotplugFilter,
        callback: NativeCallback,
    ) -> HotplugResult<SimRegistration> {
        let mut state = self.bus.lock();
        if state.fail_registrations > 0 {
            state.fail_registrations -= 1;
            return Err(HotplugError::RegistrationFailed(
                "simulated registration failure".to_string(),
            ));
        }

        let id = state.next_registration;
        state.next_registration += 1;
        state.registrations += 1;
        state.entries.push(SimEntry {
            id,
            context: context.handle,
            filter: *filter,
            callback: Arc::new(Mutex::new(callback)),
        });

        Ok(SimRegistration { id })
    }

    fn deregister(&self, context: &SimContext, registration: SimRegistration) {
        let mut state = self.bus.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|e| !(e.id == registration.id && e.context == context.handle));
        if state.entries.len() != before {
            state.deregistrations += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MatchId;

    fn counting_callback(counter: Arc<AtomicUsize>) -> NativeCallback {
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_devices_get_distinct_handles() {
        let a = SimulatedDevice::new(0x1234, 0x0001);
        let b = SimulatedDevice::new(0x1234, 0x0001);
        assert_ne!(a.handle, b.handle);
    }

    #[test]
    fn test_native_filtering() {
        let usb = SimulatedUsb::new();
        let context = usb.init().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let filter = HotplugFilter::new(true, false, MatchId::Id(0x1234), MatchId::Any);
        let registration = usb
            .register(&context, &filter, counting_callback(Arc::clone(&hits)))
            .unwrap();

        assert_eq!(usb.emit(DeviceState::Arrived, SimulatedDevice::new(0x1234, 0x0002)), 1);
        assert_eq!(usb.emit(DeviceState::Left, SimulatedDevice::new(0x1234, 0x0002)), 0);
        assert_eq!(usb.emit(DeviceState::Arrived, SimulatedDevice::new(0x4321, 0x0002)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        usb.deregister(&context, registration);
        assert_eq!(usb.active_registrations(), 0);
    }

    #[test]
    fn test_forced_failures() {
        let usb = SimulatedUsb::new();
        usb.fail_next_inits(1);
        assert!(usb.init().is_err());
        let context = usb.init().unwrap();

        usb.fail_next_registrations(1);
        let filter = HotplugFilter::all();
        assert!(usb.register(&context, &filter, Box::new(|_| {})).is_err());
        assert!(usb.register(&context, &filter, Box::new(|_| {})).is_ok());
        assert_eq!(usb.init_count(), 1);
        assert_eq!(usb.registration_count(), 1);
    }

    #[test]
    fn test_release_on_drop() {
        let usb = SimulatedUsb::new();
        let context = usb.init().unwrap();
        assert_eq!(usb.live_contexts(), 1);
        drop(context);
        assert_eq!(usb.live_contexts(), 0);
        assert_eq!(usb.release_count(), 1);
    }

    #[test]
    fn test_stream_runs_on_other_thread() {
        let usb = SimulatedUsb::new();
        let context = usb.init().unwrap();
        let caller = std::thread::current().id();
        let threads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&threads);
        let _registration = usb
            .register(
                &context,
                &HotplugFilter::all(),
                Box::new(move |_| sink.lock().unwrap().push(std::thread::current().id())),
            )
            .unwrap();

        let device = SimulatedDevice::new(0x1234, 0x0001);
        usb.spawn_stream(vec![(DeviceState::Arrived, device)], Duration::ZERO)
            .unwrap()
            .join()
            .unwrap();

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], caller);
    }
}
