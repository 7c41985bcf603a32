// Common helpers for listener integration tests

use std::sync::{Arc, Mutex};

use usb_hotplug::backend::SimulatedUsb;
use usb_hotplug::{DeviceListener, DeviceNotification, ListenerConfig};

/// Listener over a fresh simulated USB bus
#[allow(dead_code)]
pub fn simulated_listener() -> (SimulatedUsb, DeviceListener) {
    let usb = SimulatedUsb::new();
    let listener = DeviceListener::with_native(usb.clone(), &ListenerConfig::default());
    (usb, listener)
}

/// Record every notification the listener delivers
#[allow(dead_code)]
pub fn record(listener: &DeviceListener) -> Arc<Mutex<Vec<DeviceNotification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    listener.on_notification(move |n| sink.lock().unwrap().push(*n));
    seen
}

#[allow(dead_code)]
pub fn snapshot(seen: &Arc<Mutex<Vec<DeviceNotification>>>) -> Vec<DeviceNotification> {
    seen.lock().unwrap().clone()
}
