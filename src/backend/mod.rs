//! Platform backends behind one contract.
//!
//! A backend owns the native monitoring context and at most one native
//! registration. The listener picks one backend per process at construction
//! time via [`platform_backend`]; tests and demos can hand it any other
//! implementation, usually a [`LibUsbBackend`] over [`SimulatedUsb`].

pub mod native;
pub mod libusb;
pub mod rusb_native;
pub mod simulated;
pub mod unsupported;
#[cfg(target_os = "macos")]
pub mod macos;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ListenerConfig;
use crate::filter::HotplugFilter;
use crate::notify::{NativeHandle, NotificationHub};

pub use libusb::LibUsbBackend;
pub use native::{NativeCallback, NativeEvent, NativeUsb};
pub use rusb_native::RusbLibrary;
pub use simulated::{SimulatedDevice, SimulatedUsb};
pub use unsupported::UnsupportedBackend;
#[cfg(target_os = "macos")]
pub use macos::IoKitBackend;

/// Lifecycle of one backend instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendState {
    /// No native context
    Uninitialized,
    /// Native context exists, nothing registered
    ContextReady,
    /// Native context exists with one active registration
    Registered,
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendState::Uninitialized => write!(f, "uninitialized"),
            BackendState::ContextReady => write!(f, "context-ready"),
            BackendState::Registered => write!(f, "registered"),
        }
    }
}

/// Snapshot of backend counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub init_attempts: u64,
    pub init_failures: u64,
    pub registrations: u64,
    pub registration_failures: u64,
    pub deregistrations: u64,
    pub notifications: u64,
    /// Trampoline invocations that found their registration gone
    pub stale_callbacks: u64,
    /// Notifications a full subscriber could not take
    pub dropped_notifications: u64,
}

/// Counters shared between a backend and its trampolines
#[derive(Debug, Default)]
pub struct StatsCounters {
    pub init_attempts: AtomicU64,
    pub init_failures: AtomicU64,
    pub registrations: AtomicU64,
    pub registration_failures: AtomicU64,
    pub deregistrations: AtomicU64,
    pub notifications: AtomicU64,
    pub stale_callbacks: AtomicU64,
    pub dropped_notifications: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BackendStats {
        BackendStats {
            init_attempts: self.init_attempts.load(Ordering::Relaxed),
            init_failures: self.init_failures.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            registration_failures: self.registration_failures.load(Ordering::Relaxed),
            deregistrations: self.deregistrations.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            stale_callbacks: self.stale_callbacks.load(Ordering::Relaxed),
            dropped_notifications: self.dropped_notifications.load(Ordering::Relaxed),
        }
    }
}

/// The contract every platform backend honors.
///
/// None of the operations fail from the caller's point of view: native
/// failures are logged and leave the backend in a state that yields no
/// notifications.
pub trait HotplugBackend: Send {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Replace any active registration with one for `filter`
    fn register(&mut self, filter: HotplugFilter);

    /// Remove the active registration, if any. Keeps the native context.
    fn deregister(&mut self);

    /// Deregister and release the native context. Terminal.
    fn shutdown(&mut self);

    fn state(&self) -> BackendState;

    /// Most recently requested filter
    fn filter(&self) -> Option<HotplugFilter>;

    fn stats(&self) -> BackendStats;

    /// The stream this backend delivers notifications into
    fn hub(&self) -> Arc<NotificationHub>;

    /// Identity of the native context, once one exists
    fn context_handle(&self) -> Option<NativeHandle> {
        None
    }
}

/// Backend for the platform this binary was built for
#[cfg(all(unix, not(target_os = "macos")))]
pub fn platform_backend(config: &ListenerConfig) -> Box<dyn HotplugBackend> {
    Box::new(LibUsbBackend::new(RusbLibrary::new(config), config))
}

/// Backend for the platform this binary was built for
#[cfg(target_os = "macos")]
pub fn platform_backend(config: &ListenerConfig) -> Box<dyn HotplugBackend> {
    Box::new(IoKitBackend::new(config))
}

/// Backend for the platform this binary was built for
#[cfg(not(unix))]
pub fn platform_backend(config: &ListenerConfig) -> Box<dyn HotplugBackend> {
    Box::new(UnsupportedBackend::new(config))
}
