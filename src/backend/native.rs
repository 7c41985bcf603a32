//! The seam between a backend and the native device-monitoring library.

use crate::error::HotplugResult;
use crate::filter::HotplugFilter;
use crate::notify::{DeviceRef, DeviceState, NativeHandle};

/// A raw hotplug event as the native library reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeEvent {
    pub state: DeviceState,
    /// Context the event was produced by, never the callback's user data
    pub context: NativeHandle,
    pub device: DeviceRef,
}

/// Callback handed to the native library. Runs on the library's event thread.
pub type NativeCallback = Box<dyn FnMut(NativeEvent) + Send>;

/// A native hotplug library.
///
/// Releasing a context is dropping it. Backends guarantee every registration
/// is handed back through [`NativeUsb::deregister`] before its context drops.
pub trait NativeUsb: Send + 'static {
    type Context: Send;
    type Registration: Send;

    fn name(&self) -> &'static str;

    /// Create a monitoring context
    fn init(&self) -> HotplugResult<Self::Context>;

    /// Identity of `context` as it appears in native events
    fn context_handle(&self, context: &Self::Context) -> NativeHandle;

    /// Register `callback` for events matching `filter`.
    ///
    /// Libraries that cannot mask by event kind may report every kind; the
    /// backend gates on `filter.events` as well.
    fn register(
        &self,
        context: &Self::Context,
        filter: &HotplugFilter,
        callback: NativeCallback,
    ) -> HotplugResult<Self::Registration>;

    fn deregister(&self, context: &Self::Context, registration: Self::Registration);
}
