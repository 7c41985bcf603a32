//! Cross-platform USB device hotplug listener.
//!
//! [`DeviceListener`] lets an application register interest in device
//! arrival and removal, optionally filtered by vendor and product id, and
//! receive a [`DeviceNotification`] for every matching event. The native
//! mechanism is chosen per platform: libusb hotplug on Linux and other Unix
//! systems, the IOKit-backed libusb path on macOS, and an explicit
//! no-notification backend where hotplug is unsupported.

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod listener;
pub mod logging;
pub mod notify;

pub use backend::{BackendState, BackendStats, HotplugBackend};
pub use config::{InitPolicy, ListenerConfig};
pub use error::{HotplugError, HotplugResult};
pub use filter::{EventMask, HotplugFilter, MatchId};
pub use listener::DeviceListener;
pub use notify::{DeviceNotification, DeviceRef, DeviceState, HandlerId, NativeHandle};
