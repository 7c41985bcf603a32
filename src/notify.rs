use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Whether the device arrived or left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Arrived,
    Left,
}

impl DeviceState {
    pub fn is_arrived(&self) -> bool {
        matches!(self, DeviceState::Arrived)
    }
}

impl From<bool> for DeviceState {
    fn from(arrived: bool) -> Self {
        if arrived {
            DeviceState::Arrived
        } else {
            DeviceState::Left
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Arrived => write!(f, "Arrived"),
            DeviceState::Left => write!(f, "Left"),
        }
    }
}

/// Opaque identity of a native object (context or device).
///
/// It is an address-sized token only. It cannot be dereferenced and says
/// nothing about whether the native object is still alive once the
/// notification that carried it has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(usize);

impl NativeHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The device that changed state, as reported by the native layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    pub handle: NativeHandle,
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} bus {:03} addr {:03}",
            self.vendor_id, self.product_id, self.bus_number, self.address
        )
    }
}

/// One hotplug notification, fired once per matching native event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNotification {
    pub state: DeviceState,
    /// Context that produced the event
    pub context: NativeHandle,
    pub device: DeviceRef,
}

impl DeviceNotification {
    pub fn is_arrived(&self) -> bool {
        self.state.is_arrived()
    }
}

impl fmt::Display for DeviceNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (ctx {})", self.state, self.device, self.context)
    }
}

/// Identifies a handler added with [`NotificationHub::add_handler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type NotificationHandler = Arc<dyn Fn(&DeviceNotification) + Send + Sync>;

/// Result of handing one notification to the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Passed to every handler and subscriber; `dropped` subscribers were full
    Delivered { dropped: usize },
    /// The hub has been closed; nothing was delivered
    Closed,
}

struct HubInner {
    closed: bool,
    next_handler: u64,
    handlers: Vec<(HandlerId, NotificationHandler)>,
    subscribers: Vec<mpsc::Sender<DeviceNotification>>,
}

/// The single outbound notification stream of a listener.
///
/// Deliveries are serialized by one lock, so every handler and subscriber sees
/// notifications in the order the native layer produced them. Handlers run on
/// the native event thread while that lock is held.
pub struct NotificationHub {
    inner: Mutex<HubInner>,
    capacity: usize,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                closed: false,
                next_handler: 0,
                handlers: Vec::new(),
                subscribers: Vec::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // A panicking handler must not take the whole stream down with it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&DeviceNotification) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = HandlerId(inner.next_handler);
        inner.next_handler += 1;
        inner.handlers.push((id, Arc::new(handler)));
        id
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut inner = self.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(handler_id, _)| *handler_id != id);
        inner.handlers.len() != before
    }

    /// New bounded subscriber; a full subscriber loses notifications rather
    /// than blocking the native thread.
    pub fn subscribe(&self) -> mpsc::Receiver<DeviceNotification> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut inner = self.lock();
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        rx
    }

    pub fn deliver(&self, notification: DeviceNotification) -> Delivery {
        let mut inner = self.lock();
        if inner.closed {
            trace!("Notification hub closed, discarding {}", notification);
            return Delivery::Closed;
        }

        for (_, handler) in inner.handlers.iter() {
            handler(&notification);
        }

        let mut dropped = 0;
        inner.subscribers.retain(|tx| match tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if dropped > 0 {
            warn!(
                "{} subscriber(s) full, dropped notification {}",
                dropped, notification
            );
        }

        Delivery::Delivered { dropped }
    }

    /// Stop all further delivery. Waits for an in-flight delivery to finish,
    /// and drops every subscriber so their receivers see end-of-stream.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(100)
    }
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("NotificationHub")
            .field("closed", &inner.closed)
            .field("handlers", &inner.handlers.len())
            .field("subscribers", &inner.subscribers.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
