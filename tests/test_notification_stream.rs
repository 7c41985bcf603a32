mod common;

use std::time::Duration;
use tokio::time::timeout;

use common::simulated_listener;
use usb_hotplug::backend::{SimulatedDevice, SimulatedUsb};
use usb_hotplug::{DeviceListener, DeviceState, ListenerConfig};

#[tokio::test]
async fn test_subscriber_receives_from_native_thread() {
    let (usb, listener) = simulated_listener();
    let mut rx = listener.subscribe();
    listener.register_hotplug_callback(true, true, 0x1234u16, None::<u16>);

    let dev1 = SimulatedDevice::new(0x1234, 0x0001);
    let stream = usb
        .spawn_stream(
            vec![(DeviceState::Arrived, dev1), (DeviceState::Left, dev1)],
            Duration::from_millis(5),
        )
        .unwrap();

    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    stream.join().unwrap();

    assert_eq!(first.state, DeviceState::Arrived);
    assert_eq!(second.state, DeviceState::Left);
    assert_eq!(first.device.handle, dev1.handle);
    assert_eq!(first.context, listener.context_handle().unwrap());
}

#[tokio::test]
async fn test_stream_ends_on_shutdown() {
    let (_usb, listener) = simulated_listener();
    let mut rx = listener.subscribe();
    listener.register_any_device(true, true);

    listener.shutdown();

    let end = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_full_subscriber_drops_without_blocking() {
    let usb = SimulatedUsb::new();
    let config = ListenerConfig {
        channel_capacity: 1,
        ..Default::default()
    };
    let listener = DeviceListener::with_native(usb.clone(), &config);
    let mut rx = listener.subscribe();
    listener.register_any_device(true, true);

    let device = SimulatedDevice::new(0x1234, 0x0001);
    usb.emit(DeviceState::Arrived, device);
    usb.emit(DeviceState::Left, device);
    usb.emit(DeviceState::Arrived, device);

    let stats = listener.stats();
    assert_eq!(stats.notifications, 3);
    assert_eq!(stats.dropped_notifications, 2);

    let kept = rx.recv().await.unwrap();
    assert_eq!(kept.state, DeviceState::Arrived);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_handlers_and_subscribers_see_same_stream() {
    let (usb, listener) = simulated_listener();
    let seen = common::record(&listener);
    let mut rx = listener.subscribe();
    listener.register_any_device(true, true);

    let device = SimulatedDevice::new(0xcafe, 0x0001);
    usb.emit(DeviceState::Arrived, device);
    usb.emit(DeviceState::Left, device);

    let mut from_channel = Vec::new();
    while let Ok(n) = rx.try_recv() {
        from_channel.push(n);
    }
    assert_eq!(from_channel, common::snapshot(&seen));
    assert_eq!(from_channel.len(), 2);
}

#[tokio::test]
async fn test_deregistered_listener_goes_quiet() {
    let (usb, listener) = simulated_listener();
    let mut rx = listener.subscribe();
    listener.register_any_device(true, true);
    listener.deregister_hotplug_callback();

    usb.emit(DeviceState::Arrived, SimulatedDevice::new(0x1234, 0x0001));

    let result = timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(result.is_err(), "no notification expected after deregistration");
}
