//! Radio command dispatch against a fully wired node

mod common;

use common::{drain, node, radio, JoinScript};
use fieldnode_core::constants::{KEY_SAMPLING_INTERVAL, KEY_SSID};
use fieldnode_core::KeyValueStore;
use fieldnode_link::{
    Characteristic, CommandError, Notification, PublishOutcome, TelemetryPublisher,
    UpdateTransport,
};
use std::sync::Arc;

fn on(characteristic: Characteristic, payload: &str) -> Notification {
    Notification {
        characteristic,
        payload: payload.to_owned(),
    }
}

#[tokio::test]
async fn set_twice_leaves_relay_on_and_announces_both() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);

    dispatcher
        .handle_write(Characteristic::Relay, "SET_25_ON")
        .await
        .unwrap();
    dispatcher
        .handle_write(Characteristic::Relay, "SET_25_ON")
        .await
        .unwrap();

    let states = node.ctx.telemetry.relay_states().await.unwrap();
    assert_eq!(states, [true, false, false, false]);
    assert_eq!(node.store.get_bool("relay0").unwrap(), Some(true));

    let updates: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|n| n.payload.starts_with("RELAY_UPDATE"))
        .collect();
    assert_eq!(
        updates,
        vec![
            on(Characteristic::Relay, "RELAY_UPDATE:25:ON"),
            on(Characteristic::Relay, "RELAY_UPDATE:25:ON"),
        ]
    );
}

#[tokio::test]
async fn toggle_flips_state() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);

    dispatcher
        .handle_write(Characteristic::Relay, "TOGGLE_32")
        .await
        .unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![
            on(Characteristic::Relay, "LOG:Relay 32 toggled to ON"),
            on(Characteristic::Relay, "RELAY_UPDATE:32:ON"),
        ]
    );

    dispatcher
        .handle_write(Characteristic::Relay, "TOGGLE_32")
        .await
        .unwrap();
    let states = node.ctx.telemetry.relay_states().await.unwrap();
    assert!(!states[2]);
}

#[tokio::test]
async fn validation_errors_reply_on_arrival_channel() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);

    let err = dispatcher
        .handle_write(Characteristic::Wifi, "SET_99_ON")
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::InvalidPin("99".into()));

    dispatcher
        .handle_write(Characteristic::Relay, "SELECT_home")
        .await
        .unwrap_err();
    dispatcher
        .handle_write(Characteristic::Relay, "FLY")
        .await
        .unwrap_err();

    assert_eq!(
        drain(&mut rx),
        vec![
            on(Characteristic::Wifi, "ERROR:INVALID_PIN:99"),
            on(
                Characteristic::Relay,
                "ERROR:INVALID_WIFI_FORMAT:Missing colon separator"
            ),
            on(Characteristic::Relay, "ERROR:UNKNOWN_COMMAND:FLY"),
        ]
    );
    assert_eq!(
        node.ctx.telemetry.relay_states().await.unwrap(),
        [false; 4]
    );
}

#[tokio::test]
async fn relay_output_fault_is_reported() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);
    node.outputs[0].break_output();

    let err = dispatcher
        .handle_write(Characteristic::Relay, "TOGGLE_25")
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::RelayFault { pin: 25 });
    assert_eq!(
        drain(&mut rx),
        vec![on(Characteristic::Relay, "ERROR:RELAY_FAULT:25")]
    );
    assert!(!node.ctx.telemetry.relay_states().await.unwrap()[0]);
}

#[tokio::test]
async fn sampling_rate_is_validated_and_persisted() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);

    dispatcher
        .handle_write(Characteristic::Relay, "SET_SAMPLING_RATE_4")
        .await
        .unwrap_err();
    dispatcher
        .handle_write(Characteristic::Relay, "SET_SAMPLING_RATE_250")
        .await
        .unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            on(
                Characteristic::Relay,
                "ERROR:INVALID_SAMPLING_RATE:Value must be between 5-1000"
            ),
            on(Characteristic::Relay, "SAMPLING_RATE:250"),
        ]
    );
    assert_eq!(node.ctx.sampling.millis(), 250);
    assert_eq!(node.store.get_u32(KEY_SAMPLING_INTERVAL).unwrap(), Some(250));
}

#[tokio::test]
async fn rejected_handshake_refuses_commands_until_reconnect() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);
    dispatcher.on_connect();
    drain(&mut rx);

    assert!(dispatcher.handshake("2.0.0").is_err());
    assert_eq!(
        drain(&mut rx),
        vec![on(
            Characteristic::Relay,
            "ERROR:INCOMPATIBLE_VERSION:Major version mismatch"
        )]
    );

    dispatcher
        .handle_write(Characteristic::Relay, "SET_25_ON")
        .await
        .unwrap_err();
    assert!(!node.ctx.telemetry.relay_states().await.unwrap()[0]);

    dispatcher.on_disconnect();
    dispatcher.on_connect();
    assert!(dispatcher.handshake("1.1.7").is_ok());
    dispatcher
        .handle_write(Characteristic::Relay, "SET_25_ON")
        .await
        .unwrap();
    assert!(node.ctx.telemetry.relay_states().await.unwrap()[0]);
}

#[tokio::test]
async fn connect_announces_protocol_version() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);
    dispatcher.on_connect();
    assert_eq!(
        drain(&mut rx),
        vec![on(
            Characteristic::Data,
            r#"{"protocol_version":"1.2.0","device_name":"TestNode"}"#
        )]
    );
}

#[tokio::test]
async fn scan_lists_networks() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);

    dispatcher
        .handle_write(Characteristic::Wifi, "SCAN")
        .await
        .unwrap();
    node.network.set_scan(&[("home", -40), ("lab", -71)]);
    dispatcher
        .handle_write(Characteristic::Wifi, "SCAN")
        .await
        .unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            on(Characteristic::Wifi, "No networks found"),
            on(Characteristic::Wifi, "home(-40),lab(-71)"),
        ]
    );
}

#[tokio::test]
async fn select_joins_and_persists_credentials() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);

    dispatcher
        .handle_write(Characteristic::Wifi, "SELECT_home:s3cret:x")
        .await
        .unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![on(Characteristic::Wifi, "WIFI_STATUS:CONNECTED:home:-55")]
    );
    assert_eq!(
        node.network.joins(),
        vec![("home".to_owned(), "s3cret:x".to_owned())]
    );
    assert_eq!(node.store.get_string(KEY_SSID).unwrap(), Some("home".into()));
    assert!(node.updates.is_armed());
}

#[tokio::test]
async fn failed_select_reports_both_lines() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);
    node.network.script_join(JoinScript::Fail);

    dispatcher
        .handle_write(Characteristic::Wifi, "SELECT_home:pw")
        .await
        .unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            on(Characteristic::Wifi, "ERROR:WIFI:CONNECT_FAIL:home"),
            on(Characteristic::Wifi, "WIFI_STATUS:FAILED:home"),
        ]
    );
    assert_eq!(node.store.get_string(KEY_SSID).unwrap(), None);
    assert!(!node.updates.is_armed());
}

#[tokio::test(start_paused = true)]
async fn hanging_join_is_bounded() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);
    node.network.script_join(JoinScript::Hang);

    let started = tokio::time::Instant::now();
    dispatcher
        .handle_write(Characteristic::Wifi, "SELECT_slow:pw")
        .await
        .unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_secs(10));
    assert!(started.elapsed() < std::time::Duration::from_secs(11));
    assert_eq!(
        drain(&mut rx).last(),
        Some(&on(Characteristic::Wifi, "WIFI_STATUS:FAILED:slow"))
    );
}

#[tokio::test(start_paused = true)]
async fn calibrate_sets_offsets() {
    let node = node(120, -40);
    let (dispatcher, mut rx) = radio(&node);

    dispatcher
        .handle_write(Characteristic::Relay, "CALIBRATE")
        .await
        .unwrap();

    assert_eq!(node.ctx.primary.offset(), 120.0);
    assert_eq!(node.ctx.secondary.offset(), -40.0);
    assert_eq!(node.ctx.primary.read_calibrated().await, 0.0);
    assert_eq!(
        drain(&mut rx),
        vec![on(Characteristic::Relay, "LOG:Calibration complete")]
    );
}

#[tokio::test(start_paused = true)]
async fn calibrate_reports_lost_channel() {
    let node = node(120, -40);
    let (dispatcher, mut rx) = radio(&node);

    node.primary.fail(true);
    let result = dispatcher.handle_write(Characteristic::Relay, "CALIBRATE").await;

    assert_eq!(result, Err(CommandError::CalibrationFailed("1".into())));
    assert_eq!(node.ctx.primary.offset(), 0.0);
    assert_eq!(node.ctx.secondary.offset(), -40.0);
    assert_eq!(
        drain(&mut rx),
        vec![on(Characteristic::Relay, "ERROR:CALIBRATION_FAILED:1")]
    );
}

#[tokio::test]
async fn held_telemetry_lock_skips_the_frame() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);
    let publisher = TelemetryPublisher::new(dispatcher.clone(), Arc::new(node.clock.clone()));
    dispatcher.on_connect();
    drain(&mut rx);

    let guard = node.ctx.telemetry.try_lock().await.unwrap();
    assert_eq!(publisher.publish_once().await, PublishOutcome::Busy);
    drop(guard);
    assert!(drain(&mut rx).is_empty());

    assert_eq!(publisher.publish_once().await, PublishOutcome::Sent);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn ota_arms_update_transport() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);

    dispatcher
        .handle_write(Characteristic::Relay, "OTA")
        .await
        .unwrap();
    assert!(node.updates.is_armed());
    assert_eq!(drain(&mut rx), vec![on(Characteristic::Relay, "OTA:START")]);
}

#[tokio::test]
async fn telemetry_is_rate_limited_and_needs_a_client() {
    let node = node(0, 0);
    let (dispatcher, mut rx) = radio(&node);
    let publisher = TelemetryPublisher::new(dispatcher.clone(), Arc::new(node.clock.clone()));

    assert_eq!(publisher.publish_once().await, PublishOutcome::NotConnected);

    dispatcher.on_connect();
    drain(&mut rx);

    node.clock.set(1_000);
    assert_eq!(publisher.publish_once().await, PublishOutcome::Sent);
    node.clock.advance(40);
    assert_eq!(publisher.publish_once().await, PublishOutcome::RateLimited);
    node.clock.advance(60);
    assert_eq!(publisher.publish_once().await, PublishOutcome::Sent);

    // A tick that fired a little late does not cost the next frame
    node.clock.advance(93);
    assert_eq!(publisher.publish_once().await, PublishOutcome::Sent);
    node.clock.advance(89);
    assert_eq!(publisher.publish_once().await, PublishOutcome::RateLimited);

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 3);
    assert!(frames
        .iter()
        .all(|n| n.characteristic == Characteristic::Data));
    assert!(frames[0].payload.contains(r#""timestamp":1000"#));
}
