//! The mediator against a real broker.

use anki_api::CallerId;
use emergency::Mediator;
use mqtt_bus::Connection;
use mqtt_bus::QoS;
use serial_test::serial;
use std::time::Duration;
use tokio::sync::watch;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
#[serial]
async fn mirrors_disarmed_and_stops_on_arming() -> Result<(), anyhow::Error> {
    let broker = mqtt_tests::test_mqtt_broker();

    let config = mqtt_bus::Config::default()
        .with_port(broker.port)
        .with_session_name("mediator_under_test")
        .with_subscriptions(emergency::subscriptions());
    let connection = Connection::new(&config).await?;

    let (_shutdown_tx, shutdown) = watch::channel(());
    let mediator = Mediator {
        caller: CallerId::new("it"),
        qos: QoS::AtLeastOnce,
        grace: Duration::from_millis(200),
        received: connection.received,
        output: connection.published.clone(),
        shutdown,
    };
    tokio::spawn(mediator.run());

    let mut mediated = broker
        .messages_published_on("Emergency/U/E/mediate/#")
        .await;
    let mut stops = broker.messages_published_on("Emergency/U/E/stop").await;

    // Disarmed: remote-control traffic is mirrored (once the bridge grace passed)
    broker
        .publish(
            "RemoteControl/U/E/vehicles/V1/speed",
            r#"{"velocity": 300, "acceleration": 500}"#,
        )
        .await?;
    mqtt_tests::assert_received(
        &mut mediated,
        TIMEOUT,
        vec![r#"{"velocity": 300, "acceleration": 500}"#],
    )
    .await;

    // Armed: one stop override, and the mirror goes silent
    broker.publish("Emergency/U/I/arm", r#"{"value": true}"#).await?;
    mqtt_tests::assert_received(
        &mut stops,
        TIMEOUT,
        vec![r#"{"velocity":0,"acceleration":1000}"#],
    )
    .await;

    broker
        .publish(
            "RemoteControl/U/E/vehicles/V1/speed",
            r#"{"velocity": 999, "acceleration": 500}"#,
        )
        .await?;

    // Disarmed again: the next mirrored message is the fresh one,
    // proving the armed-time command was dropped
    broker.publish("Emergency/U/I/arm", r#"{"value": false}"#).await?;
    broker
        .publish(
            "RemoteControl/U/E/vehicles/V1/speed",
            r#"{"velocity": 400, "acceleration": 500}"#,
        )
        .await?;
    mqtt_tests::assert_received(
        &mut mediated,
        TIMEOUT,
        vec![r#"{"velocity": 400, "acceleration": 500}"#],
    )
    .await;

    Ok(())
}
