use crate::*;
use serial_test::serial;
use std::convert::TryInto;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(1000);

fn message(t: &str, p: &str) -> Message {
    let topic = Topic::new(t).expect("a valid topic");
    let payload = p.as_bytes();
    Message::new(&topic, payload)
}

async fn next_message(received: &mut UnboundedReceiver<Message>) -> Option<Message> {
    tokio::time::timeout(TIMEOUT, received.next()).await.ok()?
}

#[tokio::test]
#[serial]
async fn subscribing_to_messages() -> Result<(), anyhow::Error> {
    // Given an MQTT broker
    let broker = mqtt_tests::test_mqtt_broker();
    let config = Config::default().with_port(broker.port);

    // A client subscribes to a topic on connect
    let topic = "bus/test/topic";
    let config = config
        .with_session_name("subscribing_to_messages")
        .with_subscriptions(topic.try_into()?);
    let mut con = Connection::new(&config).await?;

    // Any messages published on that topic ...
    broker.publish(topic, "msg 1").await?;
    broker.publish(topic, "msg 2").await?;
    broker.publish(topic, "msg 3").await?;

    // ... must be received by the client
    assert_eq!(
        Some(message(topic, "msg 1")),
        next_message(&mut con.received).await
    );
    assert_eq!(
        Some(message(topic, "msg 2")),
        next_message(&mut con.received).await
    );
    assert_eq!(
        Some(message(topic, "msg 3")),
        next_message(&mut con.received).await
    );

    Ok(())
}

#[tokio::test]
#[serial]
async fn publishing_messages() -> Result<(), anyhow::Error> {
    // Given an MQTT broker
    let broker = mqtt_tests::test_mqtt_broker();
    let config = Config::default().with_port(broker.port);

    let mut all_messages = broker.messages_published_on("bus/out/#").await;

    // A client that only publishes subscribes to no topics
    let con = Connection::new(&config).await?;

    // Then all messages produced on the `con.published` channel
    con.published
        .unbounded_send(message("bus/out/foo", "foo payload"))?;
    con.published
        .unbounded_send(message("bus/out/foo", "again a foo payload"))?;
    con.published
        .unbounded_send(message("bus/out/bar", "bar payload"))?;

    // ... must be actually published
    mqtt_tests::assert_received(
        &mut all_messages,
        TIMEOUT,
        vec!["foo payload", "again a foo payload", "bar payload"],
    )
    .await;

    con.close().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn subscribing_after_connect() -> Result<(), anyhow::Error> {
    // Given an MQTT broker
    let broker = mqtt_tests::test_mqtt_broker();
    let config = Config::default().with_port(broker.port);

    // A client connects without any subscription
    let mut con = Connection::new(&config).await?;

    // A topic filter can be installed later, e.g. once a vehicle has been discovered
    let handle = con.handle();
    handle
        .subscribe(TopicFilter::new_unchecked("bus/late/+"))
        .await?;

    // Give the broker a beat to process the SUBSCRIBE
    tokio::time::sleep(Duration::from_millis(100)).await;

    broker.publish("bus/late/topic", "late msg").await?;
    assert_eq!(
        Some(message("bus/late/topic", "late msg")),
        next_message(&mut con.received).await
    );

    Ok(())
}

#[tokio::test]
async fn initial_connect_is_bounded() {
    // No broker listens on this port
    let config = Config::default()
        .with_port(1)
        .with_connect_timeout(Duration::from_millis(200));

    let error = Connection::new(&config)
        .await
        .err()
        .expect("the connect must fail");
    assert!(matches!(error, BusError::ConnectTimeout { .. }));
}
