use crate::BusError;
use crate::Config;
use crate::ErrChannel;
use crate::Message;
use crate::PubChannel;
use crate::SubChannel;
use crate::TopicFilter;
use futures::channel::mpsc;
use futures::channel::oneshot;
use futures::SinkExt;
use futures::StreamExt;
use log::error;
use log::info;
use rumqttc::AsyncClient;
use rumqttc::ConnectionError;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::Incoming;
use rumqttc::Outgoing;
use rumqttc::Packet;
use rumqttc::StateError;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tokio::time::timeout;

/// A connection to the MQTT bus
pub struct Connection {
    /// The channel of the input messages received by this connection.
    pub received: mpsc::UnboundedReceiver<Message>,

    /// The channel of the output messages to be published on this connection.
    pub published: mpsc::UnboundedSender<Message>,

    /// The channel of the error messages received by this connection.
    pub errors: mpsc::UnboundedReceiver<BusError>,

    /// A channel to notify that all the published messages have been actually published.
    pub pub_done: oneshot::Receiver<()>,

    handle: BusHandle,
}

/// A cloneable handle to subscribe and unsubscribe after connect.
///
/// Every filter installed through the handle joins the connection's
/// subscription registry, so it is re-installed on every reconnect.
#[derive(Clone)]
pub struct BusHandle {
    mqtt_client: AsyncClient,
    subscriptions: Arc<Mutex<TopicFilter>>,
}

impl BusHandle {
    /// Subscribe to additional topics on a live connection.
    pub async fn subscribe(&self, topics: TopicFilter) -> Result<(), BusError> {
        {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            subscriptions.add_all(topics.clone());
        }
        Connection::subscribe_to_topics(&self.mqtt_client, topics.filters()).await
    }

    /// Unsubscribe from a topic filter pattern.
    pub async fn unsubscribe(&self, pattern: &str) -> Result<(), BusError> {
        {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            subscriptions.remove(pattern);
        }
        self.mqtt_client
            .unsubscribe(pattern)
            .await
            .map_err(BusError::ClientError)
    }
}

impl Connection {
    /// The stream of events received from this MQTT connection and forwarded to the client
    pub fn sub_channel(&self) -> &impl SubChannel {
        &self.received
    }

    /// The stream of actions sent by the client to this MQTT connection
    pub fn pub_channel(&self) -> &impl PubChannel {
        &self.published
    }

    /// The stream of errors received from this MQTT connection and forwarded to the client
    pub fn err_channel(&self) -> &impl ErrChannel {
        &self.errors
    }

    /// A handle for dynamic subscriptions on this connection
    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }

    /// Establish a connection to the MQTT broker defined by the given `config`.
    ///
    /// The connection is associated to an MQTT session named after
    /// `config.session_name`, subscribing to `config.subscriptions`.
    /// Fails with [`BusError::ConnectTimeout`] if the broker does not
    /// accept the connection within `config.connect_timeout`.
    ///
    /// Once established, the connection is maintained: on any broker or
    /// network error the client reconnects with a bounded pause and
    /// re-installs all the subscriptions taken so far.
    pub async fn new(config: &Config) -> Result<Connection, BusError> {
        let (received_sender, received_receiver) = mpsc::unbounded();
        let (published_sender, published_receiver) = mpsc::unbounded();
        let (error_sender, error_receiver) = mpsc::unbounded();
        let (pub_done_sender, pub_done_receiver) = oneshot::channel();

        let subscriptions = Arc::new(Mutex::new(config.subscriptions.clone()));

        let (mqtt_client, event_loop) = timeout(
            config.connect_timeout,
            Connection::open(config, received_sender.clone()),
        )
        .await
        .map_err(|_| BusError::ConnectTimeout {
            timeout: config.connect_timeout,
        })??;

        let handle = BusHandle {
            mqtt_client: mqtt_client.clone(),
            subscriptions: subscriptions.clone(),
        };

        tokio::spawn(Connection::receiver_loop(
            mqtt_client.clone(),
            subscriptions,
            event_loop,
            received_sender,
            error_sender,
        ));
        tokio::spawn(Connection::sender_loop(
            mqtt_client,
            published_receiver,
            config.last_will_message.clone(),
            pub_done_sender,
        ));

        Ok(Connection {
            received: received_receiver,
            published: published_sender,
            errors: error_receiver,
            pub_done: pub_done_receiver,
            handle,
        })
    }

    /// Close the connection, flushing all the pending published messages.
    pub async fn close(self) {
        self.published.close_channel();
        let _ = self.pub_done.await;
    }

    async fn open(
        config: &Config,
        mut message_sender: mpsc::UnboundedSender<Message>,
    ) -> Result<(AsyncClient, EventLoop), BusError> {
        let mqtt_options = config.rumqttc_options();
        let (mqtt_client, mut event_loop) = AsyncClient::new(mqtt_options, config.queue_capacity);

        info!(
            "MQTT connecting to broker: host={}:{}, session_name={:?}",
            config.host, config.port, config.session_name
        );

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != rumqttc::ConnectReturnCode::Success {
                        error!("MQTT connection rejected: {:?}", ack.code);
                        Connection::do_pause().await;
                        continue;
                    }
                    info!("MQTT connection established");

                    let subscriptions = config.subscriptions.filters();

                    // Without any subscription, there is no SubAck to wait for.
                    if subscriptions.is_empty() {
                        break;
                    }

                    Connection::subscribe_to_topics(&mqtt_client, subscriptions).await?
                }

                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    break;
                }

                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    // Messages can be received before a sub ack
                    // Errors on send are ignored: it just means the client has closed the receiving channel.
                    let _ = message_sender.send(msg.into()).await;
                }

                Err(err) => {
                    error!(
                        "MQTT: failed to connect to broker at '{host}:{port}': {err}",
                        host = config.host,
                        port = config.port
                    );
                    if Connection::pause_on_error(&err) {
                        Connection::do_pause().await;
                    }
                }
                _ => (),
            }
        }

        Ok((mqtt_client, event_loop))
    }

    async fn receiver_loop(
        mqtt_client: AsyncClient,
        subscriptions: Arc<Mutex<TopicFilter>>,
        mut event_loop: EventLoop,
        mut message_sender: mpsc::UnboundedSender<Message>,
        mut error_sender: mpsc::UnboundedSender<BusError>,
    ) -> Result<(), BusError> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    // Errors on send are ignored: it just means the client has closed the receiving channel.
                    // One has to continue the loop though, because rumqttc relies on this polling.
                    let _ = message_sender.send(msg.into()).await;
                }

                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != rumqttc::ConnectReturnCode::Success {
                        error!("MQTT connection rejected: {:?}", ack.code);
                        continue;
                    }
                    info!("MQTT connection re-established");

                    // The broker might have dropped the session:
                    // the full subscription registry is re-installed.
                    let filters = { subscriptions.lock().unwrap().filters() };
                    if !filters.is_empty() {
                        Connection::subscribe_to_topics(&mqtt_client, filters).await?;
                    }
                }

                Ok(Event::Incoming(Incoming::Disconnect))
                | Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT connection closed");
                    break;
                }

                Err(err) => {
                    error!("MQTT connection error: {err}");
                    let delay = Connection::pause_on_error(&err);

                    // Errors on send are ignored: it just means the client has closed the receiving channel.
                    let _ = error_sender.send(err.into()).await;

                    if delay {
                        Connection::do_pause().await;
                    }
                }
                _ => (),
            }
        }
        // No more messages will be forwarded to the client
        let _ = message_sender.close().await;
        let _ = error_sender.close().await;
        Ok(())
    }

    async fn sender_loop(
        mqtt_client: AsyncClient,
        mut messages_receiver: mpsc::UnboundedReceiver<Message>,
        last_will: Option<Message>,
        done: oneshot::Sender<()>,
    ) {
        while let Some(message) = messages_receiver.next().await {
            let payload = Vec::from(message.payload_bytes());
            if let Err(err) = mqtt_client
                .publish(message.topic, message.qos, message.retain, payload)
                .await
            {
                error!("MQTT publish failed: {err}");
            }
        }

        // As the broker doesn't send the last will when the client disconnects gracefully
        // one has first to explicitly send the last will message.
        if let Some(last_will) = last_will {
            let payload = Vec::from(last_will.payload_bytes());
            let _ = mqtt_client
                .publish(last_will.topic, last_will.qos, last_will.retain, payload)
                .await;
        }
        let _ = mqtt_client.disconnect().await;
        let _ = done.send(());
    }

    pub(crate) fn pause_on_error(err: &ConnectionError) -> bool {
        matches!(
            err,
            rumqttc::ConnectionError::Io(_)
                | rumqttc::ConnectionError::MqttState(StateError::Io(_))
                | rumqttc::ConnectionError::MqttState(_)
        )
    }

    pub(crate) async fn do_pause() {
        sleep(Duration::from_secs(1)).await;
    }

    pub(crate) async fn subscribe_to_topics(
        mqtt_client: &AsyncClient,
        subscriptions: Vec<rumqttc::SubscribeFilter>,
    ) -> Result<(), BusError> {
        mqtt_client
            .subscribe_many(subscriptions)
            .await
            .map_err(BusError::ClientError)
    }
}
