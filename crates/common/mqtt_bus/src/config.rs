use crate::BusError;
use crate::Message;
use crate::TopicFilter;
use std::time::Duration;

/// Configuration of an MQTT bus connection
///
/// The track-side broker is a plain mosquitto on the local network,
/// so there is no TLS nor credential configuration here.
#[derive(Debug, Clone)]
pub struct Config {
    /// MQTT host to connect to
    ///
    /// Default: "localhost"
    pub host: String,

    /// MQTT port to connect to
    ///
    /// Default: 1883
    pub port: u16,

    /// The session name to be used on connect
    ///
    /// If no session name is provided, a random one will be created on connect,
    /// and the session will be clean on connect.
    ///
    /// Default: None
    pub session_name: Option<String>,

    /// The list of topics to subscribe to on connect
    ///
    /// Default: An empty topic list
    pub subscriptions: TopicFilter,

    /// Clean the MQTT session upon connect if set to `true`.
    ///
    /// Default: `false`.
    pub clean_session: bool,

    /// Capacity of the internal message queues
    ///
    /// Default: `1024`.
    pub queue_capacity: usize,

    /// Maximum size for a message payload
    ///
    /// Default: `1024 * 1024`.
    pub max_packet_size: usize,

    /// How long to wait for the initial CONNACK before giving up
    ///
    /// Default: 5 seconds.
    pub connect_timeout: Duration,

    /// LastWill message for the mqtt client
    ///
    /// Default: None
    pub last_will_message: Option<Message>,
}

/// By default a client connects the local MQTT broker.
impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::from("localhost"),
            port: 1883,
            session_name: None,
            subscriptions: TopicFilter::empty(),
            clean_session: false,
            queue_capacity: 1024,
            max_packet_size: 1024 * 1024,
            connect_timeout: Duration::from_secs(5),
            last_will_message: None,
        }
    }
}

impl Config {
    /// Set a custom host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the broker from a `HOST:PORT` address, as given on a command line.
    ///
    /// A bare `HOST` defaults the port to 1883.
    pub fn with_broker_address(mut self, address: &str) -> Result<Self, BusError> {
        let invalid = || BusError::InvalidBrokerAddress {
            address: address.into(),
        };
        let (host, port) = match address.rsplit_once(':') {
            None => (address, 1883),
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        self.host = host.into();
        self.port = port;
        Ok(self)
    }

    /// Set a custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the session name
    pub fn with_session_name(self, name: impl Into<String>) -> Self {
        Self {
            session_name: Some(name.into()),
            ..self
        }
    }

    /// Unset the session name and clear the session
    pub fn with_no_session(self) -> Self {
        Self {
            session_name: None,
            clean_session: true,
            ..self
        }
    }

    /// Add a list of topics to subscribe to on connect
    ///
    /// Can be called several times to subscribe to many topics.
    pub fn with_subscriptions(mut self, topics: TopicFilter) -> Self {
        self.subscriptions.add_all(topics);
        self
    }

    /// Set the clean_session flag
    pub fn with_clean_session(self, flag: bool) -> Self {
        Self {
            clean_session: flag,
            ..self
        }
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(self, queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..self
        }
    }

    /// Set the maximum size for a message payload
    pub fn with_max_packet_size(self, max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            ..self
        }
    }

    /// Set the bound on the initial connect
    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// Set the last will message, this will be published when the mqtt connection gets closed.
    pub fn with_last_will_message(self, lwm: Message) -> Self {
        Self {
            last_will_message: Some(lwm),
            ..self
        }
    }

    /// Wrap this config into an internal set of options for `rumqttc`.
    pub(crate) fn rumqttc_options(&self) -> rumqttc::MqttOptions {
        let id = match &self.session_name {
            None => std::iter::repeat_with(fastrand::lowercase)
                .take(10)
                .collect(),
            Some(name) => name.clone(),
        };

        let mut mqtt_options = rumqttc::MqttOptions::new(id, &self.host, self.port);

        if self.session_name.is_none() {
            // There is no point to have a session with a random name that will not be reused.
            mqtt_options.set_clean_session(true);
        } else {
            mqtt_options.set_clean_session(self.clean_session);
        }

        mqtt_options.set_max_packet_size(self.max_packet_size, self.max_packet_size);

        if let Some(lwp) = &self.last_will_message {
            let last_will_message = rumqttc::LastWill {
                topic: lwp.topic.clone().into(),
                message: lwp.payload.clone().into(),
                qos: lwp.qos,
                retain: lwp.retain,
            };
            mqtt_options.set_last_will(last_will_message);
        }

        mqtt_options
    }
}
