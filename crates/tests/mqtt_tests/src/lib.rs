mod test_mqtt_client;
pub mod test_mqtt_server;
pub mod with_timeout;

pub use futures::SinkExt;
pub use futures::StreamExt;
pub use test_mqtt_client::assert_received;
pub use test_mqtt_client::assert_received_all_expected;
pub use test_mqtt_client::publish;
pub use test_mqtt_server::test_mqtt_broker;
