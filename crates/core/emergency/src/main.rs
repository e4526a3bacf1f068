use anki_api::relay::BRIDGE_GRACE;
use anki_api::CallerId;
use clap::Parser;
use emergency::Mediator;
use mqtt_bus::Connection;
use mqtt_bus::QoS;
use tokio::sync::watch;
use tracing::info;

/// Relay remote-control traffic to the vehicles, with an emergency
/// stop override that silences everything.
#[derive(Debug, Parser)]
#[command(name = "hyperdrive-emergency", version, about)]
struct EmergencyOpt {
    /// MQTT broker address (HOST:PORT)
    #[arg(long, default_value = "10.42.0.1:1883")]
    broker: String,

    /// Client id; a random UUID when empty
    #[arg(long, default_value = "")]
    id: String,

    /// MQTT quality of service
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    qos: u8,

    /// Log everything, including trace messages
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn qos_from(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

async fn shutdown_signal() {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => (),
                _ = sigterm.recv() => (),
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = EmergencyOpt::parse();
    init_tracing(opt.debug);

    let caller = if opt.id.is_empty() {
        CallerId::random()
    } else {
        CallerId::new(&opt.id)
    };
    info!("Mediating as {caller}");

    let config = mqtt_bus::Config::default()
        .with_broker_address(&opt.broker)?
        .with_session_name(caller.as_str())
        .with_subscriptions(emergency::subscriptions().with_qos(qos_from(opt.qos)));
    let connection = Connection::new(&config).await?;
    let received = connection.received;
    let published = connection.published;
    let pub_done = connection.pub_done;

    let (shutdown_sender, shutdown) = watch::channel(());
    let mediator = Mediator {
        caller,
        qos: qos_from(opt.qos),
        grace: BRIDGE_GRACE,
        received,
        output: published.clone(),
        shutdown,
    };
    let task = tokio::spawn(mediator.run());

    shutdown_signal().await;
    info!("Shutting down");
    let _ = shutdown_sender.send(());
    let _ = task.await;

    published.close_channel();
    let _ = pub_done.await;
    Ok(())
}
