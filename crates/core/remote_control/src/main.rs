use anki_api::CallerId;
use clap::Parser;
use mqtt_bus::Connection;
use mqtt_bus::Dispatcher;
use mqtt_bus::QoS;
use mqtt_bus::TopicFilter;
use remote_control::discover_vehicles;
use remote_control::register_vehicle;
use remote_control::DiscoverConfig;
use remote_control::VehicleHandle;
use std::time::Duration;
use tracing::info;
use tracing::warn;

/// Discover the vehicles of an Anki gateway and wire the
/// remote-control topics to them.
#[derive(Debug, Parser)]
#[command(name = "hyperdrive-remote", version, about)]
struct RemoteOpt {
    /// MQTT broker address (HOST:PORT)
    #[arg(long, default_value = "10.42.0.1:1883")]
    broker: String,

    /// Client id; a random UUID when empty
    #[arg(long, default_value = "")]
    id: String,

    /// MQTT quality of service
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    qos: u8,

    /// The gateway host to scan
    #[arg(long, default_value = "hyperdrive")]
    host: String,

    /// How many seconds to collect discovered vehicles
    #[arg(long, default_value_t = 2)]
    window: u64,

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
    let opt = RemoteOpt::parse();
    init_tracing(opt.debug);

    let caller = if opt.id.is_empty() {
        CallerId::random()
    } else {
        CallerId::new(&opt.id)
    };
    let discover_config = DiscoverConfig {
        host: anki_api::topics::Host::new(&opt.host)?,
        window: Duration::from_secs(opt.window),
        ..DiscoverConfig::default()
    };

    let mut subscriptions = discover_config.host.vehicle_discovered_filter();
    subscriptions.add_unchecked("Anki/Hosts/U/+/S/DIT/+");
    subscriptions.add_unchecked("Anki/Vehicles/U/+/S/DIT/+");
    let subscriptions = subscriptions.with_qos(qos_from(opt.qos));

    let config = mqtt_bus::Config::default()
        .with_broker_address(&opt.broker)?
        .with_session_name(caller.as_str())
        .with_subscriptions(subscriptions);
    let connection = Connection::new(&config).await?;
    let received = connection.received;
    let mut published = connection.published;
    let pub_done = connection.pub_done;

    let mut dispatcher = Dispatcher::new();
    let mut discovered = dispatcher.route(discover_config.host.vehicle_discovered_filter());
    let mut host_dit = dispatcher.route(TopicFilter::new_unchecked("Anki/Hosts/U/+/S/DIT/+"));
    let mut vehicle_dit = dispatcher.route(TopicFilter::new_unchecked("Anki/Vehicles/U/+/S/DIT/+"));
    tokio::spawn(dispatcher.run(received));

    let records = discover_vehicles(
        &mut published,
        &mut discovered,
        &mut host_dit,
        &discover_config,
    )
    .await?;
    if records.is_empty() {
        warn!("No vehicle discovered");
    }

    let mut handles = Vec::new();
    for record in &records {
        info!(
            "Registering vehicle {} ({})",
            record.id,
            record.model.as_deref().unwrap_or("unknown model")
        );
        register_vehicle(
            &mut published,
            &mut vehicle_dit,
            &record.id,
            &caller,
            discover_config.grace,
        )
        .await?;

        let mut handle = VehicleHandle::new(record.id.clone(), published.clone())
            .with_qos(qos_from(opt.qos));
        handle.connect(true).await?;
        handles.push(handle);
    }

    info!(
        "{} vehicle(s) wired to the remote-control surface",
        handles.len()
    );
    shutdown_signal().await;
    info!("Shutting down");

    for handle in &mut handles {
        let _ = handle.connect(false).await;
    }
    published.close_channel();
    let _ = pub_done.await;
    Ok(())
}
