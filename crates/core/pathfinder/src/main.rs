use anki_api::topics::PathfindTopics;
use anki_api::topics::Vehicle;
use anki_api::CallerId;
use clap::Parser;
use mqtt_bus::Connection;
use mqtt_bus::Dispatcher;
use mqtt_bus::QoS;
use mqtt_bus::TopicFilter;
use pathfinder::actuator::LaneActuator;
use pathfinder::estimator::Estimator;
use pathfinder::estimator::DEFAULT_PREDICTION_TIMEOUT;
use pathfinder::planner::Planner;
use pathfinder::turn::TurnDecider;
use pathfinder::TrackGraph;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Track a vehicle on the tiled racetrack and steer it to the
/// operator's target tile.
#[derive(Debug, Parser)]
#[command(name = "hyperdrive-pathfind", version, about)]
struct PathfindOpt {
    /// MQTT broker address (HOST:PORT)
    #[arg(long, default_value = "10.42.0.1:1883")]
    broker: String,

    /// Client id; a random UUID when empty
    #[arg(long, default_value = "")]
    id: String,

    /// MQTT quality of service
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    qos: u8,

    /// Track description file
    #[arg(long, default_value = "assets/track.yml")]
    track: PathBuf,

    /// Topic namespace shared with the UI
    #[arg(long, default_value = "hyperdrive")]
    ns: String,

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
    let opt = PathfindOpt::parse();
    init_tracing(opt.debug);

    let caller = if opt.id.is_empty() {
        CallerId::random()
    } else {
        CallerId::new(&opt.id)
    };
    let graph = Arc::new(TrackGraph::load(&opt.track)?);
    info!(
        "Loaded track graph from {:?}: {} nodes",
        opt.track,
        graph.node_count()
    );
    let topics = PathfindTopics::new(&opt.ns)?;

    let mut subscriptions = TopicFilter::empty();
    for topic in [
        topics.vehicle_id_topic(),
        topics.target_topic(),
        topics.position_topic(),
        topics.next_step_topic(),
        topics.instruction_topic(),
    ] {
        subscriptions.add_unchecked(&topic.name);
    }
    subscriptions.add_all(Vehicle::track_event_filter_any());
    let subscriptions = subscriptions.with_qos(qos_from(opt.qos));

    let config = mqtt_bus::Config::default()
        .with_broker_address(&opt.broker)?
        .with_session_name(caller.as_str())
        .with_subscriptions(subscriptions);
    let connection = Connection::new(&config).await?;
    let received = connection.received;
    let published = connection.published;
    let pub_done = connection.pub_done;

    let mut dispatcher = Dispatcher::new();
    let estimator_vehicle_ids = dispatcher.route(topics.vehicle_id_topic().filter());
    let decider_vehicle_ids = dispatcher.route(topics.vehicle_id_topic().filter());
    let track_events = dispatcher.route(Vehicle::track_event_filter_any());
    let targets = dispatcher.route(topics.target_topic().filter());
    let planner_positions = dispatcher.route(topics.position_topic().filter());
    let decider_positions = dispatcher.route(topics.position_topic().filter());
    let next_steps = dispatcher.route(topics.next_step_topic().filter());
    let instructions = dispatcher.route(topics.instruction_topic().filter());
    tokio::spawn(dispatcher.run(received));

    let (shutdown_sender, shutdown) = watch::channel(());

    let estimator = Estimator {
        graph: graph.clone(),
        topics: topics.clone(),
        vehicle_ids: estimator_vehicle_ids,
        track_events,
        output: published.clone(),
        shutdown: shutdown.clone(),
        prediction_timeout: DEFAULT_PREDICTION_TIMEOUT,
    };
    let planner = Planner {
        graph,
        topics: topics.clone(),
        targets,
        positions: planner_positions,
        output: published.clone(),
        shutdown: shutdown.clone(),
    };
    let decider = TurnDecider {
        topics,
        vehicle_ids: decider_vehicle_ids,
        next_steps,
        positions: decider_positions,
        output: published.clone(),
        shutdown: shutdown.clone(),
    };
    let actuator = LaneActuator {
        instructions,
        output: published.clone(),
        shutdown,
    };

    let tasks = vec![
        tokio::spawn(estimator.run()),
        tokio::spawn(planner.run()),
        tokio::spawn(decider.run()),
        tokio::spawn(actuator.run()),
    ];

    shutdown_signal().await;
    info!("Shutting down");
    let _ = shutdown_sender.send(());
    for task in tasks {
        let _ = task.await;
    }

    // The bus is disconnected last, once every task has stopped publishing
    published.close_channel();
    let _ = pub_done.await;
    Ok(())
}
