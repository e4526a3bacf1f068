use crate::Message;
use crate::TopicFilter;
use futures::Stream;
use futures::StreamExt;
use log::debug;
use tokio::sync::mpsc;

/// Fan a connection's `received` stream out to per-task queues.
///
/// Subscription handlers must stay cheap: the dispatcher only matches
/// topics and forwards, every consumer owns its state behind a queue.
/// A message matching several routes is delivered to each of them, in
/// registration order (broker order is preserved per route).
#[derive(Default)]
pub struct Dispatcher {
    routes: Vec<(TopicFilter, mpsc::UnboundedSender<Message>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher { routes: Vec::new() }
    }

    /// Register a route and get the queue its messages will land on.
    pub fn route(&mut self, filter: TopicFilter) -> mpsc::UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes.push((filter, sender));
        receiver
    }

    /// Drain the input stream until it closes, forwarding each message
    /// to every matching route. Routes whose receiver has been dropped
    /// are skipped silently.
    pub async fn run(self, mut input: impl Stream<Item = Message> + Unpin) {
        while let Some(message) = input.next().await {
            let mut routed = false;
            for (filter, queue) in &self.routes {
                if filter.accept(&message) {
                    routed = true;
                    let _ = queue.send(message.clone());
                }
            }
            if !routed {
                debug!("No route for message on {}", message.topic.name);
            }
        }
    }
}
