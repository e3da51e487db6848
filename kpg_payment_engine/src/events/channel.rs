//! Fan-in channel between the payment flow and a single subscriber hook.
//!
//! The flow publishes into an [`EventProducer`]; the matching [`EventHandler`] runs the hook for every event on its
//! own task. Hooks only ever see the event, never the store.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    hook: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, hook: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { receiver, sender, hook }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer { sender: self.sender.clone() }
    }

    /// Runs the hook for each event until the last producer is dropped. Returns once every hook call has finished.
    pub async fn start_handler(self) {
        let Self { mut receiver, sender, hook } = self;
        // Only producers keep the channel open from here on
        drop(sender);
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(event) => {
                        in_flight.spawn((hook)(event));
                    },
                    None => break,
                },
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => log_hook_result(result),
            }
        }
        trace!("📬️ All producers are gone. Waiting for {} hook calls", in_flight.len());
        while let Some(result) = in_flight.join_next().await {
            log_hook_result(result);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_hook_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("📬️ An event hook panicked. {e}");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    /// Publishing never fails. If the handler has gone away the event is dropped and the failure is logged.
    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            warn!("📬️ Event hook is no longer listening. Event dropped");
        }
    }
}
