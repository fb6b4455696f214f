//! Topic store actor
//!
//! A single task owns the `TopicTable` and applies commands received over a
//! channel, one at a time. That makes every scan-and-pop atomic with respect
//! to every other operation without any lock. `TopicStore` is the cheap,
//! cloneable handle sessions use to talk to it.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::broker::engine::TopicTable;
use crate::broker::message::Message;
use crate::utils::error::{BrokerError, Result};

/// Commands sent from sessions to the store task.
///
/// Each variant that expects a response carries a `oneshot::Sender` for the reply.
#[derive(Debug)]
pub enum StoreCommand {
    Reserve {
        topic: String,
        id: String,
        reply: oneshot::Sender<bool>,
    },
    Release {
        topic: String,
        id: String,
    },
    Enqueue {
        message: Arc<Message>,
        reply: oneshot::Sender<bool>,
    },
    TryDequeue {
        topics: Vec<String>,
        reply: oneshot::Sender<Option<Arc<Message>>>,
    },
    Requeue {
        topic: String,
        id: String,
        reply: Option<oneshot::Sender<bool>>,
    },
    Ack {
        topic: String,
        id: String,
        reply: oneshot::Sender<bool>,
    },
    PendingLen {
        topic: String,
        reply: oneshot::Sender<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct TopicStore {
    tx: mpsc::UnboundedSender<StoreCommand>,
}

impl TopicStore {
    /// Start the store task with `table` as its initial state.
    pub fn spawn(table: TopicTable) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(table, rx));
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| BrokerError::StoreClosed)?;
        rx.await.map_err(|_| BrokerError::StoreClosed)
    }

    /// Claim (topic, id) for a publish in progress. `false` means the id is already outstanding.
    pub async fn reserve(&self, topic: &str, id: &str) -> Result<bool> {
        self.request(|reply| StoreCommand::Reserve {
            topic: topic.to_string(),
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub fn release(&self, topic: &str, id: &str) {
        let _ = self.tx.send(StoreCommand::Release {
            topic: topic.to_string(),
            id: id.to_string(),
        });
    }

    pub async fn enqueue(&self, message: Arc<Message>) -> Result<bool> {
        self.request(|reply| StoreCommand::Enqueue { message, reply })
            .await
    }

    /// Pop the head of the first non-empty topic among `topics`, in order.
    /// The returned guard requeues the message unless it is acked.
    pub async fn try_dequeue(&self, topics: &[String]) -> Result<Option<InFlight>> {
        let popped = self
            .request(|reply| StoreCommand::TryDequeue {
                topics: topics.to_vec(),
                reply,
            })
            .await?;
        Ok(popped.map(|message| InFlight::new(self.clone(), message)))
    }

    /// Return an in-flight message to the front of its queue.
    pub async fn requeue(&self, topic: &str, id: &str) -> Result<bool> {
        self.request(|reply| StoreCommand::Requeue {
            topic: topic.to_string(),
            id: id.to_string(),
            reply: Some(reply),
        })
        .await
    }

    /// Drop an in-flight message for good. Unknown or queued ids are left alone.
    pub async fn ack(&self, topic: &str, id: &str) -> Result<bool> {
        self.request(|reply| StoreCommand::Ack {
            topic: topic.to_string(),
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn pending_len(&self, topic: &str) -> Result<usize> {
        self.request(|reply| StoreCommand::PendingLen {
            topic: topic.to_string(),
            reply,
        })
        .await
    }

    fn requeue_detached(&self, message: &Message) {
        let sent = self.tx.send(StoreCommand::Requeue {
            topic: message.topic.clone(),
            id: message.id.clone(),
            reply: None,
        });
        if sent.is_err() {
            warn!(topic = %message.topic, id = %message.id, "topic store closed; message stays on disk only");
        }
    }
}

async fn run(mut table: TopicTable, mut rx: mpsc::UnboundedReceiver<StoreCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            StoreCommand::Reserve { topic, id, reply } => {
                let _ = reply.send(table.reserve(&topic, &id));
            }
            StoreCommand::Release { topic, id } => {
                table.release(&topic, &id);
            }
            StoreCommand::Enqueue { message, reply } => {
                let _ = reply.send(table.enqueue(message));
            }
            StoreCommand::TryDequeue { topics, reply } => {
                let popped = table.try_dequeue(&topics);
                // the caller went away before it could take ownership
                if let Err(Some(message)) = reply.send(popped) {
                    table.requeue(&message.topic, &message.id);
                }
            }
            StoreCommand::Requeue { topic, id, reply } => {
                let requeued = table.requeue(&topic, &id);
                if let Some(reply) = reply {
                    let _ = reply.send(requeued);
                }
            }
            StoreCommand::Ack { topic, id, reply } => {
                let _ = reply.send(table.ack(&topic, &id));
            }
            StoreCommand::PendingLen { topic, reply } => {
                let _ = reply.send(table.pending_len(&topic));
            }
        }
    }
    debug!("topic store stopped");
}

/// A message popped for delivery.
///
/// Dropping the guard without calling [`InFlight::ack`] requeues the message,
/// so every exit path of a session (error, timeout, cancellation, panic) puts it back.
#[derive(Debug)]
pub struct InFlight {
    store: TopicStore,
    message: Arc<Message>,
    settled: bool,
}

impl InFlight {
    fn new(store: TopicStore, message: Arc<Message>) -> Self {
        Self {
            store,
            message,
            settled: false,
        }
    }

    pub fn message(&self) -> &Arc<Message> {
        &self.message
    }

    /// Finish the delivery. Call only after the durable record is gone.
    pub async fn ack(mut self) -> Result<bool> {
        self.settled = true;
        self.store.ack(&self.message.topic, &self.message.id).await
    }

    /// Put the message back at the front of its queue.
    pub fn requeue(mut self) {
        self.settled = true;
        self.store.requeue_detached(&self.message);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            self.store.requeue_detached(&self.message);
        }
    }
}
