//! Per-connection protocol state machine
//!
//! ```text
//! AwaitingFrame --publish--> Publishing --> AwaitingFrame
//! AwaitingFrame --pull-----> Pulling --empty--> AwaitingFrame
//!                                    --found--> AwaitingAck --> AwaitingFrame
//! any state --end of stream / connection error--> Closed
//! ```
//!
//! A bad frame is answered with an error frame and never closes the connection.
//! The wait for a delivery ack is bounded; every outcome other than a success
//! ack for the delivered id requeues the message.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::message::Message;
use crate::broker::store::{InFlight, TopicStore};
use crate::persistence::DurableLog;
use crate::transport::message::{ClientFrame, Delivery, PublishFrame, ServerFrame};
use crate::utils::error::{BrokerError, FrameError, Result};

/// Shared pieces every session needs.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub store: TopicStore,
    pub log: DurableLog,
    pub ack_timeout: Duration,
    pub max_frame_bytes: usize,
    /// Cancelled when the server stops accepting; idle sessions close.
    pub shutdown: CancellationToken,
    /// Cancelled after the shutdown grace period; ack waits give up and requeue.
    pub abort: CancellationToken,
}

/// What became of one delivery.
#[derive(Debug)]
enum AckOutcome {
    Acked,
    Nacked(String),
    WrongId(String),
    Rejected(FrameError),
    TimedOut,
    Cancelled,
    Disconnected(Option<io::Error>),
}

/// Whether the session keeps reading after a step.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    AwaitFrame,
    Close,
}

pub struct Session<S> {
    frames: Framed<S, LinesCodec>,
    ctx: SessionContext,
    /// `Framed` yields one `None` after a decode error before it reads again.
    decode_errored: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, ctx: SessionContext) -> Self {
        let codec = LinesCodec::new_with_max_length(ctx.max_frame_bytes);
        Self {
            frames: Framed::new(stream, codec),
            ctx,
            decode_errored: false,
        }
    }

    /// Serve frames until the peer goes away or the server shuts down.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => {
                    debug!("closing idle session for shutdown");
                    return Ok(());
                }
                next = self.frames.next() => next,
            };

            let line = match next {
                None if std::mem::take(&mut self.decode_errored) => continue,
                None => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
                Some(Ok(line)) => line,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    self.decode_errored = true;
                    let err = FrameError::TooLong(self.ctx.max_frame_bytes);
                    self.send(ServerFrame::error(err)).await?;
                    continue;
                }
                Some(Err(LinesCodecError::Io(e))) if e.kind() == io::ErrorKind::InvalidData => {
                    // the codec already dropped the offending line
                    self.decode_errored = true;
                    self.send(ServerFrame::error(FrameError::InvalidUtf8)).await?;
                    continue;
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(BrokerError::Connection(e)),
            };

            if line.trim().is_empty() {
                continue;
            }

            let step = match ClientFrame::decode(&line) {
                Ok(ClientFrame::Publish(frame)) => self.publish(frame).await?,
                Ok(ClientFrame::Pull(topics)) => self.pull(&topics).await?,
                Ok(ClientFrame::DeliveryAck(ack)) => {
                    // nothing is awaiting an ack on this session
                    debug!(id = %ack.id, code = %ack.code, "ignoring delivery ack with no delivery pending");
                    Next::AwaitFrame
                }
                Err(err) => {
                    debug!(error = %err, "rejected frame");
                    self.send(ServerFrame::error(err)).await?;
                    Next::AwaitFrame
                }
            };

            if step == Next::Close {
                return Ok(());
            }
        }
    }

    /// Reserve the id, persist, enqueue, then ack the publisher.
    async fn publish(&mut self, frame: PublishFrame) -> Result<Next> {
        let PublishFrame { topic, id, payload } = frame;

        if !self.ctx.store.reserve(&topic, &id).await? {
            let err = BrokerError::DuplicateId {
                topic: topic.clone(),
                id: id.clone(),
            };
            warn!(%topic, %id, "rejected publish with an outstanding id");
            self.send(ServerFrame::error(err)).await?;
            return Ok(Next::AwaitFrame);
        }

        let message = Message::new(topic, id, self.ctx.log.next_sequence(), payload);
        if let Err(err) = self.ctx.log.write(&message).await {
            warn!(topic = %message.topic, id = %message.id, error = %err, "failed to persist publish");
            self.ctx.store.release(&message.topic, &message.id);
            self.send(ServerFrame::error(err)).await?;
            return Ok(Next::AwaitFrame);
        }

        let message = Arc::new(message);
        if !self.ctx.store.enqueue(message.clone()).await? {
            // reservation guarantees this cannot happen; keep the record for recovery
            warn!(topic = %message.topic, id = %message.id, "enqueue refused a reserved id");
        }

        info!(topic = %message.topic, id = %message.id, "published");
        self.send(ServerFrame::PublishAck {
            id: message.id.clone(),
        })
        .await?;
        Ok(Next::AwaitFrame)
    }

    async fn pull(&mut self, topics: &[String]) -> Result<Next> {
        let Some(in_flight) = self.ctx.store.try_dequeue(topics).await? else {
            self.send(ServerFrame::Empty).await?;
            return Ok(Next::AwaitFrame);
        };

        let delivery = Delivery::from(in_flight.message().as_ref());
        debug!(topic = %delivery.topic, id = %delivery.id, "delivering");
        // on a send failure the guard requeues as it drops
        self.send(ServerFrame::Delivery(delivery)).await?;

        let outcome = self.await_ack(&in_flight.message().id).await;
        self.settle(in_flight, outcome).await
    }

    async fn await_ack(&mut self, id: &str) -> AckOutcome {
        let read = tokio::time::timeout(self.ctx.ack_timeout, self.frames.next());
        let next = tokio::select! {
            biased;
            _ = self.ctx.abort.cancelled() => return AckOutcome::Cancelled,
            read = read => match read {
                Err(_) => return AckOutcome::TimedOut,
                Ok(next) => next,
            },
        };

        match next {
            None => AckOutcome::Disconnected(None),
            Some(Err(LinesCodecError::Io(e))) if e.kind() == io::ErrorKind::InvalidData => {
                self.decode_errored = true;
                AckOutcome::Rejected(FrameError::InvalidUtf8)
            }
            Some(Err(LinesCodecError::Io(e))) => AckOutcome::Disconnected(Some(e)),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                self.decode_errored = true;
                AckOutcome::Rejected(FrameError::TooLong(self.ctx.max_frame_bytes))
            }
            Some(Ok(line)) => match ClientFrame::decode(&line) {
                Ok(ClientFrame::DeliveryAck(ack)) => {
                    if ack.id != id {
                        AckOutcome::WrongId(ack.id)
                    } else if ack.is_success() {
                        AckOutcome::Acked
                    } else {
                        AckOutcome::Nacked(ack.code)
                    }
                }
                Ok(_) => AckOutcome::Rejected(FrameError::ProtocolViolation(
                    "expected a delivery ack".to_string(),
                )),
                Err(err) => AckOutcome::Rejected(err),
            },
        }
    }

    async fn settle(&mut self, in_flight: InFlight, outcome: AckOutcome) -> Result<Next> {
        let message = in_flight.message().clone();
        let (topic, id) = (message.topic.as_str(), message.id.as_str());

        match outcome {
            AckOutcome::Acked => match self.ctx.log.delete(topic, id).await {
                Ok(_) => {
                    in_flight.ack().await?;
                    info!(%topic, %id, "delivered");
                    Ok(Next::AwaitFrame)
                }
                Err(err) => {
                    warn!(%topic, %id, error = %err, "failed to delete acked record; requeueing");
                    in_flight.requeue();
                    Ok(Next::AwaitFrame)
                }
            },
            AckOutcome::Nacked(code) => {
                info!(%topic, %id, %code, "consumer rejected delivery; requeueing");
                in_flight.requeue();
                Ok(Next::AwaitFrame)
            }
            AckOutcome::WrongId(acked) => {
                warn!(%topic, %id, %acked, "ack named a different message; requeueing");
                in_flight.requeue();
                Ok(Next::AwaitFrame)
            }
            AckOutcome::Rejected(err) => {
                warn!(%topic, %id, error = %err, "invalid frame while awaiting ack; requeueing");
                in_flight.requeue();
                self.send(ServerFrame::error(err)).await?;
                Ok(Next::AwaitFrame)
            }
            AckOutcome::TimedOut => {
                let err = BrokerError::DeliveryTimeout {
                    id: id.to_string(),
                    timeout_ms: self.ctx.ack_timeout.as_millis() as u64,
                };
                warn!(%topic, %id, "{err}; requeueing");
                in_flight.requeue();
                Ok(Next::AwaitFrame)
            }
            AckOutcome::Cancelled => {
                info!(%topic, %id, "ack wait cancelled by shutdown; requeueing");
                in_flight.requeue();
                Ok(Next::Close)
            }
            AckOutcome::Disconnected(err) => {
                info!(%topic, %id, error = ?err, "consumer disconnected before ack; requeueing");
                in_flight.requeue();
                Ok(Next::Close)
            }
        }
    }

    async fn send(&mut self, frame: ServerFrame) -> Result<()> {
        let max = self.ctx.max_frame_bytes;
        self.frames.send(frame.encode()).await.map_err(|e| match e {
            LinesCodecError::Io(e) => BrokerError::Connection(e),
            LinesCodecError::MaxLineLengthExceeded => BrokerError::Frame(FrameError::TooLong(max)),
        })
    }
}
