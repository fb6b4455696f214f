use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::broker::message::Payload;
use crate::transport::message::{
    ClientFrame, Delivery, DeliveryAckFrame, PublishFrame, ServerFrame,
};
use crate::utils::error::FrameError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    #[error("server closed the connection")]
    Closed,

    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected response: {0:?}")]
    Unexpected(ServerFrame),
}

/// One connection to the broker.
///
/// Each request reads exactly the frames the protocol promises in reply.
/// Acks get no reply, so [`BrokerClient::ack`] only writes.
#[derive(Debug)]
pub struct BrokerClient {
    frames: Framed<TcpStream, LinesCodec>,
}

impl BrokerClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            frames: Framed::new(stream, LinesCodec::new()),
        })
    }

    /// Publish and wait for the broker's publish-ack.
    pub async fn publish(&mut self, topic: &str, id: &str, payload: Payload) -> Result<(), ClientError> {
        let frame = ClientFrame::Publish(PublishFrame {
            topic: topic.to_string(),
            id: id.to_string(),
            payload,
        });
        self.send_line(frame.encode()).await?;
        match self.recv().await? {
            ServerFrame::PublishAck { id: acked } if acked == id => Ok(()),
            ServerFrame::Error { message } => Err(ClientError::Server(message)),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    /// Ask for the next message from `topics`, in priority order.
    /// A returned delivery must be answered with [`BrokerClient::ack`].
    pub async fn pull(&mut self, topics: &[&str]) -> Result<Option<Delivery>, ClientError> {
        let frame = ClientFrame::Pull(topics.iter().map(|t| t.to_string()).collect());
        self.send_line(frame.encode()).await?;
        match self.recv().await? {
            ServerFrame::Delivery(delivery) => Ok(Some(delivery)),
            ServerFrame::Empty => Ok(None),
            ServerFrame::Error { message } => Err(ClientError::Server(message)),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    /// Acknowledge a delivery. `"200"` means success; any other code asks for redelivery.
    pub async fn ack(&mut self, id: &str, code: &str) -> Result<(), ClientError> {
        let frame = ClientFrame::DeliveryAck(DeliveryAckFrame {
            id: id.to_string(),
            code: code.to_string(),
        });
        self.send_line(frame.encode()).await
    }

    /// Write a raw line, for callers that need frames outside the helpers above.
    pub async fn send_line(&mut self, line: String) -> Result<(), ClientError> {
        self.frames.send(line).await?;
        Ok(())
    }

    /// Read the next server frame.
    pub async fn recv(&mut self) -> Result<ServerFrame, ClientError> {
        let line = self.frames.next().await.ok_or(ClientError::Closed)??;
        Ok(ServerFrame::decode(&line)?)
    }
}
