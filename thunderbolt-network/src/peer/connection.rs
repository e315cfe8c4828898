//! The I/O half of a peer: one reader task and one writer task per
//! connection.
//!
//! The tasks own the socket halves; everything stateful stays with the
//! peer manager. The reader forwards each decoded message into the
//! manager's event inbox (preserving per-peer arrival order), and the
//! writer drains a per-peer queue so sends are serialized without a
//! lock.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

use thunderbolt_chain::{parameters::Network, SerializationError};

use crate::protocol::external::{Codec, Message};

/// What the reader tasks report to the peer manager.
#[derive(Debug)]
pub enum PeerEvent {
    /// A decoded message from a peer, in arrival order.
    Message(SocketAddr, Message),
    /// A framing-level violation (bad magic, bad checksum, junk bytes).
    ProtocolViolation(SocketAddr, SerializationError),
    /// The peer's stream ended or its socket failed.
    Closed(SocketAddr),
    /// An outbound dial completed.
    Connected(SocketAddr, TcpStream),
    /// An outbound dial failed or timed out.
    ConnectFailed(SocketAddr),
}

/// The manager's handle to one connection's I/O tasks.
#[derive(Debug)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Queue a message for the writer task. Returns false if the
    /// writer is gone or its queue is full (a peer that slow is about
    /// to be dropped anyway).
    pub fn send(&self, message: Message) -> bool {
        self.outbound.try_send(message).is_ok()
    }

    /// Tear down both tasks. Dropping the outbound sender ends the
    /// writer; aborting unblocks a reader parked on a dead socket.
    pub fn shutdown(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Split `stream` and spawn the reader/writer pair for it.
pub fn spawn(
    stream: TcpStream,
    addr: SocketAddr,
    network: Network,
    events: mpsc::Sender<PeerEvent>,
) -> ConnectionHandle {
    let (read_half, write_half) = stream.into_split();

    let mut framed_read =
        FramedRead::new(read_half, Codec::builder().for_network(network).finish());
    let mut framed_write =
        FramedWrite::new(write_half, Codec::builder().for_network(network).finish());

    let (outbound, mut outbound_rx) = mpsc::channel::<Message>(128);

    let reader = tokio::spawn(async move {
        loop {
            match framed_read.next().await {
                Some(Ok(message)) => {
                    trace!(%addr, %message, "received message");
                    if events.send(PeerEvent::Message(addr, message)).await.is_err() {
                        break;
                    }
                }
                Some(Err(error)) => {
                    if events
                        .send(PeerEvent::ProtocolViolation(addr, error))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                None => {
                    let _ = events.send(PeerEvent::Closed(addr)).await;
                    break;
                }
            }
        }
        debug!(%addr, "peer reader finished");
    });

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            trace!(%addr, %message, "sending message");
            if framed_write.send(message).await.is_err() {
                // The reader will notice the dead socket and report it.
                break;
            }
        }
        debug!(%addr, "peer writer finished");
    });

    ConnectionHandle {
        outbound,
        reader,
        writer,
    }
}
