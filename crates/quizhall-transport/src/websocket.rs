//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::{StatusCode, header};

use crate::{
    ConnectionId, ConnectionSender, HandshakeInfo, OriginGate, Outbound,
    TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Listens for incoming TCP connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// The WebSocket handshake is *not* performed here so that one slow
    /// client can't hold up the accept loop; call
    /// [`PendingConnection::upgrade`] from the connection's own task.
    pub async fn accept(&self) -> Result<PendingConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(PendingConnection { stream, addr })
    }
}

/// An accepted TCP stream that hasn't been upgraded yet.
pub struct PendingConnection {
    stream: TcpStream,
    addr: SocketAddr,
}

impl PendingConnection {
    /// The remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Performs the WebSocket handshake behind `gate` and starts the
    /// connection's writer task.
    ///
    /// `queue_capacity` bounds the outbound queue; see [`ConnectionSender`].
    pub async fn upgrade(
        self,
        gate: &OriginGate,
        queue_capacity: usize,
    ) -> Result<WebSocketConnection, TransportError> {
        let mut info = HandshakeInfo::default();
        let mut rejected = false;

        let callback = |req: &Request, resp: Response| {
            let headers = req.headers();
            let origin = headers
                .get(header::ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            if !gate.allows(origin.as_deref()) {
                rejected = true;
                info.origin = origin;
                let mut err: ErrorResponse =
                    ErrorResponse::new(Some("origin not allowed".into()));
                *err.status_mut() = StatusCode::FORBIDDEN;
                return Err(err);
            }
            info.cookie = headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            info.origin = origin;
            Ok(resp)
        };

        let handshake =
            tokio_tungstenite::accept_hdr_async(self.stream, callback).await;
        let ws = match handshake {
            Ok(ws) => ws,
            Err(_) if rejected => {
                tracing::info!(addr = %self.addr, origin = ?info.origin, "upgrade refused");
                return Err(TransportError::OriginRejected(info.origin));
            }
            Err(e) => return Err(TransportError::HandshakeFailed(e.to_string())),
        };

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        let (sink, stream) = ws.split();
        let (sender, queue) = ConnectionSender::channel(id, queue_capacity);
        tokio::spawn(write_loop(id, sink, queue));

        tracing::debug!(%id, addr = %self.addr, "accepted WebSocket connection");

        Ok(WebSocketConnection {
            id,
            addr: self.addr,
            info,
            sender,
            stream,
        })
    }
}

/// The read half of an upgraded socket plus a handle to its writer.
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    info: HandshakeInfo,
    sender: ConnectionSender,
    stream: SplitStream<WsStream>,
}

impl WebSocketConnection {
    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Headers captured during the upgrade.
    pub fn handshake(&self) -> &HandshakeInfo {
        &self.info
    }

    /// A handle for queueing frames to this connection.
    pub fn sender(&self) -> ConnectionSender {
        self.sender.clone()
    }

    /// Receives the next data frame.
    ///
    /// Returns `Ok(None)` when the peer closes the connection.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    /// Flushes queued frames and closes the socket.
    pub fn close(&self) {
        self.sender.close();
    }
}

/// Drains a connection's outbound queue into the socket.
///
/// Stops on [`Outbound::Close`], on a write error, or once every
/// [`ConnectionSender`] has been dropped.
async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, Message>,
    mut queue: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = queue.recv().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::text(text.to_string())).await {
                    tracing::debug!(%id, error = %e, "write failed");
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    let _ = sink.close().await;
    tracing::debug!(%id, "writer stopped");
}
