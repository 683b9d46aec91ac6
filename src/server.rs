//! TCP listener for the staged responder.
//!
//! Accepts connections forever and hands each one to its own task, so a
//! stalled handler never holds up acceptance or any other handler.

use crate::protocols::staged::{handle_connection, STAGE_DELAY};
use crate::response::ResponseTemplate;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace};

/// Listen backlog for the accept queue
const LISTEN_BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    listener: TcpListener,
    template: Arc<ResponseTemplate>,
    delay: Duration,
}

impl Server {
    /// Bind the listening socket. Must be called from within a Tokio runtime.
    pub fn bind(addr: SocketAddr, template: ResponseTemplate) -> Result<Self, ServerError> {
        let listener = create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Server {
            listener,
            template: Arc::new(template),
            delay: STAGE_DELAY,
        })
    }

    /// Override the stall between the first byte and the remainder.
    #[cfg(test)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails.
    ///
    /// Any accept error is fatal and ends the loop.
    pub async fn run(self) -> Result<(), ServerError> {
        if let Ok(addr) = self.local_addr() {
            info!(address = %addr, "Server listening");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let template = Arc::clone(&self.template);
                    let delay = self.delay;

                    tokio::spawn(async move {
                        let state = handle_connection(stream, template, delay).await;
                        trace!(peer = %peer, ?state, "Connection finished");
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    return Err(ServerError::Accept(e));
                }
            }
        }
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Listener errors. Both are fatal to the process.
#[derive(Debug)]
pub enum ServerError {
    Bind { addr: SocketAddr, source: io::Error },
    Accept(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind { addr, source } => {
                write!(f, "Error listening on port {}: {}", addr.port(), source)
            }
            ServerError::Accept(e) => write!(f, "Error accepting connection: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Accept(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    const TEST_DELAY: Duration = Duration::from_millis(500);

    fn template() -> ResponseTemplate {
        ResponseTemplate::new(Utc::now())
    }

    async fn start_server(template: ResponseTemplate) -> SocketAddr {
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), template)
            .unwrap()
            .with_delay(TEST_DELAY);
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    /// Send `request`, returning the first byte, the rest, and the gap between them.
    async fn exchange(addr: SocketAddr, request: &[u8]) -> (u8, Vec<u8>, Duration) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();

        let sent_at = Instant::now();
        let first = stream.read_u8().await.unwrap();
        let first_at = Instant::now();
        assert!(first_at - sent_at < Duration::from_secs(1));

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        (first, rest, first_at.elapsed())
    }

    #[tokio::test]
    async fn test_staged_response() {
        let template = template();
        let expected = template.clone();
        let addr = start_server(template).await;

        let (first, rest, gap) = exchange(addr, b"GET /anything HTTP/1.1\r\nHost: x\r\n\r\n").await;

        assert_eq!(first, b'H');
        assert!(gap >= TEST_DELAY);
        assert_eq!(rest, expected.remainder());
    }

    #[tokio::test]
    async fn test_same_response_for_any_request() {
        let template = template();
        let expected = template.as_bytes().to_vec();
        let addr = start_server(template).await;

        let requests: [&[u8]; 3] = [
            b"GET / HTTP/1.1\r\n\r\n",
            b"POST /upload HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 0\r\n\r\n",
            b"not http at all\n\n",
        ];

        for request in requests {
            let (first, rest, _) = exchange(addr, request).await;
            let mut response = vec![first];
            response.extend_from_slice(&rest);
            assert_eq!(response, expected);
        }
    }

    #[tokio::test]
    async fn test_concurrent_connections() {
        let template = template();
        let expected = template.remainder().to_vec();
        let addr = start_server(template).await;

        let start = Instant::now();
        let mut clients = tokio::task::JoinSet::new();
        for _ in 0..50 {
            clients.spawn(exchange(addr, b"GET / HTTP/1.1\r\n\r\n"));
        }

        while let Some(result) = clients.join_next().await {
            let (first, rest, gap) = result.unwrap();
            assert_eq!(first, b'H');
            assert!(gap >= TEST_DELAY);
            assert_eq!(rest, expected);
        }

        // Serialized delays would take 50 * TEST_DELAY.
        assert!(start.elapsed() < TEST_DELAY * 5);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = Server::bind("127.0.0.1:0".parse().unwrap(), template()).unwrap();
        let addr = first.local_addr().unwrap();

        let err = match Server::bind(addr, template()) {
            Ok(_) => panic!("second bind to {} succeeded", addr),
            Err(e) => e,
        };
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err
            .to_string()
            .starts_with(&format!("Error listening on port {}: ", addr.port())));
    }

    #[test]
    fn test_accept_error_message() {
        let err = ServerError::Accept(io::Error::new(io::ErrorKind::Other, "too many open files"));
        assert_eq!(
            err.to_string(),
            "Error accepting connection: too many open files"
        );
    }
}
