//! Staged response handler for the Tokio runtime.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use super::request::{consume_request, RequestEnd};
use crate::response::ResponseTemplate;

/// Stall between the first byte and the rest of the response.
pub const STAGE_DELAY: Duration = Duration::from_secs(10);

/// Progress of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    ReadingRequest,
    FirstByteSent,
    Delaying,
    SendingRemainder,
    Closed,
}

/// Serve one staged exchange on `stream`, then close it.
///
/// I/O errors never cut the sequence short: each failure is logged at
/// debug level and the handler carries on until the connection is closed.
/// The returned state is always [`ConnState::Closed`].
pub async fn handle_connection<S>(
    stream: S,
    template: Arc<ResponseTemplate>,
    delay: Duration,
) -> ConnState
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    trace!(state = ?ConnState::ReadingRequest, "Connection opened");

    match consume_request(&mut stream).await {
        RequestEnd::BlankLine => trace!("Request consumed"),
        RequestEnd::Eof => debug!("Peer closed before end of request headers"),
        RequestEnd::Error(e) => debug!(error = %e, "Request read error"),
    }

    let state = send_staged(&mut stream, &template, delay).await;

    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to shut down connection");
    }
    drop(stream);

    transition(state, ConnState::Closed)
}

/// Send the first byte, stall for `delay`, then send the rest.
///
/// Write errors are logged and skipped; the delay and the second write
/// always happen. Returns [`ConnState::SendingRemainder`].
pub async fn send_staged<W>(
    writer: &mut W,
    template: &ResponseTemplate,
    delay: Duration,
) -> ConnState
where
    W: AsyncWrite + Unpin,
{
    let mut state = ConnState::ReadingRequest;

    if let Err(e) = write_fragment(writer, template.first_fragment()).await {
        debug!(error = %e, "Failed to send first byte");
    }
    state = transition(state, ConnState::FirstByteSent);

    state = transition(state, ConnState::Delaying);
    tokio::time::sleep(delay).await;

    state = transition(state, ConnState::SendingRemainder);
    if let Err(e) = write_fragment(writer, template.remainder()).await {
        debug!(error = %e, "Failed to send response remainder");
    }

    state
}

/// Write `fragment` in full and push it onto the wire.
async fn write_fragment<W>(writer: &mut W, fragment: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(fragment).await?;
    writer.flush().await
}

fn transition(from: ConnState, to: ConnState) -> ConnState {
    trace!(?from, ?to, "State transition");
    to
}
