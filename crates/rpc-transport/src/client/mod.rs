//! Client-side RPC transport: the request state machine, the priority
//! send queue, and session auth (§4.4.2, §4.4.3).

pub mod queue;
pub mod request;
pub mod session;

pub use queue::{Priority, PriorityQueue};
pub use request::{Request, RequestState};
pub use session::{AuthHeader, Session, SessionRefresher};

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;
use crate::framing::write_frame;

/// Sends one already-queued request over `stream`, performing the
/// `Pending -> Serialized -> InFlight` transitions in order and assembling
/// the frame in the fixed `SpanBuffers` order. Returns `false` without
/// writing anything if the request was cancelled first.
pub async fn send_queued<W: AsyncWrite + Unpin>(
    stream: &mut W,
    request: &Arc<Request>,
) -> Result<bool, TransportError> {
    if !request.mark_serialized() {
        return Ok(false);
    }
    let sections = request.unit.assemble();
    let refs: [&[u8]; 4] = [&sections[0], &sections[1], &sections[2], &sections[3]];
    write_frame(stream, &refs).await?;
    request.mark_in_flight();
    Ok(true)
}

/// Reads one response frame and completes the matching in-flight request,
/// if any is still waiting for it.
pub async fn recv_response<R: AsyncRead + Unpin>(
    stream: &mut R,
    pending: &dashmap::DashMap<core_types::ObjectId, Arc<Request>>,
) -> Result<(), TransportError> {
    let frame = crate::framing::read_frame(stream).await?;
    let unit = crate::wire::RequestUnit::decode(&frame)?;
    if let Some((_, request)) = pending.remove(&unit.id) {
        request.complete(unit);
    }
    Ok(())
}
