//! Wire framing: `totalLen(u32 BE) ‖ requestUnit`.
//!
//! One frame is read or written per call; callers read a frame at a time
//! rather than buffering the whole stream, which is what lets the server's
//! read loop apply implicit backpressure (§4.4.4).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Frames larger than this are rejected before the length-prefixed payload
/// is even read, so a corrupt or hostile peer cannot force an unbounded
/// allocation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Writes `sections` as one length-prefixed frame. The sections are handed
/// to the socket in the order the caller assembled them (§4.4.2's
/// `SpanBuffers`); this function only owns the length prefix and the
/// write-vector, not the section ordering.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    sections: &[&[u8]],
) -> Result<(), TransportError> {
    let total_len: usize = sections.iter().map(|s| s.len()).sum();
    if total_len > MAX_FRAME_LEN as usize {
        return Err(TransportError::FrameTooLarge(total_len as u32));
    }
    writer.write_all(&(total_len as u32).to_be_bytes()).await?;
    for section in sections {
        writer.write_all(section).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrips_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let sections: &[&[u8]] = &[b"auth", b"payload"];
        write_frame(&mut client, sections).await.unwrap();
        let body = read_frame(&mut server).await.unwrap();
        assert_eq!(body, b"authpayload".to_vec());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_reading_the_body() {
        let (mut client, mut server) = tokio::io::duplex(16);
        client
            .write_all(&(MAX_FRAME_LEN + 1).to_be_bytes())
            .await
            .unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn closed_stream_before_length_prefix_is_connection_closed() {
        let (client, mut server) = tokio::io::duplex(16);
        drop(client);
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }
}
