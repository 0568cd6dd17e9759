//! Length-prefixed JSON framing.
//!
//! Each frame is a 4-byte big-endian body length followed by the JSON
//! encoding of a [`Frame`]. The first frame in each direction of a link is
//! a [`Frame::Hello`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Message, Result, WhatAmI, ZenohId};

/// Largest accepted frame body.
pub(super) const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) enum Frame {
    Hello { zid: ZenohId, whatami: WhatAmI },
    Data(Message),
}

/// Serialize `frame` into a body ready for [`write_body`].
///
/// # Errors
///
/// [`Error::FrameTooLarge`] if the body exceeds [`MAX_FRAME_LEN`].
pub(super) fn encode_frame(frame: &Frame) -> Result<Bytes> {
    // ---
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(body.len()));
    }
    Ok(Bytes::from(body))
}

/// Write one already encoded frame body with its length prefix.
pub(super) async fn write_body<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(body.len()));
    }

    writer.write_u32(body.len() as u32).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

pub(super) async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_body(writer, &encode_frame(frame)?).await
}

/// Read one frame; `Ok(None)` on a clean end of stream between frames.
pub(super) async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(serde_json::from_slice(&body)?))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::{Body, CongestionControl, Priority};
    use crate::{Encoding, KeyExpr};

    #[tokio::test]
    async fn test_frames_survive_a_stream() {
        // ---
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        let hello = Frame::Hello {
            zid: ZenohId::generate(),
            whatami: WhatAmI::Router,
        };
        let data = Frame::Data(Message {
            source: ZenohId::generate(),
            key_expr: KeyExpr::new("demo/example/session_move_test").unwrap(),
            timestamp: None,
            congestion_control: CongestionControl::Drop,
            priority: Priority::Data,
            body: Body::Put {
                payload: Bytes::from_static(b"Session Move!"),
                encoding: Encoding::TEXT_PLAIN,
            },
        });

        write_frame(&mut a, &hello).await.unwrap();
        write_frame(&mut a, &data).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(hello));
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(data));
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        // ---
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32((MAX_FRAME_LEN + 1) as u32).await.unwrap();

        assert!(matches!(
            read_frame(&mut b).await,
            Err(Error::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_before_writing() {
        // ---
        let frame = Frame::Data(Message {
            source: ZenohId::generate(),
            key_expr: KeyExpr::new("big").unwrap(),
            timestamp: None,
            congestion_control: CongestionControl::Block,
            priority: Priority::Data,
            body: Body::Put {
                payload: Bytes::from(vec![200u8; MAX_FRAME_LEN]),
                encoding: Encoding::APP_OCTET_STREAM,
            },
        });
        assert!(matches!(encode_frame(&frame), Err(Error::FrameTooLarge(_))));

        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        let oversized = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            write_body(&mut a, &oversized).await,
            Err(Error::FrameTooLarge(_))
        ));

        // Nothing reached the stream, so it stays usable
        let hello = Frame::Hello {
            zid: ZenohId::generate(),
            whatami: WhatAmI::Peer,
        };
        write_frame(&mut a, &hello).await.unwrap();
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(hello));
    }

    #[test]
    fn test_payload_travels_as_base64() {
        // ---
        let frame = Frame::Data(Message {
            source: ZenohId::generate(),
            key_expr: KeyExpr::new("a").unwrap(),
            timestamp: None,
            congestion_control: CongestionControl::Drop,
            priority: Priority::Data,
            body: Body::Put {
                payload: Bytes::from_static(b"Session Move!"),
                encoding: Encoding::TEXT_PLAIN,
            },
        });
        let body = encode_frame(&frame).unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains(r#""payload":"U2Vzc2lvbiBNb3ZlIQ==""#), "{text}");
        assert!(text.contains(r#""prefix":3"#), "{text}");
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        // ---
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32(10).await.unwrap();
        a.write_all(b"{\"Da").await.unwrap();
        drop(a);

        assert!(matches!(read_frame(&mut b).await, Err(Error::Io(_))));
    }
}
