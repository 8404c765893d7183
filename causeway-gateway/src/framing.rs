//! gRPC and gRPC-Web framing.
//!
//! Both protocols wrap payloads in a 5-byte prefix: one flag byte (bit 0 =
//! compressed, bit 7 = gRPC-Web trailer frame) and a big-endian 32-bit
//! length. Trailer frames carry CRLF-delimited metadata.

use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::GzDecoder;

use crate::error::ProtocolError;

pub const COMPRESSED_FLAG: u8 = 0x01;
pub const TRAILER_FLAG: u8 = 0x80;

/// A parsed frame: flag byte plus payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub flags: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn is_compressed(&self) -> bool {
        self.flags & COMPRESSED_FLAG != 0
    }

    pub fn is_trailer(&self) -> bool {
        self.flags & TRAILER_FLAG != 0
    }
}

/// Wrap a payload in the 5-byte prefix.
pub fn encode_frame(flags: u8, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(5 + payload.len());
    out.put_u8(flags);
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
    out.freeze()
}

/// Parse the first frame of a framed request body.
pub fn decode_frame(body: &[u8]) -> Result<Frame, ProtocolError> {
    if body.len() < 5 {
        return Err(ProtocolError::MalformedFrame(format!(
            "frame prefix needs 5 bytes, got {}",
            body.len()
        )));
    }
    let flags = body[0];
    let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    if body.len() < 5 + len {
        return Err(ProtocolError::MalformedFrame(format!(
            "frame declares {len} bytes, only {} present",
            body.len() - 5
        )));
    }
    Ok(Frame {
        flags,
        payload: Bytes::copy_from_slice(&body[5..5 + len]),
    })
}

/// Undo per-message compression according to `grpc-encoding`.
pub fn decompress(frame: &Frame, encoding: Option<&str>) -> Result<Bytes, ProtocolError> {
    if !frame.is_compressed() {
        return Ok(frame.payload.clone());
    }
    match encoding {
        Some("gzip") => {
            let mut decoder = GzDecoder::new(frame.payload.as_ref());
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ProtocolError::MalformedFrame(format!("bad gzip payload: {e}")))?;
            Ok(Bytes::from(out))
        }
        Some("identity") | None => Err(ProtocolError::MalformedFrame(
            "compressed flag set without a message encoding".to_owned(),
        )),
        Some(other) => Err(ProtocolError::MalformedFrame(format!(
            "unsupported message encoding {other:?}"
        ))),
    }
}

/// Render the gRPC-Web trailer frame: CRLF-delimited `key: value` pairs
/// behind a flag byte with the high bit set.
pub fn encode_trailer_frame(trailers: &[(String, String)]) -> Bytes {
    let mut payload = String::new();
    for (key, value) in trailers {
        payload.push_str(key);
        payload.push_str(": ");
        payload.push_str(value);
        payload.push_str("\r\n");
    }
    encode_frame(TRAILER_FLAG, payload.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn frames_round_trip() {
        let framed = encode_frame(0, b"hello");
        assert_eq!(framed.len(), 10);
        assert_eq!(&framed[..5], &[0, 0, 0, 0, 5]);
        let frame = decode_frame(&framed).unwrap();
        assert!(!frame.is_compressed());
        assert!(!frame.is_trailer());
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn truncated_frames_are_malformed() {
        assert!(matches!(
            decode_frame(&[0, 0, 0]),
            Err(ProtocolError::MalformedFrame(_))
        ));
        // Declares 10 bytes, carries 2.
        assert!(matches!(
            decode_frame(&[0, 0, 0, 0, 10, 1, 2]),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn gzip_frames_decompress() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        let compressed = encoder.finish().unwrap();
        let framed = encode_frame(COMPRESSED_FLAG, &compressed);
        let frame = decode_frame(&framed).unwrap();
        assert!(frame.is_compressed());
        let plain = decompress(&frame, Some("gzip")).unwrap();
        assert_eq!(plain.as_ref(), b"payload");
    }

    #[test]
    fn compressed_without_encoding_is_rejected() {
        let framed = encode_frame(COMPRESSED_FLAG, b"x");
        let frame = decode_frame(&framed).unwrap();
        assert!(decompress(&frame, None).is_err());
    }

    #[test]
    fn trailer_frames_set_the_high_bit() {
        let framed = encode_trailer_frame(&[
            ("grpc-status".to_owned(), "0".to_owned()),
            ("grpc-message".to_owned(), "ok".to_owned()),
        ]);
        let frame = decode_frame(&framed).unwrap();
        assert!(frame.is_trailer());
        let text = String::from_utf8(frame.payload.to_vec()).unwrap();
        assert_eq!(text, "grpc-status: 0\r\ngrpc-message: ok\r\n");
    }
}
