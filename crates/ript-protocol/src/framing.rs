//! Length-prefixed JSON framing for stream transports.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```

use serde::{Serialize, de::DeserializeOwned};

use crate::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Serializes `message` and prepends its length.
pub fn encode_frame<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    let len = u32::try_from(json.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: u32::MAX,
        max: MAX_FRAME_SIZE,
    })?;

    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buffer = Vec::with_capacity(LENGTH_PREFIX_LEN + json.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Validates a length prefix and returns the payload length it announces.
pub fn payload_len(prefix: [u8; LENGTH_PREFIX_LEN]) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    Ok(len as usize)
}

/// Decodes the JSON payload of a frame (without its prefix).
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(payload)?)
}

/// Decodes one complete frame (prefix and payload).
pub fn decode_frame<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    let Some((prefix, rest)) = data.split_first_chunk::<LENGTH_PREFIX_LEN>() else {
        return Err(ProtocolError::IncompleteFrame {
            expected: LENGTH_PREFIX_LEN,
            received: data.len(),
        });
    };

    let len = payload_len(*prefix)?;
    if rest.len() < len {
        return Err(ProtocolError::IncompleteFrame {
            expected: LENGTH_PREFIX_LEN + len,
            received: data.len(),
        });
    }

    decode_payload(&rest[..len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::types::{ContentMessage, Packet};

    fn content_frame() -> Frame {
        Frame::new(Packet::Content(ContentMessage::new("room", 3, b"abc".to_vec())))
    }

    #[test]
    fn prefix_matches_payload_length() {
        let bytes = encode_frame(&content_frame()).unwrap();
        let prefix: [u8; 4] = bytes[..4].try_into().unwrap();
        assert_eq!(payload_len(prefix).unwrap(), bytes.len() - 4);
    }

    #[test]
    fn decode_encoded_frame() {
        let frame = content_frame();
        let bytes = encode_frame(&frame).unwrap();
        let decoded: Frame = decode_frame(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_short_buffer() {
        let result: ProtocolResult<Frame> = decode_frame(&[0, 0]);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteFrame {
                expected: 4,
                received: 2
            })
        ));

        let bytes = encode_frame(&content_frame()).unwrap();
        let result: ProtocolResult<Frame> = decode_frame(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::IncompleteFrame { .. })));
    }

    #[test]
    fn oversized_and_empty_prefixes_rejected() {
        let too_big = (MAX_FRAME_SIZE + 1).to_be_bytes();
        assert!(matches!(
            payload_len(too_big),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
        assert!(matches!(
            payload_len([0, 0, 0, 0]),
            Err(ProtocolError::EmptyFrame)
        ));
    }

    #[test]
    fn unknown_packet_type_fails_decode() {
        let payload = br#"{"protocol_version":"1","packet":{"type":99,"body":{}}}"#;
        let result: ProtocolResult<Frame> = decode_payload(payload);
        assert!(matches!(result, Err(ProtocolError::Serialization(_))));
    }
}
