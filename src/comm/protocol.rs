// Wire format: type (1) | seq (4, big-endian) | msgpack payload

use crate::comm::error::{CommError, Result};
use crate::comm::types::{MsgType, ProgressPayload, RequestPayload, ResponsePayload};
use rmp_serde::decode::Deserializer;
use rmp_serde::encode::Serializer;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::Cursor;

/// Header length: type byte plus sequence number
pub const HEADER_LEN: usize = 5;

/// Encode a packet with given type, sequence, and payload
pub fn encode_packet(msg_type: MsgType, seq: u32, payload: Option<&impl serde::Serialize>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.push(msg_type as u8);
    buf.extend_from_slice(&seq.to_be_bytes());

    if let Some(p) = payload {
        let mut ser = Serializer::new(&mut buf);
        p.serialize(&mut ser).map_err(|e| CommError::EncodeError(e.to_string()))?;
    }

    Ok(buf)
}

/// Decode packet type and seq from raw bytes
pub fn decode_header(data: &[u8]) -> Result<(MsgType, u32)> {
    if data.len() < HEADER_LEN {
        return Err(CommError::DecodeError("Packet too short".to_string()));
    }

    let msg_type = MsgType::from_u8(data[0])
        .ok_or_else(|| CommError::DecodeError(format!("Unknown msg type: {}", data[0])))?;
    let seq = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((msg_type, seq))
}

fn decode_payload<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let mut de = Deserializer::new(Cursor::new(data));
    T::deserialize(&mut de).map_err(|e| CommError::DecodeError(e.to_string()))
}

pub fn decode_request_payload(data: &[u8]) -> Result<RequestPayload> {
    decode_payload(data)
}

pub fn decode_response_payload(data: &[u8]) -> Result<ResponsePayload> {
    decode_payload(data)
}

pub fn decode_progress_payload(data: &[u8]) -> Result<ProgressPayload> {
    decode_payload(data)
}

/// Encode request ack (no payload)
pub fn encode_request_ack(seq: u32) -> Result<Vec<u8>> {
    encode_packet(MsgType::RequestAck, seq, None::<&()>)
}

pub fn encode_response(seq: u32, payload: &ResponsePayload) -> Result<Vec<u8>> {
    encode_packet(MsgType::Response, seq, Some(payload))
}

pub fn encode_progress(seq: u32, payload: &ProgressPayload) -> Result<Vec<u8>> {
    encode_packet(MsgType::Progress, seq, Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encode_decode() {
        let payload = RequestPayload {
            content: "run-terminal echo hello".to_string(),
        };

        let packet = encode_packet(MsgType::Request, 7, Some(&payload)).unwrap();
        let (decoded_type, decoded_seq) = decode_header(&packet).unwrap();

        assert_eq!(decoded_type, MsgType::Request);
        assert_eq!(decoded_seq, 7);
        let decoded = decode_request_payload(&packet[HEADER_LEN..]).unwrap();
        assert_eq!(decoded.content, "run-terminal echo hello");
    }

    #[test]
    fn test_request_ack_has_no_payload() {
        let packet = encode_request_ack(42).unwrap();
        assert_eq!(packet.len(), HEADER_LEN);
        assert_eq!(decode_header(&packet).unwrap(), (MsgType::RequestAck, 42));
    }

    #[test]
    fn test_response_error_flag() {
        let payload = ResponsePayload {
            content: "Rejected: command contains denylisted text 'sudo '".to_string(),
            is_error: true,
        };

        let packet = encode_response(3, &payload).unwrap();
        assert_eq!(decode_header(&packet).unwrap(), (MsgType::Response, 3));
        let decoded = decode_response_payload(&packet[HEADER_LEN..]).unwrap();
        assert!(decoded.is_error);
        assert_eq!(decoded.content, payload.content);
    }

    #[test]
    fn test_progress_packet() {
        let payload = ProgressPayload {
            elapsed_ms: 3012,
            content: "Cloning into 'repo'...\nReceiving objects:  41%".to_string(),
        };

        let packet = encode_progress(9, &payload).unwrap();
        assert_eq!(packet[0], 0x04);
        assert_eq!(decode_header(&packet).unwrap(), (MsgType::Progress, 9));
        assert_eq!(decode_progress_payload(&packet[HEADER_LEN..]).unwrap(), payload);
    }

    #[test]
    fn test_large_multibyte_payload() {
        let content = format!("{}你好🎉\r\n\0", "x".repeat(60000));
        let payload = RequestPayload {
            content: content.clone(),
        };

        let packet = encode_packet(MsgType::Request, 1, Some(&payload)).unwrap();
        assert_eq!(decode_request_payload(&packet[HEADER_LEN..]).unwrap().content, content);
    }

    #[test]
    fn test_bad_headers() {
        let mut packet = vec![0xFFu8];
        packet.extend_from_slice(&1u32.to_be_bytes());
        assert!(matches!(decode_header(&packet), Err(CommError::DecodeError(_))));

        assert!(decode_header(&[0x01, 0x00, 0x00]).is_err());
        assert!(decode_header(&[0x01, 0x00, 0x00, 0x00, 0x01]).is_ok());
    }

    #[test]
    fn test_seq_is_big_endian() {
        let packet = encode_request_ack(256).unwrap();
        assert_eq!(&packet[1..HEADER_LEN], [0x00, 0x00, 0x01, 0x00]);

        let packet = encode_request_ack(u32::MAX).unwrap();
        assert_eq!(decode_header(&packet).unwrap().1, u32::MAX);
    }
}
