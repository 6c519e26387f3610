//! Server list ping framing.
//!
//! Packets are `VarInt length | VarInt packet id | payload`. The status
//! response payload is a VarInt-prefixed UTF-8 JSON string.

use serde_json::Value;

use crate::error::ProbeError;

/// Most bytes a VarInt may occupy.
pub const MAX_VARINT_LEN: usize = 5;

/// `next state` value selecting the status flow.
const NEXT_STATE_STATUS: u8 = 0x01;

/// Status request: length 1, packet id 0.
pub const STATUS_REQUEST: [u8; 2] = [0x01, 0x00];

/// Append `value` as a VarInt (two's complement for negatives).
pub fn encode_varint(value: i32, out: &mut Vec<u8>) {
    let mut value = value as u32;
    loop {
        if value & !0x7f == 0 {
            out.push(value as u8);
            return;
        }
        out.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
}

/// Decode a VarInt from the front of `buf`.
///
/// Returns the value and the number of bytes consumed, or `None` when `buf`
/// ends before the VarInt does.
///
/// # Errors
///
/// [`ProbeError::VarIntTooLong`] when the encoding runs past five bytes.
pub fn decode_varint(buf: &[u8]) -> Result<Option<(i32, usize)>, ProbeError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(ProbeError::VarIntTooLong);
        }
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    Ok(None)
}

/// Build the handshake packet announcing a status request.
#[must_use]
pub fn handshake(protocol_version: i32, host: &str, port: u16) -> Vec<u8> {
    let mut body = vec![0x00];
    encode_varint(protocol_version, &mut body);
    encode_varint(host.len() as i32, &mut body);
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    body.push(NEXT_STATE_STATUS);

    let mut packet = Vec::with_capacity(body.len() + MAX_VARINT_LEN);
    encode_varint(body.len() as i32, &mut packet);
    packet.extend_from_slice(&body);
    packet
}

fn length(value: i32) -> Result<usize, ProbeError> {
    usize::try_from(value).map_err(|_| ProbeError::InvalidLength(value))
}

/// Parse a status response from the bytes received so far.
///
/// `Ok(None)` means more bytes are needed.
///
/// # Errors
///
/// Any framing violation or a payload that is not JSON.
pub fn parse_status_response(buf: &[u8]) -> Result<Option<Value>, ProbeError> {
    let Some((packet_len, header)) = decode_varint(buf)? else {
        return Ok(None);
    };
    let packet_len = length(packet_len)?;
    let Some(packet) = buf[header..].get(..packet_len) else {
        return Ok(None);
    };

    let Some((&packet_id, rest)) = packet.split_first() else {
        return Err(ProbeError::InvalidLength(0));
    };
    if packet_id != 0x00 {
        return Err(ProbeError::UnexpectedPacket(packet_id));
    }

    let Some((json_len, prefix)) = decode_varint(rest)? else {
        return Err(ProbeError::InvalidLength(packet_len as i32));
    };
    let json_len = length(json_len)?;
    let Some(json) = rest[prefix..].get(..json_len) else {
        return Err(ProbeError::InvalidLength(json_len as i32));
    };

    Ok(Some(serde_json::from_slice(json)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> Vec<u8> {
        let mut body = vec![0x00];
        encode_varint(json.len() as i32, &mut body);
        body.extend_from_slice(json.as_bytes());
        let mut packet = Vec::new();
        encode_varint(body.len() as i32, &mut packet);
        packet.extend_from_slice(&body);
        packet
    }

    #[test]
    fn handshake_matches_wire_bytes() {
        let mut expected = vec![0x13, 0x00, 0xff, 0xff, 0xff, 0xff, 0x0f, 0x09];
        expected.extend_from_slice(b"127.0.0.1");
        expected.extend_from_slice(&[0x63, 0xdd, 0x01]);
        assert_eq!(handshake(-1, "127.0.0.1", 25565), expected);
    }

    #[test]
    fn varint_known_values() {
        for (value, bytes) in [
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7f]),
            (128, vec![0x80, 0x01]),
            (25565, vec![0xdd, 0xc7, 0x01]),
            (-1, vec![0xff, 0xff, 0xff, 0xff, 0x0f]),
        ] {
            let mut out = Vec::new();
            encode_varint(value, &mut out);
            assert_eq!(out, bytes, "encoding {value}");
            assert_eq!(decode_varint(&bytes).unwrap(), Some((value, bytes.len())));
        }
    }

    #[test]
    fn varint_longer_than_five_bytes_fails() {
        let err = decode_varint(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert!(matches!(err, ProbeError::VarIntTooLong));
    }

    #[test]
    fn truncated_varint_needs_more() {
        assert_eq!(decode_varint(&[0x80, 0x80]).unwrap(), None);
    }

    #[test]
    fn parses_complete_response() {
        let bytes = response(r#"{"players":{"online":0,"max":20}}"#);
        let value = parse_status_response(&bytes).unwrap().unwrap();
        assert_eq!(value["players"]["max"], 20);
    }

    #[test]
    fn partial_response_needs_more() {
        let bytes = response(r#"{"version":{"name":"1.20"}}"#);
        assert!(parse_status_response(&bytes[..bytes.len() - 3])
            .unwrap()
            .is_none());
    }

    #[test]
    fn non_json_payload_fails() {
        let bytes = response("definitely not json");
        assert!(matches!(
            parse_status_response(&bytes),
            Err(ProbeError::Json(_))
        ));
    }

    #[test]
    fn wrong_packet_id_fails() {
        let mut bytes = response("{}");
        bytes[1] = 0x01;
        assert!(matches!(
            parse_status_response(&bytes),
            Err(ProbeError::UnexpectedPacket(0x01))
        ));
    }
}
