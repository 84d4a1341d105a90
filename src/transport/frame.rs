//! Text-frame encoding for the post-upgrade transport.
//!
//! One frame per telemetry record: FIN=1, opcode=1 (text), unmasked,
//! server-to-client direction only.

/// Encode `payload` as a single unmasked text frame.
pub fn encode_text_frame(payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 10);
    frame.push(0x81);

    if len <= 125 {
        frame.push(len as u8);
    } else if len <= 65_535 {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_uses_single_length_byte() {
        let frame = encode_text_frame(b"hi");
        assert_eq!(frame, vec![0x81, 0x02, b'h', b'i']);
    }

    #[test]
    fn payload_at_125_bytes_still_uses_single_byte_length() {
        let payload = vec![b'x'; 125];
        let frame = encode_text_frame(&payload);
        assert_eq!(&frame[..2], &[0x81, 125]);
        assert_eq!(frame.len(), 2 + 125);
    }

    #[test]
    fn payload_of_130_bytes_uses_extended_16_bit_length() {
        let payload = vec![b'x'; 130];
        let frame = encode_text_frame(&payload);
        assert_eq!(&frame[..4], &[0x81, 0x7E, 0x00, 0x82]);
        assert_eq!(&frame[4..], payload.as_slice());
    }

    #[test]
    fn payload_over_64kb_uses_extended_64_bit_length() {
        let payload = vec![b'x'; 70_000];
        let frame = encode_text_frame(&payload);
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 127);
        let len_bytes: [u8; 8] = frame[2..10].try_into().unwrap();
        assert_eq!(u64::from_be_bytes(len_bytes), 70_000);
    }
}
