use crate::error::NetError;

/// Upper bound on one frame; anything larger is a corrupt or hostile stream.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Prepend the u32 little-endian length that delimits messages on the
/// stream. The payload itself is exactly one protocol message.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Incremental reassembly of length-prefixed frames from arbitrary read
/// chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete frame, if one has fully arrived.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, NetError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_le_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(NetError::ProtocolMismatch(format!(
                "frame length {len} exceeds {MAX_FRAME_SIZE}"
            )));
        }
        if self.buffer.len() < 4 + len {
            return Ok(None);
        }

        let payload = self.buffer[4..4 + len].to_vec();
        self.buffer.drain(..4 + len);
        Ok(Some(payload))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_survive_arbitrary_chunking() {
        let a = encode_frame(b"hello");
        let b = encode_frame(b"");
        let c = encode_frame(&[0x0a]);
        let mut stream: Vec<u8> = Vec::new();
        stream.extend(&a);
        stream.extend(&b);
        stream.extend(&c);

        let mut decoder = FrameDecoder::new();
        for chunk in stream.chunks(3) {
            decoder.feed(chunk);
        }

        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"hello");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x0a]);
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn partial_frame_waits() {
        let frame = encode_frame(b"payload");
        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame[..6]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.feed(&frame[6..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"payload");
    }

    #[test]
    fn oversized_frame_is_a_protocol_error() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(&(MAX_FRAME_SIZE as u32 + 1).to_le_bytes());
        decoder.feed(&[0u8; 16]);
        assert!(matches!(
            decoder.next_frame(),
            Err(NetError::ProtocolMismatch(_))
        ));
    }
}
