mod bytes;
mod input;
mod message;
mod snapshot;

pub use bytes::{ByteReader, ByteWriter};
pub use input::{InputButtons, InputPacket};
pub use message::{MatchEventKind, Message, MessageKind, NO_WINNER, PlayerEventKind};
pub use snapshot::{PlayerStateData, StateFlags, StateSnapshot};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

/// Wrap-aware sequence comparison; all sequence and tick arithmetic is
/// unsigned 32-bit modulo 2^32.
#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[cfg(test)]
mod tests {
    use super::sequence_greater_than;

    #[test]
    fn sequence_comparison_wraps() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }
}
