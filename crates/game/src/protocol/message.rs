use crate::PlayerId;
use crate::error::WireError;

use super::bytes::{ByteReader, ByteWriter};
use super::input::InputPacket;
use super::snapshot::StateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Input = 0x01,
    StateSnapshot = 0x02,
    StateDelta = 0x03,
    ClockSyncRequest = 0x04,
    ClockSyncResponse = 0x05,
    InputAck = 0x06,
    FullStateRequest = 0x07,
    PlayerEvent = 0x08,
    MatchEvent = 0x09,
    Keepalive = 0x0a,
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0x01 => Ok(Self::Input),
            0x02 => Ok(Self::StateSnapshot),
            0x03 => Ok(Self::StateDelta),
            0x04 => Ok(Self::ClockSyncRequest),
            0x05 => Ok(Self::ClockSyncResponse),
            0x06 => Ok(Self::InputAck),
            0x07 => Ok(Self::FullStateRequest),
            0x08 => Ok(Self::PlayerEvent),
            0x09 => Ok(Self::MatchEvent),
            0x0a => Ok(Self::Keepalive),
            other => Err(WireError::InvalidMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayerEventKind {
    Joined = 1,
    Left = 2,
    Kicked = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MatchEventKind {
    CountdownTick = 1,
    Start = 2,
    End = 3,
}

/// Winner id encoding in a match-end event; matches with no winner (empty
/// server) carry this sentinel.
pub const NO_WINNER: u16 = 0xFFFF;

/// Every frame the transport can carry, decoded by leading type byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Input(InputPacket),
    Snapshot(StateSnapshot),
    ClockSyncRequest {
        client_send_ms: f64,
    },
    ClockSyncResponse {
        client_send_ms: f64,
        server_time_ms: f64,
    },
    InputAck {
        sequence_number: u32,
    },
    FullStateRequest,
    PlayerEvent {
        kind: PlayerEventKind,
        entity_id: PlayerId,
    },
    MatchEvent {
        kind: MatchEventKind,
        value: u32,
    },
    Keepalive,
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Input(packet) => packet.encode(),
            Message::Snapshot(snapshot) => snapshot.encode(),
            Message::ClockSyncRequest { client_send_ms } => {
                let mut w = ByteWriter::with_capacity(9);
                w.write_u8(MessageKind::ClockSyncRequest as u8);
                w.write_f64(*client_send_ms);
                w.into_vec()
            }
            Message::ClockSyncResponse {
                client_send_ms,
                server_time_ms,
            } => {
                let mut w = ByteWriter::with_capacity(17);
                w.write_u8(MessageKind::ClockSyncResponse as u8);
                w.write_f64(*client_send_ms);
                w.write_f64(*server_time_ms);
                w.into_vec()
            }
            Message::InputAck { sequence_number } => {
                let mut w = ByteWriter::with_capacity(5);
                w.write_u8(MessageKind::InputAck as u8);
                w.write_u32(*sequence_number);
                w.into_vec()
            }
            Message::FullStateRequest => vec![MessageKind::FullStateRequest as u8],
            Message::PlayerEvent { kind, entity_id } => {
                let mut w = ByteWriter::with_capacity(4);
                w.write_u8(MessageKind::PlayerEvent as u8);
                w.write_u8(*kind as u8);
                w.write_u16(*entity_id);
                w.into_vec()
            }
            Message::MatchEvent { kind, value } => {
                let mut w = ByteWriter::with_capacity(6);
                w.write_u8(MessageKind::MatchEvent as u8);
                w.write_u8(*kind as u8);
                w.write_u32(*value);
                w.into_vec()
            }
            Message::Keepalive => vec![MessageKind::Keepalive as u8],
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.is_empty() {
            return Err(WireError::BufferTooSmall { needed: 1, got: 0 });
        }

        match MessageKind::try_from(data[0])? {
            MessageKind::Input => Ok(Message::Input(InputPacket::decode(data)?)),
            MessageKind::StateSnapshot | MessageKind::StateDelta => {
                Ok(Message::Snapshot(StateSnapshot::decode(data)?))
            }
            MessageKind::ClockSyncRequest => {
                let mut r = ByteReader::new(&data[1..]);
                r.require(8)?;
                Ok(Message::ClockSyncRequest {
                    client_send_ms: r.read_f64()?,
                })
            }
            MessageKind::ClockSyncResponse => {
                let mut r = ByteReader::new(&data[1..]);
                r.require(16)?;
                Ok(Message::ClockSyncResponse {
                    client_send_ms: r.read_f64()?,
                    server_time_ms: r.read_f64()?,
                })
            }
            MessageKind::InputAck => {
                let mut r = ByteReader::new(&data[1..]);
                r.require(4)?;
                Ok(Message::InputAck {
                    sequence_number: r.read_u32()?,
                })
            }
            MessageKind::FullStateRequest => Ok(Message::FullStateRequest),
            MessageKind::PlayerEvent => {
                let mut r = ByteReader::new(&data[1..]);
                r.require(3)?;
                let kind = match r.read_u8()? {
                    1 => PlayerEventKind::Joined,
                    2 => PlayerEventKind::Left,
                    3 => PlayerEventKind::Kicked,
                    _ => return Err(WireError::InvalidFieldValue("playerEventKind")),
                };
                Ok(Message::PlayerEvent {
                    kind,
                    entity_id: r.read_u16()?,
                })
            }
            MessageKind::MatchEvent => {
                let mut r = ByteReader::new(&data[1..]);
                r.require(5)?;
                let kind = match r.read_u8()? {
                    1 => MatchEventKind::CountdownTick,
                    2 => MatchEventKind::Start,
                    3 => MatchEventKind::End,
                    _ => return Err(WireError::InvalidFieldValue("matchEventKind")),
                };
                Ok(Message::MatchEvent {
                    kind,
                    value: r.read_u32()?,
                })
            }
            MessageKind::Keepalive => Ok(Message::Keepalive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_is_a_single_byte() {
        let data = Message::Keepalive.encode();
        assert_eq!(data, vec![0x0a]);
        assert_eq!(Message::decode(&data).unwrap(), Message::Keepalive);
    }

    #[test]
    fn clock_sync_roundtrip() {
        let request = Message::ClockSyncRequest {
            client_send_ms: 1234.5,
        };
        assert_eq!(Message::decode(&request.encode()).unwrap(), request);

        let response = Message::ClockSyncResponse {
            client_send_ms: 1234.5,
            server_time_ms: 98765.25,
        };
        let data = response.encode();
        assert_eq!(data.len(), 17);
        assert_eq!(Message::decode(&data).unwrap(), response);
    }

    #[test]
    fn player_and_match_events_roundtrip() {
        let joined = Message::PlayerEvent {
            kind: PlayerEventKind::Joined,
            entity_id: 2,
        };
        assert_eq!(Message::decode(&joined.encode()).unwrap(), joined);

        let end = Message::MatchEvent {
            kind: MatchEventKind::End,
            value: 1,
        };
        assert_eq!(Message::decode(&end.encode()).unwrap(), end);
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        assert_eq!(
            Message::decode(&[0x7F]).unwrap_err(),
            WireError::InvalidMessageType(0x7F)
        );
        assert!(matches!(
            Message::decode(&[]),
            Err(WireError::BufferTooSmall { needed: 1, got: 0 })
        ));
    }
}
