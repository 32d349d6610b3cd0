use std::collections::BTreeMap;

use bitflags::bitflags;
use glam::Vec3;

use crate::PlayerId;
use crate::error::WireError;
use crate::match_state::MatchPhase;

use super::bytes::{ByteReader, ByteWriter};
use super::message::MessageKind;

bitflags! {
    /// Per-player status bits on the wire. The bit assignment here is the
    /// canonical mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateFlags: u8 {
        const GROUNDED = 0x01;
        const INVULNERABLE = 0x02;
        const DEAD = 0x04;
        const RESPAWNING = 0x08;
    }
}

/// One player's entry in a state snapshot. Float32 precision on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStateData {
    pub entity_id: PlayerId,
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub velocity: Vec3,
    pub health: u8,
    pub flags: StateFlags,
}

impl PlayerStateData {
    pub const WIRE_SIZE: usize = 36;

    fn encode(&self, w: &mut ByteWriter) {
        w.write_u16(self.entity_id);
        w.write_f32(self.position.x);
        w.write_f32(self.position.y);
        w.write_f32(self.position.z);
        w.write_f32(self.pitch);
        w.write_f32(self.yaw);
        w.write_f32(self.velocity.x);
        w.write_f32(self.velocity.y);
        w.write_f32(self.velocity.z);
        w.write_u8(self.health);
        w.write_u8(self.flags.bits());
    }

    fn decode(r: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            entity_id: r.read_u16()?,
            position: Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?),
            pitch: r.read_f32()?,
            yaw: r.read_f32()?,
            velocity: Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?),
            health: r.read_u8()?,
            flags: StateFlags::from_bits_truncate(r.read_u8()?),
        })
    }
}

/// Authoritative per-tick world state as broadcast to clients. A delta
/// snapshot carries only players that changed since the last full one; the
/// receiver merges it into its known state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub tick_number: u32,
    pub server_timestamp_ms: f64,
    pub match_state: MatchPhase,
    pub players: Vec<PlayerStateData>,
    pub scores: BTreeMap<PlayerId, u32>,
    pub is_delta: bool,
}

impl StateSnapshot {
    /// Type byte + tick u32 + timestamp f64 + match state u8 + player count u8.
    pub const HEADER_SIZE: usize = 15;

    pub fn new(tick_number: u32, server_timestamp_ms: f64, match_state: MatchPhase) -> Self {
        Self {
            tick_number,
            server_timestamp_ms,
            match_state,
            players: Vec::new(),
            scores: BTreeMap::new(),
            is_delta: false,
        }
    }

    pub fn player(&self, entity_id: PlayerId) -> Option<&PlayerStateData> {
        self.players.iter().find(|p| p.entity_id == entity_id)
    }

    pub fn encode(&self) -> Vec<u8> {
        let kind = if self.is_delta {
            MessageKind::StateDelta
        } else {
            MessageKind::StateSnapshot
        };

        let capacity =
            Self::HEADER_SIZE + self.players.len() * PlayerStateData::WIRE_SIZE + 1 + self.scores.len() * 6;
        let mut w = ByteWriter::with_capacity(capacity);

        w.write_u8(kind as u8);
        w.write_u32(self.tick_number);
        w.write_f64(self.server_timestamp_ms);
        w.write_u8(self.match_state as u8);
        w.write_u8(self.players.len() as u8);

        for player in &self.players {
            player.encode(&mut w);
        }

        w.write_u8(self.scores.len() as u8);
        for (&id, &score) in &self.scores {
            w.write_u16(id);
            w.write_u32(score);
        }

        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(data);
        r.require(Self::HEADER_SIZE)?;

        let kind = r.read_u8()?;
        let is_delta = match kind {
            k if k == MessageKind::StateSnapshot as u8 => false,
            k if k == MessageKind::StateDelta as u8 => true,
            got => {
                return Err(WireError::WrongType {
                    expected: MessageKind::StateSnapshot as u8,
                    got,
                });
            }
        };

        let tick_number = r.read_u32()?;
        let server_timestamp_ms = r.read_f64()?;
        let match_state = MatchPhase::from_u8(r.read_u8()?)
            .ok_or(WireError::InvalidFieldValue("matchState"))?;
        let player_count = r.read_u8()? as usize;

        r.require(player_count * PlayerStateData::WIRE_SIZE)?;
        let mut players = Vec::with_capacity(player_count);
        for _ in 0..player_count {
            players.push(PlayerStateData::decode(&mut r)?);
        }

        let score_count = r.read_u8()? as usize;
        r.require(score_count * 6)?;
        let mut scores = BTreeMap::new();
        for _ in 0..score_count {
            let id = r.read_u16()?;
            let score = r.read_u32()?;
            scores.insert(id, score);
        }

        Ok(Self {
            tick_number,
            server_timestamp_ms,
            match_state,
            players,
            scores,
            is_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_player(id: PlayerId) -> PlayerStateData {
        PlayerStateData {
            entity_id: id,
            position: Vec3::new(1.5, 2.25, -3.75),
            pitch: 0.2,
            yaw: -1.1,
            velocity: Vec3::new(0.5, -9.8, 4.0),
            health: 75,
            flags: StateFlags::GROUNDED | StateFlags::INVULNERABLE,
        }
    }

    #[test]
    fn roundtrip_preserves_everything() {
        let mut snapshot = StateSnapshot::new(4242, 16_500.25, MatchPhase::Playing);
        snapshot.players.push(sample_player(1));
        snapshot.players.push(sample_player(2));
        snapshot.scores.insert(1, 3);
        snapshot.scores.insert(2, 7);

        let data = snapshot.encode();
        assert_eq!(
            data.len(),
            StateSnapshot::HEADER_SIZE + 2 * PlayerStateData::WIRE_SIZE + 1 + 2 * 6
        );

        let decoded = StateSnapshot::decode(&data).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn delta_flag_rides_the_type_byte() {
        let mut snapshot = StateSnapshot::new(9, 100.0, MatchPhase::Waiting);
        snapshot.is_delta = true;
        let data = snapshot.encode();
        assert_eq!(data[0], MessageKind::StateDelta as u8);
        assert!(StateSnapshot::decode(&data).unwrap().is_delta);
    }

    #[test]
    fn rejects_short_player_section() {
        let mut snapshot = StateSnapshot::new(1, 0.0, MatchPhase::Waiting);
        snapshot.players.push(sample_player(1));
        let data = snapshot.encode();

        let err = StateSnapshot::decode(&data[..StateSnapshot::HEADER_SIZE + 4]).unwrap_err();
        assert!(matches!(err, WireError::BufferTooSmall { .. }));
    }

    #[test]
    fn rejects_bad_match_state() {
        let snapshot = StateSnapshot::new(1, 0.0, MatchPhase::Waiting);
        let mut data = snapshot.encode();
        data[13] = 0x7F;
        assert_eq!(
            StateSnapshot::decode(&data).unwrap_err(),
            WireError::InvalidFieldValue("matchState")
        );
    }
}
