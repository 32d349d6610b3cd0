use bitflags::bitflags;

use crate::error::WireError;

use super::bytes::{ByteReader, ByteWriter};
use super::message::MessageKind;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputButtons: u8 {
        const JUMP = 0x01;
        const FIRE = 0x02;
        const RELOAD = 0x04;
        const CROUCH = 0x08;
    }
}

/// One sampled client input. Movement axes are [-1, 1] (normalized on the
/// client when diagonal) and quantized to i8/127 on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputPacket {
    pub sequence_number: u32,
    pub tick_number: u32,
    pub movement_x: f32,
    pub movement_y: f32,
    pub look_delta_x: i16,
    pub look_delta_y: i16,
    pub buttons: InputButtons,
    pub client_timestamp_ms: f64,
}

impl InputPacket {
    /// Fixed wire size: type byte + two u32s + two i8 axes + two i16 look
    /// deltas + button byte + f64 timestamp.
    pub const WIRE_SIZE: usize = 24;

    pub fn new(sequence_number: u32, tick_number: u32) -> Self {
        Self {
            sequence_number,
            tick_number,
            movement_x: 0.0,
            movement_y: 0.0,
            look_delta_x: 0,
            look_delta_y: 0,
            buttons: InputButtons::empty(),
            client_timestamp_ms: 0.0,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(Self::WIRE_SIZE);
        w.write_u8(MessageKind::Input as u8);
        w.write_u32(self.sequence_number);
        w.write_u32(self.tick_number);
        w.write_i8(quantize_axis(self.movement_x));
        w.write_i8(quantize_axis(self.movement_y));
        w.write_i16(self.look_delta_x);
        w.write_i16(self.look_delta_y);
        w.write_u8(self.buttons.bits());
        w.write_f64(self.client_timestamp_ms);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(data);
        r.require(Self::WIRE_SIZE)?;

        let kind = r.read_u8()?;
        if kind != MessageKind::Input as u8 {
            return Err(WireError::WrongType {
                expected: MessageKind::Input as u8,
                got: kind,
            });
        }

        Ok(Self {
            sequence_number: r.read_u32()?,
            tick_number: r.read_u32()?,
            movement_x: dequantize_axis(r.read_i8()?),
            movement_y: dequantize_axis(r.read_i8()?),
            look_delta_x: r.read_i16()?,
            look_delta_y: r.read_i16()?,
            buttons: InputButtons::from_bits_truncate(r.read_u8()?),
            client_timestamp_ms: r.read_f64()?,
        })
    }
}

fn quantize_axis(v: f32) -> i8 {
    (v.clamp(-1.0, 1.0) * 127.0).round() as i8
}

fn dequantize_axis(v: i8) -> f32 {
    v as f32 / 127.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_extremes() {
        let packet = InputPacket {
            sequence_number: 0xFFFF_FFFF,
            tick_number: 0xFFFF_FFFF,
            movement_x: 2.0,
            movement_y: -2.0,
            look_delta_x: 500,
            look_delta_y: -500,
            buttons: InputButtons::JUMP | InputButtons::FIRE,
            client_timestamp_ms: 12345.6789,
        };

        let data = packet.encode();
        assert_eq!(data.len(), InputPacket::WIRE_SIZE);

        let decoded = InputPacket::decode(&data).unwrap();
        assert_eq!(decoded.sequence_number, 0xFFFF_FFFF);
        assert_eq!(decoded.tick_number, 0xFFFF_FFFF);
        assert!((decoded.movement_x - 1.0).abs() < 1.0 / 127.0);
        assert!((decoded.movement_y + 1.0).abs() < 1.0 / 127.0);
        assert_eq!(decoded.look_delta_x, 500);
        assert_eq!(decoded.look_delta_y, -500);
        assert_eq!(decoded.buttons.bits(), 0x03);
        assert_eq!(decoded.client_timestamp_ms, 12345.6789);
    }

    #[test]
    fn movement_survives_within_quantization_step() {
        let mut packet = InputPacket::new(1, 1);
        packet.movement_x = 0.37;
        packet.movement_y = -0.71;

        let decoded = InputPacket::decode(&packet.encode()).unwrap();
        assert!((decoded.movement_x - 0.37).abs() <= 1.0 / 127.0);
        assert!((decoded.movement_y + 0.71).abs() <= 1.0 / 127.0);
    }

    #[test]
    fn rejects_truncated_and_mistyped_frames() {
        let packet = InputPacket::new(7, 9);
        let mut data = packet.encode();

        assert!(matches!(
            InputPacket::decode(&data[..10]),
            Err(WireError::BufferTooSmall { .. })
        ));

        data[0] = 0x02;
        assert!(matches!(
            InputPacket::decode(&data),
            Err(WireError::WrongType { .. })
        ));
    }
}
