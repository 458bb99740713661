//! Wire format shared by the spherebot remote and the robot.
//!
//! Every write to the robot is exactly [`FRAME_LEN`] bytes: either one of the
//! two session handshakes, or a [`CommandFrame`] setting the power of one
//! motor. The robot answers with notifications whose first four bytes are the
//! sequence number of the last command it applied (see [`Ack`]).

#![cfg_attr(not(feature = "std"), no_std)]

mod channel;

pub use channel::{CommandChannel, Phase};

pub const FRAME_LEN: usize = 9;

/// Sent once, right after subscribing to notifications.
pub const SESSION_START: [u8; FRAME_LEN] = [0xff; FRAME_LEN];

/// Sent once, when the remote goes away.
pub const SESSION_END: [u8; FRAME_LEN] = [0xee; FRAME_LEN];

const ACK_LEN: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotorId {
    Left = 0,
    Right = 1,
}

impl MotorId {
    pub const ALL: [MotorId; 2] = [MotorId::Left, MotorId::Right];

    pub fn from_byte(b: u8) -> Option<MotorId> {
        match b {
            0 => Some(MotorId::Left),
            1 => Some(MotorId::Right),
            _ => None,
        }
    }
}

/// Motor power, in `[-1, 1]`. The sign is the direction.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Power(f32);

impl Power {
    pub const STOP: Power = Power(0.0);

    /// Clamps `value` into range. NaN means stop.
    pub fn new(value: f32) -> Power {
        if value.is_nan() {
            Power::STOP
        } else {
            Power(value.clamp(-1.0, 1.0))
        }
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

/// A command sequence number.
///
/// Both motors share one sequence. Sequence numbers are never negative: the
/// successor of `i32::MAX` is zero.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNo(i32);

impl SeqNo {
    pub const ZERO: SeqNo = SeqNo(0);

    pub const fn new(n: i32) -> SeqNo {
        SeqNo(n)
    }

    pub fn get(self) -> i32 {
        self.0
    }

    pub fn next(self) -> SeqNo {
        match self.0.checked_add(1) {
            Some(n) if n > 0 => SeqNo(n),
            _ => SeqNo::ZERO,
        }
    }

    /// Has the robot confirmed applying the command with this sequence number?
    pub fn is_acked_by(self, ack: Ack) -> bool {
        u32::try_from(self.0) == Ok(ack.0)
    }
}

/// The sequence number of the last command the robot applied, as reported in
/// a notification.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ack(pub u32);

impl Ack {
    /// Reads an ack from a notification payload. Anything after the first
    /// four bytes is ignored; shorter payloads aren't acks.
    pub fn parse(payload: &[u8]) -> Option<Ack> {
        let bytes: [u8; ACK_LEN] = payload.get(..ACK_LEN)?.try_into().ok()?;
        Some(Ack(u32::from_le_bytes(bytes)))
    }

    pub fn to_bytes(self) -> [u8; ACK_LEN] {
        self.0.to_le_bytes()
    }
}

impl From<SeqNo> for Ack {
    fn from(seq: SeqNo) -> Ack {
        Ack(seq.0 as u32)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CommandFrame {
    pub seq: SeqNo,
    pub motor: MotorId,
    pub power: Power,
}

impl CommandFrame {
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0..4].copy_from_slice(&self.seq.0.to_le_bytes());
        buf[4] = self.motor as u8;
        buf[5..9].copy_from_slice(&self.power.0.to_le_bytes());
        buf
    }
}

/// A frame, as the robot sees it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Frame {
    SessionStart,
    SessionEnd,
    Command(CommandFrame),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    WrongLength(usize),
    UnknownMotor(u8),
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::WrongLength(len) => {
                write!(f, "expected a {FRAME_LEN}-byte frame, got {len} bytes")
            }
            DecodeError::UnknownMotor(b) => write!(f, "unknown motor id {b}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

impl Frame {
    pub fn decode(data: &[u8]) -> Result<Frame, DecodeError> {
        let buf: &[u8; FRAME_LEN] = data
            .try_into()
            .map_err(|_| DecodeError::WrongLength(data.len()))?;
        if *buf == SESSION_START {
            return Ok(Frame::SessionStart);
        }
        if *buf == SESSION_END {
            return Ok(Frame::SessionEnd);
        }

        let motor = MotorId::from_byte(buf[4]).ok_or(DecodeError::UnknownMotor(buf[4]))?;
        let seq = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let power = f32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]);
        Ok(Frame::Command(CommandFrame {
            seq: SeqNo(seq),
            motor,
            power: Power::new(power),
        }))
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        match self {
            Frame::SessionStart => SESSION_START,
            Frame::SessionEnd => SESSION_END,
            Frame::Command(cmd) => cmd.to_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_layout() {
        let left = CommandFrame {
            seq: SeqNo::new(1),
            motor: MotorId::Left,
            power: Power::new(0.5),
        };
        assert_eq!(
            left.to_bytes(),
            [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3f]
        );

        let right = CommandFrame {
            seq: SeqNo::new(2),
            motor: MotorId::Right,
            power: Power::new(-1.0),
        };
        assert_eq!(
            right.to_bytes(),
            [0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x80, 0xbf]
        );
    }

    #[test]
    fn seq_wraps_to_zero() {
        assert_eq!(SeqNo::ZERO.next(), SeqNo::new(1));
        assert_eq!(SeqNo::new(i32::MAX).next(), SeqNo::ZERO);
        assert_eq!(SeqNo::new(-7).next(), SeqNo::ZERO);
    }

    #[test]
    fn power_is_clamped() {
        assert_eq!(Power::new(3.0).get(), 1.0);
        assert_eq!(Power::new(-1.5).get(), -1.0);
        assert_eq!(Power::new(f32::NAN), Power::STOP);
        assert_eq!(Power::new(f32::NEG_INFINITY).get(), -1.0);
    }

    #[test]
    fn ack_parsing() {
        assert_eq!(Ack::parse(&[1, 0, 0, 0]), Some(Ack(1)));
        assert_eq!(Ack::parse(&[0x10, 0x27, 0, 0, 0xaa, 0xbb]), Some(Ack(10_000)));
        assert_eq!(Ack::parse(&[1, 0, 0]), None);
        assert_eq!(Ack::parse(&[]), None);
        assert_eq!(Ack::parse(&Ack(0xdead_beef).to_bytes()), Some(Ack(0xdead_beef)));
    }

    #[test]
    fn ack_matches_seq() {
        assert!(SeqNo::ZERO.is_acked_by(Ack(0)));
        assert!(SeqNo::new(i32::MAX).is_acked_by(Ack(i32::MAX as u32)));
        assert!(!SeqNo::new(3).is_acked_by(Ack(2)));
        // An ack with the top bit set can't match any sequence number we send.
        assert!(!SeqNo::new(-1).is_acked_by(Ack(u32::MAX)));
    }

    #[test]
    fn decode_handshakes_and_commands() {
        assert_eq!(Frame::decode(&SESSION_START), Ok(Frame::SessionStart));
        assert_eq!(Frame::decode(&SESSION_END), Ok(Frame::SessionEnd));

        let cmd = CommandFrame {
            seq: SeqNo::new(77),
            motor: MotorId::Right,
            power: Power::new(-0.25),
        };
        assert_eq!(Frame::decode(&cmd.to_bytes()), Ok(Frame::Command(cmd)));

        assert_eq!(Frame::decode(&[0; 8]), Err(DecodeError::WrongLength(8)));
        let mut bad = cmd.to_bytes();
        bad[4] = 7;
        assert_eq!(Frame::decode(&bad), Err(DecodeError::UnknownMotor(7)));
    }
}
