use crate::{Ack, CommandFrame, MotorId, Power, SeqNo, FRAME_LEN, SESSION_END, SESSION_START};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No session has been opened yet.
    Idle,
    Open,
    Closed,
}

/// Stop-and-wait sequencing of motor commands.
///
/// At most one command is ever outstanding: a new command (for either motor)
/// is only produced once the robot has acknowledged the previous one. Values
/// that arrive while the robot is busy are dropped, so the robot never works
/// through a backlog of stale commands.
///
/// The channel doesn't do any IO. It tells its owner which bytes to write, and
/// expects to be told about every notification the robot sends.
#[derive(Clone, Debug)]
pub struct CommandChannel {
    phase: Phase,
    last_sent: SeqNo,
    last_acked: Ack,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel {
    pub fn new() -> Self {
        CommandChannel {
            phase: Phase::Idle,
            last_sent: SeqNo::ZERO,
            last_acked: Ack(0),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_sent(&self) -> SeqNo {
        self.last_sent
    }

    pub fn last_acked(&self) -> Ack {
        self.last_acked
    }

    /// Would a value submitted now be sent?
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Open && self.last_sent.is_acked_by(self.last_acked)
    }

    /// Starts a session, returning the handshake to write.
    ///
    /// This resets the sequence numbers, so it is also how a channel is reused
    /// after reconnecting.
    pub fn open(&mut self) -> [u8; FRAME_LEN] {
        self.last_sent = SeqNo::ZERO;
        self.last_acked = Ack(0);
        self.phase = Phase::Open;
        SESSION_START
    }

    /// Ends the session, returning the handshake to write.
    ///
    /// Returns `None` if the session isn't open, so the closing handshake goes
    /// out at most once per session.
    pub fn close(&mut self) -> Option<[u8; FRAME_LEN]> {
        if self.phase != Phase::Open {
            return None;
        }
        self.phase = Phase::Closed;
        Some(SESSION_END)
    }

    /// Offers a new power for `motor`. Returns the frame to write, or `None` if
    /// the value was dropped because the previous command is still unacked
    /// (or because the session isn't open).
    pub fn submit(&mut self, motor: MotorId, power: Power) -> Option<CommandFrame> {
        if self.phase != Phase::Open {
            return None;
        }

        let seq = self.last_sent.next();
        if !self.last_sent.is_acked_by(self.last_acked) {
            return None;
        }

        self.last_sent = seq;
        Some(CommandFrame { seq, motor, power })
    }

    /// Records a notification from the robot. The latest ack always wins, even
    /// if it is smaller than the previous one.
    ///
    /// Payloads too short to hold an ack are ignored; the parsed ack is
    /// returned otherwise.
    pub fn acknowledge(&mut self, payload: &[u8]) -> Option<Ack> {
        if self.phase != Phase::Open {
            return None;
        }
        let ack = Ack::parse(payload)?;
        self.last_acked = ack;
        Some(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> CommandChannel {
        let mut ch = CommandChannel::new();
        assert_eq!(ch.open(), SESSION_START);
        ch
    }

    #[test]
    fn basic_command() {
        let mut ch = open();

        let frame = ch.submit(MotorId::Left, Power::new(0.5)).unwrap();
        assert_eq!(
            frame.to_bytes(),
            [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3f]
        );

        assert_eq!(ch.acknowledge(&[0x01, 0x00, 0x00, 0x00, 0x42]), Some(Ack(1)));
        assert_eq!(ch.last_acked(), Ack(1));

        let frame = ch.submit(MotorId::Right, Power::new(-1.0)).unwrap();
        assert_eq!(
            frame.to_bytes(),
            [0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x80, 0xbf]
        );
    }

    #[test]
    fn drops_while_busy() {
        let mut ch = open();
        let first = ch.submit(MotorId::Left, Power::new(0.2)).unwrap();
        assert_eq!(first.seq, SeqNo::new(1));
        assert!(!ch.is_ready());

        for i in 0..10 {
            assert_eq!(ch.submit(MotorId::Right, Power::new(i as f32 / 10.0)), None);
            assert_eq!(ch.submit(MotorId::Left, Power::new(-0.3)), None);
        }
        assert_eq!(ch.last_sent(), SeqNo::new(1));

        ch.acknowledge(&Ack(1).to_bytes());
        let next = ch.submit(MotorId::Right, Power::new(0.7)).unwrap();
        assert_eq!(next.seq, SeqNo::new(2));
        assert_eq!(next.motor, MotorId::Right);
    }

    #[test]
    fn stale_ack_keeps_gate_shut() {
        let mut ch = open();
        ch.submit(MotorId::Left, Power::new(0.2)).unwrap();
        ch.acknowledge(&Ack(1).to_bytes());
        ch.submit(MotorId::Left, Power::new(0.3)).unwrap();

        // A repeat of the old ack doesn't confirm seq 2.
        ch.acknowledge(&Ack(1).to_bytes());
        assert_eq!(ch.submit(MotorId::Left, Power::new(0.4)), None);
    }

    #[test]
    fn malformed_notification_is_ignored() {
        let mut ch = open();
        ch.submit(MotorId::Left, Power::new(0.2)).unwrap();
        ch.acknowledge(&Ack(1).to_bytes());

        assert_eq!(ch.acknowledge(&[0x05, 0x00]), None);
        assert_eq!(ch.acknowledge(&[]), None);
        assert_eq!(ch.last_acked(), Ack(1));
        assert!(ch.is_ready());
    }

    #[test]
    fn close_once_then_ignore_values() {
        let mut ch = open();
        ch.submit(MotorId::Left, Power::new(0.2)).unwrap();

        // The outstanding command doesn't hold up the closing handshake.
        assert_eq!(ch.close(), Some(SESSION_END));
        assert_eq!(ch.close(), None);
        assert_eq!(ch.phase(), Phase::Closed);

        ch.acknowledge(&Ack(1).to_bytes());
        assert_eq!(ch.submit(MotorId::Right, Power::new(0.1)), None);
    }

    #[test]
    fn nothing_before_open() {
        let mut ch = CommandChannel::new();
        assert_eq!(ch.submit(MotorId::Left, Power::new(0.2)), None);
        assert_eq!(ch.acknowledge(&Ack(0).to_bytes()), None);
        assert_eq!(ch.close(), None);
    }

    #[test]
    fn reopen_resets_counters() {
        let mut ch = open();
        ch.submit(MotorId::Left, Power::new(0.2)).unwrap();
        ch.close();

        // The previous session ended with seq 1 unacked; that mustn't block the
        // next one.
        ch.open();
        assert_eq!(ch.last_sent(), SeqNo::ZERO);
        assert_eq!(ch.last_acked(), Ack(0));
        let frame = ch.submit(MotorId::Right, Power::new(0.2)).unwrap();
        assert_eq!(frame.seq, SeqNo::new(1));
    }

    #[test]
    fn wraps_around() {
        let mut ch = open();
        ch.last_sent = SeqNo::new(i32::MAX);
        ch.last_acked = Ack(i32::MAX as u32);

        let frame = ch.submit(MotorId::Left, Power::new(1.0)).unwrap();
        assert_eq!(frame.seq, SeqNo::ZERO);
        assert_eq!(ch.submit(MotorId::Left, Power::new(1.0)), None);

        ch.acknowledge(&[0, 0, 0, 0]);
        assert_eq!(ch.submit(MotorId::Left, Power::new(1.0)).unwrap().seq, SeqNo::new(1));
    }
}
