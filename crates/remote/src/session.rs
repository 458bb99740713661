//! Driving a spherebot for the lifetime of one connection.
//!
//! Everything that can change the command channel's state (new joystick
//! values, acks from the robot, the user quitting) arrives as an [`Event`] on
//! a single queue, and one loop applies them in order. That keeps the
//! stop-and-wait bookkeeping single-threaded no matter where the events come
//! from.
//!
//! The loop never writes to the robot itself. It queues frames for a writer
//! that works through them in order alongside it, so a slow (or lost) write
//! can't stop the loop from seeing acks, or the user quitting.

use std::{ops::ControlFlow, time::Duration};

use futures::StreamExt as _;
use spherebot_protocol::{CommandChannel, Frame, MotorId, Power};
use tokio::sync::mpsc;

use crate::connection::{Notifications, SpherebotLike};

/// How long the frames still queued at the end of a session (including the
/// goodbye) get to go out.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum Event {
    ValueChanged(MotorId, f32),
    /// A notification payload from the robot.
    Acknowledged(Vec<u8>),
    /// The robot's notification stream ended.
    LinkLost,
    End,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionFault {
    #[error("failed to subscribe to notifications")]
    Subscribe(#[source] anyhow::Error),
    #[error("failed to write {frame}")]
    Write {
        frame: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("lost the notification stream")]
    LinkLost,
    #[error("writes stopped completing")]
    Stalled,
    #[error("failed to close the link")]
    Teardown(#[source] anyhow::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub sent: usize,
    /// Values that arrived while a command was still unacked.
    pub coalesced: usize,
    pub acks: usize,
}

/// The deciding half of a session: which frames to send, and when.
pub struct Session {
    channel: CommandChannel,
    stats: Stats,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl Session {
    /// Starts a session, queueing the hello as the very first frame.
    pub fn open(outgoing: mpsc::UnboundedSender<Frame>) -> Session {
        let mut channel = CommandChannel::new();
        channel.open();
        let mut session = Session {
            channel,
            stats: Stats::default(),
            outgoing,
        };
        session.queue(Frame::SessionStart);
        session
    }

    fn queue(&mut self, frame: Frame) {
        // If the writer is gone, it failed, and that failure ends the session.
        let _ = self.outgoing.send(frame);
    }

    pub fn handle(&mut self, event: Event) -> Result<ControlFlow<()>, SessionFault> {
        match event {
            Event::ValueChanged(motor, value) => {
                let Some(cmd) = self.channel.submit(motor, Power::new(value)) else {
                    self.stats.coalesced += 1;
                    return Ok(ControlFlow::Continue(()));
                };
                self.queue(Frame::Command(cmd));
                self.stats.sent += 1;
            }
            Event::Acknowledged(payload) => match self.channel.acknowledge(&payload) {
                Some(ack) => {
                    self.stats.acks += 1;
                    log::trace!("ack {}", ack.0);
                }
                None => log::trace!("ignoring {}-byte notification", payload.len()),
            },
            Event::LinkLost => return Err(SessionFault::LinkLost),
            Event::End => return Ok(ControlFlow::Break(())),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Applies events until one of them ends the session, or they run out.
    async fn apply_all(&mut self, events: &mut mpsc::Receiver<Event>) -> Result<(), SessionFault> {
        while let Some(event) = events.recv().await {
            if self.handle(event)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Queues the goodbye, and hangs up on the writer. Any unacked command is
    /// abandoned.
    pub fn close(mut self) -> Stats {
        if self.channel.close().is_some() {
            self.queue(Frame::SessionEnd);
        }
        self.stats
    }
}

fn describe(frame: &Frame) -> &'static str {
    match frame {
        Frame::SessionStart => "session start",
        Frame::SessionEnd => "session end",
        Frame::Command(_) => "motor command",
    }
}

/// Writes frames in the order they were queued, until the queue is closed or a
/// write fails.
async fn write_frames<T: SpherebotLike>(
    link: &mut T,
    mut frames: mpsc::UnboundedReceiver<Frame>,
) -> Result<(), SessionFault> {
    while let Some(frame) = frames.recv().await {
        link.write_frame(&frame.to_bytes())
            .await
            .map_err(|source| SessionFault::Write {
                frame: describe(&frame),
                source,
            })?;
        log::debug!("sent {frame:?}");
    }
    Ok(())
}

/// Runs a whole session: subscribes, applies events until one of them ends
/// it, and then says goodbye and disconnects.
///
/// `tx` must be the sending side of `events`; it is used to forward the
/// robot's notifications into the queue.
pub async fn run<T: SpherebotLike>(
    mut link: T,
    tx: mpsc::Sender<Event>,
    mut events: mpsc::Receiver<Event>,
) -> Result<T, SessionFault> {
    let notifications = link.subscribe().await.map_err(SessionFault::Subscribe)?;
    let forwarder = tokio::spawn(forward_notifications(notifications, tx));

    let (outgoing, frames) = mpsc::unbounded_channel();
    let outcome = {
        let writer = write_frames(&mut link, frames);
        tokio::pin!(writer);
        let mut session = Session::open(outgoing);
        log::info!("session started");

        // The writer can only finish early by failing: the session holds the
        // queue open.
        let applied = tokio::select! {
            ret = session.apply_all(&mut events) => ret,
            Err(e) = &mut writer => Err(e),
        };
        match applied {
            Ok(()) => {
                let stats = session.close();
                match tokio::time::timeout(DRAIN_TIMEOUT, &mut writer).await {
                    Ok(written) => written.map(|()| stats),
                    Err(_) => Err(SessionFault::Stalled),
                }
            }
            Err(e) => Err(e),
        }
    };
    forwarder.abort();

    let stats = match outcome {
        Ok(stats) => stats,
        Err(e) => {
            // After a fault there's no point saying goodbye, but we still try
            // to let go of the link.
            if let Err(e) = link.disconnect().await {
                log::warn!("failed to disconnect: {e:#}");
            }
            return Err(e);
        }
    };

    link.unsubscribe().await.map_err(SessionFault::Teardown)?;
    link.disconnect().await.map_err(SessionFault::Teardown)?;
    let Stats {
        sent,
        coalesced,
        acks,
    } = stats;
    log::info!("session closed: {sent} commands sent, {acks} acks, {coalesced} values coalesced");
    Ok(link)
}

async fn forward_notifications(mut notifications: Notifications, tx: mpsc::Sender<Event>) {
    while let Some(payload) = notifications.next().await {
        if tx.send(Event::Acknowledged(payload)).await.is_err() {
            return;
        }
    }
    let _ = tx.send(Event::LinkLost).await;
}
