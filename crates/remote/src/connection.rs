use std::{future::Future, pin::Pin, time::Duration};

use anyhow::{anyhow, bail, Context as _};
use btleplug::{
    api::{Central, Characteristic, Peripheral as _, WriteType},
    platform::{Adapter, Peripheral},
};
use futures::{channel::mpsc, Stream, StreamExt as _};
use indicatif::{MultiProgress, ProgressBar};
use spherebot_protocol::{Ack, Frame, FRAME_LEN};
use uuid::{uuid, Uuid};

pub const DEVICE_NAME: &str = "Spherebot";
pub const SERVICE_UUID: Uuid = uuid!("0000ffe0-0000-1000-8000-00805f9b34fb");
pub const CHARACTERISTIC_UUID: Uuid = uuid!("0000ffe1-0000-1000-8000-00805f9b34fb");

/// Notification payloads, in the order the robot sent them.
pub type Notifications = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// The link to a spherebot: a single characteristic that we write frames to,
/// and that notifies us with acks.
pub trait SpherebotLike {
    async fn subscribe(&mut self) -> anyhow::Result<Notifications>;
    async fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> anyhow::Result<()>;
    async fn unsubscribe(&mut self) -> anyhow::Result<()>;
    async fn disconnect(&mut self) -> anyhow::Result<()>;
}

#[derive(Clone, Debug)]
pub struct LinkOptions {
    /// The advertised local name to look for.
    pub name: String,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub write_type: WriteType,
    pub scan_timeout: Duration,
}

pub struct Spherebot {
    peripheral: Peripheral,
    control: Characteristic,
    write_type: WriteType,
}

pub async fn connect(adapter: &Adapter, opts: &LinkOptions) -> anyhow::Result<Peripheral> {
    let progress = MultiProgress::new();
    let mut bar = progress.add(ProgressBar::new_spinner().with_message("Searching..."));
    bar.enable_steady_tick(crate::TICK);

    let peripheral = search(&bar, opts.scan_timeout, find_spherebot(adapter, &opts.name))
        .await
        .with_context(|| format!("no device named {:?} found", opts.name))?;
    bar = progress.add(ProgressBar::new_spinner().with_message("Connecting..."));
    bar.enable_steady_tick(crate::TICK);

    let connected = async {
        peripheral.connect().await?;
        peripheral.discover_services().await
    };
    if let Err(e) = connected.await {
        bar.abandon_with_message("failed to connect");
        return Err(e.into());
    }
    bar.finish_with_message("connected!");

    Ok(peripheral)
}

/// Runs `find` for at most `timeout`, leaving `bar` with the outcome.
async fn search<T>(
    bar: &ProgressBar,
    timeout: Duration,
    find: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(timeout, find).await {
        Ok(Ok(found)) => {
            bar.finish_with_message("found!");
            Ok(found)
        }
        Ok(Err(e)) => {
            bar.abandon_with_message("search failed");
            Err(e)
        }
        Err(_) => {
            bar.abandon_with_message("gave up");
            Err(anyhow!("gave up after {timeout:?}"))
        }
    }
}

pub async fn find_spherebot(adapter: &Adapter, name: &str) -> anyhow::Result<Peripheral> {
    loop {
        let peripherals = adapter.peripherals().await?;
        for p in peripherals {
            if let Some(props) = p.properties().await? {
                if props.local_name.as_deref() == Some(name) {
                    return Ok(p);
                }
            }
        }
        tokio::time::sleep(crate::TICK).await;
    }
}

impl Spherebot {
    pub async fn new(peripheral: Peripheral, opts: &LinkOptions) -> anyhow::Result<Self> {
        let control = peripheral
            .characteristics()
            .into_iter()
            .find(|ch| ch.uuid == opts.characteristic && ch.service_uuid == opts.service)
            .ok_or_else(|| {
                anyhow!(
                    "{} was missing characteristic {} of service {}",
                    opts.name,
                    opts.characteristic,
                    opts.service
                )
            })?;

        Ok(Spherebot {
            peripheral,
            control,
            write_type: opts.write_type,
        })
    }
}

impl SpherebotLike for Spherebot {
    async fn subscribe(&mut self) -> anyhow::Result<Notifications> {
        // Grab the stream before subscribing, so that we can't miss anything.
        let notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&self.control).await?;

        let uuid = self.control.uuid;
        Ok(Box::pin(notifications.filter_map(move |n| async move {
            (n.uuid == uuid).then_some(n.value)
        })))
    }

    async fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> anyhow::Result<()> {
        self.peripheral
            .write(&self.control, frame, self.write_type)
            .await?;
        Ok(())
    }

    async fn unsubscribe(&mut self) -> anyhow::Result<()> {
        self.peripheral.unsubscribe(&self.control).await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// A pretend spherebot, which applies every command it gets and acks it after
/// a delay.
pub struct MockSpherebot {
    ack_delay: Option<Duration>,
    fail_after: Option<usize>,
    connected: bool,
    subscribed: bool,
    notify: Option<mpsc::UnboundedSender<Vec<u8>>>,
    frames: Vec<Frame>,
}

impl MockSpherebot {
    pub fn new(ack_delay: Duration) -> Self {
        MockSpherebot {
            ack_delay: Some(ack_delay),
            fail_after: None,
            connected: true,
            subscribed: false,
            notify: None,
            frames: Vec::new(),
        }
    }

    fn send_ack(&self, ack: Ack) {
        let (Some(delay), Some(tx)) = (self.ack_delay, &self.notify) else {
            return;
        };
        let payload = ack.to_bytes().to_vec();
        if delay.is_zero() {
            let _ = tx.unbounded_send(payload);
        } else {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.unbounded_send(payload);
            });
        }
    }
}

#[cfg(test)]
impl MockSpherebot {
    /// A spherebot that never acks anything.
    pub fn silent() -> Self {
        MockSpherebot {
            ack_delay: None,
            ..MockSpherebot::new(Duration::ZERO)
        }
    }

    /// Makes every write after the first `count` fail.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Every frame received so far.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

impl SpherebotLike for MockSpherebot {
    async fn subscribe(&mut self) -> anyhow::Result<Notifications> {
        if !self.connected {
            bail!("not connected");
        }
        let (tx, rx) = mpsc::unbounded();
        self.notify = Some(tx);
        self.subscribed = true;
        Ok(Box::pin(rx))
    }

    async fn write_frame(&mut self, frame: &[u8; FRAME_LEN]) -> anyhow::Result<()> {
        if !self.connected {
            bail!("not connected");
        }
        if self.fail_after.is_some_and(|n| self.frames.len() >= n) {
            bail!("simulated link failure");
        }

        let frame = Frame::decode(frame).context("mock spherebot got a bad frame")?;
        log::debug!("mock spherebot applied {frame:?}");
        self.frames.push(frame);
        if let Frame::Command(cmd) = frame {
            self.send_ack(cmd.seq.into());
        }
        Ok(())
    }

    async fn unsubscribe(&mut self) -> anyhow::Result<()> {
        self.subscribed = false;
        // Dropping the sender ends the notification stream.
        self.notify = None;
        Ok(())
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.connected = false;
        self.notify = None;
        Ok(())
    }
}
