use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context as _};
use btleplug::{
    api::{Central as _, Manager as _, ScanFilter, WriteType},
    platform::{Adapter, Manager},
};
use clap::Parser;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::{LinkOptions, MockSpherebot, Spherebot, SpherebotLike};

mod connection;
mod input;
mod logging;
mod session;

const TICK: Duration = Duration::from_millis(50);

/// Drive a spherebot with the mouse: the left half of the terminal controls
/// the left motor and the right half controls the right motor.
///
/// Logging is configured with RUST_LOG. Log lines share the terminal with the
/// joysticks unless they are sent to --log-file (or stderr is redirected).
#[derive(Parser)]
struct Args {
    /// The advertised name of the robot.
    #[arg(long, default_value = connection::DEVICE_NAME)]
    name: String,

    #[arg(long, default_value_t = connection::SERVICE_UUID)]
    service: Uuid,

    #[arg(long, default_value_t = connection::CHARACTERISTIC_UUID)]
    characteristic: Uuid,

    /// Wait for the robot to confirm every write.
    #[arg(long)]
    with_response: bool,

    /// How long to search for the robot, in seconds.
    #[arg(long, default_value_t = 30)]
    scan_timeout: u64,

    /// Drive a simulated robot instead of a real one.
    #[arg(long)]
    mock: bool,

    /// How long the simulated robot takes to ack a command.
    #[arg(long, default_value_t = 20)]
    mock_latency_ms: u64,

    /// Give up after the first lost connection, instead of reconnecting.
    #[arg(long)]
    once: bool,

    /// Write the log to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn link_options(&self) -> LinkOptions {
        LinkOptions {
            name: self.name.clone(),
            service: self.service,
            characteristic: self.characteristic,
            write_type: if self.with_response {
                WriteType::WithResponse
            } else {
                WriteType::WithoutResponse
            },
            scan_timeout: Duration::from_secs(self.scan_timeout),
        }
    }
}

/// Runs one session with the terminal as the input, until the user quits or
/// the link fails.
async fn drive<T: SpherebotLike>(link: T) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(64);

    enable_raw_mode()?;
    execute!(std::io::stdout(), EnableMouseCapture, Hide)?;

    let running = session::run(link, tx.clone(), rx);
    let input = input::forward_terminal(tx);
    tokio::pin!(running);

    let ret = tokio::select! {
        ret = &mut running => ret.map(|_| ()).map_err(anyhow::Error::from),
        input_ret = input => {
            // The input always ends the session on its way out, so wait for the
            // session to close properly.
            let ret = running.await.map(|_| ()).map_err(anyhow::Error::from);
            input_ret.and(ret)
        }
    };

    execute!(
        std::io::stdout(),
        DisableMouseCapture,
        Clear(ClearType::All),
        MoveTo(0, 0),
        Show
    )?;
    disable_raw_mode()?;
    ret
}

async fn handle_connection(adapter: &Adapter, opts: &LinkOptions) -> anyhow::Result<()> {
    let peripheral = connection::connect(adapter, opts).await?;
    let robot = Spherebot::new(peripheral, opts).await?;
    drive(robot).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_file.as_deref())?;

    if args.mock {
        let link = MockSpherebot::new(Duration::from_millis(args.mock_latency_ms));
        return drive(link).await;
    }

    let opts = args.link_options();
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(anyhow!("no bluetooth adapter"))?;
    adapter
        .start_scan(ScanFilter {
            services: vec![opts.service],
        })
        .await
        .context("failed to start scanning")?;

    loop {
        match handle_connection(&adapter, &opts).await {
            Ok(()) => {
                eprintln!("exiting...");
                break;
            }
            Err(e) if args.once => return Err(e),
            Err(e) => {
                log::error!("lost connection, restarting (cause: {e:#})");
                tokio::time::sleep(TICK).await;
            }
        }
    }

    Ok(())
}
