//! Where the log goes.
//!
//! While driving, the terminal is in raw mode and belongs to the joysticks.
//! Raw mode doesn't move back to the first column on a newline, so log lines
//! that go to the terminal get `\r\n` endings. They still land on top of the
//! joysticks; `--log-file` sends them somewhere else.

use std::{
    fs::File,
    io::{self, IsTerminal as _, Write},
    path::Path,
};

use anyhow::Context as _;
use pretty_env_logger::env_logger::Target;

/// Sets up `pretty_env_logger`, filtered by `RUST_LOG` as usual.
pub fn init(file: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = pretty_env_logger::formatted_builder();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    match file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(file)));
        }
        None if io::stderr().is_terminal() => {
            builder.target(Target::Pipe(Box::new(RawLines(io::stderr()))));
        }
        None => {}
    }
    builder.try_init()?;
    Ok(())
}

/// Ends every line with `\r\n`.
struct RawLines<W>(W);

impl<W: Write> Write for RawLines<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for (i, line) in buf.split(|&b| b == b'\n').enumerate() {
            if i > 0 {
                self.0.write_all(b"\r\n")?;
            }
            self.0.write_all(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
