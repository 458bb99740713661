//! Mouse control in the terminal.
//!
//! The left half of the terminal is the left joystick and the right half is
//! the right joystick: press anywhere in a half and drag up or down. The
//! joysticks themselves are narrow capsules as tall as the terminal, drawn
//! stretched across their halves. Each one shows up as a track down the
//! middle of its half, with the knob on it and the current value in the
//! corner.

use std::io::Write;

use crossterm::{
    cursor::MoveTo,
    event::{
        Event as TermEvent, EventStream, KeyCode, KeyEventKind, KeyModifiers, MouseButton,
        MouseEvent, MouseEventKind,
    },
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use euclid::{point2, rect, size2};
use futures::StreamExt as _;
use spherebot_geom::{
    sampler::{Pointer, PointerEvent, Sampler},
    Joystick, ViewportPoint,
};
use spherebot_protocol::MotorId;
use tokio::sync::mpsc;

use crate::session::Event;

/// The logical width of a joystick, in terminal cells.
const STICK_WIDTH: f32 = 6.0;

pub struct Controls {
    left: Sampler,
    right: Sampler,
}

fn layout(cols: u16, rows: u16) -> [Joystick; 2] {
    let half = cols as f32 / 2.0;
    let height = rows as f32;
    let size = size2(STICK_WIDTH, height);
    [
        Joystick::new(size, rect(0.0, 0.0, half, height)),
        Joystick::new(size, rect(half, 0.0, half, height)),
    ]
}

impl Controls {
    pub fn new(cols: u16, rows: u16) -> Self {
        let [left, right] = layout(cols, rows);
        Controls {
            left: Sampler::new(left),
            right: Sampler::new(right),
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        let [left, right] = layout(cols, rows);
        self.left.set_joystick(left);
        self.right.set_joystick(right);
    }

    fn sampler(&self, motor: MotorId) -> &Sampler {
        match motor {
            MotorId::Left => &self.left,
            MotorId::Right => &self.right,
        }
    }

    fn sampler_mut(&mut self, motor: MotorId) -> &mut Sampler {
        match motor {
            MotorId::Left => &mut self.left,
            MotorId::Right => &mut self.right,
        }
    }

    /// Feeds a mouse event to both joysticks, returning the values that changed.
    pub fn handle_mouse(&mut self, ev: MouseEvent) -> Vec<(MotorId, f32)> {
        // Aim for the middle of the cell.
        let at: ViewportPoint = point2(ev.column as f32 + 0.5, ev.row as f32 + 0.5);
        let ev = match ev.kind {
            MouseEventKind::Down(MouseButton::Left) => PointerEvent::Press(Pointer::Mouse, at),
            MouseEventKind::Drag(MouseButton::Left) => PointerEvent::Move(Pointer::Mouse, at),
            MouseEventKind::Up(MouseButton::Left) => PointerEvent::Release(Pointer::Mouse),
            _ => return Vec::new(),
        };

        MotorId::ALL
            .into_iter()
            .filter_map(|motor| Some((motor, self.sampler_mut(motor).handle(ev)?)))
            .collect()
    }

    /// The cell that `motor`'s knob is drawn in, as (column, row).
    fn knob_cell(&self, motor: MotorId) -> (u16, u16) {
        let sampler = self.sampler(motor);
        let stick = sampler.joystick();
        let at = stick.local_to_viewport(stick.knob_center(sampler.value()));
        (cell(at.x), cell(at.y))
    }

    pub fn draw(&self, out: &mut impl Write) -> std::io::Result<()> {
        queue!(out, Clear(ClearType::All))?;
        for motor in MotorId::ALL {
            let sampler = self.sampler(motor);
            let bounds = sampler.joystick().bounds;
            let (col, knob) = self.knob_cell(motor);
            for row in 0..cell(bounds.max_y()) {
                let c = if row == knob { '█' } else { '│' };
                queue!(out, MoveTo(col, row), Print(c))?;
            }
            queue!(
                out,
                MoveTo(cell(bounds.min_x()), 0),
                Print(format!("{:+.2}", sampler.value()))
            )?;
        }
        out.flush()
    }
}

// Float casts saturate, so anything above or left of the screen lands in the
// first row or column.
fn cell(coord: f32) -> u16 {
    coord as u16
}

fn is_quit(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Reads terminal events until the user quits (or the session goes away),
/// turning them into session events.
///
/// The session is always told to end when this returns, even on error.
pub async fn forward_terminal(tx: mpsc::Sender<Event>) -> anyhow::Result<()> {
    let ret = forward_until_quit(&tx).await;
    let _ = tx.send(Event::End).await;
    ret
}

async fn forward_until_quit(tx: &mpsc::Sender<Event>) -> anyhow::Result<()> {
    let (cols, rows) = crossterm::terminal::size()?;
    let mut controls = Controls::new(cols, rows);
    let mut events = EventStream::new();
    let mut stdout = std::io::stdout();
    controls.draw(&mut stdout)?;

    while let Some(ev) = events.next().await.transpose()? {
        match ev {
            TermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                if is_quit(key.code, key.modifiers) {
                    return Ok(());
                }
            }
            TermEvent::Resize(cols, rows) => {
                controls.resize(cols, rows);
                controls.draw(&mut stdout)?;
            }
            TermEvent::Mouse(mouse) => {
                let changed = controls.handle_mouse(mouse);
                if changed.is_empty() {
                    continue;
                }
                controls.draw(&mut stdout)?;
                for (motor, value) in changed {
                    if tx.send(Event::ValueChanged(motor, value)).await.is_err() {
                        return Ok(());
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}
