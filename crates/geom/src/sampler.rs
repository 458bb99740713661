//! Turning pointer drags into joystick values.

use crate::{Joystick, ViewportPoint};

/// Something that can drag a joystick's knob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pointer {
    Mouse,
    /// A touch, identified by whatever id the platform assigned to it.
    Touch(u64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Press(Pointer, ViewportPoint),
    Move(Pointer, ViewportPoint),
    Release(Pointer),
}

/// Tracks one joystick's knob as it gets dragged around.
///
/// A press on the joystick captures that pointer, and from then on only that
/// pointer moves the knob (even if it strays outside the joystick) until it is
/// released. Other touches landing on the joystick in the meantime are
/// ignored.
#[derive(Clone, Debug)]
pub struct Sampler {
    joystick: Joystick,
    captured: Option<Pointer>,
    value: f32,
}

impl Sampler {
    pub fn new(joystick: Joystick) -> Sampler {
        Sampler {
            joystick,
            captured: None,
            value: 0.0,
        }
    }

    pub fn joystick(&self) -> &Joystick {
        &self.joystick
    }

    /// Changes the joystick's geometry, for example because the window was
    /// resized. Any drag in progress carries on.
    pub fn set_joystick(&mut self, joystick: Joystick) {
        self.joystick = joystick;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn captured(&self) -> Option<Pointer> {
        self.captured
    }

    /// Processes a pointer event, returning the new value if it changed.
    pub fn handle(&mut self, event: PointerEvent) -> Option<f32> {
        match event {
            PointerEvent::Press(pointer, p) => {
                if self.captured.is_some() || !self.joystick.contains(p) {
                    return None;
                }
                self.captured = Some(pointer);
                self.update(p)
            }
            PointerEvent::Move(pointer, p) => {
                if self.captured != Some(pointer) {
                    return None;
                }
                self.update(p)
            }
            PointerEvent::Release(pointer) => {
                if self.captured == Some(pointer) {
                    self.captured = None;
                }
                None
            }
        }
    }

    fn update(&mut self, p: ViewportPoint) -> Option<f32> {
        let value = self.joystick.sample(p);
        if value == self.value {
            return None;
        }
        self.value = value;
        Some(value)
    }
}
