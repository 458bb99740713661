//! Geometry of the joysticks on the spherebot remote.
//!
//! Each joystick is a vertical capsule with a round "knob" that slides along
//! its centerline. The knob's position encodes a motor power in `[-1, 1]`:
//! at the very top it is `1` (full forward), in the middle it is `0`, and at
//! the very bottom it is `-1`.
//!
//! There are two coordinate spaces. Pointer events arrive in [`Viewport`]
//! coordinates (terminal cells, window pixels, whatever the host uses), but
//! the knob is positioned in the capsule's own [`Local`] coordinates, with
//! the origin at the top-left corner of the capsule. The two are related by
//! the rectangle that the capsule is drawn into, which need not have the same
//! size (or even the same aspect ratio) as the capsule itself.
//!
//! This crate supports `no_std`.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod sampler;

pub struct Viewport;
pub struct Local;

pub type ViewportPoint = euclid::Point2D<f32, Viewport>;
pub type ViewportRect = euclid::Rect<f32, Viewport>;
pub type LocalPoint = euclid::Point2D<f32, Local>;
pub type LocalSize = euclid::Size2D<f32, Local>;

// Below this much travel, the knob can't really move and we treat the
// joystick as stuck in the middle.
const MIN_TRAVEL: f32 = 1e-3;

// The ratio `to / from`, or 1 if that doesn't make sense.
fn scale(to: f32, from: f32) -> f32 {
    let s = to / from;
    if s.is_finite() {
        s
    } else {
        1.0
    }
}

// Undoes scaling by `scale(logical, drawn)`.
fn unscale(v: f32, logical: f32, drawn: f32) -> f32 {
    let back = v * drawn / logical;
    if (logical / drawn).is_finite() && back.is_finite() {
        back
    } else {
        v
    }
}

/// A joystick's shape, and where it is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Joystick {
    /// The logical size of the capsule.
    pub size: LocalSize,
    /// The area of the viewport that the capsule is drawn into.
    pub bounds: ViewportRect,
}

impl Joystick {
    /// A joystick that is drawn at its logical size.
    pub fn unscaled(bounds: ViewportRect) -> Joystick {
        Joystick {
            size: LocalSize::new(bounds.size.width, bounds.size.height),
            bounds,
        }
    }

    pub fn new(size: LocalSize, bounds: ViewportRect) -> Joystick {
        Joystick { size, bounds }
    }

    /// The radius of the knob. It is almost as wide as the capsule.
    pub fn radius(&self) -> f32 {
        (self.size.width / 2.0 - 1.0).max(0.0)
    }

    // How far the knob's center can move from the middle, in either direction.
    fn travel(&self) -> Option<f32> {
        let travel = self.size.height / 2.0 - self.radius();
        // This also rejects NaN.
        (travel > MIN_TRAVEL && travel.is_finite()).then_some(travel)
    }

    /// The vertical position of the knob's center, for a given value.
    pub fn value_to_y(&self, value: f32) -> f32 {
        let mid = self.size.height / 2.0;
        match self.travel() {
            Some(travel) => mid - value.clamp(-1.0, 1.0) * travel,
            None => mid,
        }
    }

    /// The value corresponding to a vertical position, which is allowed to be
    /// outside the capsule.
    pub fn y_to_value(&self, y: f32) -> f32 {
        let Some(travel) = self.travel() else {
            return 0.0;
        };
        let value = (self.size.height / 2.0 - y) / travel;
        if value.is_nan() {
            0.0
        } else {
            value.clamp(-1.0, 1.0)
        }
    }

    pub fn knob_center(&self, value: f32) -> LocalPoint {
        LocalPoint::new(self.size.width / 2.0, self.value_to_y(value))
    }

    pub fn contains(&self, p: ViewportPoint) -> bool {
        self.bounds.contains(p)
    }

    pub fn viewport_to_local(&self, p: ViewportPoint) -> LocalPoint {
        let sx = scale(self.size.width, self.bounds.size.width);
        let sy = scale(self.size.height, self.bounds.size.height);
        LocalPoint::new(
            (p.x - self.bounds.origin.x) * sx,
            (p.y - self.bounds.origin.y) * sy,
        )
    }

    /// Where a point of the capsule ends up in the viewport. This undoes
    /// [`Joystick::viewport_to_local`] whenever neither size is degenerate.
    pub fn local_to_viewport(&self, p: LocalPoint) -> ViewportPoint {
        ViewportPoint::new(
            self.bounds.origin.x + unscale(p.x, self.size.width, self.bounds.size.width),
            self.bounds.origin.y + unscale(p.y, self.size.height, self.bounds.size.height),
        )
    }

    /// The value selected by a pointer at `p`.
    pub fn sample(&self, p: ViewportPoint) -> f32 {
        self.y_to_value(self.viewport_to_local(p).y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use euclid::{point2, rect, size2};
    use proptest::prelude::*;

    fn stick(width: f32, height: f32) -> Joystick {
        Joystick::unscaled(rect(0.0, 0.0, width, height))
    }

    #[test]
    fn ends_and_middle() {
        // radius 14, travel 86
        let j = stick(30.0, 200.0);
        assert_eq!(j.radius(), 14.0);
        assert_eq!(j.value_to_y(0.0), 100.0);
        assert_eq!(j.value_to_y(1.0), 14.0);
        assert_eq!(j.value_to_y(-1.0), 186.0);
        assert_eq!(j.y_to_value(14.0), 1.0);
        assert_eq!(j.y_to_value(186.0), -1.0);
        assert_eq!(j.y_to_value(100.0), 0.0);
        assert_eq!(j.y_to_value(57.0), 0.5);
    }

    #[test]
    fn degenerate_sizes() {
        for j in [
            stick(30.0, 0.0),
            stick(30.0, 28.0),
            stick(0.0, 0.0),
            stick(30.0, f32::NAN),
        ] {
            assert_eq!(j.y_to_value(0.0), 0.0);
            assert_eq!(j.y_to_value(-1e9), 0.0);
            assert!(!j.value_to_y(1.0).is_infinite());
        }
        // A capsule too narrow for a knob still works.
        let j = stick(1.0, 100.0);
        assert_eq!(j.radius(), 0.0);
        assert_eq!(j.y_to_value(0.0), 1.0);
    }

    #[test]
    fn scaled_viewport() {
        // Drawn at twice the logical width, and half the logical height, offset
        // from the viewport origin.
        let j = Joystick::new(size2(30.0, 200.0), rect(100.0, 50.0, 60.0, 100.0));
        assert_eq!(j.viewport_to_local(point2(100.0, 50.0)), point2(0.0, 0.0));
        assert_eq!(j.viewport_to_local(point2(130.0, 100.0)), point2(15.0, 100.0));
        assert_eq!(j.sample(point2(130.0, 100.0)), 0.0);
        assert_eq!(j.sample(point2(130.0, 57.0)), 1.0);
        assert!(j.contains(point2(159.0, 149.0)));
        assert!(!j.contains(point2(99.0, 60.0)));

        // The knob at full forward is drawn 43 below the top of the bounds.
        assert_eq!(j.knob_center(1.0), point2(15.0, 14.0));
        assert_eq!(j.local_to_viewport(j.knob_center(1.0)), point2(130.0, 57.0));
        assert_eq!(j.local_to_viewport(j.knob_center(0.0)), point2(130.0, 100.0));
    }

    #[test]
    fn zero_sized_bounds() {
        let j = Joystick::new(size2(30.0, 200.0), rect(10.0, 10.0, 0.0, 0.0));
        assert_eq!(j.viewport_to_local(point2(12.0, 20.0)), point2(2.0, 10.0));
        assert_eq!(j.local_to_viewport(point2(2.0, 10.0)), point2(12.0, 20.0));
    }

    proptest! {
        #[test]
        fn values_are_clamped(width in 0.0f32..100.0, height in 0.0f32..2000.0, y in -1e6f32..1e6) {
            let v = stick(width, height).y_to_value(y);
            prop_assert!((-1.0..=1.0).contains(&v));
        }

        #[test]
        fn round_trip(width in 4.0f32..60.0, height in 100.0f32..2000.0, v in -1.0f32..=1.0) {
            let j = stick(width, height);
            let back = j.y_to_value(j.value_to_y(v));
            prop_assert!((back - v).abs() < 1e-4, "{v} -> {back}");
        }

        #[test]
        fn drawn_knob_samples_its_value(
            width in 4.0f32..60.0,
            height in 100.0f32..2000.0,
            drawn_w in 1.0f32..500.0,
            drawn_h in 1.0f32..500.0,
            v in -1.0f32..=1.0,
        ) {
            let j = Joystick::new(size2(width, height), rect(10.0, 20.0, drawn_w, drawn_h));
            let back = j.sample(j.local_to_viewport(j.knob_center(v)));
            prop_assert!((back - v).abs() < 1e-3, "{v} -> {back}");
        }

        #[test]
        fn up_is_positive(width in 4.0f32..60.0, height in 100.0f32..2000.0, y0 in 0.0f32..1.0, y1 in 0.0f32..1.0) {
            let j = stick(width, height);
            let (hi, lo) = if y0 < y1 { (y0, y1) } else { (y1, y0) };
            prop_assert!(j.y_to_value(hi * height) >= j.y_to_value(lo * height));
        }
    }
}
