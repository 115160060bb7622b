//! Per-class draw routines for the double-moon sampler.

use std::f64::consts::PI;

use rand::Rng;

use crate::sample::Point;

/// Which half-plane a moon opens towards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Orientation {
    /// `x2 = c.x2 + r·sin(angle)`.
    Upper,
    /// `x2 = c.x2 - r·sin(angle)`.
    Lower,
}

/// Squared-radius bounds of a moon of the given width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Annulus {
    pub(super) inner_squared: f64,
    pub(super) outer_squared: f64,
}

impl Annulus {
    #[expect(
        clippy::float_arithmetic,
        reason = "radius bounds derive from the configured width"
    )]
    pub(super) fn from_width(width: f64) -> Self {
        let half = width / 2.0;
        Self {
            inner_squared: (1.0 - half).powi(2),
            outer_squared: (1.0 + half).powi(2),
        }
    }

    /// Interpolates linearly in squared radius, then takes the square root.
    #[expect(
        clippy::float_arithmetic,
        reason = "radius sampling requires floating-point arithmetic"
    )]
    fn radius(self, unit: f64) -> f64 {
        (self.inner_squared + unit * (self.outer_squared - self.inner_squared)).sqrt()
    }
}

/// Draws `count` points of one moon.
///
/// The stream is consumed in blocks: every angle, then every radius, then
/// the x-noise and y-noise columns. Noise draws happen even when
/// `noise == 0.0`.
#[expect(
    clippy::float_arithmetic,
    reason = "moon coordinates are trigonometric expressions"
)]
pub(super) fn moon_points<R: Rng + ?Sized>(
    center: Point,
    orientation: Orientation,
    annulus: Annulus,
    noise: f64,
    count: usize,
    rng: &mut R,
) -> Vec<Point> {
    let angles: Vec<f64> = (0..count)
        .map(|_| PI * rng.gen_range(0.0_f64..1.0_f64))
        .collect();
    let radii: Vec<f64> = (0..count)
        .map(|_| annulus.radius(rng.gen_range(0.0_f64..1.0_f64)))
        .collect();
    let noise_x: Vec<f64> = (0..count)
        .map(|_| noise * standard_normal_sample(rng))
        .collect();
    let noise_y: Vec<f64> = (0..count)
        .map(|_| noise * standard_normal_sample(rng))
        .collect();

    angles
        .iter()
        .zip(&radii)
        .zip(noise_x.iter().zip(&noise_y))
        .map(|((&angle, &radius), (&dx, &dy))| {
            let rise = radius * angle.sin();
            let x2 = match orientation {
                Orientation::Upper => center.x2 + rise,
                Orientation::Lower => center.x2 - rise,
            };
            Point::new(center.x1 + radius * angle.cos() + dx, x2 + dy)
        })
        .collect()
}

#[expect(
    clippy::float_arithmetic,
    reason = "Box-Muller transform requires floating-point arithmetic"
)]
pub(super) fn standard_normal_sample<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let mut u1 = rng.gen_range(0.0_f64..1.0_f64);
    if u1 <= f64::EPSILON {
        u1 = f64::EPSILON;
    }
    let u2 = rng.gen_range(0.0_f64..1.0_f64);
    let radius = (-2.0_f64 * u1.ln()).sqrt();
    radius * (2.0_f64 * PI * u2).cos()
}
