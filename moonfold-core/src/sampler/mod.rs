//! Synthetic double-moon sampler.
//!
//! Generates two interleaved annular arcs in the plane. Class 0 opens
//! upwards around its centre, class 1 is reflected and opens downwards, so
//! the two moons hook into each other. Output is a pure function of the
//! supplied random stream.

mod generation;

use rand::Rng;
use tracing::{debug, instrument};

use crate::{
    error::SamplerError,
    sample::{Label, Point, SampleTable},
};
use generation::{Annulus, Orientation, moon_points};

/// Fraction of samples assigned to class 0 when the caller has no preference.
pub const DEFAULT_CLASS0_FRACTION: f64 = 0.5;

/// Geometry and noise of the two moons.
///
/// Each call to [`DoubleMoonConfig::default`] builds a fresh value; nothing
/// is shared between samplers.
#[derive(Clone, Debug, PartialEq)]
pub struct DoubleMoonConfig {
    /// Centre of the class-0 moon.
    pub center_class0: Point,
    /// Centre of the class-1 moon.
    pub center_class1: Point,
    /// Radial width shared by both moons.
    pub width: f64,
    /// Standard deviation of the Gaussian noise added to each coordinate.
    pub noise: f64,
}

impl Default for DoubleMoonConfig {
    fn default() -> Self {
        Self {
            center_class0: Point::new(-0.5, -0.2),
            center_class1: Point::new(0.5, 0.2),
            width: 0.4,
            noise: 0.0,
        }
    }
}

/// Draws labelled double-moon samples from a caller-supplied generator.
///
/// # Examples
/// ```
/// use moonfold_core::{DoubleMoonConfig, DoubleMoonSampler};
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let sampler = DoubleMoonSampler::new(DoubleMoonConfig::default())?;
/// let mut rng = StdRng::seed_from_u64(42);
/// let table = sampler.sample(10, 0.5, &mut rng)?;
/// assert_eq!(table.len(), 10);
/// assert_eq!(table.class_counts(), (5, 5));
/// # Ok::<(), moonfold_core::SamplerError>(())
/// ```
#[derive(Clone, Debug)]
pub struct DoubleMoonSampler {
    config: DoubleMoonConfig,
    annulus: Annulus,
}

impl DoubleMoonSampler {
    /// Validates `config` and prepares the radius bounds.
    ///
    /// # Errors
    /// Returns [`SamplerError::InvalidParameter`] when a centre coordinate is
    /// not finite, the width is outside `(0, 2]`, or the noise level is
    /// negative or not finite.
    pub fn new(config: DoubleMoonConfig) -> Result<Self, SamplerError> {
        validate_center(config.center_class0, "center_class0")?;
        validate_center(config.center_class1, "center_class1")?;
        if !config.width.is_finite() || config.width <= 0.0 || config.width > 2.0 {
            return Err(SamplerError::InvalidParameter { parameter: "width" });
        }
        if !config.noise.is_finite() || config.noise < 0.0 {
            return Err(SamplerError::InvalidParameter { parameter: "noise" });
        }
        let annulus = Annulus::from_width(config.width);
        Ok(Self { config, annulus })
    }

    /// Returns the validated configuration.
    #[must_use]
    pub fn config(&self) -> &DoubleMoonConfig {
        &self.config
    }

    /// Returns `(1 - width/2)²`.
    #[must_use]
    pub fn inner_radius_squared(&self) -> f64 {
        self.annulus.inner_squared
    }

    /// Returns `(1 + width/2)²`.
    #[must_use]
    pub fn outer_radius_squared(&self) -> f64 {
        self.annulus.outer_squared
    }

    /// Draws `count` samples: `⌊fraction·count⌋` of class 0 followed by the
    /// remainder of class 1.
    ///
    /// Class 0 is drawn completely before class 1, so identical generator
    /// states reproduce identical tables.
    ///
    /// # Errors
    /// Returns [`SamplerError::ZeroSamples`] for `count == 0` and
    /// [`SamplerError::InvalidClassFraction`] unless `0 < fraction < 1`.
    #[instrument(
        name = "sampler.sample",
        err,
        skip(self, rng),
        fields(width = self.config.width, noise = self.config.noise),
    )]
    pub fn sample<R: Rng + ?Sized>(
        &self,
        count: usize,
        class0_fraction: f64,
        rng: &mut R,
    ) -> Result<SampleTable, SamplerError> {
        if count == 0 {
            return Err(SamplerError::ZeroSamples);
        }
        if !class0_fraction.is_finite() || class0_fraction <= 0.0 || class0_fraction >= 1.0 {
            return Err(SamplerError::InvalidClassFraction {
                value: class0_fraction,
            });
        }
        let class0 = class0_count(count, class0_fraction);
        let class1 = count - class0;

        let mut table = SampleTable::default();
        table.append(
            moon_points(
                self.config.center_class0,
                Orientation::Upper,
                self.annulus,
                self.config.noise,
                class0,
                rng,
            ),
            Label::Zero,
        );
        table.append(
            moon_points(
                self.config.center_class1,
                Orientation::Lower,
                self.annulus,
                self.config.noise,
                class1,
                rng,
            ),
            Label::One,
        );
        debug!(class0, class1, "double-moon samples drawn");
        Ok(table)
    }
}

fn validate_center(center: Point, parameter: &'static str) -> Result<(), SamplerError> {
    if center.x1.is_finite() && center.x2.is_finite() {
        Ok(())
    } else {
        Err(SamplerError::InvalidParameter { parameter })
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::float_arithmetic,
    reason = "class size is the integer part of fraction * count, bounded by count"
)]
fn class0_count(count: usize, fraction: f64) -> usize {
    let raw = (fraction * count as f64).floor() as usize;
    raw.min(count)
}
