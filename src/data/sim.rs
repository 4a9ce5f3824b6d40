//! Simulated beamline hardware for dry runs and tests.
//!
//! `SimMotor` moves instantly. `SimDetector` reads the motor position through a
//! shared handle and returns the response of an ideal peak or edge, optionally
//! with Poisson counting noise from a seeded RNG.

use std::cell::Cell;
use std::rc::Rc;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Poisson;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::scan::{Detector, Motor};

/// Shared readback of a simulated motor.
pub type PositionHandle = Rc<Cell<f64>>;

#[derive(Debug, Clone)]
pub struct SimMotor {
    name: String,
    position: PositionHandle,
}

impl SimMotor {
    pub fn new(name: &str, position: f64) -> Self {
        Self {
            name: name.to_string(),
            position: Rc::new(Cell::new(position)),
        }
    }

    /// Readback handle for detectors that depend on this motor.
    pub fn handle(&self) -> PositionHandle {
        Rc::clone(&self.position)
    }
}

impl Motor for SimMotor {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Result<f64, AppError> {
        Ok(self.position.get())
    }

    fn move_to(&mut self, x: f64) -> Result<(), AppError> {
        if !x.is_finite() {
            return Err(AppError::new(4, format!("Refusing to move {} to {x}.", self.name)));
        }
        self.position.set(x);
        Ok(())
    }
}

/// Ideal (noise-free) detector response as a function of motor position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Response {
    /// Gaussian peak on a flat background.
    Peak {
        x0: f64,
        amplitude: f64,
        sigma: f64,
        background: f64,
    },
    /// Falling logistic edge on a flat background.
    Edge {
        x0: f64,
        amplitude: f64,
        sigma: f64,
        background: f64,
    },
}

impl Response {
    pub fn peak(x0: f64, amplitude: f64, sigma: f64, background: f64) -> Self {
        Response::Peak {
            x0,
            amplitude,
            sigma,
            background,
        }
    }

    pub fn edge(x0: f64, amplitude: f64, sigma: f64, background: f64) -> Self {
        Response::Edge {
            x0,
            amplitude,
            sigma,
            background,
        }
    }

    /// The beamline test rig: a peak at -40 and an edge at -17.
    pub fn demo_peak() -> Self {
        Response::peak(-40.0, 1000.0, 0.1, 10.0)
    }

    pub fn demo_edge() -> Self {
        Response::edge(-17.0, 1000.0, 0.05, 10.0)
    }

    /// Where the feature sits.
    pub fn center(&self) -> f64 {
        match *self {
            Response::Peak { x0, .. } | Response::Edge { x0, .. } => x0,
        }
    }

    pub fn intensity(&self, x: f64) -> f64 {
        match *self {
            Response::Peak {
                x0,
                amplitude,
                sigma,
                background,
            } => amplitude * (-(x - x0).powi(2) / (2.0 * sigma * sigma)).exp() + background,
            Response::Edge {
                x0,
                amplitude,
                sigma,
                background,
            } => amplitude / (1.0 + ((x - x0) / sigma).exp()) + background,
        }
    }
}

pub struct SimDetector {
    name: String,
    position: PositionHandle,
    response: Response,
    rng: Option<StdRng>,
}

impl SimDetector {
    /// `seed: None` gives the ideal response; `Some(seed)` adds Poisson noise.
    pub fn new(name: &str, position: PositionHandle, response: Response, seed: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            position,
            response,
            rng: seed.map(StdRng::seed_from_u64),
        }
    }
}

impl Detector for SimDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<f64, AppError> {
        let mean = self.response.intensity(self.position.get());
        let Some(rng) = self.rng.as_mut() else {
            return Ok(mean);
        };
        if !(mean > 0.0) {
            return Ok(0.0);
        }
        let poisson =
            Poisson::new(mean).map_err(|e| AppError::new(4, format!("Counting noise error: {e}")))?;
        Ok(poisson.sample(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_follows_the_motor() {
        let mut motor = SimMotor::new("armz", 0.0);
        let mut det = SimDetector::new("intensity", motor.handle(), Response::peak(1.0, 100.0, 0.5, 5.0), None);
        assert!((det.read().unwrap() - (100.0 * (-2.0_f64).exp() + 5.0)).abs() < 1e-9);
        motor.move_to(1.0).unwrap();
        assert_eq!(det.read().unwrap(), 105.0);
    }

    #[test]
    fn edge_falls_through_half_height_at_center() {
        let r = Response::edge(-17.0, 1000.0, 0.05, 0.0);
        assert!((r.intensity(-17.0) - 500.0).abs() < 1e-9);
        assert!(r.intensity(-18.0) > 999.0);
        assert!(r.intensity(-16.0) < 1.0);
    }

    #[test]
    fn noise_is_reproducible_per_seed() {
        let motor = SimMotor::new("armz", -40.0);
        let read = |seed| {
            let mut det = SimDetector::new("intensity", motor.handle(), Response::demo_peak(), Some(seed));
            (0..5).map(|_| det.read().unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(read(3), read(3));
        assert!(read(3).iter().all(|&c| c >= 0.0 && c.fract() == 0.0));
    }

    #[test]
    fn motor_rejects_non_finite_targets() {
        let mut motor = SimMotor::new("armz", 1.0);
        assert!(motor.move_to(f64::NAN).is_err());
        assert_eq!(motor.position().unwrap(), 1.0);
    }
}
