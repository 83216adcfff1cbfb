//! Rate coding of intensity images into Bernoulli spike trains.
//!
//! Each pixel fires independently at every step with probability
//! `|x| / norm * max_rate / 1000`, i.e. `max_rate` is in Hz at 1 ms steps.

use ndarray::{Array, ArrayD, Dimension, IxDyn};
use rand::Rng;

use crate::error::{EncodeError, EncodeResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RateEncoder {
    /// Number of steps to generate.
    pub time_window: usize,
    /// Firing rate of a pixel at `norm`, in Hz.
    pub max_rate: f32,
    /// Intensity mapped to `max_rate`.
    pub norm: f32,
    /// Emit `-1` spikes for negative intensities instead of staying silent.
    pub negative_spikes: bool,
    /// Drop singleton axes of the image first.
    pub squeeze: bool,
}

impl Default for RateEncoder {
    fn default() -> Self {
        Self {
            time_window: 100,
            max_rate: 1000.0,
            norm: 255.0,
            negative_spikes: false,
            squeeze: false,
        }
    }
}

impl RateEncoder {
    pub fn new(time_window: usize) -> Self {
        Self { time_window, ..Self::default() }
    }

    /// `image` of shape `S` -> spikes of shape `(time_window, *S)`.
    pub fn encode<R: Rng + ?Sized>(&self, image: &ArrayD<f32>, rng: &mut R) -> EncodeResult<ArrayD<f32>> {
        if !(self.norm.is_finite() && self.norm > 0.0) {
            return Err(EncodeError::InvalidSetting { name: "norm", reason: "must be positive" });
        }
        if !(self.max_rate.is_finite() && self.max_rate >= 0.0) {
            return Err(EncodeError::InvalidSetting {
                name: "max_rate",
                reason: "must be non-negative",
            });
        }

        let image = if self.squeeze { squeeze(image)? } else { image.clone() };
        let (norm, rate) = (self.norm, self.max_rate / 1000.0);
        let mut shape = Vec::with_capacity(image.ndim() + 1);
        shape.push(self.time_window);
        shape.extend_from_slice(image.shape());

        let negative_spikes = self.negative_spikes;
        let spikes = Array::from_shape_fn(IxDyn(&shape), |idx| {
            let x = image[&idx.slice()[1..]];
            let draw: f32 = rng.gen();
            if negative_spikes {
                if draw < x.abs() / norm * rate { x.signum() } else { 0.0 }
            } else if draw < x / norm * rate {
                1.0
            } else {
                0.0
            }
        });
        Ok(spikes)
    }
}

fn squeeze(image: &ArrayD<f32>) -> EncodeResult<ArrayD<f32>> {
    let shape: Vec<usize> = image.shape().iter().copied().filter(|&d| d != 1).collect();
    let data: Vec<f32> = image.iter().copied().collect();
    Array::from_shape_vec(IxDyn(&shape), data).map_err(|e| EncodeError::Tensor(e.to_string()))
}
