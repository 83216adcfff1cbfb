//! Threshold spike non-linearity with a hand-defined surrogate gradient.
//!
//! The forward pass is a Heaviside step (`v >= threshold` fires). Its true
//! derivative is zero almost everywhere, so the backward pass substitutes a
//! boxcar of height `1/width` centred on the threshold. The boxcar is the exact
//! derivative of [`SurrogateSpike::relaxed`], a piecewise-linear ramp, which
//! gives the surrogate a function to be checked against numerically.
//!
//! Two variants exist and are paired with the layer's reset policy:
//! - [`ThresholdSubtract`]: the membrane is reduced linearly by the spike, so
//!   gradient flows back through the spike's effect on the next state.
//! - [`ThresholdReset`]: the membrane is forced to zero on a spike; that
//!   discontinuous reset is treated as a constant during backpropagation.

use std::fmt;

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

/// Gradients of the spike output with respect to its two inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeGrad {
    pub membrane: ArrayD<f32>,
    pub threshold: ArrayD<f32>,
}

/// A differentiable spike primitive: hard forward, surrogate backward.
///
/// All arrays passed to one call share the same shape.
pub trait SurrogateSpike: fmt::Debug + Send + Sync {
    fn spike(&self, membrane: &ArrayD<f32>, threshold: &ArrayD<f32>) -> ArrayD<f32> {
        Zip::from(membrane)
            .and(threshold)
            .map_collect(|&v, &theta| if v >= theta { 1.0 } else { 0.0 })
    }

    /// Pseudo-derivative `d spike / d membrane`.
    fn surrogate_grad(
        &self,
        membrane: &ArrayD<f32>,
        threshold: &ArrayD<f32>,
        width: &ArrayD<f32>,
    ) -> ArrayD<f32> {
        Zip::from(membrane)
            .and(threshold)
            .and(width)
            .map_collect(|&v, &theta, &w| boxcar(v - theta, w))
    }

    /// Smooth stand-in for the step whose derivative is `surrogate_grad`.
    fn relaxed(
        &self,
        membrane: &ArrayD<f32>,
        threshold: &ArrayD<f32>,
        width: &ArrayD<f32>,
    ) -> ArrayD<f32> {
        Zip::from(membrane)
            .and(threshold)
            .and(width)
            .map_collect(|&v, &theta, &w| ((v - theta) / w + 0.5).clamp(0.0, 1.0))
    }

    /// Chain `grad_output` through the spike to membrane and threshold.
    fn backward(
        &self,
        grad_output: &ArrayD<f32>,
        membrane: &ArrayD<f32>,
        threshold: &ArrayD<f32>,
        width: &ArrayD<f32>,
    ) -> SpikeGrad {
        let membrane_grad = grad_output * &self.surrogate_grad(membrane, threshold, width);
        let threshold_grad = membrane_grad.mapv(|g| -g);
        SpikeGrad {
            membrane: membrane_grad,
            threshold: threshold_grad,
        }
    }

    /// Whether the spike's reset of the next membrane state carries gradient.
    fn gradient_through_reset(&self) -> bool;
}

#[inline]
fn boxcar(distance: f32, width: f32) -> f32 {
    if distance.abs() <= width * 0.5 {
        1.0 / width
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdSubtract;

impl SurrogateSpike for ThresholdSubtract {
    fn gradient_through_reset(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdReset;

impl SurrogateSpike for ThresholdReset {
    fn gradient_through_reset(&self) -> bool {
        false
    }
}

static SUBTRACT: ThresholdSubtract = ThresholdSubtract;
static RESET: ThresholdReset = ThresholdReset;

/// What happens to the membrane potential after a spike. Fixed per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPolicy {
    /// Subtract `membrane_subtract` on the step after a spike.
    Subtract,
    /// Force the potential to zero on the step after a spike.
    Reset,
}

impl ResetPolicy {
    pub fn from_membrane_reset(membrane_reset: bool) -> Self {
        if membrane_reset {
            ResetPolicy::Reset
        } else {
            ResetPolicy::Subtract
        }
    }

    pub fn surrogate(self) -> &'static dyn SurrogateSpike {
        match self {
            ResetPolicy::Subtract => &SUBTRACT,
            ResetPolicy::Reset => &RESET,
        }
    }
}
