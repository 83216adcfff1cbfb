//! Per-timestep membrane recurrence shared by LIF and ALIF, plus the tape
//! used to backpropagate through time.
//!
//! One step, in order:
//! 1. (adaptive) `b = rho * b + (1 - rho) * s_prev`, `theta = theta_0 + beta * b`
//! 2. subtract: `v = alpha * v + (1 - alpha) * x - sub * s_prev`
//!    reset:    `v = alpha * v * (1 - s_prev) + (1 - alpha) * x`
//! 3. `v = max(v, threshold_low)` when a floor is set
//! 4. `s = spike(v, theta)`

use ndarray::{stack, ArrayD, ArrayView, Axis, IxDyn};
use tracing::trace;

use crate::error::{LayerError, LayerResult};
use crate::state::NeuronState;
use crate::surrogate::ResetPolicy;

pub(crate) struct Adaptation {
    pub rho: ArrayD<f32>,
    pub scale: ArrayD<f32>,
}

/// Parameters of one forward call, already broadcast to the state shape.
pub(crate) struct Dynamics {
    pub alpha_mem: ArrayD<f32>,
    /// Static threshold (LIF) or base threshold (ALIF).
    pub threshold: ArrayD<f32>,
    pub threshold_low: Option<f32>,
    /// Explicit subtraction amount; `None` subtracts the current threshold.
    pub membrane_subtract: Option<ArrayD<f32>>,
    pub surrogate_window: f32,
    pub policy: ResetPolicy,
    pub adaptation: Option<Adaptation>,
}

struct StepRecord {
    prev_membrane: ArrayD<f32>,
    prev_spikes: ArrayD<f32>,
    membrane: ArrayD<f32>,
    clamp_mask: Option<ArrayD<f32>>,
    threshold: ArrayD<f32>,
    subtract: ArrayD<f32>,
    width: ArrayD<f32>,
}

/// Forward intermediates of one call, enough to run the recurrence backwards.
pub struct Tape {
    input_shape: Vec<usize>,
    policy: ResetPolicy,
    alpha_mem: ArrayD<f32>,
    adaptation: Option<(ArrayD<f32>, ArrayD<f32>)>,
    subtract_tracks_threshold: bool,
    steps: Vec<StepRecord>,
}

impl Dynamics {
    /// Run every step of `input` `(batch, time, *features)` against `state`,
    /// whose shape must already match. Returns the stacked spikes.
    pub(crate) fn run(
        &self,
        state: &mut NeuronState,
        input: &ArrayD<f32>,
        mut tape: Option<&mut Tape>,
    ) -> LayerResult<ArrayD<f32>> {
        let time_steps = input.shape()[1];
        let surrogate = self.policy.surrogate();
        let one_minus_alpha = self.alpha_mem.mapv(|a| 1.0 - a);
        let adapt_gain = self
            .adaptation
            .as_ref()
            .map(|a| a.rho.mapv(|r| 1.0 - r));

        let mut v = state.membrane_potential().clone();
        let mut prev = state.activations().clone();
        let mut b = state.adaptation().cloned();
        let mut threshold = self.threshold.clone();
        let mut outputs: Vec<ArrayD<f32>> = Vec::with_capacity(time_steps);

        for step in 0..time_steps {
            let current = input.index_axis(Axis(1), step);

            if let (Some(adapt), Some(gain), Some(b)) = (&self.adaptation, &adapt_gain, b.as_mut()) {
                *b = &*b * &adapt.rho + &(gain * &prev);
                threshold = &self.threshold + &(&adapt.scale * &*b);
            }

            let subtract = self.membrane_subtract.as_ref().unwrap_or(&threshold);
            let decayed = match self.policy {
                ResetPolicy::Subtract => &self.alpha_mem * &v - &(subtract * &prev),
                ResetPolicy::Reset => &self.alpha_mem * &(&v * &prev.mapv(|s| 1.0 - s)),
            };
            let mut next_v = decayed + &(&one_minus_alpha * &current);

            let clamp_mask = self.threshold_low.map(|low| {
                let mask = next_v.mapv(|x| if x >= low { 1.0 } else { 0.0 });
                next_v.mapv_inplace(|x| x.max(low));
                mask
            });

            let width = threshold.mapv(|t| t * self.surrogate_window);
            let spikes = surrogate.spike(&next_v, &threshold);

            if let Some(tape) = tape.as_deref_mut() {
                tape.steps.push(StepRecord {
                    prev_membrane: v.clone(),
                    prev_spikes: prev.clone(),
                    membrane: next_v.clone(),
                    clamp_mask,
                    threshold: threshold.clone(),
                    subtract: subtract.clone(),
                    width,
                });
            }

            v = next_v;
            prev = spikes.clone();
            outputs.push(spikes);
        }

        let views: Vec<ArrayView<'_, f32, IxDyn>> = outputs.iter().map(|s| s.view()).collect();
        let spikes = stack(Axis(1), &views).map_err(|e| LayerError::Tensor(e.to_string()))?;
        let spikes_number = spikes.iter().map(|s| s.abs()).sum::<f32>();
        trace!(
            batch = input.shape()[0],
            time_steps,
            spikes_number,
            "forward pass"
        );
        state.commit(v, prev, b, time_steps, spikes_number);
        Ok(spikes)
    }

    pub(crate) fn new_tape(&self, input_shape: &[usize]) -> Tape {
        Tape {
            input_shape: input_shape.to_vec(),
            policy: self.policy,
            alpha_mem: self.alpha_mem.clone(),
            adaptation: self
                .adaptation
                .as_ref()
                .map(|a| (a.rho.clone(), a.scale.clone())),
            subtract_tracks_threshold: self.membrane_subtract.is_none(),
            steps: Vec::with_capacity(input_shape.get(1).copied().unwrap_or(0)),
        }
    }
}

impl Tape {
    pub fn time_steps(&self) -> usize {
        self.steps.len()
    }

    /// Gradient of a loss with respect to the recorded input current, given
    /// `grad_output = dL/dspikes` of shape `(batch, time, *features)`.
    pub fn backward(&self, grad_output: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        if grad_output.shape() != self.input_shape.as_slice() {
            return Err(LayerError::ShapeMismatch {
                expected: self.input_shape.clone(),
                got: grad_output.shape().to_vec(),
            });
        }
        let surrogate = self.policy.surrogate();
        let mut grad_input = ArrayD::<f32>::zeros(IxDyn(&self.input_shape));
        let Some(first) = self.steps.first() else {
            return Ok(grad_input);
        };

        let zeros = ArrayD::<f32>::zeros(first.membrane.raw_dim());
        let one_minus_alpha = self.alpha_mem.mapv(|a| 1.0 - a);
        // Adjoints flowing from step t+1 into v_t, s_t and b_t.
        let mut carry_v = zeros.clone();
        let mut carry_s = zeros.clone();
        let mut carry_b = zeros;

        for (t, rec) in self.steps.iter().enumerate().rev() {
            let grad_spikes = &grad_output.index_axis(Axis(1), t) + &carry_s;
            let through_spike = surrogate
                .backward(&grad_spikes, &rec.membrane, &rec.threshold, &rec.width);

            let grad_v = &carry_v + &through_spike.membrane;
            let grad_pre = match &rec.clamp_mask {
                Some(mask) => &grad_v * mask,
                None => grad_v,
            };
            grad_input
                .index_axis_mut(Axis(1), t)
                .assign(&(&grad_pre * &one_minus_alpha));

            // Adjoint of the previous spike through the post-spike update of v.
            let reset_feedback = match self.policy {
                ResetPolicy::Subtract => {
                    carry_v = &grad_pre * &self.alpha_mem;
                    -(&grad_pre * &rec.subtract)
                }
                ResetPolicy::Reset => {
                    let kept = rec.prev_spikes.mapv(|s| 1.0 - s);
                    carry_v = &(&grad_pre * &self.alpha_mem) * &kept;
                    -(&(&grad_pre * &self.alpha_mem) * &rec.prev_membrane)
                }
            };
            carry_s = if surrogate.gradient_through_reset() {
                reset_feedback
            } else {
                ArrayD::zeros(grad_pre.raw_dim())
            };

            if let Some((rho, scale)) = &self.adaptation {
                let mut grad_threshold = through_spike.threshold;
                if self.policy == ResetPolicy::Subtract && self.subtract_tracks_threshold {
                    grad_threshold = grad_threshold - &(&grad_pre * &rec.prev_spikes);
                }
                let grad_b = &carry_b + &(&grad_threshold * scale);
                carry_s = carry_s + &(&grad_b * &rho.mapv(|r| 1.0 - r));
                carry_b = &grad_b * rho;
            }
        }
        Ok(grad_input)
    }
}
