//! Leaky integrate-and-fire layer.
//!
//! Input is a current tensor `(batch, time, *features)`, output the spike
//! tensor of the same shape. Membrane state persists across calls (see
//! [`crate::state`]). Concurrent use of one instance is ruled out by
//! `forward(&mut self)`; callers sharing a layer must serialize access.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dynamics::{Dynamics, Tape};
use crate::error::{LayerError, LayerResult};
use crate::param::{Param, ParamDict, ParamValue};
use crate::state::{state_shape_of, NeuronState, StatefulLayer};
use crate::surrogate::ResetPolicy;
use crate::SpikingLayer;

/// Construction parameters of a [`Lif`] layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifConfig {
    /// Membrane time constant, in steps. `alpha = exp(-1 / tau_mem)`.
    pub tau_mem: Param,
    pub threshold: Param,
    /// Floor on the membrane potential.
    pub threshold_low: Option<f32>,
    /// Reset the membrane to zero after a spike instead of subtracting.
    pub membrane_reset: bool,
    /// Amount subtracted after a spike; defaults to the threshold.
    /// Ignored when `membrane_reset` is set.
    pub membrane_subtract: Option<Param>,
    /// Surrogate gradient support as a fraction of the threshold.
    pub surrogate_window: f32,
}

impl Default for LifConfig {
    fn default() -> Self {
        Self {
            tau_mem: Param::Scalar(10.0),
            threshold: Param::Scalar(1.0),
            threshold_low: None,
            membrane_reset: false,
            membrane_subtract: None,
            surrogate_window: 1.0,
        }
    }
}

impl LifConfig {
    pub fn new(tau_mem: impl Into<Param>) -> Self {
        Self {
            tau_mem: tau_mem.into(),
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: impl Into<Param>) -> Self {
        self.threshold = threshold.into();
        self
    }

    pub fn with_threshold_low(mut self, low: f32) -> Self {
        self.threshold_low = Some(low);
        self
    }

    pub fn with_membrane_reset(mut self, reset: bool) -> Self {
        self.membrane_reset = reset;
        self
    }

    pub fn with_membrane_subtract(mut self, amount: impl Into<Param>) -> Self {
        self.membrane_subtract = Some(amount.into());
        self
    }

    pub fn with_surrogate_window(mut self, window: f32) -> Self {
        self.surrogate_window = window;
        self
    }

    pub fn validate(&self) -> LayerResult<()> {
        self.tau_mem.require_positive("tau_mem")?;
        self.threshold.require_positive("threshold")?;
        if !(self.surrogate_window.is_finite() && self.surrogate_window > 0.0) {
            return Err(LayerError::InvalidParameter {
                name: "surrogate_window",
                reason: "must be finite and strictly positive".into(),
            });
        }
        if self.threshold_low.is_some_and(|low| !low.is_finite()) {
            return Err(LayerError::InvalidParameter {
                name: "threshold_low",
                reason: "must be finite".into(),
            });
        }
        Ok(())
    }

    pub fn policy(&self) -> ResetPolicy {
        ResetPolicy::from_membrane_reset(self.membrane_reset)
    }

    pub(crate) fn write_params(&self, dict: &mut ParamDict) {
        dict.insert("tau_mem".into(), ParamValue::from(&self.tau_mem));
        dict.insert("threshold".into(), ParamValue::from(&self.threshold));
        dict.insert("threshold_low".into(), ParamValue::from(self.threshold_low));
        dict.insert("membrane_reset".into(), ParamValue::from(self.membrane_reset));
        dict.insert(
            "membrane_subtract".into(),
            ParamValue::from(self.membrane_subtract.as_ref()),
        );
        dict.insert(
            "surrogate_window".into(),
            ParamValue::Scalar(self.surrogate_window),
        );
    }

    /// Lower and upper edge of the membrane operating range:
    /// `threshold_low` (or `-threshold`) to `threshold`.
    pub(crate) fn operating_bounds(
        &self,
        shape: &[usize],
    ) -> LayerResult<(ArrayD<f32>, ArrayD<f32>)> {
        let high = self.threshold.broadcast("threshold", shape)?;
        let low = match self.threshold_low {
            Some(low) => ArrayD::from_elem(high.raw_dim(), low),
            None => high.mapv(|t| -t),
        };
        Ok((low, high))
    }

    /// Broadcast the static part of the recurrence to `shape`.
    pub(crate) fn dynamics(&self, shape: &[usize]) -> LayerResult<Dynamics> {
        let alpha_mem = self.tau_mem.map(decay_factor).broadcast("tau_mem", shape)?;
        let membrane_subtract = self
            .membrane_subtract
            .as_ref()
            .map(|p| p.broadcast("membrane_subtract", shape))
            .transpose()?;
        Ok(Dynamics {
            alpha_mem,
            threshold: self.threshold.broadcast("threshold", shape)?,
            threshold_low: self.threshold_low,
            membrane_subtract,
            surrogate_window: self.surrogate_window,
            policy: self.policy(),
            adaptation: None,
        })
    }
}

/// `exp(-1 / tau)`.
pub(crate) fn decay_factor(tau: f32) -> f32 {
    (-1.0 / tau).exp()
}

/// Leaky integrate-and-fire layer with subtract or reset-to-zero policy.
pub struct Lif {
    config: LifConfig,
    state: NeuronState,
    record_graph: bool,
    tape: Option<Tape>,
}

impl Lif {
    pub fn new(config: LifConfig) -> LayerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: NeuronState::new(false),
            record_graph: false,
            tape: None,
        })
    }

    pub fn config(&self) -> &LifConfig {
        &self.config
    }

    pub fn tau_mem(&self) -> &Param {
        &self.config.tau_mem
    }

    /// Takes effect on the next forward call.
    pub fn set_tau_mem(&mut self, tau_mem: impl Into<Param>) -> LayerResult<()> {
        let tau_mem = tau_mem.into();
        tau_mem.require_positive("tau_mem")?;
        self.config.tau_mem = tau_mem;
        Ok(())
    }

    /// Derived from `tau_mem` on every access.
    pub fn alpha_mem(&self) -> Param {
        self.config.tau_mem.map(decay_factor)
    }

    pub fn threshold(&self) -> &Param {
        &self.config.threshold
    }

    pub fn membrane_subtract(&self) -> &Param {
        self.config
            .membrane_subtract
            .as_ref()
            .unwrap_or(&self.config.threshold)
    }

    pub fn set_membrane_subtract(&mut self, amount: Option<Param>) {
        self.config.membrane_subtract = amount;
    }

    pub fn policy(&self) -> ResetPolicy {
        self.config.policy()
    }

    /// Keep a tape of the next forward calls for [`Lif::backward`].
    pub fn set_record_graph(&mut self, record: bool) {
        self.record_graph = record;
        if !record {
            self.tape = None;
        }
    }

    pub fn tape(&self) -> Option<&Tape> {
        self.tape.as_ref()
    }

    /// Gradient w.r.t. the input current of the last recorded forward call.
    /// After an empty time axis that is an empty gradient.
    pub fn backward(&self, grad_output: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        self.tape
            .as_ref()
            .ok_or(LayerError::NoRecordedGraph)?
            .backward(grad_output)
    }
}

impl StatefulLayer for Lif {
    fn state(&self) -> &NeuronState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NeuronState {
        &mut self.state
    }

    fn operating_bounds(&self, shape: &[usize]) -> LayerResult<(ArrayD<f32>, ArrayD<f32>)> {
        self.config.operating_bounds(shape)
    }
}

impl SpikingLayer for Lif {
    fn forward(&mut self, input: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        let shape = state_shape_of(input.shape())?;
        let dynamics = self.config.dynamics(&shape)?;
        let mut tape = self.record_graph.then(|| dynamics.new_tape(input.shape()));
        if input.shape()[1] == 0 {
            debug!("empty time axis, state untouched");
            self.tape = tape;
            return Ok(ArrayD::zeros(input.raw_dim()));
        }
        self.ensure_state_matches(&shape);
        let spikes = dynamics.run(&mut self.state, input, tape.as_mut())?;
        self.tape = tape;
        Ok(spikes)
    }

    fn param_dict(&self) -> ParamDict {
        let mut dict = ParamDict::new();
        self.config.write_params(&mut dict);
        dict
    }
}
