//! Adaptive leaky integrate-and-fire layer (LSNN neurons, Bellec et al. 2018).
//!
//! On top of the LIF recurrence each neuron carries an adaptation trace `b`
//! that rises with every spike and decays with `rho = exp(-1 / tau_adapt)`.
//! The effective threshold is `threshold + adapt_scale * b`, recomputed at the
//! start of every step before the membrane update.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dynamics::{Adaptation, Tape};
use crate::error::{LayerError, LayerResult};
use crate::lif::{decay_factor, LifConfig};
use crate::param::{Param, ParamDict, ParamValue};
use crate::state::{state_shape_of, NeuronState, StatefulLayer};
use crate::surrogate::ResetPolicy;
use crate::SpikingLayer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlifConfig {
    /// Membrane parameters; `threshold` is the base threshold.
    #[serde(flatten)]
    pub membrane: LifConfig,
    /// Adaptation time constant, in steps.
    pub tau_adapt: Param,
    /// Gain of the adaptation trace on the effective threshold.
    pub adapt_scale: Param,
}

impl Default for AlifConfig {
    fn default() -> Self {
        Self {
            membrane: LifConfig::default(),
            tau_adapt: Param::Scalar(100.0),
            adapt_scale: Param::Scalar(1.8),
        }
    }
}

impl AlifConfig {
    pub fn new(tau_mem: impl Into<Param>, tau_adapt: impl Into<Param>) -> Self {
        Self {
            membrane: LifConfig::new(tau_mem),
            tau_adapt: tau_adapt.into(),
            ..Self::default()
        }
    }

    pub fn with_adapt_scale(mut self, scale: impl Into<Param>) -> Self {
        self.adapt_scale = scale.into();
        self
    }

    pub fn with_membrane(mut self, f: impl FnOnce(LifConfig) -> LifConfig) -> Self {
        self.membrane = f(self.membrane);
        self
    }

    pub fn validate(&self) -> LayerResult<()> {
        self.membrane.validate()?;
        self.tau_adapt.require_positive("tau_adapt")?;
        if !self.adapt_scale.all(f32::is_finite) {
            return Err(LayerError::InvalidParameter {
                name: "adapt_scale",
                reason: "must be finite".into(),
            });
        }
        Ok(())
    }
}

pub struct Alif {
    config: AlifConfig,
    state: NeuronState,
    record_graph: bool,
    tape: Option<Tape>,
}

impl Alif {
    pub fn new(config: AlifConfig) -> LayerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: NeuronState::new(true),
            record_graph: false,
            tape: None,
        })
    }

    pub fn config(&self) -> &AlifConfig {
        &self.config
    }

    pub fn alpha_mem(&self) -> Param {
        self.config.membrane.tau_mem.map(decay_factor)
    }

    pub fn alpha_adapt(&self) -> Param {
        self.config.tau_adapt.map(decay_factor)
    }

    pub fn set_tau_mem(&mut self, tau_mem: impl Into<Param>) -> LayerResult<()> {
        let tau_mem = tau_mem.into();
        tau_mem.require_positive("tau_mem")?;
        self.config.membrane.tau_mem = tau_mem;
        Ok(())
    }

    pub fn set_tau_adapt(&mut self, tau_adapt: impl Into<Param>) -> LayerResult<()> {
        let tau_adapt = tau_adapt.into();
        tau_adapt.require_positive("tau_adapt")?;
        self.config.tau_adapt = tau_adapt;
        Ok(())
    }

    pub fn base_threshold(&self) -> &Param {
        &self.config.membrane.threshold
    }

    /// `base_threshold + adapt_scale * adaptation` for the held state.
    pub fn effective_threshold(&self) -> LayerResult<ArrayD<f32>> {
        let shape = self.state.shape();
        let base = self.config.membrane.threshold.broadcast("threshold", shape)?;
        let scale = self.config.adapt_scale.broadcast("adapt_scale", shape)?;
        match self.state.adaptation() {
            Some(b) => Ok(base + &(&scale * b)),
            None => Ok(base),
        }
    }

    pub fn policy(&self) -> ResetPolicy {
        self.config.membrane.policy()
    }

    pub fn set_record_graph(&mut self, record: bool) {
        self.record_graph = record;
        if !record {
            self.tape = None;
        }
    }

    pub fn tape(&self) -> Option<&Tape> {
        self.tape.as_ref()
    }

    pub fn backward(&self, grad_output: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        self.tape
            .as_ref()
            .ok_or(LayerError::NoRecordedGraph)?
            .backward(grad_output)
    }
}

impl StatefulLayer for Alif {
    fn state(&self) -> &NeuronState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NeuronState {
        &mut self.state
    }

    fn operating_bounds(&self, shape: &[usize]) -> LayerResult<(ArrayD<f32>, ArrayD<f32>)> {
        self.config.membrane.operating_bounds(shape)
    }
}

impl SpikingLayer for Alif {
    fn forward(&mut self, input: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        let shape = state_shape_of(input.shape())?;
        let mut dynamics = self.config.membrane.dynamics(&shape)?;
        dynamics.adaptation = Some(Adaptation {
            rho: self.alpha_adapt().broadcast("tau_adapt", &shape)?,
            scale: self.config.adapt_scale.broadcast("adapt_scale", &shape)?,
        });
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
        self.config.membrane.write_params(&mut dict);
        dict.insert("tau_adapt".into(), ParamValue::from(&self.config.tau_adapt));
        dict.insert("adapt_scale".into(), ParamValue::from(&self.config.adapt_scale));
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, IxDyn};

    fn step(alif: &mut Alif, current: f32) -> f32 {
        let input = Array::from_elem(IxDyn(&[1, 1, 1]), current);
        alif.forward(&input).unwrap()[[0, 0, 0]]
    }

    #[test]
    fn rejects_bad_adaptation_constant() {
        assert!(Alif::new(AlifConfig::new(10.0, 0.0)).is_err());
        assert!(Alif::new(AlifConfig::new(10.0, 20.0).with_adapt_scale(f32::NAN)).is_err());
        assert!(Alif::new(AlifConfig::new(10.0, 20.0)).is_ok());
    }

    #[test]
    fn threshold_rises_after_spike_then_decays() {
        let mut alif = Alif::new(AlifConfig::new(2.0, 20.0)).unwrap();
        assert_eq!(step(&mut alif, 5.0), 1.0);
        // Adaptation only sees the spike on the following step.
        assert_abs_diff_eq!(alif.effective_threshold().unwrap()[[0, 0]], 1.0);

        assert_eq!(step(&mut alif, 0.0), 0.0);
        let mut last = alif.effective_threshold().unwrap()[[0, 0]];
        let rho = (-1.0_f32 / 20.0).exp();
        assert_abs_diff_eq!(last, 1.0 + 1.8 * (1.0 - rho), epsilon = 1e-6);

        for _ in 0..50 {
            assert_eq!(step(&mut alif, 0.0), 0.0);
            let theta = alif.effective_threshold().unwrap()[[0, 0]];
            assert!(theta < last);
            assert!(theta > 1.0);
            last = theta;
        }
    }

    #[test]
    fn subtraction_uses_effective_threshold() {
        let mut alif = Alif::new(AlifConfig::new(2.0, 20.0)).unwrap();
        step(&mut alif, 5.0);
        let v0 = alif.state().membrane_potential()[[0, 0]];
        step(&mut alif, 0.0);
        let alpha = (-0.5_f32).exp();
        let theta1 = alif.effective_threshold().unwrap()[[0, 0]];
        assert_abs_diff_eq!(
            alif.state().membrane_potential()[[0, 0]],
            alpha * v0 - theta1,
            epsilon = 1e-5
        );
    }

    #[test]
    fn adaptation_suppresses_sustained_firing() {
        let input = Array::from_elem(IxDyn(&[1, 200, 1]), 3.0);
        let mut lif = crate::Lif::new(LifConfig::new(5.0)).unwrap();
        let mut alif = Alif::new(AlifConfig::new(5.0, 50.0)).unwrap();
        let lif_count = lif.forward(&input).unwrap().sum();
        let alif_count = alif.forward(&input).unwrap().sum();
        assert!(alif_count < lif_count);
        assert_eq!(alif.state().spikes_number(), alif_count);
    }

    #[test]
    fn randomized_reset_draws_adaptation_in_unit_interval() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        let mut alif = Alif::new(AlifConfig::new(5.0, 50.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        alif.reset_states_with_rng(Some(&[4, 3]), true, &mut rng).unwrap();
        let b = alif.state().adaptation().unwrap();
        assert!(b.iter().all(|&x| (0.0..1.0).contains(&x)));
        assert!(alif.effective_threshold().unwrap().iter().all(|&t| t >= 1.0));
    }

    #[test]
    fn backward_reaches_input_through_adaptation() {
        let mut alif = Alif::new(AlifConfig::new(2.0, 20.0)).unwrap();
        alif.set_record_graph(true);
        let input = Array::from_shape_vec(IxDyn(&[1, 3, 1]), vec![5.0, 0.0, 2.0]).unwrap();
        alif.forward(&input).unwrap();
        let grad = alif.backward(&Array::ones(IxDyn(&[1, 3, 1]))).unwrap();
        assert_eq!(grad.shape(), &[1, 3, 1]);
        assert!(grad.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn backward_matches_hand_derived_adaptation_terms() {
        let mut alif = Alif::new(AlifConfig::new(2.0, 20.0)).unwrap();
        alif.set_record_graph(true);
        let alpha = (-0.5_f32).exp();
        let rho = (-1.0_f32 / 20.0).exp();
        let beta = 1.8_f32;
        // Step 0: v0 = 1.2 spikes inside the window of theta0 = 1.
        // Step 1: theta1 = 1 + beta * (1 - rho), v1 = theta1 so g1 = 1 / theta1.
        let theta1 = 1.0 + beta * (1.0 - rho);
        let x0 = 1.2 / (1.0 - alpha);
        let x1 = (2.0 * theta1 - 1.2 * alpha) / (1.0 - alpha);
        let input = ndarray::arr3(&[[[x0], [x1]]]).into_dyn();
        let out = alif.forward(&input).unwrap();
        assert_eq!(out[[0, 0, 0]], 1.0);
        assert_abs_diff_eq!(alif.state().membrane_potential()[[0, 0]], theta1, epsilon = 1e-5);

        let mut grad_out = ArrayD::zeros(input.raw_dim());
        grad_out[[0, 1, 0]] = 1.0;
        let grad = alif.backward(&grad_out).unwrap();
        let g1 = 1.0 / theta1;
        // s0 lowers v1 by theta1 * s0 and raises theta1 through b1, which
        // enters both the spike comparison and the subtracted amount.
        let grad_s0 = -1.0 - 2.0 * g1 * beta * (1.0 - rho);
        assert_abs_diff_eq!(grad[[0, 1, 0]], g1 * (1.0 - alpha), epsilon = 1e-5);
        assert_abs_diff_eq!(
            grad[[0, 0, 0]],
            (1.0 - alpha) * (g1 * alpha + grad_s0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn empty_time_axis_records_an_empty_tape() {
        let mut alif = Alif::new(AlifConfig::new(2.0, 20.0)).unwrap();
        alif.set_record_graph(true);
        alif.forward(&Array::from_elem(IxDyn(&[2, 4, 3]), 1.5)).unwrap();
        alif.forward(&ArrayD::zeros(IxDyn(&[2, 0, 3]))).unwrap();
        assert_eq!(alif.tape().map(Tape::time_steps), Some(0));
        let grad = alif.backward(&ArrayD::zeros(IxDyn(&[2, 0, 3]))).unwrap();
        assert_eq!(grad.shape(), &[2, 0, 3]);
    }

    #[test]
    fn param_dict_reports_base_threshold() {
        let mut alif = Alif::new(AlifConfig::new(2.0, 20.0)).unwrap();
        step(&mut alif, 5.0);
        step(&mut alif, 0.0);
        let dict = alif.param_dict();
        assert_eq!(dict["threshold"], ParamValue::Scalar(1.0));
        assert_eq!(dict["tau_adapt"], ParamValue::Scalar(20.0));
        assert_eq!(dict["adapt_scale"], ParamValue::Scalar(1.8));
        assert_eq!(dict["threshold_low"], ParamValue::Unset);
    }
}
