//! Persistent per-neuron state and the lifecycle contract shared by every
//! stateful layer.
//!
//! Semantics:
//! - State is a degenerate placeholder (shape `[0]`) until the first forward
//!   call or an explicit reset gives it a shape.
//! - A forward call whose `(batch, *features)` shape differs from the held
//!   state silently reinitializes everything to zero. This is policy, not an
//!   error.
//! - State survives across forward calls until the next shape change or reset.

use ndarray::{ArrayD, IxDyn, Zip};
use rand::{Rng, RngCore};
use tracing::debug;

use crate::error::{LayerError, LayerResult};

/// Explicit mutable state record owned by exactly one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronState {
    membrane_potential: ArrayD<f32>,
    activations: ArrayD<f32>,
    adaptation: Option<ArrayD<f32>>,
    spikes_number: f32,
    time_window: usize,
}

impl NeuronState {
    /// Placeholder state; `adaptive` registers the adaptation trace (ALIF).
    pub fn new(adaptive: bool) -> Self {
        let empty = || ArrayD::zeros(IxDyn(&[0]));
        Self {
            membrane_potential: empty(),
            activations: empty(),
            adaptation: adaptive.then(empty),
            spikes_number: 0.0,
            time_window: 0,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.membrane_potential.shape()
    }

    pub fn membrane_potential(&self) -> &ArrayD<f32> {
        &self.membrane_potential
    }

    /// Most recent spike tensor (the "previous spike" fed back next step).
    pub fn activations(&self) -> &ArrayD<f32> {
        &self.activations
    }

    pub fn adaptation(&self) -> Option<&ArrayD<f32>> {
        self.adaptation.as_ref()
    }

    /// Total absolute spike magnitude emitted by the last forward call.
    pub fn spikes_number(&self) -> f32 {
        self.spikes_number
    }

    /// Length of the time axis processed by the last forward call.
    pub fn time_window(&self) -> usize {
        self.time_window
    }

    /// Named view over every registered state tensor.
    pub fn tensors(&self) -> Vec<(&'static str, &ArrayD<f32>)> {
        let mut out = vec![
            ("membrane_potential", &self.membrane_potential),
            ("activations", &self.activations),
        ];
        if let Some(b) = &self.adaptation {
            out.push(("adaptation", b));
        }
        out
    }

    /// Overwrite the membrane potential; the shape must match the held state.
    pub fn set_membrane_potential(&mut self, v: ArrayD<f32>) -> LayerResult<()> {
        self.check_shape(v.shape())?;
        self.membrane_potential = v;
        Ok(())
    }

    pub fn set_activations(&mut self, s: ArrayD<f32>) -> LayerResult<()> {
        self.check_shape(s.shape())?;
        self.activations = s;
        Ok(())
    }

    /// Overwrite the adaptation trace. No-op error if the state has none.
    pub fn set_adaptation(&mut self, b: ArrayD<f32>) -> LayerResult<()> {
        self.check_shape(b.shape())?;
        match self.adaptation.as_mut() {
            Some(slot) => {
                *slot = b;
                Ok(())
            }
            None => Err(LayerError::InvalidParameter {
                name: "adaptation",
                reason: "layer has no adaptation state".into(),
            }),
        }
    }

    fn check_shape(&self, got: &[usize]) -> LayerResult<()> {
        if got == self.shape() {
            Ok(())
        } else {
            Err(LayerError::ShapeMismatch {
                expected: self.shape().to_vec(),
                got: got.to_vec(),
            })
        }
    }

    pub(crate) fn zero(&mut self, shape: &[usize]) {
        let dim = IxDyn(shape);
        self.membrane_potential = ArrayD::zeros(dim.clone());
        self.activations = ArrayD::zeros(dim.clone());
        if let Some(b) = self.adaptation.as_mut() {
            *b = ArrayD::zeros(dim);
        }
    }

    /// Membrane uniform in `[low, high)` per element, adaptation uniform in
    /// `[0, 1)`, activations zero.
    pub(crate) fn randomize(
        &mut self,
        shape: &[usize],
        low: &ArrayD<f32>,
        high: &ArrayD<f32>,
        rng: &mut dyn RngCore,
    ) {
        self.membrane_potential =
            Zip::from(low).and(high).map_collect(|&lo, &hi| lo + rng.gen::<f32>() * (hi - lo));
        self.activations = ArrayD::zeros(IxDyn(shape));
        if let Some(b) = self.adaptation.as_mut() {
            *b = ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen::<f32>());
        }
    }

    /// Commit the result of a forward pass.
    pub(crate) fn commit(
        &mut self,
        membrane_potential: ArrayD<f32>,
        activations: ArrayD<f32>,
        adaptation: Option<ArrayD<f32>>,
        time_window: usize,
        spikes_number: f32,
    ) {
        self.membrane_potential = membrane_potential;
        self.activations = activations;
        if self.adaptation.is_some() {
            self.adaptation = adaptation;
        }
        self.time_window = time_window;
        self.spikes_number = spikes_number;
    }
}

/// `(batch, time, *features)` -> `(batch, *features)`.
pub fn state_shape_of(input_shape: &[usize]) -> LayerResult<Vec<usize>> {
    if input_shape.len() < 2 {
        return Err(LayerError::InputRank {
            expected: 2,
            got: input_shape.len(),
        });
    }
    let mut shape = Vec::with_capacity(input_shape.len() - 1);
    shape.push(input_shape[0]);
    shape.extend_from_slice(&input_shape[2..]);
    Ok(shape)
}

/// Lifecycle shared by layers whose computation depends on persistent state.
///
/// Implementors only expose their state record and their operating bounds;
/// reset and lazy reinitialization come for free.
pub trait StatefulLayer {
    fn state(&self) -> &NeuronState;

    fn state_mut(&mut self) -> &mut NeuronState;

    /// Range `[low, high)` used for randomized membrane initialization,
    /// expanded to `shape`.
    fn operating_bounds(&self, shape: &[usize]) -> LayerResult<(ArrayD<f32>, ArrayD<f32>)>;

    /// Reinitialize all state. `shape = None` keeps the current shape.
    fn reset_states_with_rng(
        &mut self,
        shape: Option<&[usize]>,
        randomize: bool,
        rng: &mut dyn RngCore,
    ) -> LayerResult<()> {
        let shape = shape.map_or_else(|| self.state().shape().to_vec(), <[usize]>::to_vec);
        if randomize {
            let (low, high) = self.operating_bounds(&shape)?;
            self.state_mut().randomize(&shape, &low, &high, rng);
        } else {
            self.state_mut().zero(&shape);
        }
        debug!(?shape, randomize, "reset neuron states");
        Ok(())
    }

    fn reset_states(&mut self, shape: Option<&[usize]>, randomize: bool) -> LayerResult<()> {
        self.reset_states_with_rng(shape, randomize, &mut rand::thread_rng())
    }

    /// Zero and resize the state if it does not have `state_shape`.
    /// Returns true when a reinitialization happened.
    fn ensure_state_matches(&mut self, state_shape: &[usize]) -> bool {
        if self.state().shape() == state_shape {
            return false;
        }
        debug!(
            from = ?self.state().shape(),
            to = ?state_shape,
            "state shape changed, reinitializing to zero"
        );
        self.state_mut().zero(state_shape);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Probe {
        state: NeuronState,
    }

    impl StatefulLayer for Probe {
        fn state(&self) -> &NeuronState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut NeuronState {
            &mut self.state
        }
        fn operating_bounds(&self, shape: &[usize]) -> LayerResult<(ArrayD<f32>, ArrayD<f32>)> {
            Ok((
                ArrayD::from_elem(IxDyn(shape), -1.0),
                ArrayD::from_elem(IxDyn(shape), 1.0),
            ))
        }
    }

    #[test]
    fn placeholder_is_degenerate() {
        let s = NeuronState::new(true);
        assert_eq!(s.shape(), &[0]);
        assert_eq!(s.tensors().len(), 3);
        assert_eq!(NeuronState::new(false).tensors().len(), 2);
    }

    #[test]
    fn state_shape_drops_time_axis() {
        assert_eq!(state_shape_of(&[4, 10, 3, 2]).unwrap(), vec![4, 3, 2]);
        assert_eq!(state_shape_of(&[4, 10]).unwrap(), vec![4]);
        assert!(matches!(
            state_shape_of(&[4]),
            Err(LayerError::InputRank { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn ensure_reinitializes_only_on_change() {
        let mut p = Probe { state: NeuronState::new(false) };
        assert!(p.ensure_state_matches(&[2, 3]));
        p.state_mut()
            .set_membrane_potential(ArrayD::from_elem(IxDyn(&[2, 3]), 0.7))
            .unwrap();
        assert!(!p.ensure_state_matches(&[2, 3]));
        assert_eq!(p.state().membrane_potential()[[0, 0]], 0.7);
        assert!(p.ensure_state_matches(&[5, 3]));
        assert!(p.state().membrane_potential().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn randomized_reset_stays_in_bounds() {
        let mut p = Probe { state: NeuronState::new(true) };
        let mut rng = StdRng::seed_from_u64(7);
        p.reset_states_with_rng(Some(&[8, 4]), true, &mut rng).unwrap();
        let v = p.state().membrane_potential();
        assert_eq!(v.shape(), &[8, 4]);
        assert!(v.iter().all(|&x| (-1.0..1.0).contains(&x)));
        assert!(v.iter().any(|&x| x != 0.0));
        assert!(p.state().activations().iter().all(|&x| x == 0.0));
        let b = p.state().adaptation().unwrap();
        assert!(b.iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn reset_without_shape_keeps_shape() {
        let mut p = Probe { state: NeuronState::new(false) };
        p.ensure_state_matches(&[3]);
        p.reset_states(None, false).unwrap();
        assert_eq!(p.state().shape(), &[3]);
    }

    #[test]
    fn setters_reject_wrong_shape() {
        let mut s = NeuronState::new(false);
        s.zero(&[2]);
        assert!(s.set_activations(ArrayD::zeros(IxDyn(&[3]))).is_err());
        assert!(s.set_adaptation(ArrayD::zeros(IxDyn(&[2]))).is_err());
    }
}
