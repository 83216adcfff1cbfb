//! Recurrent adapter: feeds a transform of the previous step's spikes back
//! into the next step's input current.
//!
//! Semantics:
//! - step t receives `input[t] + connection(spikes[t - 1])`
//! - `spikes[-1]` is the wrapped layer's held activations, so recurrence
//!   carries across forward calls exactly like membrane state does
//! - the wrapped layer runs one step per call, so its `time_window` and
//!   `spikes_number` diagnostics describe the last step only

use ndarray::{stack, Array2, ArrayD, ArrayView, Axis, Ix2, IxDyn};
use tracing::trace;

use lif_core::{
    state_shape_of, LayerError, LayerResult, NeuronState, SpikingLayer, StatefulLayer,
};

pub struct Recurrent<L, R> {
    inner: L,
    connection: R,
}

impl<L, R> Recurrent<L, R>
where
    L: SpikingLayer,
    R: FnMut(&ArrayD<f32>) -> LayerResult<ArrayD<f32>>,
{
    pub fn new(inner: L, connection: R) -> Self {
        Self { inner, connection }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn into_inner(self) -> L {
        self.inner
    }

    pub fn forward(&mut self, input: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        let shape = state_shape_of(input.shape())?;
        let time_steps = input.shape()[1];
        if time_steps == 0 {
            return Ok(ArrayD::zeros(input.raw_dim()));
        }
        self.inner.ensure_state_matches(&shape);

        let mut outputs = Vec::with_capacity(time_steps);
        for step in 0..time_steps {
            let feedback = (self.connection)(self.inner.state().activations())?;
            if feedback.shape() != shape.as_slice() {
                return Err(LayerError::ShapeMismatch {
                    expected: shape,
                    got: feedback.shape().to_vec(),
                });
            }
            let current = &input.index_axis(Axis(1), step) + &feedback;
            let spikes = self.inner.forward(&current.insert_axis(Axis(1)))?;
            outputs.push(spikes.index_axis_move(Axis(1), 0));
        }

        let views: Vec<ArrayView<'_, f32, IxDyn>> = outputs.iter().map(|s| s.view()).collect();
        let spikes = stack(Axis(1), &views).map_err(|e| LayerError::Tensor(e.to_string()))?;
        trace!(time_steps, spikes = spikes.sum(), "recurrent forward pass");
        Ok(spikes)
    }
}

impl<L: SpikingLayer, R> StatefulLayer for Recurrent<L, R> {
    fn state(&self) -> &NeuronState {
        self.inner.state()
    }

    fn state_mut(&mut self) -> &mut NeuronState {
        self.inner.state_mut()
    }

    fn operating_bounds(&self, shape: &[usize]) -> LayerResult<(ArrayD<f32>, ArrayD<f32>)> {
        self.inner.operating_bounds(shape)
    }
}

/// Fully connected recurrence over a flat feature axis:
/// `(batch, n)` spikes -> `(batch, n)` currents, `weights[i, j]` from j to i.
pub fn dense(weights: Array2<f32>) -> impl FnMut(&ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
    move |spikes: &ArrayD<f32>| {
        let spikes = spikes
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| LayerError::Tensor(e.to_string()))?;
        if spikes.ncols() != weights.ncols() {
            return Err(LayerError::ShapeMismatch {
                expected: vec![spikes.nrows(), weights.ncols()],
                got: spikes.shape().to_vec(),
            });
        }
        Ok(spikes.dot(&weights.t()).into_dyn())
    }
}
