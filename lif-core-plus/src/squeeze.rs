//! Single-step adapter: `(batch, *features)` in, `(batch, *features)` out.
//!
//! Inserts a singleton time axis, runs the wrapped layer, strips the axis again.
//! State lives in the wrapped layer and persists across calls as usual.

use ndarray::{ArrayD, Axis};

use lif_core::{LayerError, LayerResult, NeuronState, SpikingLayer, StatefulLayer};

pub struct Squeeze<L> {
    inner: L,
}

impl<L: SpikingLayer> Squeeze<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut L {
        &mut self.inner
    }

    pub fn into_inner(self) -> L {
        self.inner
    }

    /// Advance the wrapped layer by exactly one timestep.
    pub fn forward(&mut self, input: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        if input.ndim() == 0 {
            return Err(LayerError::InputRank { expected: 1, got: 0 });
        }
        let with_time = input.view().insert_axis(Axis(1)).to_owned();
        let spikes = self.inner.forward(&with_time)?;
        Ok(spikes.index_axis_move(Axis(1), 0))
    }
}

impl<L: SpikingLayer> StatefulLayer for Squeeze<L> {
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
