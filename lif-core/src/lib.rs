//! lif-core: stateful leaky integrate-and-fire layers with surrogate-gradient spikes
//!
//! - `surrogate`: spike non-linearity with hand-defined backward pass
//! - `state`: persistent neuron state and its lazy lifecycle
//! - `lif` / `alif`: the membrane (and adaptive threshold) recurrence
//!
//! Tensors are `ndarray::ArrayD<f32>` laid out as `(batch, time, *features)`.

pub mod error;
pub mod param;
pub mod surrogate;
pub mod state;
mod dynamics;
pub mod lif;
pub mod alif;

use ndarray::ArrayD;

// Re-exports
pub use alif::{Alif, AlifConfig};
pub use dynamics::Tape;
pub use error::{LayerError, LayerResult};
pub use lif::{Lif, LifConfig};
pub use param::{Param, ParamDict, ParamValue};
pub use state::{state_shape_of, NeuronState, StatefulLayer};
pub use surrogate::{ResetPolicy, SpikeGrad, SurrogateSpike, ThresholdReset, ThresholdSubtract};

/// Public contract seen by composition wrappers.
pub trait SpikingLayer: StatefulLayer {
    /// `(batch, time, *features)` currents -> spikes of the same shape.
    ///
    /// An empty time axis returns an empty tensor and leaves state untouched.
    fn forward(&mut self, input: &ArrayD<f32>) -> LayerResult<ArrayD<f32>>;

    /// Flat name -> value mapping of every construction argument.
    fn param_dict(&self) -> ParamDict;
}
