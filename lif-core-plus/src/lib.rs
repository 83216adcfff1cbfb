//! lif-core-plus: composition wrappers and input encoding atop lif-core (keeps lif-core unchanged)
//!
//! Additions:
//! - `Squeeze`: single-step adapter without a time axis
//! - `Recurrent`: feeds spikes back through a user connection each step
//! - `RateEncoder`: intensity images to Bernoulli spike trains
//!
//! Wrappers only use the public `SpikingLayer` / `StatefulLayer` contract.

pub mod squeeze;
pub mod recurrent;
pub mod encode;

pub mod error;

// Re-exports
pub use encode::RateEncoder;
pub use error::{EncodeError, EncodeResult};
pub use recurrent::{dense, Recurrent};
pub use squeeze::Squeeze;
