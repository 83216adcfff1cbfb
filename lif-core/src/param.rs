//! Scalar-or-tensor neuron parameters and the flat parameter dictionary
//! exposed for checkpointing.

use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};

/// A neuron parameter that is either one value for every neuron or a tensor
/// broadcastable to the state shape `(batch, *features)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Scalar(f32),
    Tensor(ArrayD<f32>),
}

impl Param {
    /// Expand to a dense tensor of exactly `shape`.
    pub fn broadcast(&self, name: &'static str, shape: &[usize]) -> LayerResult<ArrayD<f32>> {
        match self {
            Param::Scalar(x) => Ok(ArrayD::from_elem(IxDyn(shape), *x)),
            Param::Tensor(t) => t
                .broadcast(IxDyn(shape))
                .map(|view| view.to_owned())
                .ok_or_else(|| LayerError::Broadcast {
                    name,
                    from: t.shape().to_vec(),
                    to: shape.to_vec(),
                }),
        }
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Param {
        match self {
            Param::Scalar(x) => Param::Scalar(f(*x)),
            Param::Tensor(t) => Param::Tensor(t.mapv(f)),
        }
    }

    /// True when every element satisfies `pred`. Empty tensors pass.
    pub fn all(&self, pred: impl Fn(f32) -> bool) -> bool {
        match self {
            Param::Scalar(x) => pred(*x),
            Param::Tensor(t) => t.iter().all(|&x| pred(x)),
        }
    }

    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            Param::Scalar(x) => Some(*x),
            Param::Tensor(_) => None,
        }
    }

    /// Fail with `InvalidParameter` unless every element is finite and > 0.
    pub(crate) fn require_positive(&self, name: &'static str) -> LayerResult<()> {
        if self.all(|x| x.is_finite() && x > 0.0) {
            Ok(())
        } else {
            Err(LayerError::InvalidParameter {
                name,
                reason: "must be finite and strictly positive".into(),
            })
        }
    }
}

impl From<f32> for Param {
    fn from(x: f32) -> Self {
        Param::Scalar(x)
    }
}

impl From<ArrayD<f32>> for Param {
    fn from(t: ArrayD<f32>) -> Self {
        Param::Tensor(t)
    }
}

/// One entry of a layer's parameter dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Unset,
    Flag(bool),
    Scalar(f32),
    Tensor(ArrayD<f32>),
}

impl From<&Param> for ParamValue {
    fn from(p: &Param) -> Self {
        match p {
            Param::Scalar(x) => ParamValue::Scalar(*x),
            Param::Tensor(t) => ParamValue::Tensor(t.clone()),
        }
    }
}

impl From<Option<&Param>> for ParamValue {
    fn from(p: Option<&Param>) -> Self {
        p.map_or(ParamValue::Unset, ParamValue::from)
    }
}

impl From<Option<f32>> for ParamValue {
    fn from(x: Option<f32>) -> Self {
        x.map_or(ParamValue::Unset, ParamValue::Scalar)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Flag(b)
    }
}

/// Name -> value mapping with every argument needed to rebuild a layer.
pub type ParamDict = BTreeMap<String, ParamValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scalar_broadcasts_to_any_shape() {
        let t = Param::Scalar(0.5).broadcast("threshold", &[2, 3]).unwrap();
        assert_eq!(t.shape(), &[2, 3]);
        assert!(t.iter().all(|&x| x == 0.5));
    }

    #[test]
    fn per_feature_tensor_broadcasts_over_batch() {
        let p = Param::Tensor(array![1.0_f32, 2.0, 3.0].into_dyn());
        let t = p.broadcast("threshold", &[2, 3]).unwrap();
        assert_eq!(t[[1, 2]], 3.0);
    }

    #[test]
    fn incompatible_tensor_is_rejected() {
        let p = Param::Tensor(array![1.0_f32, 2.0].into_dyn());
        let err = p.broadcast("threshold", &[2, 3]).unwrap_err();
        assert!(matches!(err, LayerError::Broadcast { name: "threshold", .. }));
    }

    #[test]
    fn positivity_check() {
        assert!(Param::Scalar(10.0).require_positive("tau_mem").is_ok());
        assert!(Param::Scalar(0.0).require_positive("tau_mem").is_err());
        let t = Param::Tensor(array![1.0_f32, -1.0].into_dyn());
        assert!(t.require_positive("tau_mem").is_err());
    }
}
