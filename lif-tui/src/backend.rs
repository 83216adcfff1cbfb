// Backend abstraction for the TUI so we can swap different neuron layers.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use lif_core::{Alif, AlifConfig, LayerResult, Lif, NeuronState, StatefulLayer};
use lif_core_plus::Squeeze;
use ndarray::{Array1, ArrayD};
use serde::Deserialize;

/// Common interface for any layer that can drive the TUI.
pub trait SnnBackend {
    /// Advance the layer by one step and return the indices of neurons that spiked.
    fn step(&mut self) -> Result<Vec<usize>>;
    /// Number of neurons in the model (rows in the raster).
    fn neurons(&self) -> usize;
    /// Short model name for the status line.
    fn kind(&self) -> &'static str;
    fn state(&self) -> &NeuronState;
    /// Zero (or randomize) all neuron state.
    fn reset(&mut self, randomize: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Lif,
    Alif,
}

/// Demo parameters, read from the JSON file named by `LIF_TUI_CONFIG`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub kind: ModelKind,
    pub neurons: usize,
    /// Constant input current per neuron; defaults to a ramp over `[0.5, 3.0]`.
    pub currents: Option<Vec<f32>>,
    pub layer: AlifConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Alif,
            neurons: 16,
            currents: None,
            layer: AlifConfig::new(8.0, 60.0),
        }
    }
}

impl DemoConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    fn currents(&self) -> Result<Array1<f32>> {
        match &self.currents {
            Some(c) if c.len() != self.neurons => {
                bail!("{} currents given for {} neurons", c.len(), self.neurons)
            }
            Some(c) => Ok(Array1::from(c.clone())),
            None => Ok(Array1::linspace(0.5, 3.0, self.neurons)),
        }
    }
}

enum Model {
    Lif(Squeeze<Lif>),
    Alif(Squeeze<Alif>),
}

impl Model {
    fn forward(&mut self, input: &ArrayD<f32>) -> LayerResult<ArrayD<f32>> {
        match self {
            Model::Lif(m) => m.forward(input),
            Model::Alif(m) => m.forward(input),
        }
    }

    fn layer(&self) -> &dyn StatefulLayer {
        match self {
            Model::Lif(m) => m,
            Model::Alif(m) => m,
        }
    }

    fn layer_mut(&mut self) -> &mut dyn StatefulLayer {
        match self {
            Model::Lif(m) => m,
            Model::Alif(m) => m,
        }
    }
}

/// Single-batch layer fed one constant current per neuron.
pub struct CoreBackend {
    model: Model,
    /// `(1, neurons)` input applied at every step.
    input: ArrayD<f32>,
    kind: ModelKind,
}

impl CoreBackend {
    pub fn new(config: &DemoConfig) -> Result<Self> {
        let input = config.currents()?.insert_axis(ndarray::Axis(0)).into_dyn();
        let model = match config.kind {
            ModelKind::Lif => Model::Lif(Squeeze::new(Lif::new(config.layer.membrane.clone())?)),
            ModelKind::Alif => Model::Alif(Squeeze::new(Alif::new(config.layer.clone())?)),
        };
        Ok(Self { model, input, kind: config.kind })
    }
}

impl SnnBackend for CoreBackend {
    fn step(&mut self) -> Result<Vec<usize>> {
        let spikes = self.model.forward(&self.input)?;
        Ok(spikes
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s != 0.0)
            .map(|(i, _)| i)
            .collect())
    }

    fn neurons(&self) -> usize {
        self.input.len()
    }

    fn kind(&self) -> &'static str {
        match self.kind {
            ModelKind::Lif => "LIF",
            ModelKind::Alif => "ALIF",
        }
    }

    fn state(&self) -> &NeuronState {
        self.model.layer().state()
    }

    fn reset(&mut self, randomize: bool) -> Result<()> {
        self.model.layer_mut().reset_states(None, randomize)?;
        Ok(())
    }
}
