// Application state for the TUI, including a circular 2D spike raster.

use anyhow::Result;

use crate::backend::SnnBackend;

pub struct App<B: SnnBackend> {
    pub backend: B,
    pub tick: u64,
    pub width: usize,             // number of columns (time window)
    pub raster: Vec<Vec<char>>,   // [neuron][col]
    pub running: bool,
    pub last_spikes: usize,
    pub total_spikes: u64,
}

impl<B: SnnBackend> App<B> {
    pub fn new(backend: B, width: usize) -> Self {
        let n = backend.neurons();
        Self {
            backend,
            tick: 0,
            width,
            raster: vec![vec![' '; width]; n],
            running: false,
            last_spikes: 0,
            total_spikes: 0,
        }
    }

    pub fn toggle_running(&mut self) {
        self.running = !self.running;
    }

    /// Advance the layer by one step and update the raster for the current column.
    pub fn step(&mut self) -> Result<()> {
        let spikes = self.backend.step()?;

        self.tick = self.tick.saturating_add(1);
        self.last_spikes = spikes.len();
        self.total_spikes = self.total_spikes.saturating_add(spikes.len() as u64);

        // Circular buffer column
        let col = (self.tick as usize) % self.width;
        for row in self.raster.iter_mut() {
            row[col] = ' ';
        }
        for neuron in spikes {
            if let Some(row) = self.raster.get_mut(neuron) {
                row[col] = '•';
            }
        }
        Ok(())
    }

    /// Clear neuron state (optionally randomized) and the raster.
    pub fn reset(&mut self, randomize: bool) -> Result<()> {
        self.backend.reset(randomize)?;
        for row in self.raster.iter_mut() {
            row.fill(' ');
        }
        Ok(())
    }

    /// Mean membrane potential over all neurons, 0 before the first step.
    pub fn mean_membrane(&self) -> f32 {
        self.backend.state().membrane_potential().mean().unwrap_or(0.0)
    }
}
