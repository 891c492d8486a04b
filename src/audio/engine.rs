//! Audio engine - one output driver, at most one graph

use super::chain::GraphHandle;
use super::output::AudioOutput;
use crate::error::EngineError;
use tracing::{debug, info};

pub struct AudioEngine {
    output: Box<dyn AudioOutput>,
    graph: Option<GraphHandle>,
}

impl AudioEngine {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            graph: None,
        }
    }

    /// Replace the installed graph, stopping and dropping the previous one
    pub fn install(&mut self, graph: GraphHandle) {
        self.teardown();
        debug!(graph = ?graph, "graph installed");
        self.graph = Some(graph);
    }

    /// Stop output and drop the graph along with its effect
    pub fn teardown(&mut self) -> Option<GraphHandle> {
        self.stop();
        let old = self.graph.take();
        if old.is_some() {
            debug!("graph torn down");
        }
        old
    }

    /// Bring the installed graph live; no-op when already running
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.output.is_running() {
            return Ok(());
        }
        let graph = self.graph.as_ref().ok_or(EngineError::NoGraph)?;
        self.output
            .start(graph.processor().clone(), graph.format())?;
        info!(output = self.output.name(), "engine started");
        Ok(())
    }

    /// Halt output; safe with or without a graph
    pub fn stop(&mut self) {
        if let Some(graph) = &self.graph {
            graph.stop_player();
        }
        if self.output.is_running() {
            self.output.stop();
            info!(output = self.output.name(), "engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.output.is_running()
    }

    pub fn graph(&self) -> Option<&GraphHandle> {
        self.graph.as_ref()
    }

    pub fn graph_mut(&mut self) -> Option<&mut GraphHandle> {
        self.graph.as_mut()
    }

    pub fn output_name(&self) -> &str {
        self.output.name()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
