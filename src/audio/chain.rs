//! Graph builder
//!
//! Wires the fixed Source -> Effect -> Sink chain for one asset, falling back
//! to Source -> Sink when the effect kind cannot be instantiated.

use super::connection::Connection;
use super::effect::EffectNode;
use super::graph::AudioGraph;
use super::node::{AudioNode, NodeHandle};
use super::processor::GraphProcessor;
use super::sink::SinkNode;
use super::source::{CompletionHandler, PlayerNode};
use crate::asset::AudioAsset;
use crate::effect::{EffectInstantiator, EffectKind};
use crate::error::GraphError;
use crate::format::FormatDescriptor;
use crate::params::ParameterSource;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which of the two legal chains is wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Source -> Effect -> Sink
    Processed,
    /// Source -> Sink
    Direct,
}

/// Live effect instance inside a graph
#[derive(Clone)]
pub struct EffectInfo {
    pub instance_id: Uuid,
    pub name: String,
    pub kind: EffectKind,
    pub parameters: Arc<dyn ParameterSource>,
}

impl fmt::Debug for EffectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectInfo")
            .field("instance_id", &self.instance_id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Advisory raised when the effect could not be instantiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectUnavailable {
    pub kind: EffectKind,
}

impl fmt::Display for EffectUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Effect {} unavailable, playing without effect",
            self.kind
        )
    }
}

/// Fully wired graph for one asset
pub struct GraphHandle {
    processor: GraphProcessor,
    source: NodeHandle,
    effect: Option<NodeHandle>,
    sink: NodeHandle,
    format: FormatDescriptor,
    effect_info: Option<EffectInfo>,
    advisory: Option<EffectUnavailable>,
    bypassed: bool,
}

impl GraphHandle {
    /// Build the chain for `asset`
    ///
    /// Either returns a graph that is ready to start or an error with nothing
    /// left behind. An effect that cannot be instantiated is not an error:
    /// the graph is wired Source -> Sink and [`GraphHandle::advisory`] is set.
    pub fn build(
        asset: &AudioAsset,
        instantiator: &dyn EffectInstantiator,
        kind: &EffectKind,
    ) -> Result<Self, GraphError> {
        let format = *asset.format();
        format.validate()?;

        let mut graph = AudioGraph::new();
        let source = graph.attach(Box::new(PlayerNode::new(format)));
        let sink = graph.attach(Box::new(SinkNode::new(format)));

        let mut effect = None;
        let mut effect_info = None;
        let mut advisory = None;

        match instantiator.instantiate(kind) {
            Some(unit) => {
                let parameters = unit.parameters();
                let node = EffectNode::new(unit, format)?;
                let info = EffectInfo {
                    instance_id: Uuid::new_v4(),
                    name: node.label().to_string(),
                    kind: node.kind(),
                    parameters,
                };
                let handle = graph.attach(Box::new(node));
                graph.connect(source, handle, format)?;
                graph.connect(handle, sink, format)?;
                debug!(name = %info.name, id = %info.instance_id, "effect inserted");
                effect = Some(handle);
                effect_info = Some(info);
            }
            None => {
                let unavailable = EffectUnavailable { kind: *kind };
                warn!(kind = %kind, "{}", unavailable);
                graph.connect(source, sink, format)?;
                advisory = Some(unavailable);
            }
        }

        info!(
            file = asset.file_name(),
            format = %format,
            effect = effect.is_some(),
            "graph built"
        );

        let channels = format.channels();
        let handle = Self {
            processor: GraphProcessor::new(graph, sink, channels),
            source,
            effect,
            sink,
            format,
            effect_info,
            advisory,
            bypassed: false,
        };
        handle.verify_topology()?;
        Ok(handle)
    }

    pub fn processor(&self) -> &GraphProcessor {
        &self.processor
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    pub fn source(&self) -> NodeHandle {
        self.source
    }

    pub fn effect(&self) -> Option<NodeHandle> {
        self.effect
    }

    pub fn sink(&self) -> NodeHandle {
        self.sink
    }

    pub fn has_effect(&self) -> bool {
        self.effect.is_some()
    }

    pub fn effect_info(&self) -> Option<&EffectInfo> {
        self.effect_info.as_ref()
    }

    pub fn advisory(&self) -> Option<&EffectUnavailable> {
        self.advisory.as_ref()
    }

    /// Parameters of the live effect, if any
    pub fn parameter_source(&self) -> Option<Arc<dyn ParameterSource>> {
        self.effect_info.as_ref().map(|info| info.parameters.clone())
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.processor.lock().connections().to_vec()
    }

    /// Chain currently wired
    pub fn topology(&self) -> Topology {
        match self.effect {
            Some(_) if !self.bypassed => Topology::Processed,
            _ => Topology::Direct,
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Route around the effect, or back through it
    ///
    /// The effect stays attached while bypassed. Without an effect this is a
    /// no-op.
    pub fn set_bypass(&mut self, bypass: bool) -> Result<(), GraphError> {
        let Some(effect) = self.effect else {
            return Ok(());
        };
        if bypass == self.bypassed {
            return Ok(());
        }

        {
            let mut graph = self.processor.lock();
            if bypass {
                graph.disconnect(self.source, effect);
                graph.disconnect(effect, self.sink);
                graph.connect(self.source, self.sink, self.format)?;
            } else {
                graph.disconnect(self.source, self.sink);
                graph.connect(self.source, effect, self.format)?;
                graph.connect(effect, self.sink, self.format)?;
            }
            if let Some(node) = graph.get_node_mut(effect) {
                node.reset();
            }
        }

        self.bypassed = bypass;
        debug!(bypass, "effect bypass changed");
        self.verify_topology()
    }

    /// Schedule the asset's data on the player from its first frame
    pub fn schedule(&self, asset: &AudioAsset, on_complete: Option<CompletionHandler>) {
        let mut graph = self.processor.lock();
        if let Some(player) = graph.node_as_mut::<PlayerNode>(self.source) {
            player.schedule(asset.data(), on_complete);
        }
    }

    pub fn play_player(&self) {
        let mut graph = self.processor.lock();
        if let Some(player) = graph.node_as_mut::<PlayerNode>(self.source) {
            player.play();
        }
    }

    /// Halt the player, discarding unplayed audio
    pub fn stop_player(&self) {
        let mut graph = self.processor.lock();
        if let Some(player) = graph.node_as_mut::<PlayerNode>(self.source) {
            player.stop();
        }
    }

    /// Exactly one of the two chains must be wired
    pub fn verify_topology(&self) -> Result<(), GraphError> {
        let graph = self.processor.lock();
        let connections = graph.connections();
        let has = |from: NodeHandle, to: NodeHandle| connections.iter().any(|c| c.links(from, to));

        let direct = has(self.source, self.sink);
        let processed = self
            .effect
            .map(|e| has(self.source, e) && has(e, self.sink))
            .unwrap_or(false);

        let expected = self.topology();
        let wired = match (direct, processed) {
            (true, false) => Some(Topology::Direct),
            (false, true) => Some(Topology::Processed),
            _ => None,
        };
        if wired != Some(expected) || connections.iter().any(|c| c.format != self.format) {
            return Err(GraphError::TopologyViolation);
        }
        Ok(())
    }
}

impl fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphHandle")
            .field("format", &self.format)
            .field("topology", &self.topology())
            .field("effect", &self.effect_info)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectRegistry;

    fn asset() -> AudioAsset {
        let format = FormatDescriptor::stereo_f32(44100.0).unwrap();
        AudioAsset::from_planar("tone.wav", format, vec![vec![0.25; 256], vec![-0.25; 256]])
            .unwrap()
    }

    #[test]
    fn test_build_with_effect() {
        let handle =
            GraphHandle::build(&asset(), &EffectRegistry::builtin(), &EffectKind::SOUND_ISOLATION)
                .unwrap();
        assert!(handle.has_effect());
        assert!(handle.advisory().is_none());
        assert_eq!(handle.topology(), Topology::Processed);
        assert_eq!(handle.connections().len(), 2);
        assert_eq!(handle.effect_info().unwrap().name, "Sound Isolation");
    }

    #[test]
    fn test_build_falls_back_without_effect() {
        let handle =
            GraphHandle::build(&asset(), &EffectRegistry::empty(), &EffectKind::SOUND_ISOLATION)
                .unwrap();
        assert!(!handle.has_effect());
        assert_eq!(handle.topology(), Topology::Direct);
        assert_eq!(handle.connections().len(), 1);
        assert!(handle
            .advisory()
            .unwrap()
            .to_string()
            .contains("unavailable"));
        assert!(handle.parameter_source().is_none());
    }

    #[test]
    fn test_bypass_rewires_and_restores() {
        let mut handle =
            GraphHandle::build(&asset(), &EffectRegistry::builtin(), &EffectKind::SOUND_ISOLATION)
                .unwrap();
        handle.set_bypass(true).unwrap();
        assert_eq!(handle.topology(), Topology::Direct);
        assert!(handle.has_effect());
        assert_eq!(handle.connections().len(), 1);

        handle.set_bypass(false).unwrap();
        assert_eq!(handle.topology(), Topology::Processed);
        assert_eq!(handle.connections().len(), 2);
    }

    #[test]
    fn test_connections_carry_asset_format() {
        let asset = asset();
        let handle =
            GraphHandle::build(&asset, &EffectRegistry::builtin(), &EffectKind::SOUND_ISOLATION)
                .unwrap();
        assert!(handle
            .connections()
            .iter()
            .all(|c| c.format == *asset.format()));
    }
}
