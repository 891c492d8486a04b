mod common;

use isolator_lib::audio::{AudioEngine, GraphHandle, OfflineOutput, Pacing, Topology};
use isolator_lib::effect::isolation::MIX;
use isolator_lib::effect::{EffectKind, EffectRegistry};
use isolator_lib::error::{EffectError, EngineError, GraphError};
use isolator_lib::{AudioAsset, FormatDescriptor, SampleRepresentation};
use std::time::Duration;

fn asset(channels: u16, frames: usize, value: f32) -> AudioAsset {
    let format = FormatDescriptor::new(44100.0, channels, SampleRepresentation::Int16).unwrap();
    AudioAsset::from_planar(
        "fixture.wav",
        format,
        (0..channels).map(|_| vec![value; frames]).collect(),
    )
    .unwrap()
}

#[test]
fn test_build_wires_exactly_one_chain() {
    let processed =
        GraphHandle::build(&asset(2, 64, 0.0), &EffectRegistry::builtin(), &EffectKind::SOUND_ISOLATION)
            .unwrap();
    let direct =
        GraphHandle::build(&asset(2, 64, 0.0), &EffectRegistry::empty(), &EffectKind::SOUND_ISOLATION)
            .unwrap();

    assert_eq!(processed.topology(), Topology::Processed);
    assert!(processed.advisory().is_none());
    assert_eq!(direct.topology(), Topology::Direct);
    assert!(direct.advisory().is_some());
    assert!(processed.verify_topology().is_ok());
    assert!(direct.verify_topology().is_ok());
}

#[test]
fn test_every_connection_uses_asset_format() {
    let asset = asset(6, 64, 0.0);
    let handle =
        GraphHandle::build(&asset, &EffectRegistry::builtin(), &EffectKind::SOUND_ISOLATION).unwrap();
    let connections = handle.connections();
    assert_eq!(connections.len(), 2);
    assert!(connections.iter().all(|c| c.format == *asset.format()));
}

#[test]
fn test_failing_factory_falls_back_to_direct() {
    let registry = EffectRegistry::empty().with(EffectKind::SOUND_ISOLATION, || {
        Err(EffectError::Factory("unlicensed".to_string()))
    });
    let handle =
        GraphHandle::build(&asset(2, 64, 0.0), &registry, &EffectKind::SOUND_ISOLATION).unwrap();
    assert_eq!(handle.topology(), Topology::Direct);
    assert!(handle.effect_info().is_none());
    assert!(handle.parameter_source().is_none());
}

#[test]
fn test_effect_rejecting_format_fails_build() {
    let result =
        GraphHandle::build(&asset(2, 64, 0.0), &common::picky_registry(), &EffectKind::SOUND_ISOLATION);
    assert!(matches!(result, Err(GraphError::Effect(_))));
}

#[test]
fn test_dry_effect_passes_audio_to_output() {
    let asset = asset(2, 4096, 0.25);
    let handle =
        GraphHandle::build(&asset, &EffectRegistry::builtin(), &EffectKind::SOUND_ISOLATION).unwrap();
    let tree = handle.parameter_source().unwrap().parameter_tree().unwrap();
    tree.parameter(MIX).unwrap().set_value(0.0);

    handle.schedule(&asset, None);
    handle.play_player();

    let (output, mut tap) =
        OfflineOutput::new(Pacing::Fixed(Duration::from_millis(1)), 128).with_capture(65536);
    let mut engine = AudioEngine::new(Box::new(output));
    engine.install(handle);
    engine.start().unwrap();
    std::thread::sleep(Duration::from_millis(40));
    engine.stop();

    let captured = tap.drain();
    assert!(captured.len() >= 256);
    assert!(captured[..256].iter().all(|s| (*s - 0.25).abs() < 1e-6));
}

#[test]
fn test_bypass_round_trip_keeps_effect_attached() {
    let mut handle =
        GraphHandle::build(&asset(2, 64, 0.0), &EffectRegistry::builtin(), &EffectKind::SOUND_ISOLATION)
            .unwrap();
    let effect = handle.effect().unwrap();

    handle.set_bypass(true).unwrap();
    assert_eq!(handle.topology(), Topology::Direct);
    assert_eq!(handle.effect(), Some(effect));
    assert!(handle.processor().lock().contains(effect));

    handle.set_bypass(true).unwrap();
    handle.set_bypass(false).unwrap();
    assert_eq!(handle.topology(), Topology::Processed);
    assert!(matches!(handle.verify_topology(), Ok(())));
}

#[test]
fn test_engine_stop_without_graph_is_safe() {
    let mut engine = AudioEngine::new(Box::new(OfflineOutput::new(Pacing::Realtime, 64)));
    engine.stop();
    assert!(matches!(engine.start(), Err(EngineError::NoGraph)));
    assert!(!engine.is_running());
}
