#![allow(dead_code)]

use isolator_lib::audio::{OfflineOutput, Pacing};
use isolator_lib::effect::isolation::IsolationEffect;
use isolator_lib::effect::{EffectKind, EffectRegistry, EffectUnit};
use isolator_lib::error::EffectError;
use isolator_lib::audio::AudioBuffer;
use isolator_lib::params::{Parameter, ParameterSlot, ParameterSource, ParameterTree};
use isolator_lib::{FormatDescriptor, PlaybackController, PlayerConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SETTLE_MS: u64 = 20;

pub fn controller(registry: EffectRegistry) -> PlaybackController {
    controller_with_settle(registry, SETTLE_MS)
}

pub fn controller_with_settle(registry: EffectRegistry, settle_ms: u64) -> PlaybackController {
    let config = PlayerConfig {
        settle_interval_ms: settle_ms,
        ..PlayerConfig::default()
    };
    let output = OfflineOutput::new(Pacing::Fixed(Duration::from_millis(1)), 256);
    PlaybackController::new(config, Arc::new(registry), Box::new(output)).unwrap()
}

/// Write a 16-bit WAV of a quiet square wave
pub fn write_wav(dir: &Path, name: &str, channels: u16, sample_rate: u32, frames: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for frame in 0..frames {
        let value: i16 = if (frame / 50) % 2 == 0 { 4000 } else { -4000 };
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

/// Process control messages until `done` holds or `timeout` passes
pub fn wait_until(
    player: &mut PlaybackController,
    timeout: Duration,
    mut done: impl FnMut(&PlaybackController) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        player.wait_and_process(Duration::from_millis(5));
        if done(player) {
            return true;
        }
    }
    done(player)
}

/// Process control messages for `duration`
pub fn pump(player: &mut PlaybackController, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        player.wait_and_process(Duration::from_millis(5));
    }
}

/// Isolation effect that counts live instances
pub struct CountedEffect {
    inner: IsolationEffect,
    live: Arc<AtomicUsize>,
}

impl Drop for CountedEffect {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EffectUnit for CountedEffect {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> EffectKind {
        self.inner.kind()
    }

    fn supports_format(&self, format: &FormatDescriptor) -> bool {
        self.inner.supports_format(format)
    }

    fn allocate(&mut self, format: &FormatDescriptor) -> Result<(), EffectError> {
        self.inner.allocate(format)
    }

    fn parameters(&self) -> Arc<dyn ParameterSource> {
        self.inner.parameters()
    }

    fn process(&mut self, channels: &mut [AudioBuffer], frames: usize) {
        self.inner.process(channels, frames)
    }
}

pub fn counted_registry() -> (EffectRegistry, Arc<AtomicUsize>) {
    let live = Arc::new(AtomicUsize::new(0));
    let counter = live.clone();
    let registry = EffectRegistry::empty().with(EffectKind::SOUND_ISOLATION, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedEffect {
            inner: IsolationEffect::new(),
            live: counter.clone(),
        }) as Box<dyn EffectUnit>)
    });
    (registry, live)
}

/// Pass-through effect whose parameter tree appears `delay` after creation
pub struct LateEffect {
    slot: ParameterSlot,
}

impl LateEffect {
    pub fn new(delay: Duration) -> Self {
        let slot = ParameterSlot::new();
        let publisher = slot.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            publisher.publish(ParameterTree::new(vec![
                Parameter::new(7, "gain", "Gain", 0.0, 2.0, 1.0).into(),
            ]));
        });
        Self { slot }
    }
}

impl EffectUnit for LateEffect {
    fn name(&self) -> &str {
        "Late"
    }

    fn kind(&self) -> EffectKind {
        EffectKind::SOUND_ISOLATION
    }

    fn supports_format(&self, format: &FormatDescriptor) -> bool {
        format.is_valid()
    }

    fn allocate(&mut self, _format: &FormatDescriptor) -> Result<(), EffectError> {
        Ok(())
    }

    fn parameters(&self) -> Arc<dyn ParameterSource> {
        Arc::new(self.slot.clone())
    }

    fn process(&mut self, _channels: &mut [AudioBuffer], _frames: usize) {}
}

pub fn late_registry(delay: Duration) -> EffectRegistry {
    EffectRegistry::empty().with(EffectKind::SOUND_ISOLATION, move || {
        Ok(Box::new(LateEffect::new(delay)) as Box<dyn EffectUnit>)
    })
}

/// Effect that refuses every format
pub struct PickyEffect;

impl EffectUnit for PickyEffect {
    fn name(&self) -> &str {
        "Picky"
    }

    fn kind(&self) -> EffectKind {
        EffectKind::SOUND_ISOLATION
    }

    fn supports_format(&self, _format: &FormatDescriptor) -> bool {
        false
    }

    fn allocate(&mut self, format: &FormatDescriptor) -> Result<(), EffectError> {
        Err(EffectError::UnsupportedFormat(*format))
    }

    fn parameters(&self) -> Arc<dyn ParameterSource> {
        Arc::new(ParameterSlot::new())
    }

    fn process(&mut self, _channels: &mut [AudioBuffer], _frames: usize) {}
}

pub fn picky_registry() -> EffectRegistry {
    EffectRegistry::empty().with(EffectKind::SOUND_ISOLATION, || {
        Ok(Box::new(PickyEffect) as Box<dyn EffectUnit>)
    })
}
