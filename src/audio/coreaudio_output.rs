//! CoreAudio Output
//! Renders the graph to the system default output device
//!
//! The `AudioUnit` lives on a dedicated thread for as long as output runs;
//! the device's render callback pulls interleaved f32 straight from the
//! [`GraphProcessor`].

use super::output::AudioOutput;
use super::processor::GraphProcessor;
use crate::error::EngineError;
use crate::format::FormatDescriptor;
use coreaudio::audio_unit::audio_format::LinearPcmFlags;
use coreaudio::audio_unit::render_callback::{self, data};
use coreaudio::audio_unit::{AudioUnit, Element, IOType, SampleFormat, Scope, StreamFormat};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

pub struct CoreAudioOutput {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CoreAudioOutput {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl Default for CoreAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CoreAudioOutput {
    fn start(
        &mut self,
        processor: GraphProcessor,
        format: &FormatDescriptor,
    ) -> Result<(), EngineError> {
        if self.is_running() {
            return Ok(());
        }
        self.stop();

        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);
        let (ready_tx, ready_rx) = bounded::<Result<(), EngineError>>(1);
        let format = *format;

        let spawned = std::thread::Builder::new()
            .name("isolator-coreaudio".to_string())
            .spawn(move || {
                let mut audio_unit = match open_output(processor, &format, running.clone()) {
                    Ok(unit) => {
                        let _ = ready_tx.send(Ok(()));
                        unit
                    }
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the unit alive until stopped
                while running.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(10));
                }

                let _ = audio_unit.stop();
                debug!("coreaudio unit stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                EngineError::StartFailed(e.to_string())
            })?;
        self.thread = Some(spawned);

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(format = %format, "coreaudio output started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.stop();
                Err(e)
            }
            Err(_) => {
                self.stop();
                Err(EngineError::OutputUnavailable(
                    "output thread exited before starting".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("coreaudio output thread panicked");
            } else {
                info!("coreaudio output stopped");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.thread.is_some()
    }

    fn name(&self) -> &str {
        "CoreAudio"
    }
}

impl Drop for CoreAudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_output(
    processor: GraphProcessor,
    format: &FormatDescriptor,
    running: Arc<AtomicBool>,
) -> Result<AudioUnit, EngineError> {
    let unavailable = |what: &str, e: coreaudio::Error| {
        EngineError::OutputUnavailable(format!("{}: {:?}", what, e))
    };

    let mut audio_unit =
        AudioUnit::new(IOType::DefaultOutput).map_err(|e| unavailable("create audio unit", e))?;

    let stream_format = StreamFormat {
        sample_rate: format.sample_rate,
        sample_format: SampleFormat::F32,
        flags: LinearPcmFlags::IS_FLOAT | LinearPcmFlags::IS_PACKED,
        channels: format.channel_count as u32,
    };
    audio_unit
        .set_property(
            coreaudio::sys::kAudioUnitProperty_StreamFormat,
            Scope::Input,
            Element::Output,
            Some(&stream_format.to_asbd()),
        )
        .map_err(|e| unavailable("set stream format", e))?;

    type Args = render_callback::Args<data::Interleaved<f32>>;
    audio_unit
        .set_render_callback(move |args: Args| {
            let Args { data, .. } = args;
            let buffer = data.buffer;
            if !running.load(Ordering::Relaxed) {
                buffer.fill(0.0);
                return Ok(());
            }
            processor.render_interleaved(buffer);
            Ok(())
        })
        .map_err(|e| unavailable("set render callback", e))?;

    audio_unit
        .initialize()
        .map_err(|e| EngineError::StartFailed(format!("initialize: {:?}", e)))?;
    audio_unit
        .start()
        .map_err(|e| EngineError::StartFailed(format!("start: {:?}", e)))?;
    Ok(audio_unit)
}
