//! Output drivers
//!
//! A driver pulls rendered audio from a [`GraphProcessor`] on its own
//! execution context. The control plane only calls `start`/`stop`.

use super::processor::GraphProcessor;
use super::MAX_FRAMES;
use crate::error::EngineError;
use crate::format::FormatDescriptor;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Device-side end of the engine
pub trait AudioOutput: Send {
    /// Begin pulling audio from `processor`
    fn start(&mut self, processor: GraphProcessor, format: &FormatDescriptor)
        -> Result<(), EngineError>;

    /// Stop pulling audio; no-op when not running
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn name(&self) -> &str;
}

/// Delay between render quanta of an [`OfflineOutput`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep for the duration of each block, like a device would
    Realtime,
    /// Sleep for a fixed duration per block
    Fixed(Duration),
}

/// Read side of an [`OfflineOutput`] capture ring
pub struct CaptureTap {
    consumer: HeapCons<f32>,
}

impl CaptureTap {
    /// Interleaved samples waiting in the ring
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Take every sample currently in the ring
    pub fn drain(&mut self) -> Vec<f32> {
        let mut out = vec![0.0; self.consumer.occupied_len()];
        let read = self.consumer.pop_slice(&mut out);
        out.truncate(read);
        out
    }
}

/// Renders on a plain thread without audio hardware
///
/// Used as the null device on hosts without a system output and to drive
/// graphs deterministically in tests.
pub struct OfflineOutput {
    pacing: Pacing,
    block_frames: usize,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    capture: Option<Arc<Mutex<HeapProd<f32>>>>,
}

impl OfflineOutput {
    pub fn new(pacing: Pacing, block_frames: usize) -> Self {
        Self {
            pacing,
            block_frames: block_frames.clamp(1, MAX_FRAMES),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            capture: None,
        }
    }

    /// Also copy rendered samples into a ring of `capacity` samples
    ///
    /// Samples that do not fit are dropped.
    pub fn with_capture(mut self, capacity: usize) -> (Self, CaptureTap) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1)).split();
        self.capture = Some(Arc::new(Mutex::new(producer)));
        (self, CaptureTap { consumer })
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }
}

impl AudioOutput for OfflineOutput {
    fn start(
        &mut self,
        processor: GraphProcessor,
        format: &FormatDescriptor,
    ) -> Result<(), EngineError> {
        if self.is_running() {
            return Ok(());
        }
        self.stop();

        let channels = processor.channels();
        let block = self.block_frames;
        let delay = match self.pacing {
            Pacing::Realtime => Duration::from_secs_f64(format.frames_to_seconds(block)),
            Pacing::Fixed(delay) => delay,
        };

        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);
        let capture = self.capture.clone();

        let spawned = std::thread::Builder::new()
            .name("isolator-offline".to_string())
            .spawn(move || {
                let mut buffer = vec![0.0f32; block * channels];
                while running.load(Ordering::SeqCst) {
                    processor.render_interleaved(&mut buffer);
                    if let Some(capture) = &capture {
                        capture.lock().push_slice(&buffer);
                    }
                    std::thread::sleep(delay);
                }
                debug!(frames = processor.rendered_frames(), "offline render loop exited");
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                info!(format = %format, block, "offline output started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(EngineError::StartFailed(e.to_string()))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("offline render thread panicked");
            } else {
                info!("offline output stopped");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.thread.is_some()
    }

    fn name(&self) -> &str {
        "Offline"
    }
}

impl Drop for OfflineOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
