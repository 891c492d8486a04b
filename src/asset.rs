//! Audio assets
//!
//! A loaded file is decoded once into planar `f32` and shared with the player
//! node by `Arc`, so the render context never touches the file.

use crate::error::AssetError;
use crate::format::{FormatDescriptor, SampleRepresentation};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Planar sample data, one `Vec` per channel, all the same length
#[derive(Debug, Clone, PartialEq)]
pub struct PcmData {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl PcmData {
    pub fn new(channels: Vec<Vec<f32>>) -> Result<Self, AssetError> {
        let frames = channels.first().map(|c| c.len()).unwrap_or(0);
        if channels.iter().any(|c| c.len() != frames) {
            return Err(AssetError::ChannelMismatch {
                expected: channels.len(),
            });
        }
        Ok(Self { channels, frames })
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }
}

/// Released when dropped
///
/// Returned by [`FileAccess::acquire`]; holding it keeps the file readable.
pub struct AccessGrant {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl AccessGrant {
    /// Grant that runs `release` when dropped
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Grant that needs no release
    pub fn unrestricted() -> Self {
        Self { release: None }
    }
}

impl Drop for AccessGrant {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrant")
            .field("scoped", &self.release.is_some())
            .finish()
    }
}

/// Scoped access to protected files
///
/// Sandboxed hosts hand out paths that are only readable between a start and
/// an end call. [`AudioAsset::open`] holds the grant exactly as long as the
/// decode takes.
pub trait FileAccess: Send + Sync {
    fn acquire(&self, path: &Path) -> Result<AccessGrant, AssetError>;
}

/// Plain filesystem access
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectAccess;

impl FileAccess for DirectAccess {
    fn acquire(&self, _path: &Path) -> Result<AccessGrant, AssetError> {
        Ok(AccessGrant::unrestricted())
    }
}

/// A decoded audio file
#[derive(Debug, Clone)]
pub struct AudioAsset {
    path: PathBuf,
    file_name: String,
    format: FormatDescriptor,
    data: Arc<PcmData>,
}

impl AudioAsset {
    /// Decode a linear PCM WAV file
    pub fn open(path: impl AsRef<Path>, access: &dyn FileAccess) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let _grant = access.acquire(path)?;
        debug!(path = %path.display(), "opening audio file");

        let reader = hound::WavReader::open(path).map_err(|source| AssetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = reader.spec();

        let representation = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 8) => SampleRepresentation::Int8,
            (hound::SampleFormat::Int, 16) => SampleRepresentation::Int16,
            (hound::SampleFormat::Int, 24) => SampleRepresentation::Int24,
            (hound::SampleFormat::Int, 32) => SampleRepresentation::Int32,
            (hound::SampleFormat::Float, 32) => SampleRepresentation::Float32,
            (hound::SampleFormat::Int, bits) => {
                return Err(AssetError::UnsupportedSampleFormat { bits, kind: "int" })
            }
            (hound::SampleFormat::Float, bits) => {
                return Err(AssetError::UnsupportedSampleFormat {
                    bits,
                    kind: "float",
                })
            }
        };

        let format = FormatDescriptor::new(spec.sample_rate as f64, spec.channels, representation)?;
        let channel_count = format.channels();

        let decode_err = |source: hound::Error| AssetError::Decode {
            path: path.to_path_buf(),
            source,
        };
        let interleaved: Vec<f32> = if representation.is_float() {
            reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        } else {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        };

        let frames = interleaved.len() / channel_count;
        let mut planar = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let asset = Self {
            path: path.to_path_buf(),
            file_name,
            format,
            data: Arc::new(PcmData::new(planar)?),
        };
        info!(
            file = %asset.file_name,
            format = %asset.format,
            frames,
            "audio file loaded"
        );
        Ok(asset)
    }

    /// Asset from samples already in memory
    pub fn from_planar(
        name: impl Into<String>,
        format: FormatDescriptor,
        channels: Vec<Vec<f32>>,
    ) -> Result<Self, AssetError> {
        format.validate()?;
        if channels.len() != format.channels() {
            return Err(AssetError::ChannelMismatch {
                expected: format.channels(),
            });
        }
        let file_name = name.into();
        Ok(Self {
            path: PathBuf::from(&file_name),
            file_name,
            format,
            data: Arc::new(PcmData::new(channels)?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    pub fn frames(&self) -> usize {
        self.data.frames()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.format.frames_to_seconds(self.frames()))
    }

    pub fn data(&self) -> Arc<PcmData> {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_wav(path: &Path, spec: hound::WavSpec, frames: usize) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * spec.channels as usize {
            match spec.sample_format {
                hound::SampleFormat::Float => writer.write_sample(0.25f32).unwrap(),
                hound::SampleFormat::Int => writer.write_sample((i % 2) as i16 * 16384).unwrap(),
            }
        }
        writer.finalize().unwrap();
    }

    struct CountingAccess {
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl FileAccess for CountingAccess {
        fn acquire(&self, _path: &Path) -> Result<AccessGrant, AssetError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            let released = self.released.clone();
            Ok(AccessGrant::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    #[test]
    fn test_open_int16_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, 100);

        let asset = AudioAsset::open(&path, &DirectAccess).unwrap();
        assert_eq!(asset.file_name(), "tone.wav");
        assert_eq!(asset.frames(), 100);
        assert_eq!(asset.format().sample_rate, 44100.0);
        assert_eq!(asset.format().channel_count, 2);
        assert_eq!(
            asset.format().sample_representation,
            SampleRepresentation::Int16
        );
        assert_eq!(asset.data().channel(0).unwrap()[0], 0.0);
        assert_eq!(asset.data().channel(1).unwrap()[0], 0.5);
    }

    #[test]
    fn test_open_float_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        write_wav(&path, spec, 480);

        let asset = AudioAsset::open(&path, &DirectAccess).unwrap();
        assert!(asset.format().sample_representation.is_float());
        assert!((asset.duration().as_secs_f64() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_grant_released_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not a wav file").unwrap();

        let access = CountingAccess {
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        };
        let err = AudioAsset::open(&path, &access).unwrap_err();
        assert!(matches!(err, AssetError::Open { .. }));
        assert_eq!(access.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(access.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_planar_checks_channels() {
        let format = FormatDescriptor::stereo_f32(44100.0).unwrap();
        assert!(AudioAsset::from_planar("x", format, vec![vec![0.0; 4]]).is_err());
        assert!(AudioAsset::from_planar("x", format, vec![vec![0.0; 4], vec![0.0; 3]]).is_err());
    }
}
