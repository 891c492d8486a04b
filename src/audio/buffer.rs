//! Audio Buffer implementation

use super::MAX_FRAMES;

/// モノラルオーディオバッファ（1チャンネル分のレンダー量子）
pub struct AudioBuffer {
    data: Box<[f32; MAX_FRAMES]>,
    valid_frames: usize,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self {
            data: Box::new([0.0; MAX_FRAMES]),
            valid_frames: 0,
        }
    }

    /// Clear the buffer (fill with zeros)
    pub fn clear(&mut self, frames: usize) {
        let frames = frames.min(MAX_FRAMES);
        self.data[..frames].fill(0.0);
        self.valid_frames = frames;
    }

    /// Get the number of valid frames
    pub fn valid_frames(&self) -> usize {
        self.valid_frames
    }

    /// Set the number of valid frames
    pub fn set_valid_frames(&mut self, frames: usize) {
        self.valid_frames = frames.min(MAX_FRAMES);
    }

    /// Get samples as a slice
    pub fn samples(&self) -> &[f32] {
        &self.data[..self.valid_frames]
    }

    /// Get samples as a mutable slice
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data[..self.valid_frames]
    }

    /// Copy from another buffer, taking over its frame count
    pub fn copy_from(&mut self, source: &AudioBuffer) {
        let frames = source.valid_frames;
        self.data[..frames].copy_from_slice(&source.data[..frames]);
        self.valid_frames = frames;
    }

    /// Write raw samples directly into the buffer
    pub fn write_samples(&mut self, samples: &[f32]) {
        let frames = samples.len().min(MAX_FRAMES);
        self.data[..frames].copy_from_slice(&samples[..frames]);
        self.valid_frames = frames;
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AudioBuffer {
    fn clone(&self) -> Self {
        let mut new = Self::new();
        new.data.copy_from_slice(&*self.data);
        new.valid_frames = self.valid_frames;
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_samples() {
        let mut buf = AudioBuffer::new();
        buf.write_samples(&[0.25, -0.75, 0.5]);
        assert_eq!(buf.valid_frames(), 3);
        assert_eq!(buf.samples(), &[0.25, -0.75, 0.5]);
    }

    #[test]
    fn test_clear_caps_at_max_frames() {
        let mut buf = AudioBuffer::new();
        buf.clear(MAX_FRAMES * 2);
        assert_eq!(buf.valid_frames(), MAX_FRAMES);
        assert!(buf.samples().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_copy_from_takes_frame_count() {
        let mut a = AudioBuffer::new();
        a.write_samples(&[1.0; 16]);
        let mut b = AudioBuffer::new();
        b.clear(64);
        b.copy_from(&a);
        assert_eq!(b.valid_frames(), 16);
        assert_eq!(b.samples()[0], 1.0);
    }
}
