//! Raw media exchanged between the render loop and the encoder.

use std::sync::Arc;

/// One RGBA8 picture.
///
/// Pixel data is reference-counted so the surface, the decoder's
/// latest-frame slot and the encoder input can share it without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Row-major RGBA8, `width * height * 4` bytes.
    pub pixels: Arc<[u8]>,
}

impl VideoFrame {
    /// Wrap RGBA pixel data. Returns `None` when the buffer size does not
    /// match the dimensions.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != Self::byte_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(Self::byte_len(width, height))
            .collect();
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    /// A fully transparent frame, which is what a freshly resized surface
    /// holds.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::solid(width, height, [0, 0, 0, 0])
    }

    /// Expected buffer length for the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// Colour of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Nearest-neighbour resample to the given size. Returns a cheap clone
    /// when the size already matches.
    pub fn scaled_to(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if self.width == 0 || self.height == 0 || width == 0 || height == 0 {
            return Self::blank(width, height);
        }

        let mut pixels = Vec::with_capacity(Self::byte_len(width, height));
        for y in 0..height {
            let sy = (y as u64 * self.height as u64 / height as u64) as usize;
            for x in 0..width {
                let sx = (x as u64 * self.width as u64 / width as u64) as usize;
                let offset = (sy * self.width as usize + sx) * 4;
                pixels.extend_from_slice(&self.pixels[offset..offset + 4]);
            }
        }
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }
}

/// PCM layout fed to the audio encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second per channel.
    pub sample_rate: u32,

    /// Interleaved channel count.
    pub channels: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// A run of interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Layout of `samples`.
    pub format: AudioFormat,

    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
}

impl AudioBlock {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    /// Playback length of this block.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.format.sample_rate.max(1) as f64
    }

    /// Little-endian byte encoding, as expected by `F32LE` raw audio caps.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(VideoFrame::from_rgba(2, 2, vec![0; 16]).is_some());
        assert!(VideoFrame::from_rgba(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn test_scaled_to_nearest_neighbour() {
        let mut pixels = Vec::new();
        pixels.extend_from_slice(&[255, 0, 0, 255]);
        pixels.extend_from_slice(&[0, 0, 255, 255]);
        let frame = VideoFrame::from_rgba(2, 1, pixels).unwrap();

        let scaled = frame.scaled_to(4, 2);
        assert_eq!(scaled.width, 4);
        assert_eq!(scaled.height, 2);
        assert_eq!(scaled.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(scaled.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(scaled.pixel(2, 0), Some([0, 0, 255, 255]));
        assert_eq!(scaled.pixel(3, 1), Some([0, 0, 255, 255]));
        assert_eq!(scaled.pixel(4, 0), None);
    }

    #[test]
    fn test_audio_block_duration() {
        let block = AudioBlock {
            format: AudioFormat {
                sample_rate: 48000,
                channels: 2,
            },
            samples: vec![0.0; 960 * 2],
        };
        assert_eq!(block.frames(), 960);
        assert!((block.duration_secs() - 0.02).abs() < 1e-9);
        assert_eq!(block.to_le_bytes().len(), 960 * 2 * 4);
    }
}
