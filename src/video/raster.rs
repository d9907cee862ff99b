//! Off-screen raster target
//!
//! All video lands on a fixed logical canvas regardless of the size the
//! server encodes at; inbound frames are scale-blitted to it.

use std::sync::Arc;

use crate::error::VideoError;

/// Fallback fill shown instead of stale pixels when a frame is undecodable.
const FALLBACK_FILL: [u8; 4] = [16, 16, 24, 255];

/// A completed frame handed to the consumer.
#[derive(Clone)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA, row-major
    pub pixels: Arc<Vec<u8>>,
}

impl std::fmt::Debug for RenderedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Fixed-size RGBA render target
pub struct RasterTarget {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    frames_drawn: u64,
    frames_dropped: u64,
}

impl RasterTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
            frames_drawn: 0,
            frames_dropped: 0,
        }
    }

    /// Decode an encoded image payload and draw it, replacing the previous
    /// frame. Undecodable payloads leave the fallback fill behind so a
    /// broken stream is visible rather than frozen.
    pub fn draw_encoded(&mut self, data: &[u8]) -> Result<(), VideoError> {
        let decoded = image::load_from_memory(data).map_err(|e| {
            self.fill(FALLBACK_FILL);
            self.frames_dropped += 1;
            VideoError::DecodeFailed(e.to_string())
        })?;

        let rgba = decoded.to_rgba8();
        let (src_w, src_h) = rgba.dimensions();
        self.blit(src_w, src_h, rgba.as_raw());
        Ok(())
    }

    /// Nearest-neighbor blit of an RGBA buffer onto the canvas.
    pub fn blit(&mut self, src_w: u32, src_h: u32, src: &[u8]) {
        if src_w == 0 || src_h == 0 || (src.len() as u64) < src_w as u64 * src_h as u64 * 4 {
            self.fill(FALLBACK_FILL);
            self.frames_dropped += 1;
            return;
        }

        for y in 0..self.height {
            let sy = (y as u64 * src_h as u64 / self.height as u64) as u32;
            for x in 0..self.width {
                let sx = (x as u64 * src_w as u64 / self.width as u64) as u32;
                let si = ((sy * src_w + sx) * 4) as usize;
                let di = ((y * self.width + x) * 4) as usize;
                self.pixels[di..di + 4].copy_from_slice(&src[si..si + 4]);
            }
        }
        self.frames_drawn += 1;
    }

    /// Fill the whole canvas with one color.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Snapshot the canvas for delivery to the consumer.
    pub fn snapshot(&self) -> RenderedFrame {
        RenderedFrame {
            width: self.width,
            height: self.height,
            pixels: Arc::new(self.pixels.clone()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blit_same_size() {
        let mut raster = RasterTarget::new(2, 2);
        let src: Vec<u8> = (0..16).collect();
        raster.blit(2, 2, &src);

        assert_eq!(raster.snapshot().pixels[..16], src[..]);
        assert_eq!(raster.frames_drawn(), 1);
    }

    #[test]
    fn test_blit_scales_up() {
        let mut raster = RasterTarget::new(4, 4);
        // 2x2 source: each quadrant a distinct color.
        let mut src = Vec::new();
        for c in [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [255, 255, 0, 255]] {
            src.extend_from_slice(&c);
        }
        raster.blit(2, 2, &src);

        let frame = raster.snapshot();
        // Top-left quadrant of the canvas comes from source pixel (0,0).
        assert_eq!(&frame.pixels[0..4], &[255, 0, 0, 255]);
        // Bottom-right from source pixel (1,1).
        let di = ((3 * 4 + 3) * 4) as usize;
        assert_eq!(&frame.pixels[di..di + 4], &[255, 255, 0, 255]);
    }

    #[test]
    fn test_undecodable_frame_leaves_fallback_not_stale() {
        let mut raster = RasterTarget::new(2, 2);
        raster.blit(1, 1, &[200, 200, 200, 255]);

        assert!(raster.draw_encoded(b"not an image").is_err());
        let frame = raster.snapshot();
        assert_eq!(&frame.pixels[0..4], &FALLBACK_FILL);
        assert_eq!(raster.frames_dropped(), 1);
    }

    #[test]
    fn test_short_source_buffer_dropped() {
        let mut raster = RasterTarget::new(2, 2);
        raster.blit(4, 4, &[0; 8]);
        assert_eq!(raster.frames_drawn(), 0);
        assert_eq!(raster.frames_dropped(), 1);
    }
}
