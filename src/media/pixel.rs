//! Pixel layouts a decoder may hand back, and conversion of each into the
//! 24-bit interleaved RGB images the rest of the crate works with.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Error type for pixel conversion
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("Frame has zero width or height")]
    EmptyFrame,
    #[error("Pixel buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
}

/// Memory layout of a decoded picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    Rgb24,
    Bgr24,
    Rgba32,
    Bgra32,
    Gray8,
    /// Y plane, then quarter-size U and V planes
    Yuv420p,
    /// Y plane, then one interleaved UV plane
    Nv12,
}

impl PixelLayout {
    /// Bytes needed for a tightly packed picture of this layout
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        match self {
            Self::Rgb24 | Self::Bgr24 => w * h * 3,
            Self::Rgba32 | Self::Bgra32 => w * h * 4,
            Self::Gray8 => w * h,
            Self::Yuv420p | Self::Nv12 => {
                let (cw, ch) = chroma_dims(width, height);
                w * h + 2 * cw * ch
            }
        }
    }

    /// Convert a tightly packed buffer into an RGB image
    pub fn to_rgb(&self, data: &[u8], width: u32, height: u32) -> Result<RgbImage, ConvertError> {
        if width == 0 || height == 0 {
            return Err(ConvertError::EmptyFrame);
        }
        let expected = self.buffer_size(width, height);
        if data.len() < expected {
            return Err(ConvertError::ShortBuffer { expected, actual: data.len() });
        }

        let pixels = width as usize * height as usize;
        let mut rgb = Vec::with_capacity(pixels * 3);

        match self {
            Self::Rgb24 => rgb.extend_from_slice(&data[..pixels * 3]),
            Self::Bgr24 => {
                for px in data[..pixels * 3].chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
            Self::Rgba32 => {
                for px in data[..pixels * 4].chunks_exact(4) {
                    rgb.extend_from_slice(&px[..3]);
                }
            }
            Self::Bgra32 => {
                for px in data[..pixels * 4].chunks_exact(4) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
            Self::Gray8 => {
                for &v in &data[..pixels] {
                    rgb.extend_from_slice(&[v, v, v]);
                }
            }
            Self::Yuv420p => yuv420p_to_rgb(data, width, height, &mut rgb),
            Self::Nv12 => nv12_to_rgb(data, width, height, &mut rgb),
        }

        // Length is exact by construction
        RgbImage::from_raw(width, height, rgb).ok_or(ConvertError::ShortBuffer {
            expected: pixels * 3,
            actual: 0,
        })
    }
}

fn chroma_dims(width: u32, height: u32) -> (usize, usize) {
    (((width + 1) / 2) as usize, ((height + 1) / 2) as usize)
}

/// BT.601 video-range conversion of one sample
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

fn yuv420p_to_rgb(data: &[u8], width: u32, height: u32, out: &mut Vec<u8>) {
    let w = width as usize;
    let h = height as usize;
    let (cw, ch) = chroma_dims(width, height);
    let (y_plane, rest) = data.split_at(w * h);
    let (u_plane, v_plane) = rest.split_at(cw * ch);

    for row in 0..h {
        let uv_row = (row / 2) * cw;
        for col in 0..w {
            let uv = uv_row + col / 2;
            out.extend_from_slice(&yuv_to_rgb(y_plane[row * w + col], u_plane[uv], v_plane[uv]));
        }
    }
}

fn nv12_to_rgb(data: &[u8], width: u32, height: u32, out: &mut Vec<u8>) {
    let w = width as usize;
    let h = height as usize;
    let (cw, _) = chroma_dims(width, height);
    let (y_plane, uv_plane) = data.split_at(w * h);

    for row in 0..h {
        let uv_row = (row / 2) * cw * 2;
        for col in 0..w {
            let uv = uv_row + (col / 2) * 2;
            out.extend_from_slice(&yuv_to_rgb(y_plane[row * w + col], uv_plane[uv], uv_plane[uv + 1]));
        }
    }
}
