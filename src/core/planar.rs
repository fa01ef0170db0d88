use anyhow::Result;

use crate::core::codec::{check_frame, EncodeParams, Encoder};
use crate::core::EncodeFlags;

/// Convert RGB to YCbCr using float BT.601
#[inline]
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    let cb = (-0.168736 * r - 0.331264 * g + 0.5 * b + 128.0).round().clamp(0.0, 255.0) as u8;
    let cr = (0.5 * r - 0.418688 * g - 0.081312 * b + 128.0).round().clamp(0.0, 255.0) as u8;

    (y, cb, cr)
}

/// Chroma plane dimensions for 4:2:0. Odd sizes round up.
#[inline]
pub fn chroma_dims(width: u32, height: u32) -> (usize, usize) {
    ((width as usize + 1) / 2, (height as usize + 1) / 2)
}

/// Bytes in an I420 frame: full-size Y followed by quarter-size U and V.
/// `None` when that overflows `usize`.
pub fn i420_len(width: u32, height: u32) -> Option<usize> {
    let (cw, ch) = chroma_dims(width, height);
    let luma = (width as usize).checked_mul(height as usize)?;
    let chroma = cw.checked_mul(ch)?.checked_mul(2)?;
    luma.checked_add(chroma)
}

/// Write BGRA pixels as planar I420 into `dst`. With `point_sample` the
/// chroma of each 2x2 block is taken from its top-left pixel instead of the
/// block average.
pub fn bgra_to_i420(src: &[u8], width: u32, height: u32, point_sample: bool, dst: &mut [u8]) -> usize {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = chroma_dims(width, height);
    let (y_plane, rest) = dst.split_at_mut(w * h);
    let (u_plane, rest) = rest.split_at_mut(cw * ch);
    let v_plane = &mut rest[..cw * ch];

    for row in 0..h {
        let line = &src[row * w * 4..(row + 1) * w * 4];
        for (col, px) in line.chunks_exact(4).enumerate() {
            let (yy, _, _) = rgb_to_ycbcr(px[2], px[1], px[0]);
            y_plane[row * w + col] = yy;
        }
    }

    for cy in 0..ch {
        for cx in 0..cw {
            let (x0, y0) = (cx * 2, cy * 2);
            let (cb, cr) = if point_sample {
                let i = (y0 * w + x0) * 4;
                let (_, cb, cr) = rgb_to_ycbcr(src[i + 2], src[i + 1], src[i]);
                (cb, cr)
            } else {
                let mut sum_cb = 0u32;
                let mut sum_cr = 0u32;
                let mut n = 0u32;
                for y in y0..(y0 + 2).min(h) {
                    for x in x0..(x0 + 2).min(w) {
                        let i = (y * w + x) * 4;
                        let (_, cb, cr) = rgb_to_ycbcr(src[i + 2], src[i + 1], src[i]);
                        sum_cb += cb as u32;
                        sum_cr += cr as u32;
                        n += 1;
                    }
                }
                (((sum_cb + n / 2) / n) as u8, ((sum_cr + n / 2) / n) as u8)
            };
            u_plane[cy * cw + cx] = cb;
            v_plane[cy * cw + cx] = cr;
        }
    }

    w * h + 2 * cw * ch
}

/// Planar YUV "encoder": a colour-space conversion timed like any other stage.
/// Quality is ignored; `FAST_UPSAMPLE` selects point-sampled chroma.
pub struct PlanarEncoder;

impl Encoder for PlanarEncoder {
    fn name(&self) -> &str {
        "yuv"
    }

    fn max_encoded_len(&self, width: u32, height: u32) -> Option<usize> {
        i420_len(width, height)
    }

    fn supported_flags(&self) -> EncodeFlags {
        EncodeFlags::FAST_UPSAMPLE
    }

    fn encode(
        &mut self,
        src: &[u8],
        width: u32,
        height: u32,
        params: EncodeParams,
        dst: &mut [u8],
    ) -> Result<usize> {
        check_frame(src, width, height)?;
        let needed = i420_len(width, height)
            .ok_or_else(|| anyhow::anyhow!("{}x{} frame overflows usize", width, height))?;
        if dst.len() < needed {
            anyhow::bail!("yuv needs {} bytes, buffer holds {}", needed, dst.len());
        }
        let point_sample = params.flags.contains(EncodeFlags::FAST_UPSAMPLE);
        Ok(bgra_to_i420(src, width, height, point_sample, dst))
    }
}
