use anyhow::{anyhow, bail, Result};
use jpeg_encoder::{ColorType, Encoder as JpegWriter, SamplingFactor};

use crate::core::codec::{check_frame, EncodeParams, Encoder};
use crate::core::EncodeFlags;

/// Worst-case JPEG size for a `width` x `height` frame: the whole frame padded
/// to 16x16 MCUs at six bytes per pixel, plus room for headers. `None` when
/// that overflows `usize`.
pub fn jpeg_buf_len(width: u32, height: u32) -> Option<usize> {
    let pad = |v: u32| (v as usize).checked_add(15).map(|p| p & !15);
    pad(width)?.checked_mul(pad(height)?)?.checked_mul(6)?.checked_add(2048)
}

/// Pure-Rust JPEG backend (jpeg-encoder crate). Always available, unlike the
/// libjpeg-turbo backend which needs the `turbojpeg` feature. Its forward DCT
/// is the accurate integer one, so `ACCURATE_DCT` is the only DCT it honours.
#[derive(Debug, Default)]
pub struct JpegRsEncoder;

impl JpegRsEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder for JpegRsEncoder {
    fn name(&self) -> &str {
        "jpeg-rs"
    }

    fn max_encoded_len(&self, width: u32, height: u32) -> Option<usize> {
        jpeg_buf_len(width, height)
    }

    fn supported_flags(&self) -> EncodeFlags {
        EncodeFlags::ACCURATE_DCT.union(EncodeFlags::PROGRESSIVE)
    }

    fn encode(
        &mut self,
        src: &[u8],
        width: u32,
        height: u32,
        params: EncodeParams,
        dst: &mut [u8],
    ) -> Result<usize> {
        let len = check_frame(src, width, height)?;
        if !(1..=100).contains(&params.quality) {
            bail!("quality {} outside 1..=100", params.quality);
        }
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => bail!("{}x{} exceeds the 65535 pixel JPEG limit", width, height),
        };

        let capacity = dst.len();
        let mut out: &mut [u8] = dst;
        let mut writer = JpegWriter::new(&mut out, params.quality);
        writer.set_sampling_factor(SamplingFactor::F_2_2);
        writer.set_progressive(params.flags.contains(EncodeFlags::PROGRESSIVE));
        writer
            .encode(&src[..len], w, h, ColorType::Bgra)
            .map_err(|e| anyhow!("jpeg-encoder failed: {e}"))?;

        // the slice writer advances past every byte written
        Ok(capacity - out.len())
    }
}
