use anyhow::{anyhow, Result};

use crate::core::codec::{check_frame, EncodeParams, Encoder};

const QOI_HEADER_LEN: usize = 14;
const QOI_PADDING_LEN: usize = 8;

/// Worst case: every pixel stored as a full QOI_OP_RGBA chunk. `None` when
/// that overflows `usize`.
pub fn qoi_max_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(5)?
        .checked_add(QOI_HEADER_LEN + QOI_PADDING_LEN)
}

/// Lossless QOI backend. Quality is ignored and no flags apply.
#[derive(Default)]
pub struct QoiEncoder {
    rgba: Vec<u8>,
}

impl QoiEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for QoiEncoder {
    fn name(&self) -> &str {
        "qoi"
    }

    fn max_encoded_len(&self, width: u32, height: u32) -> Option<usize> {
        qoi_max_len(width, height)
    }

    fn encode(
        &mut self,
        src: &[u8],
        width: u32,
        height: u32,
        _params: EncodeParams,
        dst: &mut [u8],
    ) -> Result<usize> {
        let len = check_frame(src, width, height)?;

        // QOI takes RGBA; the swizzle reuses the handle's scratch buffer
        self.rgba.clear();
        self.rgba.reserve(len);
        for px in src[..len].chunks_exact(4) {
            self.rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }

        qoi::encode_to_buf(dst, &self.rgba, width, height)
            .map_err(|e| anyhow!("qoi encode failed: {e}"))
    }
}
