use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};

use crate::core::{EncodeFlags, BYTES_PER_PIXEL};
use crate::error::BenchError;

/// Parameters handed to an encoder for one stage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: u8,
    pub flags: EncodeFlags,
}

/// Image encoder capability. Handles are `Send` but not `Sync`: a handle is
/// owned by one sweep or one worker at a time.
pub trait Encoder: Send {
    fn name(&self) -> &str;

    /// Worst-case output size for a `width` x `height` BGRA frame, `None`
    /// when it overflows `usize`.
    fn max_encoded_len(&self, width: u32, height: u32) -> Option<usize>;

    /// Flags this backend acts on. The stage runner fails any call asking
    /// for a flag outside this set.
    fn supported_flags(&self) -> EncodeFlags {
        EncodeFlags::NONE
    }

    /// Encode `src` into `dst`, returning the number of bytes written.
    fn encode(
        &mut self,
        src: &[u8],
        width: u32,
        height: u32,
        params: EncodeParams,
        dst: &mut [u8],
    ) -> Result<usize>;
}

/// General-purpose compressor capability.
pub trait Compressor: Send {
    fn name(&self) -> &str;

    /// Levels this backend accepts. Level 0 is handled by the stage runner as
    /// "skip" and never reaches the backend.
    fn level_range(&self) -> RangeInclusive<i32>;

    /// Worst-case output size for `len` input bytes.
    fn compress_bound(&self, len: usize) -> usize;

    fn compress(&mut self, src: &[u8], level: i32, dst: &mut [u8]) -> Result<usize>;
}

pub type EncoderFactory = Arc<dyn Fn() -> Result<Box<dyn Encoder>> + Send + Sync>;
pub type CompressorFactory = Arc<dyn Fn() -> Result<Box<dyn Compressor>> + Send + Sync>;

/// Byte length of a tightly packed BGRA frame.
pub fn frame_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(BYTES_PER_PIXEL)
}

/// Reject empty frames and sources too short for the declared dimensions.
pub(crate) fn check_frame(src: &[u8], width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        bail!("empty {}x{} frame", width, height);
    }
    let needed = frame_len(width, height).ok_or_else(|| anyhow!("{}x{} frame overflows usize", width, height))?;
    if src.len() < needed {
        bail!(
            "source holds {} bytes, a {}x{} BGRA frame needs {}",
            src.len(),
            width,
            height,
            needed
        );
    }
    Ok(needed)
}

/// Encoder backends selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderKind {
    /// libjpeg-turbo (`turbojpeg` feature)
    Jpeg,
    /// pure-Rust baseline/progressive JPEG
    JpegRs,
    /// planar I420
    Yuv,
    /// lossless QOI
    Qoi,
}

impl EncoderKind {
    /// Worst-case encoded size, available before any handle exists so work
    /// items can be sized on the driver thread.
    pub fn max_encoded_len(self, width: u32, height: u32) -> Option<usize> {
        match self {
            EncoderKind::Jpeg | EncoderKind::JpegRs => crate::core::jpeg::jpeg_buf_len(width, height),
            EncoderKind::Yuv => crate::core::planar::i420_len(width, height),
            EncoderKind::Qoi => crate::core::qoi::qoi_max_len(width, height),
        }
    }

    /// Flags a sweep walks when none are given: each setting the backend
    /// honours, with no two producing the same stream.
    pub fn default_flags(self) -> &'static [EncodeFlags] {
        match self {
            EncoderKind::Jpeg => &[EncodeFlags::FAST_DCT, EncodeFlags::ACCURATE_DCT, EncodeFlags::PROGRESSIVE],
            EncoderKind::JpegRs => &[EncodeFlags::ACCURATE_DCT, EncodeFlags::PROGRESSIVE],
            EncoderKind::Yuv => &[EncodeFlags::NONE, EncodeFlags::FAST_UPSAMPLE],
            EncoderKind::Qoi => &[EncodeFlags::NONE],
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderKind::Jpeg => write!(f, "jpeg"),
            EncoderKind::JpegRs => write!(f, "jpeg-rs"),
            EncoderKind::Yuv => write!(f, "yuv"),
            EncoderKind::Qoi => write!(f, "qoi"),
        }
    }
}

impl FromStr for EncoderKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" | "turbojpeg" => Ok(EncoderKind::Jpeg),
            "jpeg-rs" | "jpeg-encoder" => Ok(EncoderKind::JpegRs),
            "yuv" | "i420" => Ok(EncoderKind::Yuv),
            "qoi" => Ok(EncoderKind::Qoi),
            _ => Err(format!("unknown encoder '{}'. Available: jpeg, jpeg-rs, yuv, qoi", s)),
        }
    }
}

/// Compressor backends selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressorKind {
    Lz4,
    Lz4Hc,
    Lz4Flex,
    Zstd,
}

impl CompressorKind {
    pub fn compress_bound(self, len: usize) -> usize {
        match self {
            CompressorKind::Lz4 | CompressorKind::Lz4Hc => crate::core::compress::lz4_compress_bound(len),
            CompressorKind::Lz4Flex => lz4_flex::block::get_maximum_output_size(len),
            CompressorKind::Zstd => zstd::zstd_safe::compress_bound(len),
        }
    }
}

impl fmt::Display for CompressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressorKind::Lz4 => write!(f, "lz4"),
            CompressorKind::Lz4Hc => write!(f, "lz4hc"),
            CompressorKind::Lz4Flex => write!(f, "lz4-flex"),
            CompressorKind::Zstd => write!(f, "zstd"),
        }
    }
}

impl FromStr for CompressorKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lz4" => Ok(CompressorKind::Lz4),
            "lz4hc" | "lz4-hc" => Ok(CompressorKind::Lz4Hc),
            "lz4-flex" | "lz4_flex" | "lz4flex" => Ok(CompressorKind::Lz4Flex),
            "zstd" => Ok(CompressorKind::Zstd),
            _ => Err(format!(
                "unknown compressor '{}'. Available: lz4, lz4hc, lz4-flex, zstd",
                s
            )),
        }
    }
}

/// Knobs that only some compressors read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressorOptions {
    /// zstd worker threads; 0 keeps compression on the calling thread.
    pub zstd_workers: u32,
}

/// Create an encoder handle. Failures surface as `BenchError::CodecInit`.
pub fn create_encoder(kind: EncoderKind) -> Result<Box<dyn Encoder>> {
    let encoder: Result<Box<dyn Encoder>> = match kind {
        #[cfg(feature = "turbojpeg")]
        EncoderKind::Jpeg => crate::turbojpeg_optimized::TurboJpegEncoder::new()
            .map(|e| Box::new(e) as Box<dyn Encoder>),
        #[cfg(not(feature = "turbojpeg"))]
        EncoderKind::Jpeg => Err(anyhow::anyhow!(
            "built without the `turbojpeg` feature; use --encoder jpeg-rs"
        )),
        EncoderKind::JpegRs => Ok(Box::new(crate::core::jpeg::JpegRsEncoder::new())),
        EncoderKind::Yuv => Ok(Box::new(crate::core::planar::PlanarEncoder)),
        EncoderKind::Qoi => Ok(Box::new(crate::core::qoi::QoiEncoder::new())),
    };
    encoder.map_err(|e| {
        BenchError::CodecInit {
            codec: kind.to_string(),
            reason: format!("{e:#}"),
        }
        .into()
    })
}

/// Create a compressor handle. Failures surface as `BenchError::CodecInit`.
pub fn create_compressor(kind: CompressorKind, opts: CompressorOptions) -> Result<Box<dyn Compressor>> {
    use crate::core::compress::{Lz4Compressor, Lz4FlexCompressor, ZstdCompressor};

    let compressor: Result<Box<dyn Compressor>> = match kind {
        CompressorKind::Lz4 => Ok(Box::new(Lz4Compressor::fast())),
        CompressorKind::Lz4Hc => Ok(Box::new(Lz4Compressor::high_compression())),
        CompressorKind::Lz4Flex => Ok(Box::new(Lz4FlexCompressor)),
        CompressorKind::Zstd => {
            ZstdCompressor::new(opts.zstd_workers).map(|c| Box::new(c) as Box<dyn Compressor>)
        }
    };
    compressor.map_err(|e| {
        BenchError::CodecInit {
            codec: kind.to_string(),
            reason: format!("{e:#}"),
        }
        .into()
    })
}

/// Factory building a fresh encoder per call, for pooled workers.
pub fn encoder_factory(kind: EncoderKind) -> EncoderFactory {
    Arc::new(move || create_encoder(kind))
}

/// Factory building a fresh compressor per call, for pooled workers.
pub fn compressor_factory(kind: CompressorKind, opts: CompressorOptions) -> CompressorFactory {
    Arc::new(move || create_compressor(kind, opts))
}
