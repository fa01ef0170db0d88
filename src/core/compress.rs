// General-purpose compressor backends for the compress stage
// Every backend writes into the caller's pre-sized buffer

use std::ops::RangeInclusive;

use anyhow::{anyhow, bail, Context, Result};
use lz4::block::CompressionMode;

use crate::core::codec::Compressor;

/// LZ4_compressBound for block mode.
pub fn lz4_compress_bound(len: usize) -> usize {
    len.saturating_add(len / 255).saturating_add(16)
}

fn check_level(name: &str, level: i32, range: &RangeInclusive<i32>) -> Result<()> {
    if !range.contains(&level) {
        bail!("{} level {} outside {}..={}", name, level, range.start(), range.end());
    }
    Ok(())
}

/// liblz4 block compression, either fast mode (level = acceleration) or HC.
pub struct Lz4Compressor {
    high_compression: bool,
}

impl Lz4Compressor {
    pub fn fast() -> Self {
        Self { high_compression: false }
    }

    pub fn high_compression() -> Self {
        Self { high_compression: true }
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &str {
        if self.high_compression {
            "lz4hc"
        } else {
            "lz4"
        }
    }

    fn level_range(&self) -> RangeInclusive<i32> {
        1..=12
    }

    fn compress_bound(&self, len: usize) -> usize {
        lz4_compress_bound(len)
    }

    fn compress(&mut self, src: &[u8], level: i32, dst: &mut [u8]) -> Result<usize> {
        check_level(self.name(), level, &self.level_range())?;
        if src.len() > i32::MAX as usize {
            bail!("lz4 block input limited to {} bytes", i32::MAX);
        }
        let mode = if self.high_compression {
            CompressionMode::HIGHCOMPRESSION(level)
        } else {
            CompressionMode::FAST(level)
        };
        lz4::block::compress_to_buffer(src, Some(mode), false, dst)
            .with_context(|| format!("{} compression failed", self.name()))
    }
}

/// Pure-Rust LZ4 block format. Has no level knob, so only level 1 is valid.
pub struct Lz4FlexCompressor;

impl Compressor for Lz4FlexCompressor {
    fn name(&self) -> &str {
        "lz4-flex"
    }

    fn level_range(&self) -> RangeInclusive<i32> {
        1..=1
    }

    fn compress_bound(&self, len: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(len)
    }

    fn compress(&mut self, src: &[u8], level: i32, dst: &mut [u8]) -> Result<usize> {
        check_level(self.name(), level, &self.level_range())?;
        lz4_flex::block::compress_into(src, dst).map_err(|e| anyhow!("lz4-flex compression failed: {e}"))
    }
}

/// Zstandard bulk compressor. The context is built once per handle and its
/// level switched per call.
pub struct ZstdCompressor {
    ctx: zstd::bulk::Compressor<'static>,
    workers: u32,
}

impl ZstdCompressor {
    /// `workers > 0` enables zstd's internal multi-threading.
    pub fn new(workers: u32) -> Result<Self> {
        let mut ctx = zstd::bulk::Compressor::new(zstd::DEFAULT_COMPRESSION_LEVEL)
            .context("creating zstd context")?;
        if workers > 0 {
            ctx.multithread(workers)
                .with_context(|| format!("enabling {} zstd workers", workers))?;
        }
        Ok(Self { ctx, workers })
    }

    pub fn workers(&self) -> u32 {
        self.workers
    }
}

impl Compressor for ZstdCompressor {
    fn name(&self) -> &str {
        "zstd"
    }

    fn level_range(&self) -> RangeInclusive<i32> {
        1..=*zstd::compression_level_range().end()
    }

    fn compress_bound(&self, len: usize) -> usize {
        zstd::zstd_safe::compress_bound(len)
    }

    fn compress(&mut self, src: &[u8], level: i32, dst: &mut [u8]) -> Result<usize> {
        check_level(self.name(), level, &self.level_range())?;
        self.ctx
            .set_compression_level(level)
            .with_context(|| format!("setting zstd level {}", level))?;
        self.ctx
            .compress_to_buffer(src, dst)
            .context("zstd compression failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i / 7) % 251) as u8).collect()
    }

    fn all_backends() -> Vec<Box<dyn Compressor>> {
        vec![
            Box::new(Lz4Compressor::fast()),
            Box::new(Lz4Compressor::high_compression()),
            Box::new(Lz4FlexCompressor),
            Box::new(ZstdCompressor::new(0).unwrap()),
        ]
    }

    #[test]
    fn test_output_within_bound() {
        let data = sample(64 * 1024);
        for mut c in all_backends() {
            let bound = c.compress_bound(data.len());
            let mut dst = vec![0u8; bound];
            let level = *c.level_range().start();
            let n = c.compress(&data, level, &mut dst).unwrap();
            assert!(n > 0 && n <= bound, "{} wrote {} of {}", c.name(), n, bound);
            assert!(n < data.len(), "{} did not shrink repetitive input", c.name());
        }
    }

    #[test]
    fn test_level_out_of_range_fails() {
        let data = sample(1024);
        for mut c in all_backends() {
            let mut dst = vec![0u8; c.compress_bound(data.len())];
            let too_high = *c.level_range().end() + 1;
            assert!(c.compress(&data, too_high, &mut dst).is_err(), "{}", c.name());
        }
    }

    #[test]
    fn test_lz4_output_decompresses() {
        let data = sample(10_000);
        let mut c = Lz4Compressor::fast();
        let mut dst = vec![0u8; c.compress_bound(data.len())];
        let n = c.compress(&data, 4, &mut dst).unwrap();
        let back = lz4::block::decompress(&dst[..n], Some(data.len() as i32)).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_lz4_writes_in_place() {
        let data = sample(4096);
        for mut c in [Lz4Compressor::fast(), Lz4Compressor::high_compression()] {
            let mut dst = vec![0u8; c.compress_bound(data.len())];
            let n = c.compress(&data, 9, &mut dst).unwrap();
            let back = lz4::block::decompress(&dst[..n], Some(data.len() as i32)).unwrap();
            assert_eq!(back, data, "{}", c.name());
        }
    }

    #[test]
    fn test_zstd_levels_and_workers() {
        let data = sample(256 * 1024);
        let mut c = ZstdCompressor::new(2).unwrap();
        assert_eq!(c.workers(), 2);
        let mut dst = vec![0u8; c.compress_bound(data.len())];
        let n = c.compress(&data, 3, &mut dst).unwrap();
        let back = zstd::bulk::decompress(&dst[..n], data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_empty_input() {
        for mut c in all_backends() {
            let mut dst = vec![0u8; c.compress_bound(0)];
            let level = *c.level_range().start();
            let n = c.compress(&[], level, &mut dst).unwrap();
            assert!(n <= dst.len());
        }
    }
}
