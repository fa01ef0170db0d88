use std::path::PathBuf;
use std::sync::Arc;

use crate::core::codec::frame_len;
use crate::core::EncodeFlags;

/// Stage time recorded when a codec call fails. Far above any real timing so a
/// failed stage is obvious in raw output.
pub const STAGE_FAILED_MS: f64 = 1.0e9;

/// Percentage saved going from `input` to `output` bytes.
/// NaN when `input` is zero; the reporter prints that as `n/a`.
#[inline]
pub fn ratio(input: usize, output: usize) -> f64 {
    if input == 0 {
        return f64::NAN;
    }
    100.0 * (1.0 - output as f64 / input as f64)
}

/// One image buffer plus the outputs of its most recent encode/compress pass.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub(crate) index: usize,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) src: Arc<[u8]>,

    pub quality: u8,
    pub flag: EncodeFlags,
    pub level: i32,

    pub(crate) enc_data: Vec<u8>,
    pub(crate) enc_size: usize,
    pub(crate) enc_time: f64,
    pub(crate) enc_ok: bool,

    pub(crate) cps_data: Vec<u8>,
    pub(crate) cps_size: usize,
    pub(crate) cps_time: f64,
}

impl WorkItem {
    /// Buffers are allocated once here; stage calls never grow them.
    pub fn new(
        index: usize,
        width: u32,
        height: u32,
        src: Arc<[u8]>,
        enc_capacity: usize,
        cps_capacity: usize,
    ) -> Self {
        Self {
            index,
            width,
            height,
            src,
            quality: 100,
            flag: EncodeFlags::NONE,
            level: 0,
            enc_data: vec![0u8; enc_capacity],
            enc_size: 0,
            enc_time: 0.0,
            enc_ok: false,
            cps_data: vec![0u8; cps_capacity],
            cps_size: 0,
            cps_time: 0.0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn src(&self) -> &[u8] {
        &self.src
    }

    pub fn src_size(&self) -> usize {
        self.src.len()
    }

    /// Size the frame should have given its dimensions, `None` when that
    /// does not fit in memory.
    pub fn frame_len(&self) -> Option<usize> {
        frame_len(self.width, self.height)
    }

    pub fn enc_capacity(&self) -> usize {
        self.enc_data.len()
    }

    pub fn cps_capacity(&self) -> usize {
        self.cps_data.len()
    }

    pub fn enc_size(&self) -> usize {
        self.enc_size
    }

    pub fn enc_time(&self) -> f64 {
        self.enc_time
    }

    /// Whether the last encode in this item succeeded.
    pub fn enc_ok(&self) -> bool {
        self.enc_ok
    }

    pub fn encoded(&self) -> &[u8] {
        &self.enc_data[..self.enc_size]
    }

    pub fn cps_size(&self) -> usize {
        self.cps_size
    }

    pub fn cps_time(&self) -> f64 {
        self.cps_time
    }

    pub fn compressed(&self) -> &[u8] {
        &self.cps_data[..self.cps_size]
    }

    pub(crate) fn mark_failed(&mut self) {
        self.enc_ok = false;
        self.enc_time = STAGE_FAILED_MS;
        self.cps_time = STAGE_FAILED_MS;
    }
}

/// A [`WorkItem`] read from a batch input directory.
#[derive(Debug, Clone)]
pub struct FileWorkItem {
    pub item: WorkItem,
    pub name: String,
    /// Extension appended to `name` for the output file, including the dot.
    pub ext: String,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Formatted report line, or `FAILED(...)` text when processing aborted.
    pub result: Option<String>,
    pub failure: Option<String>,
}

impl FileWorkItem {
    /// Echo line logged when the item is loaded.
    pub fn describe(&self) -> String {
        format!(
            "index: {}, width: {}, height: {}, quality: {}, flag: {}, name: {}, input: {}, output: {}, size: {}",
            self.item.index,
            self.item.width,
            self.item.height,
            self.item.quality,
            self.item.flag,
            self.name,
            self.input.display(),
            self.output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.item.src_size(),
        )
    }
}

impl crate::core::pool::Dispatchable for FileWorkItem {
    fn mark_failed(&mut self, reason: &str) {
        self.item.mark_failed();
        self.failure = Some(reason.to_string());
        self.result = Some(format!("FAILED({})\t{}", reason, self.name));
    }
}
