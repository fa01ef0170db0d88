use std::time::Instant;

use tracing::{debug, warn};

use crate::core::codec::{Compressor, EncodeParams, Encoder};
use crate::core::work_item::{ratio, WorkItem, STAGE_FAILED_MS};
use crate::error::StageFailure;

/// What the compress stage reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressInput {
    /// The raw source buffer.
    #[default]
    Source,
    /// The encode stage's output from the same combination.
    Encoded,
}

/// Outcome of one timed stage call.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub capability: String,
    pub input_size: usize,
    pub output_size: usize,
    pub duration_ms: f64,
    pub failure: Option<StageFailure>,
    /// Compress level 0: the codec was not called.
    pub skipped: bool,
}

impl StageResult {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Saving against this stage's own input.
    pub fn ratio(&self) -> f64 {
        ratio(self.input_size, self.output_size)
    }
}

/// Encode `item.src` with the item's quality and flag.
pub fn run_encode(encoder: &mut dyn Encoder, item: &mut WorkItem) -> StageResult {
    let params = EncodeParams {
        quality: item.quality,
        flags: item.flag,
    };
    let capability = encoder.name().to_string();
    let input_size = item.src.len();

    let unsupported = params.flags.difference(encoder.supported_flags());
    if !unsupported.is_empty() {
        let reason = format!("flag {} unsupported by {}", unsupported, capability);
        return encode_failed(capability, item, StageFailure::new(encoder.name(), reason));
    }

    let start = Instant::now();
    let outcome = encoder.encode(&item.src, item.width, item.height, params, &mut item.enc_data);
    let elapsed = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(size) if size <= item.enc_data.len() => {
            item.enc_size = size;
            item.enc_time = elapsed;
            item.enc_ok = true;
            debug!(
                "{} #{} q={} flag={}: {} -> {} bytes in {:.3}ms",
                capability, item.index, item.quality, item.flag, input_size, size, elapsed
            );
            StageResult {
                capability,
                input_size,
                output_size: size,
                duration_ms: elapsed,
                failure: None,
                skipped: false,
            }
        }
        Ok(size) => {
            let reason = format!("reported {} bytes for a {} byte buffer", size, item.enc_data.len());
            encode_failed(capability, item, StageFailure::new(encoder.name(), reason))
        }
        Err(e) => encode_failed(capability, item, StageFailure::new(encoder.name(), format!("{e:#}"))),
    }
}

fn encode_failed(capability: String, item: &mut WorkItem, failure: StageFailure) -> StageResult {
    warn!("#{}: {}", item.index, failure);
    item.enc_time = STAGE_FAILED_MS;
    item.enc_ok = false;
    StageResult {
        capability,
        input_size: item.src.len(),
        output_size: item.enc_size,
        duration_ms: STAGE_FAILED_MS,
        failure: Some(failure),
        skipped: false,
    }
}

/// Compress either the source or the encoded output at `item.level`.
/// Level 0 passes the input through without calling the codec.
pub fn run_compress(compressor: &mut dyn Compressor, item: &mut WorkItem, input: CompressInput) -> StageResult {
    let capability = compressor.name().to_string();
    let level = item.level;

    if input == CompressInput::Encoded && !item.enc_ok {
        let failure = StageFailure::new(&capability, "no encoded output to compress");
        return compress_failed(capability, item, 0, failure);
    }

    let input_size = match input {
        CompressInput::Source => item.src.len(),
        CompressInput::Encoded => item.enc_size,
    };

    if level == 0 {
        item.cps_size = input_size;
        item.cps_time = 0.0;
        return StageResult {
            capability,
            input_size,
            output_size: input_size,
            duration_ms: 0.0,
            failure: None,
            skipped: true,
        };
    }

    let range = compressor.level_range();
    if !range.contains(&level) {
        let reason = format!("level {} outside {}..={}", level, range.start(), range.end());
        let failure = StageFailure::new(&capability, reason);
        return compress_failed(capability, item, input_size, failure);
    }

    let bound = compressor.compress_bound(input_size);
    if bound > item.cps_data.len() {
        let reason = format!("needs {} bytes, buffer holds {}", bound, item.cps_data.len());
        let failure = StageFailure::new(&capability, reason);
        return compress_failed(capability, item, input_size, failure);
    }

    let data: &[u8] = match input {
        CompressInput::Source => &item.src,
        CompressInput::Encoded => &item.enc_data[..item.enc_size],
    };
    let dst = &mut item.cps_data[..bound];

    let start = Instant::now();
    let outcome = compressor.compress(data, level, dst);
    let elapsed = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(size) => {
            item.cps_size = size;
            item.cps_time = elapsed;
            debug!(
                "{} #{} level={}: {} -> {} bytes in {:.3}ms",
                capability, item.index, level, input_size, size, elapsed
            );
            StageResult {
                capability,
                input_size,
                output_size: size,
                duration_ms: elapsed,
                failure: None,
                skipped: false,
            }
        }
        Err(e) => {
            let failure = StageFailure::new(&capability, format!("{e:#}"));
            compress_failed(capability, item, input_size, failure)
        }
    }
}

fn compress_failed(capability: String, item: &mut WorkItem, input_size: usize, failure: StageFailure) -> StageResult {
    warn!("#{}: {}", item.index, failure);
    item.cps_time = STAGE_FAILED_MS;
    StageResult {
        capability,
        input_size,
        output_size: item.cps_size,
        duration_ms: STAGE_FAILED_MS,
        failure: Some(failure),
        skipped: false,
    }
}
