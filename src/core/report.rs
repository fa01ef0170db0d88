use crate::core::stage::StageResult;
use crate::core::summary::TimingSummary;
use crate::core::work_item::ratio;
use crate::core::EncodeFlags;

/// Snapshot of one sweep combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: usize,
    pub label: String,
    /// Encode parameters, present when the encode stage ran.
    pub quality: Option<u8>,
    pub flag: Option<EncodeFlags>,
    /// Compress level, present when the compress stage ran.
    pub level: Option<i32>,
    /// Compress read the encode output rather than the source.
    pub chained: bool,
    pub src_size: usize,
    pub encode: Option<StageResult>,
    pub compress: Option<StageResult>,
}

impl Row {
    /// Output of a chained pipeline, when both stages succeeded.
    pub fn final_size(&self) -> Option<usize> {
        if !self.chained {
            return None;
        }
        match (&self.encode, &self.compress) {
            (Some(e), Some(c)) if e.succeeded() && c.succeeded() => Some(c.output_size),
            _ => None,
        }
    }

    pub fn total_ms(&self) -> f64 {
        let ms = |s: &Option<StageResult>| s.as_ref().map_or(0.0, |r| r.duration_ms);
        ms(&self.encode) + ms(&self.compress)
    }
}

/// Ratio as a percentage, `n/a` when undefined.
pub fn format_ratio(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}%", value)
    } else {
        "n/a".to_string()
    }
}

fn kb(bytes: usize) -> String {
    format!("{:.1}kb", bytes as f64 / 1024.0)
}

fn stage_fields(out: &mut Vec<String>, stage: &str, result: &StageResult) {
    match &result.failure {
        Some(failure) => {
            out.push(format!("{} time: FAILED({})", stage, failure.reason));
            out.push(format!("{} size: -", stage));
            out.push(format!("{} ratio: -", stage));
        }
        None => {
            out.push(format!("{} time: {:.3}ms", stage, result.duration_ms));
            out.push(format!("{} size: {}", stage, kb(result.output_size)));
            out.push(format!("{} ratio: {}", stage, format_ratio(result.ratio())));
        }
    }
}

/// One tab-separated report line for `row`.
pub fn report(row: &Row) -> String {
    let mut fields = Vec::with_capacity(12);
    fields.push(format!("#{}", row.index));
    if let Some(q) = row.quality {
        fields.push(format!("q={}", q));
    }
    if let Some(flag) = row.flag {
        fields.push(format!("flag={}", flag));
    }
    if let Some(level) = row.level {
        fields.push(format!("level={}", level));
    }
    fields.push(format!("src size: {}", kb(row.src_size)));

    if let Some(encode) = &row.encode {
        stage_fields(&mut fields, "encode", encode);
    }
    if let Some(compress) = &row.compress {
        if compress.skipped {
            fields.push("compress: skipped".to_string());
        } else {
            stage_fields(&mut fields, "compress", compress);
        }
    }
    if row.chained {
        let total = row
            .final_size()
            .map(|size| format_ratio(ratio(row.src_size, size)))
            .unwrap_or_else(|| "-".to_string());
        fields.push(format!("total ratio: {}", total));
    }
    fields.push(row.label.clone());
    fields.join("\t")
}

/// Configuration echo printed above sweep rows.
pub fn header(encoder: Option<&str>, compressor: Option<&str>, label: &str, src_size: usize) -> String {
    format!(
        "encoder: {}\tcompressor: {}\tinput: {}\tsrc size: {}",
        encoder.unwrap_or("-"),
        compressor.unwrap_or("-"),
        label,
        kb(src_size)
    )
}

/// Closing lines of a batch run.
pub fn summary_lines(summary: &TimingSummary) -> Vec<String> {
    let mut lines = vec![
        format!("Items: {}", summary.items),
        format!("Average encode time: {:.3}ms", summary.mean_encode_ms),
        format!("Average compress time: {:.3}ms", summary.mean_compress_ms),
        format!("Average total time: {:.3}ms", summary.mean_total_ms),
    ];
    if summary.encode_failures > 0 || summary.compress_failures > 0 {
        lines.push(format!(
            "Failures: encode {}, compress {} ({})",
            summary.encode_failures, summary.compress_failures, summary.policy
        ));
    }
    lines
}
