// Mean timings across a batch, folded after every item has completed

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::core::work_item::{WorkItem, STAGE_FAILED_MS};

/// How failed stage timings enter the means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeanPolicy {
    /// Failed stages are left out of both numerator and denominator.
    #[default]
    ExcludeFailed,
    /// Every item counts, failed stages contribute `STAGE_FAILED_MS`.
    IncludeFailed,
}

impl fmt::Display for MeanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeanPolicy::ExcludeFailed => write!(f, "exclude-failed"),
            MeanPolicy::IncludeFailed => write!(f, "include-failed"),
        }
    }
}

impl FromStr for MeanPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exclude-failed" | "exclude" => Ok(MeanPolicy::ExcludeFailed),
            "include-failed" | "include" => Ok(MeanPolicy::IncludeFailed),
            _ => Err(format!(
                "unknown mean policy '{}'. Available: exclude-failed, include-failed",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingSummary {
    pub items: usize,
    pub encode_failures: usize,
    pub compress_failures: usize,
    pub mean_encode_ms: f64,
    pub mean_compress_ms: f64,
    pub mean_total_ms: f64,
    pub policy: MeanPolicy,
}

fn mean(sum: f64, count: usize) -> f64 {
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

impl TimingSummary {
    pub fn from_items<'a, I>(items: I, policy: MeanPolicy) -> Self
    where
        I: IntoIterator<Item = &'a WorkItem>,
    {
        let mut n = 0usize;
        let (mut enc_fail, mut cps_fail) = (0usize, 0usize);
        let (mut enc_sum, mut enc_n) = (0.0f64, 0usize);
        let (mut cps_sum, mut cps_n) = (0.0f64, 0usize);
        let (mut tot_sum, mut tot_n) = (0.0f64, 0usize);

        for item in items {
            n += 1;
            let enc_failed = item.enc_time >= STAGE_FAILED_MS;
            let cps_failed = item.cps_time >= STAGE_FAILED_MS;
            enc_fail += enc_failed as usize;
            cps_fail += cps_failed as usize;

            match policy {
                MeanPolicy::IncludeFailed => {
                    enc_sum += item.enc_time;
                    cps_sum += item.cps_time;
                    tot_sum += item.enc_time + item.cps_time;
                    enc_n += 1;
                    cps_n += 1;
                    tot_n += 1;
                }
                MeanPolicy::ExcludeFailed => {
                    if !enc_failed {
                        enc_sum += item.enc_time;
                        enc_n += 1;
                    }
                    if !cps_failed {
                        cps_sum += item.cps_time;
                        cps_n += 1;
                    }
                    if !enc_failed && !cps_failed {
                        tot_sum += item.enc_time + item.cps_time;
                        tot_n += 1;
                    }
                }
            }
        }

        Self {
            items: n,
            encode_failures: enc_fail,
            compress_failures: cps_fail,
            mean_encode_ms: mean(enc_sum, enc_n),
            mean_compress_ms: mean(cps_sum, cps_n),
            mean_total_ms: mean(tot_sum, tot_n),
            policy,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "items": self.items,
            "encode_failures": self.encode_failures,
            "compress_failures": self.compress_failures,
            "mean_encode_ms": self.mean_encode_ms,
            "mean_compress_ms": self.mean_compress_ms,
            "mean_total_ms": self.mean_total_ms,
            "mean_policy": self.policy.to_string(),
        })
    }
}
