use anyhow::{bail, Result};
use tracing::info;

use crate::core::codec::{Compressor, Encoder};
use crate::core::report::Row;
use crate::core::stage::{run_compress, run_encode, CompressInput};
use crate::core::work_item::WorkItem;
use crate::core::EncodeFlags;

/// One parameter axis and the values it takes.
#[derive(Debug, Clone, PartialEq)]
pub enum Axis {
    Quality(Vec<u8>),
    Flag(Vec<EncodeFlags>),
    Level(Vec<i32>),
}

impl Axis {
    pub fn len(&self) -> usize {
        match self {
            Axis::Quality(v) => v.len(),
            Axis::Flag(v) => v.len(),
            Axis::Level(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Quality(_) => "quality",
            Axis::Flag(_) => "flag",
            Axis::Level(_) => "level",
        }
    }

    /// Whether this axis parameterises the encode stage.
    pub fn drives_encode(&self) -> bool {
        matches!(self, Axis::Quality(_) | Axis::Flag(_))
    }

    fn apply(&self, pos: usize, item: &mut WorkItem) {
        match self {
            Axis::Quality(v) => item.quality = v[pos],
            Axis::Flag(v) => item.flag = v[pos],
            Axis::Level(v) => item.level = v[pos],
        }
    }
}

/// Runs every combination of a set of axes against one work item.
pub struct SweepDriver<'a> {
    encoder: Option<&'a mut dyn Encoder>,
    compressor: Option<&'a mut dyn Compressor>,
    compress_input: CompressInput,
    label: String,
}

impl<'a> SweepDriver<'a> {
    pub fn new() -> Self {
        Self {
            encoder: None,
            compressor: None,
            compress_input: CompressInput::Source,
            label: String::new(),
        }
    }

    pub fn encoder(mut self, encoder: &'a mut dyn Encoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn compressor(mut self, compressor: &'a mut dyn Compressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Compress the encoded output instead of the source.
    pub fn chained(mut self, chained: bool) -> Self {
        self.compress_input = if chained {
            CompressInput::Encoded
        } else {
            CompressInput::Source
        };
        self
    }

    /// Text appended to every row, usually the input name.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn validate(&self, axes: &[Axis]) -> Result<(bool, bool)> {
        if axes.is_empty() {
            bail!("sweep needs at least one axis");
        }
        for (i, axis) in axes.iter().enumerate() {
            if axes[..i].iter().any(|a| a.name() == axis.name()) {
                bail!("{} axis given more than once", axis.name());
            }
        }

        let chained = self.compress_input == CompressInput::Encoded;
        let run_encode = axes.iter().any(Axis::drives_encode) || chained;
        let run_compress = axes.iter().any(|a| matches!(a, Axis::Level(_)));

        if run_encode && self.encoder.is_none() {
            bail!("sweep over encode parameters needs an encoder");
        }
        if run_compress && self.compressor.is_none() {
            bail!("sweep over compression levels needs a compressor");
        }
        if chained && !run_compress {
            bail!("chained sweep needs a level axis");
        }
        Ok((run_encode, run_compress))
    }

    /// Run the Cartesian product of `axes`, first axis outermost. Each row is
    /// passed to `sink` as soon as it is complete and also collected.
    pub fn run_sweep<F>(&mut self, item: &mut WorkItem, axes: &[Axis], mut sink: F) -> Result<Vec<Row>>
    where
        F: FnMut(&Row),
    {
        let (do_encode, do_compress) = self.validate(axes)?;
        if axes.iter().any(Axis::is_empty) {
            return Ok(Vec::new());
        }

        let total: usize = axes.iter().map(Axis::len).product();
        info!(
            "sweeping {} combinations over {}",
            total,
            axes.iter().map(Axis::name).collect::<Vec<_>>().join(" x ")
        );

        let mut rows = Vec::with_capacity(total);
        let mut pos = vec![0usize; axes.len()];
        loop {
            for (axis, &p) in axes.iter().zip(&pos) {
                axis.apply(p, item);
            }

            let encode = match (&mut self.encoder, do_encode) {
                (Some(encoder), true) => Some(run_encode(&mut **encoder, item)),
                _ => None,
            };
            let compress = match (&mut self.compressor, do_compress) {
                (Some(compressor), true) => Some(run_compress(&mut **compressor, item, self.compress_input)),
                _ => None,
            };

            let row = Row {
                index: item.index,
                label: self.label.clone(),
                quality: encode.as_ref().map(|_| item.quality),
                flag: encode.as_ref().map(|_| item.flag),
                level: compress.as_ref().map(|_| item.level),
                chained: self.compress_input == CompressInput::Encoded,
                src_size: item.src_size(),
                encode,
                compress,
            };
            sink(&row);
            rows.push(row);

            // odometer: last axis turns fastest
            let mut k = axes.len();
            loop {
                if k == 0 {
                    return Ok(rows);
                }
                k -= 1;
                pos[k] += 1;
                if pos[k] < axes[k].len() {
                    break;
                }
                pos[k] = 0;
            }
        }
    }
}

impl Default for SweepDriver<'_> {
    fn default() -> Self {
        Self::new()
    }
}
