use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use clap::Args;
use tracing::info;

use crate::core::codec::{create_compressor, create_encoder, CompressorKind, CompressorOptions, EncoderKind};
use crate::core::input::{load_source, synthetic_frame};
use crate::core::report::{header, report, Row};
use crate::core::sweep::{Axis, SweepDriver};
use crate::core::work_item::WorkItem;
use crate::core::EncodeFlags;

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    /// Source image: raw BGRA (needs --width/--height), PNG or JPEG.
    /// A synthetic gradient is used when omitted.
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Frame width for raw and synthetic input
    #[arg(long, default_value_t = 1920)]
    pub width: u32,

    /// Frame height for raw and synthetic input
    #[arg(long, default_value_t = 1080)]
    pub height: u32,

    /// Encoder backend: jpeg, jpeg-rs, yuv, qoi
    #[arg(long)]
    pub encoder: Option<String>,

    /// Comma-separated encode qualities (1-100)
    #[arg(long, default_value = "50,75,90,100")]
    pub qualities: String,

    /// Comma-separated encode flags; combine flags within one entry with '|'.
    /// Defaults to the flags the chosen encoder acts on.
    #[arg(long)]
    pub flags: Option<String>,

    /// Compressor backend: lz4, lz4hc, lz4-flex, zstd
    #[arg(long)]
    pub compressor: Option<String>,

    /// Comma-separated compression levels (0 = no compression)
    #[arg(long, default_value = "1")]
    pub levels: String,

    /// Compress the encoded output instead of the raw frame
    #[arg(long)]
    pub chain: bool,

    /// zstd worker threads (0 = single-threaded)
    #[arg(long, default_value_t = 0)]
    pub zstd_workers: u32,
}

impl Default for SweepArgs {
    fn default() -> Self {
        Self {
            input: None,
            width: 1920,
            height: 1080,
            encoder: None,
            qualities: "50,75,90,100".to_string(),
            flags: None,
            compressor: None,
            levels: "1".to_string(),
            chain: false,
            zstd_workers: 0,
        }
    }
}

/// Parse a comma-separated list. Empty input gives an empty list.
pub fn parse_list<T>(s: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<T>().map_err(|e| anyhow!("invalid value '{}': {}", p, e)))
        .collect()
}

/// Run the sweep described by `args`, handing each row to `sink`.
pub fn execute<F>(args: &SweepArgs, mut sink: F) -> Result<Vec<Row>>
where
    F: FnMut(&Row),
{
    let encoder_kind = args
        .encoder
        .as_deref()
        .map(|s| s.parse::<EncoderKind>().map_err(|e: String| anyhow!(e)))
        .transpose()?;
    let compressor_kind = args
        .compressor
        .as_deref()
        .map(|s| s.parse::<CompressorKind>().map_err(|e: String| anyhow!(e)))
        .transpose()?;
    if encoder_kind.is_none() && compressor_kind.is_none() {
        bail!("nothing to sweep: pass --encoder and/or --compressor");
    }

    let mut axes = Vec::new();
    if let Some(kind) = encoder_kind {
        let flags = match &args.flags {
            Some(list) => parse_list::<EncodeFlags>(list)?,
            None => kind.default_flags().to_vec(),
        };
        axes.push(Axis::Quality(parse_list::<u8>(&args.qualities)?));
        axes.push(Axis::Flag(flags));
    }
    if compressor_kind.is_some() {
        axes.push(Axis::Level(parse_list::<i32>(&args.levels)?));
    }

    let (pixels, width, height, label) = match &args.input {
        Some(path) => {
            let (px, w, h) = load_source(path, args.width, args.height)?;
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            (px, w, h, label)
        }
        None => (
            synthetic_frame(args.width, args.height),
            args.width,
            args.height,
            "synthetic".to_string(),
        ),
    };
    let src: Arc<[u8]> = pixels.into();

    let mut encoder = encoder_kind.map(create_encoder).transpose()?;
    let opts = CompressorOptions {
        zstd_workers: args.zstd_workers,
    };
    let mut compressor = compressor_kind.map(|k| create_compressor(k, opts)).transpose()?;

    let enc_capacity = match encoder_kind {
        Some(kind) => kind
            .max_encoded_len(width, height)
            .ok_or_else(|| anyhow!("{}x{} frame is too large for {}", width, height, kind))?,
        None => 0,
    };
    let cps_capacity = compressor_kind.map_or(0, |k| k.compress_bound(src.len().max(enc_capacity)));
    let mut item = WorkItem::new(0, width, height, src, enc_capacity, cps_capacity);

    info!(
        "sweep: encoder={} compressor={} frame={}x{} src={} bytes chain={}",
        encoder_kind.map_or("-".to_string(), |k| k.to_string()),
        compressor_kind.map_or("-".to_string(), |k| k.to_string()),
        width,
        height,
        item.src_size(),
        args.chain
    );

    let mut driver = SweepDriver::new().chained(args.chain).label(label);
    if let Some(e) = encoder.as_deref_mut() {
        driver = driver.encoder(e);
    }
    if let Some(c) = compressor.as_deref_mut() {
        driver = driver.compressor(c);
    }

    let start = Instant::now();
    let rows = driver.run_sweep(&mut item, &axes, &mut sink)?;
    info!("{} rows in {:.1}ms", rows.len(), start.elapsed().as_secs_f64() * 1000.0);
    Ok(rows)
}

pub fn run(args: SweepArgs) -> Result<()> {
    let mut printed_header = false;
    execute(&args, |row| {
        if !printed_header {
            let enc = row.encode.as_ref().map(|r| r.capability.as_str());
            let cps = row.compress.as_ref().map(|r| r.capability.as_str());
            println!("{}", header(enc, cps, &row.label, row.src_size));
            printed_header = true;
        }
        println!("{}", report(row));
    })?;
    Ok(())
}
