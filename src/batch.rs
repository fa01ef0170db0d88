use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};

use crate::core::codec::{
    compressor_factory, encoder_factory, frame_len, Compressor, CompressorFactory, CompressorKind,
    CompressorOptions, Encoder, EncoderFactory, EncoderKind,
};
use crate::core::input::{read_raw, scan_directory};
use crate::core::pool::{DispatchPool, Dispatchable};
use crate::core::report::{report, summary_lines, Row};
use crate::core::stage::{run_compress, run_encode, CompressInput};
use crate::core::summary::{MeanPolicy, TimingSummary};
use crate::core::work_item::{FileWorkItem, WorkItem};
use crate::core::EncodeFlags;

/// Encode flag accepted by `batch -f`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlagArg {
    FastUpsample,
    NoRealloc,
    FastDct,
    AccurateDct,
    StopOnWarning,
    Progressive,
    LimitScans,
}

impl From<FlagArg> for EncodeFlags {
    fn from(flag: FlagArg) -> Self {
        match flag {
            FlagArg::FastUpsample => EncodeFlags::FAST_UPSAMPLE,
            FlagArg::NoRealloc => EncodeFlags::NO_REALLOC,
            FlagArg::FastDct => EncodeFlags::FAST_DCT,
            FlagArg::AccurateDct => EncodeFlags::ACCURATE_DCT,
            FlagArg::StopOnWarning => EncodeFlags::STOP_ON_WARNING,
            FlagArg::Progressive => EncodeFlags::PROGRESSIVE,
            FlagArg::LimitScans => EncodeFlags::LIMIT_SCANS,
        }
    }
}

/// Output container, which also picks the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Extension {
    #[value(name = ".jpg", alias = "jpg")]
    Jpg,
    #[value(name = ".yuv", alias = "yuv")]
    Yuv,
    #[value(name = ".qoi", alias = "qoi")]
    Qoi,
}

impl Extension {
    pub fn suffix(self) -> &'static str {
        match self {
            Extension::Jpg => ".jpg",
            Extension::Yuv => ".yuv",
            Extension::Qoi => ".qoi",
        }
    }
}

/// JPEG backend used for `.jpg` when none is named.
pub fn default_jpeg_backend() -> EncoderKind {
    if cfg!(feature = "turbojpeg") {
        EncoderKind::Jpeg
    } else {
        EncoderKind::JpegRs
    }
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Worker threads (clamped to 4x the hardware threads)
    #[arg(short = 't', long, default_value_t = 1)]
    pub threads: usize,

    /// Encode quality (1-100)
    #[arg(short = 'q', long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// Encode flag; defaults to the first flag the encoder acts on
    #[arg(short = 'f', long, value_enum)]
    pub flag: Option<FlagArg>,

    /// Output extension: .jpg, .yuv or .qoi
    #[arg(short = 'e', long, value_enum, default_value_t = Extension::Jpg)]
    pub ext: Extension,

    /// Input directory of <index>_<width>_<height>.<ext> raw BGRA files
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Output directory for encoded files and summary.json
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// JPEG backend for .jpg output: jpeg (libjpeg-turbo) or jpeg-rs
    #[arg(long)]
    pub jpeg_backend: Option<String>,

    /// Compressor applied to the encoded output: lz4, lz4hc, lz4-flex, zstd
    #[arg(long, default_value = "lz4")]
    pub compressor: String,

    /// Compression level (0 = no compression)
    #[arg(long, default_value_t = 1)]
    pub level: i32,

    /// zstd worker threads (0 = single-threaded)
    #[arg(long, default_value_t = 0)]
    pub zstd_workers: u32,

    /// How failed stages enter the averages: exclude-failed, include-failed
    #[arg(long, default_value = "exclude-failed")]
    pub mean_policy: String,
}

/// Validated batch settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub threads: usize,
    pub quality: u8,
    pub flag: EncodeFlags,
    pub ext: Extension,
    pub encoder: EncoderKind,
    pub compressor: CompressorKind,
    pub level: i32,
    pub zstd_workers: u32,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub mean_policy: MeanPolicy,
}

impl BatchConfig {
    pub fn from_args(args: &BatchArgs) -> Result<Self> {
        let encoder = match args.ext {
            Extension::Jpg => match args.jpeg_backend.as_deref() {
                None => default_jpeg_backend(),
                Some(name) => match name.parse::<EncoderKind>().map_err(|e: String| anyhow!(e))? {
                    kind @ (EncoderKind::Jpeg | EncoderKind::JpegRs) => kind,
                    other => return Err(anyhow!("{} is not a JPEG backend", other)),
                },
            },
            Extension::Yuv => EncoderKind::Yuv,
            Extension::Qoi => EncoderKind::Qoi,
        };
        let compressor = args
            .compressor
            .parse::<CompressorKind>()
            .map_err(|e: String| anyhow!(e))?;
        let mean_policy = args.mean_policy.parse::<MeanPolicy>().map_err(|e: String| anyhow!(e))?;

        Ok(Self {
            threads: args.threads,
            quality: args.quality,
            flag: args
                .flag
                .map(EncodeFlags::from)
                .or_else(|| encoder.default_flags().first().copied())
                .unwrap_or(EncodeFlags::NONE),
            ext: args.ext,
            encoder,
            compressor,
            level: args.level,
            zstd_workers: args.zstd_workers,
            input: args.input.clone(),
            output: args.output.clone(),
            mean_policy,
        })
    }

    fn compressor_options(&self) -> CompressorOptions {
        CompressorOptions {
            zstd_workers: self.zstd_workers,
        }
    }
}

/// Everything a batch run produced, in ascending index order.
#[derive(Debug)]
pub struct BatchReport {
    pub files: Vec<FileWorkItem>,
    pub summary: TimingSummary,
    /// Conforming names whose contents could not be read.
    pub unreadable: usize,
    /// Files too short for the frame their name declares. They still get a
    /// failed row.
    pub undersized: usize,
    /// Worker threads that actually ran, after clamping.
    pub threads: usize,
}

/// Where workers get their codec handles.
enum CodecSource {
    /// One pair created up front, used by the submitting thread only.
    Shared(Mutex<(Box<dyn Encoder>, Box<dyn Compressor>)>),
    /// Fresh handles per item on pooled workers.
    PerCall {
        encoder: EncoderFactory,
        compressor: CompressorFactory,
    },
}

impl CodecSource {
    fn run(&self, file: &mut FileWorkItem) {
        match self {
            CodecSource::Shared(pair) => {
                let mut guard = pair.lock();
                let (encoder, compressor) = &mut *guard;
                process_file(encoder.as_mut(), compressor.as_mut(), file);
            }
            CodecSource::PerCall { encoder, compressor } => {
                let handles = encoder().and_then(|e| compressor().map(|c| (e, c)));
                match handles {
                    Ok((mut e, mut c)) => process_file(e.as_mut(), c.as_mut(), file),
                    Err(err) => {
                        warn!("{}: {:#}", file.name, err);
                        file.mark_failed(&format!("{:#}", err));
                    }
                }
            }
        }
    }
}

/// Encode, compress the encoded stream, format the result line and write the
/// encoded output if an output path is set.
pub fn process_file(encoder: &mut dyn Encoder, compressor: &mut dyn Compressor, file: &mut FileWorkItem) {
    let encode = run_encode(encoder, &mut file.item);
    let compress = run_compress(compressor, &mut file.item, CompressInput::Encoded);

    if let Some(failure) = encode.failure.as_ref().or(compress.failure.as_ref()) {
        file.failure = Some(failure.to_string());
    }

    if encode.succeeded() {
        if let Some(output) = &file.output {
            if let Err(e) = fs::write(output, file.item.encoded()) {
                warn!("File can not open: {}: {}", output.display(), e);
            }
        }
    }

    let row = Row {
        index: file.item.index(),
        label: file.name.clone(),
        quality: Some(file.item.quality),
        flag: Some(file.item.flag),
        level: Some(file.item.level),
        chained: true,
        src_size: file.item.src_size(),
        encode: Some(encode),
        compress: Some(compress),
    };
    file.result = Some(report(&row));
}

fn load_files(config: &BatchConfig) -> Result<(Vec<FileWorkItem>, usize, usize)> {
    let inputs = scan_directory(&config.input)?;
    let mut files = Vec::with_capacity(inputs.len());
    let mut unreadable = 0;
    let mut undersized = 0;

    for input in inputs {
        let data = match read_raw(&input.path) {
            Ok(data) => data,
            Err(e) => {
                warn!("{}", e);
                unreadable += 1;
                continue;
            }
        };
        let (width, height) = (input.meta.width, input.meta.height);

        // Capacities follow the name, so only trust it once the data backs it up
        let fits = frame_len(width, height).is_some_and(|len| len <= data.len());
        let (enc_capacity, cps_capacity) = if fits {
            let enc = config.encoder.max_encoded_len(width, height).unwrap_or(0);
            (enc, config.compressor.compress_bound(enc))
        } else {
            warn!(
                "{}: {} bytes cannot hold a {}x{} BGRA frame",
                input.name,
                data.len(),
                width,
                height
            );
            undersized += 1;
            (0, 0)
        };

        let mut item = WorkItem::new(input.meta.index, width, height, data.into(), enc_capacity, cps_capacity);
        item.quality = config.quality;
        item.flag = config.flag;
        item.level = config.level;

        let output = config
            .output
            .as_ref()
            .map(|dir| dir.join(format!("{}{}", input.name, config.ext.suffix())));
        let file = FileWorkItem {
            item,
            name: input.name,
            ext: config.ext.suffix().to_string(),
            input: input.path,
            output,
            result: None,
            failure: None,
        };
        info!("{}", file.describe());
        files.push(file);
    }
    Ok((files, unreadable, undersized))
}

/// Run every file in the input directory through the dispatch pool.
pub fn execute(config: &BatchConfig) -> Result<BatchReport> {
    execute_with(
        config,
        encoder_factory(config.encoder),
        compressor_factory(config.compressor, config.compressor_options()),
    )
}

/// `execute` with the codec factories supplied by the caller. An inline pool
/// calls each factory once up front and any failure ends the run; worker
/// pools call them per file, so a failure only marks that file.
pub fn execute_with(
    config: &BatchConfig,
    encoder: EncoderFactory,
    compressor: CompressorFactory,
) -> Result<BatchReport> {
    let (files, unreadable, undersized) = load_files(config)?;
    if let Some(dir) = &config.output {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let pool = DispatchPool::new(config.threads)?;
    let codecs = if pool.is_inline() {
        CodecSource::Shared(Mutex::new((encoder()?, compressor()?)))
    } else {
        CodecSource::PerCall { encoder, compressor }
    };
    let codecs = Arc::new(codecs);

    let start = Instant::now();
    let handles: Vec<_> = files
        .into_iter()
        .map(|file| {
            let codecs = Arc::clone(&codecs);
            pool.submit(move |f: &mut FileWorkItem| codecs.run(f), file)
        })
        .collect();
    info!("Waiting for all threads to finish");
    let files = pool.wait_all(handles)?;
    info!(
        "{} file(s) on {} thread(s) in {:.1}ms",
        files.len(),
        pool.size(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let summary = TimingSummary::from_items(files.iter().map(|f| &f.item), config.mean_policy);

    if let Some(dir) = &config.output {
        write_summary(dir, config, pool.size(), &files, &summary)?;
    }

    Ok(BatchReport {
        files,
        summary,
        unreadable,
        undersized,
        threads: pool.size(),
    })
}

fn write_summary(
    dir: &std::path::Path,
    config: &BatchConfig,
    threads: usize,
    files: &[FileWorkItem],
    summary: &TimingSummary,
) -> Result<()> {
    let entries: Vec<_> = files
        .iter()
        .map(|f| {
            json!({
                "index": f.item.index(),
                "name": f.name,
                "width": f.item.width(),
                "height": f.item.height(),
                "src_size": f.item.src_size(),
                "encode_size": f.item.enc_size(),
                "encode_ms": f.item.enc_time(),
                "compress_size": f.item.cps_size(),
                "compress_ms": f.item.cps_time(),
                "failure": f.failure,
            })
        })
        .collect();

    let doc = json!({
        "config": {
            "threads": threads,
            "requested_threads": config.threads,
            "quality": config.quality,
            "flag": config.flag.to_string(),
            "ext": config.ext.suffix(),
            "encoder": config.encoder.to_string(),
            "compressor": config.compressor.to_string(),
            "level": config.level,
            "zstd_workers": config.zstd_workers,
        },
        "summary": summary.to_json(),
        "files": entries,
    });
    let path = dir.join("summary.json");
    fs::write(&path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

pub fn run(args: BatchArgs) -> Result<()> {
    let config = BatchConfig::from_args(&args)?;
    info!("Threads: {}", config.threads);
    info!("Quality: {}", config.quality);
    info!("Flag: {}", config.flag);
    info!("Extension: {} ({})", config.ext.suffix(), config.encoder);
    info!("Compressor: {} level {}", config.compressor, config.level);
    info!("Input: {}", config.input.display());
    info!(
        "Output: {}",
        config.output.as_ref().map_or("-".to_string(), |p| p.display().to_string())
    );

    let batch = execute(&config)?;
    for file in &batch.files {
        if let Some(result) = &file.result {
            println!("{}", result);
        }
    }
    for line in summary_lines(&batch.summary) {
        println!("{}", line);
    }
    if batch.unreadable > 0 {
        warn!("{} file(s) could not be read", batch.unreadable);
    }
    if batch.undersized > 0 {
        warn!("{} file(s) were shorter than their declared frame", batch.undersized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::core::codec::{create_compressor, create_encoder};
    use crate::core::input::synthetic_frame;
    use crate::core::pool::max_threads;

    fn args(input: PathBuf) -> BatchArgs {
        BatchArgs {
            threads: 1,
            quality: 100,
            flag: None,
            ext: Extension::Yuv,
            input,
            output: None,
            jpeg_backend: None,
            compressor: "lz4".into(),
            level: 1,
            zstd_workers: 0,
            mean_policy: "exclude-failed".into(),
        }
    }

    #[test]
    fn test_config_picks_encoder_from_extension() {
        let mut a = args(PathBuf::from("."));
        assert_eq!(BatchConfig::from_args(&a).unwrap().encoder, EncoderKind::Yuv);
        a.ext = Extension::Jpg;
        assert_eq!(BatchConfig::from_args(&a).unwrap().encoder, default_jpeg_backend());
        a.jpeg_backend = Some("jpeg-rs".into());
        assert_eq!(BatchConfig::from_args(&a).unwrap().encoder, EncoderKind::JpegRs);
        a.jpeg_backend = Some("qoi".into());
        assert!(BatchConfig::from_args(&a).is_err());
        a.jpeg_backend = None;
        a.compressor = "brotli".into();
        assert!(BatchConfig::from_args(&a).is_err());
    }

    #[test]
    fn test_flag_arg_maps_to_bits() {
        assert_eq!(EncodeFlags::from(FlagArg::AccurateDct).bits(), 4096);
        assert_eq!(EncodeFlags::from(FlagArg::FastDct).bits(), 2048);
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let dir = std::env::temp_dir().join("imgbench_batch_missing");
        let _ = fs::remove_dir_all(&dir);
        let config = BatchConfig::from_args(&args(dir)).unwrap();
        assert!(execute(&config).is_err());
    }

    #[test]
    fn test_short_file_fails_stage_not_batch() {
        let dir = std::env::temp_dir().join("imgbench_batch_short_file");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("0_4_4.raw"), [1u8; 64]).unwrap();
        fs::write(dir.join("1_4_4.raw"), [1u8; 10]).unwrap();

        let config = BatchConfig::from_args(&args(dir.clone())).unwrap();
        let batch = execute(&config).unwrap();
        assert_eq!(batch.files.len(), 2);
        assert!(batch.files[0].failure.is_none());
        assert!(batch.files[1].failure.is_some());
        assert!(batch.files[1].result.as_deref().unwrap().contains("FAILED("));
        assert_eq!(batch.summary.encode_failures, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_output_dir_gets_streams_and_summary() {
        let dir = std::env::temp_dir().join("imgbench_batch_output");
        let _ = fs::remove_dir_all(&dir);
        let input = dir.join("in");
        let output = dir.join("out");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("3_8_2.raw"), [200u8; 64]).unwrap();

        let mut a = args(input);
        a.output = Some(output.clone());
        let batch = execute(&BatchConfig::from_args(&a).unwrap()).unwrap();
        assert_eq!(batch.files.len(), 1);

        let written = fs::read(output.join("3_8_2.raw.yuv")).unwrap();
        assert_eq!(written.len(), 8 * 2 + 2 * 4);
        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("summary.json")).unwrap()).unwrap();
        assert_eq!(doc["summary"]["items"], 1);
        assert_eq!(doc["files"][0]["name"], "3_8_2.raw");

        let _ = fs::remove_dir_all(&dir);
    }

    fn frames(name: &str, count: usize) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            fs::write(dir.join(format!("{}_8_8.raw", i)), synthetic_frame(8, 8)).unwrap();
        }
        dir
    }

    #[test]
    fn test_default_flag_follows_encoder() {
        let mut a = args(PathBuf::from("."));
        assert_eq!(BatchConfig::from_args(&a).unwrap().flag, EncodeFlags::NONE);
        a.ext = Extension::Jpg;
        a.jpeg_backend = Some("jpeg-rs".into());
        assert_eq!(BatchConfig::from_args(&a).unwrap().flag, EncodeFlags::ACCURATE_DCT);
        a.flag = Some(FlagArg::Progressive);
        assert_eq!(BatchConfig::from_args(&a).unwrap().flag, EncodeFlags::PROGRESSIVE);
    }

    #[test]
    fn test_oversized_name_fails_only_that_file() {
        let dir = frames("imgbench_batch_oversized_name", 1);
        fs::write(dir.join("1_4000000000_4000000000.raw"), [1u8; 16]).unwrap();

        let batch = execute(&BatchConfig::from_args(&args(dir.clone())).unwrap()).unwrap();
        assert_eq!(batch.files.len(), 2);
        assert_eq!(batch.undersized, 1);
        assert!(batch.files[0].failure.is_none());
        assert!(batch.files[0].result.as_deref().unwrap().starts_with("#0\t"));
        assert_eq!(batch.files[1].item.enc_capacity(), 0);
        assert_eq!(batch.files[1].item.cps_capacity(), 0);
        assert!(batch.files[1].result.as_deref().unwrap().contains("FAILED("));
        assert_eq!(batch.summary.encode_failures, 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_factory_call_marks_one_file() {
        let dir = frames("imgbench_batch_factory_once", 6);
        let mut a = args(dir.clone());
        a.threads = 3;
        let config = BatchConfig::from_args(&a).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let encoder: EncoderFactory = Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("codec unavailable");
            }
            create_encoder(EncoderKind::Yuv)
        });
        let compressor = compressor_factory(CompressorKind::Lz4, CompressorOptions::default());

        let batch = execute_with(&config, encoder, compressor).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(batch.files.len(), 6);
        assert!(batch.files.iter().all(|f| f.result.is_some()));
        let failed: Vec<_> = batch.files.iter().filter(|f| f.failure.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failure.as_deref(), Some("codec unavailable"));
        assert!(failed[0].result.as_deref().unwrap().starts_with("FAILED(codec unavailable)"));
        let indices: Vec<usize> = batch.files.iter().map(|f| f.item.index()).collect();
        assert_eq!(indices, (0..6).collect::<Vec<_>>());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_inline_codec_init_failure_is_fatal() {
        let dir = frames("imgbench_batch_inline_init", 2);
        let config = BatchConfig::from_args(&args(dir.clone())).unwrap();

        let encoder: EncoderFactory = Arc::new(|| -> Result<Box<dyn Encoder>> {
            Err(crate::error::BenchError::CodecInit {
                codec: "yuv".into(),
                reason: "no device".into(),
            }
            .into())
        });
        let compressor: CompressorFactory =
            Arc::new(|| create_compressor(CompressorKind::Lz4, CompressorOptions::default()));

        let err = execute_with(&config, encoder, compressor).unwrap_err();
        assert!(format!("{:#}", err).contains("no device"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_summary_records_clamped_threads() {
        let dir = frames("imgbench_batch_clamped_threads", 2);
        let output = dir.join("out");
        let mut a = args(dir.clone());
        a.threads = max_threads() + 5;
        a.output = Some(output.clone());

        let batch = execute(&BatchConfig::from_args(&a).unwrap()).unwrap();
        assert_eq!(batch.threads, max_threads());
        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.join("summary.json")).unwrap()).unwrap();
        assert_eq!(doc["config"]["threads"], max_threads());
        assert_eq!(doc["config"]["requested_threads"], max_threads() + 5);

        let _ = fs::remove_dir_all(&dir);
    }
}
