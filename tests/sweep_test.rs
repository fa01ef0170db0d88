use anyhow::Result;
use std::sync::Arc;

use imgbench::bench::{execute, SweepArgs};
use imgbench::core::codec::{create_compressor, create_encoder, CompressorKind, CompressorOptions, EncoderKind};
use imgbench::core::input::synthetic_frame;
use imgbench::core::report::{format_ratio, report};
use imgbench::core::stage::{run_compress, run_encode, CompressInput};
use imgbench::core::sweep::{Axis, SweepDriver};
use imgbench::core::EncodeFlags;
use imgbench::{ratio, WorkItem, STAGE_FAILED_MS};

#[test]
fn test_full_hd_accurate_dct_then_lz4() -> Result<()> {
    let (w, h) = (1920u32, 1080u32);
    let src: Arc<[u8]> = synthetic_frame(w, h).into();
    assert_eq!(src.len(), 8_294_400);

    let kind = EncoderKind::JpegRs;
    let enc_cap = kind.max_encoded_len(w, h).unwrap();
    let cps_cap = CompressorKind::Lz4.compress_bound(enc_cap);
    let mut item = WorkItem::new(0, w, h, src, enc_cap, cps_cap);
    item.quality = 100;
    item.flag = EncodeFlags::ACCURATE_DCT;
    item.level = 1;

    let mut encoder = create_encoder(kind)?;
    let mut compressor = create_compressor(CompressorKind::Lz4, CompressorOptions::default())?;

    let enc = run_encode(encoder.as_mut(), &mut item);
    assert!(enc.succeeded());
    assert!(item.enc_size() > 0 && item.enc_size() < item.src_size());
    assert!(item.enc_time() >= 0.0 && item.enc_time() < STAGE_FAILED_MS);

    let cps = run_compress(compressor.as_mut(), &mut item, CompressInput::Encoded);
    assert!(cps.succeeded());
    assert!(item.cps_size() <= compressor.compress_bound(item.enc_size()));
    Ok(())
}

#[test]
fn test_zero_byte_input_never_panics() -> Result<()> {
    let encoders = [EncoderKind::JpegRs, EncoderKind::Yuv, EncoderKind::Qoi];
    let compressors = [CompressorKind::Lz4, CompressorKind::Lz4Hc, CompressorKind::Lz4Flex, CompressorKind::Zstd];

    for ek in encoders {
        for ck in compressors {
            let src: Arc<[u8]> = Vec::new().into();
            let mut item = WorkItem::new(0, 0, 0, src, 64, ck.compress_bound(64));
            item.level = 1;

            let mut encoder = create_encoder(ek)?;
            let mut compressor = create_compressor(ck, CompressorOptions::default())?;
            let rows = SweepDriver::new()
                .encoder(encoder.as_mut())
                .compressor(compressor.as_mut())
                .run_sweep(&mut item, &[Axis::Quality(vec![90]), Axis::Level(vec![1])], |_| {})?;

            assert_eq!(rows.len(), 1);
            assert!(!rows[0].encode.as_ref().unwrap().succeeded());
            let line = report(&rows[0]);
            assert!(!line.contains("NaN"), "{}", line);
            assert!(!line.contains("inf"), "{}", line);
        }
    }
    Ok(())
}

#[test]
fn test_flag_axis_fails_flags_the_backend_ignores() -> Result<()> {
    let args = SweepArgs {
        width: 64,
        height: 64,
        encoder: Some("jpeg-rs".into()),
        qualities: "90".into(),
        flags: Some("fast-dct,accurate-dct,progressive,fast-upsample".into()),
        ..SweepArgs::default()
    };
    let rows = execute(&args, |_| {})?;
    let outcome: Vec<(String, Option<String>)> = rows
        .iter()
        .map(|r| {
            let enc = r.encode.as_ref().unwrap();
            (r.flag.unwrap().to_string(), enc.failure.as_ref().map(|f| f.reason.clone()))
        })
        .collect();
    assert_eq!(outcome[0].1.as_deref(), Some("flag fast-dct unsupported by jpeg-rs"));
    assert_eq!(outcome[1].1, None);
    assert_eq!(outcome[2].1, None);
    assert_eq!(outcome[3].1.as_deref(), Some("flag fast-upsample unsupported by jpeg-rs"));
    assert!(report(&rows[0]).contains("FAILED(flag fast-dct unsupported by jpeg-rs)"));

    let accurate = rows[1].encode.as_ref().unwrap().output_size;
    let progressive = rows[2].encode.as_ref().unwrap().output_size;
    assert_ne!(accurate, progressive);
    Ok(())
}

#[test]
fn test_default_flags_follow_the_encoder() -> Result<()> {
    for (encoder, expected) in [
        ("jpeg-rs", vec!["accurate-dct", "progressive"]),
        ("yuv", vec!["none", "fast-upsample"]),
        ("qoi", vec!["none"]),
    ] {
        let args = SweepArgs {
            width: 32,
            height: 32,
            encoder: Some(encoder.into()),
            qualities: "75".into(),
            ..SweepArgs::default()
        };
        let rows = execute(&args, |_| {})?;
        let flags: Vec<String> = rows.iter().map(|r| r.flag.unwrap().to_string()).collect();
        assert_eq!(flags, expected, "{}", encoder);
        assert!(rows.iter().all(|r| r.encode.as_ref().unwrap().succeeded()), "{}", encoder);
    }
    Ok(())
}

#[test]
fn test_ratio_edges() {
    assert_eq!(ratio(500, 500), 0.0);
    assert_eq!(ratio(500, 0), 100.0);
    assert_eq!(format_ratio(ratio(0, 10)), "n/a");
}

#[test]
fn test_chained_sweep_reports_each_stage_ratio() -> Result<()> {
    let args = SweepArgs {
        width: 128,
        height: 64,
        encoder: Some("qoi".into()),
        qualities: "100".into(),
        flags: Some("none".into()),
        compressor: Some("zstd".into()),
        levels: "0,1,3".into(),
        chain: true,
        ..SweepArgs::default()
    };
    let mut streamed = 0;
    let rows = execute(&args, |_| streamed += 1)?;
    assert_eq!(rows.len(), 3);
    assert_eq!(streamed, 3);

    for row in &rows {
        let enc = row.encode.as_ref().unwrap();
        let cps = row.compress.as_ref().unwrap();
        assert!(enc.succeeded() && cps.succeeded());
        assert_eq!(enc.input_size, 128 * 64 * 4);
        assert_eq!(cps.input_size, enc.output_size);
        assert!(report(row).contains("total ratio:"));
    }
    assert!(rows[0].compress.as_ref().unwrap().skipped);
    Ok(())
}

#[test]
fn test_compress_only_sweep_over_levels() -> Result<()> {
    let args = SweepArgs {
        width: 64,
        height: 64,
        compressor: Some("lz4hc".into()),
        levels: "1,6,12,13".into(),
        ..SweepArgs::default()
    };
    let rows = execute(&args, |_| {})?;
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.encode.is_none()));
    assert!(rows[..3].iter().all(|r| r.compress.as_ref().unwrap().succeeded()));
    // 13 is past the lz4hc range
    let last = rows[3].compress.as_ref().unwrap();
    assert!(!last.succeeded());
    assert_eq!(last.duration_ms, STAGE_FAILED_MS);
    Ok(())
}

#[cfg(feature = "turbojpeg")]
#[test]
fn test_turbojpeg_sweep() -> Result<()> {
    let args = SweepArgs {
        width: 256,
        height: 128,
        encoder: Some("jpeg".into()),
        qualities: "50,100".into(),
        flags: Some("fast-dct".into()),
        ..SweepArgs::default()
    };
    let rows = execute(&args, |_| {})?;
    assert_eq!(rows.len(), 2);
    let low = rows[0].encode.as_ref().unwrap().output_size;
    let high = rows[1].encode.as_ref().unwrap().output_size;
    assert!(low < high);
    Ok(())
}

#[cfg(feature = "turbojpeg")]
#[test]
fn test_turbojpeg_default_flags_all_apply() -> Result<()> {
    let args = SweepArgs {
        width: 256,
        height: 128,
        encoder: Some("jpeg".into()),
        qualities: "90".into(),
        ..SweepArgs::default()
    };
    let rows = execute(&args, |_| {})?;
    let flags: Vec<String> = rows.iter().map(|r| r.flag.unwrap().to_string()).collect();
    assert_eq!(flags, ["fast-dct", "accurate-dct", "progressive"]);
    assert!(rows.iter().all(|r| r.encode.as_ref().unwrap().succeeded()));
    Ok(())
}
