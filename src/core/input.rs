use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::codec::frame_len;
use crate::core::BYTES_PER_PIXEL;
use crate::error::BenchError;

/// Metadata carried by a batch input file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub ext: String,
}

/// Parse a name like "3_1920_1080.raw" into its index, dimensions and extension.
pub fn parse_file_name(name: &str) -> Result<FileMeta, BenchError> {
    let malformed = || BenchError::MalformedInputName(name.to_string());
    let parts: Vec<&str> = name.split(['_', '.']).collect();
    if parts.len() != 4 {
        return Err(malformed());
    }
    let index = parts[0].parse().map_err(|_| malformed())?;
    let width = parts[1].parse().map_err(|_| malformed())?;
    let height = parts[2].parse().map_err(|_| malformed())?;
    Ok(FileMeta {
        index,
        width,
        height,
        ext: parts[3].to_string(),
    })
}

/// A conforming file found in a batch input directory.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub meta: FileMeta,
    pub name: String,
    pub path: PathBuf,
}

/// List regular files in `dir` whose names parse, sorted by index. Other
/// files are skipped with a warning.
pub fn scan_directory(dir: &Path) -> Result<Vec<InputFile>, BenchError> {
    let unavailable = |source| BenchError::InputUnavailable {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        match parse_file_name(&name) {
            Ok(meta) => files.push(InputFile {
                meta,
                name,
                path: entry.path(),
            }),
            Err(e) => warn!("skipping {}: {}", entry.path().display(), e),
        }
    }
    files.sort_by(|a, b| a.meta.index.cmp(&b.meta.index).then_with(|| a.name.cmp(&b.name)));
    debug!("{} input file(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Read a file verbatim.
pub fn read_raw(path: &Path) -> Result<Vec<u8>, BenchError> {
    fs::read(path).map_err(|source| BenchError::InputUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

fn is_image_container(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("png" | "jpg" | "jpeg")
    )
}

/// Decode a PNG or JPEG into BGRA, returning pixels and dimensions.
pub fn decode_image(path: &Path) -> Result<(Vec<u8>, u32, u32)> {
    let img = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let mut pixels = img.into_raw();
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        px.swap(0, 2);
    }
    Ok((pixels, width, height))
}

/// Load a source buffer. PNG/JPEG files are decoded and report their own
/// dimensions; anything else is taken as raw BGRA of the given size.
pub fn load_source(path: &Path, width: u32, height: u32) -> Result<(Vec<u8>, u32, u32)> {
    if !path.exists() {
        return Err(BenchError::InputUnavailable {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        }
        .into());
    }
    if is_image_container(path) {
        return decode_image(path);
    }
    let pixels = read_raw(path)?;
    Ok((pixels, width, height))
}

/// Deterministic BGRA test frame: diagonal gradients with a fine checker so
/// both lossy and lossless codecs have something to work on.
pub fn synthetic_frame(width: u32, height: u32) -> Vec<u8> {
    let mut px = Vec::with_capacity(frame_len(width, height).unwrap_or(0));
    for y in 0..height {
        for x in 0..width {
            px.extend_from_slice(&synthetic_pixel(x, y, width, height));
        }
    }
    px
}

fn synthetic_pixel(x: u32, y: u32, width: u32, height: u32) -> [u8; 4] {
    let (x, y) = (u64::from(x), u64::from(y));
    let (w, h) = (u64::from(width), u64::from(height));
    let checker = if (x / 8 + y / 8) % 2 == 0 { 0 } else { 24 };
    let b = (x * 255 / w.max(1)) as u8;
    let g = (y * 255 / h.max(1)) as u8;
    let r = ((x + y) * 255 / (w + h).max(1)) as u8;
    [b.saturating_add(checker), g, r, 255]
}
