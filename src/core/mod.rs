pub mod codec;
pub mod compress;
pub mod input;
pub mod jpeg;
pub mod planar;
pub mod pool;
pub mod qoi;
pub mod report;
pub mod stage;
pub mod summary;
pub mod sweep;
pub mod work_item;

use std::fmt;
use std::str::FromStr;

/// Bytes per source pixel. Every encoder takes interleaved BGRA input.
pub const BYTES_PER_PIXEL: usize = 4;

/// Encoder feature bitset. Bit values follow the libjpeg-turbo `TJFLAG_*`
/// constants so numbers copied from other tools mean the same thing here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EncodeFlags(u32);

impl EncodeFlags {
    pub const NONE: Self = Self(0);
    pub const FAST_UPSAMPLE: Self = Self(256);
    pub const NO_REALLOC: Self = Self(1024);
    pub const FAST_DCT: Self = Self(2048);
    pub const ACCURATE_DCT: Self = Self(4096);
    pub const STOP_ON_WARNING: Self = Self(8192);
    pub const PROGRESSIVE: Self = Self(16384);
    pub const LIMIT_SCANS: Self = Self(32768);

    const NAMED: [(Self, &'static str); 7] = [
        (Self::FAST_UPSAMPLE, "fast-upsample"),
        (Self::NO_REALLOC, "no-realloc"),
        (Self::FAST_DCT, "fast-dct"),
        (Self::ACCURATE_DCT, "accurate-dct"),
        (Self::STOP_ON_WARNING, "stop-on-warning"),
        (Self::PROGRESSIVE, "progressive"),
        (Self::LIMIT_SCANS, "limit-scans"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Flags set in `self` but not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EncodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut rest = self.0;
        let mut first = true;
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                rest &= !flag.0;
                first = false;
            }
        }
        if rest != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{:#x}", rest)?;
        }
        Ok(())
    }
}

impl FromStr for EncodeFlags {
    type Err = String;

    /// Accepts flag names joined by `|` or `+`, plain numbers, or `none`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::NONE;
        for part in s.split(['|', '+']).map(str::trim) {
            let lower = part.to_lowercase();
            if lower.is_empty() || lower == "none" || lower == "0" {
                continue;
            }
            if let Ok(bits) = lower.parse::<u32>() {
                flags = flags.union(Self(bits));
                continue;
            }
            let named = Self::NAMED
                .iter()
                .find(|(_, name)| *name == lower || name.replace('-', "") == lower)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| {
                    let available: Vec<&str> = Self::NAMED.iter().map(|(_, n)| *n).collect();
                    format!("unknown encode flag '{}'. Available: {}", part, available.join(", "))
                })?;
            flags = flags.union(named);
        }
        Ok(flags)
    }
}
