// libjpeg-turbo encoder backend
// Compresses BGRA frames straight from the work item into the stage buffer

use std::ffi::{c_int, CStr};

use anyhow::{bail, Result};
use turbojpeg::raw;

use crate::core::codec::{check_frame, EncodeParams, Encoder};
use crate::core::jpeg::jpeg_buf_len;
use crate::core::EncodeFlags;

/// Owned TurboJPEG 3 compressor instance.
struct TjHandle(raw::tjhandle);

// Moved between threads but never shared, so no Sync.
unsafe impl Send for TjHandle {}

impl TjHandle {
    fn compressor() -> Result<Self> {
        let ptr = unsafe { raw::tj3Init(raw::TJINIT_TJINIT_COMPRESS as c_int) };
        if ptr.is_null() {
            bail!("tj3Init failed");
        }
        Ok(Self(ptr))
    }

    fn set(&mut self, param: c_int, value: c_int) -> Result<()> {
        let rc = unsafe { raw::tj3Set(self.0, param, value) };
        if rc != 0 {
            bail!("tj3Set({}, {}) failed: {}", param, value, self.last_error());
        }
        Ok(())
    }

    fn last_error(&self) -> String {
        let msg = unsafe { raw::tj3GetErrorStr(self.0) };
        if msg.is_null() {
            return "unknown error".to_string();
        }
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }
}

impl Drop for TjHandle {
    fn drop(&mut self) {
        unsafe { raw::tj3Destroy(self.0) };
    }
}

/// TurboJPEG encoder handle. One compressor instance per handle; handles are
/// moved between threads but never shared.
pub struct TurboJpegEncoder {
    handle: TjHandle,
}

impl TurboJpegEncoder {
    pub fn new() -> Result<Self> {
        let mut handle = TjHandle::compressor()?;
        // 4:2:0 like every other lossy backend here
        handle.set(raw::TJPARAM_TJPARAM_SUBSAMP as c_int, raw::TJSAMP_TJSAMP_420 as c_int)?;
        // output always goes to the caller's pre-sized buffer
        handle.set(raw::TJPARAM_TJPARAM_NOREALLOC as c_int, 1)?;
        Ok(Self { handle })
    }
}

impl Encoder for TurboJpegEncoder {
    fn name(&self) -> &str {
        "jpeg"
    }

    fn max_encoded_len(&self, width: u32, height: u32) -> Option<usize> {
        jpeg_buf_len(width, height)
    }

    fn supported_flags(&self) -> EncodeFlags {
        EncodeFlags::FAST_DCT
            .union(EncodeFlags::ACCURATE_DCT)
            .union(EncodeFlags::PROGRESSIVE)
            .union(EncodeFlags::NO_REALLOC)
            .union(EncodeFlags::STOP_ON_WARNING)
    }

    fn encode(
        &mut self,
        src: &[u8],
        width: u32,
        height: u32,
        params: EncodeParams,
        dst: &mut [u8],
    ) -> Result<usize> {
        let len = check_frame(src, width, height)?;
        if !(1..=100).contains(&params.quality) {
            bail!("quality {} outside 1..=100", params.quality);
        }
        let (w, h) = match (c_int::try_from(width), c_int::try_from(height)) {
            (Ok(w), Ok(h)) if w.checked_mul(4).is_some() => (w, h),
            _ => bail!("{}x{} exceeds the TurboJPEG frame limit", width, height),
        };

        let flags = params.flags;
        self.handle.set(raw::TJPARAM_TJPARAM_QUALITY as c_int, params.quality as c_int)?;
        // FAST_DCT wins when both DCT flags are set, as in tjCompress2
        self.handle.set(
            raw::TJPARAM_TJPARAM_FASTDCT as c_int,
            flags.contains(EncodeFlags::FAST_DCT) as c_int,
        )?;
        self.handle.set(
            raw::TJPARAM_TJPARAM_PROGRESSIVE as c_int,
            flags.contains(EncodeFlags::PROGRESSIVE) as c_int,
        )?;
        self.handle.set(
            raw::TJPARAM_TJPARAM_STOPONWARNING as c_int,
            flags.contains(EncodeFlags::STOP_ON_WARNING) as c_int,
        )?;

        let pixels = &src[..len];
        let mut out_ptr = dst.as_mut_ptr();
        let mut out_len = dst.len() as _;
        let rc = unsafe {
            raw::tj3Compress8(
                self.handle.0,
                pixels.as_ptr(),
                w,
                w * 4,
                h,
                raw::TJPF_TJPF_BGRA as c_int,
                &mut out_ptr,
                &mut out_len,
            )
        };
        if rc != 0 {
            bail!("TurboJPEG compression failed: {}", self.handle.last_error());
        }
        if out_ptr != dst.as_mut_ptr() {
            bail!("TurboJPEG moved the output buffer");
        }
        Ok(out_len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut px = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                px.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 8) as u8, 255]);
            }
        }
        px
    }

    fn encode(enc: &mut TurboJpegEncoder, src: &[u8], flags: EncodeFlags) -> Vec<u8> {
        let mut dst = vec![0u8; enc.max_encoded_len(64, 48).unwrap()];
        let params = EncodeParams { quality: 90, flags };
        let n = enc.encode(src, 64, 48, params, &mut dst).unwrap();
        dst.truncate(n);
        dst
    }

    #[test]
    fn test_turbo_encode_bgra() {
        let src = gradient(64, 48);
        let mut enc = TurboJpegEncoder::new().unwrap();
        let jpeg = encode(&mut enc, &src, EncodeFlags::FAST_DCT);
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_turbo_flags_change_stream() {
        let src = gradient(64, 48);
        let mut enc = TurboJpegEncoder::new().unwrap();
        let fast = encode(&mut enc, &src, EncodeFlags::FAST_DCT);
        let accurate = encode(&mut enc, &src, EncodeFlags::ACCURATE_DCT);
        let progressive = encode(&mut enc, &src, EncodeFlags::PROGRESSIVE);
        assert_ne!(fast, accurate);
        // SOF2 marks a progressive frame
        let sof2 = |jpeg: &[u8]| jpeg.windows(2).any(|m| m[0] == 0xFF && m[1] == 0xC2);
        assert!(sof2(&progressive));
        assert!(!sof2(&accurate));
        // settings do not leak into the next call
        assert_eq!(encode(&mut enc, &src, EncodeFlags::ACCURATE_DCT), accurate);
    }

    #[test]
    fn test_turbo_small_buffer_fails() {
        let src = gradient(64, 48);
        let mut enc = TurboJpegEncoder::new().unwrap();
        let mut dst = vec![0u8; 32];
        let params = EncodeParams { quality: 90, flags: EncodeFlags::NONE };
        assert!(enc.encode(&src, 64, 48, params, &mut dst).is_err());
    }

    #[test]
    fn test_rejected_parameter_is_an_error() {
        let mut handle = TjHandle::compressor().unwrap();
        assert!(handle.set(raw::TJPARAM_TJPARAM_QUALITY as c_int, 101).is_err());
        assert!(handle.set(-1, 0).is_err());
        assert!(handle.set(raw::TJPARAM_TJPARAM_QUALITY as c_int, 80).is_ok());
    }

    #[test]
    fn test_turbo_rejects_quality_zero() {
        let src = gradient(16, 16);
        let mut enc = TurboJpegEncoder::new().unwrap();
        let mut dst = vec![0u8; enc.max_encoded_len(16, 16).unwrap()];
        let params = EncodeParams { quality: 0, flags: EncodeFlags::NONE };
        assert!(enc.encode(&src, 16, 16, params, &mut dst).is_err());
    }
}
