//! Bit-level reads over a NAL's RBSP, including Exp-Golomb decoding.
//!
//! Built on [`bitreader::BitReader`] the same way
//! `rtsp/src/client/audio/aac.rs` parses an `AudioSpecificConfig`: a flat
//! byte slice and a bit cursor. Exp-Golomb isn't part of that crate's
//! surface, so `read_ue`/`read_se` are implemented here on top of
//! `read_bit`.

use crate::error::CutError;

fn wrap<T>(r: Result<T, bitreader::BitReaderError>, nal_index: usize, what: &str) -> Result<T, CutError> {
    r.map_err(|_| CutError::bitstream(nal_index, format!("truncated while reading {}", what)))
}

/// Strips `00 00 03` emulation-prevention sequences from a NAL payload,
/// per ISO/IEC 14496-10 Annex B.2 / ISO/IEC 23008-2 Annex B. Slice header
/// bits must be read from the de-escaped buffer; parameter-set and raw
/// stream-copy bytes are left in their original, escaped form.
pub fn strip_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len());
    let mut zero_run = 0u32;
    for &b in rbsp {
        if zero_run >= 2 && b == 0x03 {
            zero_run = 0;
            continue;
        }
        out.push(b);
        if b == 0 {
            zero_run += 1;
        } else {
            zero_run = 0;
        }
    }
    out
}

/// A bit cursor over an already de-escaped NAL payload, with Exp-Golomb
/// decoding per ISO/IEC 14496-10 section 9.1.
pub struct BitReader<'a> {
    inner: bitreader::BitReader<'a>,
    nal_index: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], nal_index: usize) -> Self {
        BitReader { inner: bitreader::BitReader::new(data), nal_index }
    }

    /// Reads an unsigned `n`-bit field, `n` in `1..=32`.
    pub fn read_u(&mut self, n: u8) -> Result<u32, CutError> {
        let r = self.inner.read_u32(n);
        wrap(r, self.nal_index, "u(n)")
    }

    /// Reads a single bit as a bool.
    pub fn read_flag(&mut self) -> Result<bool, CutError> {
        let r = self.inner.read_bool();
        wrap(r, self.nal_index, "u(1)")
    }

    /// Exp-Golomb `ue(v)`: count leading zero bits `k`, read `k` more
    /// bits, the value is `2^k - 1 + suffix`.
    pub fn read_ue(&mut self) -> Result<u32, CutError> {
        let mut leading_zero_bits: u32 = 0;
        loop {
            if leading_zero_bits > 31 {
                return Err(CutError::bitstream(self.nal_index, "exp-golomb prefix overflow"));
            }
            let bit = wrap(self.inner.read_bool(), self.nal_index, "ue(v) prefix")?;
            if bit {
                break;
            }
            leading_zero_bits += 1;
        }
        if leading_zero_bits == 0 {
            return Ok(0);
        }
        let suffix = wrap(self.inner.read_u32(leading_zero_bits as u8), self.nal_index, "ue(v) suffix")?;
        Ok((1u32 << leading_zero_bits) - 1 + suffix)
    }

    /// Exp-Golomb `se(v)`: zig-zag decode of `ue(v)` per the standard
    /// mapping `k -> (-1)^(k+1) * ceil(k/2)`.
    pub fn read_se(&mut self) -> Result<i32, CutError> {
        let code = self.read_ue()?;
        let magnitude = (code + 1) / 2;
        if code % 2 == 1 {
            Ok(magnitude as i32)
        } else {
            Ok(-(magnitude as i32))
        }
    }
}
