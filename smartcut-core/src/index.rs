//! Access-unit & GOP builder, and the stream index used for random
//! access during planning and assembly (spec.md MODULE D/E).

use std::path::Path;

use crate::error::CutError;
use crate::nal::{self, Backing, Codec, NalUnit, SliceType};

#[derive(Debug, Clone)]
pub struct AccessUnit {
    pub index: usize,
    pub nal_indices: Vec<usize>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub is_keyframe: bool,
    pub is_idr: bool,
    pub slice_type: SliceType,
    pub gop_index: usize,
}

#[derive(Debug, Clone)]
pub struct Gop {
    pub index: usize,
    pub start_au: usize,
    pub end_au: usize,
    pub keyframe_au: usize,
    pub frame_count: usize,
    pub is_closed: bool,
}

/// Owns the parsed stream. Holds the backing bytes (map or buffer), the
/// flat `NalUnit` array, and the derived access-unit / GOP structure.
/// Readers (the planner, the output assembler) take immutable borrows.
pub struct StreamIndex {
    backing: Backing,
    pub codec: Codec,
    pub nals: Vec<NalUnit>,
    pub access_units: Vec<AccessUnit>,
    pub gops: Vec<Gop>,
    pub sps_nals: Vec<usize>,
    pub pps_nals: Vec<usize>,
    pub vps_nals: Vec<usize>,
    keyframe_positions: Vec<usize>,
    idr_positions: Vec<usize>,
}

impl StreamIndex {
    pub fn open(path: &Path, codec_hint: Option<Codec>) -> Result<Self, CutError> {
        let backing = nal::open_backing(path)?;
        let data = backing.as_slice();
        let codec = codec_hint
            .or_else(|| codec_from_extension(path))
            .or_else(|| nal::detect_codec_from_bytes(data))
            .ok_or_else(|| CutError::UnsupportedCodec {
                reason: format!("cannot determine codec for {:?}", path),
            })?;
        let nals = nal::parse_all(data, codec);
        Self::from_nals(backing, codec, nals)
    }

    /// Builds an index from an already-parsed NAL array. `pub(crate)` so
    /// other modules' tests can construct fixtures without going through
    /// a real file and `memmap`.
    pub(crate) fn from_nals(backing: Backing, codec: Codec, nals: Vec<NalUnit>) -> Result<Self, CutError> {
        let mut sps_nals = Vec::new();
        let mut pps_nals = Vec::new();
        let mut vps_nals = Vec::new();
        for (i, n) in nals.iter().enumerate() {
            if n.is_sps {
                sps_nals.push(i);
            }
            if n.is_pps {
                pps_nals.push(i);
            }
            if n.is_vps {
                vps_nals.push(i);
            }
        }

        let access_units = build_access_units(&nals);
        let gops = build_gops(&access_units);
        let mut access_units = access_units;
        for (gi, g) in gops.iter().enumerate() {
            for au in &mut access_units[g.start_au..=g.end_au] {
                au.gop_index = gi;
            }
        }

        let keyframe_positions: Vec<usize> =
            access_units.iter().enumerate().filter(|(_, au)| au.is_keyframe).map(|(i, _)| i).collect();
        let idr_positions: Vec<usize> =
            access_units.iter().enumerate().filter(|(_, au)| au.is_idr).map(|(i, _)| i).collect();

        Ok(StreamIndex {
            backing,
            codec,
            nals,
            access_units,
            gops,
            sps_nals,
            pps_nals,
            vps_nals,
            keyframe_positions,
            idr_positions,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.access_units.len()
    }

    pub fn bytes(&self) -> &[u8] {
        self.backing.as_slice()
    }

    /// Raw bytes of access unit `i`, from its first NAL's start code
    /// through its last byte.
    pub fn access_unit_bytes(&self, i: usize) -> &[u8] {
        let au = &self.access_units[i];
        &self.bytes()[au.start_offset as usize..au.end_offset as usize]
    }

    pub fn gop_for(&self, frame: usize) -> usize {
        self.access_units[frame].gop_index
    }

    pub fn keyframe_at_or_before(&self, frame: usize) -> Option<usize> {
        search_at_or_before(&self.keyframe_positions, frame)
    }

    pub fn keyframe_at_or_after(&self, frame: usize) -> Option<usize> {
        search_at_or_after(&self.keyframe_positions, frame)
    }

    pub fn idr_at_or_before(&self, frame: usize) -> Option<usize> {
        search_at_or_before(&self.idr_positions, frame)
    }

    pub fn idr_at_or_after(&self, frame: usize) -> Option<usize> {
        search_at_or_after(&self.idr_positions, frame)
    }
}

fn search_at_or_before(sorted: &[usize], frame: usize) -> Option<usize> {
    match sorted.binary_search(&frame) {
        Ok(i) => Some(sorted[i]),
        Err(0) => None,
        Err(i) => Some(sorted[i - 1]),
    }
}

fn search_at_or_after(sorted: &[usize], frame: usize) -> Option<usize> {
    match sorted.binary_search(&frame) {
        Ok(i) => Some(sorted[i]),
        Err(i) if i < sorted.len() => Some(sorted[i]),
        Err(_) => None,
    }
}

fn codec_from_extension(path: &Path) -> Option<Codec> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "264" | "h264" | "avc" => Some(Codec::H264),
        "265" | "h265" | "hevc" => Some(Codec::H265),
        _ => None,
    }
}

/// Groups NALs into access units: a boundary is declared at an AUD NAL
/// (once an AU is already in flight), or at a slice NAL with
/// `first_in_picture` once the in-flight AU already holds a slice.
/// Parameter sets, SEI, and AUD preceding a slice are held in `pending`
/// until that slice is seen, so they land in the AU it starts rather than
/// the one before it.
fn build_access_units(nals: &[NalUnit]) -> Vec<AccessUnit> {
    let mut aus = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_has_slice = false;
    let mut pending: Vec<usize> = Vec::new();

    let flush = |current: &mut Vec<usize>, aus: &mut Vec<AccessUnit>| {
        if current.is_empty() {
            return;
        }
        let taken = std::mem::take(current);
        let slice_info = match taken.iter().find_map(|&i| nals[i].slice) {
            Some(s) => s,
            None => {
                // No slice ever landed in this group (e.g. a trailing AUD
                // with nothing after it); hand it back rather than
                // manufacturing a sliceless AU.
                *current = taken;
                return;
            }
        };
        let first = &nals[taken[0]];
        aus.push(AccessUnit {
            index: aus.len(),
            nal_indices: taken,
            start_offset: first.file_offset,
            end_offset: 0, // backfilled below
            is_keyframe: slice_info.is_keyframe,
            is_idr: slice_info.is_idr,
            slice_type: slice_info.slice_type,
            gop_index: 0, // backfilled once GOPs are built
        });
    };

    for (i, nal) in nals.iter().enumerate() {
        if let Some(slice) = nal.slice {
            if current_has_slice && slice.first_in_picture {
                flush(&mut current, &mut aus);
                current_has_slice = false;
            }
            current.append(&mut pending);
            current.push(i);
            current_has_slice = true;
        } else if nal.is_aud && current_has_slice {
            flush(&mut current, &mut aus);
            current_has_slice = false;
            pending.push(i);
        } else {
            pending.push(i);
        }
    }
    // Anything still held back (a truncated stream ending in parameter
    // sets or an AUD with no following slice) rides along with whatever
    // group is still open rather than being dropped.
    current.append(&mut pending);
    flush(&mut current, &mut aus);

    // Backfill end_offset: each AU ends where the next one starts; the
    // last AU ends at the last NAL's end (EOF for a well-formed file).
    let n = aus.len();
    for i in 0..n {
        let end = if i + 1 < n {
            aus[i + 1].start_offset
        } else {
            let last_nal = *aus[i].nal_indices.last().unwrap();
            nals[last_nal].file_offset + nals[last_nal].size
        };
        aus[i].end_offset = end;
    }
    aus
}

/// A new GOP starts at every keyframe AU; the first AU of the file always
/// starts a (possibly degenerate, open) GOP even if it isn't a keyframe.
fn build_gops(aus: &[AccessUnit]) -> Vec<Gop> {
    let mut gops = Vec::new();
    if aus.is_empty() {
        return gops;
    }
    let mut start_au = 0usize;
    for i in 1..aus.len() {
        if aus[i].is_keyframe {
            close_gop(&mut gops, aus, start_au, i - 1);
            start_au = i;
        }
    }
    close_gop(&mut gops, aus, start_au, aus.len() - 1);
    gops
}

fn close_gop(gops: &mut Vec<Gop>, aus: &[AccessUnit], start_au: usize, end_au: usize) {
    gops.push(Gop {
        index: gops.len(),
        start_au,
        end_au,
        keyframe_au: start_au,
        frame_count: end_au - start_au + 1,
        is_closed: aus[start_au].is_idr,
    });
}
