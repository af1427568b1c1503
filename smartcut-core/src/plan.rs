//! Cut planner (spec.md MODULE F): turns a keep-list of frame ranges into
//! an ordered sequence of per-segment stream-copy / reencode spans.
//!
//! Grounded on `ttessmartcut.cpp`'s `analyzeCutPoints`, which walks the
//! same keep-pair list against a GOP index to decide, per pair, whether
//! the cut-in lands on a keyframe or needs a short reencode bridge up to
//! the next random-access point.

use crate::error::CutError;
use crate::index::StreamIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepRange {
    pub start_frame: usize,
    pub end_frame: usize,
}

/// Ordered, non-overlapping list of keep ranges in display order.
pub struct KeepList(Vec<KeepRange>);

impl KeepList {
    pub fn new(ranges: Vec<KeepRange>) -> Result<Self, CutError> {
        if ranges.is_empty() {
            return Err(CutError::EmptyKeepList);
        }
        for w in ranges.windows(2) {
            if w[0].end_frame >= w[1].start_frame {
                return Err(CutError::InvalidKeepList {
                    reason: format!(
                        "keep ranges must be sorted and non-overlapping: [{}, {}] then [{}, {}]",
                        w[0].start_frame, w[0].end_frame, w[1].start_frame, w[1].end_frame
                    ),
                });
            }
        }
        for r in &ranges {
            if r.start_frame > r.end_frame {
                return Err(CutError::InvalidKeepList {
                    reason: format!("range start {} exceeds end {}", r.start_frame, r.end_frame),
                });
            }
        }
        Ok(KeepList(ranges))
    }

    pub fn ranges(&self) -> &[KeepRange] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutPlanEntry {
    pub segment_start: usize,
    pub segment_end: usize,
    pub reencode_start: Option<usize>,
    pub reencode_end: Option<usize>,
    pub streamcopy_start: Option<usize>,
    pub streamcopy_end: Option<usize>,
    pub cut_in_gop: usize,
    pub cut_out_gop: usize,
    pub needs_reencode_at_start: bool,
    pub needs_reencode_at_end: bool,
}

/// Builds the ordered plan for `keep_list` against `index`. Out-of-bounds
/// or post-clamp-empty keep ranges are dropped with a warning
/// (`PlanDegenerate`), matching spec.md 7's "segment dropped, warning
/// emitted, remaining segments processed."
pub fn plan(index: &StreamIndex, keep_list: &KeepList) -> Vec<CutPlanEntry> {
    let frame_count = index.frame_count();
    let mut entries: Vec<CutPlanEntry> = Vec::new();

    for range in keep_list.ranges() {
        let clamped = clamp(range, frame_count);
        let (start, end) = match clamped {
            Some(r) => r,
            None => {
                log::warn!(
                    "dropping keep range [{}, {}]: {}",
                    range.start_frame,
                    range.end_frame,
                    CutError::PlanDegenerate {
                        start: range.start_frame as i64,
                        end: range.end_frame as i64,
                        reason: "empty after clamping to stream bounds".into(),
                    }
                );
                continue;
            }
        };

        let mut entry = plan_one(index, start, end);

        if let (Some(prev), Some(sc_start)) = (entries.last(), entry.streamcopy_start) {
            if let Some(prev_sc_end) = prev.streamcopy_end {
                if sc_start <= prev_sc_end {
                    let adjusted = prev_sc_end + 1;
                    if adjusted > entry.streamcopy_end.unwrap_or(end) {
                        log::warn!(
                            "dropping keep range [{}, {}]: streamcopy span fully absorbed by overlap with previous segment",
                            start, end
                        );
                        continue;
                    }
                    entry.streamcopy_start = Some(adjusted);
                }
            }
        }

        entries.push(entry);
    }

    entries
}

fn clamp(range: &KeepRange, frame_count: usize) -> Option<(usize, usize)> {
    if frame_count == 0 {
        return None;
    }
    let last = frame_count - 1;
    let start = range.start_frame.min(last);
    let end = range.end_frame.min(last);
    if start > end {
        None
    } else {
        Some((start, end))
    }
}

fn plan_one(index: &StreamIndex, start: usize, end: usize) -> CutPlanEntry {
    let cut_in_gop = index.gop_for(start);
    let cut_out_gop = index.gop_for(end);

    let k_before = index.keyframe_at_or_before(start);
    let aligned = k_before == Some(start) && is_valid_cut_in(index, start);

    if aligned {
        return CutPlanEntry {
            segment_start: start,
            segment_end: end,
            reencode_start: None,
            reencode_end: None,
            streamcopy_start: Some(start),
            streamcopy_end: Some(end),
            cut_in_gop,
            cut_out_gop,
            needs_reencode_at_start: false,
            needs_reencode_at_end: false,
        };
    }

    let k_after = preferred_reencode_target(index, start, end);

    match k_after {
        Some(k) if k <= end => CutPlanEntry {
            segment_start: start,
            segment_end: end,
            reencode_start: Some(start),
            reencode_end: Some(k - 1),
            streamcopy_start: Some(k),
            streamcopy_end: Some(end),
            cut_in_gop,
            cut_out_gop,
            needs_reencode_at_start: true,
            needs_reencode_at_end: false,
        },
        _ => CutPlanEntry {
            segment_start: start,
            segment_end: end,
            reencode_start: Some(start),
            reencode_end: Some(end),
            streamcopy_start: None,
            streamcopy_end: None,
            cut_in_gop,
            cut_out_gop,
            needs_reencode_at_start: true,
            needs_reencode_at_end: true,
        },
    }
}

/// An aligned cut-in on a keyframe is only accepted without reencoding
/// when that keyframe is a strict IDR — a CRA/BLA cut-in would require
/// handling RASL pictures, out of scope per spec.md 4.F's tie-break.
fn is_valid_cut_in(index: &StreamIndex, frame: usize) -> bool {
    index.idr_at_or_before(frame) == Some(frame)
}

/// Prefers the next IDR at or after `start + 1`; falls back to any
/// keyframe if the IDR doesn't exist or falls past `end`.
fn preferred_reencode_target(index: &StreamIndex, start: usize, end: usize) -> Option<usize> {
    if start + 1 >= index.frame_count() {
        return None;
    }
    if let Some(idr) = index.idr_at_or_after(start + 1) {
        if idr <= end {
            return Some(idr);
        }
    }
    index.keyframe_at_or_after(start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::{Backing, Codec, NalUnit, SliceInfo, SliceType};

    fn slice_nal(offset: u64, size: u64, is_idr: bool, is_keyframe: bool, first_in_picture: bool) -> NalUnit {
        NalUnit {
            file_offset: offset,
            payload_offset: offset,
            size,
            nal_type: if is_idr { 5 } else { 1 },
            nuh_layer_id: 0,
            nal_ref_idc: 0,
            temporal_id: 0,
            is_slice: true,
            is_sps: false,
            is_pps: false,
            is_vps: false,
            is_sei: false,
            is_aud: false,
            is_filler: false,
            slice: Some(SliceInfo {
                slice_type: if is_keyframe { SliceType::I } else { SliceType::P },
                first_in_picture,
                pps_id: 0,
                is_keyframe,
                is_idr,
            }),
        }
    }

    // Ten frames, IDR every 5: 0(IDR) 1 2 3 4 5(IDR) 6 7 8 9
    fn ten_frame_index() -> StreamIndex {
        let mut nals = Vec::new();
        for i in 0..10u64 {
            let is_key = i % 5 == 0;
            nals.push(slice_nal(i * 10, 10, is_key, is_key, true));
        }
        StreamIndex::from_nals(Backing::Buffered(vec![0u8; 100]), Codec::H264, nals).unwrap()
    }

    #[test]
    fn aligned_cut_in_is_pure_streamcopy() {
        let idx = ten_frame_index();
        let kl = KeepList::new(vec![KeepRange { start_frame: 0, end_frame: 4 }]).unwrap();
        let entries = plan(&idx, &kl);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].needs_reencode_at_start);
        assert_eq!(entries[0].streamcopy_start, Some(0));
        assert_eq!(entries[0].streamcopy_end, Some(4));
        assert!(entries[0].reencode_start.is_none());
    }

    #[test]
    fn unaligned_cut_in_bridges_to_next_keyframe() {
        let idx = ten_frame_index();
        let kl = KeepList::new(vec![KeepRange { start_frame: 2, end_frame: 8 }]).unwrap();
        let entries = plan(&idx, &kl);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert!(e.needs_reencode_at_start);
        assert_eq!(e.reencode_start, Some(2));
        assert_eq!(e.reencode_end, Some(4));
        assert_eq!(e.streamcopy_start, Some(5));
        assert_eq!(e.streamcopy_end, Some(8));
    }

    #[test]
    fn keep_range_ending_before_next_keyframe_is_fully_reencoded() {
        let idx = ten_frame_index();
        let kl = KeepList::new(vec![KeepRange { start_frame: 2, end_frame: 3 }]).unwrap();
        let entries = plan(&idx, &kl);
        let e = &entries[0];
        assert!(e.needs_reencode_at_start);
        assert!(e.needs_reencode_at_end);
        assert_eq!(e.reencode_start, Some(2));
        assert_eq!(e.reencode_end, Some(3));
        assert!(e.streamcopy_start.is_none());
    }

    #[test]
    fn overlap_avoidance_shifts_second_segment_streamcopy_start() {
        let idx = ten_frame_index();
        // Both keep-pairs land in the same GOP region and both bridge to
        // frame 5's keyframe; the second segment's streamcopy must not
        // re-copy frame 5.
        let kl = KeepList::new(vec![
            KeepRange { start_frame: 1, end_frame: 6 },
            KeepRange { start_frame: 7, end_frame: 8 },
        ])
        .unwrap();
        let entries = plan(&idx, &kl);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].streamcopy_start, Some(5));
        assert_eq!(entries[0].streamcopy_end, Some(6));
        // entries[1] starts at 7, already past the first segment's
        // streamcopy_end of 6, so no adjustment is needed here; this
        // exercises the non-overlapping path.
        assert_eq!(entries[1].streamcopy_start, Some(7));
    }

    #[test]
    fn out_of_range_keep_pair_is_dropped_not_fatal() {
        let idx = ten_frame_index();
        let kl = KeepList::new(vec![KeepRange { start_frame: 20, end_frame: 25 }]).unwrap();
        let entries = plan(&idx, &kl);
        assert!(entries.is_empty());
    }

    #[test]
    fn empty_keep_list_is_rejected_at_construction() {
        let err = KeepList::new(vec![]).unwrap_err();
        assert!(matches!(err, CutError::EmptyKeepList));
    }

    #[test]
    fn overlapping_keep_pairs_are_rejected_at_construction() {
        let err = KeepList::new(vec![
            KeepRange { start_frame: 0, end_frame: 5 },
            KeepRange { start_frame: 5, end_frame: 9 },
        ])
        .unwrap_err();
        assert!(matches!(err, CutError::InvalidKeepList { .. }));
    }
}
