//! H.264/AVC NAL header and slice-header parsing.
//!
//! NAL type codes per ISO/IEC 14496-10 Table 7-1, the same table
//! `rtsp/src/client/h264.rs` keeps as `NAL_TYPES` for its RTP depacketizer
//! (here we only need the handful of codes that matter for Smart Cut, not
//! the full descriptive table).

use crate::bits::{strip_emulation_prevention, BitReader};
use crate::error::CutError;
use crate::nal::{NalUnit, SliceInfo, SliceType};

pub const NAL_SLICE: u8 = 1;
pub const NAL_SLICE_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;
pub const NAL_FILLER: u8 = 12;

pub fn classify(payload: &[u8], nal_index: usize) -> Result<NalUnit, CutError> {
    if payload.is_empty() {
        return Err(CutError::bitstream(nal_index, "empty NAL payload"));
    }
    let header = payload[0];
    let nal_ref_idc = (header >> 5) & 0x03;
    let nal_type = header & 0x1F;

    let mut nal = NalUnit {
        file_offset: 0,
        payload_offset: 0,
        size: 0,
        nal_type,
        nuh_layer_id: 0,
        nal_ref_idc,
        temporal_id: 0,
        is_slice: false,
        is_sps: false,
        is_pps: false,
        is_vps: false,
        is_sei: false,
        is_aud: false,
        is_filler: false,
        slice: None,
    };

    match nal_type {
        NAL_SLICE | NAL_SLICE_IDR => {
            nal.is_slice = true;
            nal.slice = Some(parse_slice_header(payload, nal_type == NAL_SLICE_IDR, nal_index)?);
        }
        NAL_SEI => nal.is_sei = true,
        NAL_SPS => nal.is_sps = true,
        NAL_PPS => nal.is_pps = true,
        NAL_AUD => nal.is_aud = true,
        NAL_FILLER => nal.is_filler = true,
        _ => {}
    }

    Ok(nal)
}

fn parse_slice_header(payload: &[u8], is_idr_nal: bool, nal_index: usize) -> Result<SliceInfo, CutError> {
    // Emulation prevention can fall inside the first few bytes of a slice
    // header on pathological (very small first_mb_in_slice) streams; strip
    // it before reading bits, as spec.md 4.A requires.
    let unescaped = strip_emulation_prevention(&payload[1..]);
    let mut r = BitReader::new(&unescaped, nal_index);

    let _first_mb_in_slice = r.read_ue()?;
    let raw_slice_type = r.read_ue()?;
    let normalized = raw_slice_type % 5;
    let slice_type = match normalized {
        0 => SliceType::P,
        1 => SliceType::B,
        2 => SliceType::I,
        3 => SliceType::P, // SP: treated as P for Smart Cut purposes.
        4 => SliceType::I, // SI: treated as I for Smart Cut purposes.
        _ => unreachable!("x % 5 < 5"),
    };
    let pps_id = r.read_ue()?;

    let is_keyframe = is_idr_nal || slice_type == SliceType::I;
    Ok(SliceInfo {
        slice_type,
        // first_mb_in_slice == 0 means this is the first slice of the picture.
        first_in_picture: _first_mb_in_slice == 0,
        pps_id,
        is_keyframe,
        is_idr: is_idr_nal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_idr_i_slice() {
        // header=0x65 (type 5, IDR); first_mb_in_slice=0 ("1"), slice_type=ue -> 2 (I) ("011"),
        // pps_id=0 ("1"). Bits: 1 011 1 -> pad to byte 0b1011_1000 = 0xB8.
        let payload = [0x65u8, 0xB8];
        let nal = classify(&payload, 0).unwrap();
        assert!(nal.is_slice);
        let slice = nal.slice.unwrap();
        assert!(slice.is_idr);
        assert!(slice.is_keyframe);
        assert_eq!(slice.slice_type, SliceType::I);
        assert!(slice.first_in_picture);
        assert_eq!(slice.pps_id, 0);
    }

    #[test]
    fn classifies_non_idr_p_slice() {
        // header=0x41 (type 1, non-IDR); first_mb=0 ("1"), slice_type=ue->0 (P) ("1"), pps_id=0 ("1")
        // Bits: 1 1 1 -> 0b1110_0000 = 0xE0.
        let payload = [0x41u8, 0xE0];
        let nal = classify(&payload, 0).unwrap();
        let slice = nal.slice.unwrap();
        assert!(!slice.is_idr);
        assert!(!slice.is_keyframe);
        assert_eq!(slice.slice_type, SliceType::P);
    }

    #[test]
    fn classifies_sps_pps_aud() {
        assert!(classify(&[0x67, 0x42], 0).unwrap().is_sps);
        assert!(classify(&[0x68, 0xCE], 0).unwrap().is_pps);
        assert!(classify(&[0x09, 0xF0], 0).unwrap().is_aud);
    }

    #[test]
    fn open_gop_i_slice_is_keyframe_but_not_idr() {
        // header=0x41 (type 1, non-IDR) carrying an I slice (slice_type=2).
        // Bits: first_mb=0 ("1"), slice_type=ue->2 ("011"), pps_id=0 ("1") -> 0b1011_1000 = 0xB8.
        let payload = [0x41u8, 0xB8];
        let nal = classify(&payload, 0).unwrap();
        let slice = nal.slice.unwrap();
        assert!(slice.is_keyframe);
        assert!(!slice.is_idr);
    }
}
