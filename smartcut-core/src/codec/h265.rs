//! H.265/HEVC NAL header and slice-header parsing.
//!
//! NAL type ranges per ISO/IEC 23008-2 Table 7-1. Slice-type
//! determination for dependent slice segments falls back to a NAL-type
//! heuristic because the core does not maintain PPS state (see spec.md
//! 4.C); this is an accepted approximation, not a bug, per spec.md 9's
//! open question about dependent-slice classification.

use crate::bits::{strip_emulation_prevention, BitReader};
use crate::error::CutError;
use crate::nal::{NalUnit, SliceInfo, SliceType};

pub const BLA_W_LP: u8 = 16;
pub const BLA_W_RADL: u8 = 17;
pub const BLA_N_LP: u8 = 18;
pub const IDR_W_RADL: u8 = 19;
pub const IDR_N_LP: u8 = 20;
pub const CRA_NUT: u8 = 21;
pub const VPS_NUT: u8 = 32;
pub const SPS_NUT: u8 = 33;
pub const PPS_NUT: u8 = 34;
pub const AUD_NUT: u8 = 35;
pub const FD_NUT: u8 = 38;
pub const PREFIX_SEI_NUT: u8 = 39;
pub const SUFFIX_SEI_NUT: u8 = 40;

const TRAIL_N: u8 = 0;
const TSA_N: u8 = 2;
const STSA_N: u8 = 4;
const RADL_N: u8 = 6;
const RASL_N: u8 = 8;

fn is_rap(nal_type: u8) -> bool {
    matches!(nal_type, BLA_W_LP..=CRA_NUT)
}

fn is_keyframe(nal_type: u8) -> bool {
    is_rap(nal_type)
}

fn is_strict_idr(nal_type: u8) -> bool {
    matches!(nal_type, IDR_W_RADL | IDR_N_LP)
}

pub fn classify(payload: &[u8], nal_index: usize) -> Result<NalUnit, CutError> {
    if payload.len() < 2 {
        return Err(CutError::bitstream(nal_index, "H.265 NAL payload shorter than 2-byte header"));
    }
    let byte0 = payload[0];
    let byte1 = payload[1];
    let nal_type = (byte0 >> 1) & 0x3F;
    let nuh_layer_id = ((byte0 & 0x01) << 5) | ((byte1 >> 3) & 0x1F);
    let temporal_id = (byte1 & 0x07).wrapping_sub(1);

    let mut nal = NalUnit {
        file_offset: 0,
        payload_offset: 0,
        size: 0,
        nal_type,
        nuh_layer_id,
        nal_ref_idc: 0,
        temporal_id,
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
        0..=31 => {
            nal.is_slice = true;
            nal.slice = Some(parse_slice_header(payload, nal_type, nal_index)?);
        }
        VPS_NUT => nal.is_vps = true,
        SPS_NUT => nal.is_sps = true,
        PPS_NUT => nal.is_pps = true,
        AUD_NUT => nal.is_aud = true,
        FD_NUT => nal.is_filler = true,
        PREFIX_SEI_NUT | SUFFIX_SEI_NUT => nal.is_sei = true,
        _ => {}
    }

    Ok(nal)
}

fn parse_slice_header(payload: &[u8], nal_type: u8, nal_index: usize) -> Result<SliceInfo, CutError> {
    let unescaped = strip_emulation_prevention(&payload[2..]);
    let mut r = BitReader::new(&unescaped, nal_index);

    let first_in_picture = r.read_flag()?;
    if is_rap(nal_type) {
        let _no_output_of_prior_pics_flag = r.read_flag()?;
    }
    let pps_id = r.read_ue()?;

    let slice_type = if first_in_picture {
        match r.read_ue()? {
            0 => SliceType::B,
            1 => SliceType::P,
            2 => SliceType::I,
            _ => nal_type_heuristic(nal_type),
        }
    } else {
        nal_type_heuristic(nal_type)
    };

    Ok(SliceInfo {
        slice_type,
        first_in_picture,
        pps_id,
        is_keyframe: is_keyframe(nal_type),
        is_idr: is_strict_idr(nal_type),
    })
}

fn nal_type_heuristic(nal_type: u8) -> SliceType {
    if is_rap(nal_type) {
        SliceType::I
    } else if matches!(nal_type, RASL_N | RADL_N | TRAIL_N | TSA_N | STSA_N)
        || matches!(nal_type, n if n == RASL_N + 1 || n == RADL_N + 1 || n == TRAIL_N + 1 || n == TSA_N + 1 || n == STSA_N + 1)
    {
        SliceType::B
    } else {
        SliceType::P
    }
}
