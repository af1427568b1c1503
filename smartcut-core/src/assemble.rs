//! Output assembler (spec.md MODULE H): writes parameter sets where
//! needed, splices re-encoded packets and stream-copied access-unit byte
//! ranges in segment order, and inserts end-of-sequence NALs at joins so
//! the concatenation is a decoder-resettable bitstream.

use std::io::Write;
use std::path::PathBuf;

use crate::error::CutError;
use crate::index::StreamIndex;
use crate::nal::Codec;
use crate::pipeline::EncodedPacket;
use crate::plan::CutPlanEntry;

/// The end-of-sequence NAL inserted between segments: H.264 type 10,
/// H.265 type 36, each with a minimal single-byte (H.264) or two-byte
/// (H.265) header and a 4-byte start code.
pub fn end_of_sequence_nal(codec: Codec) -> Vec<u8> {
    match codec {
        // forbidden_zero=0, nal_ref_idc=0, nal_unit_type=10 -> 0b0000_1010.
        Codec::H264 => vec![0, 0, 0, 1, 0x0A],
        // byte0: forbidden_zero=0, nal_unit_type=36 -> (36 << 1) = 0x48.
        // byte1: nuh_layer_id=0, nuh_temporal_id_plus1=1.
        Codec::H265 => vec![0, 0, 0, 1, 0x48, 0x01],
    }
}

/// Every VPS, then every SPS, then every PPS NAL payload (raw bytes,
/// start code included), each group in discovery order. Reproduced at
/// the start of a pure stream-copy segment and again at a mixed
/// segment's reencode→streamcopy join, so a stream-copied IDR still
/// resolves the SPS/PPS ids it references.
pub fn parameter_set_preamble(index: &StreamIndex) -> Vec<u8> {
    let mut buf = Vec::new();
    for &i in &index.vps_nals {
        buf.extend_from_slice(nal_bytes(index, i));
    }
    for &i in &index.sps_nals {
        buf.extend_from_slice(nal_bytes(index, i));
    }
    for &i in &index.pps_nals {
        buf.extend_from_slice(nal_bytes(index, i));
    }
    buf
}

fn nal_bytes(index: &StreamIndex, nal_idx: usize) -> &[u8] {
    let nal = &index.nals[nal_idx];
    let start = nal.file_offset as usize;
    let end = start + nal.size as usize;
    &index.bytes()[start..end]
}

/// Writes the full cut output for `entries` in order. `reencoded_packets`
/// must be the same length as `entries`; entry `i`'s slot holds the
/// packets produced by [`crate::pipeline::reencode_segment`] for that
/// segment's reencode span, or an empty vector for a pure stream-copy
/// segment.
pub fn assemble<W: Write>(
    index: &StreamIndex,
    entries: &[CutPlanEntry],
    reencoded_packets: &[Vec<EncodedPacket>],
    out: &mut W,
) -> Result<(), CutError> {
    assert_eq!(entries.len(), reencoded_packets.len());

    for (i, entry) in entries.iter().enumerate() {
        let packets = &reencoded_packets[i];
        let has_reencode = entry.reencode_start.is_some();
        let has_streamcopy = entry.streamcopy_start.is_some();

        match (has_reencode, has_streamcopy) {
            (false, true) => {
                write_bytes(out, &parameter_set_preamble(index))?;
                write_streamcopy_span(index, entry.streamcopy_start.unwrap(), entry.streamcopy_end.unwrap(), out)?;
            }
            (true, false) => {
                write_packets(out, packets)?;
            }
            (true, true) => {
                write_packets(out, packets)?;
                write_bytes(out, &parameter_set_preamble(index))?;
                write_streamcopy_span(index, entry.streamcopy_start.unwrap(), entry.streamcopy_end.unwrap(), out)?;
            }
            (false, false) => {
                // PlanDegenerate entries are dropped before reaching the
                // assembler; a plan with neither span is a planner bug.
                unreachable!("cut plan entry with neither reencode nor streamcopy span");
            }
        }

        if i + 1 < entries.len() {
            write_bytes(out, &end_of_sequence_nal(index.codec))?;
        }
    }
    Ok(())
}

fn write_streamcopy_span<W: Write>(index: &StreamIndex, start: usize, end: usize, out: &mut W) -> Result<(), CutError> {
    let start_off = index.access_units[start].start_offset as usize;
    let end_off = index.access_units[end].end_offset as usize;
    write_bytes(out, &index.bytes()[start_off..end_off])
}

fn write_packets<W: Write>(out: &mut W, packets: &[EncodedPacket]) -> Result<(), CutError> {
    for p in packets {
        write_bytes(out, &p.bytes)?;
    }
    Ok(())
}

fn write_bytes<W: Write>(out: &mut W, bytes: &[u8]) -> Result<(), CutError> {
    out.write_all(bytes).map_err(|e| CutError::io(PathBuf::from("<cut output>"), e))
}
