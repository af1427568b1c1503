//! Decode/encode pipeline (spec.md MODULE G): bridges an unaligned cut-in
//! or cut-out by decoding a short span around it, trimming to the exact
//! kept frames in display order, and re-encoding with a forced keyframe
//! on the first output packet.
//!
//! The core never links a concrete codec library; `VideoDecoder` and
//! `VideoEncoder` are the seam, mirroring how `rtsp/src/client/mod.rs`
//! keeps RTP depacketization behind a small per-codec trait rather than
//! hard-coding one implementation (see `crate::codec::h264`'s sibling
//! traits in that crate).

use crate::assemble::parameter_set_preamble;
use crate::error::CutError;
use crate::index::StreamIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420p,
    Yuv420p10le,
    Yuv422p,
    Yuv444p,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ColorInfo {
    pub primaries: Option<u8>,
    pub transfer: Option<u8>,
    pub matrix: Option<u8>,
    pub full_range: bool,
}

/// Everything the encoder needs to match the decoder's notion of the
/// picture, propagated from the first decoded frame of a segment.
#[derive(Debug, Clone)]
pub struct DecoderContext {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub sample_aspect_ratio: Option<(u32, u32)>,
    pub color: ColorInfo,
    pub profile: u32,
    pub level: u32,
    pub bit_depth: u8,
}

#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub display_order: u64,
    pub context: DecoderContext,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub bytes: Vec<u8>,
    pub pts: u64,
}

/// Opaque decoder handle. One instance is allocated per cut job and reset
/// between segments (spec.md 3's `DecoderState` lifecycle).
pub trait VideoDecoder {
    /// Configure with the concatenation of all VPS/SPS/PPS payloads seen in
    /// the stream, in discovery order — not just the first of each, since
    /// a mid-stream PPS change is common and dropping later ones breaks
    /// decode.
    fn configure(&mut self, parameter_sets: &[u8]) -> Result<(), CutError>;
    /// Mandatory before starting a new segment, even from a fresh decoder.
    fn reset(&mut self) -> Result<(), CutError>;
    fn feed(&mut self, au_bytes: &[u8]) -> Result<(), CutError>;
    fn drain(&mut self) -> Result<Vec<DecodedFrame>, CutError>;
    fn flush_eos(&mut self) -> Result<Vec<DecodedFrame>, CutError>;
    /// Size of the decoder's display-reorder buffer, known only after the
    /// first successful decode; informational, used by the audio-sync hint.
    fn reorder_delay(&self) -> Option<usize>;
}

/// Opaque encoder handle. Re-created per reencode span; see spec.md 4.G's
/// rationale for never reusing one across segments.
pub trait VideoEncoder {
    fn open(context: &DecoderContext, frame_rate: f64, quality: EncoderQuality) -> Result<Self, CutError>
    where
        Self: Sized;
    fn send_frame(&mut self, frame: &DecodedFrame, pts: u64, force_keyframe: bool) -> Result<(), CutError>;
    fn drain(&mut self) -> Result<Vec<EncodedPacket>, CutError>;
    fn flush_eos(&mut self) -> Result<Vec<EncodedPacket>, CutError>;
}

#[derive(Debug, Clone, Copy)]
pub struct EncoderQuality {
    pub crf: u8,
}

/// Result of reencoding one span: the packets to splice into the output,
/// plus whether the decoder under-delivered (spec.md 7's `DecoderStarved`,
/// which is a warning, not a fatal error).
pub struct ReencodeOutcome {
    pub packets: Vec<EncodedPacket>,
    pub starved: Option<(usize, usize)>, // (expected, got)
}

/// Decodes `[r_start, r_end]` with lookahead, trims to the exact kept
/// frames in display order, and re-encodes them with the first frame
/// forced to a keyframe. `new_encoder` is given the first kept frame's
/// decoder context once it's known, matching spec.md 4.G step 7 ("once
/// the first output frame's dimensions and pixel format are known").
pub fn reencode_segment<D, F, E>(
    index: &StreamIndex,
    decoder: &mut D,
    r_start: usize,
    r_end: usize,
    frame_rate: f64,
    quality: EncoderQuality,
    mut new_encoder: F,
) -> Result<ReencodeOutcome, CutError>
where
    D: VideoDecoder,
    F: FnMut(&DecoderContext, f64, EncoderQuality) -> Result<E, CutError>,
    E: VideoEncoder,
{
    let frame_count = index.frame_count();
    let d_start = index.keyframe_at_or_before(r_start).unwrap_or(0);
    let overshoot_end = (r_end + 20).min(frame_count.saturating_sub(1));

    decoder.reset()?;
    decoder.configure(&parameter_set_preamble(index))?;

    let mut decoded = Vec::new();
    for au in d_start..=overshoot_end {
        decoder.feed(index.access_unit_bytes(au))?;
        decoded.extend(decoder.drain()?);
    }
    decoded.extend(decoder.flush_eos()?);

    let expected = r_end - r_start + 1;
    let skip = r_start - d_start;
    let kept: Vec<DecodedFrame> = decoded.into_iter().skip(skip).take(expected).collect();

    let starved = if kept.len() < expected {
        log::warn!(
            "decoder starved for segment starting at {}: expected {} frames, got {}",
            r_start,
            expected,
            kept.len()
        );
        Some((expected, kept.len()))
    } else {
        None
    };

    if kept.is_empty() {
        return Ok(ReencodeOutcome { packets: Vec::new(), starved });
    }

    let mut encoder = new_encoder(&kept[0].context, frame_rate, quality)?;
    let mut packets = Vec::new();
    for (i, frame) in kept.iter().enumerate() {
        encoder.send_frame(frame, i as u64, i == 0)?;
        packets.extend(encoder.drain()?);
    }
    packets.extend(encoder.flush_eos()?);

    Ok(ReencodeOutcome { packets, starved })
}

/// A deterministic decoder/encoder pair used in tests: the "decoder"
/// treats each fed AU as a one-byte frame, and the "encoder" echoes each
/// frame's bytes back out, tagging the first packet as a keyframe marker.
/// Exercises the pipeline's bookkeeping without a real codec library.
#[cfg(any(test, feature = "test-codec"))]
pub mod null_codec {
    use super::*;

    #[derive(Default)]
    pub struct NullDecoder {
        next_display_order: u64,
        reorder_delay: Option<usize>,
    }

    impl VideoDecoder for NullDecoder {
        fn configure(&mut self, _parameter_sets: &[u8]) -> Result<(), CutError> {
            Ok(())
        }

        fn reset(&mut self) -> Result<(), CutError> {
            self.next_display_order = 0;
            self.reorder_delay = Some(0);
            Ok(())
        }

        fn feed(&mut self, _au_bytes: &[u8]) -> Result<(), CutError> {
            Ok(())
        }

        fn drain(&mut self) -> Result<Vec<DecodedFrame>, CutError> {
            let order = self.next_display_order;
            self.next_display_order += 1;
            Ok(vec![DecodedFrame {
                display_order: order,
                context: DecoderContext {
                    width: 1920,
                    height: 1080,
                    pixel_format: PixelFormat::Yuv420p,
                    sample_aspect_ratio: Some((1, 1)),
                    color: ColorInfo::default(),
                    profile: 100,
                    level: 41,
                    bit_depth: 8,
                },
                data: vec![order as u8],
            }])
        }

        fn flush_eos(&mut self) -> Result<Vec<DecodedFrame>, CutError> {
            Ok(Vec::new())
        }

        fn reorder_delay(&self) -> Option<usize> {
            self.reorder_delay
        }
    }

    pub struct NullEncoder {
        pending: Vec<EncodedPacket>,
    }

    impl VideoEncoder for NullEncoder {
        fn open(_context: &DecoderContext, _frame_rate: f64, _quality: EncoderQuality) -> Result<Self, CutError> {
            Ok(NullEncoder { pending: Vec::new() })
        }

        fn send_frame(&mut self, frame: &DecodedFrame, pts: u64, _force_keyframe: bool) -> Result<(), CutError> {
            self.pending.push(EncodedPacket { bytes: frame.data.clone(), pts });
            Ok(())
        }

        fn drain(&mut self) -> Result<Vec<EncodedPacket>, CutError> {
            Ok(std::mem::take(&mut self.pending))
        }

        fn flush_eos(&mut self) -> Result<Vec<EncodedPacket>, CutError> {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::null_codec::{NullDecoder, NullEncoder};
    use super::*;
    use crate::nal::{Backing, Codec, NalUnit, SliceInfo, SliceType};

    fn slice_nal(offset: u64, is_idr: bool, is_keyframe: bool) -> NalUnit {
        NalUnit {
            file_offset: offset,
            payload_offset: offset,
            size: 1,
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
                first_in_picture: true,
                pps_id: 0,
                is_keyframe,
                is_idr,
            }),
        }
    }

    fn ten_frame_index() -> StreamIndex {
        let mut nals = Vec::new();
        for i in 0..10u64 {
            let is_key = i % 5 == 0;
            nals.push(slice_nal(i, is_key, is_key));
        }
        StreamIndex::from_nals(Backing::Buffered(vec![0u8; 10]), Codec::H264, nals).unwrap()
    }

    #[test]
    fn reencode_span_produces_one_packet_per_kept_frame() {
        let idx = ten_frame_index();
        let mut decoder = NullDecoder::default();
        let outcome = reencode_segment(
            &idx,
            &mut decoder,
            2,
            4,
            25.0,
            EncoderQuality { crf: 23 },
            |ctx, rate, q| NullEncoder::open(ctx, rate, q),
        )
        .unwrap();
        assert_eq!(outcome.packets.len(), 3);
        assert!(outcome.starved.is_none());
        assert_eq!(outcome.packets[0].pts, 0);
        assert_eq!(outcome.packets[2].pts, 2);
    }

    #[test]
    fn reencode_span_at_end_of_stream_clamps_overshoot() {
        let idx = ten_frame_index();
        let mut decoder = NullDecoder::default();
        let outcome = reencode_segment(
            &idx,
            &mut decoder,
            8,
            9,
            25.0,
            EncoderQuality { crf: 23 },
            |ctx, rate, q| NullEncoder::open(ctx, rate, q),
        )
        .unwrap();
        assert_eq!(outcome.packets.len(), 2);
    }
}
