//! Top-level cut-job orchestration: plans, reencodes, and assembles one
//! video elementary stream, tracking running totals and firing an
//! optional progress callback after each segment.
//!
//! Mirrors `TTESSmartCut` in the original source: `mFramesStreamCopied`,
//! `mFramesReencoded`, and `mBytesWritten` become [`CutStats`]; its
//! `progressChanged` signal becomes the `progress` callback parameter.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::assemble;
use crate::config::SessionConfig;
use crate::error::CutError;
use crate::index::StreamIndex;
use crate::pipeline::{self, DecoderContext, EncoderQuality, VideoDecoder, VideoEncoder};
use crate::plan::{self, KeepList};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CutStats {
    pub segments: usize,
    pub frames_streamcopied: usize,
    pub frames_reencoded: usize,
    pub frames_starved: usize,
    pub bytes_written: u64,
}

#[derive(Debug, Clone)]
pub struct CutProgress {
    pub segment_index: usize,
    pub segment_count: usize,
    pub percent_complete: f64,
    pub phase: &'static str,
}

/// A cut job's cooperative abort flag (spec.md §5): checked at each
/// segment boundary, never forcefully kills a thread.
#[derive(Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        AbortHandle(Arc::new(AtomicBool::new(false)))
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CutJob {
    pub config: SessionConfig,
    pub abort: AbortHandle,
}

impl CutJob {
    pub fn new(config: SessionConfig) -> Self {
        CutJob { config, abort: AbortHandle::new() }
    }

    /// Plans `keep_list` against `index`, reencodes each segment's bridge
    /// span through `decoder`/`new_encoder`, and writes the assembled
    /// output to `out`. `progress`, if given, is called once per segment
    /// after that segment's bytes are ready to write.
    pub fn run<D, F, E, W>(
        &self,
        index: &StreamIndex,
        keep_list: &KeepList,
        decoder: &mut D,
        mut new_encoder: F,
        out: &mut W,
        mut progress: Option<&mut dyn FnMut(CutProgress)>,
    ) -> Result<CutStats, CutError>
    where
        D: VideoDecoder,
        F: FnMut(&DecoderContext, f64, EncoderQuality) -> Result<E, CutError>,
        E: VideoEncoder,
        W: Write,
    {
        if index.frame_count() == 0 {
            return Err(CutError::NoStream);
        }

        let entries = plan::plan(index, keep_list);
        let frame_rate = self.config.resolved_frame_rate(None);
        let quality = EncoderQuality { crf: self.config.resolved_crf(index.codec) };

        let mut stats = CutStats::default();
        let mut reencoded_packets = Vec::with_capacity(entries.len());

        for (i, entry) in entries.iter().enumerate() {
            if self.abort.is_aborted() {
                return Err(CutError::Aborted);
            }

            let packets = match (entry.reencode_start, entry.reencode_end) {
                (Some(rs), Some(re)) => {
                    let outcome =
                        pipeline::reencode_segment(index, decoder, rs, re, frame_rate, quality, &mut new_encoder)?;
                    stats.frames_reencoded += re - rs + 1;
                    if let Some((_, got)) = outcome.starved {
                        stats.frames_starved += (re - rs + 1) - got;
                    }
                    outcome.packets
                }
                _ => Vec::new(),
            };

            if let (Some(ss), Some(se)) = (entry.streamcopy_start, entry.streamcopy_end) {
                stats.frames_streamcopied += se - ss + 1;
            }

            reencoded_packets.push(packets);
            stats.segments += 1;

            if let Some(cb) = progress.as_deref_mut() {
                cb(CutProgress {
                    segment_index: i,
                    segment_count: entries.len(),
                    percent_complete: 100.0 * (i + 1) as f64 / entries.len().max(1) as f64,
                    phase: "segment",
                });
            }
        }

        let mut counting = CountingWriter { inner: out, count: 0 };
        assemble::assemble(index, &entries, &reencoded_packets, &mut counting)?;
        stats.bytes_written = counting.count;

        log::info!(
            "cut job complete: {} segments, {} frames streamcopied, {} reencoded, {} bytes written",
            stats.segments,
            stats.frames_streamcopied,
            stats.frames_reencoded,
            stats.bytes_written
        );

        Ok(stats)
    }
}

struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::{Backing, Codec, NalUnit, SliceInfo, SliceType};
    use crate::pipeline::null_codec::{NullDecoder, NullEncoder};
    use crate::plan::KeepRange;

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
    fn aligned_job_never_touches_the_decoder_and_reports_full_streamcopy() {
        let idx = ten_frame_index();
        let kl = KeepList::new(vec![KeepRange { start_frame: 0, end_frame: 4 }]).unwrap();
        let job = CutJob::new(SessionConfig::default());
        let mut decoder = NullDecoder::default();
        let mut out = Vec::new();
        let stats = job
            .run(&idx, &kl, &mut decoder, |ctx, rate, q| NullEncoder::open(ctx, rate, q), &mut out, None)
            .unwrap();
        assert_eq!(stats.frames_streamcopied, 5);
        assert_eq!(stats.frames_reencoded, 0);
        assert_eq!(stats.bytes_written, out.len() as u64);
    }

    #[test]
    fn progress_callback_fires_once_per_segment() {
        let idx = ten_frame_index();
        let kl = KeepList::new(vec![
            KeepRange { start_frame: 0, end_frame: 2 },
            KeepRange { start_frame: 6, end_frame: 9 },
        ])
        .unwrap();
        let job = CutJob::new(SessionConfig::default());
        let mut decoder = NullDecoder::default();
        let mut out = Vec::new();
        let mut calls = Vec::new();
        let mut record = |p: CutProgress| calls.push(p.segment_index);
        job.run(&idx, &kl, &mut decoder, |ctx, rate, q| NullEncoder::open(ctx, rate, q), &mut out, Some(&mut record))
            .unwrap();
        assert_eq!(calls, vec![0, 1]);
    }

    #[test]
    fn aborted_job_stops_before_the_next_segment() {
        let idx = ten_frame_index();
        let kl = KeepList::new(vec![
            KeepRange { start_frame: 0, end_frame: 2 },
            KeepRange { start_frame: 6, end_frame: 9 },
        ])
        .unwrap();
        let job = CutJob::new(SessionConfig::default());
        job.abort.abort();
        let mut decoder = NullDecoder::default();
        let mut out = Vec::new();
        let err = job
            .run(&idx, &kl, &mut decoder, |ctx, rate, q| NullEncoder::open(ctx, rate, q), &mut out, None)
            .unwrap_err();
        assert!(matches!(err, CutError::Aborted));
    }

    #[test]
    fn empty_stream_is_rejected_before_planning() {
        let idx = StreamIndex::from_nals(Backing::Buffered(Vec::new()), Codec::H264, Vec::new()).unwrap();
        let kl = KeepList::new(vec![KeepRange { start_frame: 0, end_frame: 0 }]).unwrap();
        let job = CutJob::new(SessionConfig::default());
        let mut decoder = NullDecoder::default();
        let mut out = Vec::new();
        let err = job
            .run(&idx, &kl, &mut decoder, |ctx, rate, q| NullEncoder::open(ctx, rate, q), &mut out, None)
            .unwrap_err();
        assert!(matches!(err, CutError::NoStream));
    }
}
