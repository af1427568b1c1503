//! Audio trimmer (spec.md MODULE I): translates a frame-indexed keep-list
//! into a time-domain trim+concat invocation of the external audio
//! encoder, re-encoding at a codec-matched bitrate for sample-accurate
//! boundaries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CutError;
use crate::plan::KeepList;
use crate::proc::{self, ProcOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Ac3,
    Mp2,
    Mp3,
    Aac,
}

impl AudioCodec {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ac3" => Some(AudioCodec::Ac3),
            "mp2" | "mpa" => Some(AudioCodec::Mp2),
            "mp3" => Some(AudioCodec::Mp3),
            "aac" => Some(AudioCodec::Aac),
            _ => None,
        }
    }

    /// Bitrate table from spec.md 4.I.
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            AudioCodec::Ac3 => 384,
            AudioCodec::Mp2 => 384,
            AudioCodec::Mp3 => 256,
            AudioCodec::Aac => 256,
        }
    }

    fn ffmpeg_encoder_name(&self) -> &'static str {
        match self {
            AudioCodec::Ac3 => "ac3",
            AudioCodec::Mp2 => "mp2",
            AudioCodec::Mp3 => "libmp3lame",
            AudioCodec::Aac => "aac",
        }
    }
}

/// A half-open `[start, end)` time range in seconds, already translated
/// from frame indices via `frame / frame_rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Builds the argument vector for an ffmpeg-shaped external encoder that
/// trims `segments` out of `input` and concatenates them into `output`,
/// re-encoding with `codec`.
pub struct AudioToolInvocation {
    pub input: PathBuf,
    pub output: PathBuf,
    pub codec: AudioCodec,
    pub segments: Vec<TimeRange>,
}

impl AudioToolInvocation {
    pub fn new(input: PathBuf, output: PathBuf, codec: AudioCodec, keep_list: &KeepList, frame_rate: f64) -> Self {
        let segments = keep_list
            .ranges()
            .iter()
            .map(|r| {
                let start_secs = r.start_frame as f64 / frame_rate;
                // Floor the cut-out time to millisecond precision so a
                // float-rounding hair above the frame boundary never pulls
                // in one extra sample's worth of the next (cut) frame.
                let raw_end = (r.end_frame + 1) as f64 / frame_rate;
                let end_secs = (raw_end * 1000.0).floor() / 1000.0;
                TimeRange { start_secs, end_secs }
            })
            .collect();
        AudioToolInvocation { input, output, codec, segments }
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-i".to_string(), self.input.display().to_string()];

        let mut filter = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            filter.push_str(&format!(
                "[0:a]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS[a{}];",
                seg.start_secs, seg.end_secs, i
            ));
        }
        for i in 0..self.segments.len() {
            filter.push_str(&format!("[a{}]", i));
        }
        filter.push_str(&format!("concat=n={}:v=0:a=1[aout]", self.segments.len()));

        args.push("-filter_complex".to_string());
        args.push(filter);
        args.push("-map".to_string());
        args.push("[aout]".to_string());
        args.push("-c:a".to_string());
        args.push(self.codec.ffmpeg_encoder_name().to_string());
        args.push("-b:a".to_string());
        args.push(format!("{}k", self.codec.bitrate_kbps()));
        args.push(self.output.display().to_string());
        args
    }
}

/// Runs the trim+concat for one audio track via the configured external
/// encoder binary. Stream-copy is deliberately not attempted (see
/// spec.md 4.I): common audio codecs lack sample-accurate seek without
/// frame reconstruction.
pub fn trim_audio_track(
    encoder_binary: &str,
    input: &Path,
    output: &Path,
    keep_list: &KeepList,
    frame_rate: f64,
    timeout: Duration,
) -> Result<ProcOutput, CutError> {
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("");
    let codec = AudioCodec::from_extension(ext)
        .ok_or_else(|| CutError::UnsupportedCodec { reason: format!("unrecognised audio extension {:?}", ext) })?;
    let invocation = AudioToolInvocation::new(input.to_path_buf(), output.to_path_buf(), codec, keep_list, frame_rate);
    proc::run(encoder_binary, &invocation.build_args(), timeout)
}
