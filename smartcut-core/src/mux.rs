//! Muxer driver (spec.md MODULE K): builds the argument vector for an
//! external Matroska muxer and invokes it through the shared `proc`
//! module.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::CutError;
use crate::proc::{self, ProcOutput};

const MUX_TIMEOUT: Duration = Duration::from_secs(10 * 60);

lazy_static! {
    static ref LANGUAGE_SUFFIX: Regex = Regex::new(r"_([a-z]{3})(?:_\d+)?$").unwrap();
}

pub struct AudioTrackSpec {
    pub path: PathBuf,
    /// ISO-639-2/B language tag. Falls back to the filename regex when
    /// the caller doesn't provide an explicit override.
    pub language: String,
}

pub struct MuxInvocation {
    pub output: PathBuf,
    pub title: String,
    pub video_path: PathBuf,
    pub frame_rate: f64,
    pub audio_tracks: Vec<AudioTrackSpec>,
    pub av_offset_ms: i64,
    pub chapter_file: Option<PathBuf>,
}

impl MuxInvocation {
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-o".to_string(), self.output.display().to_string(), "--title".to_string(), self.title.clone()];

        let default_duration_ns = (1_000_000_000f64 / self.frame_rate).round() as i64;
        args.push("--default-duration".to_string());
        args.push(format!("0:{}ns", default_duration_ns));
        args.push(self.video_path.display().to_string());

        for track in &self.audio_tracks {
            args.push("--language".to_string());
            args.push(format!("0:{}", track.language));
            args.push("--sync".to_string());
            // The muxer's sync option is "delay applied to this track", the
            // inverse sign of the semantic "audio is later than video".
            args.push(format!("0:{}", -self.av_offset_ms));
            args.push(track.path.display().to_string());
        }

        if let Some(chapters) = &self.chapter_file {
            args.push("--chapters".to_string());
            args.push(chapters.display().to_string());
        }

        args
    }
}

/// Default ISO-639-2/B language for an audio file from its filename, via
/// the `_xxx` (or `_xxx_N`) suffix convention; `None` if it doesn't match.
pub fn default_language_for(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    LANGUAGE_SUFFIX.captures(stem).map(|c| c[1].to_string())
}

/// VDR's `#XX` Windows-1252 hex-escape and `_`-as-space title convention.
/// The 0x80-0x9F Windows-1252 remaps (smart quotes, the Euro sign, etc.)
/// aren't special-cased; titles in practice stay in the 7-bit/Latin-1 range.
pub fn deescape_title(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '#' && i + 2 < chars.len() && chars[i + 1].is_ascii_hexdigit() && chars[i + 2].is_ascii_hexdigit() {
            let hex: String = chars[i + 1..=i + 2].iter().collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                out.push(byte as char);
                i += 3;
                continue;
            }
        }
        out.push(if chars[i] == '_' { ' ' } else { chars[i] });
        i += 1;
    }
    out
}

pub fn run_mux(muxer_binary: &str, invocation: &MuxInvocation) -> Result<ProcOutput, CutError> {
    let output = proc::run(muxer_binary, &invocation.build_args(), MUX_TIMEOUT)?;
    proc::check_mux_status(&output)?;
    Ok(output)
}
