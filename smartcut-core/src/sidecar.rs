//! Info-sidecar reader (spec.md MODULE L): a key/value text file that may
//! supply frame-rate, A/V offset, and the audio-track list when the
//! elementary stream itself carries no timing metadata.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::CutError;

lazy_static! {
    static ref AUDIO_KEY: Regex = Regex::new(r"^audio_(\d+)_(file|codec)$").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct AudioTrackInfo {
    pub file: Option<PathBuf>,
    pub codec: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SidecarInfo {
    pub frame_rate: Option<f64>,
    pub av_offset_ms: Option<i64>,
    pub audio_tracks: Vec<AudioTrackInfo>,
    pub extra: BTreeMap<String, String>,
}

/// Locates the sidecar for `video_path` by stripping a trailing `_video`
/// suffix from the basename (if present) before appending `.info`, the
/// same lookup `TTESInfo::findInfoFile` performs — not a bare extension
/// swap, since the source names its elementary streams `foo_video.264`
/// alongside `foo.info`.
pub fn sidecar_path_for(video_path: &Path) -> PathBuf {
    let stem = video_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = stem.strip_suffix("_video").unwrap_or(&stem).to_string();
    video_path.with_file_name(format!("{}.info", stem))
}

/// Parses `path` as `key=value` lines; blank lines and lines beginning
/// with `#` or `[` are ignored. Unrecognised keys are preserved in
/// `extra` but otherwise unused by the core.
pub fn parse_sidecar(path: &Path) -> Result<SidecarInfo, CutError> {
    let content = fs::read_to_string(path).map_err(|e| CutError::io(path, e))?;
    let mut info = SidecarInfo::default();
    let mut tracks: BTreeMap<usize, AudioTrackInfo> = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log::warn!("sidecar {:?}: ignoring malformed line {:?}", path, line);
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == "frame_rate" {
            info.frame_rate = value.parse().ok();
        } else if key == "av_offset_ms" {
            info.av_offset_ms = value.parse().ok();
        } else if let Some(caps) = AUDIO_KEY.captures(key) {
            let n: usize = caps[1].parse().expect("regex guarantees digits");
            let track = tracks.entry(n).or_default();
            match &caps[2] {
                "file" => track.file = Some(PathBuf::from(value)),
                "codec" => track.codec = Some(value.to_string()),
                _ => unreachable!(),
            }
        } else {
            info.extra.insert(key.to_string(), value.to_string());
        }
    }

    info.audio_tracks = tracks.into_values().collect();
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_video_suffix_before_appending_info() {
        let p = sidecar_path_for(Path::new("/media/show_video.264"));
        assert_eq!(p, Path::new("/media/show.info"));
    }

    #[test]
    fn leaves_basename_alone_when_no_video_suffix() {
        let p = sidecar_path_for(Path::new("/media/show.264"));
        assert_eq!(p, Path::new("/media/show.info"));
    }

    #[test]
    fn parses_known_keys_and_preserves_unknown_ones() {
        let text = "\
# comment\n\
[section]\n\
frame_rate=23.976\n\
av_offset_ms=-120\n\
audio_0_file=show.ac3\n\
audio_0_codec=ac3\n\
audio_1_file=show_commentary.aac\n\
audio_1_codec=aac\n\
future_key=xyz\n";
        let tmp = std::env::temp_dir().join(format!("smartcut-sidecar-test-{}.info", std::process::id()));
        fs::write(&tmp, text).unwrap();
        let info = parse_sidecar(&tmp).unwrap();
        fs::remove_file(&tmp).ok();

        assert_eq!(info.frame_rate, Some(23.976));
        assert_eq!(info.av_offset_ms, Some(-120));
        assert_eq!(info.audio_tracks.len(), 2);
        assert_eq!(info.audio_tracks[0].file, Some(PathBuf::from("show.ac3")));
        assert_eq!(info.audio_tracks[0].codec, Some("ac3".to_string()));
        assert_eq!(info.audio_tracks[1].codec, Some("aac".to_string()));
        assert_eq!(info.extra.get("future_key"), Some(&"xyz".to_string()));
    }
}
