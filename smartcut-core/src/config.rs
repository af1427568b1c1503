//! Session configuration (spec.md §9's "global mutable state" redesign
//! note): every cut-job-scoped choice is carried by value instead of
//! through process-global statics, so preview and final-cut jobs can run
//! side by side with independent settings.

use crate::nal::Codec;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quality factor (CRF), 0-51. `None` picks the codec default.
    pub crf: Option<u8>,
    pub preset: String,
    /// Encoder profile override; auto-upgraded at encode time if the
    /// decoded bit depth exceeds it (spec.md 4.G).
    pub profile_override: Option<String>,
    /// CLI/caller override; wins over a sidecar's `frame_rate` key.
    pub frame_rate_override: Option<f64>,
    pub chapter_interval_secs: Option<f64>,
    pub muxer_binary: String,
    pub audio_encoder_binary: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            crf: None,
            preset: "medium".to_string(),
            profile_override: None,
            frame_rate_override: None,
            chapter_interval_secs: None,
            muxer_binary: "mkvmerge".to_string(),
            audio_encoder_binary: "ffmpeg".to_string(),
        }
    }
}

impl SessionConfig {
    /// Default CRF per spec.md 3: H.264 18-23, H.265 20-28.
    pub fn resolved_crf(&self, codec: Codec) -> u8 {
        self.crf.unwrap_or(match codec {
            Codec::H264 => 20,
            Codec::H265 => 24,
        })
    }

    /// `frame_rate` precedence per spec.md 3: explicit override first,
    /// then the sidecar's value, then the 25.0 fps default. There is no
    /// container probe to consult in between — the input is an
    /// elementary stream by definition (spec.md 1's non-goals).
    pub fn resolved_frame_rate(&self, sidecar_frame_rate: Option<f64>) -> f64 {
        self.frame_rate_override.or(sidecar_frame_rate).unwrap_or(25.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_crf_follows_codec_specific_range() {
        let cfg = SessionConfig::default();
        assert!((18..=23).contains(&cfg.resolved_crf(Codec::H264)));
        assert!((20..=28).contains(&cfg.resolved_crf(Codec::H265)));
    }

    #[test]
    fn explicit_crf_wins_over_codec_default() {
        let cfg = SessionConfig { crf: Some(30), ..SessionConfig::default() };
        assert_eq!(cfg.resolved_crf(Codec::H264), 30);
    }

    #[test]
    fn frame_rate_precedence_prefers_override_then_sidecar_then_default() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.resolved_frame_rate(Some(23.976)), 23.976);
        assert_eq!(cfg.resolved_frame_rate(None), 25.0);

        let overridden = SessionConfig { frame_rate_override: Some(30.0), ..SessionConfig::default() };
        assert_eq!(overridden.resolved_frame_rate(Some(23.976)), 30.0);
    }
}
