//! Codec-specific NAL classification.
//!
//! Dispatches on the closed `Codec` tag from `crate::nal` rather than
//! using a trait object — there is no value in a vtable when every call
//! site already knows the set of codecs (spec.md 9's "Dynamic dispatch
//! replaced by variants").

pub mod h264;
pub mod h265;

use crate::error::CutError;
use crate::nal::{Codec, NalUnit};

pub fn classify(payload: &[u8], codec: Codec, nal_index: usize) -> Result<NalUnit, CutError> {
    match codec {
        Codec::H264 => h264::classify(payload, nal_index),
        Codec::H265 => h265::classify(payload, nal_index),
    }
}
