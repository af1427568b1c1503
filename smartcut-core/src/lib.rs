//! Core library for Smart Cut: Annex-B H.264/H.265 stream parsing, cut
//! planning, and segment assembly without a full transcode.

pub mod assemble;
pub mod audio;
pub mod bits;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod job;
pub mod mux;
pub mod nal;
pub mod pipeline;
pub mod plan;
pub mod proc;
pub mod sidecar;
pub mod subtitle;

pub use config::SessionConfig;
pub use error::CutError;
pub use index::{AccessUnit, Gop, StreamIndex};
pub use job::{AbortHandle, CutJob, CutProgress, CutStats};
pub use nal::{Codec, NalUnit, SliceInfo, SliceType};
pub use pipeline::{DecodedFrame, DecoderContext, EncodedPacket, VideoDecoder, VideoEncoder};
pub use plan::{CutPlanEntry, KeepList, KeepRange};
