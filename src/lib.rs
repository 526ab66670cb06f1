#![doc = include_str!("../README.md")]

mod bitstream;
mod codec_ops;
mod dpb;
mod error;
mod gop;
mod interfaces;
mod level;
mod picture;
mod ratecontrol;
mod recorder;
mod reorder;
mod session;
mod types;

pub use bitstream::{BitstreamAssembler, SessionHeaders};
pub use codec_ops::{CodecOps, H264Ops, H265Ops, NO_REFERENCE_PICTURE};
pub use dpb::{DpbManager, ReferenceLists};
pub use error::{ConfigError, EncoderError, GpuOpError, ProtocolError, ResourceError};
pub use gop::GopPlanner;
pub use interfaces::{
    CodecBitWriter, CommandBufferHandle, FenceHandle, GpuVideoBackend, ParamsHandle, QueryPoolHandle,
    RefListModOp, SessionCreateInfo, SessionHandle, SliceHeaderInput, StreamingSink, VideoCapabilities,
};
pub use level::{LevelSelector, SelectedLevel};
pub use picture::{
    DpbSlotInfo, EncodeInfo, PictureBuilder, PictureDescriptor, PictureInfo, QualityLevelInfo,
    RateControlLayerInfo, SliceHeaderInfo,
};
pub use ratecontrol::{EncodedSizeFeedback, RateControlLayer, RateControlMode, RateControlPlan, RateControlShim};
pub use recorder::{OperationRecorder, SyncPath};
pub use reorder::ReorderEngine;
pub use session::SessionOrchestrator;
pub use types::{
    ChromaFormat, Codec, DpbSlot, EncoderConfig, FrameIdx, FrameRecord, GopDerived, GopEntry, GpuImageHandle,
    Level, Rational, SliceType,
};
