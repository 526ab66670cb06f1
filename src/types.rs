//! Core data model (spec §3): `EncoderConfig`, `GopEntry`, `FrameRecord`,
//! `DpbSlot`, and the stable-index arena that breaks the FrameRecord ↔
//! DpbSlot cyclic reference (spec §9's "cyclic and mutable graphs" note).

use std::num::NonZeroU32;

use crate::ratecontrol::RateControlMode;

/// Codec this encoder instance targets. B-frame support is specified only
/// for H.265 (spec §1 Non-goals); `CodecOps::supports_b_frames` is the
/// generic hook `GopPlanner` consults instead of matching on this enum
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    H265,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
    Yuv420,
    Yuv422,
    Yuv444,
}

/// A fraction, e.g. a frame rate. Mirrors the teacher's `device::Rational`.
#[derive(Debug, Clone, Copy)]
pub struct Rational {
    pub num: u32,
    pub den: NonZeroU32,
}

impl Rational {
    pub fn new(num: u32, den: NonZeroU32) -> Self {
        Self { num, den }
    }

    /// `ceil(num / den)`, used for "one IDR per second" defaulting and for
    /// H.265's luma sample rate computation.
    pub fn ceil_div(self) -> u64 {
        (self.num as u64).div_ceil(self.den.get() as u64)
    }
}

/// An explicit level, or a request to have `LevelSelector` pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Auto,
    Explicit(u32),
}

/// Slice type assigned by `GopPlanner`/`ReorderEngine` to a `GopEntry` or
/// `FrameRecord` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
    B,
}

impl SliceType {
    pub fn name(self) -> &'static str {
        match self {
            SliceType::I => "I",
            SliceType::P => "P",
            SliceType::B => "B",
        }
    }
}

/// Immutable-after-start encoder configuration (spec §3). Constructed by
/// the caller and validated by `GopPlanner::plan`/`SessionOrchestrator::
/// start`. Carried by reference through the pipeline (spec §9's "Config
/// passed by reference" note) rather than duplicated into each component.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub codec: Codec,
    pub profile: &'static str,
    pub level: Level,
    pub width: NonZeroU32,
    pub height: NonZeroU32,
    pub framerate: Rational,
    pub chroma_format: ChromaFormat,
    pub bit_depth: u8,

    /// Frames between IDRs. 0 means "one IDR per second" (spec §4.1 step
    /// 1); resolved to a concrete value by `GopPlanner::plan` and clamped
    /// to `[1, 1024]`.
    pub idr_period: u32,

    pub num_bframes: u32,
    pub b_pyramid: bool,
    pub num_iframes: u32,
    /// DPB depth, `num_ref_frames ∈ [0, 16]`.
    pub num_ref_frames: u32,
    pub ref_num_list0: u32,
    pub ref_num_list1: u32,

    pub rate_control: RateControlMode,
    pub average_bitrate: u32,
    pub quality_level: u32,
    pub min_qp: u32,
    pub max_qp: u32,
    pub qp_i: u32,
    pub qp_p: u32,
    pub qp_b: u32,

    pub num_slices: u32,
    pub aud_insert: bool,
    pub cc_insert: bool,
}

impl Default for EncoderConfig {
    /// Defaults table, spec §6.
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            profile: "high",
            level: Level::Auto,
            width: NonZeroU32::new(1920).unwrap(),
            height: NonZeroU32::new(1080).unwrap(),
            framerate: Rational::new(30, NonZeroU32::new(1).unwrap()),
            chroma_format: ChromaFormat::Yuv420,
            bit_depth: 8,
            idr_period: 30,
            num_bframes: 0,
            b_pyramid: false,
            num_iframes: 0,
            num_ref_frames: 3,
            ref_num_list0: 1,
            ref_num_list1: 0,
            rate_control: RateControlMode::Default,
            average_bitrate: 10_000_000,
            quality_level: 0,
            min_qp: 1,
            max_qp: 51,
            qp_i: 26,
            qp_p: 26,
            qp_b: 26,
            num_slices: 1,
            aud_insert: false,
            cc_insert: false,
        }
    }
}

/// One precomputed row of the GOP table (spec §3, §4.1), indexed by
/// position within the GOP (`gop_index`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GopEntry {
    pub slice_type: SliceType,
    pub is_reference: bool,
    /// 0 = simple-B (non-pyramid or outermost pyramid level); higher is
    /// deeper in the b-pyramid. Meaningless for I/P.
    pub pyramid_level: u32,
    pub left_ref_poc_diff: i32,
    pub right_ref_poc_diff: i32,
}

impl GopEntry {
    pub fn intra(is_reference: bool) -> Self {
        Self {
            slice_type: SliceType::I,
            is_reference,
            pyramid_level: 0,
            left_ref_poc_diff: 0,
            right_ref_poc_diff: 0,
        }
    }

    pub fn inter_p() -> Self {
        Self {
            slice_type: SliceType::P,
            is_reference: true,
            pyramid_level: 0,
            left_ref_poc_diff: 0,
            right_ref_poc_diff: 0,
        }
    }
}

/// Derived constants recomputed alongside the GOP table whenever
/// `set_format` runs (spec §4.1 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GopDerived {
    pub log2_max_frame_num: u32,
    pub max_frame_num: u32,
    pub log2_max_pic_order_cnt: u32,
    pub max_pic_order_cnt: u32,
}

/// Stable arena index identifying a `FrameRecord`. Used instead of owned
/// values or `Rc<RefCell<_>>` to model the cyclic FrameRecord ↔ DpbSlot
/// graph (spec §9), mirroring the teacher's bitmask-indexed
/// `DecodedPicturesBuffer` slot addressing in `wrappers/video.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameIdx(pub u32);

/// Opaque handle to a GPU-resident YUV input image, supplied by the
/// out-of-scope streaming framework (spec §6's `acquire_input_image`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuImageHandle(pub u64);

/// A frame admitted to the encoder (spec §3).
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub input_image: GpuImageHandle,
    pub system_frame_number: u64,
    pub frame_num: u32,
    pub poc: i32,
    pub gop_index: u32,
    pub slice_type: SliceType,
    pub is_reference: bool,
    pub pyramid_level: u32,
    pub left_ref_poc_diff: i32,
    pub right_ref_poc_diff: i32,
    /// `None`, or the `difference_of_pic_nums_minus1` value for the MMCO
    /// opcode 1 (`ShortTermUnusedForRef`) this frame's admission emits
    /// when `DpbManager::evict` drops a non-head reference (spec §8
    /// scenario E).
    pub unused_reference_pic_num: Option<u32>,
    /// `None` until `DpbManager` assigns a slot, else `< max_dpb_slots`.
    pub dpb_slot_index: Option<u32>,
    pub output_buffer: Option<Vec<u8>>,
    /// Caller-supplied hint that forces this frame to an IDR regardless
    /// of its position in the GOP table (spec §8 scenario D).
    pub force_keyframe: bool,
    pub sync_point: bool,
    /// Raw CEA-708 caption triplets for this frame, if the streaming
    /// framework attached any (spec §4.7 cc_insert).
    pub cea708_metadata: Option<Vec<u8>>,
}

impl FrameRecord {
    pub fn new(input_image: GpuImageHandle, system_frame_number: u64) -> Self {
        Self {
            input_image,
            system_frame_number,
            frame_num: 0,
            poc: 0,
            gop_index: 0,
            slice_type: SliceType::P,
            is_reference: false,
            pyramid_level: 0,
            left_ref_poc_diff: 0,
            right_ref_poc_diff: 0,
            unused_reference_pic_num: None,
            dpb_slot_index: None,
            output_buffer: None,
            force_keyframe: false,
            sync_point: false,
            cea708_metadata: None,
        }
    }
}

/// Fixed-size DPB slot array entry (spec §3). `image_view` is an opaque
/// GPU handle, not the real `ash` view, so this module has no Vulkan
/// dependency.
#[derive(Debug, Clone, Copy)]
pub struct DpbSlot {
    pub occupied: bool,
    pub owner: Option<FrameIdx>,
    pub image_view: GpuImageHandle,
}

impl DpbSlot {
    pub const fn empty() -> Self {
        Self {
            occupied: false,
            owner: None,
            image_view: GpuImageHandle(0),
        }
    }
}
