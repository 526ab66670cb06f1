//! `CodecOps`: the generic capability set shared between the H.264 and
//! H.265 code paths (spec §9, "deep base-class sharing" design note,
//! resolved by SPEC_FULL §4.10). Grounds the profile/level/sentinel
//! conversions that the teacher scatters across `vulkan_video.rs` and
//! `wrappers/parameter_sets.rs` (`H264Profile::to_profile_idc`,
//! `h264_level_idc_to_vk`) into one trait, implemented once per codec.

use crate::types::{ChromaFormat, SliceType};

/// Codec-sanctioned "no reference picture" sentinel (spec §9 open
/// question 2). Both H.264 and H.265 Vulkan Video Std headers define
/// `STD_VIDEO_H26x_NO_REFERENCE_PICTURE` as `0xFF`; this constant is never
/// invented independently of that value (see DESIGN.md open-question
/// log).
pub const NO_REFERENCE_PICTURE: u8 = 0xFF;

/// Capability set distinguishing the H.264 and H.265 encode paths. Every
/// component that needs to branch on codec (`GopPlanner`, `DpbManager`,
/// `PictureBuilder`, `LevelSelector`) is generic over `C: CodecOps`
/// instead of matching on `Codec` directly.
pub trait CodecOps: Copy + Clone + std::fmt::Debug {
    /// Opaque standard slice-type code (e.g. `StdVideoH264SliceType`).
    type StdSliceType: Copy;
    /// Opaque standard picture-type code (e.g. `StdVideoH264PictureType`).
    type StdPicType: Copy;

    fn name() -> &'static str;

    fn std_slice_type(t: SliceType) -> Self::StdSliceType;

    /// Primary picture type, combining slice type and reference-ness, as
    /// the codec header requires (IDR vs. I, for instance, are distinct
    /// primary pic types even though the slice type is the same).
    fn std_pic_type(t: SliceType, is_reference: bool, is_idr: bool) -> Self::StdPicType;

    fn chroma_from_format(fmt: ChromaFormat) -> u32;

    fn slice_type_name(t: SliceType) -> &'static str {
        t.name()
    }

    /// Maximum number of reference frames this codec's header format can
    /// address (16 for both H.264 and H.265).
    fn max_num_reference() -> u32 {
        16
    }

    fn no_reference_picture_sentinel() -> u8 {
        NO_REFERENCE_PICTURE
    }

    /// B-frame support is a Non-goal for H.264 in this spec (spec §1);
    /// `GopPlanner::plan` rejects a non-zero `num_bframes` for a codec
    /// where this returns `false` instead of silently clamping it.
    fn supports_b_frames() -> bool;

    /// End-of-list MMCO/ref-pic-list-modification opcode (opcode 3 in
    /// both H.264 and H.265, spec §6 "Bit-exact emission contracts").
    fn end_modification_opcode() -> u8 {
        3
    }

    /// `nal_unit_type` for a (prefix) SEI NAL, used by `BitstreamAssembler`
    /// when building the CEA-708 registered-user-data SEI (spec §4.7).
    fn sei_nal_unit_type() -> u8;

    /// `nal_unit_type` for a coded-slice NAL, used to populate
    /// `SliceHeaderInput::nal_type` (spec §6).
    fn slice_nal_unit_type(is_reference: bool, is_idr: bool) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H264Ops;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H265Ops;

impl CodecOps for H264Ops {
    type StdSliceType = u32;
    type StdPicType = u32;

    fn name() -> &'static str {
        "H264"
    }

    fn std_slice_type(t: SliceType) -> Self::StdSliceType {
        match t {
            SliceType::I => 2, // STD_VIDEO_H264_SLICE_TYPE_I
            SliceType::P => 0, // STD_VIDEO_H264_SLICE_TYPE_P
            SliceType::B => 1, // STD_VIDEO_H264_SLICE_TYPE_B
        }
    }

    fn std_pic_type(t: SliceType, _is_reference: bool, is_idr: bool) -> Self::StdPicType {
        if is_idr {
            return 0; // STD_VIDEO_H264_PICTURE_TYPE_IDR
        }
        match t {
            SliceType::I => 1, // STD_VIDEO_H264_PICTURE_TYPE_I
            SliceType::P => 2, // STD_VIDEO_H264_PICTURE_TYPE_P
            SliceType::B => 3, // STD_VIDEO_H264_PICTURE_TYPE_B
        }
    }

    fn chroma_from_format(fmt: ChromaFormat) -> u32 {
        match fmt {
            ChromaFormat::Yuv420 => 1, // STD_VIDEO_H264_CHROMA_FORMAT_IDC_420
            ChromaFormat::Yuv422 => 2,
            ChromaFormat::Yuv444 => 3,
        }
    }

    fn supports_b_frames() -> bool {
        // Non-goal per spec §1: "B-frame support for H.264 (the source
        // marks it as TODO)".
        false
    }

    fn sei_nal_unit_type() -> u8 {
        6 // NAL_UNIT_TYPE_SEI
    }

    fn slice_nal_unit_type(_is_reference: bool, is_idr: bool) -> u8 {
        // nal_ref_idc (outside nal_unit_type) carries the reference flag
        // for H.264; the slice nal_unit_type itself only distinguishes IDR.
        if is_idr { 5 } else { 1 }
    }
}

impl CodecOps for H265Ops {
    type StdSliceType = u32;
    type StdPicType = u32;

    fn name() -> &'static str {
        "H265"
    }

    fn std_slice_type(t: SliceType) -> Self::StdSliceType {
        match t {
            SliceType::I => 2, // STD_VIDEO_H265_SLICE_TYPE_I
            SliceType::P => 0, // STD_VIDEO_H265_SLICE_TYPE_P
            SliceType::B => 1, // STD_VIDEO_H265_SLICE_TYPE_B
        }
    }

    fn std_pic_type(t: SliceType, _is_reference: bool, is_idr: bool) -> Self::StdPicType {
        if is_idr {
            return 0; // STD_VIDEO_H265_PICTURE_TYPE_IDR
        }
        match t {
            SliceType::I => 1,
            SliceType::P => 2,
            SliceType::B => 3,
        }
    }

    fn chroma_from_format(fmt: ChromaFormat) -> u32 {
        match fmt {
            ChromaFormat::Yuv420 => 1,
            ChromaFormat::Yuv422 => 2,
            ChromaFormat::Yuv444 => 3,
        }
    }

    fn supports_b_frames() -> bool {
        true
    }

    fn sei_nal_unit_type() -> u8 {
        39 // NAL_UNIT_PREFIX_SEI
    }

    fn slice_nal_unit_type(is_reference: bool, is_idr: bool) -> u8 {
        if is_idr {
            19 // NAL_UNIT_CODED_SLICE_IDR_W_RADL
        } else if is_reference {
            1 // NAL_UNIT_CODED_SLICE_TRAIL_R
        } else {
            0 // NAL_UNIT_CODED_SLICE_TRAIL_N
        }
    }
}
