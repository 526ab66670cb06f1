//! `PictureBuilder` (spec §4.6): converts a `FrameRecord` + chosen
//! list0/list1 + current DPB slots into the concrete GPU-facing
//! descriptor set for one encode call.
//!
//! Grounded in `wrappers/parameter_sets.rs`'s `From` conversions that
//! build `StdVideoH264PictureInfo`/`StdVideoH264ReferenceInfo` from parsed
//! NAL fields, and in `vulkan_encoder.rs::encode`'s inline construction of
//! `VideoEncodeInfoKHR`/`VideoReferenceSlotInfoKHR` (generalized here from
//! IDR/P-only to the full list0/list1 + DPB-slot case).

use crate::codec_ops::{CodecOps, NO_REFERENCE_PICTURE};
use crate::dpb::{DpbManager, ReferenceLists};
use crate::interfaces::SliceHeaderInput;
use crate::ratecontrol::RateControlPlan;
use crate::types::{EncoderConfig, FrameRecord, GpuImageHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeaderInfo {
    pub first_mb: u32,
    pub weight_table_present: bool,
    pub cabac_init_idc: u8,
    pub disable_deblocking_filter_idc: u8,
    pub qp_delta: i32,
}

impl Default for SliceHeaderInfo {
    fn default() -> Self {
        Self {
            first_mb: 0,
            weight_table_present: true,
            cabac_init_idc: 0,
            disable_deblocking_filter_idc: 0,
            qp_delta: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PictureInfo<C: CodecOps> {
    pub idr_pic_flag: bool,
    pub is_reference: bool,
    pub seq_parameter_set_id: u8,
    pub pic_parameter_set_id: u8,
    pub primary_pic_type: C::StdPicType,
    pub frame_num: u32,
    pub pic_order_cnt: i32,
    /// Reference slot indices, padded to `ref_num_list0`/`ref_num_list1`
    /// with `NO_REFERENCE_PICTURE`.
    pub ref_list0: Vec<u8>,
    pub ref_list1: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControlLayerInfo {
    pub use_min_qp: bool,
    pub min_qp: u32,
    pub use_max_qp: bool,
    pub max_qp: u32,
    pub use_max_frame_size: bool,
    pub framerate_num: u32,
    pub framerate_den: u32,
}

/// `preferred_rate_control_flags` regular-GOP bit (spec §4.6).
pub const QUALITY_LEVEL_REGULAR_GOP_FLAG: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityLevelInfo {
    pub preferred_rate_control_flags: u32,
    pub preferred_constant_qp: (u32, u32, u32),
}

#[derive(Debug, Clone)]
pub struct DpbSlotInfo<C: CodecOps> {
    pub pic_type: C::StdPicType,
    pub poc: i32,
    pub temporal_id: u32,
    pub image_view: GpuImageHandle,
    pub slot_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeInfo {
    pub dst_buffer_offset: u64,
    pub dst_buffer_range: u64,
    pub src_picture: GpuImageHandle,
    pub setup_reference_slot: Option<u32>,
    pub reference_slot_count: u32,
    pub preceding_externally_encoded_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct PictureDescriptor<C: CodecOps> {
    pub slice_header: SliceHeaderInfo,
    pub picture_info: PictureInfo<C>,
    pub rate_control_layer: RateControlLayerInfo,
    pub rate_control: RateControlPlan,
    pub quality_level: QualityLevelInfo,
    pub dpb_slot: Option<DpbSlotInfo<C>>,
    pub encode_info: EncodeInfo,
}

pub struct PictureBuilder<C: CodecOps> {
    _marker: std::marker::PhantomData<C>,
}

impl<C: CodecOps> PictureBuilder<C> {
    /// Conservative single-frame output staging ceiling (spec §4.6).
    pub const STAGING_BUFFER_CEIL: u64 = 3 * 1024 * 1024;

    pub fn staging_buffer_size(min_bitstream_buffer_size_alignment: u64) -> u64 {
        let align = min_bitstream_buffer_size_alignment.max(1);
        Self::STAGING_BUFFER_CEIL.div_ceil(align) * align
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        cfg: &EncoderConfig,
        frame: &FrameRecord,
        lists: &ReferenceLists,
        dpb: &DpbManager<C>,
        setup_slot: Option<u32>,
        rate_control: RateControlPlan,
        staging_buffer_size: u64,
    ) -> PictureDescriptor<C> {
        let idr_pic_flag = frame.gop_index == 0;

        let ref_list0 = Self::pad_slots(lists.list0.iter().map(|&i| dpb.frame(i).dpb_slot_index), cfg.ref_num_list0);
        let ref_list1 = Self::pad_slots(lists.list1.iter().map(|&i| dpb.frame(i).dpb_slot_index), cfg.ref_num_list1);

        let picture_info = PictureInfo {
            idr_pic_flag,
            is_reference: frame.is_reference,
            seq_parameter_set_id: 0,
            pic_parameter_set_id: 0,
            primary_pic_type: C::std_pic_type(frame.slice_type, frame.is_reference, idr_pic_flag),
            frame_num: frame.frame_num,
            pic_order_cnt: frame.poc,
            ref_list0,
            ref_list1,
        };

        let rate_control_layer = RateControlLayerInfo {
            use_min_qp: true,
            min_qp: cfg.min_qp,
            use_max_qp: true,
            max_qp: cfg.max_qp,
            use_max_frame_size: false,
            framerate_num: cfg.framerate.num,
            framerate_den: cfg.framerate.den.get(),
        };

        let quality_level = QualityLevelInfo {
            preferred_rate_control_flags: QUALITY_LEVEL_REGULAR_GOP_FLAG,
            preferred_constant_qp: (cfg.qp_i, cfg.qp_p, cfg.qp_b),
        };

        let dpb_slot = frame.is_reference.then(|| DpbSlotInfo {
            pic_type: C::std_pic_type(frame.slice_type, frame.is_reference, idr_pic_flag),
            poc: frame.poc,
            temporal_id: 0,
            image_view: frame.input_image,
            slot_index: frame.dpb_slot_index.or(setup_slot).unwrap_or(0),
        });

        let encode_info = EncodeInfo {
            dst_buffer_offset: 0,
            dst_buffer_range: staging_buffer_size,
            src_picture: frame.input_image,
            setup_reference_slot: if frame.is_reference { setup_slot } else { None },
            reference_slot_count: (picture_info.ref_list0.len() + picture_info.ref_list1.len()) as u32,
            preceding_externally_encoded_bytes: 0,
        };

        PictureDescriptor {
            slice_header: SliceHeaderInfo::default(),
            picture_info,
            rate_control_layer,
            rate_control,
            quality_level,
            dpb_slot,
            encode_info,
        }
    }

    /// Builds the `SliceHeaderInput` for `CodecBitWriter::write_slice_header`
    /// from `frame`'s MMCO hint and `lists`' modification-op sequences
    /// (spec §6 "Bit-exact emission contracts"). Raw byte emission is the
    /// writer's job; constructing these op structures is this module's.
    pub fn slice_header_input<'a>(frame: &FrameRecord, lists: &'a ReferenceLists) -> SliceHeaderInput<'a> {
        let idr_pic_flag = frame.gop_index == 0;
        SliceHeaderInput {
            nal_type: C::slice_nal_unit_type(frame.is_reference, idr_pic_flag),
            is_reference: frame.is_reference,
            frame_num: frame.frame_num,
            poc: frame.poc,
            list0_mod_ops: &lists.list0_mod_ops,
            list1_mod_ops: &lists.list1_mod_ops,
            unused_reference_pic_num: frame.unused_reference_pic_num,
        }
    }

    fn pad_slots(slots: impl Iterator<Item = Option<u32>>, capacity: u32) -> Vec<u8> {
        let mut out: Vec<u8> = slots.map(|s| s.map(|v| v as u8).unwrap_or(NO_REFERENCE_PICTURE)).collect();
        out.resize(capacity as usize, NO_REFERENCE_PICTURE);
        out
    }
}
