//! External collaborator interfaces (spec §6), modeled as traits so the
//! core crate compiles and tests without linking a real Vulkan driver, a
//! real NAL-unit writer, or a real streaming framework.
//!
//! Grounded in the teacher's own public surface in `vulkan_video.rs` —
//! owned byte buffers, explicit `Result<T, E>` returns, no hidden global
//! state — generalized from "one concrete struct" to "a trait any GPU
//! backend/bit-writer/sink can implement".

use crate::error::{GpuOpError, ResourceError};
use crate::types::GpuImageHandle;

/// Opaque handles returned by `GpuVideoBackend`. The core never inspects
/// their contents; it only threads them back through later calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamsHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryPoolHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceHandle(pub u64);

/// Capabilities the orchestrator needs before it can create a session
/// (spec §4.4): max references, DPB slot count, supported std-headers
/// version, supported image formats for input and DPB usage.
#[derive(Debug, Clone)]
pub struct VideoCapabilities {
    pub max_dpb_slots: u32,
    pub max_active_references: u32,
    pub std_header_version: u32,
    pub picture_formats: Vec<u32>,
    pub reference_picture_formats: Vec<u32>,
}

/// Session creation parameters (spec §4.4's `start` argument tuple).
#[derive(Debug, Clone)]
pub struct SessionCreateInfo {
    pub max_coded_width: u32,
    pub max_coded_height: u32,
    pub picture_format: u32,
    pub reference_picture_format: u32,
    pub max_dpb_slots: u32,
    pub max_active_references: u32,
    pub std_header_version: u32,
}

/// The out-of-scope GPU video backend (spec §6): session lifecycle,
/// session-parameters, command-buffer recording primitives, query pool,
/// submit/wait, and format/capability enumeration.
pub trait GpuVideoBackend {
    fn query_capabilities(&self, profile: &'static str) -> Result<VideoCapabilities, GpuOpError>;

    fn create_session(&mut self, info: &SessionCreateInfo) -> Result<SessionHandle, GpuOpError>;
    fn destroy_session(&mut self, session: SessionHandle);

    fn create_params(&mut self, session: SessionHandle, sps_pps: &[u8]) -> Result<ParamsHandle, GpuOpError>;
    fn destroy_params(&mut self, params: ParamsHandle);
    fn get_encoded_params(&self, params: ParamsHandle, out: &mut [u8]) -> Result<usize, GpuOpError>;

    fn create_query_pool(&mut self, session: SessionHandle, capacity: u32) -> Result<QueryPoolHandle, GpuOpError>;
    fn reset_query_pool(&mut self, pool: QueryPoolHandle);
    fn begin_query(&mut self, pool: QueryPoolHandle, index: u32);
    fn end_query(&mut self, pool: QueryPoolHandle, index: u32);
    fn get_query_results(&self, pool: QueryPoolHandle, index: u32) -> Result<Vec<u8>, GpuOpError>;

    fn begin_coding(&mut self, session: SessionHandle) -> Result<CommandBufferHandle, GpuOpError>;
    fn control_coding(&mut self, cmd: CommandBufferHandle, reset_rate_control: bool);
    fn encode_video(&mut self, cmd: CommandBufferHandle, input: GpuImageHandle);
    fn end_coding(&mut self, cmd: CommandBufferHandle) -> Result<(), GpuOpError>;

    fn submit(&mut self, cmd: CommandBufferHandle) -> Result<FenceHandle, GpuOpError>;
    fn wait(&mut self, fence: FenceHandle, timeout_ns: u64) -> Result<(), GpuOpError>;
}

/// Explicit reference-list modification op, terminated by
/// `CodecOps::end_modification_opcode()` (spec §6, "Bit-exact emission
/// contracts").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefListModOp {
    pub opcode: u8,
    pub value: u32,
}

#[derive(Debug, Clone)]
pub struct SliceHeaderInput<'a> {
    pub nal_type: u8,
    pub is_reference: bool,
    pub frame_num: u32,
    pub poc: i32,
    pub list0_mod_ops: &'a [RefListModOp],
    pub list1_mod_ops: &'a [RefListModOp],
    /// `difference_of_pic_nums_minus1` for the MMCO opcode 1 this slice's
    /// admission emits, or `None` if no explicit eviction was needed
    /// (`DpbManager::build_lists`/`evict`, spec §8 scenario E).
    pub unused_reference_pic_num: Option<u32>,
}

/// The out-of-scope raw NAL-unit/RBSP writer (spec §6).
pub trait CodecBitWriter {
    fn write_sps(&self, sps: &[u8]) -> Vec<u8>;
    fn write_pps(&self, pps: &[u8]) -> Vec<u8>;
    fn write_vps(&self, vps: &[u8]) -> Vec<u8>;
    fn write_slice_header(&self, hdr: &SliceHeaderInput<'_>) -> (Vec<u8>, u8);
    fn write_aud(&self, primary_pic_type: u8) -> Vec<u8>;
    fn write_sei(&self, messages: &[u8], nal_type: u8) -> Vec<u8>;
}

/// The out-of-scope streaming framework (spec §6).
pub trait StreamingSink {
    fn acquire_input_image(&mut self) -> Result<(GpuImageHandle, u64), ResourceError>;

    fn emit_output(
        &mut self,
        system_frame_number: u64,
        bytes: Vec<u8>,
        pts: i64,
        dts: i64,
        duration: i64,
        sync_point: bool,
    );

    /// `config_change_request` may arrive at any time; the caller applies
    /// it at the next GOP boundary (spec §6).
    fn poll_config_change(&mut self) -> Option<crate::types::EncoderConfig>;
}
