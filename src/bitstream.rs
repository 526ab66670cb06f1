//! `BitstreamAssembler` (spec §4.7): produces the final compressed byte
//! sequence for a frame by concatenating packed headers ahead of the
//! GPU-written slice bytes.
//!
//! Grounded in `vulkan_video.rs`'s `EncodedOutputChunk` type and the
//! two-call size-then-fill protocol used by `read_session_headers`
//! (spec §4.4, mirroring `device/caps.rs::query_video_format_properties`'s
//! own two-call enumeration). `CodecBitWriter` stands in for the
//! out-of-scope raw NAL writer (SPEC_FULL §0.5).

use bytes::BytesMut;

use crate::codec_ops::CodecOps;
use crate::interfaces::CodecBitWriter;
use crate::types::{EncoderConfig, FrameRecord, SliceType};

/// SPS/PPS(/VPS) blobs fetched once from the session-parameters object
/// via `SessionOrchestrator::read_session_headers`, and reused by
/// `BitstreamAssembler` on every IDR frame.
#[derive(Debug, Clone, Default)]
pub struct SessionHeaders {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    pub vps: Option<Vec<u8>>,
}

/// CEA-708 registered-user-data SEI constants (spec §4.7).
const ATSC_COUNTRY_CODE: u8 = 181;
const ATSC_PROVIDER_CODE: u16 = 49;
const ATSC_IDENTIFIER: &[u8; 4] = b"GA94";
const ATSC_USER_DATA_TYPE_CODE: u8 = 3;
const EM_DATA_MARKER: u8 = 0xFF;

fn primary_pic_type(slice_type: SliceType) -> u8 {
    match slice_type {
        SliceType::I => 0,
        SliceType::P => 1,
        SliceType::B => 2,
    }
}

/// Builds the registered-user-data SEI payload for `meta`, spec §4.7.
/// `meta` holds CEA-708 3-byte caption triplets.
fn cea708_sei_payload(meta: &[u8]) -> Vec<u8> {
    let cc_count = (meta.len() / 3) as u8;
    let mut payload = Vec::with_capacity(11 + meta.len());
    payload.push(ATSC_COUNTRY_CODE);
    payload.extend_from_slice(&(ATSC_PROVIDER_CODE).to_be_bytes());
    payload.extend_from_slice(ATSC_IDENTIFIER);
    payload.push(ATSC_USER_DATA_TYPE_CODE);
    payload.push(0xC0 | cc_count); // process_cc_data_flag=1, cc_count in low 5 bits
    payload.push(EM_DATA_MARKER);
    payload.extend_from_slice(meta);
    payload
}

pub struct BitstreamAssembler<C: CodecOps, W: CodecBitWriter> {
    writer: W,
    _marker: std::marker::PhantomData<C>,
}

impl<C: CodecOps, W: CodecBitWriter> BitstreamAssembler<C, W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            _marker: std::marker::PhantomData,
        }
    }

    /// Assembles the final byte sequence for `frame`. The query feedback
    /// reports the slice data as `size` bytes starting at `query_offset`
    /// within `gpu_output`; per spec §4.7 the output buffer is resized to
    /// `query_offset + query_size + prefix_len`, so everything in
    /// `gpu_output[..query_offset + query_size]` is carried into the
    /// output (not just the `[query_offset..]` tail) — `query_offset` is
    /// retained as leading bytes of the copied region, not skipped.
    pub fn assemble(
        &self,
        cfg: &EncoderConfig,
        frame: &FrameRecord,
        headers: &SessionHeaders,
        gpu_output: &[u8],
        query_offset: u32,
        query_size: u32,
    ) -> BytesMut {
        let mut prefix = BytesMut::new();

        if frame.gop_index == 0 {
            prefix.extend_from_slice(&self.writer.write_sps(&headers.sps));
            prefix.extend_from_slice(&self.writer.write_pps(&headers.pps));
            if let Some(vps) = &headers.vps {
                prefix.extend_from_slice(&self.writer.write_vps(vps));
            }
        }

        if cfg.aud_insert {
            prefix.extend_from_slice(&self.writer.write_aud(primary_pic_type(frame.slice_type)));
        }

        if cfg.cc_insert {
            if let Some(meta) = &frame.cea708_metadata {
                let payload = cea708_sei_payload(meta);
                prefix.extend_from_slice(&self.writer.write_sei(&payload, C::sei_nal_unit_type()));
            }
        }

        let prefix_len = prefix.len();
        let end = (query_offset + query_size) as usize;

        let mut out = BytesMut::with_capacity(prefix_len + end);
        out.extend_from_slice(&prefix);
        out.extend_from_slice(&gpu_output[..end]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec_ops::H264Ops;
    use crate::ratecontrol::RateControlMode;
    use crate::types::{ChromaFormat, Codec, GpuImageHandle, Level, Rational};
    use pretty_assertions::assert_eq;
    use std::num::NonZeroU32;

    struct FakeWriter;

    impl CodecBitWriter for FakeWriter {
        fn write_sps(&self, sps: &[u8]) -> Vec<u8> {
            let mut v = vec![0x00, 0x00, 0x00, 0x01, 0x67];
            v.extend_from_slice(sps);
            v
        }
        fn write_pps(&self, pps: &[u8]) -> Vec<u8> {
            let mut v = vec![0x00, 0x00, 0x00, 0x01, 0x68];
            v.extend_from_slice(pps);
            v
        }
        fn write_vps(&self, vps: &[u8]) -> Vec<u8> {
            let mut v = vec![0x00, 0x00, 0x00, 0x01, 0x40];
            v.extend_from_slice(vps);
            v
        }
        fn write_slice_header(&self, _hdr: &crate::interfaces::SliceHeaderInput<'_>) -> (Vec<u8>, u8) {
            (Vec::new(), 0)
        }
        fn write_aud(&self, primary_pic_type: u8) -> Vec<u8> {
            vec![0x00, 0x00, 0x00, 0x01, 0x09, primary_pic_type]
        }
        fn write_sei(&self, messages: &[u8], nal_type: u8) -> Vec<u8> {
            let mut v = vec![0x00, 0x00, 0x00, 0x01, nal_type];
            v.extend_from_slice(messages);
            v
        }
    }

    fn cfg() -> EncoderConfig {
        EncoderConfig {
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

    fn headers() -> SessionHeaders {
        SessionHeaders {
            sps: vec![1, 2, 3],
            pps: vec![4, 5],
            vps: None,
        }
    }

    #[test]
    fn idr_frame_prepends_sps_and_pps() {
        let c = cfg();
        let assembler = BitstreamAssembler::<H264Ops, _>::new(FakeWriter);
        let mut frame = FrameRecord::new(GpuImageHandle(0), 0);
        frame.slice_type = SliceType::I;
        frame.gop_index = 0;

        let gpu_output = vec![0xAA; 16];
        let out = assembler.assemble(&c, &frame, &headers(), &gpu_output, 0, 16);

        // sps header (5 + 3 bytes) + pps header (5 + 2 bytes) + slice bytes
        assert_eq!(out.len(), 8 + 7 + 16);
        assert_eq!(&out[0..5], &[0x00, 0x00, 0x00, 0x01, 0x67]);
    }

    #[test]
    fn non_idr_frame_has_no_header_prefix() {
        let c = cfg();
        let assembler = BitstreamAssembler::<H264Ops, _>::new(FakeWriter);
        let mut frame = FrameRecord::new(GpuImageHandle(1), 1);
        frame.slice_type = SliceType::P;
        frame.gop_index = 1;

        let gpu_output = vec![0xBB; 8];
        let out = assembler.assemble(&c, &frame, &headers(), &gpu_output, 0, 8);

        assert_eq!(out.len(), 8);
        assert_eq!(&out[..], &gpu_output[..]);
    }

    #[test]
    fn aud_insert_prepends_aud_nal_with_matching_primary_pic_type() {
        let mut c = cfg();
        c.aud_insert = true;
        let assembler = BitstreamAssembler::<H264Ops, _>::new(FakeWriter);
        let mut frame = FrameRecord::new(GpuImageHandle(2), 2);
        frame.slice_type = SliceType::B;
        frame.gop_index = 3;

        let gpu_output = vec![0xCC; 4];
        let out = assembler.assemble(&c, &frame, &headers(), &gpu_output, 0, 4);

        assert_eq!(&out[0..6], &[0x00, 0x00, 0x00, 0x01, 0x09, 2]);
        assert_eq!(out.len(), 6 + 4);
    }

    #[test]
    fn cc_insert_without_metadata_adds_nothing() {
        let mut c = cfg();
        c.cc_insert = true;
        let assembler = BitstreamAssembler::<H264Ops, _>::new(FakeWriter);
        let mut frame = FrameRecord::new(GpuImageHandle(3), 3);
        frame.slice_type = SliceType::P;
        frame.gop_index = 1;
        frame.cea708_metadata = None;

        let gpu_output = vec![0xDD; 4];
        let out = assembler.assemble(&c, &frame, &headers(), &gpu_output, 0, 4);

        assert_eq!(out.len(), 4);
    }

    #[test]
    fn cc_insert_with_metadata_builds_registered_user_data_sei() {
        let mut c = cfg();
        c.cc_insert = true;
        let assembler = BitstreamAssembler::<H264Ops, _>::new(FakeWriter);
        let mut frame = FrameRecord::new(GpuImageHandle(4), 4);
        frame.slice_type = SliceType::P;
        frame.gop_index = 1;
        frame.cea708_metadata = Some(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]); // cc_count = 2

        let gpu_output = vec![0xEE; 4];
        let out = assembler.assemble(&c, &frame, &headers(), &gpu_output, 0, 4);

        // sei nal header (5 bytes) + payload (11 + 6 bytes) + slice (4 bytes)
        assert_eq!(out.len(), 5 + 17 + 4);
        assert_eq!(out[4], 6); // nal_unit_type passed through to FakeWriter
        let payload_start = 5;
        assert_eq!(out[payload_start], ATSC_COUNTRY_CODE);
        assert_eq!(&out[payload_start + 3..payload_start + 7], ATSC_IDENTIFIER);
        assert_eq!(out[payload_start + 7], ATSC_USER_DATA_TYPE_CODE);
        assert_eq!(out[payload_start + 8] & 0x1F, 2); // cc_count
        assert_eq!(out[payload_start + 9], EM_DATA_MARKER);
    }

    #[test]
    fn query_offset_is_retained_in_emitted_byte_count() {
        let c = cfg();
        let assembler = BitstreamAssembler::<H264Ops, _>::new(FakeWriter);
        let mut frame = FrameRecord::new(GpuImageHandle(5), 5);
        frame.slice_type = SliceType::P;
        frame.gop_index = 1;

        let mut gpu_output = vec![0u8; 20];
        gpu_output[8..12].copy_from_slice(&[1, 2, 3, 4]);
        let out = assembler.assemble(&c, &frame, &headers(), &gpu_output, 8, 4);

        // Property 6: emitted byte count == offset + size + prefix_len.
        // Non-IDR, no AUD/SEI here, so prefix_len == 0.
        assert_eq!(out.len(), 8 + 4);
        assert_eq!(&out[8..12], &[1, 2, 3, 4]);
    }
}
