//! `ReorderEngine` (spec §4.2): receives frames in display order, emits
//! them in decode order, handles flush.
//!
//! No teacher equivalent — the teacher submits frames to the GPU in the
//! same order they are received (`vulkan_encoder.rs::encode`, called
//! directly from `encode_bytes`/`encode_texture`, no buffering at all).
//! Grounded in the teacher's `VecDeque`-as-queue idiom (the trash list in
//! `wrappers/video.rs`, the submission queue in `vulkan_encoder.rs`) and
//! built from the algorithm text of spec §4.2.

use std::collections::VecDeque;

use crate::error::ProtocolError;
use crate::types::{EncoderConfig, FrameRecord, GopDerived, GopEntry, GpuImageHandle, SliceType};

pub struct ReorderEngine {
    gop_table: Vec<GopEntry>,
    derived: GopDerived,
    ref_num_list1: u32,
    num_ref_frames: u32,

    cur_frame_index: u32,
    cur_frame_num: u32,

    reorder_list: VecDeque<FrameRecord>,
    /// Local mirror of the live DPB, sorted by `frame_num`, used only to
    /// decide readiness in the non-pyramid branch of `pop` (rule c). The
    /// authoritative DPB lives in `DpbManager`.
    ref_list: VecDeque<(u32, i32)>,

    b_pyramid: bool,
}

impl ReorderEngine {
    pub fn new(cfg: &EncoderConfig, gop_table: Vec<GopEntry>, derived: GopDerived) -> Self {
        Self {
            gop_table,
            derived,
            ref_num_list1: cfg.ref_num_list1,
            num_ref_frames: cfg.num_ref_frames.max(1),
            cur_frame_index: 0,
            cur_frame_num: 0,
            reorder_list: VecDeque::new(),
            ref_list: VecDeque::new(),
            b_pyramid: cfg.b_pyramid,
        }
    }

    /// `push(frame, end_of_stream)`, spec §4.2.
    pub fn push(
        &mut self,
        input_image: GpuImageHandle,
        system_frame_number: u64,
        force_keyframe: bool,
        end_of_stream: bool,
    ) -> Result<(), ProtocolError> {
        if force_keyframe || self.cur_frame_index as usize >= self.gop_table.len() {
            self.ref_list.clear();
            self.cur_frame_index = 0;
            self.cur_frame_num = 0;
        }

        let mut entry = self.gop_table[self.cur_frame_index as usize];
        if force_keyframe {
            entry.slice_type = SliceType::I;
            entry.is_reference = true;
        }

        let mut frame = FrameRecord::new(input_image, system_frame_number);
        frame.gop_index = self.cur_frame_index;
        frame.slice_type = entry.slice_type;
        frame.is_reference = entry.is_reference;
        frame.pyramid_level = entry.pyramid_level;
        frame.left_ref_poc_diff = entry.left_ref_poc_diff;
        frame.right_ref_poc_diff = entry.right_ref_poc_diff;
        frame.poc = ((2 * self.cur_frame_index as i64) % self.derived.max_pic_order_cnt as i64)
            as i32;
        frame.sync_point = self.cur_frame_index == 0;
        frame.force_keyframe = force_keyframe;

        self.cur_frame_index += 1;
        self.reorder_list.push_back(frame);

        if end_of_stream && (self.cur_frame_index as usize) < self.gop_table.len() {
            if let Some(last) = self.reorder_list.back_mut() {
                if last.slice_type == SliceType::B {
                    last.slice_type = SliceType::P;
                    last.is_reference = true;
                }
            }
            // Force the next push to open a fresh GOP.
            self.cur_frame_index = self.gop_table.len() as u32;
        }

        Ok(())
    }

    /// `pop() -> Option<FrameRecord>`, spec §4.2. Returns `None` if no
    /// frame is ready yet.
    pub fn pop(&mut self) -> Option<FrameRecord> {
        let at_gop_end = self.cur_frame_index as usize >= self.gop_table.len();

        if at_gop_end && !self.reorder_list.is_empty() {
            return self.finish_pop_front();
        }

        match self.reorder_list.back() {
            None => None,
            Some(tail) if tail.slice_type != SliceType::B => self.finish_pop_tail(),
            Some(_) if self.b_pyramid => self.pop_pyramid_candidate(),
            Some(_) => self.pop_fifo_candidate(),
        }
    }

    /// Rule (b): select the B with the lowest `pyramid_level` (ties
    /// broken by lowest POC) among the buffered run, but only once the
    /// anchor that closes the run has itself already been pushed (and,
    /// per rule (a), already popped back out as the new tail the moment
    /// it arrived) — i.e. `cur_frame_index` has moved past the run's
    /// closing position. This is what makes the forward P/I anchor leave
    /// the encoder before any of the B's that reference it, matching
    /// spec §8 scenario C's emission order.
    fn pop_pyramid_candidate(&mut self) -> Option<FrameRecord> {
        let run_end = self.run_end_for(self.reorder_list.front()?.gop_index);
        if (self.cur_frame_index as usize) <= run_end {
            return None;
        }

        let (best_idx, _) = self
            .reorder_list
            .iter()
            .enumerate()
            .filter(|(_, f)| f.slice_type == SliceType::B)
            .min_by_key(|(_, f)| (f.pyramid_level, f.poc))?;

        let frame = self.reorder_list.remove(best_idx)?;
        Some(self.finish(frame))
    }

    /// Rule (c): without b-pyramid, B's drain FIFO (oldest first) once at
    /// least `ref_num_list1` already-live references have a POC greater
    /// than the head's.
    fn pop_fifo_candidate(&mut self) -> Option<FrameRecord> {
        let head_poc = self.reorder_list.front()?.poc;
        let future_refs = self.ref_list.iter().filter(|(_, poc)| *poc > head_poc).count();
        if (future_refs as u32) < self.ref_num_list1 {
            return None;
        }
        self.finish_pop_front()
    }

    fn finish_pop_tail(&mut self) -> Option<FrameRecord> {
        let frame = self.reorder_list.pop_back()?;
        Some(self.finish(frame))
    }

    fn finish_pop_front(&mut self) -> Option<FrameRecord> {
        let frame = self.reorder_list.pop_front()?;
        Some(self.finish(frame))
    }

    /// Assigns `frame_num` (incrementing `cur_frame_num` iff the frame is
    /// a reference) and records the frame in the local `ref_list` mirror.
    fn finish(&mut self, mut frame: FrameRecord) -> FrameRecord {
        frame.frame_num = self.cur_frame_num;
        if frame.is_reference {
            self.cur_frame_num = (self.cur_frame_num + 1) % self.derived.max_frame_num;
            self.ref_list.push_back((frame.frame_num, frame.poc));
            while self.ref_list.len() > self.num_ref_frames as usize {
                self.ref_list.pop_front();
            }
        }
        frame
    }

    fn run_end_for(&self, run_start: u32) -> usize {
        let mut i = run_start as usize;
        while i < self.gop_table.len() && self.gop_table[i].slice_type == SliceType::B {
            i += 1;
        }
        i
    }

    /// Explicit flush (spec §8 scenario F): the last buffered B (if any)
    /// is promoted to P, every remaining buffered frame is drained in
    /// display order, and GOP position counters reset.
    pub fn flush(&mut self) -> Vec<FrameRecord> {
        if let Some(last) = self.reorder_list.back_mut() {
            if last.slice_type == SliceType::B {
                last.slice_type = SliceType::P;
                last.is_reference = true;
            }
        }

        let mut out = Vec::with_capacity(self.reorder_list.len());
        while let Some(frame) = self.reorder_list.pop_front() {
            out.push(self.finish(frame));
        }

        self.ref_list.clear();
        self.cur_frame_index = 0;
        self.cur_frame_num = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec_ops::H265Ops;
    use crate::gop::GopPlanner;
    use crate::ratecontrol::RateControlMode;
    use crate::types::{ChromaFormat, Codec, Level, Rational};
    use std::num::NonZeroU32;

    fn engine(idr_period: u32, num_bframes: u32, b_pyramid: bool, num_ref_frames: u32) -> ReorderEngine {
        let cfg = EncoderConfig {
            codec: Codec::H265,
            profile: "main",
            level: Level::Auto,
            width: NonZeroU32::new(176).unwrap(),
            height: NonZeroU32::new(144).unwrap(),
            framerate: Rational::new(30, NonZeroU32::new(1).unwrap()),
            chroma_format: ChromaFormat::Yuv420,
            bit_depth: 8,
            idr_period,
            num_bframes,
            b_pyramid,
            num_iframes: 0,
            num_ref_frames,
            ref_num_list0: 2,
            ref_num_list1: if b_pyramid { 1 } else { 0 },
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
        };
        let (table, derived) = GopPlanner::plan::<H265Ops>(&cfg, 2, if b_pyramid { 1 } else { 0 }).unwrap();
        ReorderEngine::new(&cfg, table, derived)
    }

    fn push_all(engine: &mut ReorderEngine, n: u32) -> Vec<FrameRecord> {
        let mut out = Vec::new();
        for i in 0..n {
            engine.push(GpuImageHandle(i as u64), i as u64, false, false).unwrap();
            while let Some(f) = engine.pop() {
                out.push(f);
            }
        }
        out
    }

    #[test]
    fn scenario_c_ibp_emit_order() {
        let mut e = engine(8, 3, true, 3);
        let emitted = push_all(&mut e, 8);
        let gop_indices: Vec<u32> = emitted.iter().map(|f| f.gop_index).collect();
        assert_eq!(gop_indices, vec![0, 4, 2, 1, 3, 7, 6, 5]);
        for f in &emitted {
            if f.slice_type == SliceType::B {
                assert!(f.pyramid_level < 2);
            }
        }
    }

    #[test]
    fn property_multiset_preserved() {
        let mut e = engine(8, 3, true, 3);
        let emitted = push_all(&mut e, 16);
        let mut nums: Vec<u64> = emitted.iter().map(|f| f.system_frame_number).collect();
        nums.sort();
        assert_eq!(nums, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn scenario_f_flush_promotes_last_b_to_p() {
        let mut e = engine(16, 3, true, 3);
        for i in 0..7u32 {
            e.push(GpuImageHandle(i as u64), i as u64, false, false).unwrap();
            while e.pop().is_some() {}
        }
        let flushed = e.flush();
        assert!(!flushed.is_empty());
        let last = flushed.iter().max_by_key(|f| f.gop_index).unwrap();
        assert_eq!(last.slice_type, SliceType::P);
        assert!(last.is_reference);
    }

    #[test]
    fn scenario_d_force_keyframe_resets_gop() {
        let mut e = engine(10, 0, false, 2);
        for i in 0..5u32 {
            e.push(GpuImageHandle(i as u64), i as u64, false, false).unwrap();
            while e.pop().is_some() {}
        }
        e.push(GpuImageHandle(5), 5, true, false).unwrap();
        let mut emitted = Vec::new();
        while let Some(f) = e.pop() {
            emitted.push(f);
        }
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].slice_type, SliceType::I);
        assert!(emitted[0].is_reference);
        assert!(emitted[0].sync_point);
        assert_eq!(emitted[0].gop_index, 0);
    }
}
