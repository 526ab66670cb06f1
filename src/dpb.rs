//! `DpbManager` (spec §4.3): bounded reference set, eviction, list0/list1
//! construction, slot assignment, reference-list-modification-op and MMCO
//! derivation.
//!
//! Grounded in `wrappers/video.rs`'s `DecodedPicturesBuffer` (cyclic slot
//! scan, `occupied`/`owner` bookkeeping) and in `vulkan_encoder.rs::encode`'s
//! `active_reference_slots: VecDeque` FIFO plus its bug4 comment on
//! reference-list ordering, for slot assignment and eviction; and in
//! `parser/reference_manager.rs`'s adaptive MMCO handling, inverted to the
//! encode side, for the `difference_of_pic_nums_minus1` derivation. The
//! FrameRecord arena (spec §9) replaces the teacher's direct `Picture`
//! ownership to break the FrameRecord ↔ DpbSlot cycle.

use std::collections::VecDeque;
use std::marker::PhantomData;

use tracing::debug;

use crate::codec_ops::CodecOps;
use crate::error::ResourceError;
use crate::interfaces::RefListModOp;
use crate::types::{DpbSlot, FrameIdx, FrameRecord, SliceType};

pub struct DpbManager<C: CodecOps> {
    arena: Vec<FrameRecord>,
    slots: Vec<DpbSlot>,
    ref_list: VecDeque<FrameIdx>,
    current_slot_index: usize,
    num_ref_frames: usize,
    b_pyramid: bool,
    _marker: PhantomData<C>,
}

impl<C: CodecOps> DpbManager<C> {
    pub fn new(max_dpb_slots: usize, num_ref_frames: usize, b_pyramid: bool) -> Self {
        Self {
            arena: Vec::new(),
            slots: vec![DpbSlot::empty(); max_dpb_slots],
            ref_list: VecDeque::new(),
            current_slot_index: 0,
            num_ref_frames,
            b_pyramid,
            _marker: PhantomData,
        }
    }

    pub fn frame(&self, idx: FrameIdx) -> &FrameRecord {
        &self.arena[idx.0 as usize]
    }

    pub fn ref_list_len(&self) -> usize {
        self.ref_list.len()
    }

    /// Admits a frame that has already been encoded: runs eviction (if
    /// the DPB is full and this frame is itself a reference), assigns a
    /// slot, and records the frame in the arena. Returns the stable
    /// index to hand to `PictureBuilder`/`OperationRecorder`.
    pub fn admit(&mut self, mut frame: FrameRecord) -> Result<FrameIdx, ResourceError> {
        if frame.is_reference && self.ref_list.len() >= self.num_ref_frames {
            self.evict(&mut frame)?;
        }
        self.store(frame)
    }

    fn evict(&mut self, current: &mut FrameRecord) -> Result<(), ResourceError> {
        let evict_idx = if self.b_pyramid && current.slice_type == SliceType::B {
            self.pick_b_evictee()
                .unwrap_or_else(|| *self.ref_list.front().expect("ref_list non-empty, checked by caller"))
        } else {
            *self
                .ref_list
                .front()
                .ok_or(ResourceError::NoFreeDpbSlot { capacity: self.num_ref_frames })?
        };

        if self.ref_list.front() != Some(&evict_idx) {
            let evictee_frame_num = self.arena[evict_idx.0 as usize].frame_num;
            // MMCO opcode 1 (`ShortTermUnusedForRef`), inverted from the
            // teacher's decode-side `parser/reference_manager.rs`:
            // `pic_num_to_remove = current.frame_num - (diff_minus1 + 1)`,
            // solved here for `diff_minus1` given the evictee's frame_num.
            let diff_minus1 = current.frame_num as i64 - evictee_frame_num as i64 - 1;
            debug!(
                "evicting non-head reference frame_num={evictee_frame_num}, emitting MMCO \
                 difference_of_pic_nums_minus1={diff_minus1}"
            );
            current.unused_reference_pic_num = Some(diff_minus1 as u32);
        }

        self.ref_list.retain(|&i| i != evict_idx);
        self.free_slot_owned_by(evict_idx);
        Ok(())
    }

    /// Among the B-type references currently live, picks the one at the
    /// deepest pyramid level (ties broken by lowest POC), per spec §4.3.
    fn pick_b_evictee(&self) -> Option<FrameIdx> {
        self.ref_list
            .iter()
            .copied()
            .filter(|&i| self.arena[i.0 as usize].slice_type == SliceType::B)
            .max_by_key(|&i| {
                let f = &self.arena[i.0 as usize];
                (f.pyramid_level, std::cmp::Reverse(f.poc))
            })
    }

    fn store(&mut self, frame: FrameRecord) -> Result<FrameIdx, ResourceError> {
        let idx = FrameIdx(self.arena.len() as u32);
        if frame.is_reference {
            let slot = self.find_free_slot()?;
            self.slots[slot] = DpbSlot {
                occupied: true,
                owner: Some(idx),
                image_view: frame.input_image,
            };
            self.current_slot_index = (slot + 1) % self.slots.len().max(1);
            let mut frame = frame;
            frame.dpb_slot_index = Some(slot as u32);
            self.arena.push(frame);
            self.ref_list.push_back(idx);
        } else {
            self.arena.push(frame);
        }
        Ok(idx)
    }

    fn find_free_slot(&self) -> Result<usize, ResourceError> {
        let n = self.slots.len();
        if n == 0 {
            return Err(ResourceError::NoFreeDpbSlot { capacity: 0 });
        }
        for off in 0..n {
            let s = (self.current_slot_index + off) % n;
            if !self.slots[s].occupied {
                return Ok(s);
            }
        }
        Err(ResourceError::NoFreeDpbSlot { capacity: n })
    }

    fn free_slot_owned_by(&mut self, idx: FrameIdx) {
        for slot in &mut self.slots {
            if slot.owner == Some(idx) {
                *slot = DpbSlot::empty();
                break;
            }
        }
    }

    /// `list0`/`list1` construction, plus reorder-modification flags
    /// (spec §4.3). `current.poc` must already be set; `current` need
    /// not yet be admitted into the DPB.
    pub fn build_lists(
        &self,
        current: &FrameRecord,
        ref_num_list0: u32,
        ref_num_list1: u32,
    ) -> ReferenceLists {
        if current.slice_type == SliceType::I {
            return ReferenceLists::default();
        }

        let mut list0: Vec<FrameIdx> = self
            .ref_list
            .iter()
            .copied()
            .filter(|&i| self.arena[i.0 as usize].poc <= current.poc)
            .collect();
        list0.sort_by(|&a, &b| self.arena[b.0 as usize].poc.cmp(&self.arena[a.0 as usize].poc));
        list0.truncate(ref_num_list0 as usize);

        let mut list1: Vec<FrameIdx> = if current.slice_type == SliceType::B {
            self.ref_list
                .iter()
                .copied()
                .filter(|&i| self.arena[i.0 as usize].poc > current.poc)
                .collect()
        } else {
            Vec::new()
        };
        list1.sort_by_key(|&i| self.arena[i.0 as usize].poc);
        list1.truncate(ref_num_list1 as usize);

        let implicit_l0 = self.implicit_order(&list0, true);
        let implicit_l1 = self.implicit_order(&list1, false);
        let modification_flag_l0 = implicit_l0 != list0;
        let modification_flag_l1 = implicit_l1 != list1;

        let list0_mod_ops = if modification_flag_l0 {
            self.modification_ops(&list0, current.frame_num)
        } else {
            Vec::new()
        };
        let list1_mod_ops = if modification_flag_l1 {
            self.modification_ops(&list1, current.frame_num)
        } else {
            Vec::new()
        };

        ReferenceLists {
            list0,
            list1,
            modification_flag_l0,
            modification_flag_l1,
            list0_mod_ops,
            list1_mod_ops,
        }
    }

    /// The decoder's implicit default ordering (`frame_num` descending for
    /// list0, ascending for list1); any positional difference from the
    /// chosen list means the slice header needs explicit
    /// `ref_pic_list_modification` operations.
    fn implicit_order(&self, list: &[FrameIdx], descending: bool) -> Vec<FrameIdx> {
        let mut implicit = list.to_vec();
        if descending {
            implicit.sort_by(|&a, &b| {
                self.arena[b.0 as usize].frame_num.cmp(&self.arena[a.0 as usize].frame_num)
            });
        } else {
            implicit.sort_by_key(|&i| self.arena[i.0 as usize].frame_num);
        }
        implicit
    }

    /// Builds the explicit `ref_pic_list_modification` op sequence that
    /// walks the decoder from its implicit default ordering to `list`,
    /// one `modification_of_pic_nums_idc` op per entry (0 = subtract, 1 =
    /// add, relative to a running predicted picture number that starts at
    /// `current_frame_num` and is updated to each op's target), terminated
    /// by `CodecOps::end_modification_opcode()`. Spec §6's "Bit-exact
    /// emission contracts"; no teacher equivalent exists (the teacher only
    /// decodes an already-signalled list), so this follows the H.264/H.265
    /// spec text for `modification_of_pic_nums_idc` directly.
    fn modification_ops(&self, list: &[FrameIdx], current_frame_num: u32) -> Vec<RefListModOp> {
        let mut ops = Vec::with_capacity(list.len() + 1);
        let mut pred = current_frame_num as i64;
        for &idx in list {
            let target = self.arena[idx.0 as usize].frame_num as i64;
            let diff = target - pred;
            if diff < 0 {
                ops.push(RefListModOp { opcode: 0, value: (-diff - 1) as u32 });
            } else {
                ops.push(RefListModOp { opcode: 1, value: (diff - 1) as u32 });
            }
            pred = target;
        }
        ops.push(RefListModOp { opcode: C::end_modification_opcode(), value: 0 });
        ops
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceLists {
    pub list0: Vec<FrameIdx>,
    pub list1: Vec<FrameIdx>,
    pub modification_flag_l0: bool,
    pub modification_flag_l1: bool,
    /// `ref_pic_list_modification` ops for list0, empty unless
    /// `modification_flag_l0` is set; terminated by the codec's
    /// end-modification opcode.
    pub list0_mod_ops: Vec<RefListModOp>,
    pub list1_mod_ops: Vec<RefListModOp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec_ops::H265Ops;
    use crate::types::GpuImageHandle;

    fn reference(frame_num: u32, poc: i32, slice_type: SliceType, pyramid_level: u32) -> FrameRecord {
        let mut f = FrameRecord::new(GpuImageHandle(poc as u64), poc as u64);
        f.frame_num = frame_num;
        f.poc = poc;
        f.slice_type = slice_type;
        f.is_reference = true;
        f.pyramid_level = pyramid_level;
        f
    }

    #[test]
    fn fifo_eviction_without_b_pyramid() {
        let mut dpb = DpbManager::<H265Ops>::new(4, 2, false);
        let a = dpb.admit(reference(0, 0, SliceType::I, 0)).unwrap();
        let _b = dpb.admit(reference(1, 2, SliceType::P, 0)).unwrap();
        let mut third = reference(2, 4, SliceType::P, 0);
        // ref_list is now full (len 2 == num_ref_frames); admitting a
        // third reference must evict the head (frame a).
        let before_head = *dpb.ref_list.front().unwrap();
        assert_eq!(before_head, a);
        dpb.evict(&mut third).unwrap();
        assert_ne!(*dpb.ref_list.front().unwrap(), a);
    }

    #[test]
    fn scenario_e_b_pyramid_eviction_emits_mmco() {
        let mut dpb = DpbManager::<H265Ops>::new(4, 3, true);
        dpb.admit(reference(0, 0, SliceType::I, 0)).unwrap();
        dpb.admit(reference(1, 8, SliceType::P, 0)).unwrap();
        dpb.admit(reference(2, 4, SliceType::B, 1)).unwrap();

        let mut incoming = reference(3, 16, SliceType::B, 1);
        let head_before = *dpb.ref_list.front().unwrap();
        dpb.evict(&mut incoming).unwrap();

        // The deepest-level B reference (frame_num 2, poc 4) is not the
        // FIFO head (frame_num 0), so evicting it must set the explicit
        // MMCO hint to difference_of_pic_nums_minus1 = 3 - 2 - 1 = 0.
        assert_ne!(head_before.0, 2);
        assert_eq!(incoming.unused_reference_pic_num, Some(0));
    }

    #[test]
    fn list0_sorted_descending_by_poc_and_truncated() {
        let mut dpb = DpbManager::<H265Ops>::new(8, 8, false);
        dpb.admit(reference(0, 0, SliceType::I, 0)).unwrap();
        dpb.admit(reference(1, 2, SliceType::P, 0)).unwrap();
        dpb.admit(reference(2, 4, SliceType::P, 0)).unwrap();

        let mut current = FrameRecord::new(GpuImageHandle(6), 3);
        current.poc = 6;
        current.slice_type = SliceType::P;

        let lists = dpb.build_lists(&current, 2, 0);
        assert_eq!(lists.list0.len(), 2);
        let pocs: Vec<i32> = lists.list0.iter().map(|&i| dpb.frame(i).poc).collect();
        assert_eq!(pocs, vec![4, 2]);
        assert!(lists.list1.is_empty());
    }

    #[test]
    fn build_lists_emits_modification_ops_when_frame_num_order_diverges_from_poc_order() {
        let mut dpb = DpbManager::<H265Ops>::new(8, 8, false);
        // B-pyramid-style encode order: the anchor (frame_num 1, poc 4) is
        // encoded before the B reference that precedes it in display order
        // (frame_num 2, poc 2), so poc-descending and frame_num-descending
        // disagree on list0's order.
        dpb.admit(reference(0, 0, SliceType::I, 0)).unwrap();
        dpb.admit(reference(1, 4, SliceType::P, 0)).unwrap();
        dpb.admit(reference(2, 2, SliceType::P, 0)).unwrap();

        let mut current = FrameRecord::new(GpuImageHandle(8), 3);
        current.frame_num = 3;
        current.poc = 8;
        current.slice_type = SliceType::P;

        let lists = dpb.build_lists(&current, 3, 0);
        let frame_nums: Vec<u32> = lists.list0.iter().map(|&i| dpb.frame(i).frame_num).collect();
        assert_eq!(frame_nums, vec![1, 2, 0]);
        assert!(lists.modification_flag_l0);
        assert_eq!(
            lists.list0_mod_ops,
            vec![
                RefListModOp { opcode: 0, value: 1 },
                RefListModOp { opcode: 1, value: 0 },
                RefListModOp { opcode: 0, value: 1 },
                RefListModOp { opcode: 3, value: 0 },
            ]
        );
    }

    #[test]
    fn i_slice_has_empty_lists() {
        let mut dpb = DpbManager::<H265Ops>::new(8, 8, false);
        dpb.admit(reference(0, 0, SliceType::I, 0)).unwrap();
        let mut current = FrameRecord::new(GpuImageHandle(2), 1);
        current.poc = 2;
        current.slice_type = SliceType::I;
        let lists = dpb.build_lists(&current, 2, 2);
        assert!(lists.list0.is_empty() && lists.list1.is_empty());
    }

    #[test]
    fn slot_assignment_is_cyclic() {
        let mut dpb = DpbManager::<H265Ops>::new(2, 2, false);
        let a = dpb.admit(reference(0, 0, SliceType::I, 0)).unwrap();
        let b = dpb.admit(reference(1, 2, SliceType::P, 0)).unwrap();
        assert_ne!(dpb.frame(a).dpb_slot_index, dpb.frame(b).dpb_slot_index);
    }
}
