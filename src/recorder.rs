//! `OperationRecorder` (spec §4.5): orchestrates a single GPU operation
//! (one frame encode, one session flush) with correct synchronization.
//!
//! Grounded in `wrappers/sync.rs::TimelineSemaphore`/`Tracker` (semaphore
//! wait/signal value bookkeeping) and `vulkan_encoder.rs`'s submission
//! loop (trash list of fences for deferred command-buffer cleanup, the
//! four inline NVIDIA-driver-bug comments about barrier/semaphore
//! ordering that motivated keeping this state explicit rather than
//! inline in the encode loop). The `Tracker<EncoderTrackerKind>`/
//! `CommandBufferPool` shape `vulkan_encoder.rs` references is not present
//! verbatim in this pack's `sync.rs`/`command.rs` (an older `Tracker<S>`
//! shape lives there instead); this module synthesizes one
//! internally-consistent version, grounded in both.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::GpuOpError;
use crate::interfaces::{CommandBufferHandle, FenceHandle, GpuVideoBackend, QueryPoolHandle, SessionHandle};
use crate::types::GpuImageHandle;

/// Synchronization path chosen once at construction time (spec §4.5's
/// concurrency contract), mirroring `vulkan_encoder.rs`'s
/// `EncoderTrackerKind` dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPath {
    /// `VK_KHR_synchronization2`: `Submit2`, 2-struct barrier form.
    Sync2,
    /// `VK_KHR_timeline_semaphore` without sync2: split wait/signal value
    /// arrays in the extended submit info.
    Timeline,
    /// Neither extension: plain submit, binary semaphores only.
    Binary,
}

#[derive(Debug, Clone, Copy, Default)]
struct FrameDependencyState {
    stage: u32,
    access: u32,
    layout: u32,
    queue: u32,
    updated: bool,
    timeline_value: u64,
    semaphored: bool,
}

pub struct OperationRecorder {
    sync_path: SyncPath,
    trash: VecDeque<(FenceHandle, CommandBufferHandle)>,
    dependency_table: FxHashMap<GpuImageHandle, FrameDependencyState>,
    query_pool: Option<QueryPoolHandle>,
    current_cmd: Option<CommandBufferHandle>,
}

impl OperationRecorder {
    pub fn new(sync_path: SyncPath) -> Self {
        Self {
            sync_path,
            trash: VecDeque::new(),
            dependency_table: FxHashMap::default(),
            query_pool: None,
            current_cmd: None,
        }
    }

    pub fn sync_path(&self) -> SyncPath {
        self.sync_path
    }

    /// `enable_query(type, n, pnext)`, spec §4.5.
    pub fn enable_query<B: GpuVideoBackend>(
        &mut self,
        backend: &mut B,
        session: SessionHandle,
        capacity: u32,
    ) -> Result<(), GpuOpError> {
        self.query_pool = Some(backend.create_query_pool(session, capacity)?);
        Ok(())
    }

    /// `begin()`, spec §4.5: waits for any prior in-flight op, allocates
    /// a fresh command buffer, resets the query pool if enabled.
    pub fn begin<B: GpuVideoBackend>(
        &mut self,
        backend: &mut B,
        session: SessionHandle,
        timeout_ns: u64,
    ) -> Result<CommandBufferHandle, GpuOpError> {
        self.wait(backend, timeout_ns)?;
        if let Some(pool) = self.query_pool {
            backend.reset_query_pool(pool);
        }
        let cmd = backend.begin_coding(session)?;
        self.current_cmd = Some(cmd);
        Ok(cmd)
    }

    /// Registers a future post-submit state for `frame`; `end()` commits
    /// it once the submit actually happens.
    pub fn update_frame(&mut self, frame: GpuImageHandle, stage: u32, access: u32, layout: u32, queue: u32) {
        let entry = self.dependency_table.entry(frame).or_default();
        entry.stage = stage;
        entry.access = access;
        entry.layout = layout;
        entry.queue = queue;
        entry.updated = true;
    }

    /// `add_frame_barrier`, spec §4.5: this core models a barrier as one
    /// state transition per image identity (the real per-plane barrier
    /// array is the GPU backend's concern, since plane count depends on
    /// `ChromaFormat`, not on anything this module tracks).
    pub fn add_frame_barrier(&mut self, frame: GpuImageHandle, stage: u32, access: u32, layout: u32, queue: u32) {
        self.update_frame(frame, stage, access, layout, queue);
    }

    /// `add_dependency_frame`, spec §4.5: returns the (wait_value,
    /// signal_value) pair the caller appends to its per-operation
    /// timeline-semaphore scratch arrays alongside `wait_stage`/
    /// `signal_stage`.
    pub fn add_dependency_frame(&mut self, frame: GpuImageHandle) -> (u64, u64) {
        let entry = self.dependency_table.entry(frame).or_default();
        let wait_value = entry.timeline_value;
        let signal_value = entry.timeline_value + 1;
        entry.semaphored = true;
        (wait_value, signal_value)
    }

    pub fn begin_query<B: GpuVideoBackend>(&mut self, backend: &mut B, id: u32) {
        if let Some(pool) = self.query_pool {
            backend.begin_query(pool, id);
        }
    }

    pub fn end_query<B: GpuVideoBackend>(&mut self, backend: &mut B, id: u32) {
        if let Some(pool) = self.query_pool {
            backend.end_query(pool, id);
        }
    }

    /// `end()`, spec §4.5: ends the command buffer, submits, pushes the
    /// fence to the trash list, and commits every pending dependency
    /// state.
    pub fn end<B: GpuVideoBackend>(&mut self, backend: &mut B) -> Result<(), GpuOpError> {
        let cmd = self
            .current_cmd
            .take()
            .ok_or_else(|| GpuOpError::SubmitFailed("end() called without a matching begin()".to_string()))?;
        backend.end_coding(cmd)?;
        let fence = backend.submit(cmd)?;
        self.trash.push_back((fence, cmd));

        for state in self.dependency_table.values_mut() {
            if state.updated {
                state.updated = false;
            }
            if state.semaphored {
                state.timeline_value += 1;
                state.semaphored = false;
            }
        }
        Ok(())
    }

    /// `wait(timeout)`, spec §4.5: waits on every trash-list fence, then
    /// discards them. A caller's timeout expiry leaves the remaining
    /// entries in the trash list for a later call to reclaim (spec
    /// §4.5's cancellation note).
    pub fn wait<B: GpuVideoBackend>(&mut self, backend: &mut B, timeout_ns: u64) -> Result<(), GpuOpError> {
        while let Some((fence, _cmd)) = self.trash.front().copied() {
            if let Err(err) = backend.wait(fence, timeout_ns) {
                warn!("wait on fence timed out, leaving {} entries in the trash list: {err}", self.trash.len());
                return Err(err);
            }
            self.trash.pop_front();
        }
        Ok(())
    }

    /// `retrieve_query(id) -> (offset, size, status)`, spec §4.5: decodes
    /// the encode-feedback query result tuple `{offset: u32, size: u32,
    /// status: i32}`.
    pub fn retrieve_query<B: GpuVideoBackend>(&self, backend: &B, id: u32) -> Result<(u32, u32, i32), GpuOpError> {
        let pool = self.query_pool.ok_or(GpuOpError::QueryIncomplete { query_id: id })?;
        let bytes = backend.get_query_results(pool, id)?;
        if bytes.len() < 12 {
            warn!("query {id} returned {} bytes, expected at least 12", bytes.len());
            return Err(GpuOpError::QueryIncomplete { query_id: id });
        }
        let offset = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let status = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
        Ok((offset, size, status))
    }
}
