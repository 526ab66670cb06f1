//! `SessionOrchestrator` (spec §4.4): lifecycle of the GPU video session
//! and its session-parameters object.
//!
//! Grounded in `wrappers/video.rs::VideoSession::new`/
//! `VideoSessionParameters::new` (session/session-parameters creation
//! shape, `update_sequence_count` bookkeeping for `reconfigure`) and
//! `device/caps.rs::query_video_format_properties`'s two-call enumeration
//! pattern, reused here for `read_session_headers`. Operates purely
//! against the `GpuVideoBackend` trait (SPEC_FULL §0.5) so this module's
//! logic is unit-testable without `ash` linked.

use tracing::debug;

use crate::error::ConfigError;
use crate::interfaces::{GpuVideoBackend, ParamsHandle, QueryPoolHandle, SessionCreateInfo, SessionHandle};
use crate::types::EncoderConfig;

pub struct SessionOrchestrator {
    session: Option<SessionHandle>,
    params: Option<ParamsHandle>,
    query_pool: Option<QueryPoolHandle>,
    started: bool,
}

impl Default for SessionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionOrchestrator {
    pub fn new() -> Self {
        Self {
            session: None,
            params: None,
            query_pool: None,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// `start(profile, params)`, spec §4.4.
    pub fn start<B: GpuVideoBackend>(
        &mut self,
        backend: &mut B,
        cfg: &EncoderConfig,
        sps_pps: &[u8],
        required_std_header_version: u32,
        supported_std_header_version: u32,
    ) -> Result<(), ConfigError> {
        let caps = backend
            .query_capabilities(cfg.codec_profile_name())
            .map_err(|e| ConfigError::InvalidParameter {
                field: "profile",
                problem: e.to_string(),
            })?;

        if caps.std_header_version < required_std_header_version {
            return Err(ConfigError::StdHeaderVersionMismatch {
                required_version: required_std_header_version,
                driver_version: caps.std_header_version,
            });
        }
        if supported_std_header_version < caps.std_header_version {
            return Err(ConfigError::StdHeaderVersionMismatch {
                required_version: caps.std_header_version,
                driver_version: supported_std_header_version,
            });
        }

        let picture_format = *caps
            .picture_formats
            .first()
            .ok_or(ConfigError::NoSupportedFormat { usage: "input picture" })?;
        let reference_picture_format = *caps
            .reference_picture_formats
            .first()
            .ok_or(ConfigError::NoSupportedFormat { usage: "dpb reference picture" })?;

        let info = SessionCreateInfo {
            max_coded_width: cfg.width.get(),
            max_coded_height: cfg.height.get(),
            picture_format,
            reference_picture_format,
            max_dpb_slots: caps.max_dpb_slots,
            max_active_references: caps.max_active_references,
            std_header_version: caps.std_header_version,
        };

        let session = backend.create_session(&info).map_err(|e| ConfigError::InvalidParameter {
            field: "session",
            problem: e.to_string(),
        })?;
        let params = backend.create_params(session, sps_pps).map_err(|e| {
            backend.destroy_session(session);
            ConfigError::InvalidParameter { field: "session_parameters", problem: e.to_string() }
        })?;
        let pool = backend.create_query_pool(session, 1).map_err(|e| {
            backend.destroy_params(params);
            backend.destroy_session(session);
            ConfigError::InvalidParameter { field: "query_pool", problem: e.to_string() }
        })?;

        // Flush the session state with a single empty coding round
        // before the first real frame (spec §4.4).
        if let Ok(cmd) = backend.begin_coding(session) {
            backend.control_coding(cmd, true);
            let _ = backend.end_coding(cmd);
            if let Ok(fence) = backend.submit(cmd) {
                let _ = backend.wait(fence, u64::MAX);
            }
        }

        debug!("video session started: profile={}, {}x{}", cfg.profile, cfg.width, cfg.height);

        self.session = Some(session);
        self.params = Some(params);
        self.query_pool = Some(pool);
        self.started = true;
        Ok(())
    }

    /// `reconfigure(new_params)`, spec §4.4: only the session-parameters
    /// object is rebuilt; the session itself survives as long as
    /// resolution is unchanged.
    pub fn reconfigure<B: GpuVideoBackend>(&mut self, backend: &mut B, sps_pps: &[u8]) -> Result<(), ConfigError> {
        let session = self.session.ok_or(ConfigError::InvalidParameter {
            field: "session",
            problem: "reconfigure called before start".to_string(),
        })?;
        if let Some(old_params) = self.params.take() {
            backend.destroy_params(old_params);
        }
        let params = backend.create_params(session, sps_pps).map_err(|e| ConfigError::InvalidParameter {
            field: "session_parameters",
            problem: e.to_string(),
        })?;
        self.params = Some(params);
        Ok(())
    }

    /// `stop()`, spec §4.4.
    pub fn stop<B: GpuVideoBackend>(&mut self, backend: &mut B) {
        debug!("stopping video session");
        if let Some(params) = self.params.take() {
            backend.destroy_params(params);
        }
        if let Some(session) = self.session.take() {
            backend.destroy_session(session);
        }
        self.query_pool = None;
        self.started = false;
    }

    /// `read_session_headers(get_info, out_buffer) -> bytes`, spec §4.4:
    /// two-call protocol, first call sizes the buffer, second fills it.
    pub fn read_session_headers<B: GpuVideoBackend>(&self, backend: &B) -> Result<Vec<u8>, ConfigError> {
        let params = self.params.ok_or(ConfigError::InvalidParameter {
            field: "session_parameters",
            problem: "read_session_headers called before start".to_string(),
        })?;
        let size = backend.get_encoded_params(params, &mut []).unwrap_or(0);
        let mut buf = vec![0u8; size];
        let written = backend.get_encoded_params(params, &mut buf).map_err(|e| ConfigError::InvalidParameter {
            field: "session_parameters",
            problem: e.to_string(),
        })?;
        buf.truncate(written);
        Ok(buf)
    }
}

impl EncoderConfig {
    fn codec_profile_name(&self) -> &'static str {
        self.profile
    }
}
