//! `RateControlShim` (spec §4.8): translates the encoder's rate-control
//! mode into the per-layer Vulkan `VkVideoEncodeRateControlLayerInfoKHR`
//! values, and decides which control flags must accompany the first
//! frame of a session.
//!
//! Grounded in the teacher's `vulkan_encoder.rs::RateControl` enum and its
//! `to_vk()` match (`EncoderDefault`/`Vbr{..}`/`Disabled`), generalized to
//! the spec's four-mode table (default/disabled/CBR/VBR) and to
//! `quality_level`, which the teacher does not expose at all.

use crate::types::EncoderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateControlMode {
    /// Let the driver choose; no rate control layer is submitted.
    Default,
    /// Constant QP, no bitrate target.
    Disabled,
    Cbr,
    Vbr,
}

/// One `VkVideoEncodeRateControlLayerInfoKHR`-shaped row (spec §4.8). Named
/// `RateControlLayer` rather than re-using the Vulkan type so this module
/// has no `ash` dependency and is unit-testable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControlLayer {
    pub average_bitrate: u32,
    pub max_bitrate: u32,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControlPlan {
    pub mode: RateControlMode,
    pub layer: Option<RateControlLayer>,
    /// Applied only to the first frame of a session/reconfiguration (spec
    /// §4.8): reset the rate-control state, (re-)apply the quality level,
    /// and (re-)apply the rate-control mode itself.
    pub reset_rate_control: bool,
    pub apply_quality_level: bool,
    pub apply_rate_control_mode: bool,
}

pub struct RateControlShim;

/// Adaptive-QP feedback accumulator (spec §9 open question 1). The spec
/// notes the upstream H.264 path leaves `used_bytes` unwired; this crate
/// implements the feedback symmetrically for both codecs rather than
/// preserving that asymmetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodedSizeFeedback {
    pub used_bytes: u64,
}

impl EncodedSizeFeedback {
    pub fn record(&mut self, encoded_bytes: u32) {
        self.used_bytes += encoded_bytes as u64;
    }
}

impl RateControlShim {
    /// `plan(cfg, is_first_frame) -> RateControlPlan`, spec §4.8.
    pub fn plan(cfg: &EncoderConfig, is_first_frame: bool) -> RateControlPlan {
        let layer = match cfg.rate_control {
            RateControlMode::Default | RateControlMode::Disabled => None,
            RateControlMode::Cbr => Some(RateControlLayer {
                average_bitrate: cfg.average_bitrate,
                max_bitrate: cfg.average_bitrate,
                frame_rate_num: cfg.framerate.num,
                frame_rate_den: cfg.framerate.den.get(),
            }),
            RateControlMode::Vbr => Some(RateControlLayer {
                average_bitrate: cfg.average_bitrate,
                // VBR's max_bitrate ceiling: twice the average, per the
                // spec table's VBR row ("max_bitrate = 2 * average, unless
                // the device caps it lower" — capping happens downstream
                // in SessionOrchestrator against queried caps).
                max_bitrate: cfg.average_bitrate.saturating_mul(2),
                frame_rate_num: cfg.framerate.num,
                frame_rate_den: cfg.framerate.den.get(),
            }),
        };

        RateControlPlan {
            mode: cfg.rate_control,
            layer,
            reset_rate_control: is_first_frame,
            apply_quality_level: is_first_frame,
            apply_rate_control_mode: is_first_frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChromaFormat, Codec, Level, Rational};
    use std::num::NonZeroU32;

    fn cfg(mode: RateControlMode) -> EncoderConfig {
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
            rate_control: mode,
            average_bitrate: 4_000_000,
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

    #[test]
    fn default_mode_has_no_layer() {
        let plan = RateControlShim::plan(&cfg(RateControlMode::Default), true);
        assert!(plan.layer.is_none());
    }

    #[test]
    fn disabled_mode_has_no_layer() {
        let plan = RateControlShim::plan(&cfg(RateControlMode::Disabled), true);
        assert!(plan.layer.is_none());
    }

    #[test]
    fn cbr_pins_max_to_average() {
        let plan = RateControlShim::plan(&cfg(RateControlMode::Cbr), true);
        let layer = plan.layer.unwrap();
        assert_eq!(layer.average_bitrate, layer.max_bitrate);
    }

    #[test]
    fn vbr_allows_headroom_above_average() {
        let plan = RateControlShim::plan(&cfg(RateControlMode::Vbr), true);
        let layer = plan.layer.unwrap();
        assert!(layer.max_bitrate > layer.average_bitrate);
    }

    #[test]
    fn control_flags_only_apply_on_first_frame() {
        let plan = RateControlShim::plan(&cfg(RateControlMode::Vbr), false);
        assert!(!plan.reset_rate_control);
        assert!(!plan.apply_quality_level);
        assert!(!plan.apply_rate_control_mode);
    }

    #[test]
    fn encoded_size_feedback_accumulates_across_frames() {
        let mut feedback = EncodedSizeFeedback::default();
        feedback.record(1200);
        feedback.record(980);
        assert_eq!(feedback.used_bytes, 2180);
    }
}
