//! `LevelSelector` (spec §4.9): picks the lowest codec level that covers
//! the requested picture size/bitrate/framerate.
//!
//! H.264 table grounded verbatim in `wrappers/parameter_sets.rs::
//! h264_level_idc_to_max_dpb_mbs`'s `maxDpbMbs` column; the `maxFS`/
//! `maxMBPS`/`maxBR` columns the teacher never needed (it only ever reads
//! a level back off the wire, never picks one) are supplemented here from
//! ITU-T H.264 Table A-1. The H.265 table has no teacher equivalent at
//! all and is supplemented from ITU-T H.265 Annex A.

use crate::error::ConfigError;
use crate::types::{EncoderConfig, Rational};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedLevel {
    pub level_idc: u32,
    pub high_tier: bool,
}

struct H264Row {
    level_idc: u32,
    max_mbps: u64,
    max_fs: u64,
    max_dpb_mbs: u64,
    max_br_kbps: u64,
}

/// Table A-1. `level_idc` uses the encoder's `level * 10` convention
/// (5.1 => 51), matching `h264_level_idc_to_max_dpb_mbs`.
const H264_LEVELS: &[H264Row] = &[
    H264Row { level_idc: 10, max_mbps: 1_485, max_fs: 99, max_dpb_mbs: 396, max_br_kbps: 64 },
    H264Row { level_idc: 11, max_mbps: 3_000, max_fs: 396, max_dpb_mbs: 900, max_br_kbps: 192 },
    H264Row { level_idc: 12, max_mbps: 6_000, max_fs: 396, max_dpb_mbs: 2_376, max_br_kbps: 384 },
    H264Row { level_idc: 13, max_mbps: 11_880, max_fs: 396, max_dpb_mbs: 2_376, max_br_kbps: 768 },
    H264Row { level_idc: 20, max_mbps: 11_880, max_fs: 396, max_dpb_mbs: 2_376, max_br_kbps: 2_000 },
    H264Row { level_idc: 21, max_mbps: 19_800, max_fs: 792, max_dpb_mbs: 4_752, max_br_kbps: 4_000 },
    H264Row { level_idc: 22, max_mbps: 20_250, max_fs: 1_620, max_dpb_mbs: 8_100, max_br_kbps: 4_000 },
    H264Row { level_idc: 30, max_mbps: 40_500, max_fs: 1_620, max_dpb_mbs: 8_100, max_br_kbps: 10_000 },
    H264Row { level_idc: 31, max_mbps: 108_000, max_fs: 3_600, max_dpb_mbs: 18_000, max_br_kbps: 14_000 },
    H264Row { level_idc: 32, max_mbps: 216_000, max_fs: 5_120, max_dpb_mbs: 20_480, max_br_kbps: 20_000 },
    H264Row { level_idc: 40, max_mbps: 245_760, max_fs: 8_192, max_dpb_mbs: 32_768, max_br_kbps: 20_000 },
    H264Row { level_idc: 41, max_mbps: 245_760, max_fs: 8_192, max_dpb_mbs: 32_768, max_br_kbps: 50_000 },
    H264Row { level_idc: 42, max_mbps: 522_240, max_fs: 8_704, max_dpb_mbs: 34_816, max_br_kbps: 50_000 },
    H264Row { level_idc: 50, max_mbps: 589_824, max_fs: 22_080, max_dpb_mbs: 110_400, max_br_kbps: 135_000 },
    H264Row { level_idc: 51, max_mbps: 983_040, max_fs: 36_864, max_dpb_mbs: 184_320, max_br_kbps: 240_000 },
    H264Row { level_idc: 52, max_mbps: 2_073_600, max_fs: 36_864, max_dpb_mbs: 184_320, max_br_kbps: 240_000 },
    H264Row { level_idc: 60, max_mbps: 4_177_920, max_fs: 139_264, max_dpb_mbs: 696_320, max_br_kbps: 240_000 },
    H264Row { level_idc: 61, max_mbps: 8_355_840, max_fs: 139_264, max_dpb_mbs: 696_320, max_br_kbps: 480_000 },
    H264Row { level_idc: 62, max_mbps: 16_711_680, max_fs: 139_264, max_dpb_mbs: 696_320, max_br_kbps: 800_000 },
];

struct H265Row {
    level_idc: u32,
    max_luma_ps: u64,
    max_luma_sr: u64,
    max_br_main_kbps: u64,
    max_br_high_kbps: Option<u64>,
}

/// Annex A. `level_idc` uses the same `level * 10` convention (5.1 =>
/// 51); tiers below 4.0 have no high-tier row.
const H265_LEVELS: &[H265Row] = &[
    H265Row { level_idc: 10, max_luma_ps: 36_864, max_luma_sr: 552_960, max_br_main_kbps: 128, max_br_high_kbps: None },
    H265Row { level_idc: 20, max_luma_ps: 122_880, max_luma_sr: 3_686_400, max_br_main_kbps: 1_500, max_br_high_kbps: None },
    H265Row { level_idc: 21, max_luma_ps: 245_760, max_luma_sr: 7_372_800, max_br_main_kbps: 3_000, max_br_high_kbps: None },
    H265Row { level_idc: 30, max_luma_ps: 552_960, max_luma_sr: 16_588_800, max_br_main_kbps: 6_000, max_br_high_kbps: None },
    H265Row { level_idc: 31, max_luma_ps: 983_040, max_luma_sr: 33_177_600, max_br_main_kbps: 10_000, max_br_high_kbps: None },
    H265Row { level_idc: 40, max_luma_ps: 2_228_224, max_luma_sr: 66_846_720, max_br_main_kbps: 12_000, max_br_high_kbps: Some(30_000) },
    H265Row { level_idc: 41, max_luma_ps: 2_228_224, max_luma_sr: 133_693_440, max_br_main_kbps: 20_000, max_br_high_kbps: Some(50_000) },
    H265Row { level_idc: 50, max_luma_ps: 8_912_896, max_luma_sr: 267_386_880, max_br_main_kbps: 25_000, max_br_high_kbps: Some(100_000) },
    H265Row { level_idc: 51, max_luma_ps: 8_912_896, max_luma_sr: 534_773_760, max_br_main_kbps: 40_000, max_br_high_kbps: Some(160_000) },
    H265Row { level_idc: 52, max_luma_ps: 8_912_896, max_luma_sr: 1_069_547_520, max_br_main_kbps: 60_000, max_br_high_kbps: Some(240_000) },
    H265Row { level_idc: 60, max_luma_ps: 35_651_584, max_luma_sr: 1_069_547_520, max_br_main_kbps: 60_000, max_br_high_kbps: Some(240_000) },
    H265Row { level_idc: 61, max_luma_ps: 35_651_584, max_luma_sr: 2_139_095_040, max_br_main_kbps: 120_000, max_br_high_kbps: Some(480_000) },
    H265Row { level_idc: 62, max_luma_ps: 35_651_584, max_luma_sr: 4_278_190_080, max_br_main_kbps: 240_000, max_br_high_kbps: Some(800_000) },
];

pub struct LevelSelector;

impl LevelSelector {
    pub fn select_h264(cfg: &EncoderConfig) -> Result<SelectedLevel, ConfigError> {
        let pic_size_mbs = Self::mb_count(cfg.width.get(), cfg.height.get());
        let mbps = Self::luma_sample_rate(pic_size_mbs, cfg.framerate);
        let max_br_bits = cfg.average_bitrate as u64;

        for row in H264_LEVELS {
            if pic_size_mbs <= row.max_fs
                && mbps <= row.max_mbps
                && pic_size_mbs <= row.max_dpb_mbs
                && max_br_bits <= row.max_br_kbps * 1_000
            {
                return Ok(SelectedLevel { level_idc: row.level_idc, high_tier: false });
            }
        }

        Err(ConfigError::LevelUnreachable {
            codec: "H264",
            picture_description: format!(
                "{}x{} @ {:.2} fps, {} bps",
                cfg.width,
                cfg.height,
                cfg.framerate.num as f64 / cfg.framerate.den.get() as f64,
                cfg.average_bitrate
            ),
        })
    }

    pub fn select_h265(cfg: &EncoderConfig) -> Result<SelectedLevel, ConfigError> {
        let pic_size_samples = cfg.width.get() as u64 * cfg.height.get() as u64;
        let luma_sr = Self::luma_sample_rate(pic_size_samples, cfg.framerate);
        let max_br_bits = cfg.average_bitrate as u64;

        for row in H265_LEVELS {
            if pic_size_samples <= row.max_luma_ps && luma_sr <= row.max_luma_sr {
                let fits_main = max_br_bits <= row.max_br_main_kbps * 1_000;
                let fits_high = row
                    .max_br_high_kbps
                    .is_some_and(|kbps| max_br_bits <= kbps * 1_000);
                if fits_main {
                    return Ok(SelectedLevel { level_idc: row.level_idc, high_tier: false });
                }
                if fits_high {
                    return Ok(SelectedLevel { level_idc: row.level_idc, high_tier: true });
                }
            }
        }

        Err(ConfigError::LevelUnreachable {
            codec: "H265",
            picture_description: format!(
                "{}x{} @ {:.2} fps, {} bps",
                cfg.width,
                cfg.height,
                cfg.framerate.num as f64 / cfg.framerate.den.get() as f64,
                cfg.average_bitrate
            ),
        })
    }

    fn mb_count(width: u32, height: u32) -> u64 {
        let mbs_w = (width as u64).div_ceil(16);
        let mbs_h = (height as u64).div_ceil(16);
        mbs_w * mbs_h
    }

    fn luma_sample_rate(pic_size: u64, framerate: Rational) -> u64 {
        (pic_size * framerate.num as u64).div_ceil(framerate.den.get() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratecontrol::RateControlMode;
    use crate::types::{ChromaFormat, Codec, Level};
    use std::num::NonZeroU32;

    fn cfg(width: u32, height: u32, bitrate: u32) -> EncoderConfig {
        EncoderConfig {
            codec: Codec::H264,
            profile: "high",
            level: Level::Auto,
            width: NonZeroU32::new(width).unwrap(),
            height: NonZeroU32::new(height).unwrap(),
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
            average_bitrate: bitrate,
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
    fn qcif_picks_a_low_level() {
        let level = LevelSelector::select_h264(&cfg(176, 144, 64_000)).unwrap();
        assert_eq!(level.level_idc, 10);
    }

    #[test]
    fn fhd_picks_level_4_or_higher() {
        let level = LevelSelector::select_h264(&cfg(1920, 1080, 10_000_000)).unwrap();
        assert!(level.level_idc >= 40);
    }

    #[test]
    fn absurd_resolution_is_unreachable() {
        let err = LevelSelector::select_h264(&cfg(16384, 16384, 1_000)).unwrap_err();
        assert!(matches!(err, ConfigError::LevelUnreachable { codec: "H264", .. }));
    }

    #[test]
    fn h265_4k_high_bitrate_needs_high_tier() {
        let mut c = cfg(3840, 2160, 45_000_000);
        c.codec = Codec::H265;
        let level = LevelSelector::select_h265(&c).unwrap();
        assert!(level.high_tier);
    }
}
