//! `GopPlanner` (spec §4.1): precomputes the per-GOP `GopEntry` table and
//! the derived frame-num/POC wrap constants from an `EncoderConfig`.
//!
//! No teacher equivalent exists — `vulkan_encoder.rs::encode` is
//! IDR-period-only, I/P, FIFO reference eviction, with no GOP table or
//! B-pyramid logic at all (its `encode_parameter_sets.rs::sps` even
//! hardcodes the "no B-slices" SPS flag bit). This module is grounded in
//! the algorithm text of spec §4.1 directly, and in the teacher's
//! parameter-validation idiom (`device.rs::validate_and_fill_encoder_
//! parameters`'s `ConfigError`-on-bad-input style).

use crate::codec_ops::CodecOps;
use crate::error::ConfigError;
use crate::types::{EncoderConfig, GopDerived, GopEntry, SliceType};

pub struct GopPlanner;

impl GopPlanner {
    /// `plan(cfg, max_refs_list0, max_refs_list1) -> (table, derived)`,
    /// spec §4.1. `max_refs_list0/1` come from the GPU implementation's
    /// capability query (`SessionOrchestrator`/`LevelSelector`'s
    /// capability enumeration).
    pub fn plan<C: CodecOps>(
        cfg: &EncoderConfig,
        max_refs_list0: u32,
        max_refs_list1: u32,
    ) -> Result<(Vec<GopEntry>, GopDerived), ConfigError> {
        if !C::supports_b_frames() && cfg.num_bframes != 0 {
            return Err(ConfigError::InvalidParameter {
                field: "num_bframes",
                problem: format!("{} does not support B-frames", C::name()),
            });
        }

        // Step 1: idr_period defaulting and clamp.
        let mut idr_period = cfg.idr_period;
        if idr_period == 0 {
            idr_period = cfg.framerate.ceil_div().max(1) as u32;
        }
        idr_period = idr_period.clamp(1, 1024);

        // Step 2: clamp num_bframes.
        let mut num_bframes = cfg.num_bframes;
        let max_bframes = if idr_period > 8 {
            (idr_period - 1) / 2
        } else {
            idr_period.saturating_sub(2)
        };
        num_bframes = num_bframes.min(max_bframes);

        // Step 3: intra-only override.
        let intra_only = max_refs_list0 == 0;
        let mut num_iframes = cfg.num_iframes;
        let mut b_pyramid = cfg.b_pyramid;
        let mut ref_num_list1 = cfg.ref_num_list1;
        let ip_period;

        if intra_only {
            num_bframes = 0;
            b_pyramid = false;
            num_iframes = idr_period.saturating_sub(1);
            ip_period = 0;
        } else {
            // Step 4.
            if cfg.num_ref_frames <= 1 {
                num_bframes = 0;
                ref_num_list1 = 0;
            }
            if cfg.num_ref_frames <= 2 {
                b_pyramid = false;
            }
            if b_pyramid {
                ref_num_list1 = 1;
            }
            let _ = max_refs_list1; // consulted by DpbManager for list1 truncation

            // Step 5.
            ip_period = 1 + num_bframes;
        }

        // Derived constants (step 7) are independent of the intra-only
        // branch.
        let log2_max_frame_num = idr_period.max(1).ilog2().saturating_add(
            if idr_period.is_power_of_two() { 0 } else { 1 },
        );
        let log2_max_frame_num = log2_max_frame_num.clamp(4, 16);
        let log2_max_pic_order_cnt = (log2_max_frame_num + 1).min(16);
        let derived = GopDerived {
            log2_max_frame_num,
            max_frame_num: 1 << log2_max_frame_num,
            log2_max_pic_order_cnt,
            max_pic_order_cnt: 1 << log2_max_pic_order_cnt,
        };

        let table = if intra_only {
            Self::fill_intra_only(idr_period)
        } else {
            Self::fill_general(idr_period, ip_period, num_iframes, num_bframes, b_pyramid)
        };

        let _ = ref_num_list1;
        Ok((table, derived))
    }

    fn fill_intra_only(idr_period: u32) -> Vec<GopEntry> {
        (0..idr_period)
            .map(|i| GopEntry::intra(i == 0))
            .collect()
    }

    fn fill_general(
        idr_period: u32,
        ip_period: u32,
        num_iframes: u32,
        num_bframes: u32,
        b_pyramid: bool,
    ) -> Vec<GopEntry> {
        // Step 5 (gop_ref_num) and step 6 (i_period).
        let gop_ref_num_base = (idr_period + num_bframes).div_ceil(num_bframes + 1);
        let ends_on_p = (idr_period - 1) % ip_period == 0;
        let gop_ref_num = if ends_on_p {
            gop_ref_num_base
        } else {
            gop_ref_num_base + 1
        };
        let i_period = (gop_ref_num / (num_iframes + 1)).max(1) * ip_period;

        let mut table = vec![GopEntry::intra(false); idr_period as usize];
        table[0] = GopEntry::intra(true);

        let mut i_inserted = 0u32;
        let mut i = 1u32;
        while i < idr_period {
            if i % ip_period != 0 {
                // B-run: collect the whole run [i, run_end) at once so the
                // pyramid levels can be assigned per spec §4.1's
                // "b-pyramid levelling" text.
                let run_start = i;
                let mut run_end = i;
                while run_end < idr_period && run_end % ip_period != 0 {
                    run_end += 1;
                }
                let run_len = (run_end - run_start) as usize;
                let levels = Self::assign_pyramid_levels(run_len, b_pyramid);
                let highest = levels.iter().copied().max().unwrap_or(0);
                for (k, &level) in levels.iter().enumerate() {
                    let idx = (run_start as usize) + k;
                    table[idx] = GopEntry {
                        slice_type: SliceType::B,
                        is_reference: level < highest,
                        pyramid_level: level,
                        left_ref_poc_diff: -2 * (k as i32 + 1),
                        right_ref_poc_diff: 2 * (run_len as i32 - k as i32),
                    };
                }
                i = run_end;
                continue;
            }

            if i % i_period == 0 && i_inserted < num_iframes {
                table[i as usize] = GopEntry::intra(true);
                i_inserted += 1;
            } else {
                table[i as usize] = GopEntry::inter_p();
            }
            // Step by 1, not by `ip_period`: the next position may open a
            // new B-run, which the `i % ip_period != 0` branch above only
            // detects if every post-anchor position is visited.
            i += 1;
        }

        // Final position forced to P/ref=true.
        if idr_period > 1 && ip_period > 0 {
            let last = (idr_period - 1) as usize;
            table[last] = GopEntry::inter_p();
        }

        table
    }

    /// Recursively assigns pyramid levels to a run of B-slots (spec
    /// §4.1's "B-pyramid levelling"): the middle of the run gets level
    /// `L`, its two halves recurse at `L+1`, until the recursion bottoms
    /// out — those leaves share the deepest level reached. With
    /// `b_pyramid` disabled, every B in the run shares one flat,
    /// non-reference level.
    fn assign_pyramid_levels(run_len: usize, b_pyramid: bool) -> Vec<u32> {
        let mut levels = vec![0u32; run_len];
        if run_len == 0 {
            return levels;
        }
        if !b_pyramid {
            levels.iter_mut().for_each(|l| *l = 1);
            return levels;
        }
        Self::assign_recursive(&mut levels, 0, run_len, 0);
        levels
    }

    fn assign_recursive(levels: &mut [u32], start: usize, end: usize, level: u32) {
        if start >= end {
            return;
        }
        let mid = start + (end - start) / 2;
        levels[mid] = level;
        Self::assign_recursive(levels, start, mid, level + 1);
        Self::assign_recursive(levels, mid + 1, end, level + 1);
    }
}
