//! H.264 SPS (Sequence Parameter Set) 解析.
//!
//! 只保留图像边界检测需要的字段 (frame_num 位宽, 场编码标志, POC 类型等),
//! 其余语法元素 (scaling list, VUI) 逐字段读过以保持位对齐, 不保存取值.

use nalscope_core::bitreader::BitReader;
use nalscope_core::{ScopeError, ScopeResult};

/// SPS ID 上限 (含)
pub const MAX_SPS_ID: u32 = 31;

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// SPS ID (seq_parameter_set_id, 0-31)
    pub sps_id: u32,
    /// profile_idc (66=Baseline, 77=Main, 88=Extended, 100=High ...)
    pub profile_idc: u8,
    /// constraint_set0..5 标志与保留位
    pub constraint_set_flags: u8,
    /// level_idc (如 30=3.0, 41=4.1)
    pub level_idc: u8,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag (仅 4:4:4)
    pub separate_colour_plane: bool,
    /// 亮度位深
    pub bit_depth_luma: u32,
    /// 色度位深
    pub bit_depth_chroma: u32,
    /// log2(MaxFrameNum), 即 slice header 中 frame_num 的位宽
    pub log2_max_frame_num: u32,
    /// 图像顺序计数类型 (0, 1, 2)
    pub pic_order_cnt_type: u32,
    /// log2(MaxPicOrderCntLsb), 仅 pic_order_cnt_type == 0
    pub log2_max_poc_lsb: u32,
    /// delta_pic_order_always_zero_flag, 仅 pic_order_cnt_type == 1
    pub delta_pic_order_always_zero: bool,
    /// offset_for_non_ref_pic, 仅 pic_order_cnt_type == 1
    pub offset_for_non_ref_pic: i32,
    /// offset_for_top_to_bottom_field, 仅 pic_order_cnt_type == 1
    pub offset_for_top_to_bottom_field: i32,
    /// offset_for_ref_frame 循环, 仅 pic_order_cnt_type == 1
    pub offset_for_ref_frame: Vec<i32>,
    /// 最大参考帧数
    pub max_num_ref_frames: u32,
    /// gaps_in_frame_num_value_allowed_flag
    pub gaps_in_frame_num_allowed: bool,
    /// 图像宽度 (宏块数)
    pub pic_width_in_mbs: u32,
    /// 图像高度 (map unit 数, 场编码时为半高)
    pub pic_height_in_map_units: u32,
    /// frame_mbs_only_flag, 为 false 时 slice header 携带 field_pic_flag
    pub frame_mbs_only: bool,
    /// mb_adaptive_frame_field_flag (MBAFF)
    pub mb_adaptive_frame_field: bool,
    /// direct_8x8_inference_flag
    pub direct_8x8_inference: bool,
    /// 裁剪偏移 (左, 右, 上, 下), 单位为裁剪单元
    pub crop: [u32; 4],
    /// 是否存在 VUI 参数
    pub vui_present: bool,
}

impl Sps {
    /// 色度数组类型 (separate_colour_plane 时为 0)
    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane {
            0
        } else {
            self.chroma_format_idc
        }
    }

    /// 帧高度 (宏块数)
    pub fn frame_height_in_mbs(&self) -> u32 {
        let mult = if self.frame_mbs_only { 1 } else { 2 };
        self.pic_height_in_map_units.saturating_mul(mult)
    }

    /// 裁剪后的图像尺寸 (像素), 裁剪参数非法时返回 None
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (unit_x, unit_y) = cropping_unit(self.chroma_array_type(), self.frame_mbs_only);
        let raw_width = self.pic_width_in_mbs.checked_mul(16)?;
        let raw_height = self.frame_height_in_mbs().checked_mul(16)?;
        let [left, right, top, bottom] = self.crop;
        let crop_x = left.checked_add(right)?.checked_mul(unit_x)?;
        let crop_y = top.checked_add(bottom)?.checked_mul(unit_y)?;
        if crop_x >= raw_width || crop_y >= raw_height {
            return None;
        }
        Some((raw_width - crop_x, raw_height - crop_y))
    }
}

/// 是否为已识别的 profile (Baseline/Main/Extended 与 High 系列)
pub fn is_supported_profile(profile_idc: u8) -> bool {
    matches!(profile_idc, 66 | 77 | 88) || is_high_profile(profile_idc)
}

/// High 系列 profile: SPS 中携带 chroma_format_idc/位深/scaling matrix
fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// 从 RBSP 负载 (不含 NAL 头部字节) 解析 SPS
pub fn parse_sps(payload: &[u8]) -> ScopeResult<Sps> {
    if payload.len() < 3 {
        return Err(ScopeError::InvalidData("H264: SPS RBSP 太短".into()));
    }

    let mut br = BitReader::new(payload);

    let profile_idc = br.read_bits(8) as u8;
    let constraint_set_flags = br.read_bits(8) as u8;
    let level_idc = br.read_bits(8) as u8;
    if !is_supported_profile(profile_idc) {
        return Err(ScopeError::Unsupported(format!(
            "H264: 不支持的 profile_idc={}",
            profile_idc
        )));
    }

    let sps_id = br.read_ue()?;
    if sps_id > MAX_SPS_ID {
        return Err(ScopeError::InvalidData(format!(
            "H264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1; // 默认 4:2:0
    let mut separate_colour_plane = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;

    if is_high_profile(profile_idc) {
        chroma_format_idc = br.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(ScopeError::InvalidData(format!(
                "H264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = br.read_flag();
        }
        bit_depth_luma = br.read_ue()?.saturating_add(8);
        bit_depth_chroma = br.read_ue()?.saturating_add(8);
        if !(8..=14).contains(&bit_depth_luma) || !(8..=14).contains(&bit_depth_chroma) {
            return Err(ScopeError::InvalidData(format!(
                "H264: 位深非法, luma={}, chroma={}",
                bit_depth_luma, bit_depth_chroma
            )));
        }
        br.skip_bits(1); // qpprime_y_zero_transform_bypass_flag

        // seq_scaling_matrix_present_flag
        if br.read_flag() {
            let list_count = if chroma_format_idc != 3 { 8 } else { 12 };
            skip_scaling_lists(&mut br, list_count)?;
        }
    }

    let log2_max_frame_num_minus4 = br.read_ue()?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(ScopeError::InvalidData(format!(
            "H264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }

    let pic_order_cnt_type = br.read_ue()?;
    let mut log2_max_poc_lsb = 0u32;
    let mut delta_pic_order_always_zero = false;
    let mut offset_for_non_ref_pic = 0i32;
    let mut offset_for_top_to_bottom_field = 0i32;
    let mut offset_for_ref_frame = Vec::new();
    match pic_order_cnt_type {
        0 => {
            let log2_max_poc_lsb_minus4 = br.read_ue()?;
            if log2_max_poc_lsb_minus4 > 12 {
                return Err(ScopeError::InvalidData(format!(
                    "H264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    log2_max_poc_lsb_minus4
                )));
            }
            log2_max_poc_lsb = log2_max_poc_lsb_minus4 + 4;
        }
        1 => {
            delta_pic_order_always_zero = br.read_flag();
            offset_for_non_ref_pic = br.read_se()?;
            offset_for_top_to_bottom_field = br.read_se()?;
            let cycle_len = br.read_ue()?;
            if cycle_len > 255 {
                return Err(ScopeError::InvalidData(format!(
                    "H264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    cycle_len
                )));
            }
            for _ in 0..cycle_len {
                offset_for_ref_frame.push(br.read_se()?);
            }
        }
        2 => {}
        _ => {
            return Err(ScopeError::InvalidData(format!(
                "H264: pic_order_cnt_type 非法, value={}",
                pic_order_cnt_type
            )));
        }
    }

    let max_num_ref_frames = br.read_ue()?;
    let gaps_in_frame_num_allowed = br.read_flag();
    let pic_width_in_mbs = br.read_ue()?.saturating_add(1);
    let pic_height_in_map_units = br.read_ue()?.saturating_add(1);

    let frame_mbs_only = br.read_flag();
    let mb_adaptive_frame_field = if frame_mbs_only {
        false
    } else {
        br.read_flag()
    };
    let direct_8x8_inference = br.read_flag();

    let mut crop = [0u32; 4];
    if br.read_flag() {
        for offset in &mut crop {
            *offset = br.read_ue()?;
        }
    }

    let vui_present = br.read_flag();
    if vui_present {
        skip_vui(&mut br)?;
    }

    br.check_truncated("H264: SPS")?;

    Ok(Sps {
        sps_id,
        profile_idc,
        constraint_set_flags,
        level_idc,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_frame_num: log2_max_frame_num_minus4 + 4,
        pic_order_cnt_type,
        log2_max_poc_lsb,
        delta_pic_order_always_zero,
        offset_for_non_ref_pic,
        offset_for_top_to_bottom_field,
        offset_for_ref_frame,
        max_num_ref_frames,
        gaps_in_frame_num_allowed,
        pic_width_in_mbs,
        pic_height_in_map_units,
        frame_mbs_only,
        mb_adaptive_frame_field,
        direct_8x8_inference,
        crop,
        vui_present,
    })
}

/// 获取 cropping 单位
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let sub_width = match chroma_array_type {
        0 | 3 => 1,
        _ => 2, // 4:2:0 和 4:2:2
    };
    let sub_height = match chroma_array_type {
        0 | 2 | 3 => 1,
        _ => 2, // 4:2:0
    };
    let height_mult = if frame_mbs_only { 1 } else { 2 };

    (sub_width, sub_height * height_mult)
}

// ============================================================
// scaling list 跳读 (SPS/PPS 共用)
// ============================================================

/// 逐个读过 `list_count` 组 scaling list, 前 6 组为 4x4, 其余为 8x8
pub(crate) fn skip_scaling_lists(br: &mut BitReader<'_>, list_count: usize) -> ScopeResult<()> {
    for list_idx in 0..list_count {
        // scaling_list_present_flag
        if !br.read_flag() {
            continue;
        }
        let size = if list_idx < 6 { 16 } else { 64 };
        skip_scaling_list(br, size)?;
    }
    Ok(())
}

fn skip_scaling_list(br: &mut BitReader<'_>, size: usize) -> ScopeResult<()> {
    let mut last_scale = 8i64;
    let mut next_scale = 8i64;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = i64::from(br.read_se()?);
            next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

// ============================================================
// VUI 跳读
// ============================================================

/// 逐字段读过 VUI (含 HRD 与 bitstream_restriction), 仅用于保持位对齐
fn skip_vui(br: &mut BitReader<'_>) -> ScopeResult<()> {
    // aspect_ratio_info_present_flag
    if br.read_flag() {
        let aspect_ratio_idc = br.read_bits(8);
        if aspect_ratio_idc == 255 {
            // Extended_SAR: sar_width, sar_height
            br.skip_bits(32);
        }
    }

    // overscan_info_present_flag
    if br.read_flag() {
        br.skip_bits(1); // overscan_appropriate_flag
    }

    // video_signal_type_present_flag
    if br.read_flag() {
        br.skip_bits(4); // video_format + video_full_range_flag
        if br.read_flag() {
            br.skip_bits(24); // colour_primaries, transfer_characteristics, matrix_coefficients
        }
    }

    // chroma_loc_info_present_flag
    if br.read_flag() {
        br.read_ue()?; // chroma_sample_loc_type_top_field
        br.read_ue()?; // chroma_sample_loc_type_bottom_field
    }

    // timing_info_present_flag
    if br.read_flag() {
        br.skip_bits(32); // num_units_in_tick
        br.skip_bits(32); // time_scale
        br.skip_bits(1); // fixed_frame_rate_flag
    }

    let nal_hrd = br.read_flag();
    if nal_hrd {
        skip_hrd_parameters(br)?;
    }
    let vcl_hrd = br.read_flag();
    if vcl_hrd {
        skip_hrd_parameters(br)?;
    }
    if nal_hrd || vcl_hrd {
        br.skip_bits(1); // low_delay_hrd_flag
    }
    br.skip_bits(1); // pic_struct_present_flag

    // bitstream_restriction_flag
    if br.read_flag() {
        br.skip_bits(1); // motion_vectors_over_pic_boundaries_flag
        br.read_ue()?; // max_bytes_per_pic_denom
        br.read_ue()?; // max_bits_per_mb_denom
        br.read_ue()?; // log2_max_mv_length_horizontal
        br.read_ue()?; // log2_max_mv_length_vertical
        br.read_ue()?; // max_num_reorder_frames
        br.read_ue()?; // max_dec_frame_buffering
    }
    Ok(())
}

fn skip_hrd_parameters(br: &mut BitReader<'_>) -> ScopeResult<()> {
    let cpb_cnt = br.read_ue()?.saturating_add(1);
    if cpb_cnt > 32 {
        return Err(ScopeError::InvalidData(format!(
            "H264: HRD cpb_cnt_minus1 超出范围, value={}",
            cpb_cnt - 1
        )));
    }
    br.skip_bits(4); // bit_rate_scale
    br.skip_bits(4); // cpb_size_scale
    for _ in 0..cpb_cnt {
        br.read_ue()?; // bit_rate_value_minus1
        br.read_ue()?; // cpb_size_value_minus1
        br.skip_bits(1); // cbr_flag
    }
    // initial_cpb_removal_delay_length_minus1, cpb_removal_delay_length_minus1,
    // dpb_output_delay_length_minus1, time_offset_length
    br.skip_bits(20);
    Ok(())
}
