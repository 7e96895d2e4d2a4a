//! H.264 PPS (Picture Parameter Set) 解析.

use nalscope_core::bitreader::BitReader;
use nalscope_core::{ScopeError, ScopeResult};

use crate::sps::{MAX_SPS_ID, skip_scaling_lists};

/// PPS ID 上限 (含)
pub const MAX_PPS_ID: u32 = 255;

/// PPS 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    /// PPS ID (pic_parameter_set_id, 0-255)
    pub pps_id: u32,
    /// 引用的 SPS ID
    pub sps_id: u32,
    /// entropy_coding_mode_flag (false=CAVLC, true=CABAC)
    pub entropy_coding_mode: bool,
    /// bottom_field_pic_order_in_frame_present_flag,
    /// 为 true 时帧图像的 slice header 携带底场 POC 增量
    pub bottom_field_pic_order_in_frame_present: bool,
    /// slice group 数
    pub num_slice_groups: u32,
    /// 默认 L0 参考索引数量
    pub num_ref_idx_l0_default_active: u32,
    /// 默认 L1 参考索引数量
    pub num_ref_idx_l1_default_active: u32,
    /// weighted_pred_flag
    pub weighted_pred: bool,
    /// weighted_bipred_idc (0-2)
    pub weighted_bipred_idc: u32,
    /// 初始 QP
    pub pic_init_qp: i32,
    /// 初始 QS
    pub pic_init_qs: i32,
    /// chroma_qp_index_offset
    pub chroma_qp_index_offset: i32,
    /// second_chroma_qp_index_offset (无扩展字段时等于 chroma_qp_index_offset)
    pub second_chroma_qp_index_offset: i32,
    /// deblocking_filter_control_present_flag
    pub deblocking_filter_control_present: bool,
    /// constrained_intra_pred_flag
    pub constrained_intra_pred: bool,
    /// redundant_pic_cnt_present_flag
    pub redundant_pic_cnt_present: bool,
    /// transform_8x8_mode_flag
    pub transform_8x8_mode: bool,
    /// pic_scaling_matrix_present_flag
    pub pic_scaling_matrix_present: bool,
}

/// 从 RBSP 负载 (不含 NAL 头部字节) 解析 PPS
///
/// `chroma_format_of` 按 SPS ID 查询已存储 SPS 的 chroma_format_idc,
/// 引用的 SPS 不存在时返回 [`ScopeError::MissingParameterSet`].
pub fn parse_pps(
    payload: &[u8],
    chroma_format_of: impl Fn(u32) -> Option<u32>,
) -> ScopeResult<Pps> {
    if payload.is_empty() {
        return Err(ScopeError::InvalidData("H264: PPS RBSP 为空".into()));
    }

    let mut br = BitReader::new(payload);
    let pps_id = br.read_ue()?;
    if pps_id > MAX_PPS_ID {
        return Err(ScopeError::InvalidData(format!(
            "H264: pps_id 超出范围, pps_id={}",
            pps_id
        )));
    }

    let sps_id = br.read_ue()?;
    if sps_id > MAX_SPS_ID {
        return Err(ScopeError::InvalidData(format!(
            "H264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }
    let chroma_format_idc = chroma_format_of(sps_id).ok_or(ScopeError::MissingParameterSet {
        kind: "SPS",
        id: sps_id,
    })?;

    let entropy_coding_mode = br.read_flag();
    let bottom_field_pic_order_in_frame_present = br.read_flag();

    let num_slice_groups_minus1 = br.read_ue()?;
    if num_slice_groups_minus1 > 7 {
        return Err(ScopeError::InvalidData(format!(
            "H264: num_slice_groups_minus1 超出范围, value={}",
            num_slice_groups_minus1
        )));
    }
    if num_slice_groups_minus1 > 0 {
        skip_slice_groups(&mut br, num_slice_groups_minus1)?;
    }

    let num_ref_idx_l0_default_active = br.read_ue()?.saturating_add(1);
    let num_ref_idx_l1_default_active = br.read_ue()?.saturating_add(1);
    if num_ref_idx_l0_default_active > 32 || num_ref_idx_l1_default_active > 32 {
        return Err(ScopeError::InvalidData(format!(
            "H264: num_ref_idx_default_active 超出范围, l0={}, l1={}",
            num_ref_idx_l0_default_active, num_ref_idx_l1_default_active
        )));
    }

    let weighted_pred = br.read_flag();
    let weighted_bipred_idc = br.read_bits(2);
    if weighted_bipred_idc > 2 {
        return Err(ScopeError::InvalidData(format!(
            "H264: weighted_bipred_idc 非法, value={}",
            weighted_bipred_idc
        )));
    }

    let pic_init_qp = 26 + br.read_se()?;
    let pic_init_qs = 26 + br.read_se()?;
    let chroma_qp_index_offset = br.read_se()?;
    validate_chroma_offset("chroma_qp_index_offset", chroma_qp_index_offset)?;

    let deblocking_filter_control_present = br.read_flag();
    let constrained_intra_pred = br.read_flag();
    let redundant_pic_cnt_present = br.read_flag();

    let mut transform_8x8_mode = false;
    let mut pic_scaling_matrix_present = false;
    let mut second_chroma_qp_index_offset = chroma_qp_index_offset;

    if br.more_rbsp_data() {
        transform_8x8_mode = br.read_flag();
        pic_scaling_matrix_present = br.read_flag();
        if pic_scaling_matrix_present {
            let lists_8x8 = match (transform_8x8_mode, chroma_format_idc) {
                (false, _) => 0,
                (true, 3) => 6,
                (true, _) => 2,
            };
            skip_scaling_lists(&mut br, 6 + lists_8x8)?;
        }
        second_chroma_qp_index_offset = br.read_se()?;
        validate_chroma_offset(
            "second_chroma_qp_index_offset",
            second_chroma_qp_index_offset,
        )?;
    }

    br.check_truncated("H264: PPS")?;

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode,
        bottom_field_pic_order_in_frame_present,
        num_slice_groups: num_slice_groups_minus1 + 1,
        num_ref_idx_l0_default_active,
        num_ref_idx_l1_default_active,
        weighted_pred,
        weighted_bipred_idc,
        pic_init_qp,
        pic_init_qs,
        chroma_qp_index_offset,
        second_chroma_qp_index_offset,
        deblocking_filter_control_present,
        constrained_intra_pred,
        redundant_pic_cnt_present,
        transform_8x8_mode,
        pic_scaling_matrix_present,
    })
}

fn validate_chroma_offset(field: &str, value: i32) -> ScopeResult<()> {
    if !(-12..=12).contains(&value) {
        return Err(ScopeError::InvalidData(format!(
            "H264: {} 超出范围, value={}",
            field, value
        )));
    }
    Ok(())
}

/// 跳过 slice group 相关语法
fn skip_slice_groups(br: &mut BitReader<'_>, num_slice_groups_minus1: u32) -> ScopeResult<()> {
    let slice_group_map_type = br.read_ue()?;
    match slice_group_map_type {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                br.read_ue()?; // run_length_minus1
            }
        }
        1 => {}
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                br.read_ue()?; // top_left
                br.read_ue()?; // bottom_right
            }
        }
        3..=5 => {
            br.skip_bits(1); // slice_group_change_direction_flag
            br.read_ue()?; // slice_group_change_rate_minus1
        }
        6 => {
            let pic_size_in_map_units = br.read_ue()?.saturating_add(1);
            let bits_per_id = u32::BITS - num_slice_groups_minus1.leading_zeros();
            let total_bits = (pic_size_in_map_units as usize).saturating_mul(bits_per_id as usize);
            if total_bits > br.bits_left() {
                return Err(ScopeError::Truncated(format!(
                    "H264: PPS slice_group_id 越过数据末尾, map_units={}",
                    pic_size_in_map_units
                )));
            }
            br.skip_bits(total_bits);
        }
        _ => {
            return Err(ScopeError::InvalidData(format!(
                "H264: slice_group_map_type 非法, value={}",
                slice_group_map_type
            )));
        }
    }
    Ok(())
}
