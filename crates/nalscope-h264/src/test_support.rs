//! 单元测试用码流构造器: 以 BitWriter 按语法顺序写出 SPS/PPS/slice header RBSP.

use nalscope_core::bitwriter::BitWriter;

/// SPS 构造参数
#[derive(Debug, Clone)]
pub(crate) struct SpsBuilder {
    pub sps_id: u32,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub scaling_matrix: bool,
    pub log2_max_frame_num: u32,
    pub poc_type: u32,
    pub log2_max_poc_lsb: u32,
    pub delta_pic_order_always_zero: bool,
    pub offset_for_ref_frame: Vec<i32>,
    pub max_num_ref_frames: u32,
    pub width_mbs: u32,
    pub height_map_units: u32,
    pub frame_mbs_only: bool,
    pub mb_adaptive_frame_field: bool,
    pub crop: Option<[u32; 4]>,
    pub vui: bool,
}

impl Default for SpsBuilder {
    fn default() -> Self {
        Self {
            sps_id: 0,
            profile_idc: 66,
            level_idc: 30,
            scaling_matrix: false,
            log2_max_frame_num: 4,
            poc_type: 0,
            log2_max_poc_lsb: 4,
            delta_pic_order_always_zero: false,
            offset_for_ref_frame: Vec::new(),
            max_num_ref_frames: 1,
            width_mbs: 20,
            height_map_units: 15,
            frame_mbs_only: true,
            mb_adaptive_frame_field: false,
            crop: None,
            vui: false,
        }
    }
}

impl SpsBuilder {
    /// 生成 RBSP (含 NAL 头部字节 0x67)
    pub fn build_rbsp(&self) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(0x67, 8);
        bw.write_bits(u32::from(self.profile_idc), 8);
        bw.write_bits(0, 8); // constraint_set flags
        bw.write_bits(u32::from(self.level_idc), 8);
        bw.write_ue(self.sps_id);

        if matches!(self.profile_idc, 100 | 110 | 122 | 244) {
            bw.write_ue(1); // chroma_format_idc
            bw.write_ue(0); // bit_depth_luma_minus8
            bw.write_ue(0); // bit_depth_chroma_minus8
            bw.write_flag(false); // qpprime_y_zero_transform_bypass_flag
            bw.write_flag(self.scaling_matrix);
            if self.scaling_matrix {
                for list_idx in 0..8 {
                    let present = list_idx % 3 != 2;
                    bw.write_flag(present);
                    if present {
                        // 一个非零 delta 后以 next_scale=0 结束列表
                        bw.write_se(5);
                        bw.write_se(-13);
                    }
                }
            }
        }

        bw.write_ue(self.log2_max_frame_num - 4);
        bw.write_ue(self.poc_type);
        match self.poc_type {
            0 => bw.write_ue(self.log2_max_poc_lsb - 4),
            1 => {
                bw.write_flag(self.delta_pic_order_always_zero);
                bw.write_se(-1); // offset_for_non_ref_pic
                bw.write_se(1); // offset_for_top_to_bottom_field
                bw.write_ue(self.offset_for_ref_frame.len() as u32);
                for &offset in &self.offset_for_ref_frame {
                    bw.write_se(offset);
                }
            }
            _ => {}
        }

        bw.write_ue(self.max_num_ref_frames);
        bw.write_flag(false); // gaps_in_frame_num_value_allowed_flag
        bw.write_ue(self.width_mbs - 1);
        bw.write_ue(self.height_map_units - 1);
        bw.write_flag(self.frame_mbs_only);
        if !self.frame_mbs_only {
            bw.write_flag(self.mb_adaptive_frame_field);
        }
        bw.write_flag(true); // direct_8x8_inference_flag

        match self.crop {
            Some(crop) => {
                bw.write_flag(true);
                for offset in crop {
                    bw.write_ue(offset);
                }
            }
            None => bw.write_flag(false),
        }

        bw.write_flag(self.vui);
        if self.vui {
            write_full_vui(&mut bw);
        }
        bw.write_trailing_bits();
        bw.finish()
    }
}

/// 写出每个可选部分都存在的 VUI
fn write_full_vui(bw: &mut BitWriter) {
    bw.write_flag(true); // aspect_ratio_info_present_flag
    bw.write_bits(255, 8); // Extended_SAR
    bw.write_bits(4, 16);
    bw.write_bits(3, 16);
    bw.write_flag(true); // overscan_info_present_flag
    bw.write_flag(false);
    bw.write_flag(true); // video_signal_type_present_flag
    bw.write_bits(5, 3);
    bw.write_flag(false);
    bw.write_flag(true); // colour_description_present_flag
    bw.write_bits(1, 8);
    bw.write_bits(1, 8);
    bw.write_bits(1, 8);
    bw.write_flag(true); // chroma_loc_info_present_flag
    bw.write_ue(0);
    bw.write_ue(1);
    bw.write_flag(true); // timing_info_present_flag
    bw.write_bits(1001, 32);
    bw.write_bits(60_000, 32);
    bw.write_flag(true);
    for _ in 0..2 {
        // nal_hrd / vcl_hrd
        bw.write_flag(true);
        bw.write_ue(1); // cpb_cnt_minus1
        bw.write_bits(4, 4);
        bw.write_bits(6, 4);
        for _ in 0..2 {
            bw.write_ue(9_999);
            bw.write_ue(29_999);
            bw.write_flag(false);
        }
        bw.write_bits(23, 5);
        bw.write_bits(23, 5);
        bw.write_bits(23, 5);
        bw.write_bits(24, 5);
    }
    bw.write_flag(false); // low_delay_hrd_flag
    bw.write_flag(true); // pic_struct_present_flag
    bw.write_flag(true); // bitstream_restriction_flag
    bw.write_flag(true);
    bw.write_ue(2);
    bw.write_ue(1);
    bw.write_ue(16);
    bw.write_ue(16);
    bw.write_ue(2);
    bw.write_ue(4);
}

/// PPS 构造参数
#[derive(Debug, Clone)]
pub(crate) struct PpsBuilder {
    pub pps_id: u32,
    pub sps_id: u32,
    pub entropy_coding_mode: bool,
    pub bottom_field_pic_order_in_frame_present: bool,
    pub num_slice_groups: u32,
    pub num_ref_idx_l0_default_active: u32,
    pub pic_init_qp: i32,
    pub chroma_qp_index_offset: i32,
    /// Some 时写出扩展字段 (transform_8x8_mode_flag, scaling matrix)
    pub transform_8x8_mode: Option<bool>,
}

impl Default for PpsBuilder {
    fn default() -> Self {
        Self {
            pps_id: 0,
            sps_id: 0,
            entropy_coding_mode: false,
            bottom_field_pic_order_in_frame_present: false,
            num_slice_groups: 1,
            num_ref_idx_l0_default_active: 1,
            pic_init_qp: 26,
            chroma_qp_index_offset: 0,
            transform_8x8_mode: None,
        }
    }
}

impl PpsBuilder {
    /// 生成 RBSP (含 NAL 头部字节 0x68)
    pub fn build_rbsp(&self) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(0x68, 8);
        bw.write_ue(self.pps_id);
        bw.write_ue(self.sps_id);
        bw.write_flag(self.entropy_coding_mode);
        bw.write_flag(self.bottom_field_pic_order_in_frame_present);
        bw.write_ue(self.num_slice_groups - 1);
        if self.num_slice_groups > 1 {
            bw.write_ue(0); // slice_group_map_type = 0 (interleaved)
            for _ in 0..self.num_slice_groups {
                bw.write_ue(9); // run_length_minus1
            }
        }
        bw.write_ue(self.num_ref_idx_l0_default_active - 1);
        bw.write_ue(0); // num_ref_idx_l1_default_active_minus1
        bw.write_flag(false); // weighted_pred_flag
        bw.write_bits(0, 2); // weighted_bipred_idc
        bw.write_se(self.pic_init_qp - 26);
        bw.write_se(0); // pic_init_qs_minus26
        bw.write_se(self.chroma_qp_index_offset);
        bw.write_flag(true); // deblocking_filter_control_present_flag
        bw.write_flag(false); // constrained_intra_pred_flag
        bw.write_flag(false); // redundant_pic_cnt_present_flag
        if let Some(transform_8x8_mode) = self.transform_8x8_mode {
            bw.write_flag(transform_8x8_mode);
            bw.write_flag(true); // pic_scaling_matrix_present_flag
            let list_count = 6 + if transform_8x8_mode { 2 } else { 0 };
            for list_idx in 0..list_count {
                let present = list_idx == 0 || list_idx == 6;
                bw.write_flag(present);
                if present {
                    bw.write_se(-8); // next_scale=0, 使用默认矩阵
                }
            }
            bw.write_se(-2); // second_chroma_qp_index_offset
        }
        bw.write_trailing_bits();
        bw.finish()
    }
}

/// slice header 构造参数
#[derive(Debug, Clone)]
pub(crate) struct SliceBuilder {
    pub idr: bool,
    pub first_mb: u32,
    pub slice_type: u32,
    pub pps_id: u32,
    pub frame_num: u32,
    pub field_pic: bool,
    pub bottom_field: bool,
    pub idr_pic_id: u32,
    pub poc_lsb: u32,
    pub delta_poc_bottom: i32,
    pub delta_poc: [i32; 2],
}

impl Default for SliceBuilder {
    fn default() -> Self {
        Self {
            idr: false,
            first_mb: 0,
            slice_type: 7, // I (全部 slice 同类型)
            pps_id: 0,
            frame_num: 0,
            field_pic: false,
            bottom_field: false,
            idr_pic_id: 0,
            poc_lsb: 0,
            delta_poc_bottom: 0,
            delta_poc: [0, 0],
        }
    }
}

impl SliceBuilder {
    /// 生成 slice NAL 的 RBSP (含头部字节), header 之后补充若干字节的伪负载
    pub fn build_rbsp(&self, sps: &SpsBuilder, pps: &PpsBuilder) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(if self.idr { 0x65 } else { 0x41 }, 8);
        bw.write_ue(self.first_mb);
        bw.write_ue(self.slice_type);
        bw.write_ue(self.pps_id);
        bw.write_bits(self.frame_num, sps.log2_max_frame_num);
        if !sps.frame_mbs_only {
            bw.write_flag(self.field_pic);
            if self.field_pic {
                bw.write_flag(self.bottom_field);
            }
        }
        if self.idr {
            bw.write_ue(self.idr_pic_id);
        }
        match sps.poc_type {
            0 => {
                bw.write_bits(self.poc_lsb, sps.log2_max_poc_lsb);
                if pps.bottom_field_pic_order_in_frame_present && !self.field_pic {
                    bw.write_se(self.delta_poc_bottom);
                }
            }
            1 if !sps.delta_pic_order_always_zero => {
                bw.write_se(self.delta_poc[0]);
                if pps.bottom_field_pic_order_in_frame_present && !self.field_pic {
                    bw.write_se(self.delta_poc[1]);
                }
            }
            _ => {}
        }
        // 剩余 header 字段与宏块数据不参与解析
        bw.write_bits(0b1011_0110, 8);
        bw.write_bytes(&[0x5A; 80]);
        bw.finish()
    }
}

/// RBSP → EBSP: 插入防竞争字节
pub(crate) fn to_ebsp(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + 8);
    let mut zeros = 0;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(byte);
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
    }
    out
}

/// 拼接 Annex B 字节流 (每个 NAL 前加 4 字节起始码)
pub(crate) fn annex_b(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(&to_ebsp(nal));
    }
    out
}
