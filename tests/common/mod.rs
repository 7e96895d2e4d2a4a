//! 集成测试公共工具: 构造 H.264 码流与 TS 包.

#![allow(dead_code)]

use nalscope::core::BitWriter;
use nalscope::h264::ts::build_ts_packet;

/// 启用测试日志 (RUST_LOG 控制级别)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 码流级参数 (SPS/PPS 共用)
#[derive(Debug, Clone, Copy)]
pub struct StreamParams {
    pub log2_max_frame_num: u32,
    pub log2_max_poc_lsb: u32,
    pub frame_mbs_only: bool,
    pub bottom_field_pic_order: bool,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            log2_max_frame_num: 4,
            log2_max_poc_lsb: 6,
            frame_mbs_only: true,
            bottom_field_pic_order: false,
        }
    }
}

/// slice header 字段
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceFields {
    pub idr: bool,
    pub slice_type: u32,
    pub first_mb: u32,
    pub frame_num: u32,
    pub field_pic: bool,
    pub bottom_field: bool,
    pub idr_pic_id: u32,
    pub poc_lsb: u32,
}

impl SliceFields {
    /// I slice (slice_type=7)
    pub fn intra(frame_num: u32) -> Self {
        Self {
            slice_type: 7,
            frame_num,
            poc_lsb: frame_num * 2,
            ..Self::default()
        }
    }

    /// IDR slice
    pub fn idr(idr_pic_id: u32) -> Self {
        Self {
            idr: true,
            slice_type: 7,
            idr_pic_id,
            ..Self::default()
        }
    }
}

/// SPS RBSP (Main profile, id 0, POC 类型 0)
pub fn sps_rbsp(params: &StreamParams) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0x67, 8);
    bw.write_bits(77, 8); // profile_idc
    bw.write_bits(0x40, 8); // constraint_set1
    bw.write_bits(40, 8); // level_idc
    bw.write_ue(0); // seq_parameter_set_id
    bw.write_ue(params.log2_max_frame_num - 4);
    bw.write_ue(0); // pic_order_cnt_type
    bw.write_ue(params.log2_max_poc_lsb - 4);
    bw.write_ue(4); // max_num_ref_frames
    bw.write_flag(false);
    bw.write_ue(119); // 1920
    bw.write_ue(if params.frame_mbs_only { 67 } else { 33 });
    bw.write_flag(params.frame_mbs_only);
    if !params.frame_mbs_only {
        bw.write_flag(false); // mb_adaptive_frame_field_flag
    }
    bw.write_flag(true); // direct_8x8_inference_flag
    bw.write_flag(false); // frame_cropping_flag
    bw.write_flag(false); // vui_parameters_present_flag
    bw.write_trailing_bits();
    bw.finish()
}

/// PPS RBSP (id 0, 引用 SPS 0)
pub fn pps_rbsp(params: &StreamParams) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0x68, 8);
    bw.write_ue(0); // pic_parameter_set_id
    bw.write_ue(0); // seq_parameter_set_id
    bw.write_flag(true); // entropy_coding_mode_flag
    bw.write_flag(params.bottom_field_pic_order);
    bw.write_ue(0); // num_slice_groups_minus1
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_flag(false);
    bw.write_bits(0, 2);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_flag(true);
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_trailing_bits();
    bw.finish()
}

/// slice NAL RBSP: header 前部字段加上不参与解析的伪负载
pub fn slice_rbsp(params: &StreamParams, fields: &SliceFields) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(if fields.idr { 0x65 } else { 0x41 }, 8);
    bw.write_ue(fields.first_mb);
    bw.write_ue(fields.slice_type);
    bw.write_ue(0); // pic_parameter_set_id
    bw.write_bits(fields.frame_num, params.log2_max_frame_num);
    if !params.frame_mbs_only {
        bw.write_flag(fields.field_pic);
        if fields.field_pic {
            bw.write_flag(fields.bottom_field);
        }
    }
    if fields.idr {
        bw.write_ue(fields.idr_pic_id);
    }
    bw.write_bits(fields.poc_lsb, params.log2_max_poc_lsb);
    if params.bottom_field_pic_order && !fields.field_pic {
        bw.write_se(0);
    }
    bw.write_bits(0x9B, 8);
    bw.write_bytes(&[0xA5; 120]);
    bw.finish()
}

/// RBSP → EBSP 并加 4 字节起始码
pub fn annex_b(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        let mut zeros = 0;
        for &byte in nal {
            if zeros >= 2 && byte <= 0x03 {
                out.push(0x03);
                zeros = 0;
            }
            out.push(byte);
            zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        }
    }
    out
}

/// 把一段 ES 切分为 TS 包, 第一个包携带视频 PES 头
pub fn packetize(pid: u16, es: &[u8]) -> Vec<Vec<u8>> {
    const FIRST_CAPACITY: usize = 184 - 14;
    let mut packets = Vec::new();
    let first_len = es.len().min(FIRST_CAPACITY);
    packets.push(build_ts_packet(pid, 0, true, &es[..first_len]).expect("构造 TS 包失败"));
    for (idx, chunk) in es[first_len..].chunks(184).enumerate() {
        let counter = ((idx + 1) & 0x0F) as u8;
        packets.push(build_ts_packet(pid, counter, false, chunk).expect("构造 TS 包失败"));
    }
    packets
}
