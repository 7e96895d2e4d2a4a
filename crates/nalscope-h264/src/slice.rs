//! slice header 简要解析.
//!
//! 只读取判断图像边界所需的前部字段, 分两个阶段:
//! 1. first_mb_in_slice, slice_type, pic_parameter_set_id, 随即经 PPS 找到 SPS;
//! 2. 仅在 PPS/SPS 都存在时继续: frame_num, 场标志, idr_pic_id, POC 字段.
//!
//! 参考帧重排序, 加权预测表, 参考标记, 去块滤波与 QP 等字段不解析.

use std::fmt;

use nalscope_core::bitreader::BitReader;
use nalscope_core::{ScopeError, ScopeResult};

use crate::nal::NalUnitType;
use crate::param_sets::{MIN_RBSP_LEN, ParameterSetStore};
use crate::pps::Pps;
use crate::sps::Sps;

/// slice 类型 (slice_type % 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceType {
    P,
    B,
    I,
    SP,
    SI,
}

impl SliceType {
    /// 从 slice_type 原始值构造 (5-9 与 0-4 同义)
    pub fn from_raw(raw: u32) -> Self {
        match raw % 5 {
            0 => Self::P,
            1 => Self::B,
            2 => Self::I,
            3 => Self::SP,
            _ => Self::SI,
        }
    }

    /// 是否为帧内 slice (I 或 SI)
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I | Self::SI)
    }
}

impl fmt::Display for SliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::P => "P",
            Self::B => "B",
            Self::I => "I",
            Self::SP => "SP",
            Self::SI => "SI",
        };
        f.write_str(name)
    }
}

/// 第二阶段字段, 仅在 PPS/SPS 均可解析时存在
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BriefSliceFields {
    /// 经 PPS 解析到的 SPS ID
    pub sps_id: u32,
    /// frame_num
    pub frame_num: u32,
    /// field_pic_flag
    pub field_pic: bool,
    /// bottom_field_flag
    pub bottom_field: bool,
    /// idr_pic_id (仅 IDR slice)
    pub idr_pic_id: u32,
    /// pic_order_cnt_lsb (仅 POC 类型 0)
    pub pic_order_cnt_lsb: u32,
    /// delta_pic_order_cnt_bottom (仅 POC 类型 0)
    pub delta_pic_order_cnt_bottom: i32,
    /// delta_pic_order_cnt[0..2] (仅 POC 类型 1)
    pub delta_pic_order_cnt: [i32; 2],
}

/// slice header 简要解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    /// 是否来自 IDR NAL (类型 5)
    pub idr: bool,
    /// nal_ref_idc
    pub ref_idc: u8,
    /// first_mb_in_slice
    pub first_mb: u32,
    /// slice 类型
    pub slice_type: SliceType,
    /// pic_parameter_set_id
    pub pps_id: u32,
    /// 第二阶段字段; PPS 或 SPS 缺失时为 None
    pub brief: Option<BriefSliceFields>,
}

/// 解析 slice header
///
/// `rbsp` 为去除防竞争字节后的 NAL 数据 (含头部字节, 可以只是 header 窗口).
pub fn parse_slice_header(rbsp: &[u8], store: &ParameterSetStore) -> ScopeResult<SliceHeader> {
    if rbsp.len() < MIN_RBSP_LEN {
        return Err(ScopeError::InvalidData(format!(
            "H264: slice RBSP 太短, len={}",
            rbsp.len()
        )));
    }

    let nal_type = NalUnitType::from_type_id(rbsp[0] & 0x1F);
    if !nal_type.has_slice_header() {
        return Err(ScopeError::InvalidArgument(format!(
            "H264: NAL 类型 {} 不含 slice header",
            nal_type
        )));
    }
    let idr = nal_type.is_idr();
    let ref_idc = (rbsp[0] >> 5) & 0x03;

    let mut br = BitReader::new(&rbsp[1..]);
    let first_mb = br.read_ue()?;
    let slice_type = SliceType::from_raw(br.read_ue()?);
    let pps_id = br.read_ue()?;
    br.check_truncated("H264: slice header")?;

    // 后续字段的位宽取决于 SPS, 必须先完成解析
    let brief = match store.resolve(pps_id) {
        Some((sps, pps)) => Some(parse_brief_fields(&mut br, sps, pps, idr)?),
        None => None,
    };

    Ok(SliceHeader {
        idr,
        ref_idc,
        first_mb,
        slice_type,
        pps_id,
        brief,
    })
}

fn parse_brief_fields(
    br: &mut BitReader<'_>,
    sps: &Sps,
    pps: &Pps,
    idr: bool,
) -> ScopeResult<BriefSliceFields> {
    let mut fields = BriefSliceFields {
        sps_id: sps.sps_id,
        frame_num: br.read_bits(sps.log2_max_frame_num),
        ..BriefSliceFields::default()
    };

    if !sps.frame_mbs_only {
        fields.field_pic = br.read_flag();
        if fields.field_pic {
            fields.bottom_field = br.read_flag();
        }
    }

    if idr {
        fields.idr_pic_id = br.read_ue()?;
    }

    let bottom_delta_present = pps.bottom_field_pic_order_in_frame_present && !fields.field_pic;
    match sps.pic_order_cnt_type {
        0 => {
            fields.pic_order_cnt_lsb = br.read_bits(sps.log2_max_poc_lsb);
            if bottom_delta_present {
                fields.delta_pic_order_cnt_bottom = br.read_se()?;
            }
        }
        1 if !sps.delta_pic_order_always_zero => {
            fields.delta_pic_order_cnt[0] = br.read_se()?;
            if bottom_delta_present {
                fields.delta_pic_order_cnt[1] = br.read_se()?;
            }
        }
        _ => {}
    }

    br.check_truncated("H264: slice header")?;
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{PpsBuilder, SliceBuilder, SpsBuilder};

    fn store_with(sps: &SpsBuilder, pps: &PpsBuilder) -> ParameterSetStore {
        let mut store = ParameterSetStore::new();
        store.put_sps(&sps.build_rbsp()).unwrap();
        store.put_pps(&pps.build_rbsp()).unwrap();
        store
    }

    #[test]
    fn test_slice_type_mapping() {
        let expected = [
            SliceType::P,
            SliceType::B,
            SliceType::I,
            SliceType::SP,
            SliceType::SI,
        ];
        for raw in 0..10 {
            assert_eq!(SliceType::from_raw(raw), expected[(raw % 5) as usize]);
        }
        assert!(SliceType::SI.is_intra());
        assert!(!SliceType::SP.is_intra());
    }

    #[test]
    fn test_parse_frame_slice_poc_type0() {
        let sps = SpsBuilder {
            log2_max_frame_num: 8,
            log2_max_poc_lsb: 6,
            ..SpsBuilder::default()
        };
        let pps = PpsBuilder {
            bottom_field_pic_order_in_frame_present: true,
            ..PpsBuilder::default()
        };
        let store = store_with(&sps, &pps);
        let slice = SliceBuilder {
            idr: true,
            first_mb: 12,
            slice_type: 2,
            frame_num: 201,
            idr_pic_id: 5,
            poc_lsb: 37,
            delta_poc_bottom: -4,
            ..SliceBuilder::default()
        };

        let header = parse_slice_header(&slice.build_rbsp(&sps, &pps), &store).unwrap();
        assert!(header.idr);
        assert_eq!(header.ref_idc, 3);
        assert_eq!(header.first_mb, 12);
        assert_eq!(header.slice_type, SliceType::I);
        assert_eq!(header.pps_id, 0);
        let brief = header.brief.expect("PPS/SPS 存在时应解析第二阶段字段");
        assert_eq!(brief.frame_num, 201);
        assert!(!brief.field_pic);
        assert_eq!(brief.idr_pic_id, 5);
        assert_eq!(brief.pic_order_cnt_lsb, 37);
        assert_eq!(brief.delta_pic_order_cnt_bottom, -4);
    }

    #[test]
    fn test_parse_field_slice() {
        let sps = SpsBuilder {
            frame_mbs_only: false,
            ..SpsBuilder::default()
        };
        let pps = PpsBuilder {
            bottom_field_pic_order_in_frame_present: true,
            ..PpsBuilder::default()
        };
        let store = store_with(&sps, &pps);
        let slice = SliceBuilder {
            slice_type: 0,
            frame_num: 3,
            field_pic: true,
            bottom_field: true,
            poc_lsb: 9,
            ..SliceBuilder::default()
        };

        let header = parse_slice_header(&slice.build_rbsp(&sps, &pps), &store).unwrap();
        assert_eq!(header.slice_type, SliceType::P);
        let brief = header.brief.unwrap();
        assert!(brief.field_pic);
        assert!(brief.bottom_field);
        assert_eq!(brief.frame_num, 3);
        assert_eq!(brief.pic_order_cnt_lsb, 9);
        assert_eq!(brief.delta_pic_order_cnt_bottom, 0, "场图像不携带底场增量");
    }

    #[test]
    fn test_parse_poc_type1_deltas() {
        let sps = SpsBuilder {
            poc_type: 1,
            offset_for_ref_frame: vec![2],
            ..SpsBuilder::default()
        };
        let pps = PpsBuilder {
            bottom_field_pic_order_in_frame_present: true,
            ..PpsBuilder::default()
        };
        let store = store_with(&sps, &pps);
        let slice = SliceBuilder {
            slice_type: 6,
            delta_poc: [-7, 3],
            ..SliceBuilder::default()
        };

        let header = parse_slice_header(&slice.build_rbsp(&sps, &pps), &store).unwrap();
        assert_eq!(header.slice_type, SliceType::B);
        assert_eq!(header.brief.unwrap().delta_pic_order_cnt, [-7, 3]);
    }

    #[test]
    fn test_unresolved_pps_keeps_slice_type_only() {
        let sps = SpsBuilder::default();
        let pps = PpsBuilder::default();
        let store = ParameterSetStore::new();
        let slice = SliceBuilder {
            slice_type: 7,
            ..SliceBuilder::default()
        };

        let header = parse_slice_header(&slice.build_rbsp(&sps, &pps), &store).unwrap();
        assert_eq!(header.slice_type, SliceType::I);
        assert!(header.brief.is_none(), "PPS 缺失时不应解析第二阶段字段");
    }

    #[test]
    fn test_reject_non_slice_nal() {
        let store = ParameterSetStore::new();
        assert!(parse_slice_header(&[0x67, 0x42, 0x00], &store).is_err());
        assert!(parse_slice_header(&[0x65, 0x88], &store).is_err());
    }
}
