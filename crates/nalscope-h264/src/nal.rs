//! H.264 NAL (Network Abstraction Layer) 单元基础定义.
//!
//! # 起始码
//!
//! Annex B 字节流使用 `00 00 01` 分隔 NAL 单元. 4 字节起始码 `00 00 00 01`
//! 中多出的 0 字节视为上一个 NAL 的 trailing_zero_8bits.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! # EBSP → RBSP
//!
//! 码流中任何 `00 00 0x` (x <= 3) 序列都会被编码器插入防竞争字节 0x03,
//! 解析语法元素前需要把 `00 00 03` 还原为 `00 00`.

use std::fmt;

use log::debug;
use nalscope_core::{ScopeError, ScopeResult};

/// NAL 单元类型 (nal_unit_type, 5 bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR slice (1)
    Slice,
    /// 数据分区 A/B/C (2-4), 不参与边界检测
    Partition(u8),
    /// IDR slice (5)
    SliceIdr,
    Sei,
    Sps,
    Pps,
    /// 访问单元分隔符 (9)
    Aud,
    /// 序列结束/流结束 (10, 11)
    EndOfSequence,
    EndOfStream,
    FillerData,
    /// SPS 扩展 (13) 与 SVC/MVC 的 prefix NAL, subset SPS (14, 15)
    SpsExtension,
    PrefixNal,
    SubsetSps,
    /// 辅助图像 slice (19) 与 SVC/MVC slice 扩展 (20), 不属于基本层
    AuxiliarySlice,
    SliceExtension,
    /// 保留与未指定类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 头部的类型字段构造
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2..=4 => Self::Partition(type_id),
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::PrefixNal,
            15 => Self::SubsetSps,
            19 => Self::AuxiliarySlice,
            20 => Self::SliceExtension,
            _ => Self::Unknown(type_id),
        }
    }

    /// 类型字段值
    pub fn type_id(&self) -> u8 {
        match *self {
            Self::Slice => 1,
            Self::Partition(id) | Self::Unknown(id) => id,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::PrefixNal => 14,
            Self::SubsetSps => 15,
            Self::AuxiliarySlice => 19,
            Self::SliceExtension => 20,
        }
    }

    /// 是否携带可用于边界检测的 slice header
    ///
    /// 分区 A 虽含 slice header, 但其后的分区无法独立定位, 与扩展层 slice 一样跳过.
    pub fn has_slice_header(&self) -> bool {
        matches!(self, Self::Slice | Self::SliceIdr)
    }

    /// 是否为 IDR slice
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Slice => "Slice",
            Self::Partition(_) => "Partition",
            Self::SliceIdr => "IDR",
            Self::Sei => "SEI",
            Self::Sps => "SPS",
            Self::Pps => "PPS",
            Self::Aud => "AUD",
            Self::EndOfSequence => "EOSeq",
            Self::EndOfStream => "EOStream",
            Self::FillerData => "Filler",
            Self::SpsExtension => "SPSExt",
            Self::PrefixNal => "Prefix",
            Self::SubsetSps => "SubsetSPS",
            Self::AuxiliarySlice => "AuxSlice",
            Self::SliceExtension => "SliceExt",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition(_) | Self::Unknown(_) => write!(f, "{}({})", self.name(), self.type_id()),
            _ => f.write_str(self.name()),
        }
    }
}

/// 扫描器产出的 NAL 单元
///
/// `data` 为 EBSP (含 NAL 头部字节, 不含起始码). slice 类 NAL 只保留
/// 头部窗口内的字节, 此时 `complete == false`.
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// EBSP 数据 (含头部字节)
    pub data: Vec<u8>,
    /// 是否已看到下一个起始码 (数据完整)
    pub complete: bool,
    /// NAL 属于新 PES 且位于该 PES 的第一个 slice 之前 (含该 slice)
    pub pes_start: bool,
}

impl NalUnit {
    /// 从 NAL 数据 (含头部字节) 构造
    pub fn parse(data: &[u8], complete: bool, pes_start: bool) -> ScopeResult<Self> {
        let Some(&header) = data.first() else {
            return Err(ScopeError::InvalidData("H264: NAL 单元数据为空".into()));
        };

        let forbidden = (header >> 7) & 1;
        if forbidden != 0 {
            return Err(ScopeError::InvalidData(format!(
                "H264: forbidden_zero_bit 非法, value={}",
                forbidden
            )));
        }

        Ok(Self {
            nal_type: NalUnitType::from_type_id(header & 0x1F),
            ref_idc: (header >> 5) & 0x03,
            data: data.to_vec(),
            complete,
            pes_start,
        })
    }
}

/// 查找下一个 `00 00 01` 起始码, 返回其首字节位置
pub fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 2 < data.len() {
        if data[i + 2] > 1 {
            // 第三字节既不是 0 也不是 1, 起始码不可能从 i, i+1, i+2 开始
            i += 3;
            continue;
        }
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// 转换结果
#[derive(Debug, Clone, Copy)]
pub struct Rbsp<'a> {
    /// RBSP 数据 (含 NAL 头部字节)
    pub data: &'a [u8],
    /// 是否完成了防竞争字节移除; false 表示输入损坏, `data` 为原始 EBSP
    pub converted: bool,
}

/// EBSP → RBSP 转换器
///
/// 复用一块容量受限的暂存缓冲区, 超过上限的 NAL 直接拒绝.
#[derive(Debug)]
pub struct EbspConverter {
    scratch: Vec<u8>,
    max_len: usize,
}

impl EbspConverter {
    /// 创建转换器, `max_len` 为单个 NAL 允许的最大字节数
    pub fn new(max_len: usize) -> Self {
        Self {
            scratch: Vec::with_capacity(max_len.min(4096)),
            max_len,
        }
    }

    /// 单个 NAL 允许的最大字节数
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// 移除防竞争字节
    ///
    /// 遇到规范禁止出现的 `00 00 00`/`00 00 01`/`00 00 02` 时无法确定有效长度,
    /// 回退为原样返回输入 (`converted == false`).
    pub fn convert(&mut self, ebsp: &[u8]) -> ScopeResult<Rbsp<'_>> {
        if ebsp.len() > self.max_len {
            return Err(ScopeError::TooLarge {
                what: "NAL",
                len: ebsp.len(),
                limit: self.max_len,
            });
        }

        self.scratch.clear();
        let mut zeros = 0usize;
        let mut malformed = false;
        for &byte in ebsp {
            if zeros >= 2 {
                if byte == 0x03 {
                    zeros = 0;
                    continue;
                }
                if byte < 0x03 {
                    malformed = true;
                    break;
                }
            }
            self.scratch.push(byte);
            zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        }

        if malformed {
            debug!(
                "H264: EBSP 含非法零字节序列, 按原始长度处理, len={}",
                ebsp.len()
            );
            self.scratch.clear();
            self.scratch.extend_from_slice(ebsp);
        }

        Ok(Rbsp {
            data: &self.scratch,
            converted: !malformed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(data: &[u8]) -> (Vec<u8>, bool) {
        let mut conv = EbspConverter::new(1024);
        let rbsp = conv.convert(data).unwrap();
        (rbsp.data.to_vec(), rbsp.converted)
    }

    #[test]
    fn test_header_type_mapping() {
        let cases = [
            (1, NalUnitType::Slice, true, false),
            (3, NalUnitType::Partition(3), false, false),
            (20, NalUnitType::SliceExtension, false, false),
            (5, NalUnitType::SliceIdr, true, true),
            (7, NalUnitType::Sps, false, false),
            (8, NalUnitType::Pps, false, false),
            (9, NalUnitType::Aud, false, false),
            (24, NalUnitType::Unknown(24), false, false),
        ];
        for (id, nal_type, slice_header, idr) in cases {
            assert_eq!(NalUnitType::from_type_id(id), nal_type, "type_id={}", id);
            assert_eq!(nal_type.has_slice_header(), slice_header, "{}", nal_type);
            assert_eq!(nal_type.is_idr(), idr, "{}", nal_type);
        }
        for id in 0..=31 {
            assert_eq!(NalUnitType::from_type_id(id).type_id(), id);
        }
    }

    #[test]
    fn test_header_fields_and_flags() {
        // 0x67 = forbidden 0, nal_ref_idc 3, 类型 7
        let sps = NalUnit::parse(&[0x67, 0x42, 0x00, 0x1E], true, false).unwrap();
        assert_eq!((sps.nal_type, sps.ref_idc), (NalUnitType::Sps, 3));
        assert!(sps.complete && !sps.pes_start);

        // 0x01 = 非参考 slice, 只有 header 窗口
        let slice = NalUnit::parse(&[0x01, 0x9A], false, true).unwrap();
        assert_eq!((slice.nal_type, slice.ref_idc), (NalUnitType::Slice, 0));
        assert!(!slice.complete && slice.pes_start);
    }

    #[test]
    fn test_header_rejects_forbidden_bit() {
        let err = NalUnit::parse(&[0xE7], true, false).expect_err("forbidden_zero_bit=1 应返回错误");
        assert!(matches!(err, ScopeError::InvalidData(_)), "err={}", err);
        assert!(NalUnit::parse(&[], true, false).is_err(), "空 NAL 应返回错误");
    }

    #[test]
    fn test_find_start_code() {
        let data = [0xAA, 0x00, 0x00, 0x01, 0x67, 0x00, 0x00, 0x00, 0x01, 0x68];
        assert_eq!(find_start_code(&data, 0), Some(1));
        assert_eq!(find_start_code(&data, 2), Some(6));
        assert_eq!(find_start_code(&data, 7), None);
        assert_eq!(find_start_code(&[0x00, 0x00], 0), None);
    }

    #[test]
    fn test_find_start_code_after_skip_window() {
        // 0x05 > 1 触发跳跃后仍需命中紧随其后的起始码
        let data = [0x05, 0x00, 0x00, 0x01];
        assert_eq!(find_start_code(&data, 0), Some(1));
    }

    #[test]
    fn test_strip_single_prevention_byte() {
        let (rbsp, ok) = convert(&[0x68, 0xEE, 0x00, 0x00, 0x03, 0x02, 0x3C]);
        assert!(ok);
        assert_eq!(rbsp, vec![0x68, 0xEE, 0x00, 0x00, 0x02, 0x3C]);
    }

    #[test]
    fn test_strip_back_to_back_prevention_bytes() {
        let (rbsp, ok) = convert(&[0x65, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01]);
        assert!(ok);
        assert_eq!(rbsp, vec![0x65, 0x00, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_strip_prevention_byte_before_large_value() {
        // `00 00 03` 统一移除, 即使后一个字节 > 0x03
        let (rbsp, _) = convert(&[0x21, 0x00, 0x00, 0x03, 0x07, 0x5C]);
        assert_eq!(rbsp, vec![0x21, 0x00, 0x00, 0x07, 0x5C]);
    }

    #[test]
    fn test_keep_payload_03_after_prevention_byte() {
        // `00 00 03 03` 中只有第一个 0x03 为防竞争字节
        let (rbsp, _) = convert(&[0x41, 0x00, 0x00, 0x03, 0x03, 0x80]);
        assert_eq!(rbsp, vec![0x41, 0x00, 0x00, 0x03, 0x80]);
    }

    #[test]
    fn test_malformed_ebsp_falls_back_to_original() {
        let input = [0x67, 0x00, 0x00, 0x01, 0x00, 0x00, 0x03, 0x01];
        let (rbsp, ok) = convert(&input);
        assert!(!ok, "非法零字节序列应标记为未转换");
        assert_eq!(rbsp, input.to_vec(), "回退时应原样返回输入");
    }

    #[test]
    fn test_converter_rejects_oversized_nal() {
        let mut conv = EbspConverter::new(4);
        let err = conv.convert(&[0x65; 5]).expect_err("超过上限应返回错误");
        assert!(matches!(err, ScopeError::TooLarge { len: 5, limit: 4, .. }));
        assert!(conv.convert(&[0x65; 4]).is_ok());
    }
}
