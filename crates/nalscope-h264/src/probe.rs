//! 访问单元边界探测器.
//!
//! 逐个接收 TS 包, 拼接 ES 载荷并扫描 NAL: SPS/PPS 更新参数集存储,
//! slice 经简要 header 解析后交给边界检测器. 每次调用返回本次调用中
//! 第一个被判定为新图像的 slice 的结果, 但会继续处理之后的全部 NAL,
//! 保证内部状态与码流一致.
//!
//! 探测器从不向调用方返回错误: 损坏的 NAL 被记录日志, 计入 [`ProbeStats`] 后跳过.

use log::{debug, warn};
use nalscope_core::ScopeResult;

use crate::assembler::EsAssembler;
use crate::boundary::{FrameType, PictureBoundaryDetector, PictureStructure};
use crate::config::ProbeConfig;
use crate::nal::{EbspConverter, NalUnit, NalUnitType};
use crate::param_sets::{MIN_RBSP_LEN, ParameterSetStore};
use crate::slice::parse_slice_header;
use crate::ts::{TsPacketInfo, inspect_ts_packet};

/// 单次调用的探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseResult {
    /// 本次调用中至少解析了一个 slice header
    pub is_new_slice: bool,
    /// 本次调用中有 slice 开始了新图像
    pub is_new_picture: bool,
    /// 图像类型; 未解析到 slice 时为 None
    pub frame_type: Option<FrameType>,
    /// 图像结构; 参数集缺失无法得知时为 None
    pub structure: Option<PictureStructure>,
}

/// 探测统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeStats {
    /// 输入的包数
    pub packets: u64,
    /// 扫描出的 NAL 数
    pub nal_units: u64,
    /// 成功更新的 SPS 数
    pub sps_updates: u64,
    /// 成功更新的 PPS 数
    pub pps_updates: u64,
    /// 解析的 slice header 数
    pub slices: u64,
    /// 参数集缺失, 只得到 slice_type 的 slice 数
    pub unresolved_slices: u64,
    /// 检测到的新图像数
    pub pictures: u64,
    /// 因解析失败被跳过的 NAL 数
    pub rejected_nals: u64,
    /// 含非法零字节序列, 按原始数据处理的 NAL 数
    pub unconverted_nals: u64,
    /// 超过长度上限被丢弃的 NAL 数
    pub oversized_nals: u64,
}

/// 访问单元边界探测器
#[derive(Debug)]
pub struct AccessUnitProbe {
    config: ProbeConfig,
    assembler: EsAssembler,
    converter: EbspConverter,
    store: ParameterSetStore,
    detector: PictureBoundaryDetector,
    stats: ProbeStats,
}

impl Default for AccessUnitProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessUnitProbe {
    /// 以默认配置创建探测器
    pub fn new() -> Self {
        Self::build(ProbeConfig::default())
    }

    /// 以指定配置创建探测器
    pub fn with_config(config: ProbeConfig) -> ScopeResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ProbeConfig) -> Self {
        Self {
            assembler: EsAssembler::new(&config),
            converter: EbspConverter::new(config.max_nal_size),
            store: ParameterSetStore::new(),
            detector: PictureBoundaryDetector::new(),
            stats: ProbeStats::default(),
            config,
        }
    }

    /// 处理一个 TS 包
    ///
    /// `info` 由 TS 层提供: ES 载荷在 `packet` 中的偏移, 以及该包是否以 PES 头开始.
    pub fn parse_continue(&mut self, packet: &[u8], info: &TsPacketInfo) -> ParseResult {
        self.stats.packets += 1;
        let Some(payload) = packet.get(info.payload_offset..) else {
            warn!(
                "H264: 载荷偏移超出包长度, offset={}, len={}",
                info.payload_offset,
                packet.len()
            );
            return ParseResult::default();
        };

        let nalus = self.assembler.push(payload, info.pes_start);
        let mut result = ParseResult::default();
        for nalu in &nalus {
            self.stats.nal_units += 1;
            let Some(slice_result) = self.handle_nal(nalu) else {
                continue;
            };
            // 保留第一个新图像; 没有新图像时保留第一个 slice
            if !result.is_new_picture && (slice_result.is_new_picture || !result.is_new_slice) {
                result = slice_result;
            }
        }
        result
    }

    /// 解析 TS 包头后处理
    pub fn parse_packet(&mut self, packet: &[u8]) -> ScopeResult<ParseResult> {
        let info = inspect_ts_packet(packet)?;
        Ok(self.parse_continue(packet, &info))
    }

    /// 按 NAL 类型分发, slice 返回其探测结果
    fn handle_nal(&mut self, nalu: &NalUnit) -> Option<ParseResult> {
        if !matches!(
            nalu.nal_type,
            NalUnitType::Sps | NalUnitType::Pps | NalUnitType::Slice | NalUnitType::SliceIdr
        ) {
            return None;
        }

        let rbsp = match self.converter.convert(&nalu.data) {
            Ok(rbsp) => rbsp,
            Err(err) => {
                warn!("H264: {} EBSP 转换失败, err={}", nalu.nal_type, err);
                self.stats.rejected_nals += 1;
                return None;
            }
        };
        if !rbsp.converted {
            self.stats.unconverted_nals += 1;
        }
        if rbsp.data.len() < MIN_RBSP_LEN {
            debug!(
                "H264: {} RBSP 太短, 跳过, len={}",
                nalu.nal_type,
                rbsp.data.len()
            );
            self.stats.rejected_nals += 1;
            return None;
        }

        match nalu.nal_type {
            NalUnitType::Sps => {
                match self.store.put_sps(rbsp.data) {
                    Ok(_) => self.stats.sps_updates += 1,
                    Err(err) => {
                        warn!("H264: 忽略无法解析的 SPS, err={}", err);
                        self.stats.rejected_nals += 1;
                    }
                }
                None
            }
            NalUnitType::Pps => {
                match self.store.put_pps(rbsp.data) {
                    Ok(_) => self.stats.pps_updates += 1,
                    Err(err) => {
                        warn!("H264: 忽略无法解析的 PPS, err={}", err);
                        self.stats.rejected_nals += 1;
                    }
                }
                None
            }
            _ => {
                let header = match parse_slice_header(rbsp.data, &self.store) {
                    Ok(header) => header,
                    Err(err) => {
                        warn!("H264: 忽略无法解析的 slice header, err={}", err);
                        self.stats.rejected_nals += 1;
                        return None;
                    }
                };
                self.stats.slices += 1;
                if header.brief.is_none() {
                    self.stats.unresolved_slices += 1;
                }

                let params = self.store.resolve(header.pps_id);
                let is_new_picture = self.detector.observe(&header, params, nalu.pes_start);
                let frame_type = FrameType::classify(header.idr, header.slice_type);
                let structure = header
                    .brief
                    .map(|brief| PictureStructure::from_flags(brief.field_pic, brief.bottom_field));
                if is_new_picture {
                    self.stats.pictures += 1;
                    debug!(
                        "H264: 新图像, type={}, structure={:?}, pps_id={}, frame_num={:?}",
                        frame_type,
                        structure,
                        header.pps_id,
                        header.brief.map(|brief| brief.frame_num)
                    );
                }
                Some(ParseResult {
                    is_new_slice: true,
                    is_new_picture,
                    frame_type: Some(frame_type),
                    structure,
                })
            }
        }
    }

    /// 清空拼接缓冲与上一个 slice 的快照; 参数集存储保留
    pub fn reset(&mut self) {
        self.assembler.reset();
        self.detector.reset();
    }

    /// 清空参数集存储
    pub fn clear_parameter_sets(&mut self) {
        self.store.clear();
    }

    /// 统计信息
    pub fn stats(&self) -> ProbeStats {
        ProbeStats {
            oversized_nals: self.assembler.oversized_nals(),
            ..self.stats
        }
    }

    /// 参数集存储 (只读)
    pub fn parameter_sets(&self) -> &ParameterSetStore {
        &self.store
    }

    /// 当前配置
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }
}
