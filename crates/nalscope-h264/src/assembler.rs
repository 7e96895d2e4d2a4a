//! 基本流 (ES) 拼接与 NAL 扫描.
//!
//! 每个 TS 包的 ES 载荷追加到滚动缓冲区末尾, 扫描始终在拼接后的完整缓冲区上进行,
//! 因此跨包的起始码也只会被找到一次. 每次扫描结束后压缩缓冲区,
//! 未消费的尾部移到缓冲区开头.
//!
//! 产出策略:
//! - SPS/PPS: 等到下一个起始码出现 (NAL 完整) 再产出, 超过 `max_nal_size` 丢弃;
//! - slice (类型 1/5): 缓冲满 header 窗口或 NAL 完整时产出, 至多产出 header 窗口, 剩余负载直接跳过;
//! - 其它类型: 读到头部字节即产出 (仅含头部), 负载跳过.
//!
//! PES 标记: 携带 PES 头的载荷进入缓冲区后, 头部字节位于其后的 NAL 均标记
//! `pes_start`, 直到该 PES 的第一个 slice 出现为止.

use bytes::{Buf, BytesMut};
use log::warn;

use crate::config::ProbeConfig;
use crate::nal::{NalUnit, NalUnitType, find_start_code};

/// 起始码长度
const START_CODE_LEN: usize = 3;

/// 扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// 寻找下一个起始码
    Searching,
    /// 正在累积 NAL, `start` 为头部字节在缓冲区中的位置
    Accumulating {
        start: usize,
        nal_type: NalUnitType,
        pes_start: bool,
    },
    /// 跳过当前 NAL 的剩余负载, 直到下一个起始码
    Skipping,
}

/// 基本流拼接器
#[derive(Debug)]
pub struct EsAssembler {
    /// 滚动缓冲区
    buf: BytesMut,
    /// 扫描状态
    state: ScanState,
    /// 下一次查找起始码的起点
    scan_pos: usize,
    /// 尚未出现 slice 的 PES 载荷在缓冲区中的起点
    pes_mark: Option<usize>,
    max_nal_size: usize,
    slice_header_window: usize,
    /// 因超长被丢弃的 NAL 数
    oversized_nals: u64,
}

impl EsAssembler {
    /// 按配置创建拼接器
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(config.slice_header_window * 4),
            state: ScanState::Searching,
            scan_pos: 0,
            pes_mark: None,
            max_nal_size: config.max_nal_size,
            slice_header_window: config.slice_header_window,
            oversized_nals: 0,
        }
    }

    /// 追加一段 ES 载荷并扫描, 返回本次可产出的全部 NAL
    ///
    /// `pes_start` 表示该载荷来自携带 PES 头的 TS 包.
    pub fn push(&mut self, payload: &[u8], pes_start: bool) -> Vec<NalUnit> {
        if pes_start {
            self.pes_mark = Some(self.buf.len());
        }
        self.buf.extend_from_slice(payload);

        let mut out = Vec::new();
        self.scan(&mut out);
        self.compact();
        out
    }

    /// 清空缓冲区与扫描状态
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = ScanState::Searching;
        self.scan_pos = 0;
        self.pes_mark = None;
    }

    /// 当前缓冲的字节数
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// 因超长被丢弃的 NAL 数
    pub fn oversized_nals(&self) -> u64 {
        self.oversized_nals
    }

    fn in_pes(&self, pos: usize) -> bool {
        self.pes_mark.is_some_and(|mark| pos >= mark)
    }

    fn scan(&mut self, out: &mut Vec<NalUnit>) {
        loop {
            match self.state {
                ScanState::Searching => {
                    let Some(sc) = find_start_code(&self.buf, self.scan_pos) else {
                        // 保留末尾 2 字节, 它们可能是下一个起始码的前缀
                        self.scan_pos = self.scan_pos.max(self.buf.len().saturating_sub(2));
                        return;
                    };
                    let start = sc + START_CODE_LEN;
                    if start >= self.buf.len() {
                        // 头部字节尚未到达
                        self.scan_pos = sc;
                        return;
                    }
                    self.scan_pos = start + 1;
                    self.begin_nal(start, out);
                }
                ScanState::Accumulating {
                    start,
                    nal_type,
                    pes_start,
                } => match find_start_code(&self.buf, self.scan_pos) {
                    Some(next) => {
                        let end = trim_trailing_zeros(&self.buf, start, next);
                        let window_end = start + self.slice_header_window;
                        if nal_type.has_slice_header() && end > window_end {
                            // 完整 slice 同样只产出 header 窗口
                            self.emit(start, window_end, false, pes_start, out);
                        } else {
                            self.emit(start, end, true, pes_start, out);
                        }
                        self.state = ScanState::Searching;
                        self.scan_pos = next;
                    }
                    None => {
                        self.scan_pos = (start + 1).max(self.buf.len().saturating_sub(2));
                        let len = self.buf.len() - start;
                        if nal_type.has_slice_header() {
                            if len >= self.slice_header_window {
                                let end = start + self.slice_header_window;
                                self.emit(start, end, false, pes_start, out);
                                self.state = ScanState::Skipping;
                            }
                        } else if len > self.max_nal_size {
                            warn!(
                                "H264: {} NAL 超过长度上限, 已丢弃, len>{} limit={}",
                                nal_type, len, self.max_nal_size
                            );
                            self.oversized_nals += 1;
                            self.state = ScanState::Skipping;
                        }
                        return;
                    }
                },
                ScanState::Skipping => match find_start_code(&self.buf, self.scan_pos) {
                    Some(next) => {
                        self.state = ScanState::Searching;
                        self.scan_pos = next;
                    }
                    None => {
                        self.scan_pos = self.scan_pos.max(self.buf.len().saturating_sub(2));
                        return;
                    }
                },
            }
        }
    }

    /// 在头部字节位置开始一个新 NAL
    fn begin_nal(&mut self, start: usize, out: &mut Vec<NalUnit>) {
        let nal_type = NalUnitType::from_type_id(self.buf[start] & 0x1F);
        let pes_start = self.in_pes(start);
        if pes_start && nal_type.has_slice_header() {
            self.pes_mark = None;
        }
        match nal_type {
            NalUnitType::Sps | NalUnitType::Pps | NalUnitType::Slice | NalUnitType::SliceIdr => {
                self.state = ScanState::Accumulating {
                    start,
                    nal_type,
                    pes_start,
                };
            }
            _ => {
                self.emit(start, start + 1, false, pes_start, out);
                self.state = ScanState::Skipping;
            }
        }
    }

    fn emit(
        &self,
        start: usize,
        end: usize,
        complete: bool,
        pes_start: bool,
        out: &mut Vec<NalUnit>,
    ) {
        match NalUnit::parse(&self.buf[start..end], complete, pes_start) {
            Ok(nalu) => out.push(nalu),
            Err(err) => warn!("H264: 忽略非法 NAL 单元, err={}", err),
        }
    }

    /// 丢弃已消费的字节, 未消费的尾部移到缓冲区开头
    fn compact(&mut self) {
        let keep_from = match self.state {
            ScanState::Accumulating { start, .. } => start,
            ScanState::Searching | ScanState::Skipping => self.scan_pos,
        };
        if keep_from == 0 {
            return;
        }

        self.buf.advance(keep_from);
        self.scan_pos -= keep_from;
        if let ScanState::Accumulating { start, .. } = &mut self.state {
            *start -= keep_from;
        }
        if let Some(mark) = &mut self.pes_mark {
            *mark = mark.saturating_sub(keep_from);
        }
    }
}

/// 去除 NAL 末尾的 0 字节 (trailing_zero_8bits / 4 字节起始码的前导 0)
fn trim_trailing_zeros(buf: &[u8], start: usize, end: usize) -> usize {
    let mut end = end;
    while end > start + 1 && buf[end - 1] == 0x00 {
        end -= 1;
    }
    end
}
