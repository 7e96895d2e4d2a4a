//! TS 流扫描: 按 188 字节读取, 锁定视频 PID, 逐包送入探测器并收集图像记录.

use std::io::{ErrorKind, Read};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;

use nalscope_h264::ts::TS_SYNC_BYTE;
use nalscope_h264::{
    AccessUnitProbe, FrameType, ProbeConfig, ProbeStats, TS_PACKET_SIZE, inspect_ts_packet,
};

/// 扫描选项
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 指定视频 PID; None 时锁定第一个携带视频 PES 头的 PID
    pub pid: Option<u16>,
    /// 探测器配置
    pub config: ProbeConfig,
}

/// 单个图像的起始位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PictureRecord {
    /// 图像序号 (解码顺序)
    pub index: u64,
    /// 图像第一个 slice header 所在的 TS 包序号
    pub packet: u64,
    /// 所在 PID
    pub pid: u16,
    /// 图像类型 (IDR/I/P/B)
    pub frame_type: Option<String>,
    /// 图像结构 (帧/顶场/底场)
    pub structure: Option<String>,
    /// 所属 PES 的 PTS (90kHz)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pts: Option<u64>,
    /// 所在 TS 包的 random_access_indicator
    pub random_access: bool,
}

/// 探测器统计 (序列化用)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProbeCounters {
    /// 产出的 NAL 总数
    pub nal_units: u64,
    /// SPS 存储次数
    pub sps_updates: u64,
    /// PPS 存储次数
    pub pps_updates: u64,
    /// slice 总数
    pub slices: u64,
    /// 参数集缺失, 只完成第一阶段解析的 slice 数
    pub unresolved_slices: u64,
    /// 新图像数
    pub pictures: u64,
    /// 解析失败被丢弃的 NAL 数
    pub rejected_nals: u64,
    /// 防竞争字节异常, 按原始字节解析的 NAL 数
    pub unconverted_nals: u64,
    /// 超过长度上限被丢弃的 NAL 数
    pub oversized_nals: u64,
}

impl From<ProbeStats> for ProbeCounters {
    fn from(stats: ProbeStats) -> Self {
        Self {
            nal_units: stats.nal_units,
            sps_updates: stats.sps_updates,
            pps_updates: stats.pps_updates,
            slices: stats.slices,
            unresolved_slices: stats.unresolved_slices,
            pictures: stats.pictures,
            rejected_nals: stats.rejected_nals,
            unconverted_nals: stats.unconverted_nals,
            oversized_nals: stats.oversized_nals,
        }
    }
}

/// 各类型图像数量
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameTypeCounts {
    /// IDR 图像
    pub idr: u64,
    /// 非 IDR 的 I 图像
    pub i: u64,
    /// P 图像
    pub p: u64,
    /// B 图像
    pub b: u64,
}

impl FrameTypeCounts {
    fn add(&mut self, frame_type: FrameType) {
        match frame_type {
            FrameType::Idr => self.idr += 1,
            FrameType::I => self.i += 1,
            FrameType::P => self.p += 1,
            FrameType::B => self.b += 1,
        }
    }
}

/// 扫描汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// 实际探测的 PID
    pub pid: Option<u16>,
    /// 读取的 TS 包总数
    pub packets: u64,
    /// 送入探测器的包数
    pub probed_packets: u64,
    /// 非目标 PID 的包数
    pub skipped_packets: u64,
    /// 包头非法或加扰的包数
    pub invalid_packets: u64,
    /// 重复包 (连续计数未变化) 数
    pub duplicate_packets: u64,
    /// 连续计数不连续的次数, 每次都会重置探测器
    pub discontinuities: u64,
    /// 丢失同步后重新同步的次数
    pub sync_losses: u64,
    /// 文件末尾不足一个包的字节数
    pub trailing_bytes: usize,
    /// 按类型统计的图像数
    pub frame_types: FrameTypeCounts,
    /// 探测器统计
    pub probe: ProbeCounters,
}

/// 扫描结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// 按解码顺序排列的图像记录
    pub pictures: Vec<PictureRecord>,
    /// 汇总
    pub summary: ScanSummary,
}

/// 从输入中按同步字节切分 TS 包
struct PacketReader<R> {
    reader: R,
    pending: Vec<u8>,
    sync_losses: u64,
}

impl<R: Read> PacketReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(TS_PACKET_SIZE * 2),
            sync_losses: 0,
        }
    }

    /// 读取下一个包; 输入结束时返回 None, 不足一个包的尾部留在 `pending` 中
    fn next_packet(&mut self) -> Result<Option<[u8; TS_PACKET_SIZE]>> {
        loop {
            if !self.fill()? {
                return Ok(None);
            }
            if self.pending[0] == TS_SYNC_BYTE {
                let mut packet = [0u8; TS_PACKET_SIZE];
                packet.copy_from_slice(&self.pending[..TS_PACKET_SIZE]);
                self.pending.drain(..TS_PACKET_SIZE);
                return Ok(Some(packet));
            }

            self.sync_losses += 1;
            let skip = self.pending[1..]
                .iter()
                .position(|&byte| byte == TS_SYNC_BYTE)
                .map_or(self.pending.len(), |pos| pos + 1);
            warn!("TS: 同步丢失, 跳过 {} 字节", skip);
            self.pending.drain(..skip);
        }
    }

    /// 补足一个包的数据, 输入结束时返回 false
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; TS_PACKET_SIZE];
        while self.pending.len() < TS_PACKET_SIZE {
            let need = TS_PACKET_SIZE - self.pending.len();
            let read = match self.reader.read(&mut chunk[..need]) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err).context("读取输入失败"),
            };
            if read == 0 {
                return Ok(false);
            }
            self.pending.extend_from_slice(&chunk[..read]);
        }
        Ok(true)
    }
}

/// 扫描整个 TS 流
pub fn scan_ts<R: Read>(reader: R, options: &ScanOptions) -> Result<ScanReport> {
    let mut probe =
        AccessUnitProbe::with_config(options.config.clone()).context("探测器配置非法")?;
    let mut packets = PacketReader::new(reader);
    let mut report = ScanReport::default();
    let summary = &mut report.summary;
    summary.pid = options.pid;

    let mut last_counter: Option<u8> = None;
    let mut pts = None;
    while let Some(packet) = packets.next_packet()? {
        let packet_index = summary.packets;
        summary.packets += 1;

        let info = match inspect_ts_packet(&packet) {
            Ok(info) => info,
            Err(err) => {
                debug!("TS: 跳过非法包, index={}, err={}", packet_index, err);
                summary.invalid_packets += 1;
                continue;
            }
        };

        let pid = match summary.pid {
            Some(pid) => pid,
            None if info.pes_start => {
                info!("锁定视频 PID 0x{:04X}, packet={}", info.pid, packet_index);
                summary.pid = Some(info.pid);
                info.pid
            }
            None => {
                summary.skipped_packets += 1;
                continue;
            }
        };
        if info.pid != pid {
            summary.skipped_packets += 1;
            continue;
        }

        if info.has_payload {
            if let Some(last) = last_counter {
                if info.continuity_counter == last {
                    debug!("TS: 丢弃重复包, index={}", packet_index);
                    summary.duplicate_packets += 1;
                    continue;
                }
                if info.continuity_counter != (last + 1) & 0x0F {
                    warn!(
                        "TS: 连续计数不连续, 重置探测器, pid=0x{:04X}, expected={}, got={}",
                        pid,
                        (last + 1) & 0x0F,
                        info.continuity_counter
                    );
                    summary.discontinuities += 1;
                    probe.reset();
                }
            }
            last_counter = Some(info.continuity_counter);
        }

        if info.pes_start {
            pts = info.pts;
        }
        summary.probed_packets += 1;
        let result = probe.parse_continue(&packet, &info);
        if !result.is_new_picture {
            continue;
        }

        if let Some(frame_type) = result.frame_type {
            summary.frame_types.add(frame_type);
        }
        let record = PictureRecord {
            index: report.pictures.len() as u64,
            packet: packet_index,
            pid,
            frame_type: result.frame_type.map(|t| t.to_string()),
            structure: result.structure.map(|s| s.to_string()),
            pts,
            random_access: info.random_access,
        };
        debug!(
            "图像 #{}: packet={}, type={:?}, structure={:?}",
            record.index, record.packet, record.frame_type, record.structure
        );
        report.pictures.push(record);
    }

    summary.sync_losses = packets.sync_losses;
    summary.trailing_bytes = packets.pending.len();
    if summary.trailing_bytes > 0 {
        warn!("TS: 输入末尾有 {} 字节不足一个包", summary.trailing_bytes);
    }
    if summary.pid.is_none() {
        warn!("未找到视频 PES");
    }
    summary.probe = probe.stats().into();
    Ok(report)
}
