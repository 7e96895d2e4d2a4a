//! MPEG-TS 包头解析.
//!
//! 只提取探测器需要的信息: PID, ES 载荷偏移, 以及该包是否以视频 PES 头开始.
//! PAT/PMT 与 PES 重组不在此处理.

use nalscope_core::{ScopeError, ScopeResult};

/// TS 包大小
pub const TS_PACKET_SIZE: usize = 188;
/// TS 同步字节
pub const TS_SYNC_BYTE: u8 = 0x47;

/// 单个 TS 包的解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsPacketInfo {
    /// PID
    pub pid: u16,
    /// ES 载荷在包内的起始偏移; 无载荷时为 [`TS_PACKET_SIZE`]
    pub payload_offset: usize,
    /// adaptation_field_control 声明了载荷
    pub has_payload: bool,
    /// 载荷以视频 PES 头开始
    pub pes_start: bool,
    /// payload_unit_start_indicator
    pub payload_unit_start: bool,
    /// adaptation field 中的 random_access_indicator
    pub random_access: bool,
    /// continuity_counter
    pub continuity_counter: u8,
    /// PES 头中的 PTS (90kHz)
    pub pts: Option<u64>,
}

impl TsPacketInfo {
    /// 直接描述一段 ES 载荷 (不经过 TS 包头解析)
    pub fn elementary(payload_offset: usize, pes_start: bool) -> Self {
        Self {
            pid: 0,
            payload_offset,
            has_payload: true,
            pes_start,
            payload_unit_start: pes_start,
            random_access: false,
            continuity_counter: 0,
            pts: None,
        }
    }
}

/// 解析 TS 包头, 定位 ES 载荷
pub fn inspect_ts_packet(packet: &[u8]) -> ScopeResult<TsPacketInfo> {
    if packet.len() != TS_PACKET_SIZE {
        return Err(ScopeError::InvalidArgument(format!(
            "TS: 包长度非法, len={}",
            packet.len()
        )));
    }
    if packet[0] != TS_SYNC_BYTE {
        return Err(ScopeError::InvalidData(format!(
            "TS: 同步字节非法, value=0x{:02X}",
            packet[0]
        )));
    }

    let pid = (u16::from(packet[1] & 0x1F) << 8) | u16::from(packet[2]);
    let payload_unit_start = (packet[1] & 0x40) != 0;
    let scrambling = (packet[3] >> 6) & 0x03;
    let afc = (packet[3] >> 4) & 0x03; // Adaptation Field Control
    let continuity_counter = packet[3] & 0x0F;
    if scrambling != 0 {
        return Err(ScopeError::Unsupported(format!(
            "TS: 不支持加扰的载荷, pid={}, scrambling={}",
            pid, scrambling
        )));
    }

    let mut offset = 4;
    let mut random_access = false;
    if afc == 2 || afc == 3 {
        let af_len = usize::from(packet[offset]);
        if af_len > 0 {
            random_access = (packet[offset + 1] & 0x40) != 0;
        }
        offset += 1 + af_len;
        if offset > TS_PACKET_SIZE {
            return Err(ScopeError::InvalidData(format!(
                "TS: adaptation_field_length 越界, pid={}, len={}",
                pid, af_len
            )));
        }
    }

    let mut info = TsPacketInfo {
        pid,
        payload_offset: TS_PACKET_SIZE,
        has_payload: false,
        pes_start: false,
        payload_unit_start,
        random_access,
        continuity_counter,
        pts: None,
    };
    // afc==1 或 afc==3 表示有 payload
    if afc != 1 && afc != 3 {
        return Ok(info);
    }
    info.payload_offset = offset;
    info.has_payload = true;

    if !payload_unit_start {
        return Ok(info);
    }
    if let Some(pes) = parse_pes_header(&packet[offset..]) {
        info.payload_offset = offset + pes.header_len;
        info.pes_start = (0xE0..=0xEF).contains(&pes.stream_id);
        info.pts = pes.pts;
    }
    Ok(info)
}

struct PesHeader {
    stream_id: u8,
    header_len: usize,
    pts: Option<u64>,
}

fn parse_pes_header(data: &[u8]) -> Option<PesHeader> {
    // PES start code: 00 00 01 + stream_id
    if data.len() < 9 || data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
        return None;
    }
    let stream_id = data[3];

    // data[6]: 10xxxxxx (marker bits)
    if (data[6] & 0xC0) != 0x80 {
        return Some(PesHeader {
            stream_id,
            header_len: 6,
            pts: None,
        });
    }

    let pts_dts_flags = (data[7] >> 6) & 0x03;
    let header_len = (9 + usize::from(data[8])).min(data.len());
    let pts = if pts_dts_flags >= 2 && header_len >= 14 {
        Some(parse_timestamp(&data[9..14]))
    } else {
        None
    };
    Some(PesHeader {
        stream_id,
        header_len,
        pts,
    })
}

/// 从 5 字节中提取 33-bit 时间戳
fn parse_timestamp(data: &[u8]) -> u64 {
    (u64::from(data[0] >> 1) & 0x07) << 30
        | u64::from(data[1]) << 22
        | (u64::from(data[2]) >> 1) << 15
        | u64::from(data[3]) << 7
        | u64::from(data[4]) >> 1
}

/// 构造 TS 包 (测试与工具使用): 载荷不足时以 adaptation field 填充
///
/// `pes_header` 为 true 时在载荷前加视频 PES 头 (stream_id 0xE0, 仅 PTS).
pub fn build_ts_packet(pid: u16, counter: u8, pes_header: bool, es: &[u8]) -> ScopeResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(TS_PACKET_SIZE);
    if pes_header {
        payload.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x80, 0x05]);
        payload.extend_from_slice(&[0x21, 0x00, 0x01, 0x00, 0x01]); // PTS = 0
    }
    payload.extend_from_slice(es);
    if payload.len() > TS_PACKET_SIZE - 4 {
        return Err(ScopeError::InvalidArgument(format!(
            "TS: 载荷过长, len={}",
            payload.len()
        )));
    }

    let mut packet = Vec::with_capacity(TS_PACKET_SIZE);
    packet.push(TS_SYNC_BYTE);
    packet.push((if pes_header { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1F));
    packet.push(pid as u8);

    let stuffing = TS_PACKET_SIZE - 4 - payload.len();
    if stuffing == 0 {
        packet.push(0x10 | (counter & 0x0F));
    } else {
        packet.push(0x30 | (counter & 0x0F));
        packet.push((stuffing - 1) as u8);
        if stuffing > 1 {
            packet.push(0x00); // adaptation field flags
            packet.extend(std::iter::repeat_n(0xFF, stuffing - 2));
        }
    }
    packet.extend_from_slice(&payload);
    Ok(packet)
}
