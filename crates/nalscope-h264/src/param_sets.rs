//! SPS/PPS 存储.
//!
//! 以 ID 为槽位保存最近一次成功解析的参数集, 同 ID 后到者覆盖先到者.
//! 解析失败时存储保持不变.

use log::debug;
use nalscope_core::{ScopeError, ScopeResult};

use crate::pps::{MAX_PPS_ID, Pps, parse_pps};
use crate::sps::{MAX_SPS_ID, Sps, parse_sps};

/// RBSP 最小长度 (含 NAL 头部字节)
pub const MIN_RBSP_LEN: usize = 3;

/// 参数集存储
#[derive(Debug, Clone)]
pub struct ParameterSetStore {
    sps: Vec<Option<Sps>>,
    pps: Vec<Option<Pps>>,
}

impl Default for ParameterSetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterSetStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            sps: vec![None; MAX_SPS_ID as usize + 1],
            pps: vec![None; MAX_PPS_ID as usize + 1],
        }
    }

    /// 解析并保存 SPS, 返回其 ID
    ///
    /// `rbsp` 为去除防竞争字节后的完整 NAL (含头部字节).
    pub fn put_sps(&mut self, rbsp: &[u8]) -> ScopeResult<u32> {
        check_rbsp_len("SPS", rbsp)?;
        let sps = parse_sps(&rbsp[1..])?;
        let sps_id = sps.sps_id;
        debug!(
            "H264: 更新 SPS, id={}, profile={}, level={}, {}x{} MB, frame_mbs_only={}, poc_type={}",
            sps_id,
            sps.profile_idc,
            sps.level_idc,
            sps.pic_width_in_mbs,
            sps.frame_height_in_mbs(),
            sps.frame_mbs_only,
            sps.pic_order_cnt_type
        );
        self.sps[sps_id as usize] = Some(sps);
        Ok(sps_id)
    }

    /// 解析并保存 PPS, 返回其 ID
    ///
    /// 引用的 SPS 必须已存在, 否则返回 [`ScopeError::MissingParameterSet`].
    pub fn put_pps(&mut self, rbsp: &[u8]) -> ScopeResult<u32> {
        check_rbsp_len("PPS", rbsp)?;
        let pps = parse_pps(&rbsp[1..], |sps_id| {
            self.sps(sps_id).map(|sps| sps.chroma_format_idc)
        })?;
        let pps_id = pps.pps_id;
        debug!(
            "H264: 更新 PPS, id={}, sps_id={}, cabac={}, bottom_field_pic_order={}",
            pps_id, pps.sps_id, pps.entropy_coding_mode, pps.bottom_field_pic_order_in_frame_present
        );
        self.pps[pps_id as usize] = Some(pps);
        Ok(pps_id)
    }

    /// 按 ID 获取 SPS
    pub fn sps(&self, sps_id: u32) -> Option<&Sps> {
        self.sps.get(sps_id as usize).and_then(Option::as_ref)
    }

    /// 按 ID 获取 PPS
    pub fn pps(&self, pps_id: u32) -> Option<&Pps> {
        self.pps.get(pps_id as usize).and_then(Option::as_ref)
    }

    /// 由 PPS ID 解析出 (SPS, PPS), 任一缺失返回 None
    pub fn resolve(&self, pps_id: u32) -> Option<(&Sps, &Pps)> {
        let pps = self.pps(pps_id)?;
        let sps = self.sps(pps.sps_id)?;
        Some((sps, pps))
    }

    /// 已保存的 SPS 数量
    pub fn sps_count(&self) -> usize {
        self.sps.iter().flatten().count()
    }

    /// 已保存的 PPS 数量
    pub fn pps_count(&self) -> usize {
        self.pps.iter().flatten().count()
    }

    /// 清空全部参数集
    pub fn clear(&mut self) {
        self.sps.iter_mut().for_each(|slot| *slot = None);
        self.pps.iter_mut().for_each(|slot| *slot = None);
    }
}

fn check_rbsp_len(kind: &str, rbsp: &[u8]) -> ScopeResult<()> {
    if rbsp.len() < MIN_RBSP_LEN {
        return Err(ScopeError::InvalidData(format!(
            "H264: {} RBSP 太短, len={}",
            kind,
            rbsp.len()
        )));
    }
    Ok(())
}
