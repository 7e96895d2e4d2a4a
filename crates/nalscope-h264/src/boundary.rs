//! 图像 (访问单元) 边界检测.
//!
//! 对比当前 slice 与上一个 slice 的 header 字段, 判断当前 slice 是否为
//! 新图像的第一个 slice (ITU-T H.264 7.4.1.2.4).

use std::fmt;

use crate::pps::Pps;
use crate::slice::{SliceHeader, SliceType};
use crate::sps::Sps;

/// 图像类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Idr,
    I,
    P,
    B,
}

impl FrameType {
    /// 由 NAL 类型与 slice 类型推导 (SI 归为 I, SP 归为 P)
    pub fn classify(idr: bool, slice_type: SliceType) -> Self {
        if idr {
            return Self::Idr;
        }
        match slice_type {
            SliceType::I | SliceType::SI => Self::I,
            SliceType::P | SliceType::SP => Self::P,
            SliceType::B => Self::B,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idr => "IDR",
            Self::I => "I",
            Self::P => "P",
            Self::B => "B",
        };
        f.write_str(name)
    }
}

/// 图像结构
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureStructure {
    Frame,
    TopField,
    BottomField,
}

impl PictureStructure {
    /// 由 field_pic_flag/bottom_field_flag 推导
    pub fn from_flags(field_pic: bool, bottom_field: bool) -> Self {
        match (field_pic, bottom_field) {
            (false, _) => Self::Frame,
            (true, false) => Self::TopField,
            (true, true) => Self::BottomField,
        }
    }
}

impl fmt::Display for PictureStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Frame => "frame",
            Self::TopField => "top",
            Self::BottomField => "bottom",
        };
        f.write_str(name)
    }
}

/// 参与边界比较的 slice 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSnapshot {
    /// 引用的 PPS id
    pub pps_id: u32,
    /// frame_num
    pub frame_num: u32,
    /// 是否为场图像
    pub field_pic: bool,
    /// 是否为底场
    pub bottom_field: bool,
    /// 是否为 IDR slice (nal_unit_type == 5)
    pub idr: bool,
    /// idr_pic_id (仅 IDR slice 有效)
    pub idr_pic_id: u32,
    /// pic_order_cnt_lsb (POC 类型 0)
    pub pic_order_cnt_lsb: u32,
    /// delta_pic_order_cnt_bottom (POC 类型 0)
    pub delta_pic_order_cnt_bottom: i32,
    /// delta_pic_order_cnt[0..2] (POC 类型 1)
    pub delta_pic_order_cnt: [i32; 2],
}

impl SliceSnapshot {
    /// 从已完成第二阶段解析的 slice header 构造
    pub fn from_header(header: &SliceHeader) -> Option<Self> {
        let brief = header.brief?;
        Some(Self {
            pps_id: header.pps_id,
            frame_num: brief.frame_num,
            field_pic: brief.field_pic,
            bottom_field: brief.bottom_field,
            idr: header.idr,
            idr_pic_id: brief.idr_pic_id,
            pic_order_cnt_lsb: brief.pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom: brief.delta_pic_order_cnt_bottom,
            delta_pic_order_cnt: brief.delta_pic_order_cnt,
        })
    }
}

/// 判断 `current` 是否开始了一个新图像
///
/// `sps`/`pps` 为当前 slice 引用的参数集.
pub fn is_new_picture(
    sps: &Sps,
    pps: &Pps,
    current: &SliceSnapshot,
    previous: &SliceSnapshot,
) -> bool {
    if previous.pps_id != current.pps_id
        || previous.frame_num != current.frame_num
        || previous.field_pic != current.field_pic
    {
        return true;
    }
    if current.field_pic && previous.bottom_field != current.bottom_field {
        return true;
    }
    if previous.idr != current.idr {
        return true;
    }
    if current.idr && previous.idr_pic_id != current.idr_pic_id {
        return true;
    }

    let bottom_delta_present = pps.bottom_field_pic_order_in_frame_present && !current.field_pic;
    match sps.pic_order_cnt_type {
        0 => {
            previous.pic_order_cnt_lsb != current.pic_order_cnt_lsb
                || (bottom_delta_present
                    && previous.delta_pic_order_cnt_bottom != current.delta_pic_order_cnt_bottom)
        }
        1 if !sps.delta_pic_order_always_zero => {
            previous.delta_pic_order_cnt[0] != current.delta_pic_order_cnt[0]
                || (bottom_delta_present
                    && previous.delta_pic_order_cnt[1] != current.delta_pic_order_cnt[1])
        }
        _ => false,
    }
}

/// 图像边界检测器, 保存上一个 slice 的字段快照
#[derive(Debug, Clone, Default)]
pub struct PictureBoundaryDetector {
    previous: Option<SliceSnapshot>,
}

impl PictureBoundaryDetector {
    /// 创建检测器 (无历史快照)
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个 slice, 返回它是否开始了新图像
    ///
    /// 没有历史快照时, 仅当 slice 为 I/SI 且其 NAL 起始于 PES 头所在的 TS 包时
    /// 判定为新图像. 参数集可解析的 slice 处理后无条件覆盖快照.
    pub fn observe(
        &mut self,
        header: &SliceHeader,
        params: Option<(&Sps, &Pps)>,
        pes_start: bool,
    ) -> bool {
        let current = SliceSnapshot::from_header(header);
        let is_new = match (&self.previous, current.as_ref(), params) {
            (Some(previous), Some(current), Some((sps, pps))) => {
                is_new_picture(sps, pps, current, previous)
            }
            (Some(_), _, _) => false,
            (None, _, _) => header.slice_type.is_intra() && pes_start,
        };
        if current.is_some() && params.is_some() {
            self.previous = current;
        }
        is_new
    }

    /// 上一个 slice 的快照
    pub fn previous(&self) -> Option<&SliceSnapshot> {
        self.previous.as_ref()
    }

    /// 清除历史快照
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
