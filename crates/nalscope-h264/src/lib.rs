//! # nalscope-h264
//!
//! 在 MPEG-TS 承载的 H.264 基本流上定位访问单元 (图像) 边界, 不做像素解码.
//!
//! 处理链路:
//! TS 包 → [`ts`] 定位 ES 载荷 → [`assembler`] 拼接并扫描 NAL →
//! EBSP→RBSP → SPS/PPS 进入 [`param_sets`], slice 经 [`slice`] 简要解析后交给
//! [`boundary`] 判定 → [`AccessUnitProbe`] 汇总为 [`ParseResult`].
//!
//! ## 使用示例
//!
//! ```rust
//! use nalscope_h264::{AccessUnitProbe, TsPacketInfo};
//!
//! let mut probe = AccessUnitProbe::new();
//! // 直接输入一段 ES 数据 (AUD)
//! let es = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
//! let result = probe.parse_continue(&es, &TsPacketInfo::elementary(0, true));
//! assert!(!result.is_new_picture);
//! assert_eq!(probe.stats().nal_units, 1);
//! ```

pub mod assembler;
pub mod boundary;
pub mod config;
pub mod nal;
pub mod param_sets;
pub mod pps;
pub mod probe;
pub mod slice;
pub mod sps;
pub mod ts;

#[cfg(test)]
pub(crate) mod test_support;

// 重导出常用类型
pub use boundary::{FrameType, PictureBoundaryDetector, PictureStructure, SliceSnapshot};
pub use config::ProbeConfig;
pub use nal::{NalUnit, NalUnitType};
pub use param_sets::ParameterSetStore;
pub use pps::Pps;
pub use probe::{AccessUnitProbe, ParseResult, ProbeStats};
pub use slice::{SliceHeader, SliceType};
pub use sps::Sps;
pub use ts::{TS_PACKET_SIZE, TsPacketInfo, inspect_ts_packet};
