//! # nalscope
//!
//! 纯 Rust 实现的 H.264 访问单元边界探测库.
//!
//! 逐个输入承载 H.264 视频的 MPEG-TS 包, 在不解码像素的前提下判断
//! 每个编码图像 (访问单元) 从哪里开始, 以及它的类型 (IDR/I/P/B) 与结构
//! (帧/顶场/底场).
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use nalscope::AccessUnitProbe;
//!
//! let mut probe = AccessUnitProbe::new();
//! # let packets: Vec<[u8; 188]> = Vec::new();
//! for packet in &packets {
//!     let result = probe.parse_packet(packet).expect("TS 包非法");
//!     if result.is_new_picture {
//!         println!("新图像: {:?} {:?}", result.frame_type, result.structure);
//!     }
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `nalscope-core` | 错误类型与比特流读写 |
//! | `nalscope-h264` | NAL 扫描, 参数集, slice header 与边界检测 |

/// 错误类型与比特流读写
pub use nalscope_core as core;

/// H.264 NAL 扫描与访问单元边界检测
pub use nalscope_h264 as h264;

pub use nalscope_h264::{
    AccessUnitProbe, FrameType, ParseResult, PictureStructure, ProbeConfig, ProbeStats,
    TsPacketInfo,
};

/// 获取 nalscope 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
