//! 探测器配置.

use nalscope_core::{ScopeError, ScopeResult};

/// 非 slice NAL 的默认最大长度 (字节)
pub const DEFAULT_MAX_NAL_SIZE: usize = 64 * 1024;
/// slice header 默认解析窗口 (字节)
pub const DEFAULT_SLICE_HEADER_WINDOW: usize = 64;

/// slice header 窗口下限: 保证 brief 模式字段在最坏情况下可被完整读取
const MIN_SLICE_HEADER_WINDOW: usize = 32;

/// [`AccessUnitProbe`](crate::AccessUnitProbe) 配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// 单个非 slice NAL (SPS/PPS/SEI 等) 允许缓冲的最大字节数, 超出即丢弃
    pub max_nal_size: usize,
    /// slice NAL 缓冲到该字节数即开始解析 header, 其余负载不再缓冲
    pub slice_header_window: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_nal_size: DEFAULT_MAX_NAL_SIZE,
            slice_header_window: DEFAULT_SLICE_HEADER_WINDOW,
        }
    }
}

impl ProbeConfig {
    /// 校验配置合法性
    pub fn validate(&self) -> ScopeResult<()> {
        if self.slice_header_window < MIN_SLICE_HEADER_WINDOW {
            return Err(ScopeError::InvalidArgument(format!(
                "slice_header_window 过小, value={}, min={}",
                self.slice_header_window, MIN_SLICE_HEADER_WINDOW
            )));
        }
        if self.max_nal_size < self.slice_header_window {
            return Err(ScopeError::InvalidArgument(format!(
                "max_nal_size 不能小于 slice_header_window, max_nal_size={}, window={}",
                self.max_nal_size, self.slice_header_window
            )));
        }
        Ok(())
    }
}
