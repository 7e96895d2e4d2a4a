//! 统一错误类型定义.
//!
//! 所有 nalscope crate 共用的错误类型. 每个解析操作都以返回值的形式
//! 报告错误, 不存在任何进程级的错误状态.

use thiserror::Error;

/// nalscope 统一错误类型
#[derive(Debug, Error)]
pub enum ScopeError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 不支持的码流特性
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 语法元素读取越过数据末尾
    #[error("数据截断: {0}")]
    Truncated(String),

    /// 数据超过配置的上限
    #[error("数据过大: {what} 长度 {len} 超过上限 {limit}")]
    TooLarge {
        /// 超限对象
        what: &'static str,
        /// 实际长度
        len: usize,
        /// 上限
        limit: usize,
    },

    /// 引用的参数集不存在
    #[error("缺少参数集: {kind} id={id}")]
    MissingParameterSet {
        /// "SPS" 或 "PPS"
        kind: &'static str,
        /// 被引用的 id
        id: u32,
    },
}

/// nalscope 统一 Result 类型
pub type ScopeResult<T> = Result<T, ScopeError>;
