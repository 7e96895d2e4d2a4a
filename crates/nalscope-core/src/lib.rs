//! # nalscope-core
//!
//! nalscope 核心库, 提供统一错误类型与按位读写工具.
//!
//! H.264 语法解析 (Exp-Golomb, 定长字段) 全部建立在本 crate 的
//! [`BitReader`](bitreader::BitReader) 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{ScopeError, ScopeResult};
