//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 H.264 参数集与 slice header
//! 解析的基础设施. 按大端位序读取 (MSB first).
//!
//! # 越界读取约定
//!
//! 读取越过数据末尾时不会 panic, 也不会立即返回错误:
//! - 缺失的位一律按 0 填充, 读取位置停在数据末尾;
//! - 同时置位粘滞的截断标志, 之后可通过 [`BitReader::is_truncated`] 查询,
//!   或通过 [`BitReader::check_truncated`] 转换为 [`ScopeError::Truncated`].
//!
//! 解析器在一组语法元素读取完毕后统一检查截断标志, 而不是在每次读取后检查.

use crate::{ScopeError, ScopeResult};

/// Exp-Golomb 前缀允许的最大前导零数
const MAX_EXP_GOLOMB_LEADING_ZEROS: u32 = 31;

/// 比特流读取器
///
/// # 示例
/// ```
/// use nalscope_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4), 0b1011);
/// assert_eq!(br.read_bits(4), 0b0001);
/// assert_eq!(br.read_bits(8), 0b01010101);
/// assert!(!br.is_truncated());
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前位偏移
    bit_offset: usize,
    /// 有效数据总位数
    bit_length: usize,
    /// 是否发生过越界读取
    truncated: bool,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_offset: 0,
            bit_length: data.len() * 8,
            truncated: false,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.bit_offset
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.bit_length - self.bit_offset
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 是否发生过越界读取
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// 若发生过越界读取, 返回 [`ScopeError::Truncated`]
    ///
    /// `what` 用于错误信息, 指明正在解析的语法结构.
    pub fn check_truncated(&self, what: &str) -> ScopeResult<()> {
        if self.truncated {
            return Err(ScopeError::Truncated(format!(
                "{} 读取越过数据末尾, bits={}",
                what, self.bit_length
            )));
        }
        Ok(())
    }

    /// 读取 1 个位, u(1)
    pub fn read_bit(&mut self) -> u32 {
        if self.bit_offset >= self.bit_length {
            self.truncated = true;
            return 0;
        }
        let byte = self.data[self.bit_offset >> 3];
        let bit = (byte >> (7 - (self.bit_offset & 7))) & 1;
        self.bit_offset += 1;
        u32::from(bit)
    }

    /// 读取 1 个位并解释为布尔标志
    pub fn read_flag(&mut self) -> bool {
        self.read_bit() == 1
    }

    /// 读取 N 个位 (最多 32 位), u(n)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效. 越过末尾的部分按 0 填充.
    pub fn read_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32, "read_bits: n={} 超过 32 位", n);
        let n = n.min(32);
        if n == 0 {
            return 0;
        }

        let available = self.bits_left().min(n as usize) as u32;
        let mut result: u32 = 0;
        let mut remaining = available;

        while remaining > 0 {
            let bit_in_byte = (self.bit_offset & 7) as u32;
            let in_byte = 8 - bit_in_byte;
            let to_read = remaining.min(in_byte);

            // 从当前字节中提取位
            let shift = in_byte - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.bit_offset >> 3] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);
            self.bit_offset += to_read as usize;
            remaining -= to_read;
        }

        if available < n {
            // 缺失的低位按 0 填充
            self.truncated = true;
            let missing = n - available;
            result = if missing >= 32 { 0 } else { result << missing };
        }

        result
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) {
        let available = self.bits_left();
        if n > available {
            self.truncated = true;
            self.bit_offset = self.bit_length;
        } else {
            self.bit_offset += n;
        }
    }

    /// 读取无符号 Exp-Golomb 编码值, ue(v)
    ///
    /// 前缀读到数据末尾仍未遇到 1 时返回 0 并置截断标志;
    /// 前导零超过 31 个视为码流损坏.
    pub fn read_ue(&mut self) -> ScopeResult<u32> {
        let mut leading_zeros = 0u32;
        loop {
            if self.is_eof() {
                self.truncated = true;
                return Ok(0);
            }
            if self.read_bit() == 1 {
                break;
            }
            leading_zeros += 1;
            if leading_zeros > MAX_EXP_GOLOMB_LEADING_ZEROS {
                return Err(ScopeError::InvalidData(
                    "Exp-Golomb 前导零过多".into(),
                ));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_bits(leading_zeros);
        Ok(((1u64 << leading_zeros) - 1 + u64::from(suffix)) as u32)
    }

    /// 读取有符号 Exp-Golomb 编码值, se(v)
    pub fn read_se(&mut self) -> ScopeResult<i32> {
        let code = self.read_ue()?;
        // 映射: 0→0, 1→1, 2→-1, 3→2, 4→-2, ...
        let value = code.div_ceil(2) as i32;
        if code & 1 == 0 { Ok(-value) } else { Ok(value) }
    }

    /// 判断 RBSP 是否仍有有效语法数据 (排除 rbsp_trailing_bits)
    ///
    /// 不移动读取位置. 剩余数据中最后一个 1 即 rbsp_stop_one_bit,
    /// 当前位置之后、该位之前还有位时返回 true.
    pub fn more_rbsp_data(&self) -> bool {
        if self.is_eof() {
            return false;
        }
        let Some(last_byte_idx) = self.data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        let last_byte = self.data[last_byte_idx];
        let stop_bit_pos = last_byte_idx * 8 + 7 - last_byte.trailing_zeros() as usize;
        self.bit_offset < stop_bit_pos
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
