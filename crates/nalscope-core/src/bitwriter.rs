//! 比特流写入器.
//!
//! 按大端位序 (MSB first) 向字节缓冲区写入数据, 与 [`BitReader`](crate::BitReader) 对应.
//! 主要用于构造 H.264 参数集与 slice header 码流 (Exp-Golomb 写入),
//! 测试代码以它生成符合规范的输入.

/// 比特流写入器
///
/// # 示例
/// ```
/// use nalscope_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_ue(3); // 00100
/// bw.write_se(-1); // 011
/// let data = bw.finish();
/// assert_eq!(data, vec![0b00100011]);
/// ```
pub struct BitWriter {
    /// 已完成的字节
    data: Vec<u8>,
    /// 尚未凑满一个字节的位, 右对齐
    pending: u64,
    /// `pending` 中的有效位数 (0-7)
    pending_bits: u32,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            pending: 0,
            pending_bits: 0,
        }
    }

    /// 已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.pending_bits as usize
    }

    /// 写入 1 个位 (取最低位)
    pub fn write_bit(&mut self, bit: u32) {
        self.write_bits(bit & 1, 1);
    }

    /// 写入布尔标志
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 `value` 的低 `n` 位 (最多 32 位), 高位在前
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        if n == 0 {
            return;
        }
        let mask = (1u64 << n) - 1;
        self.pending = (self.pending << n) | (u64::from(value) & mask);
        self.pending_bits += n;
        while self.pending_bits >= 8 {
            self.pending_bits -= 8;
            self.data.push((self.pending >> self.pending_bits) as u8);
        }
        self.pending &= (1u64 << self.pending_bits) - 1;
    }

    /// 写入无符号 Exp-Golomb 编码值, ue(v)
    pub fn write_ue(&mut self, value: u32) {
        let code = u64::from(value) + 1;
        let len = 64 - code.leading_zeros();
        let leading_zeros = len - 1;
        for _ in 0..leading_zeros {
            self.write_bit(0);
        }
        // code 的最高位即前缀终止的 1
        if len > 32 {
            self.write_bit(1);
            self.write_bits(code as u32, 32);
        } else {
            self.write_bits(code as u32, len);
        }
    }

    /// 写入有符号 Exp-Golomb 编码值, se(v)
    pub fn write_se(&mut self, value: i32) {
        // 映射: 0→0, 1→1, -1→2, 2→3, -2→4, ...
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.write_ue(code);
    }

    /// 写入 rbsp_trailing_bits (一个 1 后补 0 到字节边界)
    pub fn write_trailing_bits(&mut self) {
        self.write_bit(1);
        self.align_to_byte();
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) {
        if self.pending_bits > 0 {
            self.write_bits(0, 8 - self.pending_bits);
        }
    }

    /// 写入完整字节; 未对齐时逐字节移位写入
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.pending_bits == 0 {
            self.data.extend_from_slice(bytes);
            return;
        }
        for &byte in bytes {
            self.write_bits(u32::from(byte), 8);
        }
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 自动用 0 填充.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
