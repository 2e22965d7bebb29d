use crate::{
    disk::{Block, BlockDevice, BLOCK_SIZE},
    fs::{config::bitmap_blocks, error::Result},
};

/// 资源位图：true = 已占用。
///
/// 内存中是布尔向量，落盘时经 `pack` 按位打包：第 `i` 位存放在第 `i / 8`
/// 个字节中，掩码为 `0x80 >> (i % 8)`（高位在前），读回时经 `unpack` 还原。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    used: Vec<bool>,
    start_block: u64,
}

impl Bitmap {
    // 创建一个新的位图（所有位清零 = 空闲）
    pub fn new(len: u64, start_block: u64) -> Self {
        Self {
            used: vec![false; len as usize],
            start_block,
        }
    }

    pub fn len(&self) -> u64 {
        self.used.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// 分配编号最小的空闲位并置为占用
    pub fn alloc(&mut self) -> Option<u64> {
        let index = self.used.iter().position(|&used| !used)?;
        self.used[index] = true;
        Some(index as u64)
    }

    /// 直接把某一位标记为占用，返回之前是否空闲
    pub fn mark_used(&mut self, index: u64) -> bool {
        match self.used.get_mut(index as usize) {
            Some(slot) => !std::mem::replace(slot, true),
            None => false,
        }
    }

    /// 释放一位，返回之前是否占用
    pub fn free(&mut self, index: u64) -> bool {
        match self.used.get_mut(index as usize) {
            Some(slot) => std::mem::replace(slot, false),
            None => false,
        }
    }

    pub fn is_used(&self, index: u64) -> bool {
        self.used.get(index as usize).copied().unwrap_or(false)
    }

    pub fn used_count(&self) -> u64 {
        self.used.iter().filter(|&&used| used).count() as u64
    }

    pub fn free_count(&self) -> u64 {
        self.len() - self.used_count()
    }

    pub fn to_bools(&self) -> Vec<bool> {
        self.used.clone()
    }

    /// 从磁盘加载位图，只取前 `len` 位，填充位被忽略
    pub fn load<D: BlockDevice>(disk: &D, start_block: u64, len: u64) -> Result<Self> {
        let size_in_block = bitmap_blocks(len);
        let mut bytes = Vec::with_capacity(size_in_block as usize * BLOCK_SIZE);
        let mut block_buf: Block = [0; BLOCK_SIZE];

        for i in 0..size_in_block {
            disk.read_block(start_block + i, &mut block_buf)?;
            bytes.extend_from_slice(&block_buf);
        }

        Ok(Self {
            used: unpack(&bytes, len as usize),
            start_block,
        })
    }

    // 将位图写回磁盘，不足一块的部分用 0 填充
    pub fn sync<D: BlockDevice>(&self, disk: &mut D) -> Result<()> {
        let bytes = pack(&self.used);
        let mut chunks = bytes.chunks(BLOCK_SIZE);
        for i in 0..bitmap_blocks(self.len()) {
            let mut block_buf: Block = [0; BLOCK_SIZE];
            if let Some(chunk) = chunks.next() {
                block_buf[..chunk.len()].copy_from_slice(chunk);
            }
            disk.write_block(self.start_block + i, &block_buf)?;
        }
        Ok(())
    }
}

/// 把布尔向量按高位在前打包成字节
pub fn pack(flags: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; flags.len().div_ceil(8)];
    for (i, &used) in flags.iter().enumerate() {
        if used {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bytes
}

/// `pack` 的逆操作，只取前 `len` 位
pub fn unpack(bytes: &[u8], len: usize) -> Vec<bool> {
    (0..len)
        .map(|i| {
            bytes
                .get(i / 8)
                .is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0)
        })
        .collect()
}
