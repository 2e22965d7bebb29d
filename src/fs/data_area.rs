//! 数据区读写：把一段字节按块切分写入一组数据块，以及一级间接块的编解码。

use crate::{
    disk::{Block, BlockDevice, BLOCK_SIZE},
    fs::{config::PTRS_PER_INDIRECT, error::Result},
};

const PTR_SIZE: usize = std::mem::size_of::<u64>();

/// 存放 `len` 字节需要的块数，至少 1 块
pub fn blocks_needed(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE).max(1)
}

/// 把 `bytes` 依次写入 `blocks`，第 i 块存放第 i 段内容；
/// 内容用完之后剩下的块整块清零。
pub fn write_span<D: BlockDevice>(disk: &mut D, blocks: &[u64], bytes: &[u8]) -> Result<()> {
    debug_assert!(bytes.len() <= blocks.len() * BLOCK_SIZE);

    let mut chunks = bytes.chunks(BLOCK_SIZE);
    for &block_id in blocks {
        let mut block_buf: Block = [0; BLOCK_SIZE];
        if let Some(chunk) = chunks.next() {
            block_buf[..chunk.len()].copy_from_slice(chunk);
        }
        disk.write_block(block_id, &block_buf)?;
    }
    Ok(())
}

/// 按顺序拼接若干块的完整内容
pub fn read_span<D: BlockDevice>(disk: &D, blocks: &[u64]) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(blocks.len() * BLOCK_SIZE);
    let mut block_buf: Block = [0; BLOCK_SIZE];
    for &block_id in blocks {
        disk.read_block(block_id, &mut block_buf)?;
        bytes.extend_from_slice(&block_buf);
    }
    Ok(bytes)
}

/// 间接块：最多 4 个小端序 u64 块号，遇到 0 结束
pub fn read_pointer_block<D: BlockDevice>(disk: &D, block_id: u64) -> Result<Vec<u64>> {
    let mut block_buf: Block = [0; BLOCK_SIZE];
    disk.read_block(block_id, &mut block_buf)?;

    Ok(block_buf[..PTRS_PER_INDIRECT * PTR_SIZE]
        .chunks_exact(PTR_SIZE)
        .map(|raw| {
            let mut ptr = [0u8; PTR_SIZE];
            ptr.copy_from_slice(raw);
            u64::from_le_bytes(ptr)
        })
        .take_while(|&ptr| ptr != 0)
        .collect())
}

pub fn write_pointer_block<D: BlockDevice>(disk: &mut D, block_id: u64, ptrs: &[u64]) -> Result<()> {
    debug_assert!(ptrs.len() <= PTRS_PER_INDIRECT);

    let mut block_buf: Block = [0; BLOCK_SIZE];
    for (slot, ptr) in block_buf.chunks_exact_mut(PTR_SIZE).zip(ptrs) {
        slot.copy_from_slice(&ptr.to_le_bytes());
    }
    disk.write_block(block_id, &block_buf)?;
    Ok(())
}
