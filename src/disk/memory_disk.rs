use std::io::{Error, ErrorKind, Result};

use crate::disk::{
    block_device::BlockDevice,
    types::{Block, BLOCK_SIZE},
};

/// 内存中的虚拟磁盘：一组定长块组成的数组，按块号寻址。
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    blocks: Vec<Block>,
}

impl MemoryDisk {
    pub fn new(block_count: u64) -> Self {
        Self {
            blocks: vec![[0; BLOCK_SIZE]; block_count as usize],
        }
    }

    /// 直接查看某个块的原始内容（调试与测试用）
    pub fn block(&self, block_id: u64) -> Option<&Block> {
        self.blocks.get(block_id as usize)
    }
}

fn out_of_range(block_id: u64, block_count: usize) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!(
            "block {} out of range (disk has {} blocks)",
            block_id, block_count
        ),
    )
}

impl BlockDevice for MemoryDisk {
    fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        let block = self
            .blocks
            .get(block_id as usize)
            .ok_or_else(|| out_of_range(block_id, self.blocks.len()))?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&mut self, block_id: u64, buf: &Block) -> Result<()> {
        let block_count = self.blocks.len();
        let block = self
            .blocks
            .get_mut(block_id as usize)
            .ok_or_else(|| out_of_range(block_id, block_count))?;
        block.copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_block() {
        let mut disk = MemoryDisk::new(4);
        let mut data = [0u8; BLOCK_SIZE];
        data[0] = 0xAB;
        data[BLOCK_SIZE - 1] = 0xCD;
        disk.write_block(2, &data).unwrap();

        let mut buf = [0u8; BLOCK_SIZE];
        disk.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(disk.block(1), Some(&[0u8; BLOCK_SIZE]));
    }

    #[test]
    fn zero_block_clears_contents() {
        let mut disk = MemoryDisk::new(2);
        disk.write_block(1, &[7; BLOCK_SIZE]).unwrap();
        disk.zero_block(1).unwrap();
        assert_eq!(disk.block(1), Some(&[0u8; BLOCK_SIZE]));
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut disk = MemoryDisk::new(2);
        let mut buf = [0u8; BLOCK_SIZE];
        let err = disk.read_block(2, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(disk.write_block(5, &buf).is_err());
        assert_eq!(disk.block_count(), 2);
    }
}
