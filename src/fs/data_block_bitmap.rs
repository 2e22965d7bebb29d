use crate::{
    disk::BlockDevice,
    fs::{
        bitmap::Bitmap,
        error::{FileSystemError, Result},
        super_block::SuperBlock,
    },
};

/// 数据块分配信息。
///
/// 位图下标与磁盘块号之间的换算交给超级块；对外接口一律使用
/// 磁盘绝对块号。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlockBitmap {
    map: Bitmap,
    super_block: SuperBlock,
}

impl DataBlockBitmap {
    pub fn new(super_block: &SuperBlock) -> Self {
        Self {
            map: Bitmap::new(super_block.data_blocks, super_block.block_bitmap_start),
            super_block: super_block.clone(),
        }
    }

    // 分配一个空闲的数据块，返回磁盘块号
    pub fn alloc(&mut self) -> Result<u64> {
        let index = self.map.alloc().ok_or(FileSystemError::OutOfSpace)?;
        Ok(self.super_block.data_block_id(index))
    }

    /// 释放一个数据块，同时把块内容清零，不留残余数据
    pub fn free<D: BlockDevice>(&mut self, disk: &mut D, block_id: u64) -> Result<()> {
        let index = self.index_of(block_id)?;
        disk.zero_block(block_id)?;
        self.map.free(index);
        Ok(())
    }

    pub fn is_used(&self, block_id: u64) -> bool {
        self.index_of(block_id)
            .is_ok_and(|index| self.map.is_used(index))
    }

    pub fn total_blocks(&self) -> u64 {
        self.map.len()
    }

    pub fn free_blocks(&self) -> u64 {
        self.map.free_count()
    }

    /// 所有已占用数据块的磁盘块号，按块号升序
    pub fn used_blocks(&self) -> Vec<u64> {
        (0..self.map.len())
            .filter(|&index| self.map.is_used(index))
            .map(|index| self.super_block.data_block_id(index))
            .collect()
    }

    fn index_of(&self, block_id: u64) -> Result<u64> {
        self.super_block
            .data_index(block_id)
            .ok_or(FileSystemError::InvalidBlock(block_id))
    }

    // 从磁盘加载数据块位图
    pub fn load<D: BlockDevice>(disk: &D, super_block: &SuperBlock) -> Result<Self> {
        let map = Bitmap::load(
            disk,
            super_block.block_bitmap_start,
            super_block.data_blocks,
        )?;
        Ok(Self {
            map,
            super_block: super_block.clone(),
        })
    }

    // 将数据块位图写回磁盘
    pub fn sync<D: BlockDevice>(&self, disk: &mut D) -> Result<()> {
        self.map.sync(disk)
    }
}
