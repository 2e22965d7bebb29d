use crate::{
    disk::BlockDevice,
    fs::{
        bitmap::Bitmap,
        error::{FileSystemError, Result},
        super_block::SuperBlock,
    },
};

/// inode 分配信息，每个 bit 表示一个 inode 槽位是否被占用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeBitmap {
    map: Bitmap,
}

impl InodeBitmap {
    pub fn new(super_block: &SuperBlock) -> Self {
        Self {
            map: Bitmap::new(
                super_block.total_inodes as u64,
                super_block.inode_bitmap_start,
            ),
        }
    }

    // 分配一个空闲 inode，返回 inode 编号（从 0 开始）
    pub fn alloc(&mut self) -> Result<u32> {
        self.map
            .alloc()
            .map(|index| index as u32)
            .ok_or(FileSystemError::NoFreeInodes)
    }

    /// 格式化时保留固定编号的 inode（如根目录）
    pub fn mark_used(&mut self, inode_number: u32) -> Result<()> {
        self.check_range(inode_number)?;
        self.map.mark_used(inode_number as u64);
        Ok(())
    }

    pub fn free(&mut self, inode_number: u32) -> Result<()> {
        self.check_range(inode_number)?;
        self.map.free(inode_number as u64);
        Ok(())
    }

    pub fn is_used(&self, inode_number: u32) -> bool {
        self.map.is_used(inode_number as u64)
    }

    pub fn total_inodes(&self) -> u64 {
        self.map.len()
    }

    pub fn free_inodes(&self) -> u64 {
        self.map.free_count()
    }

    pub fn to_bools(&self) -> Vec<bool> {
        self.map.to_bools()
    }

    fn check_range(&self, inode_number: u32) -> Result<()> {
        if inode_number as u64 >= self.map.len() {
            return Err(FileSystemError::InvalidInode(inode_number));
        }
        Ok(())
    }

    pub fn load<D: BlockDevice>(disk: &D, super_block: &SuperBlock) -> Result<Self> {
        let map = Bitmap::load(
            disk,
            super_block.inode_bitmap_start,
            super_block.total_inodes as u64,
        )?;
        Ok(Self { map })
    }

    // 将 inode 位图写回磁盘
    pub fn sync<D: BlockDevice>(&self, disk: &mut D) -> Result<()> {
        self.map.sync(disk)
    }
}
