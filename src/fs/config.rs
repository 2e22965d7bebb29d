use crate::{disk::BLOCK_SIZE, fs::error::FileSystemError};

pub const SUPER_BLOCK_BLOCK_ID: u64 = 0;
pub const INODE_BITMAP_BLOCK_ID: u64 = 1;

// 超级块魔数 "VSFS" + 格式版本
pub const FS_MAGIC: u64 = 0x5653_4653_0000_0001;
pub const FS_VERSION: u32 = 1;

// inode 表中为每个 inode 预留 64 字节
pub const INODE_SIZE: u64 = 64;

pub const TOTAL_INODES: u32 = 120;
pub const TOTAL_DATA_BLOCKS: u64 = 6000;

// 根目录固定使用 1 号 inode
pub const ROOT_INODE: u32 = 1;
pub const ROOT_DIR_NAME: &str = "root";

pub const MAX_FILENAME_LEN: usize = 12;

// 块索引区：4 个直接块指针；目录只用前 3 个，第 4 个作为一级间接块
pub const DIRECT_PTRS: usize = 4;
pub const DIR_DIRECT_PTRS: usize = 3;
pub const PTRS_PER_INDIRECT: usize = 4;

pub const MAX_FILE_SIZE: usize = DIRECT_PTRS * BLOCK_SIZE;
pub const MAX_DIRECTORY_SIZE: usize = (DIR_DIRECT_PTRS + PTRS_PER_INDIRECT) * BLOCK_SIZE;

/// 文件系统容量配置，格式化时据此计算磁盘布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    pub total_inodes: u32,
    pub data_blocks: u64,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            total_inodes: TOTAL_INODES,
            data_blocks: TOTAL_DATA_BLOCKS,
        }
    }
}

impl FsConfig {
    pub fn new(total_inodes: u32, data_blocks: u64) -> Self {
        Self {
            total_inodes,
            data_blocks,
        }
    }

    pub fn validate(&self) -> Result<(), FileSystemError> {
        if self.total_inodes <= ROOT_INODE {
            return Err(FileSystemError::InvalidConfig(format!(
                "need at least {} inodes, got {}",
                ROOT_INODE + 1,
                self.total_inodes
            )));
        }
        if self.data_blocks == 0 {
            return Err(FileSystemError::InvalidConfig(
                "need at least one data block".to_string(),
            ));
        }
        Ok(())
    }

    pub fn inode_bitmap_blocks(&self) -> u64 {
        bitmap_blocks(self.total_inodes as u64)
    }

    pub fn block_bitmap_blocks(&self) -> u64 {
        bitmap_blocks(self.data_blocks)
    }

    pub fn inode_table_blocks(&self) -> u64 {
        (self.total_inodes as u64 * INODE_SIZE).div_ceil(BLOCK_SIZE as u64)
    }

    /// 元数据区（超级块 + 两张位图 + inode 表）占用的块数，即数据区起始块号
    pub fn metadata_blocks(&self) -> u64 {
        1 + self.inode_bitmap_blocks() + self.block_bitmap_blocks() + self.inode_table_blocks()
    }

    pub fn total_blocks(&self) -> u64 {
        self.metadata_blocks() + self.data_blocks
    }
}

/// 位图占用的块数 = ceil(ceil(bits / 8) / BLOCK_SIZE)
pub fn bitmap_blocks(bits: u64) -> u64 {
    bits.div_ceil(8).div_ceil(BLOCK_SIZE as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let config = FsConfig::default();
        assert_eq!(config.inode_bitmap_blocks(), 1);
        assert_eq!(config.block_bitmap_blocks(), 1);
        assert_eq!(config.inode_table_blocks(), 8);
        assert_eq!(config.metadata_blocks(), 11);
        assert_eq!(config.total_blocks(), 6011);
    }

    #[test]
    fn large_bitmaps_span_several_blocks() {
        assert_eq!(bitmap_blocks(8 * 1024), 1);
        assert_eq!(bitmap_blocks(8 * 1024 + 1), 2);
    }

    #[test]
    fn rejects_configs_without_room_for_root() {
        assert!(FsConfig::new(1, 10).validate().is_err());
        assert!(FsConfig::new(2, 0).validate().is_err());
        assert!(FsConfig::new(2, 1).validate().is_ok());
    }
}
