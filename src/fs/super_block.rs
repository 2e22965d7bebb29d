use serde::{Deserialize, Serialize};

use crate::{
    disk::{Block, BlockDevice, BLOCK_SIZE},
    fs::{
        config::{bitmap_blocks, FsConfig, FS_MAGIC, FS_VERSION, INODE_BITMAP_BLOCK_ID, ROOT_INODE, SUPER_BLOCK_BLOCK_ID},
        error::{FileSystemError, Result},
    },
    utils::current_timestamp,
};

/// 位于 0 号块的超级块，记录各区域的起始块号。
///
/// 以 bincode 默认格式编码：定长整数、小端序、字段按声明顺序排列，
/// 因此磁盘上前 8 个字节就是小端序的魔数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: u64,
    pub version: u32,
    pub volume_id: String,
    /** 数据块块信息 */
    pub block_size: u64,
    pub total_blocks: u64,
    pub data_blocks: u64,
    /** inode 信息 */
    pub total_inodes: u32,
    pub root_inode: u32,
    /** 各区域起始块号 */
    pub inode_bitmap_start: u64,
    pub block_bitmap_start: u64,
    pub inode_table_start: u64,
    pub inode_table_blocks: u64,
    pub data_block_start: u64,
    pub formatted_at: i64,
}

impl SuperBlock {
    pub fn new(config: &FsConfig, volume_id: String) -> Self {
        // 超级块占 1 块，其后依次是 inode 位图、数据块位图、inode 表、数据区
        let inode_bitmap_start = INODE_BITMAP_BLOCK_ID;
        let block_bitmap_start = inode_bitmap_start + config.inode_bitmap_blocks();
        let inode_table_start = block_bitmap_start + config.block_bitmap_blocks();
        let inode_table_blocks = config.inode_table_blocks();
        let data_block_start = inode_table_start + inode_table_blocks;

        Self {
            magic: FS_MAGIC,
            version: FS_VERSION,
            volume_id,
            block_size: BLOCK_SIZE as u64,
            total_blocks: data_block_start + config.data_blocks,
            data_blocks: config.data_blocks,
            total_inodes: config.total_inodes,
            root_inode: ROOT_INODE,
            inode_bitmap_start,
            block_bitmap_start,
            inode_table_start,
            inode_table_blocks,
            data_block_start,
            formatted_at: current_timestamp(),
        }
    }

    /// 位图下标 -> 磁盘块号
    pub fn data_block_id(&self, index: u64) -> u64 {
        self.data_block_start + index
    }

    /// 磁盘块号 -> 位图下标，不在数据区内返回 None
    pub fn data_index(&self, block_id: u64) -> Option<u64> {
        block_id
            .checked_sub(self.data_block_start)
            .filter(|&index| index < self.data_blocks)
    }

    /// 检查魔数、版本以及各区域互不重叠
    pub fn validate(&self) -> Result<()> {
        let corrupt = |msg: String| Err(FileSystemError::CorruptSuperblock(msg));

        if self.magic != FS_MAGIC {
            return corrupt(format!("bad magic {:#018x}", self.magic));
        }
        if self.version != FS_VERSION {
            return corrupt(format!("unsupported version {}", self.version));
        }
        if self.block_size != BLOCK_SIZE as u64 {
            return corrupt(format!("unsupported block size {}", self.block_size));
        }
        if self.root_inode >= self.total_inodes {
            return corrupt(format!(
                "root inode {} outside table of {}",
                self.root_inode, self.total_inodes
            ));
        }

        // 偏移量来自磁盘，相加可能溢出
        let end_of = |start: u64, len: u64, what: &str| {
            start.checked_add(len).ok_or_else(|| {
                FileSystemError::CorruptSuperblock(format!(
                    "{} region {}+{} overflows",
                    what, start, len
                ))
            })
        };
        let inode_table_end =
            end_of(self.inode_table_start, self.inode_table_blocks, "inode table")?;
        let data_end = end_of(self.data_block_start, self.data_blocks, "data")?;

        let regions = [
            (SUPER_BLOCK_BLOCK_ID, SUPER_BLOCK_BLOCK_ID + 1),
            (self.inode_bitmap_start, self.block_bitmap_start),
            (self.block_bitmap_start, self.inode_table_start),
            (self.inode_table_start, inode_table_end),
            (self.data_block_start, self.total_blocks),
        ];
        for pair in regions.windows(2) {
            let (start, end) = pair[0];
            let (next_start, _) = pair[1];
            if start >= end || end > next_start {
                return corrupt(format!(
                    "overlapping regions {}..{} and {}..",
                    start, end, next_start
                ));
            }
        }
        if data_end != self.total_blocks {
            return corrupt("data region does not end at the last block".to_string());
        }
        // 位图区必须放得下对应数量的位
        let inode_bitmap_room = self.block_bitmap_start - self.inode_bitmap_start;
        let block_bitmap_room = self.inode_table_start - self.block_bitmap_start;
        if inode_bitmap_room < bitmap_blocks(self.total_inodes as u64)
            || block_bitmap_room < bitmap_blocks(self.data_blocks)
        {
            return corrupt("bitmap region too small".to_string());
        }
        Ok(())
    }

    pub fn write<D: BlockDevice>(&self, disk: &mut D) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| FileSystemError::CorruptSuperblock(e.to_string()))?;
        if bytes.len() > BLOCK_SIZE {
            return Err(FileSystemError::CorruptSuperblock(format!(
                "record of {} bytes does not fit in one block",
                bytes.len()
            )));
        }

        let mut block_buf: Block = [0; BLOCK_SIZE];
        block_buf[..bytes.len()].copy_from_slice(&bytes);
        disk.write_block(SUPER_BLOCK_BLOCK_ID, &block_buf)?;
        Ok(())
    }

    pub fn read<D: BlockDevice>(disk: &D) -> Result<Self> {
        let mut block_buf: Block = [0; BLOCK_SIZE];
        disk.read_block(SUPER_BLOCK_BLOCK_ID, &mut block_buf)?;

        let super_block: SuperBlock = bincode::deserialize(&block_buf)
            .map_err(|e| FileSystemError::CorruptSuperblock(e.to_string()))?;
        super_block.validate()?;
        if super_block.total_blocks > disk.block_count() {
            return Err(FileSystemError::CorruptSuperblock(format!(
                "volume of {} blocks on a disk of {}",
                super_block.total_blocks,
                disk.block_count()
            )));
        }
        Ok(super_block)
    }
}
