use serde::{Deserialize, Serialize};

use crate::{
    disk::BlockDevice,
    fs::{
        config::{DIRECT_PTRS, MAX_FILE_SIZE},
        data_area::{blocks_needed, read_span, write_span},
        data_block_bitmap::DataBlockBitmap,
        error::{FileSystemError, Result},
        inode_table::Inode,
    },
};

/// 单个文件的内容记录，序列化后存放在 inode 的直接块中（最多 4 块，无间接块）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub filename: String,
    pub inode_number: u32,
    pub payload: Vec<u8>,
}

impl FileContent {
    pub fn new(filename: &str, inode_number: u32) -> Self {
        Self {
            filename: filename.to_string(),
            inode_number,
            payload: Vec::new(),
        }
    }

    /// 序列化后写入 inode 拥有的块，块不够时从位图追加分配。
    ///
    /// 已拥有的块足够时原地覆盖；发生分配时写回数据块位图。
    pub fn store<D: BlockDevice>(
        &self,
        disk: &mut D,
        inode: &mut Inode,
        data_bitmap: &mut DataBlockBitmap,
    ) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| FileSystemError::CorruptFile(e.to_string()))?;
        let required = blocks_needed(bytes.len());
        if required > DIRECT_PTRS {
            return Err(FileSystemError::FileTooLarge {
                size: bytes.len(),
                max: MAX_FILE_SIZE,
            });
        }

        let owned = inode.block_count();
        if owned < required {
            if data_bitmap.free_blocks() < (required - owned) as u64 {
                return Err(FileSystemError::OutOfSpace);
            }
            for slot in inode.direct_blocks[owned..required].iter_mut() {
                *slot = data_bitmap.alloc()?;
            }
            log::debug!(
                "[inode #{}] grew from {} to {} blocks",
                inode.inode_number,
                owned,
                required
            );
            data_bitmap.sync(disk)?;
        }

        let blocks: Vec<u64> = inode.blocks().collect();
        write_span(disk, &blocks, &bytes)
    }

    /// 拼接 inode 的直接块后反序列化
    pub fn load<D: BlockDevice>(disk: &D, inode: &Inode) -> Result<Self> {
        let blocks: Vec<u64> = inode.blocks().collect();
        let bytes = read_span(disk, &blocks)?;
        bincode::deserialize(&bytes).map_err(|e| FileSystemError::CorruptFile(e.to_string()))
    }
}
