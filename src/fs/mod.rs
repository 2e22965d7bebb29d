use std::{collections::BTreeMap, fmt};

use crate::{
    disk::BlockDevice,
    fs::{
        config::{FsConfig, DIRECT_PTRS, ROOT_DIR_NAME, ROOT_INODE},
        data_block_bitmap::DataBlockBitmap,
        directory::Directory,
        error::{FileSystemError, Result},
        inode_bitmap::InodeBitmap,
        inode_table::InodeTable,
        super_block::SuperBlock,
    },
    utils::generate_uuid,
};

pub mod bitmap;
pub mod config;
pub mod data_area;
pub mod data_block_bitmap;
pub mod directory;
pub mod error;
pub mod file;
pub mod inode_bitmap;
pub mod inode_table;
pub mod operations;
pub mod super_block;

pub use operations::FileStat;

/// 文件系统：独占一块磁盘，所有状态都存放在磁盘上。
///
/// 每次操作都重新从磁盘读取超级块、位图、inode 表，不保留会话状态；
/// 同一时刻只允许一个调用方操作（`&mut self` 保证了这一点）。
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    disk: D,            // 底层磁盘抽象层
    config: FsConfig,   // 格式化时使用的容量配置
}

/// 一次操作期间从磁盘读出的元数据
#[derive(Debug)]
pub(crate) struct FsState {
    pub super_block: SuperBlock,
    pub inode_bitmap: InodeBitmap,
    pub data_bitmap: DataBlockBitmap,
    pub inode_table: InodeTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub block_size: u64,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
}

/// `verify` 发现的不一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    InodeBitmapMismatch { inode: u32, bitmap_used: bool, valid: bool },
    InvalidInodeHoldsBlocks(u32),
    ValidInodeWithoutBlocks(u32),
    BlockNotMarked { block: u64, inode: u32 },
    BlockOwnedTwice { block: u64, inode: u32 },
    BlockMarkedButUnowned(u64),
    DanglingEntry { name: String, inode: u32 },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InodeBitmapMismatch {
                inode,
                bitmap_used,
                valid,
            } => write!(
                f,
                "inode {}: bitmap says used={}, inode says valid={}",
                inode, bitmap_used, valid
            ),
            Self::InvalidInodeHoldsBlocks(inode) => {
                write!(f, "inode {} is invalid but still holds blocks", inode)
            }
            Self::ValidInodeWithoutBlocks(inode) => {
                write!(f, "inode {} is valid but has no first block", inode)
            }
            Self::BlockNotMarked { block, inode } => {
                write!(f, "block {} owned by inode {} is not marked used", block, inode)
            }
            Self::BlockOwnedTwice { block, inode } => {
                write!(f, "block {} is also claimed by inode {}", block, inode)
            }
            Self::BlockMarkedButUnowned(block) => {
                write!(f, "block {} is marked used but owned by no inode", block)
            }
            Self::DanglingEntry { name, inode } => {
                write!(f, "entry '{}' points at invalid inode {}", name, inode)
            }
        }
    }
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn new(disk: D) -> Self {
        Self::with_config(disk, FsConfig::default())
    }

    pub fn with_config(disk: D, config: FsConfig) -> Self {
        Self { disk, config }
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn disk(&self) -> &D {
        &self.disk
    }

    pub fn into_disk(self) -> D {
        self.disk
    }

    /// 格式化：清空磁盘，写入超级块、空位图、inode 表，并创建根目录
    pub fn format(&mut self) -> Result<SuperBlock> {
        self.config.validate()?;
        let needed = self.config.total_blocks();
        if self.disk.block_count() < needed {
            return Err(FileSystemError::InvalidConfig(format!(
                "disk has {} blocks, layout needs {}",
                self.disk.block_count(),
                needed
            )));
        }

        for block_id in 0..self.disk.block_count() {
            self.disk.zero_block(block_id)?;
        }

        let super_block = SuperBlock::new(&self.config, generate_uuid());
        super_block.write(&mut self.disk)?;

        let mut inode_bitmap = InodeBitmap::new(&super_block);
        let mut data_bitmap = DataBlockBitmap::new(&super_block);
        let mut inode_table = InodeTable::new(&super_block);

        // 根目录：固定 inode，占用第一个数据块
        inode_table.reserve_inode(&mut inode_bitmap, ROOT_INODE, true)?;
        let root = inode_table.find_mut(ROOT_INODE)?;
        root.direct_blocks[0] = data_bitmap.alloc()?;
        Directory::new(ROOT_DIR_NAME, ROOT_INODE).store(
            &mut self.disk,
            &mut root.direct_blocks,
            &mut data_bitmap,
        )?;

        inode_bitmap.sync(&mut self.disk)?;
        data_bitmap.sync(&mut self.disk)?;
        inode_table.sync(&mut self.disk)?;

        log::info!(
            "formatted volume {}: {} blocks ({} data), {} inodes",
            super_block.volume_id,
            super_block.total_blocks,
            super_block.data_blocks,
            super_block.total_inodes
        );
        Ok(super_block)
    }

    pub fn super_block(&self) -> Result<SuperBlock> {
        SuperBlock::read(&self.disk)
    }

    pub(crate) fn load_state(&self) -> Result<FsState> {
        let super_block = SuperBlock::read(&self.disk)?;
        let inode_bitmap = InodeBitmap::load(&self.disk, &super_block)?;
        let data_bitmap = DataBlockBitmap::load(&self.disk, &super_block)?;
        let inode_table = InodeTable::load(&self.disk, &super_block)?;
        Ok(FsState {
            super_block,
            inode_bitmap,
            data_bitmap,
            inode_table,
        })
    }

    pub fn usage(&self) -> Result<Usage> {
        let state = self.load_state()?;
        Ok(Usage {
            block_size: state.super_block.block_size,
            total_blocks: state.data_bitmap.total_blocks(),
            free_blocks: state.data_bitmap.free_blocks(),
            total_inodes: state.inode_bitmap.total_inodes(),
            free_inodes: state.inode_bitmap.free_inodes(),
        })
    }

    /// 只读一致性检查：位图与 inode、数据块归属、目录项指向。
    ///
    /// 非原子操作中途失败可能留下不一致，这里只报告不修复。
    pub fn verify(&self) -> Result<Vec<Inconsistency>> {
        let state = self.load_state()?;
        let mut problems = Vec::new();
        let mut owners: BTreeMap<u64, u32> = BTreeMap::new();

        for inode in state.inode_table.iter() {
            let n = inode.inode_number;
            let bitmap_used = state.inode_bitmap.is_used(n);
            if bitmap_used != inode.is_valid() {
                problems.push(Inconsistency::InodeBitmapMismatch {
                    inode: n,
                    bitmap_used,
                    valid: inode.is_valid(),
                });
            }
            if !inode.is_valid() {
                if inode.direct_blocks != [0; DIRECT_PTRS] {
                    problems.push(Inconsistency::InvalidInodeHoldsBlocks(n));
                }
                continue;
            }
            if inode.direct_blocks[0] == 0 {
                problems.push(Inconsistency::ValidInodeWithoutBlocks(n));
                continue;
            }

            let owned = if inode.is_directory() {
                Directory::owned_blocks(&self.disk, &inode.direct_blocks)?
            } else {
                inode.blocks().collect()
            };
            for block in owned {
                if owners.insert(block, n).is_some() {
                    problems.push(Inconsistency::BlockOwnedTwice { block, inode: n });
                }
                if !state.data_bitmap.is_used(block) {
                    problems.push(Inconsistency::BlockNotMarked { block, inode: n });
                }
            }

            if inode.is_directory() {
                let dir = Directory::load(&self.disk, &inode.direct_blocks)?;
                for entry in &dir.entries {
                    let target_valid = state
                        .inode_table
                        .find(entry.inode_number)
                        .is_ok_and(|target| target.is_valid());
                    if !target_valid {
                        problems.push(Inconsistency::DanglingEntry {
                            name: entry.name.clone(),
                            inode: entry.inode_number,
                        });
                    }
                }
            }
        }

        for block in state.data_bitmap.used_blocks() {
            if !owners.contains_key(&block) {
                problems.push(Inconsistency::BlockMarkedButUnowned(block));
            }
        }

        for problem in &problems {
            log::warn!("verify: {}", problem);
        }
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{MemoryDisk, BLOCK_SIZE};

    fn small_fs() -> FileSystem<MemoryDisk> {
        let config = FsConfig::new(8, 32);
        FileSystem::with_config(MemoryDisk::new(config.total_blocks()), config)
    }

    #[test]
    fn format_reserves_root_only() {
        let mut fs = small_fs();
        let sb = fs.format().unwrap();
        let state = fs.load_state().unwrap();

        assert_eq!(
            state.inode_bitmap.to_bools(),
            vec![false, true, false, false, false, false, false, false]
        );
        assert_eq!(state.data_bitmap.used_blocks(), vec![sb.data_block_start]);

        let root = state.inode_table.find(ROOT_INODE).unwrap();
        assert!(root.is_valid());
        assert!(root.is_directory());
        assert_eq!(root.direct_blocks, [sb.data_block_start, 0, 0, 0]);

        let dir = Directory::load(fs.disk(), &root.direct_blocks).unwrap();
        assert_eq!(dir.name, ROOT_DIR_NAME);
        assert_eq!(dir.inode_number, ROOT_INODE);
        assert!(dir.is_empty());
        assert!(fs.verify().unwrap().is_empty());
    }

    #[test]
    fn reformat_wipes_previous_contents() {
        let mut fs = small_fs();
        let first = fs.format().unwrap();
        let last = first.total_blocks - 1;
        fs.disk.write_block(last, &[9; BLOCK_SIZE]).unwrap();

        let second = fs.format().unwrap();
        assert_ne!(first.volume_id, second.volume_id);
        assert_eq!(fs.disk().block(last), Some(&[0u8; BLOCK_SIZE]));
        assert_eq!(fs.super_block().unwrap(), second);
    }

    #[test]
    fn format_rejects_small_disk() {
        let mut fs = FileSystem::new(MemoryDisk::new(100));
        assert!(matches!(
            fs.format(),
            Err(FileSystemError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unformatted_disk_cannot_be_used() {
        let fs = small_fs();
        assert!(matches!(
            fs.usage(),
            Err(FileSystemError::CorruptSuperblock(_))
        ));
    }

    #[test]
    fn usage_after_format() {
        let mut fs = small_fs();
        fs.format().unwrap();
        let usage = fs.usage().unwrap();
        assert_eq!(usage.block_size, BLOCK_SIZE as u64);
        assert_eq!(usage.total_blocks, 32);
        assert_eq!(usage.free_blocks, 31);
        assert_eq!(usage.total_inodes, 8);
        assert_eq!(usage.free_inodes, 7);
    }

    #[test]
    fn verify_reports_bitmap_damage() {
        let mut fs = small_fs();
        let sb = fs.format().unwrap();
        let mut state = fs.load_state().unwrap();
        state.inode_bitmap.mark_used(5).unwrap();
        state.inode_bitmap.sync(&mut fs.disk).unwrap();
        let stray = state.data_bitmap.alloc().unwrap();
        state.data_bitmap.sync(&mut fs.disk).unwrap();

        let problems = fs.verify().unwrap();
        assert_eq!(
            problems,
            vec![
                Inconsistency::InodeBitmapMismatch {
                    inode: 5,
                    bitmap_used: true,
                    valid: false
                },
                Inconsistency::BlockMarkedButUnowned(stray),
            ]
        );
        assert_eq!(stray, sb.data_block_start + 1);
    }
}
