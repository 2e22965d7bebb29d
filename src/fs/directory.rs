use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, BLOCK_SIZE},
    fs::{
        config::{DIRECT_PTRS, DIR_DIRECT_PTRS, MAX_DIRECTORY_SIZE, PTRS_PER_INDIRECT},
        data_area::{blocks_needed, read_pointer_block, read_span, write_pointer_block, write_span},
        data_block_bitmap::DataBlockBitmap,
        error::{FileSystemError, Result},
    },
};

// 间接块指针所在的槽位
const INDIRECT_SLOT: usize = DIR_DIRECT_PTRS;

// 一个目录项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub inode_number: u32,
}

/// 目录结构，目录项保持插入顺序，查找时先插入的优先。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub name: String,
    pub inode_number: u32,
    pub entries: Vec<DirEntry>,
}

impl Directory {
    pub fn new(name: &str, inode_number: u32) -> Self {
        Self {
            name: name.to_string(),
            inode_number,
            entries: Vec::new(),
        }
    }

    // 添加目录项
    pub fn add(&mut self, name: &str, inode_number: u32) {
        self.entries.push(DirEntry {
            name: name.to_string(),
            inode_number,
        });
    }

    // 删除第一个同名目录项，返回 inode 编号
    pub fn remove(&mut self, name: &str) -> Option<u32> {
        let idx = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(idx).inode_number)
    }

    // 查找目录项，返回 inode 编号
    pub fn find(&self, name: &str) -> Option<u32> {
        self.get(name).map(|e| e.inode_number)
    }

    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 序列化并写入目录 inode 的块中，等价于 `reserve` 之后立即 `commit`。
    pub fn store<D: BlockDevice>(
        &self,
        disk: &mut D,
        blocks: &mut [u64; DIRECT_PTRS],
        data_bitmap: &mut DataBlockBitmap,
    ) -> Result<()> {
        self.reserve(disk, blocks, data_bitmap)?.commit(disk, blocks)
    }

    /// 序列化目录并预留所需的块，不写磁盘。
    ///
    /// 前 3 个直接块放得下就只用直接块；否则第 4 个槽位指向一个间接块，
    /// 其中最多再列出 4 个数据块。缺少的块先整体计数，空闲块不够时直接
    /// 返回 `OutOfSpace`，`blocks` 与位图都保持原样。
    pub fn reserve<D: BlockDevice>(
        &self,
        disk: &D,
        blocks: &mut [u64; DIRECT_PTRS],
        data_bitmap: &mut DataBlockBitmap,
    ) -> Result<EncodedDirectory> {
        let bytes = bincode::serialize(self)
            .map_err(|e| FileSystemError::CorruptDirectory(e.to_string()))?;
        let needed = blocks_needed(bytes.len());
        if needed > DIR_DIRECT_PTRS + PTRS_PER_INDIRECT {
            return Err(FileSystemError::DirectoryTooLarge {
                size: bytes.len(),
                max: MAX_DIRECTORY_SIZE,
            });
        }

        let direct_needed = needed.min(DIR_DIRECT_PTRS);
        let indirect_needed = needed.saturating_sub(DIR_DIRECT_PTRS);
        let mut ptrs = if blocks[INDIRECT_SLOT] == 0 {
            Vec::new()
        } else {
            read_pointer_block(disk, blocks[INDIRECT_SLOT])?
        };

        let missing_direct = blocks[..direct_needed].iter().filter(|&&b| b == 0).count();
        let missing_indirect = usize::from(indirect_needed > 0 && blocks[INDIRECT_SLOT] == 0);
        let missing_ptrs = indirect_needed.saturating_sub(ptrs.len());
        let missing = (missing_direct + missing_indirect + missing_ptrs) as u64;
        if missing > data_bitmap.free_blocks() {
            log::warn!(
                "directory '{}' needs {} more blocks, only {} free",
                self.name,
                missing,
                data_bitmap.free_blocks()
            );
            return Err(FileSystemError::OutOfSpace);
        }

        for slot in blocks.iter_mut().take(direct_needed) {
            if *slot == 0 {
                *slot = data_bitmap.alloc()?;
                log::debug!("directory '{}' grew to block {}", self.name, slot);
            }
        }
        if missing_indirect > 0 {
            blocks[INDIRECT_SLOT] = data_bitmap.alloc()?;
            log::debug!(
                "directory '{}' uses indirect block {}",
                self.name,
                blocks[INDIRECT_SLOT]
            );
        }
        while ptrs.len() < indirect_needed {
            ptrs.push(data_bitmap.alloc()?);
        }

        Ok(EncodedDirectory { bytes, ptrs })
    }

    /// 拼接直接块与间接块引用的块后反序列化
    pub fn load<D: BlockDevice>(disk: &D, blocks: &[u64; DIRECT_PTRS]) -> Result<Self> {
        let mut bytes = read_span(disk, &owned_direct_blocks(blocks))?;
        if blocks[INDIRECT_SLOT] != 0 {
            let ptrs = read_pointer_block(disk, blocks[INDIRECT_SLOT])?;
            bytes.extend(read_span(disk, &ptrs)?);
        }

        bincode::deserialize(&bytes).map_err(|e| FileSystemError::CorruptDirectory(e.to_string()))
    }

    /// 目录占用的所有块：直接块、间接块本身以及它引用的块
    pub fn owned_blocks<D: BlockDevice>(disk: &D, blocks: &[u64; DIRECT_PTRS]) -> Result<Vec<u64>> {
        let mut owned = owned_direct_blocks(blocks);
        if blocks[INDIRECT_SLOT] != 0 {
            owned.push(blocks[INDIRECT_SLOT]);
            owned.extend(read_pointer_block(disk, blocks[INDIRECT_SLOT])?);
        }
        Ok(owned)
    }
}

/// `Directory::reserve` 的结果：序列化后的字节和间接块里的指针。
/// 已拥有的块全部重写，没有内容的部分清零。
#[derive(Debug)]
pub struct EncodedDirectory {
    bytes: Vec<u8>,
    ptrs: Vec<u64>,
}

impl EncodedDirectory {
    pub fn commit<D: BlockDevice>(self, disk: &mut D, blocks: &[u64; DIRECT_PTRS]) -> Result<()> {
        let direct = owned_direct_blocks(blocks);
        let (head, tail) = self
            .bytes
            .split_at(self.bytes.len().min(direct.len() * BLOCK_SIZE));
        write_span(disk, &direct, head)?;

        if blocks[INDIRECT_SLOT] == 0 {
            return Ok(());
        }
        write_span(disk, &self.ptrs, tail)?;
        write_pointer_block(disk, blocks[INDIRECT_SLOT], &self.ptrs)
    }
}

fn owned_direct_blocks(blocks: &[u64; DIRECT_PTRS]) -> Vec<u64> {
    blocks[..DIR_DIRECT_PTRS]
        .iter()
        .copied()
        .take_while(|&b| b != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disk::MemoryDisk,
        fs::{config::FsConfig, super_block::SuperBlock},
    };

    fn setup() -> (MemoryDisk, DataBlockBitmap) {
        let sb = SuperBlock::new(&FsConfig::new(8, 32), String::new());
        (MemoryDisk::new(sb.total_blocks), DataBlockBitmap::new(&sb))
    }

    fn big_directory(entries: usize) -> Directory {
        let mut dir = Directory::new("root", 1);
        for i in 0..entries {
            dir.add(&format!("entry-number-{:06}", i), i as u32);
        }
        dir
    }

    #[test]
    fn first_match_wins() {
        let mut dir = Directory::new("root", 1);
        dir.add("a.txt", 3);
        dir.add("b.txt", 4);
        dir.add("a.txt", 5);
        assert_eq!(dir.find("a.txt"), Some(3));
        assert_eq!(dir.remove("a.txt"), Some(3));
        assert_eq!(dir.find("a.txt"), Some(5));
        assert_eq!(dir.remove("missing"), None);
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn small_directory_uses_one_block() {
        let (mut disk, mut bitmap) = setup();
        let mut dir = Directory::new("root", 1);
        dir.add("a.txt", 0);
        dir.add("b.txt", 2);

        let mut blocks = [0; DIRECT_PTRS];
        dir.store(&mut disk, &mut blocks, &mut bitmap).unwrap();
        assert_ne!(blocks[0], 0);
        assert_eq!(blocks[1..], [0, 0, 0]);

        assert_eq!(Directory::load(&disk, &blocks).unwrap(), dir);
    }

    #[test]
    fn large_directory_goes_through_indirect_block() {
        let (mut disk, mut bitmap) = setup();
        let dir = big_directory(150);

        let mut blocks = [0; DIRECT_PTRS];
        dir.store(&mut disk, &mut blocks, &mut bitmap).unwrap();
        assert!(blocks.iter().all(|&b| b != 0));

        let ptrs = read_pointer_block(&disk, blocks[INDIRECT_SLOT]).unwrap();
        assert_eq!(ptrs.len(), 2);
        // 3 个直接块 + 1 个间接块 + 2 个数据块
        assert_eq!(bitmap.used_blocks().len(), 6);
        assert_eq!(Directory::owned_blocks(&disk, &blocks).unwrap().len(), 6);

        let loaded = Directory::load(&disk, &blocks).unwrap();
        assert_eq!(loaded, dir);
        assert_eq!(loaded.entries[149].name, "entry-number-000149");
    }

    #[test]
    fn shrinking_keeps_blocks_but_clears_stale_bytes() {
        let (mut disk, mut bitmap) = setup();
        let mut blocks = [0; DIRECT_PTRS];
        big_directory(150)
            .store(&mut disk, &mut blocks, &mut bitmap)
            .unwrap();
        let ptrs = read_pointer_block(&disk, blocks[INDIRECT_SLOT]).unwrap();

        let small = big_directory(2);
        small.store(&mut disk, &mut blocks, &mut bitmap).unwrap();
        assert_eq!(Directory::load(&disk, &blocks).unwrap(), small);
        for block in ptrs {
            assert_eq!(disk.block(block), Some(&[0u8; BLOCK_SIZE]));
        }
    }

    #[test]
    fn too_large_directory_is_rejected_before_allocating() {
        let (mut disk, mut bitmap) = setup();
        let mut blocks = [0; DIRECT_PTRS];
        let err = big_directory(300)
            .store(&mut disk, &mut blocks, &mut bitmap)
            .unwrap_err();

        assert!(matches!(
            err,
            FileSystemError::DirectoryTooLarge { max, .. } if max == MAX_DIRECTORY_SIZE
        ));
        assert_eq!(blocks, [0; DIRECT_PTRS]);
        assert_eq!(bitmap.free_blocks(), 32);
    }

    #[test]
    fn growth_without_space_leaves_directory_intact() {
        let (mut disk, mut bitmap) = setup();
        let mut blocks = [0; DIRECT_PTRS];
        let before = big_directory(60);
        before.store(&mut disk, &mut blocks, &mut bitmap).unwrap();
        assert_eq!(owned_direct_blocks(&blocks).len(), 2);

        // 只留一个空闲块，而 150 项需要再加 1 个直接块、间接块和 2 个数据块
        while bitmap.free_blocks() > 1 {
            bitmap.alloc().unwrap();
        }
        let saved = blocks;
        let err = big_directory(150)
            .store(&mut disk, &mut blocks, &mut bitmap)
            .unwrap_err();

        assert!(matches!(err, FileSystemError::OutOfSpace));
        assert_eq!(blocks, saved);
        assert_eq!(bitmap.free_blocks(), 1);
        assert_eq!(Directory::load(&disk, &blocks).unwrap(), before);
    }

    #[test]
    fn reserve_writes_nothing_until_commit() {
        let (mut disk, mut bitmap) = setup();
        let mut blocks = [0; DIRECT_PTRS];
        let dir = big_directory(150);

        let encoded = dir.reserve(&disk, &mut blocks, &mut bitmap).unwrap();
        assert_eq!(bitmap.used_blocks().len(), 6);
        assert!(blocks
            .iter()
            .all(|&b| disk.block(b) == Some(&[0u8; BLOCK_SIZE])));

        encoded.commit(&mut disk, &blocks).unwrap();
        assert_eq!(Directory::load(&disk, &blocks).unwrap(), dir);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let (mut disk, mut bitmap) = setup();
        let block = bitmap.alloc().unwrap();
        disk.write_block(block, &[0xFF; BLOCK_SIZE]).unwrap();
        assert!(matches!(
            Directory::load(&disk, &[block, 0, 0, 0]),
            Err(FileSystemError::CorruptDirectory(_))
        ));
        assert!(matches!(
            Directory::load(&disk, &[0; DIRECT_PTRS]),
            Err(FileSystemError::CorruptDirectory(_))
        ));
    }
}
