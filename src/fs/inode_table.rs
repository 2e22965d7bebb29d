use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{Block, BlockDevice, BLOCK_SIZE},
    fs::{
        config::DIRECT_PTRS,
        error::{FileSystemError, Result},
        inode_bitmap::InodeBitmap,
        super_block::SuperBlock,
    },
    utils::current_timestamp,
};

// inode 表首块前 8 字节存放序列化长度（小端序）
const LEN_PREFIX: usize = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct InodeFlags: u8 {
        const VALID = 0b0000_0001;
        const DIRECTORY = 0b0000_0010;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub flags: InodeFlags,
    // 直接块指针，存放磁盘绝对块号，0 表示未使用
    pub direct_blocks: [u64; DIRECT_PTRS],
    pub created_at: i64,
    pub modified_at: i64,
    pub inode_number: u32,
}

impl Inode {
    pub fn empty(inode_number: u32) -> Self {
        Self {
            flags: InodeFlags::empty(),
            direct_blocks: [0; DIRECT_PTRS],
            created_at: 0,
            modified_at: 0,
            inode_number,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(InodeFlags::VALID)
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(InodeFlags::DIRECTORY)
    }

    /// 已分配的直接块，按槽位顺序
    pub fn blocks(&self) -> impl Iterator<Item = u64> + '_ {
        self.direct_blocks.iter().copied().take_while(|&b| b != 0)
    }

    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    // 更新修改时间
    pub fn touch(&mut self) {
        self.modified_at = current_timestamp();
    }

    fn activate(&mut self, is_directory: bool) {
        let now = current_timestamp();
        self.flags = if is_directory {
            InodeFlags::VALID | InodeFlags::DIRECTORY
        } else {
            InodeFlags::VALID
        };
        self.direct_blocks = [0; DIRECT_PTRS];
        self.created_at = now;
        self.modified_at = now;
    }
}

/// 定长 inode 数组，序列化后连续存放在 `inode_table_start` 开始的块中。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeTable {
    pub inodes: Vec<Inode>,
    pub start_block: u64,
    /// 预留给 inode 表的块数
    pub capacity_blocks: u64,
    /// 最近一次写入实际占用的块数
    pub span_blocks: u64,
}

impl InodeTable {
    pub fn new(super_block: &SuperBlock) -> Self {
        Self {
            inodes: (0..super_block.total_inodes).map(Inode::empty).collect(),
            start_block: super_block.inode_table_start,
            capacity_blocks: super_block.inode_table_blocks,
            span_blocks: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.iter()
    }

    pub fn find(&self, inode_number: u32) -> Result<&Inode> {
        self.inodes
            .iter()
            .find(|inode| inode.inode_number == inode_number)
            .ok_or(FileSystemError::InodeNotFound(inode_number))
    }

    pub fn find_mut(&mut self, inode_number: u32) -> Result<&mut Inode> {
        self.inodes
            .iter_mut()
            .find(|inode| inode.inode_number == inode_number)
            .ok_or(FileSystemError::InodeNotFound(inode_number))
    }

    /// 从位图取一个空闲槽位并标记为有效。
    ///
    /// 调用方负责随后分配首个数据块，并持久化位图和 inode 表。
    pub fn alloc_inode(
        &mut self,
        inode_bitmap: &mut InodeBitmap,
        is_directory: bool,
    ) -> Result<u32> {
        let inode_number = inode_bitmap.alloc()?;
        match self.find_mut(inode_number) {
            Ok(inode) => {
                inode.activate(is_directory);
                Ok(inode_number)
            }
            Err(e) => {
                inode_bitmap.free(inode_number)?;
                Err(e)
            }
        }
    }

    /// 保留一个固定编号的 inode（格式化时用于根目录）
    pub fn reserve_inode(
        &mut self,
        inode_bitmap: &mut InodeBitmap,
        inode_number: u32,
        is_directory: bool,
    ) -> Result<()> {
        let inode = self.find_mut(inode_number)?;
        inode.activate(is_directory);
        inode_bitmap.mark_used(inode_number)
    }

    /// 把 inode 重置为无效并清除位图中的对应位，不处理数据块
    pub fn free_inode(
        &mut self,
        inode_bitmap: &mut InodeBitmap,
        inode_number: u32,
    ) -> Result<()> {
        let inode = self.find_mut(inode_number)?;
        *inode = Inode::empty(inode_number);
        inode_bitmap.free(inode_number)
    }

    pub fn sync<D: BlockDevice>(&mut self, disk: &mut D) -> Result<()> {
        // 1. 序列化
        let bytes = bincode::serialize(&self.inodes)
            .map_err(|e| FileSystemError::CorruptInodeTable(e.to_string()))?;
        let total_blocks = (bytes.len() + LEN_PREFIX).div_ceil(BLOCK_SIZE) as u64;
        if total_blocks > self.capacity_blocks {
            return Err(FileSystemError::CorruptInodeTable(format!(
                "{} bytes do not fit in {} reserved blocks",
                bytes.len(),
                self.capacity_blocks
            )));
        }

        // 2. 长度写在第一个块的前 8 字节，后面紧跟序列化数据
        let mut stream = Vec::with_capacity(total_blocks as usize * BLOCK_SIZE);
        stream.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        stream.extend_from_slice(&bytes);

        for (i, chunk) in stream.chunks(BLOCK_SIZE).enumerate() {
            let mut block_buf: Block = [0; BLOCK_SIZE];
            block_buf[..chunk.len()].copy_from_slice(chunk);
            disk.write_block(self.start_block + i as u64, &block_buf)?;
        }

        // 上一次写得更长时，把多出来的块清零
        for i in total_blocks..self.span_blocks {
            disk.zero_block(self.start_block + i)?;
        }
        self.span_blocks = total_blocks;
        Ok(())
    }

    pub fn load<D: BlockDevice>(disk: &D, super_block: &SuperBlock) -> Result<Self> {
        let start_block = super_block.inode_table_start;
        let capacity_blocks = super_block.inode_table_blocks;

        // 先读第一个块，取得序列化长度
        let mut block_buf: Block = [0; BLOCK_SIZE];
        disk.read_block(start_block, &mut block_buf)?;
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&block_buf[..LEN_PREFIX]);
        let serialized_len = u64::from_le_bytes(len_bytes) as usize;

        let capacity = capacity_blocks as usize * BLOCK_SIZE - LEN_PREFIX;
        if serialized_len == 0 || serialized_len > capacity {
            return Err(FileSystemError::CorruptInodeTable(format!(
                "recorded length {} outside 1..={}",
                serialized_len, capacity
            )));
        }
        let span_blocks = (serialized_len + LEN_PREFIX).div_ceil(BLOCK_SIZE) as u64;

        let mut stream = Vec::with_capacity(span_blocks as usize * BLOCK_SIZE);
        stream.extend_from_slice(&block_buf);
        for i in 1..span_blocks {
            disk.read_block(start_block + i, &mut block_buf)?;
            stream.extend_from_slice(&block_buf);
        }

        let inodes: Vec<Inode> =
            bincode::deserialize(&stream[LEN_PREFIX..LEN_PREFIX + serialized_len])
                .map_err(|e| FileSystemError::CorruptInodeTable(e.to_string()))?;

        if inodes.len() != super_block.total_inodes as usize {
            return Err(FileSystemError::CorruptInodeTable(format!(
                "expected {} inodes, found {}",
                super_block.total_inodes,
                inodes.len()
            )));
        }
        if let Some((index, inode)) = inodes
            .iter()
            .enumerate()
            .find(|(index, inode)| inode.inode_number as usize != *index)
        {
            return Err(FileSystemError::CorruptInodeTable(format!(
                "slot {} holds inode {}",
                index, inode.inode_number
            )));
        }

        Ok(Self {
            inodes,
            start_block,
            capacity_blocks,
            span_blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{disk::MemoryDisk, fs::config::FsConfig};

    fn setup() -> (SuperBlock, MemoryDisk) {
        let sb = SuperBlock::new(&FsConfig::default(), String::new());
        let disk = MemoryDisk::new(sb.total_blocks);
        (sb, disk)
    }

    #[test]
    fn new_table_is_all_invalid() {
        let (sb, _) = setup();
        let table = InodeTable::new(&sb);
        assert_eq!(table.len(), 120);
        for (i, inode) in table.iter().enumerate() {
            assert_eq!(inode.inode_number as usize, i);
            assert!(!inode.is_valid());
            assert_eq!(inode.direct_blocks, [0; DIRECT_PTRS]);
        }
    }

    #[test]
    fn alloc_marks_valid_and_stamps_times() {
        let (sb, _) = setup();
        let mut table = InodeTable::new(&sb);
        let mut bitmap = InodeBitmap::new(&sb);
        bitmap.mark_used(1).unwrap();

        let n = table.alloc_inode(&mut bitmap, false).unwrap();
        assert_eq!(n, 0);
        let inode = table.find(n).unwrap();
        assert!(inode.is_valid());
        assert!(!inode.is_directory());
        assert!(inode.created_at > 0);
        assert_eq!(inode.created_at, inode.modified_at);

        let d = table.alloc_inode(&mut bitmap, true).unwrap();
        assert_eq!(d, 2);
        assert!(table.find(d).unwrap().is_directory());
    }

    #[test]
    fn free_resets_inode_and_bitmap() {
        let (sb, _) = setup();
        let mut table = InodeTable::new(&sb);
        let mut bitmap = InodeBitmap::new(&sb);
        let n = table.alloc_inode(&mut bitmap, false).unwrap();
        table.find_mut(n).unwrap().direct_blocks[0] = 42;

        table.free_inode(&mut bitmap, n).unwrap();
        assert_eq!(table.find(n).unwrap(), &Inode::empty(n));
        assert!(!bitmap.is_used(n));
    }

    #[test]
    fn reserve_marks_fixed_slot() {
        let (sb, _) = setup();
        let mut table = InodeTable::new(&sb);
        let mut bitmap = InodeBitmap::new(&sb);
        table.reserve_inode(&mut bitmap, 1, true).unwrap();
        assert!(bitmap.is_used(1));
        assert!(table.find(1).unwrap().is_directory());
        assert_eq!(table.alloc_inode(&mut bitmap, false).unwrap(), 0);
        assert_eq!(table.alloc_inode(&mut bitmap, false).unwrap(), 2);
    }

    #[test]
    fn find_unknown_inode() {
        let (sb, _) = setup();
        let table = InodeTable::new(&sb);
        assert!(matches!(
            table.find(500),
            Err(FileSystemError::InodeNotFound(500))
        ));
    }

    #[test]
    fn blocks_stop_at_first_unset_slot() {
        let mut inode = Inode::empty(3);
        inode.direct_blocks = [20, 21, 0, 0];
        assert_eq!(inode.blocks().collect::<Vec<_>>(), vec![20, 21]);
        assert_eq!(inode.block_count(), 2);
    }

    #[test]
    fn sync_and_load() {
        let (sb, mut disk) = setup();
        let mut table = InodeTable::new(&sb);
        let mut bitmap = InodeBitmap::new(&sb);
        let n = table.alloc_inode(&mut bitmap, true).unwrap();
        table.find_mut(n).unwrap().direct_blocks = [11, 12, 0, 13];

        table.sync(&mut disk).unwrap();
        assert!(table.span_blocks > 0 && table.span_blocks <= sb.inode_table_blocks);

        let loaded = InodeTable::load(&disk, &sb).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn load_rejects_garbage() {
        let (sb, mut disk) = setup();
        assert!(matches!(
            InodeTable::load(&disk, &sb),
            Err(FileSystemError::CorruptInodeTable(_))
        ));

        let mut block = [0u8; BLOCK_SIZE];
        block[..8].copy_from_slice(&(u64::MAX).to_le_bytes());
        disk.write_block(sb.inode_table_start, &block).unwrap();
        assert!(matches!(
            InodeTable::load(&disk, &sb),
            Err(FileSystemError::CorruptInodeTable(_))
        ));
    }
}
