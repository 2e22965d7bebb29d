use crate::{
    disk::BlockDevice,
    fs::{
        config::MAX_FILENAME_LEN,
        directory::{DirEntry, Directory},
        error::{FileSystemError, Result},
        file::FileContent,
        inode_table::Inode,
        FileSystem, FsState,
    },
};

/// `stat` 返回的文件信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub inode_number: u32,
    pub size: usize,
    pub blocks: usize,
    pub is_directory: bool,
    pub created_at: i64,
    pub modified_at: i64,
}

fn check_filename(filename: &str) -> Result<()> {
    if filename.is_empty() || filename.contains('/') {
        return Err(FileSystemError::InvalidFilename(filename.to_string()));
    }
    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(FileSystemError::FilenameTooLong(filename.to_string()));
    }
    Ok(())
}

impl<D: BlockDevice> FileSystem<D> {
    /// 打开文件，不存在时在父目录中创建，返回 (inode 编号, 是否新建)
    pub fn open(&mut self, filename: &str, parent: u32) -> Result<(u32, bool)> {
        let mut state = self.load_state()?;
        let (parent_inode, mut dir) = self.parent_directory(&state, parent)?;

        if let Some(inode_number) = dir.find(filename) {
            return Ok((inode_number, false));
        }
        check_filename(filename)?;

        let inode_number = state
            .inode_table
            .alloc_inode(&mut state.inode_bitmap, false)?;
        let file_block = state.data_bitmap.alloc()?;
        state.inode_table.find_mut(inode_number)?.direct_blocks[0] = file_block;

        // 先预留目录增长所需的块，空间不足时磁盘上什么都没写
        dir.add(filename, inode_number);
        let mut parent_blocks = parent_inode.direct_blocks;
        let encoded = dir.reserve(&self.disk, &mut parent_blocks, &mut state.data_bitmap)?;
        let parent_inode = state.inode_table.find_mut(parent)?;
        parent_inode.direct_blocks = parent_blocks;
        parent_inode.touch();

        // 落盘顺序：inode 位图、数据块位图、文件与目录、inode 表
        state.inode_bitmap.sync(&mut self.disk)?;
        state.data_bitmap.sync(&mut self.disk)?;
        let inode = state.inode_table.find_mut(inode_number)?;
        FileContent::new(filename, inode_number).store(
            &mut self.disk,
            inode,
            &mut state.data_bitmap,
        )?;
        encoded.commit(&mut self.disk, &parent_blocks)?;
        state.inode_table.sync(&mut self.disk)?;

        log::info!("[inode #{}] created '{}'", inode_number, filename);
        Ok((inode_number, true))
    }

    pub fn read(&self, filename: &str, parent: u32) -> Result<Vec<u8>> {
        let state = self.load_state()?;
        let inode = self.resolve(&state, filename, parent)?;
        let content = FileContent::load(&self.disk, inode)?;
        log::debug!(
            "[inode #{}] read {} bytes",
            inode.inode_number,
            content.payload.len()
        );
        Ok(content.payload)
    }

    /// 用 `content` 整体替换文件内容
    pub fn write(&mut self, filename: &str, parent: u32, content: &[u8]) -> Result<()> {
        self.update_payload(filename, parent, |payload| {
            payload.clear();
            payload.extend_from_slice(content);
        })
    }

    pub fn append(&mut self, filename: &str, parent: u32, content: &[u8]) -> Result<()> {
        self.update_payload(filename, parent, |payload| {
            payload.extend_from_slice(content)
        })
    }

    /// 删除目录项，清零并释放文件的所有数据块，回收 inode
    pub fn unlink(&mut self, filename: &str, parent: u32) -> Result<()> {
        let mut state = self.load_state()?;
        let (parent_inode, mut dir) = self.parent_directory(&state, parent)?;
        let inode_number = dir
            .remove(filename)
            .ok_or_else(|| FileSystemError::FileNotFound(filename.to_string()))?;

        let blocks: Vec<u64> = state.inode_table.find(inode_number)?.blocks().collect();
        for &block in &blocks {
            state.data_bitmap.free(&mut self.disk, block)?;
        }
        state
            .inode_table
            .free_inode(&mut state.inode_bitmap, inode_number)?;

        let mut parent_blocks = parent_inode.direct_blocks;
        dir.store(&mut self.disk, &mut parent_blocks, &mut state.data_bitmap)?;
        let parent_inode = state.inode_table.find_mut(parent)?;
        parent_inode.direct_blocks = parent_blocks;
        parent_inode.touch();

        state.inode_table.sync(&mut self.disk)?;
        state.inode_bitmap.sync(&mut self.disk)?;
        state.data_bitmap.sync(&mut self.disk)?;

        log::info!(
            "[inode #{}] unlinked '{}', released {} blocks",
            inode_number,
            filename,
            blocks.len()
        );
        Ok(())
    }

    /// 按插入顺序列出目录项
    pub fn list(&self, parent: u32) -> Result<Vec<DirEntry>> {
        let state = self.load_state()?;
        let (_, dir) = self.parent_directory(&state, parent)?;
        Ok(dir.entries)
    }

    pub fn stat(&self, filename: &str, parent: u32) -> Result<FileStat> {
        let state = self.load_state()?;
        let inode = self.resolve(&state, filename, parent)?;
        let content = FileContent::load(&self.disk, inode)?;
        Ok(FileStat {
            name: filename.to_string(),
            inode_number: inode.inode_number,
            size: content.payload.len(),
            blocks: inode.block_count(),
            is_directory: inode.is_directory(),
            created_at: inode.created_at,
            modified_at: inode.modified_at,
        })
    }

    fn update_payload<F>(&mut self, filename: &str, parent: u32, update: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<u8>),
    {
        let mut state = self.load_state()?;
        let inode_number = self.resolve(&state, filename, parent)?.inode_number;

        let inode = state.inode_table.find_mut(inode_number)?;
        let mut content = FileContent::load(&self.disk, inode)?;
        update(&mut content.payload);
        content.store(&mut self.disk, inode, &mut state.data_bitmap)?;
        inode.touch();

        state.inode_table.sync(&mut self.disk)?;
        log::debug!(
            "[inode #{}] wrote {} bytes",
            inode_number,
            content.payload.len()
        );
        Ok(())
    }

    /// 取出父目录的 inode 和目录内容；父 inode 不是有效目录时报 DirectoryNotFound
    fn parent_directory(&self, state: &FsState, parent: u32) -> Result<(Inode, Directory)> {
        let inode = state
            .inode_table
            .find(parent)
            .map_err(|_| FileSystemError::DirectoryNotFound(parent))?;
        if !inode.is_valid() || !inode.is_directory() || inode.direct_blocks[0] == 0 {
            return Err(FileSystemError::DirectoryNotFound(parent));
        }
        let dir = Directory::load(&self.disk, &inode.direct_blocks)?;
        Ok((inode.clone(), dir))
    }

    /// 在父目录中按名字查找文件 inode
    fn resolve<'s>(&self, state: &'s FsState, filename: &str, parent: u32) -> Result<&'s Inode> {
        let (_, dir) = self.parent_directory(state, parent)?;
        let inode_number = dir
            .find(filename)
            .ok_or_else(|| FileSystemError::FileNotFound(filename.to_string()))?;
        let inode = state.inode_table.find(inode_number)?;
        if !inode.is_valid() {
            return Err(FileSystemError::InvalidInode(inode_number));
        }
        Ok(inode)
    }
}
