use thiserror::Error;

/// 文件系统错误类型
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("Disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    // 解码失败，无法部分恢复
    #[error("Superblock corrupted: {0}")]
    CorruptSuperblock(String),
    #[error("Inode table corrupted: {0}")]
    CorruptInodeTable(String),
    #[error("Directory corrupted: {0}")]
    CorruptDirectory(String),
    #[error("File content corrupted: {0}")]
    CorruptFile(String),

    // 资源耗尽
    #[error("Disk space is full")]
    OutOfSpace,
    #[error("No free inode available")]
    NoFreeInodes,

    // 查找失败
    #[error("Directory not found: inode {0}")]
    DirectoryNotFound(u32),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Inode not found: {0}")]
    InodeNotFound(u32),
    #[error("Invalid inode: {0}")]
    InvalidInode(u32),
    #[error("Invalid block: {0}")]
    InvalidBlock(u64),

    // 超出容量，从不静默截断
    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },
    #[error("Directory too large: {size} bytes (max {max})")]
    DirectoryTooLarge { size: usize, max: usize },
    #[error("Filename too long: {0}")]
    FilenameTooLong(String),
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FileSystemError>;
