pub mod disk;
pub mod fs;
pub mod utils;

pub use disk::{BlockDevice, MemoryDisk};
pub use fs::{
    config::{FsConfig, ROOT_INODE},
    error::{FileSystemError, Result},
    FileSystem,
};
