pub mod block_device;
pub mod memory_disk;
pub mod types;

pub use block_device::BlockDevice;
pub use memory_disk::MemoryDisk;
pub use types::{Block, BLOCK_SIZE};
