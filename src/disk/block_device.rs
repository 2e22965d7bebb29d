use std::io::Result;

use crate::disk::types::{Block, BLOCK_SIZE};

pub trait BlockDevice {
    /// Number of addressable blocks on the device.
    fn block_count(&self) -> u64;

    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()>;
    fn write_block(&mut self, block_id: u64, buf: &Block) -> Result<()>;

    fn zero_block(&mut self, block_id: u64) -> Result<()> {
        self.write_block(block_id, &[0; BLOCK_SIZE])
    }
}
