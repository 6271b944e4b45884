//! Memory Transfer Address (MTA) register and the UPLOAD / DOWNLOAD family

use crate::{XcpError, XcpResult, channel::MemoryAccess};

/// Owns the MTA register and moves data between ECU memory and the master
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryTransferUnit {
    mta: u32,
    max_cto: usize,
}

impl MemoryTransferUnit {
    /// Creates a transfer unit for a link with `max_cto` byte command frames
    pub fn new(max_cto: u8) -> Self {
        Self {
            mta: 0,
            max_cto: max_cto as usize,
        }
    }

    /// Clears the MTA register
    pub fn reset(&mut self) {
        self.mta = 0;
    }

    /// Current MTA
    pub fn mta(&self) -> u32 {
        self.mta
    }

    /// SET_MTA
    pub fn set_mta(&mut self, address: u32) {
        log::debug!("MTA set to 0x{address:08X}");
        self.mta = address;
    }

    /// Moves the MTA forward by `count` bytes, wrapping at the end of the address space
    pub fn advance(&mut self, count: usize) {
        self.mta = self.mta.wrapping_add(count as u32);
    }

    /// Largest UPLOAD that fits into one response
    pub fn max_upload(&self) -> usize {
        self.max_cto.saturating_sub(1)
    }

    /// Largest DOWNLOAD that fits into one command
    pub fn max_download(&self) -> usize {
        self.max_cto.saturating_sub(2)
    }

    /// UPLOAD, reads `count` bytes at the MTA and advances it
    pub fn upload<M: MemoryAccess + ?Sized>(
        &mut self,
        memory: &mut M,
        count: usize,
    ) -> XcpResult<Vec<u8>> {
        let data = self.short_upload(memory, count, self.mta)?;
        self.advance(count);
        Ok(data)
    }

    /// SHORT_UPLOAD, reads `count` bytes at `address`. The MTA is left untouched
    pub fn short_upload<M: MemoryAccess + ?Sized>(
        &self,
        memory: &mut M,
        count: usize,
        address: u32,
    ) -> XcpResult<Vec<u8>> {
        if count > self.max_upload() {
            return Err(XcpError::OutOfRange);
        }
        let mut data = vec![0; count];
        memory.read_bytes(address, &mut data);
        Ok(data)
    }

    /// DOWNLOAD, writes `data` at the MTA and advances it
    pub fn download<M: MemoryAccess + ?Sized>(
        &mut self,
        memory: &mut M,
        data: &[u8],
    ) -> XcpResult<()> {
        if data.len() > self.max_download() {
            return Err(XcpError::OutOfRange);
        }
        memory.write_bytes(self.mta, data);
        self.advance(data.len());
        Ok(())
    }
}
