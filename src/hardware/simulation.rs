//! Simulated ECU platform for bench testing an XCP slave without hardware

use crate::channel::{
    ChannelError, ChannelResult, DaqClock, FlashAccess, MemoryAccess, TransmitChannel,
};

/// In memory ECU.
///
/// RAM and flash are two separate regions, both addressed from 0. Reads outside
/// of RAM return 0xFF and writes outside of RAM are dropped, like an unmapped bus.
/// Flash starts out erased (0xFF). Every transmitted frame is recorded.
#[derive(Debug, Clone)]
pub struct SimulationPlatform {
    ram: Vec<u8>,
    flash: Vec<u8>,
    tx_log: Vec<(u32, Vec<u8>)>,
    erase_log: Vec<(u32, u32)>,
    clock: u32,
    fail_erase: bool,
    fail_write: bool,
    fail_transmit: bool,
}

impl SimulationPlatform {
    /// Creates a platform with `ram_size` bytes of zeroed RAM and `flash_size` bytes of erased flash
    pub fn new(ram_size: usize, flash_size: usize) -> Self {
        Self {
            ram: vec![0; ram_size],
            flash: vec![0xFF; flash_size],
            tx_log: Vec::new(),
            erase_log: Vec::new(),
            clock: 0,
            fail_erase: false,
            fail_write: false,
            fail_transmit: false,
        }
    }

    /// RAM content
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Copies `data` into RAM at `address`
    pub fn load_ram(&mut self, address: u32, data: &[u8]) {
        self.write_bytes(address, data);
    }

    /// Flash content
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Every frame transmitted so far as `(can id, payload)`
    pub fn transmitted(&self) -> &[(u32, Vec<u8>)] {
        &self.tx_log
    }

    /// Payload of the most recent frame
    pub fn last_transmitted(&self) -> Option<&[u8]> {
        self.tx_log.last().map(|(_, d)| d.as_slice())
    }

    /// Forgets all transmitted frames
    pub fn clear_transmitted(&mut self) {
        self.tx_log.clear();
    }

    /// Every successful erase as `(address, length)`
    pub fn erased(&self) -> &[(u32, u32)] {
        &self.erase_log
    }

    /// Sets the DAQ clock
    pub fn set_clock(&mut self, ticks: u32) {
        self.clock = ticks;
    }

    /// Makes every following flash erase fail
    pub fn set_fail_erase(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    /// Makes every following flash write fail
    pub fn set_fail_write(&mut self, fail: bool) {
        self.fail_write = fail;
    }

    /// Makes every following transmit fail with [ChannelError::BufferFull]
    pub fn set_fail_transmit(&mut self, fail: bool) {
        self.fail_transmit = fail;
    }

    fn flash_range(&self, address: u32, length: usize) -> Option<std::ops::Range<usize>> {
        let start = address as usize;
        let end = start.checked_add(length)?;
        (end <= self.flash.len()).then_some(start..end)
    }
}

impl Default for SimulationPlatform {
    fn default() -> Self {
        Self::new(0x10000, 0x10000)
    }
}

impl TransmitChannel for SimulationPlatform {
    fn transmit(&mut self, can_id: u32, data: &[u8]) -> ChannelResult<()> {
        if self.fail_transmit {
            return Err(ChannelError::BufferFull);
        }
        self.tx_log.push((can_id, data.to_vec()));
        Ok(())
    }
}

impl MemoryAccess for SimulationPlatform {
    fn read_byte(&mut self, address: u32) -> u8 {
        self.ram.get(address as usize).copied().unwrap_or(0xFF)
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        if let Some(b) = self.ram.get_mut(address as usize) {
            *b = value;
        }
    }
}

impl FlashAccess for SimulationPlatform {
    fn flash_erase(&mut self, address: u32, length: u32) -> ChannelResult<()> {
        let range = self
            .flash_range(address, length as usize)
            .filter(|_| !self.fail_erase)
            .ok_or(ChannelError::EraseFailed { address, length })?;
        self.flash[range].fill(0xFF);
        self.erase_log.push((address, length));
        Ok(())
    }

    fn flash_write(&mut self, address: u32, data: &[u8]) -> ChannelResult<()> {
        let range = self
            .flash_range(address, data.len())
            .filter(|_| !self.fail_write)
            .ok_or(ChannelError::WriteFailed {
                address,
                length: data.len() as u32,
            })?;
        self.flash[range].copy_from_slice(data);
        Ok(())
    }

    fn flash_verify(&mut self, address: u32, data: &[u8]) -> ChannelResult<bool> {
        let range = self
            .flash_range(address, data.len())
            .ok_or(ChannelError::VerifyFailed { address })?;
        Ok(&self.flash[range] == data)
    }
}

impl DaqClock for SimulationPlatform {
    fn now(&self) -> u32 {
        self.clock
    }
}
