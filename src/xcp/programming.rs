//! Flash programming sequencer
//!
//! Reflashing has to follow `PROGRAM_START -> PROGRAM_CLEAR -> PROGRAM... -> PROGRAM(0)`.
//! The sequencer does not own an address register. The write cursor is the MTA, handed in
//! by the caller, and every successful write reports how far the MTA has to advance.

use strum_macros::Display;

use crate::{
    XcpError, XcpResult,
    channel::{FlashAccess, MemoryAccess},
};

/// PGM_PROPERTIES reported by GET_PGM_PROCESSOR_INFO (absolute and functional mode)
pub const PGM_PROPERTIES: u8 = 0x07;
/// COMM_MODE_PGM reported by PROGRAM_START (master block mode)
pub const COMM_MODE_PGM: u8 = 0x01;

/// State of the programming session
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum ProgrammingState {
    /// No programming session
    Idle,
    /// PROGRAM_START accepted
    Started,
    /// Flash range erased
    Cleared,
    /// At least one block written
    Programming,
}

/// Layout of one flash sector
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectorInfo {
    /// Start address
    pub address: u32,
    /// Length in bytes
    pub length: u32,
    /// Sector number
    pub number: u8,
    /// Order in which the sector is cleared
    pub clear_sequence: u8,
    /// Order in which the sector is programmed
    pub program_sequence: u8,
    /// Programming method
    pub method: u8,
}

/// Two 16KiB sectors at the start of STM32 flash
pub fn default_sectors() -> Vec<SectorInfo> {
    vec![
        SectorInfo {
            address: 0x0800_0000,
            length: 0x4000,
            number: 0,
            clear_sequence: 0,
            program_sequence: 0,
            method: 0,
        },
        SectorInfo {
            address: 0x0800_4000,
            length: 0x4000,
            number: 1,
            clear_sequence: 1,
            program_sequence: 1,
            method: 0,
        },
    ]
}

/// Runs the programming state machine
#[derive(Debug, Clone)]
pub struct ProgrammingSequencer {
    state: ProgrammingState,
    sectors: Vec<SectorInfo>,
    active_sectors: usize,
    max_block: u8,
    verify_after_write: bool,
}

impl ProgrammingSequencer {
    /// Creates an idle sequencer.
    ///
    /// ## Parameters
    /// * sectors - Sector table reported while a session is active
    /// * max_block - Bytes per PROGRAM block, also the PROGRAM_MAX length
    /// * verify_after_write - Read back every block through [FlashAccess::flash_verify]
    pub fn new(sectors: Vec<SectorInfo>, max_block: u8, verify_after_write: bool) -> Self {
        Self {
            state: ProgrammingState::Idle,
            sectors,
            active_sectors: 0,
            max_block,
            verify_after_write,
        }
    }

    /// Current state
    pub fn state(&self) -> ProgrammingState {
        self.state
    }

    /// Number of sectors reported to the master, 0 outside a session
    pub fn active_sector_count(&self) -> usize {
        self.active_sectors
    }

    /// PROGRAM block size
    pub fn max_block_size(&self) -> u8 {
        self.max_block
    }

    /// Drops any session
    pub fn reset(&mut self) {
        if self.state != ProgrammingState::Idle {
            log::debug!("Programming session in state {} discarded", self.state);
        }
        self.state = ProgrammingState::Idle;
        self.active_sectors = 0;
    }

    /// PROGRAM_START
    pub fn start(&mut self) -> XcpResult<[u8; 7]> {
        if self.state != ProgrammingState::Idle {
            log::warn!("PROGRAM_START rejected, session already {}", self.state);
            return Err(XcpError::ProgrammingActive);
        }
        self.state = ProgrammingState::Started;
        self.active_sectors = self.sectors.len();
        log::debug!("Programming session started");
        Ok([0x00, COMM_MODE_PGM, self.max_block, 0x00, 0x01, 0x00, 0x00])
    }

    /// GET_PGM_PROCESSOR_INFO
    pub fn processor_info(&self) -> XcpResult<[u8; 7]> {
        if self.state == ProgrammingState::Idle {
            return Err(XcpError::Sequence);
        }
        Ok([PGM_PROPERTIES, self.active_sectors as u8, 0, 0, 0, 0, 0])
    }

    /// GET_SECTOR_INFO. Mode 0 reports sequence numbers and length, mode 1 the start address
    pub fn sector_info(&self, mode: u8, sector: u8) -> XcpResult<[u8; 7]> {
        let s = self.sectors[..self.active_sectors]
            .get(sector as usize)
            .ok_or(XcpError::OutOfRange)?;
        match mode {
            0 => {
                let l = s.length.to_be_bytes();
                Ok([s.clear_sequence, s.program_sequence, s.method, l[0], l[1], l[2], l[3]])
            }
            1 => {
                let a = s.address.to_be_bytes();
                Ok([0, 0, 0, a[0], a[1], a[2], a[3]])
            }
            _ => Err(XcpError::ModeNotValid),
        }
    }

    /// PROGRAM_CLEAR, erases `length` bytes at `address`
    pub fn clear<F: FlashAccess + ?Sized>(
        &mut self,
        flash: &mut F,
        address: u32,
        length: u32,
    ) -> XcpResult<()> {
        if self.state != ProgrammingState::Started {
            log::warn!("PROGRAM_CLEAR rejected in state {}", self.state);
            return Err(XcpError::Sequence);
        }
        if let Err(e) = flash.flash_erase(address, length) {
            log::error!("Erase of {length} bytes at 0x{address:08X} failed: {e}");
            return Err(e.into());
        }
        self.state = ProgrammingState::Cleared;
        log::debug!("Erased {length} bytes at 0x{address:08X}");
        Ok(())
    }

    /// Checks that a PROGRAM of `size` bytes is acceptable right now
    pub fn check_program(&self, size: usize) -> XcpResult<()> {
        if !matches!(
            self.state,
            ProgrammingState::Cleared | ProgrammingState::Programming
        ) {
            log::warn!("PROGRAM rejected in state {}", self.state);
            return Err(XcpError::Sequence);
        }
        if size > self.max_block as usize {
            return Err(XcpError::OutOfRange);
        }
        Ok(())
    }

    /// PROGRAM / PROGRAM_NEXT. Writes `data` at `cursor`, an empty block ends the session.
    ///
    /// ## Returns
    /// Number of bytes the cursor has to advance
    pub fn program<F: FlashAccess + ?Sized>(
        &mut self,
        flash: &mut F,
        cursor: u32,
        data: &[u8],
    ) -> XcpResult<usize> {
        self.check_program(data.len())?;
        if data.is_empty() {
            log::debug!("Programming finished");
            self.reset();
            return Ok(0);
        }
        self.write_block(flash, cursor, data)
    }

    /// PROGRAM_MAX. `data` has to be exactly one full block
    pub fn program_max<F: FlashAccess + ?Sized>(
        &mut self,
        flash: &mut F,
        cursor: u32,
        data: &[u8],
    ) -> XcpResult<usize> {
        self.check_program(data.len())?;
        if data.len() != self.max_block as usize {
            return Err(XcpError::CommandSyntax);
        }
        self.write_block(flash, cursor, data)
    }

    fn write_block<F: FlashAccess + ?Sized>(
        &mut self,
        flash: &mut F,
        cursor: u32,
        data: &[u8],
    ) -> XcpResult<usize> {
        if let Err(e) = flash.flash_write(cursor, data) {
            log::error!("Flash write at 0x{cursor:08X} failed: {e}");
            return Err(e.into());
        }
        if self.verify_after_write {
            match flash.flash_verify(cursor, data) {
                Ok(true) => {}
                Ok(false) => {
                    log::error!("Flash read back at 0x{cursor:08X} does not match");
                    return Err(XcpError::Verify);
                }
                Err(e) => {
                    log::error!("Flash verify at 0x{cursor:08X} failed: {e}");
                    return Err(e.into());
                }
            }
        }
        self.state = ProgrammingState::Programming;
        Ok(data.len())
    }

    /// PROGRAM_RESET
    pub fn program_reset(&mut self) {
        log::debug!("PROGRAM_RESET");
        self.reset();
    }

    /// PROGRAM_PREPARE. Accepted in any state
    pub fn prepare(&self, code_size: u16) {
        log::debug!("PROGRAM_PREPARE, code size {code_size}");
    }

    /// PROGRAM_FORMAT. Only plain, unencrypted data is supported
    pub fn format(&self, compression: u8, encryption: u8) -> XcpResult<()> {
        if compression != 0 || encryption != 0 {
            log::warn!("PROGRAM_FORMAT compression {compression} encryption {encryption} not supported");
            return Err(XcpError::ModeNotValid);
        }
        Ok(())
    }

    /// PROGRAM_VERIFY. Mode 0 requests the internal check, mode 1 compares `expected`
    /// with the big endian word at `address`
    pub fn verify<M: MemoryAccess + ?Sized>(
        &self,
        memory: &mut M,
        address: u32,
        mode: u8,
        expected: u32,
    ) -> XcpResult<()> {
        match mode {
            0 => Ok(()),
            1 => {
                let mut actual = [0u8; 4];
                memory.read_bytes(address, &mut actual);
                let actual = u32::from_be_bytes(actual);
                if actual == expected {
                    Ok(())
                } else {
                    log::warn!(
                        "PROGRAM_VERIFY at 0x{address:08X}, expected 0x{expected:08X} got 0x{actual:08X}"
                    );
                    Err(XcpError::Verify)
                }
            }
            _ => Err(XcpError::ModeNotValid),
        }
    }
}

impl Default for ProgrammingSequencer {
    fn default() -> Self {
        Self::new(default_sectors(), 6, false)
    }
}
