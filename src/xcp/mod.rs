//! Module for the XCP slave (ASAM MCD-1 XCP on CAN)
//!
//! [XcpSlave] owns one instance of every protocol component and routes each inbound
//! command frame to them:
//! * [MemoryTransferUnit] - MTA register, UPLOAD and DOWNLOAD
//! * [ProgrammingSequencer] - Flash programming state machine
//! * [DaqListManager] - DAQ list allocation and sampling
//! * [SecurityGatekeeper] - Seed and key locks of the CAL_PAG, DAQ and PGM resources
//!
//! Every command produces exactly one response frame. Failures never escape as panics,
//! they are turned into a negative response carrying the matching [ErrorCode].

mod daq;
mod error;
mod frame;
mod memory;
mod programming;
mod security;

pub use daq::*;
pub use error::*;
pub use frame::*;
pub use memory::*;
pub use programming::*;
pub use security::*;

use crate::{
    XcpError, XcpResult,
    channel::{ChannelResult, XcpPlatform},
};

/// XCP command codes.
///
/// Note. Only the commands this slave implements are listed, anything else
/// decodes as [XcpCommand::Other] and is answered with ERR_CMD_UNKNOWN
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum XcpCommand {
    /// Opens a session
    Connect,
    /// Closes the session
    Disconnect,
    /// Reads the session and protection status
    GetStatus,
    /// Resynchronises the command processor
    Synch,
    /// Reads the optional communication modes
    GetCommModeInfo,
    /// Reads slave identification
    GetId,
    /// Requests a seed for a protected resource
    GetSeed,
    /// Sends the key for the last seed
    Unlock,
    /// Sets the Memory Transfer Address
    SetMta,
    /// Reads memory at the MTA
    Upload,
    /// Reads memory at an explicit address
    ShortUpload,
    /// Writes memory at the MTA
    Download,
    /// Writes memory at an explicit address
    ShortDownload,
    /// Positions the DAQ pointer
    SetDaqPtr,
    /// Writes the ODT entry at the DAQ pointer
    WriteDaq,
    /// Binds a DAQ list to an event channel
    SetDaqListMode,
    /// Starts, stops or selects a DAQ list
    StartStopDaqList,
    /// Starts or stops the selected DAQ lists together
    StartStopSynch,
    /// Reads the DAQ clock
    GetDaqClock,
    /// Reads the DAQ processor capabilities
    GetDaqProcessorInfo,
    /// Reads the DAQ resolution
    GetDaqResolutionInfo,
    /// Reads information about a DAQ list
    GetDaqListInfo,
    /// Reads information about an event channel
    GetDaqEventInfo,
    /// Releases all DAQ lists
    FreeDaq,
    /// Allocates DAQ lists
    AllocDaq,
    /// Allocates ODTs in a DAQ list
    AllocOdt,
    /// Allocates entries in an ODT
    AllocOdtEntry,
    /// Opens a programming session
    ProgramStart,
    /// Erases flash
    ProgramClear,
    /// Programs a block
    Program,
    /// Ends the programming session
    ProgramReset,
    /// Reads programming capabilities
    GetPgmProcessorInfo,
    /// Reads a sector descriptor
    GetSectorInfo,
    /// Prepares non volatile memory programming
    ProgramPrepare,
    /// Sets the data format of the following blocks
    ProgramFormat,
    /// Programs a further block
    ProgramNext,
    /// Programs a full block
    ProgramMax,
    /// Verifies programmed memory
    ProgramVerify,
    /// Command code this slave does not implement
    Other(u8),
}

impl From<u8> for XcpCommand {
    fn from(cmd: u8) -> Self {
        match cmd {
            0xFF => Self::Connect,
            0xFE => Self::Disconnect,
            0xFD => Self::GetStatus,
            0xFC => Self::Synch,
            0xFB => Self::GetCommModeInfo,
            0xFA => Self::GetId,
            0xF8 => Self::GetSeed,
            0xF7 => Self::Unlock,
            0xF6 => Self::SetMta,
            0xF5 => Self::Upload,
            0xF4 => Self::ShortUpload,
            0xF0 => Self::Download,
            0xED => Self::ShortDownload,
            0xE2 => Self::SetDaqPtr,
            0xE1 => Self::WriteDaq,
            0xE0 => Self::SetDaqListMode,
            0xDE => Self::StartStopDaqList,
            0xDD => Self::StartStopSynch,
            0xDC => Self::GetDaqClock,
            0xDA => Self::GetDaqProcessorInfo,
            0xD9 => Self::GetDaqResolutionInfo,
            0xD8 => Self::GetDaqListInfo,
            0xD7 => Self::GetDaqEventInfo,
            0xD6 => Self::FreeDaq,
            0xD5 => Self::AllocDaq,
            0xD4 => Self::AllocOdt,
            0xD3 => Self::AllocOdtEntry,
            0xD2 => Self::ProgramStart,
            0xD1 => Self::ProgramClear,
            0xD0 => Self::Program,
            0xCF => Self::ProgramReset,
            0xCE => Self::GetPgmProcessorInfo,
            0xCD => Self::GetSectorInfo,
            0xCC => Self::ProgramPrepare,
            0xCB => Self::ProgramFormat,
            0xCA => Self::ProgramNext,
            0xC9 => Self::ProgramMax,
            0xC8 => Self::ProgramVerify,
            x => Self::Other(x),
        }
    }
}

impl From<XcpCommand> for u8 {
    fn from(cmd: XcpCommand) -> Self {
        match cmd {
            XcpCommand::Connect => 0xFF,
            XcpCommand::Disconnect => 0xFE,
            XcpCommand::GetStatus => 0xFD,
            XcpCommand::Synch => 0xFC,
            XcpCommand::GetCommModeInfo => 0xFB,
            XcpCommand::GetId => 0xFA,
            XcpCommand::GetSeed => 0xF8,
            XcpCommand::Unlock => 0xF7,
            XcpCommand::SetMta => 0xF6,
            XcpCommand::Upload => 0xF5,
            XcpCommand::ShortUpload => 0xF4,
            XcpCommand::Download => 0xF0,
            XcpCommand::ShortDownload => 0xED,
            XcpCommand::SetDaqPtr => 0xE2,
            XcpCommand::WriteDaq => 0xE1,
            XcpCommand::SetDaqListMode => 0xE0,
            XcpCommand::StartStopDaqList => 0xDE,
            XcpCommand::StartStopSynch => 0xDD,
            XcpCommand::GetDaqClock => 0xDC,
            XcpCommand::GetDaqProcessorInfo => 0xDA,
            XcpCommand::GetDaqResolutionInfo => 0xD9,
            XcpCommand::GetDaqListInfo => 0xD8,
            XcpCommand::GetDaqEventInfo => 0xD7,
            XcpCommand::FreeDaq => 0xD6,
            XcpCommand::AllocDaq => 0xD5,
            XcpCommand::AllocOdt => 0xD4,
            XcpCommand::AllocOdtEntry => 0xD3,
            XcpCommand::ProgramStart => 0xD2,
            XcpCommand::ProgramClear => 0xD1,
            XcpCommand::Program => 0xD0,
            XcpCommand::ProgramReset => 0xCF,
            XcpCommand::GetPgmProcessorInfo => 0xCE,
            XcpCommand::GetSectorInfo => 0xCD,
            XcpCommand::ProgramPrepare => 0xCC,
            XcpCommand::ProgramFormat => 0xCB,
            XcpCommand::ProgramNext => 0xCA,
            XcpCommand::ProgramMax => 0xC9,
            XcpCommand::ProgramVerify => 0xC8,
            XcpCommand::Other(x) => x,
        }
    }
}

/// XCP protocol layer version reported by CONNECT
pub const PROTOCOL_VERSION: u8 = 0x01;
/// XCP on CAN transport layer version reported by CONNECT
pub const TRANSPORT_VERSION: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// XCP slave settings
pub struct XcpSlaveOptions {
    /// CAN ID the master sends commands on
    pub rx_can_id: u32,
    /// CAN ID responses and DTOs are sent on
    pub tx_can_id: u32,
    /// Maximum command/response length. Always 8 on classic CAN
    pub max_cto: u8,
    /// Maximum DTO length. DTOs are capped at 8 bytes for classic CAN
    pub max_dto: u16,
    /// Bytes per PROGRAM block, also the length of PROGRAM_MAX. Clamped to 1..=MAX_CTO-1
    pub pgm_max_block_size: u8,
    /// Read every programmed block back through the flash driver
    pub verify_after_write: bool,
    /// Flash sector table
    pub sectors: Vec<SectorInfo>,
    /// DAQ processor limits
    pub daq: DaqLimits,
    /// Seed and key settings
    pub security: SecurityConfig,
}

impl Default for XcpSlaveOptions {
    fn default() -> Self {
        Self {
            rx_can_id: 0x554,
            tx_can_id: 0x555,
            max_cto: 8,
            max_dto: 8,
            pgm_max_block_size: 6,
            verify_after_write: false,
            sectors: default_sectors(),
            daq: DaqLimits::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// XCP slave.
///
/// The slave is single threaded and call to completion. Feed it every frame received on
/// [XcpSlaveOptions::rx_can_id] through [XcpSlave::process_can_frame] or
/// [XcpSlave::process_command], and call [XcpSlave::send_daq_data] from each event
/// channel's task.
#[derive(Debug)]
pub struct XcpSlave<P: XcpPlatform> {
    platform: P,
    options: XcpSlaveOptions,
    connected: bool,
    mtu: MemoryTransferUnit,
    pgm: ProgrammingSequencer,
    daq: DaqListManager,
    security: SecurityGatekeeper,
}

impl<P: XcpPlatform> XcpSlave<P> {
    /// Creates a disconnected slave running on `platform`
    pub fn new(platform: P, mut options: XcpSlaveOptions) -> Self {
        // SET_MTA, SHORT_UPLOAD and the DAQ commands need all 8 bytes of a classic CAN frame
        if options.max_cto as usize != MAX_FRAME_LEN {
            log::warn!("MAX_CTO {} not supported, using {MAX_FRAME_LEN}", options.max_cto);
            options.max_cto = MAX_FRAME_LEN as u8;
        }
        let max_block = options.pgm_max_block_size.clamp(1, options.max_cto - 1);
        if max_block != options.pgm_max_block_size {
            log::warn!(
                "PROGRAM block size {} does not fit a command frame, using {max_block}",
                options.pgm_max_block_size
            );
            options.pgm_max_block_size = max_block;
        }
        Self {
            platform,
            connected: false,
            mtu: MemoryTransferUnit::new(options.max_cto),
            pgm: ProgrammingSequencer::new(
                options.sectors.clone(),
                options.pgm_max_block_size,
                options.verify_after_write,
            ),
            daq: DaqListManager::new(options.daq),
            security: SecurityGatekeeper::new(options.security),
            options,
        }
    }

    /// Sets the CAN identifiers and resets the session
    pub fn init(&mut self, rx_can_id: u32, tx_can_id: u32) {
        self.options.rx_can_id = rx_can_id;
        self.options.tx_can_id = tx_can_id;
        log::debug!("XCP slave listening on 0x{rx_can_id:03X}, responding on 0x{tx_can_id:03X}");
        self.reset();
    }

    /// Disconnects, clears the MTA, discards programming, frees DAQ and relocks security
    pub fn reset(&mut self) {
        self.connected = false;
        self.mtu.reset();
        self.pgm.reset();
        self.daq.reset();
        self.security.reset();
    }

    /// Settings of this slave
    pub fn options(&self) -> &XcpSlaveOptions {
        &self.options
    }

    /// True while a master is connected
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Current Memory Transfer Address
    pub fn mta(&self) -> u32 {
        self.mtu.mta()
    }

    /// State of the programming session
    pub fn programming_state(&self) -> ProgrammingState {
        self.pgm.state()
    }

    /// Seed and key state
    pub fn security(&self) -> &SecurityGatekeeper {
        &self.security
    }

    /// DAQ configuration
    pub fn daq(&self) -> &DaqListManager {
        &self.daq
    }

    /// Platform the slave runs on
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Mutable access to the platform
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Handles a frame received from the bus. Frames for other IDs are ignored.
    ///
    /// ## Returns
    /// Ok(true) if the frame was addressed to this slave
    pub fn process_can_frame(&mut self, can_id: u32, data: &[u8]) -> ChannelResult<bool> {
        if can_id != self.options.rx_can_id {
            return Ok(false);
        }
        self.process_command(data)?;
        Ok(true)
    }

    /// Handles one command and transmits its response
    pub fn process_command(&mut self, data: &[u8]) -> ChannelResult<()> {
        let Some(resp) = self.handle_command(data) else {
            return Ok(());
        };
        self.platform
            .transmit(self.options.tx_can_id, resp.as_bytes())
            .inspect_err(|e| log::error!("Failed to transmit XCP response: {e}"))
    }

    /// Handles one command and returns its response without transmitting it.
    /// An empty frame carries no command and produces no response
    pub fn handle_command(&mut self, data: &[u8]) -> Option<ResponseFrame> {
        let frame = CommandFrame::new(data)?;
        let cmd = XcpCommand::from(frame.opcode());
        let res = if cmd != XcpCommand::Connect && !self.connected {
            Err(XcpError::Sequence)
        } else if cmd != XcpCommand::Connect && frame.len() > self.options.max_cto as usize {
            Err(XcpError::CommandSyntax)
        } else {
            log::debug!("XCP command {cmd:?} {data:02X?}");
            self.dispatch(cmd, &frame)
        };
        Some(match res {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("XCP command {cmd:?} rejected with {}: {e}", e.error_code());
                ResponseFrame::from(&e)
            }
        })
    }

    /// Samples every running DAQ list bound to `event` and transmits one DTO per ODT
    pub fn send_daq_data(&mut self, event: u16) -> ChannelResult<()> {
        let max_dto = (self.options.max_dto as usize).min(MAX_FRAME_LEN);
        for dto in self.daq.sample(event, &mut self.platform, max_dto) {
            self.platform
                .transmit(self.options.tx_can_id, &dto)
                .inspect_err(|e| log::error!("Failed to transmit DTO: {e}"))?;
        }
        Ok(())
    }

    fn dispatch(&mut self, cmd: XcpCommand, f: &CommandFrame<'_>) -> XcpResult<ResponseFrame> {
        match cmd {
            XcpCommand::Connect => self.connect(f),
            XcpCommand::Disconnect => {
                log::debug!("XCP master disconnected");
                self.reset();
                Ok(ResponseFrame::ok())
            }
            XcpCommand::GetStatus => {
                let mut status = 0;
                if self.daq.any_running() {
                    status |= SESSION_STATUS_DAQ_RUNNING;
                }
                let locked = self.security.locked_mask().bits();
                Ok(ResponseFrame::positive(&[status, locked, 0x00, 0x00, 0x00]))
            }
            XcpCommand::Synch => Err(XcpError::Synch),
            XcpCommand::GetCommModeInfo => Ok(ResponseFrame::positive(&[
                0x00,
                0x00,
                0x00,
                self.options.max_cto.saturating_sub(1),
                0x00,
                0x01,
                0x01,
            ])),
            XcpCommand::GetId => {
                let id_type = f.byte(1)?;
                log::debug!("GET_ID type {id_type}, no identification available");
                Ok(ResponseFrame::positive(&[0; 7]))
            }
            XcpCommand::GetSeed => self.get_seed(f),
            XcpCommand::Unlock => {
                let len = f.byte(1)? as usize;
                let key = f.bytes(2, len)?;
                if !self.security.unlock(key) {
                    return Err(XcpError::KeyRejected);
                }
                Ok(ResponseFrame::positive(&[self.security.locked_mask().bits()]))
            }
            XcpCommand::SetMta => {
                // Address extension in byte 3 is not used
                self.mtu.set_mta(f.u32_be(4)?);
                Ok(ResponseFrame::ok())
            }
            XcpCommand::Upload => {
                let count = f.byte(1)? as usize;
                let data = self.mtu.upload(&mut self.platform, count)?;
                Ok(ResponseFrame::positive(&data))
            }
            XcpCommand::ShortUpload => {
                let count = f.byte(1)? as usize;
                let address = f.u32_be(4)?;
                let data = self.mtu.short_upload(&mut self.platform, count, address)?;
                Ok(ResponseFrame::positive(&data))
            }
            XcpCommand::Download => {
                self.security.require(Resource::CalPag)?;
                let count = f.byte(1)? as usize;
                if count > self.mtu.max_download() {
                    return Err(XcpError::OutOfRange);
                }
                let data = f.bytes(2, count)?;
                self.mtu.download(&mut self.platform, data)?;
                Ok(ResponseFrame::ok())
            }
            XcpCommand::ShortDownload => {
                // An 8 byte CTO has no room for data after the address
                self.security.require(Resource::CalPag)?;
                Err(XcpError::CommandSyntax)
            }

            XcpCommand::SetDaqPtr
            | XcpCommand::WriteDaq
            | XcpCommand::SetDaqListMode
            | XcpCommand::StartStopDaqList
            | XcpCommand::StartStopSynch
            | XcpCommand::FreeDaq
            | XcpCommand::AllocDaq
            | XcpCommand::AllocOdt
            | XcpCommand::AllocOdtEntry => {
                self.security.require(Resource::Daq)?;
                self.daq_config(cmd, f)
            }
            XcpCommand::GetDaqClock => {
                let ts = self.platform.now().to_be_bytes();
                Ok(ResponseFrame::positive(&[0, 0, 0, ts[0], ts[1], ts[2], ts[3]]))
            }
            XcpCommand::GetDaqProcessorInfo => {
                Ok(ResponseFrame::positive(&self.daq.processor_info()))
            }
            XcpCommand::GetDaqResolutionInfo => {
                Ok(ResponseFrame::positive(&self.daq.resolution_info()))
            }
            XcpCommand::GetDaqListInfo => {
                let info = self.daq.list_info(f.u16_be(2)?)?;
                Ok(ResponseFrame::positive(&info))
            }
            XcpCommand::GetDaqEventInfo => {
                let info = self.daq.event_info(f.u16_be(2)?)?;
                Ok(ResponseFrame::positive(&info))
            }

            XcpCommand::ProgramStart
            | XcpCommand::ProgramClear
            | XcpCommand::Program
            | XcpCommand::ProgramNext
            | XcpCommand::ProgramMax
            | XcpCommand::ProgramReset
            | XcpCommand::ProgramPrepare
            | XcpCommand::ProgramFormat => {
                self.security.require(Resource::Pgm)?;
                self.programming(cmd, f)
            }
            XcpCommand::GetPgmProcessorInfo => {
                Ok(ResponseFrame::positive(&self.pgm.processor_info()?))
            }
            XcpCommand::GetSectorInfo => {
                let mode = f.byte(1)?;
                let sector = f.byte(2)?;
                Ok(ResponseFrame::positive(&self.pgm.sector_info(mode, sector)?))
            }
            XcpCommand::ProgramVerify => {
                let mode = f.byte(1)?;
                let expected = if mode == 1 { f.u32_be(4)? } else { 0 };
                self.pgm
                    .verify(&mut self.platform, self.mtu.mta(), mode, expected)?;
                Ok(ResponseFrame::ok())
            }

            XcpCommand::Other(x) => Err(XcpError::UnknownCommand(x)),
        }
    }

    fn connect(&mut self, f: &CommandFrame<'_>) -> XcpResult<ResponseFrame> {
        let mode = f.byte(1).unwrap_or(0);
        log::debug!("XCP master connected, mode {mode}");
        self.connected = true;
        self.pgm.reset();
        let resources = ResourceMask::CAL_PAG | ResourceMask::DAQ | ResourceMask::PGM;
        let dto = self.options.max_dto.to_be_bytes();
        Ok(ResponseFrame::positive(&[
            resources.bits(),
            0x00,
            self.options.max_cto,
            dto[0],
            dto[1],
            PROTOCOL_VERSION,
            TRANSPORT_VERSION,
        ]))
    }

    fn get_seed(&mut self, f: &CommandFrame<'_>) -> XcpResult<ResponseFrame> {
        let mode = f.byte(1)?;
        let mask = f.byte(2)?;
        // Seeds fit one frame, so only the first part is ever requested
        if mode != 0 {
            return Err(XcpError::OutOfRange);
        }
        let resource = Resource::from_mask(mask).ok_or(XcpError::OutOfRange)?;
        let seed = self.security.request_seed(resource);
        let mut payload = Vec::with_capacity(seed.len() + 1);
        payload.push(seed.len() as u8);
        payload.extend_from_slice(&seed);
        Ok(ResponseFrame::positive(&payload))
    }

    fn daq_config(&mut self, cmd: XcpCommand, f: &CommandFrame<'_>) -> XcpResult<ResponseFrame> {
        match cmd {
            XcpCommand::FreeDaq => self.daq.free_daq(),
            XcpCommand::AllocDaq => self.daq.alloc_daq(f.u16_be(2)?)?,
            XcpCommand::AllocOdt => self.daq.alloc_odt(f.u16_be(2)?, f.byte(4)?)?,
            XcpCommand::AllocOdtEntry => {
                self.daq
                    .alloc_odt_entry(f.u16_be(2)?, f.byte(4)?, f.byte(5)?)?
            }
            XcpCommand::SetDaqPtr => self.daq.set_daq_ptr(f.u16_be(2)?, f.byte(4)?, f.byte(5)?)?,
            XcpCommand::WriteDaq => self.daq.write_daq(OdtEntry {
                bit_offset: f.byte(1)?,
                size: f.byte(2)?,
                extension: f.byte(3)?,
                address: f.u32_be(4)?,
            })?,
            XcpCommand::SetDaqListMode => self.daq.set_daq_list_mode(
                f.u16_be(2)?,
                f.byte(1)?,
                f.u16_be(4)?,
                f.byte(6)?,
                f.byte(7)?,
            )?,
            XcpCommand::StartStopDaqList => {
                let pid = self.daq.start_stop_daq_list(f.u16_be(2)?, f.byte(1)?)?;
                return Ok(ResponseFrame::positive(&[pid]));
            }
            XcpCommand::StartStopSynch => self.daq.start_stop_synch(f.byte(1)?)?,
            _ => return Err(XcpError::UnknownCommand(cmd.into())),
        }
        Ok(ResponseFrame::ok())
    }

    fn programming(&mut self, cmd: XcpCommand, f: &CommandFrame<'_>) -> XcpResult<ResponseFrame> {
        match cmd {
            XcpCommand::ProgramStart => return Ok(ResponseFrame::positive(&self.pgm.start()?)),
            XcpCommand::ProgramClear => {
                let _mode = f.byte(1)?;
                let length = f.u32_be(4)?;
                self.pgm.clear(&mut self.platform, self.mtu.mta(), length)?;
            }
            XcpCommand::Program | XcpCommand::ProgramNext => {
                let size = f.byte(1)? as usize;
                self.pgm.check_program(size)?;
                let data = f.bytes(2, size)?;
                let written = self.pgm.program(&mut self.platform, self.mtu.mta(), data)?;
                self.mtu.advance(written);
            }
            XcpCommand::ProgramMax => {
                let size = self.pgm.max_block_size() as usize;
                self.pgm.check_program(size)?;
                let data = f.bytes(1, size)?;
                let written = self.pgm.program_max(&mut self.platform, self.mtu.mta(), data)?;
                self.mtu.advance(written);
            }
            XcpCommand::ProgramReset => self.pgm.program_reset(),
            XcpCommand::ProgramPrepare => self.pgm.prepare(f.u16_be(2)?),
            XcpCommand::ProgramFormat => self.pgm.format(f.byte(1)?, f.byte(2)?)?,
            _ => return Err(XcpError::UnknownCommand(cmd.into())),
        }
        Ok(ResponseFrame::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulation::SimulationPlatform;

    fn connected() -> XcpSlave<SimulationPlatform> {
        let mut slave = XcpSlave::new(SimulationPlatform::default(), XcpSlaveOptions::default());
        slave.handle_command(&[0xFF, 0x00]).unwrap();
        slave
    }

    #[test]
    fn command_codes() {
        for code in 0..=u8::MAX {
            assert_eq!(u8::from(XcpCommand::from(code)), code);
        }
        assert_eq!(XcpCommand::from(0x01), XcpCommand::Other(0x01));
        assert_eq!(XcpCommand::from(0xC8), XcpCommand::ProgramVerify);
    }

    #[test]
    fn connect_response() {
        let mut slave = XcpSlave::new(SimulationPlatform::default(), XcpSlaveOptions::default());
        let r = slave.handle_command(&[0xFF, 0x00]).unwrap();
        assert_eq!(r.as_bytes(), &[0xFF, 0x15, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01]);
        assert!(slave.is_connected());
    }

    #[test]
    fn empty_and_oversized_frames() {
        let mut slave = connected();
        assert!(slave.handle_command(&[]).is_none());
        let r = slave.handle_command(&[0xFD, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(r.error_code(), Some(ErrorCode::CmdSyntax));
    }

    #[test]
    fn short_frames_are_syntax_errors() {
        let mut slave = connected();
        let r = slave.handle_command(&[0xF6, 0, 0, 0, 0x01]).unwrap();
        assert_eq!(r.error_code(), Some(ErrorCode::CmdSyntax));
        let r = slave.handle_command(&[0xF0, 3, 0x11]).unwrap();
        assert_eq!(r.error_code(), Some(ErrorCode::CmdSyntax));
        let r = slave.handle_command(&[0xF5]).unwrap();
        assert_eq!(r.error_code(), Some(ErrorCode::CmdSyntax));
    }

    #[test]
    fn max_cto_is_capped() {
        let opts = XcpSlaveOptions {
            max_cto: 64,
            ..Default::default()
        };
        let slave = XcpSlave::new(SimulationPlatform::default(), opts);
        assert_eq!(slave.options().max_cto, 8);
    }

    #[test]
    fn frame_limits_fit_classic_can() {
        let opts = XcpSlaveOptions {
            max_cto: 4,
            pgm_max_block_size: 20,
            ..Default::default()
        };
        let mut slave = XcpSlave::new(SimulationPlatform::default(), opts);
        assert_eq!(slave.options().max_cto, 8);
        assert_eq!(slave.options().pgm_max_block_size, 7);
        slave.handle_command(&[0xFF, 0x00]).unwrap();
        let r = slave.handle_command(&[0xF6, 0, 0, 0, 0, 0, 0x01, 0x00]).unwrap();
        assert!(r.is_positive());
        let r = slave.handle_command(&[0xD2]).unwrap();
        assert_eq!(r.as_bytes(), &[0xFF, 0x00, 0x01, 7, 0x00, 0x01, 0x00, 0x00]);
        slave.handle_command(&[0xD1, 0, 0, 0, 0, 0, 0x01, 0x00]).unwrap();
        let r = slave.handle_command(&[0xC9, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert!(r.is_positive());
        assert_eq!(&slave.platform().flash()[0x100..0x107], &[1, 2, 3, 4, 5, 6, 7]);

        let opts = XcpSlaveOptions {
            pgm_max_block_size: 0,
            ..Default::default()
        };
        let slave = XcpSlave::new(SimulationPlatform::default(), opts);
        assert_eq!(slave.options().pgm_max_block_size, 1);
    }

    #[test]
    fn oversized_connect_still_connects() {
        let mut slave = XcpSlave::new(SimulationPlatform::default(), XcpSlaveOptions::default());
        let r = slave.handle_command(&[0xFD, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(r.error_code(), Some(ErrorCode::Sequence));
        let r = slave.handle_command(&[0xFF, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(r.is_positive());
        assert!(slave.is_connected());
    }
}
