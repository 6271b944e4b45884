//! Module for the platform collaborators an XCP slave talks to
//!
//! The slave never touches hardware directly. Everything it needs from the ECU is
//! split into the following traits:
//! * [TransmitChannel] - Sends XCP response and DTO frames onto the CAN bus
//! * [MemoryAccess] - Raw ECU memory (RAM / calibration pages) used by UPLOAD, DOWNLOAD and verification
//! * [FlashAccess] - Flash primitives used by the programming sequencer
//! * [DaqClock] - Monotonic timestamp source used by GET_DAQ_CLOCK
//!
//! Any type implementing all four automatically implements [XcpPlatform], which is
//! what [crate::xcp::XcpSlave] is generic over.

/// Communication channel result
pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug)]
/// Error produced by a platform collaborator
pub enum ChannelError {
    /// Timeout when writing data to the channel
    WriteTimeout,
    /// The channels Tx buffer is full
    BufferFull,
    /// Flash erase of a region was rejected by the flash driver
    EraseFailed {
        /// Start address of the erase
        address: u32,
        /// Number of bytes to erase
        length: u32,
    },
    /// Flash write was rejected by the flash driver
    WriteFailed {
        /// Start address of the write
        address: u32,
        /// Number of bytes to write
        length: u32,
    },
    /// Flash content did not match after a write
    VerifyFailed {
        /// Start address of the compared region
        address: u32,
    },
    /// Underlying API error with hardware
    APIError {
        /// Name of the API EG: 'stm32-hal', 'ffi'
        api_name: String,
        /// Internal API error code
        code: u8,
        /// API error description
        desc: String,
    },
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::WriteTimeout => write!(f, "timeout writing to channel"),
            ChannelError::BufferFull => write!(f, "channel's Transmit buffer is full"),
            ChannelError::EraseFailed { address, length } => {
                write!(f, "flash erase of {length} bytes at 0x{address:08X} failed")
            }
            ChannelError::WriteFailed { address, length } => {
                write!(f, "flash write of {length} bytes at 0x{address:08X} failed")
            }
            ChannelError::VerifyFailed { address } => {
                write!(f, "flash verification at 0x{address:08X} failed")
            }
            ChannelError::APIError {
                api_name,
                code,
                desc,
            } => write!(f, "underlying {api_name} API error ({code}): {desc}"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Sends frames onto the CAN bus
pub trait TransmitChannel {
    /// Transmits a single CAN frame
    ///
    /// ## Parameters
    /// * can_id - Identifier to tag the frame with (The slave's configured Tx ID)
    /// * data - Payload of the frame, never longer than 8 bytes on classic CAN
    fn transmit(&mut self, can_id: u32, data: &[u8]) -> ChannelResult<()>;
}

/// Raw access to ECU memory
pub trait MemoryAccess {
    /// Reads a single byte from ECU memory
    fn read_byte(&mut self, address: u32) -> u8;

    /// Writes a single byte to ECU memory
    fn write_byte(&mut self, address: u32, value: u8);

    /// Fills `buffer` with consecutive bytes starting at `address`.
    /// The address wraps around at the end of the 32bit address space
    fn read_bytes(&mut self, address: u32, buffer: &mut [u8]) {
        for (offset, b) in buffer.iter_mut().enumerate() {
            *b = self.read_byte(address.wrapping_add(offset as u32));
        }
    }

    /// Writes `data` to consecutive bytes starting at `address`
    fn write_bytes(&mut self, address: u32, data: &[u8]) {
        for (offset, b) in data.iter().enumerate() {
            self.write_byte(address.wrapping_add(offset as u32), *b);
        }
    }
}

/// Flash programming primitives.
///
/// These are treated as synchronous pass/fail calls. Any waiting for the flash
/// controller happens inside the implementation
pub trait FlashAccess {
    /// Erases `length` bytes of flash starting at `address`
    fn flash_erase(&mut self, address: u32, length: u32) -> ChannelResult<()>;

    /// Programs `data` into flash starting at `address`
    fn flash_write(&mut self, address: u32, data: &[u8]) -> ChannelResult<()>;

    /// Compares flash content at `address` against `data`.
    ///
    /// ## Returns
    /// Ok(true) if the content matches
    fn flash_verify(&mut self, address: u32, data: &[u8]) -> ChannelResult<bool>;
}

/// Timestamp source for data acquisition
pub trait DaqClock {
    /// Current value of the free running DAQ clock
    fn now(&self) -> u32;
}

/// Everything an XCP slave needs from the platform it runs on
pub trait XcpPlatform: TransmitChannel + MemoryAccess + FlashAccess + DaqClock {}

impl<T: TransmitChannel + MemoryAccess + FlashAccess + DaqClock> XcpPlatform for T {}
