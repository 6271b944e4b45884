//! FFI bindings for xcp_slave
//!
//! C firmware hands over a table of callbacks for the bus, memory, flash and clock, and
//! gets back an opaque slave handle. Every received CAN frame is then passed to
//! [xcp_slave_process_can_frame].
//!
//! IMPORTANT. A handle must only be used from one thread (or one task) at a time!

use xcp_slave::{
    channel::{ChannelError, ChannelResult, DaqClock, FlashAccess, MemoryAccess, TransmitChannel},
    xcp::{ResourceMask, SecurityConfig, XcpSlave, XcpSlaveOptions},
};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Callback result
pub enum CallbackResult {
    /// Everything OK
    OK = 0x00,
    /// Write timeout
    WriteTimeout = 0x01,
    /// Tx buffer full
    BufferFull = 0x02,
    /// Driver rejected the request
    Failed = 0x03,
    /// Flash content differs (flash_verify only)
    Mismatch = 0x04,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(missing_debug_implementations)]
/// Platform callbacks the slave runs on
pub struct XcpPlatformCallbacks {
    /// Sends one CAN frame
    pub transmit: extern "C" fn(can_id: u32, data: *const u8, len: u32) -> CallbackResult,
    /// Reads one byte of ECU memory
    pub read_byte: extern "C" fn(address: u32) -> u8,
    /// Writes one byte of ECU memory
    pub write_byte: extern "C" fn(address: u32, value: u8),
    /// Free running DAQ clock
    pub now: extern "C" fn() -> u32,
    /// Erases a flash range
    pub flash_erase: extern "C" fn(address: u32, length: u32) -> CallbackResult,
    /// Programs a flash range
    pub flash_write: extern "C" fn(address: u32, data: *const u8, len: u32) -> CallbackResult,
    /// Compares a flash range, [CallbackResult::Mismatch] if it differs
    pub flash_verify: extern "C" fn(address: u32, data: *const u8, len: u32) -> CallbackResult,
}

fn api_error(code: CallbackResult, desc: &str) -> ChannelError {
    ChannelError::APIError {
        api_name: "ffi".into(),
        code: code as u8,
        desc: desc.into(),
    }
}

impl TransmitChannel for XcpPlatformCallbacks {
    fn transmit(&mut self, can_id: u32, data: &[u8]) -> ChannelResult<()> {
        match (self.transmit)(can_id, data.as_ptr(), data.len() as u32) {
            CallbackResult::OK => Ok(()),
            CallbackResult::WriteTimeout => Err(ChannelError::WriteTimeout),
            CallbackResult::BufferFull => Err(ChannelError::BufferFull),
            x => Err(api_error(x, "transmit failed")),
        }
    }
}

impl MemoryAccess for XcpPlatformCallbacks {
    fn read_byte(&mut self, address: u32) -> u8 {
        (self.read_byte)(address)
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        (self.write_byte)(address, value)
    }
}

impl FlashAccess for XcpPlatformCallbacks {
    fn flash_erase(&mut self, address: u32, length: u32) -> ChannelResult<()> {
        match (self.flash_erase)(address, length) {
            CallbackResult::OK => Ok(()),
            _ => Err(ChannelError::EraseFailed { address, length }),
        }
    }

    fn flash_write(&mut self, address: u32, data: &[u8]) -> ChannelResult<()> {
        match (self.flash_write)(address, data.as_ptr(), data.len() as u32) {
            CallbackResult::OK => Ok(()),
            _ => Err(ChannelError::WriteFailed {
                address,
                length: data.len() as u32,
            }),
        }
    }

    fn flash_verify(&mut self, address: u32, data: &[u8]) -> ChannelResult<bool> {
        match (self.flash_verify)(address, data.as_ptr(), data.len() as u32) {
            CallbackResult::OK => Ok(true),
            CallbackResult::Mismatch => Ok(false),
            _ => Err(ChannelError::VerifyFailed { address }),
        }
    }
}

impl DaqClock for XcpPlatformCallbacks {
    fn now(&self) -> u32 {
        (self.now)()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
/// Slave settings. CAN IDs are set with [xcp_slave_init]
pub struct XcpFfiOptions {
    /// Maximum DTO length
    pub max_dto: u16,
    /// Bytes per PROGRAM block
    pub pgm_max_block_size: u8,
    /// Read back every programmed block
    pub verify_after_write: bool,
    /// Enables seed and key
    pub security_enabled: bool,
    /// Resource mask of protected resources (CAL_PAG 0x01, DAQ 0x04, PGM 0x10)
    pub protected_resources: u8,
    /// Secret of the key algorithm
    pub secret: u32,
}

impl From<XcpFfiOptions> for XcpSlaveOptions {
    fn from(o: XcpFfiOptions) -> Self {
        Self {
            max_dto: o.max_dto,
            pgm_max_block_size: o.pgm_max_block_size,
            verify_after_write: o.verify_after_write,
            security: SecurityConfig {
                enabled: o.security_enabled,
                protected: ResourceMask::from_bits_truncate(o.protected_resources),
                secret: o.secret,
            },
            ..Default::default()
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
/// FFI result codes
pub enum XcpFfiResult {
    /// Operation OK
    OK = 0,
    /// A required pointer was null
    NullPointer = 1,
    /// Frame was not addressed to this slave
    Ignored = 2,
    /// The transmit callback failed
    TransmitFailed = 3,
}

/// Opaque slave handle
#[allow(missing_debug_implementations)]
pub struct XcpSlaveHandle(XcpSlave<XcpPlatformCallbacks>);

/// # Safety
/// `data` must be null or valid for `len` bytes
unsafe fn frame<'a>(data: *const u8, len: u32) -> Option<&'a [u8]> {
    if len == 0 {
        Some(&[])
    } else if data.is_null() {
        None
    } else {
        Some(core::slice::from_raw_parts(data, len as usize))
    }
}

/// Installs env_logger as the log backend, driven by `RUST_LOG`
#[no_mangle]
pub extern "C" fn xcp_slave_enable_logging() {
    let _ = env_logger::try_init();
}

/// Creates a disconnected slave. Free it with [xcp_slave_destroy]
#[no_mangle]
pub extern "C" fn xcp_slave_create(
    callbacks: XcpPlatformCallbacks,
    options: XcpFfiOptions,
) -> *mut XcpSlaveHandle {
    let slave = XcpSlave::new(callbacks, options.into());
    log::debug!("XCP slave created with {options:?}");
    Box::into_raw(Box::new(XcpSlaveHandle(slave)))
}

/// Destroys a slave created by [xcp_slave_create]
///
/// # Safety
/// `handle` must come from [xcp_slave_create] and not be used afterwards
#[no_mangle]
pub unsafe extern "C" fn xcp_slave_destroy(handle: *mut XcpSlaveHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Sets the CAN IDs and resets the session
///
/// # Safety
/// `handle` must be null or a live handle
#[no_mangle]
pub unsafe extern "C" fn xcp_slave_init(
    handle: *mut XcpSlaveHandle,
    rx_can_id: u32,
    tx_can_id: u32,
) -> XcpFfiResult {
    match handle.as_mut() {
        Some(h) => {
            h.0.init(rx_can_id, tx_can_id);
            XcpFfiResult::OK
        }
        None => XcpFfiResult::NullPointer,
    }
}

/// Processes a received CAN frame. Frames for other IDs return [XcpFfiResult::Ignored]
///
/// # Safety
/// `handle` must be null or a live handle, `data` must be valid for `len` bytes
#[no_mangle]
pub unsafe extern "C" fn xcp_slave_process_can_frame(
    handle: *mut XcpSlaveHandle,
    can_id: u32,
    data: *const u8,
    len: u32,
) -> XcpFfiResult {
    let (Some(h), Some(data)) = (handle.as_mut(), frame(data, len)) else {
        return XcpFfiResult::NullPointer;
    };
    match h.0.process_can_frame(can_id, data) {
        Ok(true) => XcpFfiResult::OK,
        Ok(false) => XcpFfiResult::Ignored,
        Err(_) => XcpFfiResult::TransmitFailed,
    }
}

/// Processes one command frame, regardless of its CAN ID
///
/// # Safety
/// `handle` must be null or a live handle, `data` must be valid for `len` bytes
#[no_mangle]
pub unsafe extern "C" fn xcp_slave_process_command(
    handle: *mut XcpSlaveHandle,
    data: *const u8,
    len: u32,
) -> XcpFfiResult {
    let (Some(h), Some(data)) = (handle.as_mut(), frame(data, len)) else {
        return XcpFfiResult::NullPointer;
    };
    match h.0.process_command(data) {
        Ok(()) => XcpFfiResult::OK,
        Err(_) => XcpFfiResult::TransmitFailed,
    }
}

/// Samples every DAQ list bound to `event` and transmits the DTOs
///
/// # Safety
/// `handle` must be null or a live handle
#[no_mangle]
pub unsafe extern "C" fn xcp_slave_send_daq(handle: *mut XcpSlaveHandle, event: u16) -> XcpFfiResult {
    let Some(h) = handle.as_mut() else {
        return XcpFfiResult::NullPointer;
    };
    match h.0.send_daq_data(event) {
        Ok(()) => XcpFfiResult::OK,
        Err(_) => XcpFfiResult::TransmitFailed,
    }
}

/// Disconnects, drops any programming session, frees DAQ and relocks security
///
/// # Safety
/// `handle` must be null or a live handle
#[no_mangle]
pub unsafe extern "C" fn xcp_slave_reset(handle: *mut XcpSlaveHandle) {
    if let Some(h) = handle.as_mut() {
        h.0.reset();
    }
}

/// True while a master is connected
///
/// # Safety
/// `handle` must be null or a live handle
#[no_mangle]
pub unsafe extern "C" fn xcp_slave_is_connected(handle: *const XcpSlaveHandle) -> bool {
    handle.as_ref().is_some_and(|h| h.0.is_connected())
}
