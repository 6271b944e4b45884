#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    //unstable_features,
    //unused_imports,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate which implements the slave side of XCP (Universal Measurement and Calibration Protocol)
//! over CAN, allowing calibration tools such as CANape, INCA or Vision to talk to an ECU.
//!
//! ## Protocol support
//!
//! The slave implements the subset of ASAM XCP used by calibration and reflashing tools
//! on classic CAN (8 byte CTO / DTO):
//!
//! ### Session control
//! CONNECT, DISCONNECT, GET_STATUS, SYNCH, GET_COMM_MODE_INFO and GET_ID.
//!
//! ### Memory transfer
//! SET_MTA, UPLOAD, SHORT_UPLOAD and DOWNLOAD operate on the Memory Transfer Address (MTA)
//! register, giving the tool read and write access to live ECU memory.
//!
//! ### Flash programming
//! PROGRAM_START, PROGRAM_CLEAR, PROGRAM, PROGRAM_NEXT, PROGRAM_MAX, PROGRAM_RESET,
//! PROGRAM_PREPARE, PROGRAM_FORMAT, PROGRAM_VERIFY, GET_PGM_PROCESSOR_INFO and GET_SECTOR_INFO.
//! Programming follows a strict `start -> clear -> program -> finish` sequence.
//!
//! ### Data acquisition (DAQ)
//! Dynamic DAQ list allocation (FREE_DAQ, ALLOC_DAQ, ALLOC_ODT, ALLOC_ODT_ENTRY), list
//! configuration, start/stop and periodic sampling through [xcp::XcpSlave::send_daq_data].
//!
//! ### Seed and key
//! GET_SEED and UNLOCK protect the CAL_PAG, DAQ and PGM resources.
//!
//! ## Platform integration
//!
//! The slave is generic over [channel::XcpPlatform], which bundles CAN transmission, raw memory
//! access, flash primitives and a DAQ clock. The [hardware::simulation] module provides an in-memory
//! platform for bench testing, and the `ffi` crate exposes the slave to C firmware.

use channel::ChannelError;
use xcp::{ErrorCode, Resource};

pub mod channel;
pub mod hardware;
pub mod xcp;

/// XCP slave result
pub type XcpResult<T> = Result<T, XcpError>;

#[derive(Debug, thiserror::Error)]
/// Reasons an XCP command can be rejected.
///
/// Every variant except [XcpError::ChannelError] corresponds to exactly one negative response
/// code on the wire, see [XcpError::error_code]
pub enum XcpError {
    /// The command is not valid in the current protocol state
    #[error("Command is not valid in the current protocol state")]
    Sequence,
    /// The command code is not supported by the slave
    #[error("Unknown command 0x{0:02X}")]
    UnknownCommand(u8),
    /// The command frame is too short for the fields it has to carry
    #[error("Command frame is malformed or too short")]
    CommandSyntax,
    /// A parameter of the command is outside its valid range
    #[error("Command parameter out of range")]
    OutOfRange,
    /// A programming session is already active
    #[error("A programming session is already active")]
    ProgrammingActive,
    /// The requested mode is not supported
    #[error("Requested mode is not supported")]
    ModeNotValid,
    /// Memory content did not match the expected value
    #[error("Verification failed")]
    Verify,
    /// The resource needed by the command is protected and has not been unlocked
    #[error("Resource {0:?} is locked")]
    AccessLocked(Resource),
    /// UNLOCK was sent without an outstanding seed, or with a wrong key
    #[error("Key rejected")]
    KeyRejected,
    /// The requested allocation exceeds the configured limits
    #[error("Requested allocation exceeds the configured limits")]
    MemoryOverflow,
    /// The master asked the slave to resynchronise
    #[error("Command synchronisation requested")]
    Synch,
    /// Error with an underlying platform collaborator
    #[error("XCP platform channel error")]
    ChannelError(
        #[from]
        #[source]
        ChannelError,
    ),
}

impl XcpError {
    /// Returns the negative response code sent to the master for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            XcpError::Sequence => ErrorCode::Sequence,
            XcpError::UnknownCommand(_) => ErrorCode::CmdUnknown,
            XcpError::CommandSyntax => ErrorCode::CmdSyntax,
            XcpError::OutOfRange => ErrorCode::OutOfRange,
            XcpError::ProgrammingActive => ErrorCode::PgmActive,
            XcpError::ModeNotValid => ErrorCode::ModeNotValid,
            XcpError::Verify => ErrorCode::Verify,
            XcpError::AccessLocked(_) | XcpError::KeyRejected => ErrorCode::AccessLocked,
            XcpError::MemoryOverflow => ErrorCode::MemoryOverflow,
            XcpError::Synch => ErrorCode::CmdSynch,
            XcpError::ChannelError(_) => ErrorCode::Generic,
        }
    }
}
