//! XCP negative response codes

use strum_macros::Display;

/// Error code carried in byte 1 of a negative (`0xFE`) response.
///
/// The [Display] implementation prints the code the way calibration tools
/// name it in their trace windows
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum ErrorCode {
    /// Command processor synchronisation
    #[strum(to_string = "ERR_CMD_SYNCH")]
    CmdSynch,
    /// Command was not executed, programming is already running
    #[strum(to_string = "ERR_PGM_ACTIVE")]
    PgmActive,
    /// Unknown command or not implemented optional command
    #[strum(to_string = "ERR_CMD_UNKNOWN")]
    CmdUnknown,
    /// Command syntax invalid
    #[strum(to_string = "ERR_CMD_SYNTAX")]
    CmdSyntax,
    /// Command syntax valid but command parameter(s) out of range
    #[strum(to_string = "ERR_OUT_OF_RANGE")]
    OutOfRange,
    /// Access locked, seed and key required
    #[strum(to_string = "ERR_ACCESS_LOCKED")]
    AccessLocked,
    /// Mode not valid
    #[strum(to_string = "ERR_MODE_NOT_VALID")]
    ModeNotValid,
    /// Sequence error
    #[strum(to_string = "ERR_SEQUENCE")]
    Sequence,
    /// Memory overflow error
    #[strum(to_string = "ERR_MEMORY_OVERFLOW")]
    MemoryOverflow,
    /// Generic error
    #[strum(to_string = "ERR_GENERIC")]
    Generic,
    /// The slave internal program verify routine detected an error
    #[strum(to_string = "ERR_VERIFY")]
    Verify,
    /// Code this slave never sends
    #[strum(to_string = "ERR_RESERVED")]
    Reserved(u8),
}

impl From<u8> for ErrorCode {
    fn from(p: u8) -> Self {
        match p {
            0x00 => Self::CmdSynch,
            0x12 => Self::PgmActive,
            0x20 => Self::CmdUnknown,
            0x21 => Self::CmdSyntax,
            0x22 => Self::OutOfRange,
            0x25 => Self::AccessLocked,
            0x27 => Self::ModeNotValid,
            0x29 => Self::Sequence,
            0x30 => Self::MemoryOverflow,
            0x31 => Self::Generic,
            0x32 => Self::Verify,
            x => Self::Reserved(x),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::CmdSynch => 0x00,
            ErrorCode::PgmActive => 0x12,
            ErrorCode::CmdUnknown => 0x20,
            ErrorCode::CmdSyntax => 0x21,
            ErrorCode::OutOfRange => 0x22,
            ErrorCode::AccessLocked => 0x25,
            ErrorCode::ModeNotValid => 0x27,
            ErrorCode::Sequence => 0x29,
            ErrorCode::MemoryOverflow => 0x30,
            ErrorCode::Generic => 0x31,
            ErrorCode::Verify => 0x32,
            ErrorCode::Reserved(x) => x,
        }
    }
}
