//! Errors returned by program entrypoints and the invocation machinery.
//!
//! Every error surfaced to the host is converted to a `u64` status code. The
//! encoding follows the builtin program error layout: `0` is success, custom
//! program errors keep their value in the low 32 bits and builtin errors are
//! stored in the high 32 bits.

use thiserror::Error;

/// Status code returned by a program that completed successfully
pub const SUCCESS: u64 = 0;

const BUILTIN_BIT_SHIFT: usize = 32;

macro_rules! to_builtin {
    ($error:expr) => {
        ($error as u64) << BUILTIN_BIT_SHIFT
    };
}

pub const CUSTOM_ZERO: u64 = to_builtin!(1);
pub const INVALID_ARGUMENT: u64 = to_builtin!(2);
pub const INVALID_INSTRUCTION_DATA: u64 = to_builtin!(3);
pub const PRIVILEGE_VIOLATION: u64 = to_builtin!(4);
pub const UNKNOWN_ACCOUNT: u64 = to_builtin!(5);
pub const CALL_DEPTH_EXCEEDED: u64 = to_builtin!(6);
pub const HASHING_FAILURE: u64 = to_builtin!(7);
pub const RECOVER_FAILURE: u64 = to_builtin!(8);
pub const ACCOUNT_BORROW_FAILED: u64 = to_builtin!(9);
pub const ACCOUNT_DATA_SIZE_CHANGED: u64 = to_builtin!(10);
pub const INVALID_REALLOC: u64 = to_builtin!(11);
pub const ARITHMETIC_OVERFLOW: u64 = to_builtin!(12);
pub const UNBALANCED_INSTRUCTION: u64 = to_builtin!(13);
pub const REENTRANCY_NOT_ALLOWED: u64 = to_builtin!(14);
pub const UNSUPPORTED_PROGRAM_ID: u64 = to_builtin!(15);
pub const MAX_ACCOUNTS_EXCEEDED: u64 = to_builtin!(16);
pub const MAX_INSTRUCTION_DATA_LEN_EXCEEDED: u64 = to_builtin!(17);
pub const MAX_INSTRUCTION_TRACE_LENGTH_EXCEEDED: u64 = to_builtin!(18);

/// Reasons the runtime or a program may fail an instruction.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InstructionError {
    /// The input buffer is malformed or carries fewer accounts than required
    #[error("invalid program argument")]
    InvalidArgument,

    /// The instruction data does not decode to a known instruction
    #[error("invalid instruction data")]
    InvalidInstructionData,

    /// A write or sign was attempted without the matching grant, or a nested
    /// invocation requested signer privilege the caller does not hold
    #[error("account privilege violation")]
    PrivilegeViolation,

    /// A nested invocation referenced an account absent from the caller's table
    #[error("instruction references an unknown account")]
    UnknownAccount,

    /// The invocation stack is already as deep as the execution budget allows
    #[error("cross-program invocation call depth too deep")]
    CallDepthExceeded,

    /// The content hashing primitive reported an error
    #[error("hashing primitive failed")]
    HashingFailure,

    /// The signature recovery primitive reported an error
    #[error("public key recovery failed")]
    RecoverFailure,

    /// The account is already borrowed in a conflicting way
    #[error("instruction tries to borrow reference for an account which is already borrowed")]
    AccountBorrowFailed,

    /// Only the owning program may change the length of an account's data
    #[error("instruction changed the size of the account data")]
    AccountDataSizeChanged,

    /// The requested account data length exceeds the permitted maximum
    #[error("failed to reallocate account data")]
    InvalidRealloc,

    #[error("arithmetic overflowed")]
    ArithmeticOverflow,

    /// The sum of all lamports changed over the course of an instruction
    #[error("sum of account balances before and after instruction do not match")]
    UnbalancedInstruction,

    /// A program on the stack was invoked again by a different program
    #[error("cross-program invocation reentrancy not allowed for this instruction")]
    ReentrancyNotAllowed,

    #[error("unsupported program id")]
    UnsupportedProgramId,

    #[error("max accounts exceeded")]
    MaxAccountsExceeded,

    #[error("max instruction data length exceeded")]
    MaxInstructionDataLenExceeded,

    #[error("max instruction trace length exceeded")]
    MaxInstructionTraceLengthExceeded,

    /// Program specific error, the meaning is defined by the program
    #[error("custom program error: {0:#x}")]
    Custom(u32),
}

impl From<InstructionError> for u64 {
    fn from(error: InstructionError) -> Self {
        match error {
            InstructionError::InvalidArgument => INVALID_ARGUMENT,
            InstructionError::InvalidInstructionData => INVALID_INSTRUCTION_DATA,
            InstructionError::PrivilegeViolation => PRIVILEGE_VIOLATION,
            InstructionError::UnknownAccount => UNKNOWN_ACCOUNT,
            InstructionError::CallDepthExceeded => CALL_DEPTH_EXCEEDED,
            InstructionError::HashingFailure => HASHING_FAILURE,
            InstructionError::RecoverFailure => RECOVER_FAILURE,
            InstructionError::AccountBorrowFailed => ACCOUNT_BORROW_FAILED,
            InstructionError::AccountDataSizeChanged => ACCOUNT_DATA_SIZE_CHANGED,
            InstructionError::InvalidRealloc => INVALID_REALLOC,
            InstructionError::ArithmeticOverflow => ARITHMETIC_OVERFLOW,
            InstructionError::UnbalancedInstruction => UNBALANCED_INSTRUCTION,
            InstructionError::ReentrancyNotAllowed => REENTRANCY_NOT_ALLOWED,
            InstructionError::UnsupportedProgramId => UNSUPPORTED_PROGRAM_ID,
            InstructionError::MaxAccountsExceeded => MAX_ACCOUNTS_EXCEEDED,
            InstructionError::MaxInstructionDataLenExceeded => MAX_INSTRUCTION_DATA_LEN_EXCEEDED,
            InstructionError::MaxInstructionTraceLengthExceeded => {
                MAX_INSTRUCTION_TRACE_LENGTH_EXCEEDED
            }
            InstructionError::Custom(error) => {
                if error == 0 {
                    CUSTOM_ZERO
                } else {
                    error as u64
                }
            }
        }
    }
}

impl TryFrom<u64> for InstructionError {
    type Error = u64;

    /// Decodes a non-success status code, handing back codes that are not errors
    fn try_from(status_code: u64) -> Result<Self, Self::Error> {
        Ok(match status_code {
            SUCCESS => return Err(status_code),
            CUSTOM_ZERO => Self::Custom(0),
            INVALID_ARGUMENT => Self::InvalidArgument,
            INVALID_INSTRUCTION_DATA => Self::InvalidInstructionData,
            PRIVILEGE_VIOLATION => Self::PrivilegeViolation,
            UNKNOWN_ACCOUNT => Self::UnknownAccount,
            CALL_DEPTH_EXCEEDED => Self::CallDepthExceeded,
            HASHING_FAILURE => Self::HashingFailure,
            RECOVER_FAILURE => Self::RecoverFailure,
            ACCOUNT_BORROW_FAILED => Self::AccountBorrowFailed,
            ACCOUNT_DATA_SIZE_CHANGED => Self::AccountDataSizeChanged,
            INVALID_REALLOC => Self::InvalidRealloc,
            ARITHMETIC_OVERFLOW => Self::ArithmeticOverflow,
            UNBALANCED_INSTRUCTION => Self::UnbalancedInstruction,
            REENTRANCY_NOT_ALLOWED => Self::ReentrancyNotAllowed,
            UNSUPPORTED_PROGRAM_ID => Self::UnsupportedProgramId,
            MAX_ACCOUNTS_EXCEEDED => Self::MaxAccountsExceeded,
            MAX_INSTRUCTION_DATA_LEN_EXCEEDED => Self::MaxInstructionDataLenExceeded,
            MAX_INSTRUCTION_TRACE_LENGTH_EXCEEDED => Self::MaxInstructionTraceLengthExceeded,
            _ if status_code >> BUILTIN_BIT_SHIFT == 0 => Self::Custom(status_code as u32),
            _ => return Err(status_code),
        })
    }
}
