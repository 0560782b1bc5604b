//! Primitives a program may call while it executes: content hashing, public
//! key recovery and program logging.
//!
//! The bare functions ([`blake3_hashv`], [`secp256k1_recover`]) report their
//! own error types, the `sol_*` wrappers run against an [`InvokeContext`],
//! log failures to the program log and surface them as `InstructionError`.
pub use self::logging::{sol_log, sol_log_pubkey, sol_log_u64, sol_log_utf8};
use {
    paychains_program_runtime::{
        execution_budget::ExecutionBudget, ic_msg, invoke_context::InvokeContext,
    },
    paychains_transaction_context::InstructionError,
    std::str::Utf8Error,
    thiserror::Error as ThisError,
};

mod logging;

/// Length of the hash a signature was produced over
pub const HASH_BYTES: usize = 32;
/// Length of a recovered public key, without the leading `0x04` tag
pub const SECP256K1_PUBLIC_KEY_LENGTH: usize = 64;
/// Length of a compact signature
pub const SECP256K1_SIGNATURE_LENGTH: usize = 64;

/// Error definitions
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum SyscallError {
    #[error("{0}: {1:?}")]
    InvalidString(Utf8Error, Vec<u8>),
    #[error("Hashing too many sequences")]
    TooManySlices,
}

/// Reasons public key recovery fails, the values are part of the program ABI
#[derive(Clone, Copy, Debug, ThisError, PartialEq, Eq)]
pub enum Secp256k1RecoverError {
    #[error("The hash provided to a secp256k1_recover is invalid")]
    InvalidHash = 1,
    #[error("The recovery_id provided to a secp256k1_recover is invalid")]
    InvalidRecoveryId = 2,
    #[error("The signature provided to a secp256k1_recover is invalid")]
    InvalidSignature = 3,
}

impl From<Secp256k1RecoverError> for u64 {
    fn from(error: Secp256k1RecoverError) -> Self {
        error as u64
    }
}

trait HasherImpl {
    const NAME: &'static str;
    type Output;

    fn create_hasher() -> Self;
    fn hash(&mut self, val: &[u8]);
    fn result(self) -> Self::Output;
    fn get_max_slices(execution_budget: &ExecutionBudget) -> u64;
}

struct Blake3Hasher(blake3::Hasher);

impl HasherImpl for Blake3Hasher {
    const NAME: &'static str = "Blake3";
    type Output = blake3::Hash;

    fn create_hasher() -> Self {
        Blake3Hasher(blake3::Hasher::new())
    }

    fn hash(&mut self, val: &[u8]) {
        self.0.update(val);
    }

    fn result(self) -> Self::Output {
        self.0.finalize()
    }

    fn get_max_slices(execution_budget: &ExecutionBudget) -> u64 {
        execution_budget.max_hash_slices
    }
}

fn hashv<H: HasherImpl>(vals: &[&[u8]], max_slices: u64) -> Result<H::Output, SyscallError> {
    if vals.len() as u64 > max_slices {
        return Err(SyscallError::TooManySlices);
    }
    let mut hasher = H::create_hasher();
    for val in vals {
        hasher.hash(val);
    }
    Ok(hasher.result())
}

/// Hashes the concatenation of `vals`.
///
/// Fails with [`SyscallError::TooManySlices`] if more than `max_slices`
/// buffers are passed.
pub fn blake3_hashv(vals: &[&[u8]], max_slices: u64) -> Result<[u8; HASH_BYTES], SyscallError> {
    hashv::<Blake3Hasher>(vals, max_slices).map(|hash| *hash.as_bytes())
}

/// Recovers the public key which produced `signature` over `hash`.
///
/// Only recovery ids 0 and 1 are accepted.
pub fn secp256k1_recover(
    hash: &[u8],
    recovery_id: u64,
    signature: &[u8],
) -> Result<[u8; SECP256K1_PUBLIC_KEY_LENGTH], Secp256k1RecoverError> {
    if hash.len() != HASH_BYTES {
        return Err(Secp256k1RecoverError::InvalidHash);
    }
    let Ok(message) = libsecp256k1::Message::parse_slice(hash) else {
        return Err(Secp256k1RecoverError::InvalidHash);
    };
    let adjusted_recover_id_val = match u8::try_from(recovery_id) {
        Ok(value @ (0 | 1)) => value,
        _ => return Err(Secp256k1RecoverError::InvalidRecoveryId),
    };
    let Ok(recovery_id) = libsecp256k1::RecoveryId::parse(adjusted_recover_id_val) else {
        return Err(Secp256k1RecoverError::InvalidRecoveryId);
    };
    if signature.len() != SECP256K1_SIGNATURE_LENGTH {
        return Err(Secp256k1RecoverError::InvalidSignature);
    }
    let Ok(signature) = libsecp256k1::Signature::parse_standard_slice(signature) else {
        return Err(Secp256k1RecoverError::InvalidSignature);
    };

    let public_key = libsecp256k1::recover(&message, &signature, &recovery_id)
        .map_err(|_| Secp256k1RecoverError::InvalidSignature)?
        .serialize();
    let mut result = [0u8; SECP256K1_PUBLIC_KEY_LENGTH];
    result.copy_from_slice(
        public_key
            .get(1..)
            .ok_or(Secp256k1RecoverError::InvalidSignature)?,
    );
    Ok(result)
}

/// Hashes `vals` within the slice limit of the current execution budget
pub fn sol_blake3(
    invoke_context: &InvokeContext,
    vals: &[&[u8]],
) -> Result<[u8; HASH_BYTES], InstructionError> {
    let hash_max_slices = Blake3Hasher::get_max_slices(invoke_context.get_execution_budget());
    blake3_hashv(vals, hash_max_slices).map_err(|err| {
        ic_msg!(
            invoke_context,
            "{} Hashing {} sequences in one syscall is over the limit {}",
            Blake3Hasher::NAME,
            vals.len(),
            hash_max_slices,
        );
        log::debug!("sol_blake3 failed: {}", err);
        InstructionError::HashingFailure
    })
}

/// Recovers a public key on behalf of the current program
pub fn sol_secp256k1_recover(
    invoke_context: &InvokeContext,
    hash: &[u8],
    recovery_id: u64,
    signature: &[u8],
) -> Result<[u8; SECP256K1_PUBLIC_KEY_LENGTH], InstructionError> {
    secp256k1_recover(hash, recovery_id, signature).map_err(|err| {
        ic_msg!(invoke_context, "secp256k1_recover failed: {}", err);
        InstructionError::RecoverFailure
    })
}
