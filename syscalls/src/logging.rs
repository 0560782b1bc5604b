use {
    crate::SyscallError,
    paychains_program_runtime::{invoke_context::InvokeContext, stable_log},
    solana_pubkey::Pubkey,
    std::str::from_utf8,
};

/// Log a string on behalf of the current program
pub fn sol_log(invoke_context: &InvokeContext, message: &str) {
    stable_log::program_log(&invoke_context.get_log_collector(), message);
}

/// Log raw bytes which must be valid UTF-8
pub fn sol_log_utf8(invoke_context: &InvokeContext, bytes: &[u8]) -> Result<(), SyscallError> {
    let message =
        from_utf8(bytes).map_err(|err| SyscallError::InvalidString(err, bytes.to_vec()))?;
    sol_log(invoke_context, message);
    Ok(())
}

/// Log 5 64-bit values
pub fn sol_log_u64(invoke_context: &InvokeContext, args: [u64; 5]) {
    let [arg1, arg2, arg3, arg4, arg5] = args;
    sol_log(
        invoke_context,
        &format!("{arg1:#x}, {arg2:#x}, {arg3:#x}, {arg4:#x}, {arg5:#x}"),
    );
}

/// Log a [`Pubkey`] as a base58 string
pub fn sol_log_pubkey(invoke_context: &InvokeContext, pubkey: &Pubkey) {
    sol_log(invoke_context, &pubkey.to_string());
}
