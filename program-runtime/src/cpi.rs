//! Cross-program invocation requests and their validation against the caller

use {
    crate::{ic_msg, invoke_context::InvokeContext},
    log::debug,
    paychains_transaction_context::{
        AccountMeta, AccountTable, InstructionAccount, InstructionError, PrivilegeMask,
        MAX_ACCOUNTS_PER_INSTRUCTION, MAX_ACCOUNTS_PER_TRANSACTION, MAX_INSTRUCTION_DATA_LEN,
    },
    solana_pubkey::Pubkey,
    thiserror::Error,
};

/// CPI-specific error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CpiError {
    #[error("Invoked an instruction with too many accounts ({num_accounts} > {max_accounts})")]
    MaxInstructionAccountsExceeded {
        num_accounts: u64,
        max_accounts: u64,
    },
    #[error("Invoked an instruction with data that is too large ({data_len} > {max_data_len})")]
    MaxInstructionDataLenExceeded { data_len: u64, max_data_len: u64 },
    #[error("Program {0} not supported by inner instructions")]
    ProgramNotSupported(Pubkey),
}

impl From<CpiError> for InstructionError {
    fn from(error: CpiError) -> Self {
        match error {
            CpiError::MaxInstructionAccountsExceeded { .. } => {
                InstructionError::MaxAccountsExceeded
            }
            CpiError::MaxInstructionDataLenExceeded { .. } => {
                InstructionError::MaxInstructionDataLenExceeded
            }
            CpiError::ProgramNotSupported(_) => InstructionError::UnsupportedProgramId,
        }
    }
}

/// Check that an instruction's account and data lengths are within limits
pub fn check_instruction_size(num_accounts: usize, data_len: usize) -> Result<(), CpiError> {
    if num_accounts > MAX_ACCOUNTS_PER_INSTRUCTION {
        return Err(CpiError::MaxInstructionAccountsExceeded {
            num_accounts: num_accounts as u64,
            max_accounts: MAX_ACCOUNTS_PER_INSTRUCTION as u64,
        });
    }
    if data_len > MAX_INSTRUCTION_DATA_LEN {
        return Err(CpiError::MaxInstructionDataLenExceeded {
            data_len: data_len as u64,
            max_data_len: MAX_INSTRUCTION_DATA_LEN as u64,
        });
    }
    Ok(())
}

/// A nested invocation as requested by the calling program.
///
/// The requested privileges are only a wish, [`InvokeRequest::validate`]
/// narrows them to what the caller holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokeRequest {
    program_id: Pubkey,
    accounts: Vec<AccountMeta>,
    data: Vec<u8>,
}

impl InvokeRequest {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            accounts: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Appends one account reference, positions keep the order of the calls
    pub fn account(mut self, pubkey: Pubkey, is_signer: bool, is_writable: bool) -> Self {
        self.accounts.push(AccountMeta {
            pubkey,
            is_signer,
            is_writable,
        });
        self
    }

    pub fn accounts(mut self, account_metas: impl IntoIterator<Item = AccountMeta>) -> Self {
        self.accounts.extend(account_metas);
        self
    }

    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn account_metas(&self) -> &[AccountMeta] {
        &self.accounts
    }

    /// Resolves the request against the current frame of `invoke_context`.
    ///
    /// Positions naming the same account get the union of their requested
    /// privileges, which is then intersected with the union the caller holds
    /// for that account. Writable requests beyond the caller's grant are
    /// dropped, signer requests beyond it fail with `PrivilegeViolation`.
    pub fn validate(
        self,
        invoke_context: &InvokeContext,
    ) -> Result<PreparedInvocation, InstructionError> {
        check_instruction_size(self.accounts.len(), self.data.len()).map_err(|err| {
            ic_msg!(invoke_context, "{}", err);
            InstructionError::from(err)
        })?;

        let transaction_context = &*invoke_context.transaction_context;
        let caller = transaction_context.get_current_instruction_context()?;
        let caller_table = caller.account_table();

        let mut indices = Vec::with_capacity(self.accounts.len());
        let mut requested: Vec<Option<PrivilegeMask>> = vec![None; MAX_ACCOUNTS_PER_TRANSACTION];
        for account_meta in self.accounts.iter() {
            let index_in_transaction = transaction_context
                .find_index_of_account(&account_meta.pubkey)
                .filter(|index| caller.get_index_of_account_in_instruction(*index).is_ok())
                .ok_or_else(|| {
                    ic_msg!(
                        invoke_context,
                        "Instruction references an unknown account {}",
                        account_meta.pubkey
                    );
                    InstructionError::UnknownAccount
                })?;
            let merged = requested
                .get_mut(index_in_transaction as usize)
                .ok_or(InstructionError::UnknownAccount)?;
            *merged = Some(
                merged
                    .unwrap_or(PrivilegeMask::READONLY)
                    .union(account_meta.privileges()),
            );
            indices.push(index_in_transaction);
        }

        let mut instruction_accounts = Vec::with_capacity(indices.len());
        for (account_meta, index_in_transaction) in self.accounts.iter().zip(indices) {
            let wanted = requested
                .get(index_in_transaction as usize)
                .copied()
                .flatten()
                .unwrap_or(PrivilegeMask::READONLY);
            let ceiling = caller_table
                .privileges_of(index_in_transaction)
                .ok_or(InstructionError::UnknownAccount)?;
            if wanted.is_signer && !ceiling.is_signer {
                ic_msg!(
                    invoke_context,
                    "{}'s signer privilege escalated",
                    account_meta.pubkey
                );
                return Err(InstructionError::PrivilegeViolation);
            }
            let granted = wanted.intersect(ceiling);
            if granted != wanted {
                debug!(
                    "{}'s writable privilege clamped for program {}",
                    account_meta.pubkey, self.program_id
                );
            }
            instruction_accounts.push(InstructionAccount::with_privileges(
                index_in_transaction,
                granted,
            ));
        }

        if !invoke_context.is_program_registered(&self.program_id) {
            ic_msg!(invoke_context, "Unknown program {}", self.program_id);
            return Err(CpiError::ProgramNotSupported(self.program_id).into());
        }

        Ok(PreparedInvocation {
            program_id: self.program_id,
            account_table: AccountTable::new(instruction_accounts)?,
            instruction_data: self.data,
        })
    }
}

/// An invocation whose account table was checked against the caller
#[derive(Debug)]
pub struct PreparedInvocation {
    program_id: Pubkey,
    account_table: AccountTable,
    instruction_data: Vec<u8>,
}

impl PreparedInvocation {
    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn account_table(&self) -> &AccountTable {
        &self.account_table
    }

    pub fn instruction_data(&self) -> &[u8] {
        &self.instruction_data
    }

    pub(crate) fn into_parts(self) -> (Pubkey, AccountTable, Vec<u8>) {
        (self.program_id, self.account_table, self.instruction_data)
    }
}
