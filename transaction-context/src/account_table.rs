use {
    crate::{
        instruction_accounts::{InstructionAccount, PrivilegeMask},
        transaction_accounts::TransactionAccounts,
        IndexOfAccount, InstructionError, MAX_ACCOUNTS_PER_INSTRUCTION,
        MAX_ACCOUNTS_PER_TRANSACTION,
    },
    log::trace,
    solana_pubkey::Pubkey,
};

/// Marks an entry of the dedup map whose account is not in the table
const NOT_IN_TABLE: u16 = u16::MAX;

/// Describes a single account reference of an instruction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    /// A writable reference
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }

    pub fn privileges(&self) -> PrivilegeMask {
        PrivilegeMask::new(self.is_signer, self.is_writable)
    }
}

/// The ordered accounts visible to one frame.
///
/// Positions keep the order of the raw references they were built from. The
/// first position naming an account is canonical, later ones are aliases and
/// share its storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountTable {
    instruction_accounts: Vec<InstructionAccount>,
    /// Maps index_in_transaction to the first position naming that account
    /// Usage: dedup_map[index_in_transaction] = index_in_instruction
    dedup_map: Vec<u16>,
}

impl Default for AccountTable {
    fn default() -> Self {
        Self {
            instruction_accounts: Vec::new(),
            dedup_map: vec![NOT_IN_TABLE; MAX_ACCOUNTS_PER_TRANSACTION],
        }
    }
}

impl AccountTable {
    pub fn new(instruction_accounts: Vec<InstructionAccount>) -> Result<Self, InstructionError> {
        if instruction_accounts.len() > MAX_ACCOUNTS_PER_INSTRUCTION {
            return Err(InstructionError::MaxAccountsExceeded);
        }
        let mut dedup_map = vec![NOT_IN_TABLE; MAX_ACCOUNTS_PER_TRANSACTION];
        for (index_in_instruction, instruction_account) in instruction_accounts.iter().enumerate() {
            let first = dedup_map
                .get_mut(instruction_account.index_in_transaction as usize)
                .ok_or(InstructionError::UnknownAccount)?;
            if *first == NOT_IN_TABLE {
                *first = index_in_instruction as u16;
            } else {
                trace!(
                    "position {} aliases position {}",
                    index_in_instruction,
                    *first
                );
            }
        }
        Ok(Self {
            instruction_accounts,
            dedup_map,
        })
    }

    /// Resolves raw references against the shared storage, keeping their
    /// order and their privileges
    pub fn build(
        accounts: &TransactionAccounts,
        account_metas: &[AccountMeta],
    ) -> Result<Self, InstructionError> {
        if account_metas.len() > MAX_ACCOUNTS_PER_INSTRUCTION {
            return Err(InstructionError::MaxAccountsExceeded);
        }
        let instruction_accounts = account_metas
            .iter()
            .map(|account_meta| {
                accounts
                    .find_index(&account_meta.pubkey)
                    .map(|index_in_transaction| {
                        InstructionAccount::with_privileges(
                            index_in_transaction,
                            account_meta.privileges(),
                        )
                    })
                    .ok_or(InstructionError::UnknownAccount)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(instruction_accounts)
    }

    pub fn len(&self) -> usize {
        self.instruction_accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruction_accounts.is_empty()
    }

    pub fn get(&self, index_in_instruction: IndexOfAccount) -> Option<&InstructionAccount> {
        self.instruction_accounts.get(index_in_instruction as usize)
    }

    pub fn instruction_accounts(&self) -> &[InstructionAccount] {
        &self.instruction_accounts
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstructionAccount> {
        self.instruction_accounts.iter()
    }

    /// The first position naming the given account, if any
    pub fn position_of(&self, index_in_transaction: IndexOfAccount) -> Option<IndexOfAccount> {
        self.dedup_map
            .get(index_in_transaction as usize)
            .filter(|index| (**index as usize) < self.instruction_accounts.len())
            .map(|index| *index as IndexOfAccount)
    }

    /// Returns `Some(first_position)` if the position is an alias
    /// and `None` if it is the first position with this account
    pub fn is_duplicate(
        &self,
        index_in_instruction: IndexOfAccount,
    ) -> Result<Option<IndexOfAccount>, InstructionError> {
        let index_in_transaction = self
            .get(index_in_instruction)
            .ok_or(InstructionError::UnknownAccount)?
            .index_in_transaction;
        let first = self
            .position_of(index_in_transaction)
            .ok_or(InstructionError::UnknownAccount)?;
        Ok((first != index_in_instruction).then_some(first))
    }

    /// Union of the privileges of every position naming the given account
    pub fn privileges_of(&self, index_in_transaction: IndexOfAccount) -> Option<PrivilegeMask> {
        self.position_of(index_in_transaction)?;
        Some(
            self.instruction_accounts
                .iter()
                .filter(|account| account.index_in_transaction == index_in_transaction)
                .fold(PrivilegeMask::READONLY, |mask, account| {
                    mask.union(account.privileges())
                }),
        )
    }
}
