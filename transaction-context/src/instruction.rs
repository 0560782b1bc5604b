use {
    crate::{
        account_table::AccountTable, instruction_accounts::BorrowedInstructionAccount,
        IndexOfAccount, InstructionAccount, InstructionError, TransactionContext,
    },
    solana_pubkey::Pubkey,
    std::collections::HashSet,
};

/// Lifecycle of a frame, terminal once returned
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Entered,
    Executing,
    ReturnedOk,
    ReturnedErr,
}

impl FrameState {
    pub fn is_returned(self) -> bool {
        matches!(self, Self::ReturnedOk | Self::ReturnedErr)
    }
}

/// Instruction shared between runtime and programs.
#[derive(Debug, Clone, Default)]
pub struct InstructionFrame {
    pub nesting_level: usize,
    pub program_id: Pubkey,
    /// The program which invoked this one, `None` for top-level instructions
    pub caller_program_id: Option<Pubkey>,
    pub account_table: AccountTable,
    pub instruction_data: Vec<u8>,
    pub state: FrameState,
}

/// View interface to read instructions.
#[derive(Debug, Clone)]
pub struct InstructionContext<'a> {
    pub(crate) transaction_context: &'a TransactionContext,
    pub(crate) index_in_trace: usize,
    pub(crate) frame: &'a InstructionFrame,
}

impl<'a> InstructionContext<'a> {
    /// How many Instructions were on the trace before this one was pushed
    pub fn get_index_in_trace(&self) -> usize {
        self.index_in_trace
    }

    /// How many Instructions were on the stack after this one was pushed
    ///
    /// That is the number of nested parent Instructions plus one (itself).
    pub fn get_stack_height(&self) -> usize {
        self.frame.nesting_level.saturating_add(1)
    }

    pub fn get_nesting_level(&self) -> usize {
        self.frame.nesting_level
    }

    pub fn get_state(&self) -> FrameState {
        self.frame.state
    }

    /// Number of accounts in this Instruction (without program accounts)
    pub fn get_number_of_instruction_accounts(&self) -> IndexOfAccount {
        self.frame.account_table.len() as IndexOfAccount
    }

    /// Assert that enough accounts were supplied to this Instruction
    pub fn check_number_of_instruction_accounts(
        &self,
        expected_at_least: IndexOfAccount,
    ) -> Result<(), InstructionError> {
        if self.get_number_of_instruction_accounts() < expected_at_least {
            Err(InstructionError::InvalidArgument)
        } else {
            Ok(())
        }
    }

    /// Data parameter for the programs `process_instruction` handler
    pub fn get_instruction_data(&self) -> &'a [u8] {
        &self.frame.instruction_data
    }

    pub fn get_program_key(&self) -> &'a Pubkey {
        &self.frame.program_id
    }

    pub fn get_caller_program_key(&self) -> Option<&'a Pubkey> {
        self.frame.caller_program_id.as_ref()
    }

    pub fn account_table(&self) -> &'a AccountTable {
        &self.frame.account_table
    }

    pub fn instruction_accounts(&self) -> &'a [InstructionAccount] {
        self.frame.account_table.instruction_accounts()
    }

    /// Translates the given instruction wide instruction_account_index into a transaction wide index
    pub fn get_index_of_instruction_account_in_transaction(
        &self,
        instruction_account_index: IndexOfAccount,
    ) -> Result<IndexOfAccount, InstructionError> {
        Ok(self
            .frame
            .account_table
            .get(instruction_account_index)
            .ok_or(InstructionError::UnknownAccount)?
            .index_in_transaction)
    }

    /// Get the index of account in instruction from the index in transaction
    pub fn get_index_of_account_in_instruction(
        &self,
        index_in_transaction: IndexOfAccount,
    ) -> Result<IndexOfAccount, InstructionError> {
        self.frame
            .account_table
            .position_of(index_in_transaction)
            .ok_or(InstructionError::UnknownAccount)
    }

    /// Returns `Some(instruction_account_index)` if this is a duplicate
    /// and `None` if it is the first account with this key
    pub fn is_instruction_account_duplicate(
        &self,
        instruction_account_index: IndexOfAccount,
    ) -> Result<Option<IndexOfAccount>, InstructionError> {
        self.frame
            .account_table
            .is_duplicate(instruction_account_index)
    }

    /// Gets an instruction account of this Instruction
    pub fn try_borrow_instruction_account(
        &self,
        index_in_instruction: IndexOfAccount,
    ) -> Result<BorrowedInstructionAccount<'a>, InstructionError> {
        let instruction_account = *self
            .frame
            .account_table
            .get(index_in_instruction)
            .ok_or(InstructionError::UnknownAccount)?;
        let accounts = self.transaction_context.accounts().as_ref();
        let key = self
            .transaction_context
            .get_key_of_account_at_index(instruction_account.index_in_transaction)?;
        let account = accounts.try_borrow_mut(instruction_account.index_in_transaction)?;

        Ok(BorrowedInstructionAccount {
            accounts,
            account,
            key,
            instruction_account,
            index_in_instruction,
            program_id: &self.frame.program_id,
        })
    }

    /// Returns whether an instruction account is a signer
    pub fn is_instruction_account_signer(
        &self,
        instruction_account_index: IndexOfAccount,
    ) -> Result<bool, InstructionError> {
        Ok(self
            .frame
            .account_table
            .get(instruction_account_index)
            .ok_or(InstructionError::UnknownAccount)?
            .is_signer())
    }

    /// Returns whether an instruction account is writable
    pub fn is_instruction_account_writable(
        &self,
        instruction_account_index: IndexOfAccount,
    ) -> Result<bool, InstructionError> {
        Ok(self
            .frame
            .account_table
            .get(instruction_account_index)
            .ok_or(InstructionError::UnknownAccount)?
            .is_writable())
    }

    /// Calculates the set of all keys of signer instruction accounts in this Instruction
    pub fn get_signers(&self) -> Result<HashSet<Pubkey>, InstructionError> {
        let mut result = HashSet::new();
        for instruction_account in self.frame.account_table.iter() {
            if instruction_account.is_signer() {
                result.insert(
                    *self
                        .transaction_context
                        .get_key_of_account_at_index(instruction_account.index_in_transaction)?,
                );
            }
        }
        Ok(result)
    }

    pub fn get_key_of_instruction_account(
        &self,
        index_in_instruction: IndexOfAccount,
    ) -> Result<&'a Pubkey, InstructionError> {
        self.get_index_of_instruction_account_in_transaction(index_in_instruction)
            .and_then(|idx| self.transaction_context.get_key_of_account_at_index(idx))
    }
}
