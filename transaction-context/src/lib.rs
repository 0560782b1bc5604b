//! Data shared between the program runtime and programs.
//!
//! A [`TransactionContext`] owns one storage record per account for the whole
//! top-level call, plus the trace of every frame pushed while executing it.
//! Frames only ever reference that storage through an [`AccountTable`], so
//! every alias of an account, in any frame, observes the same lamports and data.
#![deny(clippy::indexing_slicing)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use {
    account_table::{AccountMeta, AccountTable},
    error::InstructionError,
    instruction::{FrameState, InstructionContext, InstructionFrame},
    instruction_accounts::{BorrowedInstructionAccount, InstructionAccount, PrivilegeMask},
    transaction_accounts::{AccountRecord, KeyedAccountRecord, TransactionAccounts},
};
use {
    log::debug,
    solana_pubkey::Pubkey,
    std::{mem, rc::Rc},
};

pub mod account_table;
pub mod error;
pub mod instruction;
pub mod instruction_accounts;
pub mod transaction_accounts;

pub const MAX_ACCOUNTS_PER_TRANSACTION: usize = 256;
// This is one less than MAX_ACCOUNTS_PER_TRANSACTION because
// one index is used as the non-duplicate marker in the serialized input.
pub const MAX_ACCOUNTS_PER_INSTRUCTION: usize = 255;
pub const MAX_INSTRUCTION_DATA_LEN: usize = 10 * 1024;
pub const MAX_ACCOUNT_DATA_LEN: u64 = 10 * 1024 * 1024;
// Maximum cross-program invocation and instructions per top-level call
pub const MAX_INSTRUCTION_TRACE_LENGTH: usize = 64;

/// Index of an account inside of the transaction or an instruction.
pub type IndexOfAccount = u16;

/// Loaded accounts and frames shared between runtime and programs.
///
/// This context is valid for the entire duration of a top-level call being processed.
#[derive(Debug)]
pub struct TransactionContext {
    accounts: Rc<TransactionAccounts>,
    instruction_stack_capacity: usize,
    instruction_trace_capacity: usize,
    instruction_stack: Vec<usize>,
    instruction_trace: Vec<InstructionFrame>,
}

impl TransactionContext {
    /// Constructs a new TransactionContext
    pub fn new(
        transaction_accounts: Vec<KeyedAccountRecord>,
        instruction_stack_capacity: usize,
        instruction_trace_capacity: usize,
    ) -> Result<Self, InstructionError> {
        Ok(Self {
            accounts: Rc::new(TransactionAccounts::new(transaction_accounts)?),
            instruction_stack_capacity,
            instruction_trace_capacity,
            instruction_stack: Vec::with_capacity(instruction_stack_capacity),
            instruction_trace: vec![InstructionFrame::default()],
        })
    }

    pub fn accounts(&self) -> &Rc<TransactionAccounts> {
        &self.accounts
    }

    /// Returns the total number of accounts loaded in this Transaction
    pub fn get_number_of_accounts(&self) -> IndexOfAccount {
        self.accounts.len() as IndexOfAccount
    }

    /// Searches for an account by its key
    pub fn get_key_of_account_at_index(
        &self,
        index_in_transaction: IndexOfAccount,
    ) -> Result<&Pubkey, InstructionError> {
        self.accounts
            .account_key(index_in_transaction)
            .ok_or(InstructionError::UnknownAccount)
    }

    /// Searches for an account by its key
    pub fn find_index_of_account(&self, pubkey: &Pubkey) -> Option<IndexOfAccount> {
        self.accounts.find_index(pubkey)
    }

    /// Gets the max length of the instruction trace
    pub fn get_instruction_trace_capacity(&self) -> usize {
        self.instruction_trace_capacity
    }

    /// Returns the instruction trace length.
    ///
    /// Not counting the last empty instruction which is always pre-reserved for the next instruction.
    /// See also `get_next_instruction_context()`.
    pub fn get_instruction_trace_length(&self) -> usize {
        self.instruction_trace.len().saturating_sub(1)
    }

    /// Gets a view on an instruction by its index in the trace
    pub fn get_instruction_context_at_index_in_trace(
        &self,
        index_in_trace: usize,
    ) -> Result<InstructionContext<'_>, InstructionError> {
        let frame = self
            .instruction_trace
            .get(index_in_trace)
            .ok_or(InstructionError::CallDepthExceeded)?;
        Ok(InstructionContext {
            transaction_context: self,
            index_in_trace,
            frame,
        })
    }

    /// Gets a view on the instruction by its nesting level in the stack
    pub fn get_instruction_context_at_nesting_level(
        &self,
        nesting_level: usize,
    ) -> Result<InstructionContext<'_>, InstructionError> {
        let index_in_trace = *self
            .instruction_stack
            .get(nesting_level)
            .ok_or(InstructionError::CallDepthExceeded)?;
        let instruction_context = self.get_instruction_context_at_index_in_trace(index_in_trace)?;
        debug_assert_eq!(instruction_context.get_nesting_level(), nesting_level);
        Ok(instruction_context)
    }

    /// Gets the max height of the instruction stack
    pub fn get_instruction_stack_capacity(&self) -> usize {
        self.instruction_stack_capacity
    }

    /// Gets instruction stack height, top-level instructions are height 1
    pub fn get_instruction_stack_height(&self) -> usize {
        self.instruction_stack.len()
    }

    /// Returns a view on the current instruction
    pub fn get_current_instruction_context(
        &self,
    ) -> Result<InstructionContext<'_>, InstructionError> {
        let level = self
            .get_instruction_stack_height()
            .checked_sub(1)
            .ok_or(InstructionError::CallDepthExceeded)?;
        self.get_instruction_context_at_nesting_level(level)
    }

    /// Returns a view on the next instruction. This function assumes it has already been
    /// configured with the correct values in `configure_next_instruction`
    pub fn get_next_instruction_context(
        &self,
    ) -> Result<InstructionContext<'_>, InstructionError> {
        let index_in_trace = self
            .instruction_trace
            .len()
            .checked_sub(1)
            .ok_or(InstructionError::CallDepthExceeded)?;
        self.get_instruction_context_at_index_in_trace(index_in_trace)
    }

    /// Configures the next instruction.
    ///
    /// The last InstructionFrame is always empty and pre-reserved for the next instruction.
    pub fn configure_next_instruction(
        &mut self,
        program_id: Pubkey,
        account_table: AccountTable,
        instruction_data: Vec<u8>,
    ) -> Result<(), InstructionError> {
        let instruction = self
            .instruction_trace
            .last_mut()
            .ok_or(InstructionError::CallDepthExceeded)?;
        instruction.program_id = program_id;
        instruction.account_table = account_table;
        instruction.instruction_data = instruction_data;
        Ok(())
    }

    /// A version of `configure_next_instruction` to help creating the account table in tests
    pub fn configure_next_instruction_for_tests(
        &mut self,
        program_id: Pubkey,
        instruction_accounts: Vec<InstructionAccount>,
        instruction_data: Vec<u8>,
    ) -> Result<(), InstructionError> {
        let account_table = AccountTable::new(instruction_accounts)?;
        self.configure_next_instruction(program_id, account_table, instruction_data)
    }

    /// Pushes the next instruction
    pub fn push(&mut self) -> Result<(), InstructionError> {
        let nesting_level = self.get_instruction_stack_height();
        if nesting_level >= self.instruction_stack_capacity {
            return Err(InstructionError::CallDepthExceeded);
        }
        if !self.instruction_stack.is_empty() && self.accounts.get_lamports_delta() != 0 {
            return Err(InstructionError::UnbalancedInstruction);
        }
        let index_in_trace = self.get_instruction_trace_length();
        if index_in_trace >= self.instruction_trace_capacity {
            return Err(InstructionError::MaxInstructionTraceLengthExceeded);
        }
        let caller_program_id = self
            .get_current_instruction_context()
            .ok()
            .map(|caller| *caller.get_program_key());
        {
            let instruction = self
                .instruction_trace
                .last_mut()
                .ok_or(InstructionError::CallDepthExceeded)?;
            instruction.nesting_level = nesting_level;
            instruction.caller_program_id = caller_program_id;
            instruction.state = FrameState::Executing;
        }
        self.instruction_trace.push(InstructionFrame::default());
        self.instruction_stack.push(index_in_trace);
        debug!(
            "pushed frame {} at nesting level {}",
            index_in_trace, nesting_level
        );
        Ok(())
    }

    /// Pops the current instruction, recording how it returned
    pub fn pop(
        &mut self,
        program_result: &Result<(), InstructionError>,
    ) -> Result<(), InstructionError> {
        let index_in_trace = self
            .instruction_stack
            .pop()
            .ok_or(InstructionError::CallDepthExceeded)?;
        // Verify that the total sum of all lamports did not change
        let detected_an_unbalanced_instruction = self.accounts.get_lamports_delta() != 0;
        let state = if program_result.is_ok() && !detected_an_unbalanced_instruction {
            FrameState::ReturnedOk
        } else {
            FrameState::ReturnedErr
        };
        if let Some(instruction) = self.instruction_trace.get_mut(index_in_trace) {
            instruction.state = state;
        }
        debug!("popped frame {} as {:?}", index_in_trace, state);
        if detected_an_unbalanced_instruction {
            Err(InstructionError::UnbalancedInstruction)
        } else {
            Ok(())
        }
    }

    /// Take ownership of the instruction trace
    pub fn take_instruction_trace(&mut self) -> Vec<InstructionFrame> {
        // The last frame is a placeholder for the next instruction to be executed, so it
        // is empty.
        self.instruction_trace.pop();
        mem::take(&mut self.instruction_trace)
    }
}

/// Everything that needs to be recorded from a TransactionContext after execution
#[derive(Debug)]
pub struct ExecutionRecord {
    pub accounts: Vec<KeyedAccountRecord>,
    pub touched_account_count: u64,
}

/// Used by the host to write back the processed accounts
impl TryFrom<TransactionContext> for ExecutionRecord {
    type Error = InstructionError;

    fn try_from(context: TransactionContext) -> Result<Self, Self::Error> {
        if !context.instruction_stack.is_empty() {
            return Err(InstructionError::CallDepthExceeded);
        }
        let (accounts, touched_flags) = Rc::try_unwrap(context.accounts)
            .map_err(|_| InstructionError::AccountBorrowFailed)?
            .take();
        let touched_account_count = touched_flags
            .iter()
            .fold(0usize, |accumulator, was_touched| {
                accumulator.saturating_add(was_touched.get() as usize)
            }) as u64;
        Ok(Self {
            accounts,
            touched_account_count,
        })
    }
}
