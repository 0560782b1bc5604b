use {
    crate::{
        cpi::{InvokeRequest, PreparedInvocation},
        execution_budget::ExecutionBudget,
        loaded_programs::{BuiltinFunction, ProgramCacheForTxBatch},
        log_collector::LogCollector,
        stable_log,
    },
    paychains_transaction_context::{
        AccountMeta, AccountTable, InstructionError, TransactionContext, MAX_INSTRUCTION_DATA_LEN,
    },
    solana_pubkey::Pubkey,
    std::{cell::RefCell, fmt, rc::Rc},
};
#[cfg(any(test, feature = "dev-context-only-utils"))]
use {
    crate::loaded_programs::ProgramCacheEntry,
    paychains_transaction_context::{AccountRecord, ExecutionRecord, KeyedAccountRecord},
    std::sync::Arc,
};

/// Main pipeline from runtime to program execution.
pub struct InvokeContext<'a> {
    /// Information about the currently executing top-level call.
    pub transaction_context: &'a mut TransactionContext,
    /// The builtin programs which can be dispatched to.
    program_cache_for_tx_batch: &'a ProgramCacheForTxBatch,
    execution_budget: ExecutionBudget,
    log_collector: Option<Rc<RefCell<LogCollector>>>,
}

impl fmt::Debug for InvokeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InvokeContext")
            .field("stack_height", &self.get_stack_height())
            .field("execution_budget", &self.execution_budget)
            .finish()
    }
}

impl<'a> InvokeContext<'a> {
    pub fn new(
        transaction_context: &'a mut TransactionContext,
        program_cache_for_tx_batch: &'a ProgramCacheForTxBatch,
        execution_budget: ExecutionBudget,
        log_collector: Option<Rc<RefCell<LogCollector>>>,
    ) -> Self {
        Self {
            transaction_context,
            program_cache_for_tx_batch,
            execution_budget,
            log_collector,
        }
    }

    /// Push a stack frame onto the invocation stack
    pub fn push(&mut self) -> Result<(), InstructionError> {
        let program_id = *self
            .transaction_context
            .get_next_instruction_context()?
            .get_program_key();
        if self.transaction_context.get_instruction_stack_height() != 0 {
            let contains =
                (0..self.transaction_context.get_instruction_stack_height()).any(|level| {
                    self.transaction_context
                        .get_instruction_context_at_nesting_level(level)
                        .map(|instruction_context| *instruction_context.get_program_key())
                        .map(|program_key| program_key == program_id)
                        .unwrap_or(false)
                });
            let is_last = self
                .transaction_context
                .get_current_instruction_context()
                .map(|instruction_context| *instruction_context.get_program_key() == program_id)
                .unwrap_or(false);
            if contains && !is_last {
                // Reentrancy not allowed unless caller is calling itself
                return Err(InstructionError::ReentrancyNotAllowed);
            }
        }

        self.transaction_context.push()
    }

    /// Pop a stack frame from the invocation stack
    fn pop(&mut self, program_result: &Result<(), InstructionError>) -> Result<(), InstructionError> {
        self.transaction_context.pop(program_result)
    }

    /// Current height of the invocation stack, top level instructions are height 1
    pub fn get_stack_height(&self) -> usize {
        self.transaction_context.get_instruction_stack_height()
    }

    /// Entrypoint for a cross-program invocation from a builtin program
    pub fn invoke(&mut self, request: InvokeRequest) -> Result<(), InstructionError> {
        let prepared = request.validate(self)?;
        self.prepare_next_instruction(prepared)?;
        self.process_instruction()
    }

    /// Helper to prepare for process_instruction() when the instruction is not a top level one
    pub fn prepare_next_instruction(
        &mut self,
        prepared: PreparedInvocation,
    ) -> Result<(), InstructionError> {
        let (program_id, account_table, instruction_data) = prepared.into_parts();
        self.transaction_context
            .configure_next_instruction(program_id, account_table, instruction_data)
    }

    /// Helper to prepare for process_instruction() when the instruction is a top level one.
    ///
    /// Top-level references keep exactly the privileges the host granted them,
    /// aliases are not merged.
    pub fn prepare_next_top_level_instruction(
        &mut self,
        program_id: Pubkey,
        account_metas: &[AccountMeta],
        instruction_data: Vec<u8>,
    ) -> Result<(), InstructionError> {
        if instruction_data.len() > MAX_INSTRUCTION_DATA_LEN {
            return Err(InstructionError::MaxInstructionDataLenExceeded);
        }
        let account_table = AccountTable::build(self.transaction_context.accounts(), account_metas)?;
        self.transaction_context
            .configure_next_instruction(program_id, account_table, instruction_data)
    }

    /// Processes the configured next instruction
    pub fn process_instruction(&mut self) -> Result<(), InstructionError> {
        self.push()?;
        let result = self.process_executable_chain();
        // MUST pop if and only if `push` succeeded, independent of `result`.
        // Thus, the `.and()` instead of an `.and_then()`.
        let pop_result = self.pop(&result);
        result.and(pop_result)
    }

    /// Calls the instruction's program entrypoint method
    fn process_executable_chain(&mut self) -> Result<(), InstructionError> {
        let program_id = *self
            .transaction_context
            .get_current_instruction_context()?
            .get_program_key();
        let entry = self
            .program_cache_for_tx_batch
            .find(&program_id)
            .ok_or(InstructionError::UnsupportedProgramId)?;
        entry.record_invocation();
        let function: BuiltinFunction = entry.function;

        let logger = self.get_log_collector();
        stable_log::program_invoke(&logger, &program_id, self.get_stack_height());
        let result = function(self);
        match &result {
            Ok(()) => stable_log::program_success(&logger, &program_id),
            Err(err) => stable_log::program_failure(&logger, &program_id, err),
        }
        result
    }

    /// Get this invocation's LogCollector
    pub fn get_log_collector(&self) -> Option<Rc<RefCell<LogCollector>>> {
        self.log_collector.clone()
    }

    /// Get this invocation's execution budget
    pub fn get_execution_budget(&self) -> &ExecutionBudget {
        &self.execution_budget
    }

    pub fn get_program_cache(&self) -> &ProgramCacheForTxBatch {
        self.program_cache_for_tx_batch
    }

    pub fn is_program_registered(&self, program_id: &Pubkey) -> bool {
        self.program_cache_for_tx_batch.contains(program_id)
    }
}

#[macro_export]
macro_rules! with_mock_invoke_context {
    (
        $invoke_context:ident,
        $transaction_context:ident,
        $program_cache_for_tx_batch:expr,
        $transaction_accounts:expr $(,)?
    ) => {
        use $crate::{
            __private::TransactionContext, execution_budget::ExecutionBudget,
            invoke_context::InvokeContext, log_collector::LogCollector,
        };
        let execution_budget = ExecutionBudget::new_with_defaults();
        let mut $transaction_context = TransactionContext::new(
            $transaction_accounts,
            execution_budget.max_instruction_stack_depth,
            execution_budget.max_instruction_trace_length,
        )
        .unwrap();
        let program_cache_for_tx_batch = $program_cache_for_tx_batch;
        let mut $invoke_context = InvokeContext::new(
            &mut $transaction_context,
            &program_cache_for_tx_batch,
            execution_budget,
            Some(LogCollector::new_ref_with_limit(
                execution_budget.log_messages_bytes_limit,
            )),
        );
    };
}

/// Runs `builtin_function` as the top-level program `program_id` over the
/// given accounts and returns them as they were left.
#[cfg(any(test, feature = "dev-context-only-utils"))]
pub fn mock_process_instruction<F: FnMut(&mut InvokeContext)>(
    program_id: &Pubkey,
    instruction_data: &[u8],
    transaction_accounts: Vec<KeyedAccountRecord>,
    instruction_account_metas: Vec<AccountMeta>,
    expected_result: Result<(), InstructionError>,
    builtin_function: BuiltinFunction,
    mut post_adjustments: F,
) -> Vec<AccountRecord> {
    let mut program_cache_for_tx_batch = ProgramCacheForTxBatch::default();
    program_cache_for_tx_batch.replenish(
        *program_id,
        Arc::new(ProgramCacheEntry::new_builtin("mock", builtin_function)),
    );
    with_mock_invoke_context!(
        invoke_context,
        transaction_context,
        program_cache_for_tx_batch,
        transaction_accounts
    );
    invoke_context
        .prepare_next_top_level_instruction(
            *program_id,
            &instruction_account_metas,
            instruction_data.to_vec(),
        )
        .unwrap();
    let result = invoke_context.process_instruction();
    assert_eq!(result, expected_result);
    post_adjustments(&mut invoke_context);
    drop(invoke_context);
    ExecutionRecord::try_from(transaction_context)
        .unwrap()
        .accounts
        .into_iter()
        .map(|(_key, account)| account)
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        paychains_transaction_context::{FrameState, MAX_INSTRUCTION_TRACE_LENGTH},
        rand::Rng,
        test_case::test_case,
    };

    const PROGRAM_A: Pubkey = Pubkey::new_from_array([0xaa; 32]);
    const PROGRAM_B: Pubkey = Pubkey::new_from_array([0xbb; 32]);

    const RECURSE: u8 = 0;
    const FORWARD: u8 = 1;
    const NOOP: u8 = 2;
    const BURN: u8 = 3;
    const WRITE_THEN_FAIL: u8 = 4;
    const FORWARD_WRITABLE: u8 = 5;

    // Instructions of the mock program:
    // RECURSE: increments data[0] of account 0 and invokes itself again
    // FORWARD <program id> <rest>: invokes the given program with <rest>
    // NOOP: returns successfully
    // BURN: removes one lamport from account 0
    // WRITE_THEN_FAIL: sets data[0] of account 0 to 0xff and fails
    // FORWARD_WRITABLE <program id> <rest>: like FORWARD, asking for every account writable
    fn mock_builtin(invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
        let instruction_context = invoke_context
            .transaction_context
            .get_current_instruction_context()?;
        let instruction_data = instruction_context.get_instruction_data();
        let program_id = *instruction_context.get_program_key();
        match instruction_data.first().copied() {
            Some(RECURSE) => {
                let key = {
                    let mut account = instruction_context.try_borrow_instruction_account(0)?;
                    let data = account.get_data_mut()?;
                    data[0] = data[0].wrapping_add(1);
                    *account.get_key()
                };
                invoke_context.invoke(
                    InvokeRequest::new(program_id)
                        .account(key, false, true)
                        .data([RECURSE]),
                )
            }
            Some(opcode @ (FORWARD | FORWARD_WRITABLE)) => {
                let callee = Pubkey::try_from(&instruction_data[1..33])
                    .map_err(|_| InstructionError::InvalidInstructionData)?;
                let rest = instruction_data[33..].to_vec();
                let accounts: Vec<AccountMeta> = instruction_context
                    .account_table()
                    .iter()
                    .map(|account| AccountMeta {
                        pubkey: *invoke_context
                            .transaction_context
                            .get_key_of_account_at_index(account.index_in_transaction)
                            .unwrap(),
                        is_signer: account.is_signer(),
                        is_writable: opcode == FORWARD_WRITABLE || account.is_writable(),
                    })
                    .collect();
                invoke_context.invoke(InvokeRequest::new(callee).accounts(accounts).data(rest))
            }
            Some(NOOP) => Ok(()),
            Some(BURN) => instruction_context
                .try_borrow_instruction_account(0)?
                .checked_sub_lamports(1),
            Some(WRITE_THEN_FAIL) => {
                instruction_context
                    .try_borrow_instruction_account(0)?
                    .get_data_mut()?[0] = 0xff;
                Err(InstructionError::Custom(7))
            }
            _ => Err(InstructionError::InvalidInstructionData),
        }
    }

    fn forward(callee: &Pubkey, rest: &[u8]) -> Vec<u8> {
        forward_with(FORWARD, callee, rest)
    }

    fn forward_with(opcode: u8, callee: &Pubkey, rest: &[u8]) -> Vec<u8> {
        let mut data = vec![opcode];
        data.extend_from_slice(callee.as_ref());
        data.extend_from_slice(rest);
        data
    }

    fn program_cache() -> ProgramCacheForTxBatch {
        let mut cache = ProgramCacheForTxBatch::default();
        for program_id in [PROGRAM_A, PROGRAM_B] {
            cache.replenish(
                program_id,
                Arc::new(ProgramCacheEntry::new_builtin("mock", mock_builtin)),
            );
        }
        cache
    }

    // Runs PROGRAM_A at the top level with both mock programs registered
    fn process_with_both_programs<F: FnOnce(&mut InvokeContext)>(
        instruction_data: &[u8],
        transaction_accounts: Vec<KeyedAccountRecord>,
        instruction_account_metas: Vec<AccountMeta>,
        expected_result: Result<(), InstructionError>,
        post_adjustments: F,
    ) -> Vec<AccountRecord> {
        with_mock_invoke_context!(
            invoke_context,
            transaction_context,
            program_cache(),
            transaction_accounts
        );
        invoke_context
            .prepare_next_top_level_instruction(
                PROGRAM_A,
                &instruction_account_metas,
                instruction_data.to_vec(),
            )
            .unwrap();
        assert_eq!(invoke_context.process_instruction(), expected_result);
        post_adjustments(&mut invoke_context);
        drop(invoke_context);
        ExecutionRecord::try_from(transaction_context)
            .unwrap()
            .accounts
            .into_iter()
            .map(|(_key, account)| account)
            .collect()
    }

    fn accounts() -> (Pubkey, Vec<KeyedAccountRecord>) {
        let key = Pubkey::new_unique();
        (key, vec![(key, AccountRecord::new(100, 1, &PROGRAM_A))])
    }

    #[test]
    fn test_recursion_hits_depth_bound_without_rollback() {
        paychains_logger::setup();
        let (key, transaction_accounts) = accounts();
        let accounts = mock_process_instruction(
            &PROGRAM_A,
            &[RECURSE],
            transaction_accounts,
            vec![AccountMeta::new(key, false)],
            Err(InstructionError::CallDepthExceeded),
            mock_builtin,
            |invoke_context| {
                let trace_length = invoke_context.transaction_context.get_instruction_trace_length();
                assert_eq!(
                    trace_length,
                    invoke_context.get_execution_budget().max_instruction_stack_depth
                );
                for index_in_trace in 0..trace_length {
                    let frame = invoke_context
                        .transaction_context
                        .get_instruction_context_at_index_in_trace(index_in_trace)
                        .unwrap();
                    assert_eq!(frame.get_stack_height(), index_in_trace + 1);
                    assert_eq!(frame.get_state(), FrameState::ReturnedErr);
                }
            },
        );
        // Every frame incremented once before the innermost push failed
        assert_eq!(accounts[0].data[0], 5);
    }

    #[test]
    fn test_stable_log_of_nested_call() {
        let (key, transaction_accounts) = accounts();
        process_with_both_programs(
            &forward(&PROGRAM_B, &[NOOP]),
            transaction_accounts,
            vec![AccountMeta::new(key, false)],
            Ok(()),
            |invoke_context| {
                let log_collector = invoke_context.get_log_collector().unwrap();
                assert_eq!(
                    log_collector.borrow().get_recorded_content(),
                    &[
                        format!("Program {PROGRAM_A} invoke [1]"),
                        format!("Program {PROGRAM_B} invoke [2]"),
                        format!("Program {PROGRAM_B} success"),
                        format!("Program {PROGRAM_A} success"),
                    ]
                );
                let callee = invoke_context
                    .transaction_context
                    .get_instruction_context_at_index_in_trace(1)
                    .unwrap();
                assert_eq!(callee.get_caller_program_key(), Some(&PROGRAM_A));
                assert_eq!(
                    invoke_context
                        .get_program_cache()
                        .find(&PROGRAM_B)
                        .unwrap()
                        .get_invocation_count(),
                    1
                );
            },
        );
    }

    #[test]
    fn test_reentrancy() {
        let (key, transaction_accounts) = accounts();
        // A -> B -> A
        process_with_both_programs(
            &forward(&PROGRAM_B, &forward(&PROGRAM_A, &[NOOP])),
            transaction_accounts.clone(),
            vec![AccountMeta::new(key, false)],
            Err(InstructionError::ReentrancyNotAllowed),
            |_invoke_context| {},
        );
        // A -> A -> B
        process_with_both_programs(
            &forward(&PROGRAM_A, &forward(&PROGRAM_B, &[NOOP])),
            transaction_accounts,
            vec![AccountMeta::new(key, false)],
            Ok(()),
            |_invoke_context| {},
        );
    }

    // A -> A -> B -> B, each hop asking for every account writable
    #[test]
    fn test_chained_privileges_stay_within_the_top_level_grant() {
        let mut rng = rand::thread_rng();
        let instruction_data = forward_with(
            FORWARD_WRITABLE,
            &PROGRAM_A,
            &forward_with(
                FORWARD_WRITABLE,
                &PROGRAM_B,
                &forward_with(FORWARD_WRITABLE, &PROGRAM_B, &[NOOP]),
            ),
        );
        for _ in 0..32 {
            let keys: Vec<Pubkey> = (0..3).map(|_| Pubkey::new_unique()).collect();
            let transaction_accounts = keys
                .iter()
                .map(|key| (*key, AccountRecord::new(10, 1, &PROGRAM_A)))
                .collect();
            // Positions pick any of the keys, so any pair may alias
            let metas: Vec<AccountMeta> = (0..5)
                .map(|_| AccountMeta {
                    pubkey: keys[rng.gen_range(0..keys.len())],
                    is_signer: rng.gen(),
                    is_writable: rng.gen(),
                })
                .collect();

            process_with_both_programs(
                &instruction_data,
                transaction_accounts,
                metas,
                Ok(()),
                |invoke_context| {
                    let transaction_context = &invoke_context.transaction_context;
                    assert_eq!(transaction_context.get_instruction_trace_length(), 4);
                    let top_level = transaction_context
                        .get_instruction_context_at_index_in_trace(0)
                        .unwrap();
                    for index_in_trace in 1..4 {
                        let frame = transaction_context
                            .get_instruction_context_at_index_in_trace(index_in_trace)
                            .unwrap();
                        let caller = transaction_context
                            .get_instruction_context_at_index_in_trace(index_in_trace - 1)
                            .unwrap();
                        assert_eq!(frame.get_state(), FrameState::ReturnedOk);
                        assert_eq!(
                            frame.get_number_of_instruction_accounts(),
                            top_level.get_number_of_instruction_accounts()
                        );
                        for account in frame.account_table().iter() {
                            let index_in_transaction = account.index_in_transaction;
                            let granted = top_level
                                .account_table()
                                .privileges_of(index_in_transaction)
                                .unwrap();
                            assert!(account.privileges().is_subset_of(granted));
                            assert!(account.privileges().is_subset_of(
                                caller
                                    .account_table()
                                    .privileges_of(index_in_transaction)
                                    .unwrap()
                            ));
                            // Signers are passed through, writable is clamped
                            assert_eq!(account.privileges(), granted);
                        }
                    }
                },
            );
        }
    }

    #[test]
    fn test_failure_keeps_mutations() {
        let (key, transaction_accounts) = accounts();
        let accounts = process_with_both_programs(
            &forward(&PROGRAM_B, &[WRITE_THEN_FAIL]),
            transaction_accounts,
            vec![AccountMeta::new(key, false)],
            Err(InstructionError::Custom(7)),
            |invoke_context| {
                let log_collector = invoke_context.get_log_collector().unwrap();
                assert_eq!(
                    log_collector.borrow().get_recorded_content().last(),
                    Some(&format!(
                        "Program {PROGRAM_A} failed: custom program error: 0x7"
                    ))
                );
            },
        );
        assert_eq!(accounts[0].data[0], 0xff);
    }

    #[test_case(&[BURN], Err(InstructionError::UnbalancedInstruction); "unbalanced")]
    #[test_case(&[9], Err(InstructionError::InvalidInstructionData); "unknown opcode")]
    #[test_case(&[NOOP], Ok(()); "noop")]
    fn test_top_level_result(instruction_data: &[u8], expected: Result<(), InstructionError>) {
        let (key, transaction_accounts) = accounts();
        mock_process_instruction(
            &PROGRAM_A,
            instruction_data,
            transaction_accounts,
            vec![AccountMeta::new(key, false)],
            expected,
            mock_builtin,
            |_invoke_context| {},
        );
    }

    #[test]
    fn test_unsupported_program() {
        let (key, transaction_accounts) = accounts();
        with_mock_invoke_context!(
            invoke_context,
            transaction_context,
            program_cache(),
            transaction_accounts
        );
        invoke_context
            .prepare_next_top_level_instruction(
                Pubkey::new_unique(),
                &[AccountMeta::new(key, false)],
                vec![],
            )
            .unwrap();
        assert_eq!(
            invoke_context.process_instruction(),
            Err(InstructionError::UnsupportedProgramId)
        );
        assert_eq!(invoke_context.get_stack_height(), 0);
        assert_matches!(
            invoke_context.prepare_next_top_level_instruction(
                PROGRAM_A,
                &[],
                vec![0; MAX_INSTRUCTION_DATA_LEN + 1],
            ),
            Err(InstructionError::MaxInstructionDataLenExceeded)
        );
    }

    #[test]
    fn test_max_instruction_trace_length() {
        let (key, transaction_accounts) = accounts();
        with_mock_invoke_context!(
            invoke_context,
            transaction_context,
            program_cache(),
            transaction_accounts
        );
        for _ in 0..MAX_INSTRUCTION_TRACE_LENGTH {
            invoke_context
                .prepare_next_top_level_instruction(
                    PROGRAM_A,
                    &[AccountMeta::new(key, false)],
                    vec![NOOP],
                )
                .unwrap();
            invoke_context.process_instruction().unwrap();
        }
        invoke_context
            .prepare_next_top_level_instruction(PROGRAM_A, &[], vec![NOOP])
            .unwrap();
        assert_eq!(
            invoke_context.process_instruction(),
            Err(InstructionError::MaxInstructionTraceLengthExceeded)
        );
    }
}
