//! Host side entrypoint running one top-level call from a serialized input buffer

use {
    crate::{
        execution_budget::ExecutionBudget, invoke_context::InvokeContext,
        loaded_programs::ProgramCacheForTxBatch, log_collector::LogCollector,
        serialization::deserialize_parameters,
    },
    log::debug,
    paychains_transaction_context::{
        error::SUCCESS, ExecutionRecord, InstructionError, TransactionContext,
    },
    std::rc::Rc,
};

/// What a top-level call left behind
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Result of the program, mutations are kept either way
    pub result: Result<(), InstructionError>,
    pub record: ExecutionRecord,
    /// Program log, if recording was enabled
    pub log_messages: Option<Vec<String>>,
}

/// Deserializes `input`, runs the named program over it and returns the
/// resulting accounts.
///
/// Errors in the input itself are returned as `Err`, errors of the program
/// are reported in [`ExecutionOutcome::result`]. With `enable_log_recording`
/// the program log is collected up to the byte limit of `execution_budget`.
pub fn execute_serialized_input(
    input: &[u8],
    program_cache_for_tx_batch: &ProgramCacheForTxBatch,
    execution_budget: ExecutionBudget,
    enable_log_recording: bool,
) -> Result<ExecutionOutcome, InstructionError> {
    let parameters = deserialize_parameters(input)?;
    let log_collector = enable_log_recording
        .then(|| LogCollector::new_ref_with_limit(execution_budget.log_messages_bytes_limit));
    let mut transaction_context = TransactionContext::new(
        parameters.accounts,
        execution_budget.max_instruction_stack_depth,
        execution_budget.max_instruction_trace_length,
    )?;
    let result = {
        let mut invoke_context = InvokeContext::new(
            &mut transaction_context,
            program_cache_for_tx_batch,
            execution_budget,
            log_collector.clone(),
        );
        invoke_context.prepare_next_top_level_instruction(
            parameters.program_id,
            &parameters.account_metas,
            parameters.instruction_data,
        )?;
        invoke_context.process_instruction()
    };
    debug!(
        "program {} returned {:?} after {} frames",
        parameters.program_id,
        result,
        transaction_context.get_instruction_trace_length()
    );
    let log_messages = log_collector
        .and_then(|log_collector| Rc::try_unwrap(log_collector).ok())
        .map(|log_collector| log_collector.into_inner().into_messages());
    Ok(ExecutionOutcome {
        result,
        record: ExecutionRecord::try_from(transaction_context)?,
        log_messages,
    })
}

/// Like [`execute_serialized_input`] but reports the result as a status code
pub fn process_serialized_input(
    input: &[u8],
    program_cache_for_tx_batch: &ProgramCacheForTxBatch,
    execution_budget: ExecutionBudget,
) -> u64 {
    match execute_serialized_input(input, program_cache_for_tx_batch, execution_budget, false)
    .and_then(|outcome| outcome.result)
    {
        Ok(()) => SUCCESS,
        Err(err) => err.into(),
    }
}
