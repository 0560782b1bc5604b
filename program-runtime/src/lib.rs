#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::indexing_slicing)]

pub mod cpi;
pub mod entrypoint;
pub mod execution_budget;
pub mod invoke_context;
pub mod loaded_programs;
pub mod log_collector;
pub mod serialization;
pub mod stable_log;

// re-exports for macros
pub mod __private {
    pub use {
        log, paychains_transaction_context::InstructionError,
        paychains_transaction_context::TransactionContext,
    };
}
