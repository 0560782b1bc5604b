use {
    paychains_transaction_context::MAX_INSTRUCTION_TRACE_LENGTH,
    serde_derive::{Deserialize, Serialize},
};

/// Max instruction stack depth. This is the maximum nesting of instructions that can happen during
/// a top-level call.
pub const MAX_INSTRUCTION_STACK_DEPTH: usize = 5;

/// Default number of slices the hashing syscall accepts in one call
pub const DEFAULT_HASH_MAX_SLICES: u64 = 20_000;

/// Default byte limit of the program log of one top-level call
pub const DEFAULT_LOG_MESSAGES_BYTES_LIMIT: usize = 10 * 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionBudget {
    /// Maximum program instruction invocation stack depth. Invocation stack
    /// depth starts at 1 for top-level instructions and the stack depth is
    /// incremented each time a program invokes an instruction and decremented
    /// when a program returns.
    pub max_instruction_stack_depth: usize,
    /// Maximum cross-program invocations and instructions per top-level call
    pub max_instruction_trace_length: usize,
    /// Maximum number of slices hashed per syscall
    pub max_hash_slices: u64,
    /// Byte limit of the program log, `None` for unlimited
    pub log_messages_bytes_limit: Option<usize>,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self::new_with_defaults()
    }
}

impl ExecutionBudget {
    pub const fn new_with_defaults() -> Self {
        ExecutionBudget {
            max_instruction_stack_depth: MAX_INSTRUCTION_STACK_DEPTH,
            max_instruction_trace_length: MAX_INSTRUCTION_TRACE_LENGTH,
            max_hash_slices: DEFAULT_HASH_MAX_SLICES,
            log_messages_bytes_limit: Some(DEFAULT_LOG_MESSAGES_BYTES_LIMIT),
        }
    }
}
