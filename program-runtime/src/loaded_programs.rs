use {
    crate::invoke_context::InvokeContext,
    log::debug,
    paychains_transaction_context::InstructionError,
    solana_pubkey::Pubkey,
    std::{
        collections::HashMap,
        fmt::{self, Debug, Formatter},
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    },
};

/// Entry point of a program which is run natively by the dispatcher
pub type BuiltinFunction = fn(&mut InvokeContext<'_>) -> Result<(), InstructionError>;

/// A builtin program registered under a program id
pub struct ProgramCacheEntry {
    pub name: &'static str,
    pub function: BuiltinFunction,
    /// How often this entry was dispatched to
    pub invocation_count: AtomicU64,
}

impl Debug for ProgramCacheEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramCacheEntry")
            .field("name", &self.name)
            .field("invocation_count", &self.invocation_count)
            .finish()
    }
}

impl ProgramCacheEntry {
    /// Creates a new built-in program
    pub fn new_builtin(name: &'static str, function: BuiltinFunction) -> Self {
        Self {
            name,
            function,
            invocation_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_invocation(&self) {
        self.invocation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_invocation_count(&self) -> u64 {
        self.invocation_count.load(Ordering::Relaxed)
    }
}

/// The programs available to one top-level call
#[derive(Debug, Default)]
pub struct ProgramCacheForTxBatch {
    entries: HashMap<Pubkey, Arc<ProgramCacheEntry>>,
}

impl ProgramCacheForTxBatch {
    /// Refill the cache with a single entry.
    ///
    /// Returns `(true, existing)` if the key was already registered, in which
    /// case the existing entry is kept.
    pub fn replenish(
        &mut self,
        key: Pubkey,
        entry: Arc<ProgramCacheEntry>,
    ) -> (bool, Arc<ProgramCacheEntry>) {
        if let Some(existing) = self.entries.get(&key) {
            return (true, existing.clone());
        }
        debug!("registered builtin {} as {}", entry.name, key);
        self.entries.insert(key, entry.clone());
        (false, entry)
    }

    pub fn find(&self, key: &Pubkey) -> Option<Arc<ProgramCacheEntry>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &Pubkey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
        Ok(())
    }

    fn fail(_invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
        Err(InstructionError::InvalidInstructionData)
    }

    #[test]
    fn test_replenish_keeps_first_entry() {
        let mut cache = ProgramCacheForTxBatch::default();
        let key = Pubkey::new_unique();
        let (existed, first) =
            cache.replenish(key, Arc::new(ProgramCacheEntry::new_builtin("noop", noop)));
        assert!(!existed);
        let (existed, kept) =
            cache.replenish(key, Arc::new(ProgramCacheEntry::new_builtin("fail", fail)));
        assert!(existed);
        assert!(Arc::ptr_eq(&first, &kept));
        assert_eq!(cache.find(&key).unwrap().name, "noop");
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key));
        assert!(cache.find(&Pubkey::new_unique()).is_none());
    }
}
