use {
    crate::{
        transaction_accounts::{AccountRecord, TransactionAccounts},
        IndexOfAccount, InstructionError, MAX_ACCOUNT_DATA_LEN,
    },
    solana_pubkey::Pubkey,
    std::cell::RefMut,
};

/// Signer and writable grants attached to one position of an account table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PrivilegeMask {
    pub is_signer: bool,
    pub is_writable: bool,
}

impl PrivilegeMask {
    pub const READONLY: Self = Self::new(false, false);

    pub const fn new(is_signer: bool, is_writable: bool) -> Self {
        Self {
            is_signer,
            is_writable,
        }
    }

    /// Grants held by either mask
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            is_signer: self.is_signer || other.is_signer,
            is_writable: self.is_writable || other.is_writable,
        }
    }

    /// Narrows `self` to what `ceiling` allows
    #[must_use]
    pub fn intersect(self, ceiling: Self) -> Self {
        Self {
            is_signer: self.is_signer && ceiling.is_signer,
            is_writable: self.is_writable && ceiling.is_writable,
        }
    }

    pub fn is_subset_of(self, other: Self) -> bool {
        (!self.is_signer || other.is_signer) && (!self.is_writable || other.is_writable)
    }
}

/// One position of an account table.
///
/// Points into the shared [`TransactionAccounts`] storage, so several
/// positions naming the same account all read and write one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionAccount {
    /// Points to the account and its key in the `TransactionContext`
    pub index_in_transaction: IndexOfAccount,
    privileges: PrivilegeMask,
}

impl InstructionAccount {
    pub fn new(
        index_in_transaction: IndexOfAccount,
        is_signer: bool,
        is_writable: bool,
    ) -> InstructionAccount {
        InstructionAccount {
            index_in_transaction,
            privileges: PrivilegeMask::new(is_signer, is_writable),
        }
    }

    pub fn with_privileges(
        index_in_transaction: IndexOfAccount,
        privileges: PrivilegeMask,
    ) -> InstructionAccount {
        InstructionAccount {
            index_in_transaction,
            privileges,
        }
    }

    pub fn privileges(&self) -> PrivilegeMask {
        self.privileges
    }

    pub fn is_signer(&self) -> bool {
        self.privileges.is_signer
    }

    pub fn is_writable(&self) -> bool {
        self.privileges.is_writable
    }
}

/// Shared account borrowed from the TransactionContext and an InstructionContext.
///
/// Holds the only mutable borrow of the underlying record, so an alias of the
/// same account can not be borrowed until this one is dropped.
#[derive(Debug)]
pub struct BorrowedInstructionAccount<'a> {
    pub(crate) accounts: &'a TransactionAccounts,
    pub(crate) account: RefMut<'a, AccountRecord>,
    pub(crate) key: &'a Pubkey,
    pub(crate) instruction_account: InstructionAccount,
    pub(crate) index_in_instruction: IndexOfAccount,
    pub(crate) program_id: &'a Pubkey,
}

impl BorrowedInstructionAccount<'_> {
    /// Returns the index of this account (transaction wide)
    #[inline]
    pub fn get_index_in_transaction(&self) -> IndexOfAccount {
        self.instruction_account.index_in_transaction
    }

    /// Returns the position of this account (instruction wide)
    #[inline]
    pub fn get_index_in_instruction(&self) -> IndexOfAccount {
        self.index_in_instruction
    }

    /// Returns the public key of this account (transaction wide)
    #[inline]
    pub fn get_key(&self) -> &Pubkey {
        self.key
    }

    /// Returns the owner of this account (transaction wide)
    #[inline]
    pub fn get_owner(&self) -> &Pubkey {
        &self.account.owner
    }

    /// Returns the number of lamports of this account (transaction wide)
    #[inline]
    pub fn get_lamports(&self) -> u64 {
        self.account.lamports
    }

    /// Overwrites the number of lamports of this account (transaction wide)
    pub fn set_lamports(&mut self, lamports: u64) -> Result<(), InstructionError> {
        self.check_writable()?;
        // don't touch the account if the lamports do not change
        let old_lamports = self.get_lamports();
        if old_lamports == lamports {
            return Ok(());
        }

        let lamports_balance = (lamports as i128).saturating_sub(old_lamports as i128);
        self.accounts.add_lamports_delta(lamports_balance)?;

        self.touch()?;
        self.account.lamports = lamports;
        Ok(())
    }

    /// Adds lamports to this account (transaction wide)
    pub fn checked_add_lamports(&mut self, lamports: u64) -> Result<(), InstructionError> {
        self.set_lamports(
            self.get_lamports()
                .checked_add(lamports)
                .ok_or(InstructionError::ArithmeticOverflow)?,
        )
    }

    /// Subtracts lamports from this account (transaction wide)
    pub fn checked_sub_lamports(&mut self, lamports: u64) -> Result<(), InstructionError> {
        self.set_lamports(
            self.get_lamports()
                .checked_sub(lamports)
                .ok_or(InstructionError::ArithmeticOverflow)?,
        )
    }

    /// Returns a read-only slice of the account data (transaction wide)
    #[inline]
    pub fn get_data(&self) -> &[u8] {
        &self.account.data
    }

    /// Returns a writable slice of the account data (transaction wide)
    pub fn get_data_mut(&mut self) -> Result<&mut [u8], InstructionError> {
        self.check_writable()?;
        self.touch()?;
        Ok(self.account.data.as_mut_slice())
    }

    /// Overwrites the account data and size (transaction wide)
    pub fn set_data_from_slice(&mut self, data: &[u8]) -> Result<(), InstructionError> {
        self.can_data_be_resized(data.len())?;
        self.touch()?;
        let account_data = &mut self.account.data;
        account_data.clear();
        account_data.extend_from_slice(data);
        Ok(())
    }

    /// Resizes the account data (transaction wide)
    ///
    /// Fills it with zeros at the end if is extended or truncates at the end otherwise.
    pub fn set_data_length(&mut self, new_length: usize) -> Result<(), InstructionError> {
        self.can_data_be_resized(new_length)?;
        // don't touch the account if the length does not change
        if self.get_data().len() == new_length {
            return Ok(());
        }
        self.touch()?;
        self.account.data.resize(new_length, 0);
        Ok(())
    }

    /// Returns whether this account is executable (transaction wide)
    #[inline]
    pub fn is_executable(&self) -> bool {
        self.account.executable
    }

    /// Returns whether this account is a signer (instruction wide)
    pub fn is_signer(&self) -> bool {
        self.instruction_account.is_signer()
    }

    /// Returns whether this account is writable (instruction wide)
    pub fn is_writable(&self) -> bool {
        self.instruction_account.is_writable()
    }

    pub fn check_signer(&self) -> Result<(), InstructionError> {
        if self.is_signer() {
            Ok(())
        } else {
            Err(InstructionError::PrivilegeViolation)
        }
    }

    pub fn check_writable(&self) -> Result<(), InstructionError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(InstructionError::PrivilegeViolation)
        }
    }

    /// Returns true if the owner of this account is the program of the current frame
    pub fn is_owned_by_current_program(&self) -> bool {
        self.get_owner() == self.program_id
    }

    /// Returns an error if the account data can not be resized to the given length
    pub fn can_data_be_resized(&self, new_len: usize) -> Result<(), InstructionError> {
        let old_len = self.get_data().len();
        // Only the owner can change the length of the data
        if new_len != old_len && !self.is_owned_by_current_program() {
            return Err(InstructionError::AccountDataSizeChanged);
        }
        // The new length can not exceed the maximum permitted length
        if new_len > MAX_ACCOUNT_DATA_LEN as usize {
            return Err(InstructionError::InvalidRealloc);
        }
        self.check_writable()
    }

    fn touch(&self) -> Result<(), InstructionError> {
        self.accounts
            .touch(self.instruction_account.index_in_transaction)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    #[test_case(PrivilegeMask::new(true, true), PrivilegeMask::new(true, false), PrivilegeMask::new(true, false))]
    #[test_case(PrivilegeMask::new(false, true), PrivilegeMask::new(true, true), PrivilegeMask::new(false, true))]
    #[test_case(PrivilegeMask::new(true, true), PrivilegeMask::READONLY, PrivilegeMask::READONLY)]
    fn test_intersect(requested: PrivilegeMask, ceiling: PrivilegeMask, expected: PrivilegeMask) {
        let clamped = requested.intersect(ceiling);
        assert_eq!(clamped, expected);
        assert!(clamped.is_subset_of(ceiling));
        assert!(clamped.is_subset_of(requested));
    }

    #[test]
    fn test_union_is_superset() {
        let signer = PrivilegeMask::new(true, false);
        let writable = PrivilegeMask::new(false, true);
        let both = signer.union(writable);
        assert_eq!(both, PrivilegeMask::new(true, true));
        assert!(signer.is_subset_of(both));
        assert!(writable.is_subset_of(both));
        assert!(!both.is_subset_of(signer));
        assert!(PrivilegeMask::READONLY.is_subset_of(signer));
    }

    #[test]
    fn test_instruction_account_flags() {
        let account = InstructionAccount::new(3, true, false);
        assert_eq!(account.index_in_transaction, 3);
        assert!(account.is_signer());
        assert!(!account.is_writable());
        assert_eq!(
            InstructionAccount::with_privileges(3, account.privileges()),
            account
        );
    }
}
