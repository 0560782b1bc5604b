use {
    crate::{InstructionError, IndexOfAccount, MAX_ACCOUNTS_PER_TRANSACTION},
    solana_pubkey::Pubkey,
    std::{
        cell::{Cell, Ref, RefCell, RefMut},
        collections::HashSet,
    },
};

/// The single storage record of one account, shared by every handle aliasing it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountRecord {
    pub lamports: u64,
    pub data: Vec<u8>,
    pub owner: Pubkey,
    pub executable: bool,
}

impl AccountRecord {
    pub fn new(lamports: u64, space: usize, owner: &Pubkey) -> Self {
        Self {
            lamports,
            data: vec![0; space],
            owner: *owner,
            executable: false,
        }
    }

    pub fn new_data(lamports: u64, data: Vec<u8>, owner: &Pubkey) -> Self {
        Self {
            lamports,
            data,
            owner: *owner,
            executable: false,
        }
    }

    /// An executable record owned by the native loader, used for program accounts
    pub fn new_executable(owner: &Pubkey) -> Self {
        Self {
            lamports: 1,
            data: Vec::new(),
            owner: *owner,
            executable: true,
        }
    }
}

/// An account key and the matching account
pub type KeyedAccountRecord = (Pubkey, AccountRecord);
pub(crate) type DeconstructedTransactionAccounts = (Vec<KeyedAccountRecord>, Box<[Cell<bool>]>);

/// Storage for every unique account of one top-level call.
///
/// Each key maps to exactly one record, so handles in any frame that alias a
/// key observe the same lamports and data.
#[derive(Debug)]
pub struct TransactionAccounts {
    keys: Box<[Pubkey]>,
    accounts: Box<[RefCell<AccountRecord>]>,
    touched_flags: Box<[Cell<bool>]>,
    lamports_delta: Cell<i128>,
}

impl TransactionAccounts {
    pub fn new(accounts: Vec<KeyedAccountRecord>) -> Result<Self, InstructionError> {
        if accounts.len() > MAX_ACCOUNTS_PER_TRANSACTION {
            return Err(InstructionError::MaxAccountsExceeded);
        }
        let mut seen = HashSet::with_capacity(accounts.len());
        if !accounts.iter().all(|(key, _)| seen.insert(*key)) {
            return Err(InstructionError::InvalidArgument);
        }
        let touched_flags = vec![Cell::new(false); accounts.len()].into_boxed_slice();
        let (keys, accounts): (Vec<Pubkey>, Vec<RefCell<AccountRecord>>) = accounts
            .into_iter()
            .map(|(key, account)| (key, RefCell::new(account)))
            .unzip();
        Ok(Self {
            keys: keys.into_boxed_slice(),
            accounts: accounts.into_boxed_slice(),
            touched_flags,
            lamports_delta: Cell::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn account_key(&self, index: IndexOfAccount) -> Option<&Pubkey> {
        self.keys.get(index as usize)
    }

    pub fn find_index(&self, pubkey: &Pubkey) -> Option<IndexOfAccount> {
        self.keys
            .iter()
            .position(|key| key == pubkey)
            .map(|index| index as IndexOfAccount)
    }

    pub fn try_borrow(
        &self,
        index: IndexOfAccount,
    ) -> Result<Ref<'_, AccountRecord>, InstructionError> {
        self.accounts
            .get(index as usize)
            .ok_or(InstructionError::UnknownAccount)?
            .try_borrow()
            .map_err(|_| InstructionError::AccountBorrowFailed)
    }

    pub fn try_borrow_mut(
        &self,
        index: IndexOfAccount,
    ) -> Result<RefMut<'_, AccountRecord>, InstructionError> {
        self.accounts
            .get(index as usize)
            .ok_or(InstructionError::UnknownAccount)?
            .try_borrow_mut()
            .map_err(|_| InstructionError::AccountBorrowFailed)
    }

    pub fn touch(&self, index: IndexOfAccount) -> Result<(), InstructionError> {
        self.touched_flags
            .get(index as usize)
            .ok_or(InstructionError::UnknownAccount)?
            .set(true);
        Ok(())
    }

    pub fn is_touched(&self, index: IndexOfAccount) -> bool {
        self.touched_flags
            .get(index as usize)
            .map(Cell::get)
            .unwrap_or(false)
    }

    pub(crate) fn add_lamports_delta(&self, balance: i128) -> Result<(), InstructionError> {
        let delta = self.lamports_delta.get();
        self.lamports_delta.set(
            delta
                .checked_add(balance)
                .ok_or(InstructionError::ArithmeticOverflow)?,
        );
        Ok(())
    }

    pub fn get_lamports_delta(&self) -> i128 {
        self.lamports_delta.get()
    }

    pub(crate) fn take(self) -> DeconstructedTransactionAccounts {
        let accounts = self
            .keys
            .iter()
            .copied()
            .zip(self.accounts.into_vec().into_iter().map(RefCell::into_inner))
            .collect();
        (accounts, self.touched_flags)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    fn two_accounts() -> Vec<KeyedAccountRecord> {
        vec![
            (
                Pubkey::new_unique(),
                AccountRecord::new(2, 1, &Pubkey::new_unique()),
            ),
            (
                Pubkey::new_unique(),
                AccountRecord::new(2, 1, &Pubkey::new_unique()),
            ),
        ]
    }

    #[test]
    fn test_missing_account() {
        let tx_accounts = TransactionAccounts::new(two_accounts()).unwrap();

        let res = tx_accounts.try_borrow(3);
        assert_eq!(res.err(), Some(InstructionError::UnknownAccount));

        let res = tx_accounts.try_borrow_mut(3);
        assert_eq!(res.err(), Some(InstructionError::UnknownAccount));

        assert_eq!(tx_accounts.touch(3), Err(InstructionError::UnknownAccount));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let key = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let accounts = vec![
            (key, AccountRecord::new(1, 0, &owner)),
            (key, AccountRecord::new(2, 0, &owner)),
        ];
        assert_matches!(
            TransactionAccounts::new(accounts),
            Err(InstructionError::InvalidArgument)
        );
    }

    #[test]
    fn test_too_many_accounts() {
        let owner = Pubkey::new_unique();
        let accounts = (0..=MAX_ACCOUNTS_PER_TRANSACTION)
            .map(|_| (Pubkey::new_unique(), AccountRecord::new(0, 0, &owner)))
            .collect();
        assert_matches!(
            TransactionAccounts::new(accounts),
            Err(InstructionError::MaxAccountsExceeded)
        );
    }

    #[test]
    fn test_invalid_borrow() {
        let tx_accounts = TransactionAccounts::new(two_accounts()).unwrap();

        // Two immutable borrows are valid
        {
            let acc_1 = tx_accounts.try_borrow(0);
            assert!(acc_1.is_ok());

            let acc_2 = tx_accounts.try_borrow(1);
            assert!(acc_2.is_ok());

            let acc_1_new = tx_accounts.try_borrow(0);
            assert!(acc_1_new.is_ok());

            assert_eq!(*acc_1.unwrap(), *acc_1_new.unwrap());
        }

        // Two mutable borrows are invalid
        {
            let acc_1 = tx_accounts.try_borrow_mut(0);
            assert!(acc_1.is_ok());

            let acc_2 = tx_accounts.try_borrow_mut(1);
            assert!(acc_2.is_ok());

            let acc_1_new = tx_accounts.try_borrow_mut(0);
            assert_eq!(acc_1_new.err(), Some(InstructionError::AccountBorrowFailed));
        }

        // Mutable after immutable must fail
        {
            let _acc_1 = tx_accounts.try_borrow(0).unwrap();
            let acc_1_new = tx_accounts.try_borrow_mut(0);
            assert_eq!(acc_1_new.err(), Some(InstructionError::AccountBorrowFailed));
        }

        // Immutable after mutable must fail
        {
            let _acc_1 = tx_accounts.try_borrow_mut(0).unwrap();
            let acc_1_new = tx_accounts.try_borrow(0);
            assert_eq!(acc_1_new.err(), Some(InstructionError::AccountBorrowFailed));
        }

        // Different scopes are good
        {
            let acc_1 = tx_accounts.try_borrow_mut(0);
            assert!(acc_1.is_ok());
        }

        {
            let acc_1 = tx_accounts.try_borrow_mut(0);
            assert!(acc_1.is_ok());
        }
    }

    #[test]
    fn test_lamports_delta_and_take() {
        let accounts = two_accounts();
        let keys: Vec<Pubkey> = accounts.iter().map(|(key, _)| *key).collect();
        let tx_accounts = TransactionAccounts::new(accounts).unwrap();

        tx_accounts.try_borrow_mut(1).unwrap().lamports = 7;
        tx_accounts.touch(1).unwrap();
        tx_accounts.add_lamports_delta(5).unwrap();
        tx_accounts.add_lamports_delta(-5).unwrap();
        assert_eq!(tx_accounts.get_lamports_delta(), 0);
        assert_eq!(
            tx_accounts.add_lamports_delta(i128::MAX).and_then(|_| {
                tx_accounts.add_lamports_delta(1)
            }),
            Err(InstructionError::ArithmeticOverflow)
        );

        assert_eq!(tx_accounts.find_index(&keys[1]), Some(1));
        assert!(!tx_accounts.is_touched(0));
        assert!(tx_accounts.is_touched(1));
        assert!(!tx_accounts.is_touched(2));
        let (accounts, touched_flags) = tx_accounts.take();
        assert_eq!(accounts[1].0, keys[1]);
        assert_eq!(accounts[1].1.lamports, 7);
        assert!(!touched_flags[0].get());
        assert!(touched_flags[1].get());
    }
}
