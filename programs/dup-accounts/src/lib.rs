//! Builtin program which is handed the same account at several positions.
//!
//! Every command expects at least four accounts:
//!
//! | command | effect |
//! |---|---|
//! | 1 | data[0] of account 2 = 1 |
//! | 2 | data[0] of account 3 = 2 |
//! | 3 | data[0] of account 2 += 1, data[0] of account 3 += 2 |
//! | 4 | moves 1 lamport from account 1 to account 2 |
//! | 5 | moves 2 lamports from account 1 to account 3 |
//! | 6 | moves 3 lamports from account 1, 1 to account 2 and 2 to account 3 |
//! | 7 | checks privileges and, given a fifth account, invokes itself with 7 and 3 |

use {
    log::trace,
    paychains_program_runtime::{cpi::InvokeRequest, ic_msg, invoke_context::InvokeContext},
    paychains_transaction_context::{
        instruction::InstructionContext, IndexOfAccount, InstructionError,
    },
    solana_pubkey::Pubkey,
    thiserror::Error,
};

pub const ID: Pubkey = Pubkey::new_from_array([
    0x44, 0x75, 0x70, 0x41, 0x63, 0x63, 0x6f, 0x75, 0x6e, 0x74, 0x73, 0x31, 0x31, 0x31, 0x31,
    0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31, 0x31,
    0x31, 0x31,
]);

pub fn id() -> Pubkey {
    ID
}

/// Number of accounts every command works on
pub const MIN_ACCOUNTS: IndexOfAccount = 4;

/// Reasons the privilege check of command 7 fails, reported as `Custom`
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DupAccountsError {
    #[error("account 1 must not be a signer")]
    UnexpectedSigner,
    #[error("aliased accounts disagree after the nested invocations")]
    AliasMismatch,
}

impl From<DupAccountsError> for InstructionError {
    fn from(error: DupAccountsError) -> Self {
        InstructionError::Custom(error as u32)
    }
}

/// Entrypoint registered in the builtin program cache
pub fn process_instruction(invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    instruction_context.check_number_of_instruction_accounts(MIN_ACCOUNTS)?;
    let data = instruction_context.get_instruction_data();

    trace!("process_instruction: {data:?}");

    match data.first().copied() {
        Some(1) => {
            ic_msg!(invoke_context, "modify account (2) data");
            update_first_byte(&instruction_context, 2, |_| 1)
        }
        Some(2) => {
            ic_msg!(invoke_context, "modify account (3) data");
            update_first_byte(&instruction_context, 3, |_| 2)
        }
        Some(3) => {
            ic_msg!(invoke_context, "modify account (2,3) data");
            update_first_byte(&instruction_context, 2, |byte| byte.wrapping_add(1))?;
            update_first_byte(&instruction_context, 3, |byte| byte.wrapping_add(2))
        }
        Some(4) => {
            ic_msg!(invoke_context, "modify account (1,2) lamports");
            move_lamports(&instruction_context, 1, &[(2, 1)])
        }
        Some(5) => {
            ic_msg!(invoke_context, "modify account (1,3) lamports");
            move_lamports(&instruction_context, 1, &[(3, 2)])
        }
        Some(6) => {
            ic_msg!(invoke_context, "modify account (1,2,3) lamports");
            move_lamports(&instruction_context, 1, &[(2, 1), (3, 2)])
        }
        Some(7) => {
            ic_msg!(invoke_context, "check account (0,1,2,3) privs");
            let [payer, payee, first, second] = [
                checked_key(&instruction_context, 0, true)?,
                checked_key(&instruction_context, 1, false)?,
                checked_key(&instruction_context, 2, true)?,
                checked_key(&instruction_context, 3, true)?,
            ];
            if instruction_context.get_number_of_instruction_accounts() <= MIN_ACCOUNTS {
                return Ok(());
            }
            let program_id = *instruction_context.get_program_key();

            invoke_context.invoke(
                InvokeRequest::new(program_id)
                    .account(payer, true, true)
                    .account(payee, false, true)
                    .account(first, false, true)
                    .account(second, true, false)
                    .data([7]),
            )?;
            invoke_context.invoke(
                InvokeRequest::new(program_id)
                    .account(payer, true, true)
                    .account(payee, false, true)
                    .account(first, false, true)
                    .account(second, false, true)
                    .data([3]),
            )?;

            let instruction_context = invoke_context
                .transaction_context
                .get_current_instruction_context()?;
            for position in [2, 3] {
                let account = instruction_context.try_borrow_instruction_account(position)?;
                if account.get_data().first() != Some(&3) {
                    ic_msg!(
                        invoke_context,
                        "account ({}) holds {:?} after the nested invocations",
                        position,
                        account.get_data().first()
                    );
                    return Err(DupAccountsError::AliasMismatch.into());
                }
            }
            Ok(())
        }
        _ => {
            ic_msg!(invoke_context, "Unrecognized command");
            Err(InstructionError::InvalidInstructionData)
        }
    }
}

fn update_first_byte(
    instruction_context: &InstructionContext,
    position: IndexOfAccount,
    update: impl FnOnce(u8) -> u8,
) -> Result<(), InstructionError> {
    let mut account = instruction_context.try_borrow_instruction_account(position)?;
    let first = account
        .get_data_mut()?
        .first_mut()
        .ok_or(InstructionError::InvalidArgument)?;
    *first = update(*first);
    Ok(())
}

// Each borrow is dropped before the next one, so `from` may alias a recipient
fn move_lamports(
    instruction_context: &InstructionContext,
    from: IndexOfAccount,
    recipients: &[(IndexOfAccount, u64)],
) -> Result<(), InstructionError> {
    let total = recipients
        .iter()
        .try_fold(0u64, |total, (_, lamports)| total.checked_add(*lamports))
        .ok_or(InstructionError::ArithmeticOverflow)?;
    instruction_context
        .try_borrow_instruction_account(from)?
        .checked_sub_lamports(total)?;
    for (to, lamports) in recipients {
        instruction_context
            .try_borrow_instruction_account(*to)?
            .checked_add_lamports(*lamports)?;
    }
    Ok(())
}

fn checked_key(
    instruction_context: &InstructionContext,
    position: IndexOfAccount,
    must_sign: bool,
) -> Result<Pubkey, InstructionError> {
    let account = instruction_context.try_borrow_instruction_account(position)?;
    account.check_writable()?;
    if must_sign {
        account.check_signer()?;
    } else if account.is_signer() {
        return Err(DupAccountsError::UnexpectedSigner.into());
    }
    Ok(*account.get_key())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        paychains_program_runtime::invoke_context::mock_process_instruction,
        paychains_transaction_context::{AccountMeta, AccountRecord, KeyedAccountRecord},
        test_case::test_case,
    };

    fn process(
        instruction_data: &[u8],
        transaction_accounts: Vec<KeyedAccountRecord>,
        instruction_account_metas: Vec<AccountMeta>,
        expected_result: Result<(), InstructionError>,
    ) -> Vec<AccountRecord> {
        mock_process_instruction(
            &ID,
            instruction_data,
            transaction_accounts,
            instruction_account_metas,
            expected_result,
            process_instruction,
            |_invoke_context| {},
        )
    }

    fn four_accounts() -> (Vec<KeyedAccountRecord>, Vec<AccountMeta>) {
        let keys: Vec<Pubkey> = (0..4).map(|_| Pubkey::new_unique()).collect();
        let transaction_accounts = keys
            .iter()
            .map(|key| (*key, AccountRecord::new(10, 1, &ID)))
            .collect();
        let metas = keys.iter().map(|key| AccountMeta::new(*key, false)).collect();
        (transaction_accounts, metas)
    }

    #[test_case(&[], Err(InstructionError::InvalidInstructionData); "no command")]
    #[test_case(&[0], Err(InstructionError::InvalidInstructionData); "command 0")]
    #[test_case(&[8], Err(InstructionError::InvalidInstructionData); "command 8")]
    #[test_case(&[1], Ok(()); "command 1")]
    fn test_commands(instruction_data: &[u8], expected_result: Result<(), InstructionError>) {
        let (transaction_accounts, metas) = four_accounts();
        process(instruction_data, transaction_accounts, metas, expected_result);
    }

    #[test]
    fn test_too_few_accounts() {
        let (transaction_accounts, mut metas) = four_accounts();
        metas.truncate(3);
        process(
            &[1],
            transaction_accounts,
            metas,
            Err(InstructionError::InvalidArgument),
        );
    }

    #[test]
    fn test_readonly_account_rejects_writes() {
        let (transaction_accounts, mut metas) = four_accounts();
        metas[2].is_writable = false;
        let accounts = process(
            &[1],
            transaction_accounts,
            metas,
            Err(InstructionError::PrivilegeViolation),
        );
        assert_eq!(accounts[2].data, vec![0]);
    }

    #[test]
    fn test_distinct_accounts_lamports() {
        let (transaction_accounts, metas) = four_accounts();
        let accounts = process(&[6], transaction_accounts, metas, Ok(()));
        let lamports: Vec<u64> = accounts.iter().map(|account| account.lamports).collect();
        assert_eq!(lamports, vec![10, 7, 11, 12]);
    }

    #[test]
    fn test_overdrawn_account() {
        let (mut transaction_accounts, metas) = four_accounts();
        transaction_accounts[1].1.lamports = 2;
        process(
            &[6],
            transaction_accounts,
            metas,
            Err(InstructionError::ArithmeticOverflow),
        );
    }

    #[test]
    fn test_error_codes() {
        assert_matches!(
            InstructionError::from(DupAccountsError::UnexpectedSigner),
            InstructionError::Custom(0)
        );
        assert_matches!(
            InstructionError::from(DupAccountsError::AliasMismatch),
            InstructionError::Custom(1)
        );
    }
}
