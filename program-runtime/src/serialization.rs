#![allow(clippy::arithmetic_side_effects)]

use {
    log::trace,
    paychains_transaction_context::{
        AccountMeta, AccountRecord, BorrowedInstructionAccount, IndexOfAccount, InstructionContext,
        InstructionError, KeyedAccountRecord, PrivilegeMask, MAX_ACCOUNTS_PER_INSTRUCTION,
        MAX_ACCOUNT_DATA_LEN, MAX_INSTRUCTION_DATA_LEN,
    },
    solana_pubkey::Pubkey,
    std::{collections::HashSet, mem::size_of},
};

/// Marks a position whose full account record follows
pub const NON_DUP_MARKER: u8 = u8::MAX;

/// Alignment of every record and of the data following it
pub const SERIALIZATION_ALIGN: usize = 8;

/// Bytes of zero padding after a duplicate marker and its two flag bytes
const DUP_PADDING: usize = 5;

enum SerializeAccount<'a> {
    Account(BorrowedInstructionAccount<'a>),
    /// Earlier position naming the same account, plus this position's own
    /// signer and writable flags
    Duplicate(IndexOfAccount, PrivilegeMask),
}

struct Serializer {
    buffer: Vec<u8>,
}

impl Serializer {
    fn new(size: usize) -> Serializer {
        Serializer {
            buffer: Vec::with_capacity(size),
        }
    }

    fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn write_all(&mut self, value: &[u8]) {
        self.buffer.extend_from_slice(value);
    }

    fn fill_write(&mut self, num: usize, value: u8) {
        self.buffer.resize(self.buffer.len() + num, value);
    }

    fn write_account(&mut self, account: &BorrowedInstructionAccount<'_>) {
        let data = account.get_data();
        self.write_u64(data.len() as u64);
        self.write_all(data);
        self.fill_write(padding_after(data.len()), 0);
    }

    fn finish(self) -> Vec<u8> {
        debug_assert_eq!(self.buffer.len() % SERIALIZATION_ALIGN, 0);
        self.buffer
    }
}

fn padding_after(data_len: usize) -> usize {
    (SERIALIZATION_ALIGN - data_len % SERIALIZATION_ALIGN) % SERIALIZATION_ALIGN
}

/// Writes the accounts, instruction data and program id of a frame into one
/// buffer, in the layout a program entrypoint parses.
pub fn serialize_parameters(
    instruction_context: &InstructionContext,
) -> Result<Vec<u8>, InstructionError> {
    let num_accounts = instruction_context.get_number_of_instruction_accounts();
    let accounts = (0..num_accounts)
        .map(|instruction_account_index| {
            Ok(
                match instruction_context.is_instruction_account_duplicate(instruction_account_index)? {
                    Some(position) => SerializeAccount::Duplicate(
                        position,
                        PrivilegeMask::new(
                            instruction_context
                                .is_instruction_account_signer(instruction_account_index)?,
                            instruction_context
                                .is_instruction_account_writable(instruction_account_index)?,
                        ),
                    ),
                    None => SerializeAccount::Account(
                        instruction_context
                            .try_borrow_instruction_account(instruction_account_index)?,
                    ),
                },
            )
        })
        .collect::<Result<Vec<_>, InstructionError>>()?;
    let instruction_data = instruction_context.get_instruction_data();

    // Calculate size in order to alloc once
    let mut size = size_of::<u64>();
    for account in &accounts {
        size += 1; // dup
        match account {
            SerializeAccount::Duplicate(..) => {
                size += size_of::<u8>() // is_signer
                + size_of::<u8>() // is_writable
                + DUP_PADDING;
            }
            SerializeAccount::Account(account) => {
                let data_len = account.get_data().len();
                size += size_of::<u8>() // is_signer
                + size_of::<u8>() // is_writable
                + size_of::<u8>() // executable
                + size_of::<u32>() // padding
                + size_of::<Pubkey>() // key
                + size_of::<Pubkey>() // owner
                + size_of::<u64>() // lamports
                + size_of::<u64>() // data len
                + data_len
                + padding_after(data_len);
            }
        }
    }
    size += size_of::<u64>() // data len
    + instruction_data.len()
    + size_of::<Pubkey>(); // program id
    let mut s = Serializer::new(size);

    s.write_u64(accounts.len() as u64);
    for account in accounts {
        match account {
            SerializeAccount::Account(borrowed_account) => {
                s.write_u8(NON_DUP_MARKER);
                s.write_u8(borrowed_account.is_signer() as u8);
                s.write_u8(borrowed_account.is_writable() as u8);
                s.write_u8(borrowed_account.is_executable() as u8);
                s.write_all(&[0u8, 0, 0, 0]);
                s.write_all(borrowed_account.get_key().as_ref());
                s.write_all(borrowed_account.get_owner().as_ref());
                s.write_u64(borrowed_account.get_lamports());
                s.write_account(&borrowed_account);
            }
            SerializeAccount::Duplicate(position, privileges) => {
                s.write_u8(position as u8);
                s.write_u8(privileges.is_signer as u8);
                s.write_u8(privileges.is_writable as u8);
                s.fill_write(DUP_PADDING, 0);
            }
        }
    }
    s.write_u64(instruction_data.len() as u64);
    s.write_all(instruction_data);
    s.write_all(instruction_context.get_program_key().as_ref());
    let buffer = s.finish();
    debug_assert_eq!(buffer.len(), size);
    Ok(buffer)
}

/// The contents of a serialized input buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeserializedParameters {
    pub program_id: Pubkey,
    /// One record per distinct account, in order of first appearance
    pub accounts: Vec<KeyedAccountRecord>,
    /// One reference per position with the flags granted to that position
    pub account_metas: Vec<AccountMeta>,
    pub instruction_data: Vec<u8>,
}

fn read_bytes<'b>(
    buffer: &'b [u8],
    start: &mut usize,
    len: usize,
) -> Result<&'b [u8], InstructionError> {
    let end = start
        .checked_add(len)
        .ok_or(InstructionError::InvalidArgument)?;
    let bytes = buffer
        .get(*start..end)
        .ok_or(InstructionError::InvalidArgument)?;
    *start = end;
    Ok(bytes)
}

fn read_u8(buffer: &[u8], start: &mut usize) -> Result<u8, InstructionError> {
    read_bytes(buffer, start, size_of::<u8>())?
        .first()
        .copied()
        .ok_or(InstructionError::InvalidArgument)
}

fn read_u64(buffer: &[u8], start: &mut usize) -> Result<u64, InstructionError> {
    read_bytes(buffer, start, size_of::<u64>())
        .map(<[u8; 8]>::try_from)
        .and_then(|bytes| bytes.map_err(|_| InstructionError::InvalidArgument))
        .map(u64::from_le_bytes)
}

fn read_len(buffer: &[u8], start: &mut usize, max: u64) -> Result<usize, InstructionError> {
    let len = read_u64(buffer, start)?;
    if len > max {
        return Err(InstructionError::InvalidArgument);
    }
    usize::try_from(len).map_err(|_| InstructionError::InvalidArgument)
}

fn read_pubkey(buffer: &[u8], start: &mut usize) -> Result<Pubkey, InstructionError> {
    read_bytes(buffer, start, size_of::<Pubkey>())
        .and_then(|bytes| Pubkey::try_from(bytes).map_err(|_| InstructionError::InvalidArgument))
}

/// Parses an input buffer in the layout written by [`serialize_parameters`].
///
/// Fails with `InvalidArgument` if the buffer is truncated, a duplicate
/// marker does not point at an earlier position, two full records share a
/// key, or a length exceeds its limit.
pub fn deserialize_parameters(buffer: &[u8]) -> Result<DeserializedParameters, InstructionError> {
    let mut start = 0;
    let num_accounts = read_len(buffer, &mut start, MAX_ACCOUNTS_PER_INSTRUCTION as u64)?;

    let mut accounts: Vec<KeyedAccountRecord> = Vec::with_capacity(num_accounts);
    let mut account_metas: Vec<AccountMeta> = Vec::with_capacity(num_accounts);
    let mut seen = HashSet::with_capacity(num_accounts);
    for position in 0..num_accounts {
        let dup_info = read_u8(buffer, &mut start)?;
        if dup_info == NON_DUP_MARKER {
            let is_signer = read_u8(buffer, &mut start)? != 0;
            let is_writable = read_u8(buffer, &mut start)? != 0;
            let executable = read_u8(buffer, &mut start)? != 0;
            read_bytes(buffer, &mut start, size_of::<u32>())?; // padding
            let key = read_pubkey(buffer, &mut start)?;
            let owner = read_pubkey(buffer, &mut start)?;
            let lamports = read_u64(buffer, &mut start)?;
            let data_len = read_len(buffer, &mut start, MAX_ACCOUNT_DATA_LEN)?;
            let data = read_bytes(buffer, &mut start, data_len)?.to_vec();
            read_bytes(buffer, &mut start, padding_after(data_len))?;
            if !seen.insert(key) {
                trace!("position {} repeats {} without a duplicate marker", position, key);
                return Err(InstructionError::InvalidArgument);
            }
            let mut account = AccountRecord::new_data(lamports, data, &owner);
            account.executable = executable;
            accounts.push((key, account));
            account_metas.push(AccountMeta {
                pubkey: key,
                is_signer,
                is_writable,
            });
        } else {
            let is_signer = read_u8(buffer, &mut start)? != 0;
            let is_writable = read_u8(buffer, &mut start)? != 0;
            read_bytes(buffer, &mut start, DUP_PADDING)?;
            if dup_info as usize >= position {
                return Err(InstructionError::InvalidArgument);
            }
            let original = account_metas
                .get(dup_info as usize)
                .ok_or(InstructionError::InvalidArgument)?;
            account_metas.push(AccountMeta {
                pubkey: original.pubkey,
                is_signer,
                is_writable,
            });
        }
    }

    let instruction_data_len = read_len(buffer, &mut start, MAX_INSTRUCTION_DATA_LEN as u64)?;
    let instruction_data = read_bytes(buffer, &mut start, instruction_data_len)?.to_vec();
    let program_id = read_pubkey(buffer, &mut start)?;
    Ok(DeserializedParameters {
        program_id,
        accounts,
        account_metas,
        instruction_data,
    })
}
