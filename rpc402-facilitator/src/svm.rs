//! Structural verification of Solana `exact`-scheme payments.
//!
//! A payment is a fully signed transaction that must contain an SPL token transfer
//! crediting the invoice's destination with at least the required amount.
//!
//! Transfer instruction layouts of the SPL Token program:
//!
//! | Variant | Tag | Data | Accounts |
//! |---|---|---|---|
//! | `Transfer` | `3` | `[tag, amount: u64 LE]` | `[source, destination, owner]` |
//! | `TransferChecked` | `12` | `[tag, amount: u64 LE, decimals]` | `[source, mint, destination, owner]` |

use std::{fmt::Display, str::FromStr};

use base64::{Engine, prelude::BASE64_STANDARD};
use rpc402_core::transport::PaymentRequirements;
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

/// The SPL Token program.
pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// The Associated Token Account program.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// The two accepted transfer variants of the SPL Token program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Transfer,
    TransferChecked,
}

impl TransferKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            3 => Some(TransferKind::Transfer),
            12 => Some(TransferKind::TransferChecked),
            _ => None,
        }
    }

    /// Position of the destination token account in the instruction's accounts.
    pub fn destination_index(&self) -> usize {
        match self {
            TransferKind::Transfer => 1,
            TransferKind::TransferChecked => 2,
        }
    }
}

/// Why a payment failed structural verification.
///
/// The display strings are what callers receive as the rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPayment {
    #[error("Invalid transaction: {0}")]
    Malformed(String),

    #[error("Invalid transaction: missing required signatures")]
    MissingSignatures,

    #[error("No token transfer instruction found")]
    NoTransferInstruction,

    #[error("Invalid transfer instruction data")]
    InvalidData,

    #[error("Not a token transfer instruction")]
    NotATransfer(u8),

    #[error("Insufficient payment: {paid} < {required}")]
    InsufficientAmount { paid: u64, required: u64 },

    #[error("Invalid transfer instruction accounts")]
    InvalidAccounts,

    #[error("Wrong recipient: {found} != {expected}")]
    WrongRecipient { found: String, expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidAddress {
    #[error("Invalid address: {0}")]
    Unparsable(String),

    #[error("No associated token account for wallet {wallet} and mint {mint}")]
    NoBumpSeed { wallet: String, mint: String },
}

/// The associated token account holding `mint` tokens for `wallet`.
///
/// Returns `None` in the improbable case that no bump seed yields an off-curve address.
pub fn associated_token_account(wallet: &Pubkey, mint: &Pubkey) -> Option<Pubkey> {
    Pubkey::try_find_program_address(
        &[wallet.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// Base58 flavor of [`associated_token_account`], for addresses read from configuration.
pub fn associated_token_address(wallet: &str, mint: &str) -> Result<String, InvalidAddress> {
    let parse = |s: &str| Pubkey::from_str(s).map_err(|_| InvalidAddress::Unparsable(s.to_string()));
    let (wallet_key, mint_key) = (parse(wallet)?, parse(mint)?);
    associated_token_account(&wallet_key, &mint_key)
        .map(|address| address.to_string())
        .ok_or_else(|| InvalidAddress::NoBumpSeed {
            wallet: wallet.to_string(),
            mint: mint.to_string(),
        })
}

/// Whether `address` parses as a base58 public key.
pub fn is_valid_address(address: &str) -> bool {
    Pubkey::from_str(address).is_ok()
}

/// A token program instruction with its account indices resolved to addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInstruction {
    pub data: Vec<u8>,
    pub accounts: Vec<Pubkey>,
}

/// A decoded, structurally checked transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransfer {
    pub kind: TransferKind,
    pub amount: u64,
    pub destination: Pubkey,
}

/// Decode a base64 wire-format transaction.
pub fn decode_transaction(transaction_base64: &str) -> Result<VersionedTransaction, InvalidPayment> {
    let bytes = BASE64_STANDARD
        .decode(transaction_base64.trim())
        .map_err(malformed)?;
    decode_transaction_bytes(&bytes)
}

/// Decode wire-format transaction bytes.
pub fn decode_transaction_bytes(bytes: &[u8]) -> Result<VersionedTransaction, InvalidPayment> {
    let (tx, read): (VersionedTransaction, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::legacy()).map_err(malformed)?;
    if read != bytes.len() {
        return Err(InvalidPayment::Malformed(format!(
            "{} trailing bytes",
            bytes.len() - read
        )));
    }
    Ok(tx)
}

/// Encode a transaction to its wire format.
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<Vec<u8>, InvalidPayment> {
    bincode::serde::encode_to_vec(tx, bincode::config::legacy()).map_err(malformed)
}

fn malformed(err: impl Display) -> InvalidPayment {
    InvalidPayment::Malformed(err.to_string())
}

/// The fee payer, i.e. the first signer of the transaction.
pub fn fee_payer(tx: &VersionedTransaction) -> Option<Pubkey> {
    tx.message.static_account_keys().first().copied()
}

/// Best-effort payer address of a base64 transaction, `"unknown"` when it cannot be decoded.
pub fn payer_of(transaction_base64: &str) -> String {
    decode_transaction(transaction_base64)
        .ok()
        .as_ref()
        .and_then(fee_payer)
        .map(|pk| pk.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check that every required signature slot carries a signature.
pub fn check_signatures(tx: &VersionedTransaction) -> Result<(), InvalidPayment> {
    let required = tx.message.header().num_required_signatures as usize;
    if required == 0
        || tx.signatures.len() != required
        || tx.signatures.iter().any(|s| *s == Signature::default())
    {
        return Err(InvalidPayment::MissingSignatures);
    }
    Ok(())
}

/// Locate the first instruction addressed to the SPL Token program.
pub fn find_token_instruction(tx: &VersionedTransaction) -> Result<TokenInstruction, InvalidPayment> {
    let keys = tx.message.static_account_keys();

    let ix = tx
        .message
        .instructions()
        .iter()
        .find(|ix| keys.get(ix.program_id_index as usize) == Some(&TOKEN_PROGRAM_ID))
        .ok_or(InvalidPayment::NoTransferInstruction)?;

    // Accounts loaded from lookup tables are not resolvable offline.
    let accounts = ix
        .accounts
        .iter()
        .map(|i| keys.get(*i as usize).copied())
        .collect::<Option<Vec<_>>>()
        .ok_or(InvalidPayment::InvalidAccounts)?;

    Ok(TokenInstruction {
        data: ix.data.clone(),
        accounts,
    })
}

/// Check a token instruction against the invoice's amount and destination.
pub fn check_transfer(
    ix: &TokenInstruction,
    requirements: &PaymentRequirements,
) -> Result<VerifiedTransfer, InvalidPayment> {
    if ix.data.len() < 9 {
        return Err(InvalidPayment::InvalidData);
    }

    let kind = TransferKind::from_tag(ix.data[0]).ok_or(InvalidPayment::NotATransfer(ix.data[0]))?;

    let mut amount_bytes = [0u8; 8];
    amount_bytes.copy_from_slice(&ix.data[1..9]);
    let amount = u64::from_le_bytes(amount_bytes);

    let required = requirements.amount.0;
    if amount < required {
        return Err(InvalidPayment::InsufficientAmount {
            paid: amount,
            required,
        });
    }

    let destination = *ix
        .accounts
        .get(kind.destination_index())
        .ok_or(InvalidPayment::InvalidAccounts)?;

    if let Some(expected) = &requirements.token_account {
        if destination.to_string() != *expected {
            return Err(InvalidPayment::WrongRecipient {
                found: destination.to_string(),
                expected: expected.clone(),
            });
        }
    }

    Ok(VerifiedTransfer {
        kind,
        amount,
        destination,
    })
}

/// Run every structural check on a decoded transaction.
pub fn verify_transaction(
    tx: &VersionedTransaction,
    requirements: &PaymentRequirements,
) -> Result<VerifiedTransfer, InvalidPayment> {
    check_signatures(tx)?;
    let ix = find_token_instruction(tx)?;
    check_transfer(&ix, requirements)
}

#[cfg(test)]
pub(crate) mod tests {
    use rpc402_core::transport::PaymentRequirements;
    use solana_instruction::{AccountMeta, Instruction};
    use solana_message::Message;
    use solana_transaction::Transaction;

    use super::*;

    pub(crate) fn unique_key() -> Pubkey {
        Pubkey::new_from_array(rand::random())
    }

    pub(crate) fn requirements(amount: u64, token_account: Option<String>) -> PaymentRequirements {
        PaymentRequirements::builder()
            .recipient("62pyPYsdSLah2vDSeenEep2R2hP9jz98eDbnz4Zyb1Lf")
            .maybe_token_account(token_account)
            .amount(amount)
            .invoice_id("inv-test")
            .build()
    }

    fn data(tag: u8, amount: u64) -> Vec<u8> {
        let mut data = vec![tag];
        data.extend_from_slice(&amount.to_le_bytes());
        if tag == 12 {
            data.push(6);
        }
        data
    }

    pub(crate) struct TransferFixture {
        pub payer: Pubkey,
        pub destination: Pubkey,
        pub tx: VersionedTransaction,
    }

    /// A signed transaction paying `amount` with an SPL token instruction tagged `tag`.
    pub(crate) fn signed_transfer(tag: u8, amount: u64) -> TransferFixture {
        let payer = unique_key();
        let source = unique_key();
        let mint = unique_key();
        let destination = unique_key();

        let accounts = if tag == 12 {
            vec![
                AccountMeta::new(source, false),
                AccountMeta::new_readonly(mint, false),
                AccountMeta::new(destination, false),
                AccountMeta::new_readonly(payer, true),
            ]
        } else {
            vec![
                AccountMeta::new(source, false),
                AccountMeta::new(destination, false),
                AccountMeta::new_readonly(payer, true),
            ]
        };

        let ix = Instruction {
            program_id: TOKEN_PROGRAM_ID,
            accounts,
            data: data(tag, amount),
        };
        let message = Message::new(&[ix], Some(&payer));
        let mut tx = Transaction::new_unsigned(message);
        tx.signatures = vec![Signature::from([7u8; 64])];

        TransferFixture {
            payer,
            destination,
            tx: VersionedTransaction::from(tx),
        }
    }

    pub(crate) fn to_base64(tx: &VersionedTransaction) -> String {
        BASE64_STANDARD.encode(encode_transaction(tx).unwrap())
    }

    fn instruction(tag: u8, amount: u64, accounts: Vec<Pubkey>) -> TokenInstruction {
        TokenInstruction {
            data: data(tag, amount),
            accounts,
        }
    }

    #[test]
    fn accepts_both_transfer_variants() {
        for tag in [3, 12] {
            let fixture = signed_transfer(tag, 20);
            let decoded = decode_transaction(&to_base64(&fixture.tx)).unwrap();

            let transfer = verify_transaction(
                &decoded,
                &requirements(20, Some(fixture.destination.to_string())),
            )
            .unwrap();

            assert_eq!(transfer.amount, 20);
            assert_eq!(transfer.destination, fixture.destination);
            assert_eq!(fee_payer(&decoded), Some(fixture.payer));
        }
    }

    #[test]
    fn rejects_unknown_instruction_types() {
        for tag in [0u8, 1, 2, 4, 7, 9, 13, 255] {
            let ix = instruction(tag, 100, vec![unique_key(), unique_key(), unique_key(), unique_key()]);
            assert_eq!(
                check_transfer(&ix, &requirements(20, None)),
                Err(InvalidPayment::NotATransfer(tag))
            );
        }
    }

    #[test]
    fn insufficient_amount_mentions_both_amounts() {
        let ix = instruction(3, 10, vec![unique_key(), unique_key(), unique_key()]);
        let err = check_transfer(&ix, &requirements(20, None)).unwrap_err();

        assert_eq!(
            err,
            InvalidPayment::InsufficientAmount {
                paid: 10,
                required: 20
            }
        );
        let message = err.to_string();
        assert!(message.contains("10"), "{message}");
        assert!(message.contains("20"), "{message}");
    }

    #[test]
    fn overpayment_is_accepted() {
        let ix = instruction(3, 25, vec![unique_key(), unique_key(), unique_key()]);
        assert_eq!(check_transfer(&ix, &requirements(20, None)).unwrap().amount, 25);
    }

    #[test]
    fn rejects_wrong_destination_when_pinned() {
        let destination = unique_key();
        let expected = unique_key();
        let ix = instruction(3, 20, vec![unique_key(), destination, unique_key()]);

        let err = check_transfer(&ix, &requirements(20, Some(expected.to_string()))).unwrap_err();
        assert_eq!(
            err,
            InvalidPayment::WrongRecipient {
                found: destination.to_string(),
                expected: expected.to_string(),
            }
        );

        // Without a pinned token account any destination passes.
        assert!(check_transfer(&ix, &requirements(20, None)).is_ok());
    }

    #[test]
    fn transfer_checked_destination_is_third_account() {
        let mint = unique_key();
        let destination = unique_key();
        let ix = instruction(
            12,
            20,
            vec![unique_key(), mint, destination, unique_key()],
        );

        let transfer = check_transfer(&ix, &requirements(20, Some(destination.to_string()))).unwrap();
        assert_eq!(transfer.kind, TransferKind::TransferChecked);
        assert!(check_transfer(&ix, &requirements(20, Some(mint.to_string()))).is_err());
    }

    #[test]
    fn rejects_short_data_and_missing_accounts() {
        let short = TokenInstruction {
            data: vec![3, 1, 2, 3],
            accounts: vec![unique_key(), unique_key(), unique_key()],
        };
        assert_eq!(
            check_transfer(&short, &requirements(1, None)),
            Err(InvalidPayment::InvalidData)
        );

        let one_account = instruction(3, 20, vec![unique_key()]);
        assert_eq!(
            check_transfer(&one_account, &requirements(20, None)),
            Err(InvalidPayment::InvalidAccounts)
        );
    }

    #[test]
    fn rejects_transactions_without_token_instruction() {
        let payer = unique_key();
        let ix = Instruction {
            program_id: unique_key(),
            accounts: vec![AccountMeta::new(payer, true)],
            data: data(3, 20),
        };
        let mut tx = Transaction::new_unsigned(Message::new(&[ix], Some(&payer)));
        tx.signatures = vec![Signature::from([1u8; 64])];

        assert_eq!(
            verify_transaction(&VersionedTransaction::from(tx), &requirements(20, None)),
            Err(InvalidPayment::NoTransferInstruction)
        );
    }

    #[test]
    fn rejects_unsigned_transactions() {
        let mut fixture = signed_transfer(3, 20);
        fixture.tx.signatures = vec![Signature::default()];
        assert_eq!(
            verify_transaction(&fixture.tx, &requirements(20, None)),
            Err(InvalidPayment::MissingSignatures)
        );
    }

    #[test]
    fn associated_token_account_is_a_stable_pda() {
        let wallet = unique_key();
        let mint = unique_key();

        let ata = associated_token_account(&wallet, &mint).unwrap();
        assert_eq!(associated_token_account(&wallet, &mint), Some(ata));
        assert!(!ata.is_on_curve());
        assert_ne!(associated_token_account(&wallet, &unique_key()), Some(ata));
        assert_ne!(associated_token_account(&unique_key(), &mint), Some(ata));

        assert_eq!(
            associated_token_address(&wallet.to_string(), &mint.to_string()),
            Ok(ata.to_string())
        );
    }

    #[test]
    fn associated_token_address_rejects_garbage() {
        let mint = unique_key().to_string();
        assert_eq!(
            associated_token_address("not-a-wallet", &mint),
            Err(InvalidAddress::Unparsable("not-a-wallet".to_string()))
        );
        assert!(associated_token_address(&mint, "0OIl").is_err());
        assert!(!is_valid_address("0OIl"));
        assert!(is_valid_address(&mint));
    }

    #[test]
    fn derived_destination_is_enforced() {
        let wallet = unique_key();
        let mint = unique_key();
        let ata = associated_token_account(&wallet, &mint).unwrap();
        let pinned = requirements(20, Some(ata.to_string()));

        let to_wallet_ata = instruction(3, 20, vec![unique_key(), ata, unique_key()]);
        assert!(check_transfer(&to_wallet_ata, &pinned).is_ok());

        let elsewhere = instruction(3, 20, vec![unique_key(), unique_key(), unique_key()]);
        let err = check_transfer(&elsewhere, &pinned).unwrap_err();
        assert!(err.to_string().starts_with("Wrong recipient"), "{err}");
    }

    #[test]
    fn payer_extraction_is_best_effort() {
        let fixture = signed_transfer(3, 20);
        assert_eq!(payer_of(&to_base64(&fixture.tx)), fixture.payer.to_string());
        assert_eq!(payer_of("AAAA"), "unknown");
        assert_eq!(payer_of("%%%"), "unknown");
    }
}
