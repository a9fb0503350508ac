//! Deterministic wallet derivation (spec §6 "Wallet derivation", GLOSSARY "Sponsor wallet").
//!
//! Every sponsor wallet and the airnode wallet itself are BIP-32 children of one mnemonic,
//! at a path that must be byte-identical to the reference implementation so that the same
//! `(mnemonic, sponsor, protocolId)` always yields the same address. The path is
//! `m/44'/60'/0'/<protocolId>/<a>/<b>/<c>/<d>/<e>/<f>`, where `a..f` are six unhardened
//! indices obtained by treating the 20-byte sponsor address as a big-endian integer and
//! splitting it into 31-bit groups, least-significant group first.

use alloy_primitives::{Address, U256};
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use thiserror::Error;

/// Protocol-id path segments. See spec §6 and Design Note in §9 ("the constants must match
/// the on-chain expectation for each mode; keep them as explicit named constants and do not
/// unify").
pub mod protocol_id {
    /// RRP / airnode wallet (used to validate `airnodeAddress` and to sign PSP fulfillments).
    pub const AIRNODE: &str = "1";
    /// PSP sponsor wallet, current convention.
    pub const PSP: &str = "2";
    /// PSP sponsor wallet, previous convention. Kept distinct from [`PSP`] on purpose.
    pub const PSP_LEGACY: &str = "3";
    /// RRP keeper-job sponsor wallet convention.
    pub const RRP_KEEPER: &str = "12345";
}

const GROUP_BITS: u32 = 31;
const GROUP_COUNT: u32 = 6;

#[derive(Debug, Error)]
pub enum WalletDerivationError {
    #[error("invalid mnemonic or derivation path: {0}")]
    Signer(String),
}

/// Splits a 20-byte address, read as a big-endian integer, into six 31-bit unsigned groups,
/// least-significant group first (`a` in the path is the low 31 bits).
fn address_to_path_segments(address: Address) -> [u32; GROUP_COUNT as usize] {
    let value = U256::from_be_bytes(address.into_word().0);
    let mut segments = [0u32; GROUP_COUNT as usize];
    for (i, segment) in segments.iter_mut().enumerate() {
        let shifted = value >> (GROUP_BITS * i as u32);
        let masked = shifted & U256::from((1u64 << GROUP_BITS) - 1);
        *segment = masked.to::<u32>();
    }
    segments
}

/// Builds the full derivation path for a given sponsor address and protocol id.
pub fn derivation_path(sponsor: Address, protocol_id: &str) -> String {
    let segments = address_to_path_segments(sponsor);
    format!(
        "m/44'/60'/0'/{protocol_id}/{}/{}/{}/{}/{}/{}",
        segments[0], segments[1], segments[2], segments[3], segments[4], segments[5]
    )
}

/// Derives the sponsor wallet for `(mnemonic, sponsor, protocolId)`.
///
/// This wallet pays gas for the sponsor's transactions and is never the same as the
/// sponsor address itself; it is ephemeral for the cycle and owned by whichever
/// [`crate::sponsor`] task is driving that sponsor's submissions.
pub fn derive_sponsor_wallet(
    mnemonic: &str,
    sponsor: Address,
    protocol_id: &str,
) -> Result<PrivateKeySigner, WalletDerivationError> {
    let path = derivation_path(sponsor, protocol_id);
    let signer = MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .derivation_path(&path)
        .map_err(|e| WalletDerivationError::Signer(e.to_string()))?
        .build()
        .map_err(|e| WalletDerivationError::Signer(e.to_string()))?;
    Ok(signer)
}

/// Derives the airnode wallet at the fixed path `m/44'/60'/0'/0/0` (GLOSSARY "Airnode").
///
/// Used both to validate `airnodeAddress`/`airnodeXpub` during config merge (§4.1) and to
/// sign PSP fulfillment messages during submission (§4.7 step 2).
pub fn derive_airnode_wallet(mnemonic: &str) -> Result<PrivateKeySigner, WalletDerivationError> {
    let signer = MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .derivation_path("m/44'/60'/0'/0/0")
        .map_err(|e| WalletDerivationError::Signer(e.to_string()))?
        .build()
        .map_err(|e| WalletDerivationError::Signer(e.to_string()))?;
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer::Signer;

    const TEST_MNEMONIC: &str =
        "test test test test test test test test test test test junk";

    #[test]
    fn address_splits_into_six_groups_within_31_bits() {
        let address = Address::repeat_byte(0xff);
        let segments = address_to_path_segments(address);
        for segment in segments {
            assert!(segment < (1u32 << 31));
        }
    }

    #[test]
    fn derivation_path_uses_named_protocol_ids() {
        let sponsor = Address::repeat_byte(0x42);
        let psp_path = derivation_path(sponsor, protocol_id::PSP);
        let rrp_path = derivation_path(sponsor, protocol_id::RRP_KEEPER);
        assert!(psp_path.starts_with("m/44'/60'/0'/2/"));
        assert!(rrp_path.starts_with("m/44'/60'/0'/12345/"));
        assert_ne!(psp_path, rrp_path);
    }

    #[test]
    fn same_sponsor_and_protocol_always_yields_same_wallet() {
        let sponsor = Address::repeat_byte(0x07);
        let a = derive_sponsor_wallet(TEST_MNEMONIC, sponsor, protocol_id::PSP).unwrap();
        let b = derive_sponsor_wallet(TEST_MNEMONIC, sponsor, protocol_id::PSP).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn different_sponsors_yield_different_wallets() {
        let a =
            derive_sponsor_wallet(TEST_MNEMONIC, Address::repeat_byte(0x01), protocol_id::PSP)
                .unwrap();
        let b =
            derive_sponsor_wallet(TEST_MNEMONIC, Address::repeat_byte(0x02), protocol_id::PSP)
                .unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn different_protocol_ids_yield_different_wallets_for_same_sponsor() {
        let sponsor = Address::repeat_byte(0x09);
        let psp = derive_sponsor_wallet(TEST_MNEMONIC, sponsor, protocol_id::PSP).unwrap();
        let legacy =
            derive_sponsor_wallet(TEST_MNEMONIC, sponsor, protocol_id::PSP_LEGACY).unwrap();
        let rrp = derive_sponsor_wallet(TEST_MNEMONIC, sponsor, protocol_id::RRP_KEEPER).unwrap();
        assert_ne!(psp.address(), legacy.address());
        assert_ne!(psp.address(), rrp.address());
    }

    #[test]
    fn airnode_wallet_is_deterministic() {
        let a = derive_airnode_wallet(TEST_MNEMONIC).unwrap();
        let b = derive_airnode_wallet(TEST_MNEMONIC).unwrap();
        assert_eq!(a.address(), b.address());
    }
}
