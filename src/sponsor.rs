//! Sponsor-Wallet Sequencer (C6, spec §4.6).
//!
//! Groups surviving subscriptions by sponsor, derives each sponsor's wallet, fetches its
//! pending nonce once, and assigns strictly increasing nonces in stable order. A sponsor
//! whose nonce fetch fails drops its entire group for this cycle (spec §7 kind 2 analogue
//! for sponsors — the failure is per-sponsor, not per-subscription).

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use std::collections::HashMap;

use crate::error::WorkUnitError;
use crate::providers::ProviderState;
use crate::wallet::{self, protocol_id};

/// One candidate update, carrying everything needed once it reaches C7.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub subscription: T,
    pub sponsor: Address,
}

/// A sponsor's subscriptions with their assigned wallet and nonces, in submission order.
pub struct SponsorBatch<T> {
    pub sponsor: Address,
    pub wallet: PrivateKeySigner,
    /// Parallel to the nonce sequence: `items[i]` is submitted with nonce `first_nonce + i`.
    pub items: Vec<T>,
    pub first_nonce: u64,
}

/// Groups candidates by sponsor preserving first-seen order (spec §5 ordering guarantee 1:
/// "transactions are submitted in the order subscriptions appear after grouping").
fn group_by_sponsor<T: Clone>(candidates: Vec<Candidate<T>>) -> Vec<(Address, Vec<T>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<Address, Vec<T>> = HashMap::new();
    for candidate in candidates {
        groups
            .entry(candidate.sponsor)
            .or_insert_with(|| {
                order.push(candidate.sponsor);
                Vec::new()
            })
            .push(candidate.subscription);
    }
    order
        .into_iter()
        .map(|sponsor| (sponsor, groups.remove(&sponsor).unwrap_or_default()))
        .collect()
}

/// Runs C6 for one provider's PSP candidates, using protocol-id `"2"`.
#[tracing::instrument(skip_all, fields(provider = %provider.provider_name))]
pub async fn sequence_psp<T: Clone>(
    provider: &ProviderState,
    mnemonic: &str,
    candidates: Vec<Candidate<T>>,
) -> Vec<SponsorBatch<T>> {
    sequence(provider, mnemonic, protocol_id::PSP, candidates).await
}

/// Runs C6 for one provider's RRP candidates, using protocol-id `"12345"` (spec §9: keep
/// PSP's `"2"` and RRP keeper's `"12345"` as distinct named constants, do not unify).
#[tracing::instrument(skip_all, fields(provider = %provider.provider_name))]
pub async fn sequence_rrp<T: Clone>(
    provider: &ProviderState,
    mnemonic: &str,
    candidates: Vec<Candidate<T>>,
) -> Vec<SponsorBatch<T>> {
    sequence(provider, mnemonic, protocol_id::RRP_KEEPER, candidates).await
}

async fn sequence<T: Clone>(
    provider: &ProviderState,
    mnemonic: &str,
    protocol_id: &str,
    candidates: Vec<Candidate<T>>,
) -> Vec<SponsorBatch<T>> {
    let mut batches = Vec::new();
    for (sponsor, items) in group_by_sponsor(candidates) {
        match sequence_one_sponsor(provider, mnemonic, protocol_id, sponsor, items).await {
            Ok(batch) => batches.push(batch),
            Err(error) => {
                tracing::error!(%error, %sponsor, "dropping sponsor: nonce sequencing failed");
            }
        }
    }
    batches
}

async fn sequence_one_sponsor<T>(
    provider: &ProviderState,
    mnemonic: &str,
    protocol_id: &str,
    sponsor: Address,
    items: Vec<T>,
) -> Result<SponsorBatch<T>, WorkUnitError> {
    let derived = wallet::derive_sponsor_wallet(mnemonic, sponsor, protocol_id)
        .map_err(|e| WorkUnitError::NonceFetch(e.to_string()))?;
    let first_nonce = provider
        .pending_nonce(derived.address())
        .await
        .map_err(|e| WorkUnitError::NonceFetch(e.to_string()))?;
    Ok(SponsorBatch {
        sponsor,
        wallet: derived,
        items,
        first_nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_preserve_first_seen_sponsor_order() {
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        let candidates = vec![
            Candidate { subscription: "x1", sponsor: b },
            Candidate { subscription: "x2", sponsor: a },
            Candidate { subscription: "x3", sponsor: b },
        ];
        let grouped = group_by_sponsor(candidates);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, b);
        assert_eq!(grouped[0].1, vec!["x1", "x3"]);
        assert_eq!(grouped[1].0, a);
        assert_eq!(grouped[1].1, vec!["x2"]);
    }
}
