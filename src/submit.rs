//! Transaction Submitter (C7, spec §4.7).
//!
//! Processes one sponsor's subscriptions sequentially in nonce order (different sponsors run
//! in parallel — see [`crate::cycle`]). For RRP, first checks recent event history to avoid
//! re-requesting a beacon update already awaiting fulfillment; then signs and submits the
//! mode-appropriate transaction. A submission failure is logged but does not halt the
//! sponsor's remaining subscriptions, and its nonce is *not* reused (spec §7 kind 3, §9 open
//! question on nonce consumption).

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Bytes, B256, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolValue;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::contracts::{AirnodeRrp, DapiServer, RrpBeaconServer};
use crate::error::WorkUnitError;
use crate::model::Subscription;
use crate::providers::{GasTarget, ProviderState};
use crate::sponsor::SponsorBatch;

const GAS_LIMIT: u64 = 500_000;

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs()
}

/// Applies the provider's resolved gas target (legacy or EIP-1559) to a transaction request.
fn with_gas_target(request: TransactionRequest, gas_target: GasTarget) -> TransactionRequest {
    match gas_target {
        GasTarget::Legacy { gas_price } => request.with_gas_price(gas_price.to::<u128>()),
        GasTarget::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => request
            .with_max_fee_per_gas(max_fee_per_gas.to::<u128>())
            .with_max_priority_fee_per_gas(max_priority_fee_per_gas.to::<u128>()),
    }
}

/// Signs `request` with `signer` and submits it through `provider`, returning the tx hash.
async fn sign_and_send(
    provider: &ProviderState,
    signer: &PrivateKeySigner,
    request: TransactionRequest,
) -> Result<B256, WorkUnitError> {
    let wallet = EthereumWallet::from(signer.clone());
    let envelope = request
        .with_chain_id(provider.chain_id)
        .build(&wallet)
        .await
        .map_err(|e| WorkUnitError::Submission(e.to_string()))?;
    let pending = provider
        .client
        .send_tx_envelope(envelope)
        .await
        .map_err(|e| WorkUnitError::Submission(e.to_string()))?;
    Ok(*pending.tx_hash())
}

/// Scans `[from_block, provider.current_block]` for `RequestedBeaconUpdate` events on
/// `beacon_id` with no matching `UpdatedBeacon` by `requestId`, and returns the ones still
/// awaiting fulfillment on-chain (spec §4.7 step 1).
async fn pending_rrp_request_ids(
    provider: &ProviderState,
    beacon_id: B256,
) -> Result<Vec<B256>, WorkUnitError> {
    let contract = RrpBeaconServer::new(provider.contracts.rrp_beacon_server, provider.client.clone());
    let airnode_rrp = AirnodeRrp::new(provider.contracts.airnode_rrp, provider.client.clone());
    let from_block = provider.history_from_block();

    let requested = contract
        .event_filter::<RrpBeaconServer::RequestedBeaconUpdate>()
        .topic1(beacon_id)
        .from_block(from_block)
        .to_block(provider.current_block)
        .query()
        .await
        .map_err(|e| WorkUnitError::EventHistory(e.to_string()))?;
    let fulfilled = contract
        .event_filter::<RrpBeaconServer::UpdatedBeacon>()
        .topic1(beacon_id)
        .from_block(from_block)
        .to_block(provider.current_block)
        .query()
        .await
        .map_err(|e| WorkUnitError::EventHistory(e.to_string()))?;

    let fulfilled_request_ids: HashSet<B256> = fulfilled
        .into_iter()
        .map(|(event, _)| event.requestId)
        .collect();

    let mut pending = Vec::new();
    for (event, _) in requested {
        if !fulfilled_request_ids.contains(&event.requestId) {
            let awaiting = airnode_rrp
                .requestIsAwaitingFulfillment(event.requestId)
                .call()
                .await
                .map_err(|e| WorkUnitError::EventHistory(e.to_string()))?;
            if awaiting {
                pending.push(event.requestId);
            }
        }
    }
    Ok(pending)
}

/// Outcome of submitting one subscription, used by the orchestrator for cycle-level logging.
pub enum SubmissionOutcome {
    Submitted { tx_hash: B256 },
    SkippedDuplicate,
    Failed { error: WorkUnitError },
}

/// Signs and submits a PSP `fulfillPspBeaconUpdate` transaction (spec §4.7 step 2).
async fn submit_psp(
    provider: &ProviderState,
    airnode_wallet: &PrivateKeySigner,
    sponsor_wallet: &PrivateKeySigner,
    subscription: &Subscription,
    api_value: alloy_primitives::I256,
    nonce: u64,
) -> Result<B256, WorkUnitError> {
    let subscription_id = subscription.derive_id();
    let timestamp = now_seconds();
    let message =
        (subscription_id, U256::from(timestamp), sponsor_wallet.address()).abi_encode_packed();
    let digest = alloy_primitives::keccak256(message);
    let signature = airnode_wallet
        .sign_message(digest.as_slice())
        .await
        .map_err(|e| WorkUnitError::Submission(e.to_string()))?;
    let data: Bytes = api_value.abi_encode().into();

    let contract = DapiServer::new(provider.contracts.dapi_server, provider.client.clone());
    let calldata = contract
        .fulfillPspBeaconUpdate(
            subscription_id,
            subscription.airnode_address,
            subscription.relayer,
            subscription.sponsor,
            U256::from(timestamp),
            data,
            signature.as_bytes().into(),
        )
        .calldata()
        .clone();

    let request = TransactionRequest::default()
        .with_to(provider.contracts.dapi_server)
        .with_input(calldata)
        .with_nonce(nonce)
        .with_gas_limit(GAS_LIMIT);
    let request = with_gas_target(request, provider.gas_target);
    sign_and_send(provider, sponsor_wallet, request).await
}

/// Signs and submits an RRP `requestBeaconUpdate` transaction (spec §4.7 step 3).
async fn submit_rrp(
    provider: &ProviderState,
    sponsor_wallet: &PrivateKeySigner,
    job: &crate::model::BeaconJob,
    nonce: u64,
) -> Result<B256, WorkUnitError> {
    let contract = RrpBeaconServer::new(provider.contracts.rrp_beacon_server, provider.client.clone());
    let calldata = contract
        .requestBeaconUpdate(
            job.template_id,
            job.request_sponsor,
            sponsor_wallet.address(),
            job.template_parameters.clone(),
        )
        .calldata()
        .clone();

    let request = TransactionRequest::default()
        .with_to(provider.contracts.rrp_beacon_server)
        .with_input(calldata)
        .with_nonce(nonce)
        .with_gas_limit(GAS_LIMIT);
    let request = with_gas_target(request, provider.gas_target);
    sign_and_send(provider, sponsor_wallet, request).await
}

/// A PSP candidate carrying what C7 needs beyond the subscription itself.
pub struct PspItem {
    pub subscription: Subscription,
    pub api_value: alloy_primitives::I256,
}

/// Runs C7 for one sponsor's PSP batch, strictly sequentially (spec §5 "within one sponsor,
/// subscriptions run strictly sequentially to preserve nonce order").
#[tracing::instrument(skip_all, fields(sponsor = %batch.sponsor, count = batch.items.len()))]
pub async fn submit_psp_batch(
    provider: &ProviderState,
    airnode_wallet: &PrivateKeySigner,
    batch: SponsorBatch<PspItem>,
) -> Vec<SubmissionOutcome> {
    let mut outcomes = Vec::with_capacity(batch.items.len());
    for (offset, item) in batch.items.into_iter().enumerate() {
        let nonce = batch.first_nonce + offset as u64;
        let result = submit_psp(
            provider,
            airnode_wallet,
            &batch.wallet,
            &item.subscription,
            item.api_value,
            nonce,
        )
        .await;
        match result {
            Ok(tx_hash) => outcomes.push(SubmissionOutcome::Submitted { tx_hash }),
            Err(error) => {
                tracing::error!(%error, subscription_id = %item.subscription.derive_id(), "psp submission failed, nonce consumed");
                outcomes.push(SubmissionOutcome::Failed { error });
            }
        }
    }
    outcomes
}

/// Runs C7 for one sponsor's RRP batch: first filters out beacon jobs with a duplicate
/// request already awaiting fulfillment, then submits the rest sequentially.
#[tracing::instrument(skip_all, fields(sponsor = %batch.sponsor, count = batch.items.len()))]
pub async fn submit_rrp_batch(
    provider: &ProviderState,
    batch: SponsorBatch<crate::model::BeaconJob>,
) -> Vec<SubmissionOutcome> {
    let mut outcomes = Vec::with_capacity(batch.items.len());
    let mut nonce = batch.first_nonce;
    for job in batch.items {
        let beacon_id = job.beacon_id();
        match pending_rrp_request_ids(provider, beacon_id).await {
            Ok(pending) if !pending.is_empty() => {
                tracing::warn!(%beacon_id, "skipping duplicate: request already awaiting fulfillment");
                outcomes.push(SubmissionOutcome::SkippedDuplicate);
                continue;
            }
            Err(error) => {
                tracing::warn!(%error, %beacon_id, "event history fetch failed, skipping duplicate check");
            }
            _ => {}
        }
        let result = submit_rrp(provider, &batch.wallet, &job, nonce).await;
        nonce += 1;
        match result {
            Ok(tx_hash) => outcomes.push(SubmissionOutcome::Submitted { tx_hash }),
            Err(error) => {
                tracing::error!(%error, %beacon_id, "rrp submission failed, nonce consumed");
                outcomes.push(SubmissionOutcome::Failed { error });
            }
        }
    }
    outcomes
}
