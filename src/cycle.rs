//! Orchestrator: wires C1→C7 in four sequential phases, fanning out concurrently within
//! each phase and synchronizing with a barrier between phases (spec §2, §5).
//!
//! Config merging (C1) happens before [`run_cycle`] is called, since a fatal config error
//! must abort before any network I/O (spec §7 kind 1); everything [`run_cycle`] itself does
//! is non-fatal per spec §7 kinds 2–4, so it never returns an error — only a summary of what
//! happened, for logging and for the invocation response body (spec §6).

use alloy_primitives::{B256, I256};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api_caller;
use crate::condition;
use crate::config::Config;
use crate::model::{BeaconJob, GroupedSubscription};
use crate::ois::Ois;
use crate::providers::{self, ProviderState};
use crate::sponsor::{self, Candidate};
use crate::submit::{self, PspItem, SubmissionOutcome};
use crate::triggers;

/// Default cycle-wide deadline: the keeper is invoked once per minute (spec §1, §5).
pub const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(55);

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub psp_submitted: u64,
    pub psp_skipped: u64,
    pub psp_failed: u64,
    pub rrp_submitted: u64,
    pub rrp_skipped_duplicate: u64,
    pub rrp_skipped_condition: u64,
    pub rrp_failed: u64,
    pub providers_initialized: u64,
    pub timed_out: bool,
}

fn record_outcomes(outcomes: Vec<SubmissionOutcome>, submitted: &mut u64, skipped: &mut u64, failed: &mut u64) {
    for outcome in outcomes {
        match outcome {
            SubmissionOutcome::Submitted { .. } => *submitted += 1,
            SubmissionOutcome::SkippedDuplicate => *skipped += 1,
            SubmissionOutcome::Failed { .. } => *failed += 1,
        }
    }
}

/// Runs one full invocation cycle against `config`, aborting cleanly if it would overrun
/// `deadline` (spec §5 "the top-level cycle MUST complete or be aborted before the scheduled
/// interval elapses").
pub async fn run_cycle(config: &Config, deadline: Duration) -> CycleSummary {
    let cancellation = CancellationToken::new();
    let guard = cancellation.clone();
    tokio::select! {
        summary = run_cycle_inner(config, &cancellation) => summary,
        _ = tokio::time::sleep(deadline) => {
            guard.cancel();
            tracing::error!(?deadline, "cycle deadline exceeded, aborting in-flight work");
            CycleSummary { timed_out: true, ..CycleSummary::default() }
        }
    }
}

#[tracing::instrument(skip_all)]
async fn run_cycle_inner(config: &Config, cancellation: &CancellationToken) -> CycleSummary {
    let mut summary = CycleSummary::default();

    // Phase 1: initialize (C2).
    let psp_groups = triggers::resolve_psp_triggers(config);
    let rrp_jobs = triggers::resolve_rrp_triggers(config);
    tracing::info!(psp_groups = psp_groups.len(), rrp_jobs = rrp_jobs.len(), "triggers resolved");

    if cancellation.is_cancelled() {
        return summary;
    }

    // Phase 2: call APIs (C3), psp and rrp concurrently with each other.
    let ois_by_title: HashMap<String, Ois> = config
        .ois
        .iter()
        .map(|ois| (ois.title.clone(), ois.clone()))
        .collect();
    let adapter: std::sync::Arc<dyn crate::http_adapter::HttpAdapter> =
        std::sync::Arc::new(crate::http_adapter::ReqwestHttpAdapter::new(
            gateway_url(config),
            Duration::from_millis(crate::retry::DEFAULT_TIMEOUT_MS),
        ));
    let (psp_values, rrp_values) = tokio::join!(
        api_caller::call_all_psp(adapter.clone(), &ois_by_title, psp_groups.clone(), &config.credentials),
        call_all_rrp(adapter.clone(), &ois_by_title, config, &rrp_jobs, &config.credentials),
    );

    if cancellation.is_cancelled() {
        return summary;
    }

    // Phase 3: initialize providers (C4).
    let provider_states = providers::initialize_providers(&config.chains).await;
    summary.providers_initialized = provider_states.len() as u64;
    tracing::info!(providers = provider_states.len(), "providers initialized");

    if cancellation.is_cancelled() {
        return summary;
    }

    // Phase 4: submit (C5, C6, C7) — one task per provider, all running concurrently.
    let mnemonic = config.mnemonic.clone();
    let airnode_wallet = match crate::wallet::derive_airnode_wallet(&mnemonic) {
        Ok(wallet) => wallet,
        Err(error) => {
            tracing::error!(%error, "failed to derive airnode wallet, skipping submission phase");
            return summary;
        }
    };

    let provider_futures = provider_states.iter().map(|provider| {
        run_provider_phase(
            provider,
            &mnemonic,
            &airnode_wallet,
            &psp_groups,
            &psp_values,
            &rrp_jobs,
            &rrp_values,
        )
    });
    let provider_summaries = futures::future::join_all(provider_futures).await;
    for partial in provider_summaries {
        summary.psp_submitted += partial.psp_submitted;
        summary.psp_skipped += partial.psp_skipped;
        summary.psp_failed += partial.psp_failed;
        summary.rrp_submitted += partial.rrp_submitted;
        summary.rrp_skipped_duplicate += partial.rrp_skipped_duplicate;
        summary.rrp_skipped_condition += partial.rrp_skipped_condition;
        summary.rrp_failed += partial.rrp_failed;
    }

    summary
}

fn gateway_url(config: &Config) -> url::Url {
    let _ = config;
    // The HTTP adapter gateway address is deployment-specific infrastructure, not part of the
    // update-cycle's own config surface (spec §1 "the off-chain HTTP adapter ... is out of
    // scope"); it is read directly from the environment rather than threaded through Config.
    std::env::var("AIRKEEPER_HTTP_GATEWAY_URL")
        .ok()
        .and_then(|raw| url::Url::parse(&raw).ok())
        .unwrap_or_else(|| url::Url::parse("http://localhost:8080/").unwrap())
}

async fn call_all_rrp(
    adapter: std::sync::Arc<dyn crate::http_adapter::HttpAdapter>,
    ois_by_title: &HashMap<String, Ois>,
    config: &Config,
    jobs: &[BeaconJob],
    credentials: &[crate::ois::OisCredentials],
) -> HashMap<B256, I256> {
    let futures = jobs.iter().map(|job| {
        let adapter = adapter.clone();
        async move {
            let endpoint = config.endpoints.get(&job.endpoint_id).or_else(|| {
                tracing::warn!(endpoint_id = %job.endpoint_id, beacon_id = %job.beacon_id(), "unknown endpointId, dropping work unit");
                None
            })?;
            let ois = ois_by_title.get(&endpoint.ois_title).or_else(|| {
                tracing::warn!(ois_title = %endpoint.ois_title, beacon_id = %job.beacon_id(), "unknown OIS title, dropping work unit");
                None
            })?;
            match api_caller::call_rrp_job(adapter.as_ref(), ois, &endpoint.endpoint_name, job, credentials).await {
                Ok(value) => Some((job.beacon_id(), value)),
                Err(error) => {
                    tracing::warn!(%error, beacon_id = %job.beacon_id(), "rrp api call failed, dropping work unit");
                    None
                }
            }
        }
    });
    futures::future::join_all(futures).await.into_iter().flatten().collect()
}

#[derive(Default)]
struct ProviderPhaseSummary {
    psp_submitted: u64,
    psp_skipped: u64,
    psp_failed: u64,
    rrp_submitted: u64,
    rrp_skipped_duplicate: u64,
    rrp_skipped_condition: u64,
    rrp_failed: u64,
}

#[allow(clippy::too_many_arguments)]
async fn run_provider_phase(
    provider: &ProviderState,
    mnemonic: &str,
    airnode_wallet: &alloy_signer_local::PrivateKeySigner,
    psp_groups: &[GroupedSubscription],
    psp_values: &crate::model::ApiValuesBySubscriptionId,
    rrp_jobs: &[BeaconJob],
    rrp_values: &HashMap<B256, I256>,
) -> ProviderPhaseSummary {
    let mut result = ProviderPhaseSummary::default();

    // PSP: evaluate the on-chain condition for every subscription on this chain with a
    // fetched value, then sequence and submit the survivors.
    let mut psp_candidates: Vec<Candidate<PspItem>> = Vec::new();
    for group in psp_groups {
        for subscription in &group.subscriptions {
            if subscription.chain_id != provider.chain_id {
                continue;
            }
            let Some(&api_value) = psp_values.get(&subscription.derive_id()) else {
                continue;
            };
            match condition::check_psp_condition(provider, subscription, api_value).await {
                Ok(true) => psp_candidates.push(Candidate {
                    subscription: PspItem {
                        subscription: subscription.clone(),
                        api_value,
                    },
                    sponsor: subscription.sponsor,
                }),
                Ok(false) => {
                    result.psp_skipped += 1;
                }
                Err(error) => {
                    tracing::warn!(%error, subscription_id = %subscription.derive_id(), "condition check failed, skipping");
                    result.psp_skipped += 1;
                }
            }
        }
    }
    let psp_batches = sponsor::sequence_psp(provider, mnemonic, psp_candidates).await;
    let psp_outcomes = futures::future::join_all(
        psp_batches
            .into_iter()
            .map(|batch| submit::submit_psp_batch(provider, airnode_wallet, batch)),
    )
    .await;
    for outcomes in psp_outcomes {
        record_outcomes(outcomes, &mut result.psp_submitted, &mut result.psp_skipped, &mut result.psp_failed);
    }

    // RRP: locally compute deviation against the on-chain beacon value.
    let mut rrp_candidates: Vec<Candidate<BeaconJob>> = Vec::new();
    for job in rrp_jobs {
        if let Some(chain_ids) = &job.chain_ids {
            if !chain_ids.contains(&provider.chain_id) {
                continue;
            }
        }
        let Some(&api_value) = rrp_values.get(&job.beacon_id()) else {
            continue;
        };
        let beacon_value = match condition::read_rrp_beacon_value(provider, job.beacon_id()).await {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, beacon_id = %job.beacon_id(), "failed to read on-chain beacon value, skipping");
                result.rrp_skipped_condition += 1;
                continue;
            }
        };
        match condition::rrp_condition_met(beacon_value, api_value, &job.deviation_percentage) {
            Ok(true) => rrp_candidates.push(Candidate {
                subscription: job.clone(),
                sponsor: job.keeper_sponsor,
            }),
            Ok(false) => result.rrp_skipped_condition += 1,
            Err(error) => {
                tracing::warn!(%error, beacon_id = %job.beacon_id(), "invalid deviationPercentage, skipping");
                result.rrp_skipped_condition += 1;
            }
        }
    }
    let rrp_batches = sponsor::sequence_rrp(provider, mnemonic, rrp_candidates).await;
    let rrp_outcomes =
        futures::future::join_all(rrp_batches.into_iter().map(|batch| submit::submit_rrp_batch(provider, batch)))
            .await;
    for outcomes in rrp_outcomes {
        for outcome in outcomes {
            match outcome {
                SubmissionOutcome::Submitted { .. } => result.rrp_submitted += 1,
                SubmissionOutcome::SkippedDuplicate => result.rrp_skipped_duplicate += 1,
                SubmissionOutcome::Failed { .. } => result.rrp_failed += 1,
            }
        }
    }

    result
}
