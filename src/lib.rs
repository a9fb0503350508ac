//! Airkeeper: a periodically-invoked oracle beacon-update keeper.
//!
//! Each invocation runs one bounded cycle: merge the node and keeper configuration, resolve
//! and validate the PSP and RRP trigger lists, fetch off-chain values through an HTTP
//! adapter, initialize the configured chain providers, evaluate each candidate update's
//! on-chain or locally-computed condition, sequence surviving updates by sponsor wallet and
//! nonce, and submit signed transactions. See [`cycle::run_cycle`] for the orchestration.
//!
//! # Modules
//!
//! - [`config`] — Config Merger (C1): merges the node and keeper documents into one
//!   validated [`config::Config`].
//! - [`triggers`] — Trigger Resolver (C2): validates trigger lists against the entity maps
//!   and groups PSP subscriptions by shared template.
//! - [`api_caller`] — API Caller (C3): resolves off-chain values through the HTTP adapter.
//! - [`providers`] — Provider Initializer (C4): builds a JSON-RPC client and resolves a gas
//!   target for each configured chain provider.
//! - [`condition`] — Condition Checker (C5): evaluates PSP on-chain conditions and RRP
//!   deviation thresholds.
//! - [`sponsor`] — Sponsor-Wallet Sequencer (C6): groups candidates by sponsor, derives
//!   wallets, and assigns nonces.
//! - [`submit`] — Transaction Submitter (C7): signs and submits update transactions,
//!   suppressing duplicate RRP requests.
//! - [`cycle`] — Orchestrator: wires C1–C7 into one cycle with a deadline.
//! - [`model`] — Core data model and identity-hash invariants.
//! - [`wallet`] — BIP-32 sponsor and airnode wallet derivation.
//! - [`contracts`] — On-chain ABI surface.
//! - [`ois`] — Minimal Oracle Integration Specification surface.
//! - [`http_adapter`] — The off-chain HTTP adapter boundary.
//! - [`retry`] — Bounded retry with backoff and jitter.
//! - [`error`] — The four error kinds (§7) used throughout.
//! - [`telemetry`] — Tracing and optional OpenTelemetry export setup.
//! - [`sig_down`] — Graceful shutdown on SIGTERM/SIGINT for local invocation.

pub mod api_caller;
pub mod condition;
pub mod config;
pub mod contracts;
pub mod cycle;
pub mod error;
pub mod http_adapter;
pub mod model;
pub mod ois;
pub mod providers;
pub mod retry;
pub mod sig_down;
pub mod sponsor;
pub mod submit;
pub mod telemetry;
pub mod triggers;
pub mod wallet;
