//! Provider Initializer (C4, spec §4.4).
//!
//! For each `(chain, providerName)` pair, builds a JSON-RPC client bound to the chain and
//! fetches the two pieces of state every later phase needs: the current block number and a
//! gas target. Either failing drops that provider for the cycle; other providers proceed
//! (spec §5 "Phase 3 ... all (chain, provider) pairs run concurrently and independently").

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use std::sync::Arc;

use crate::config::{ChainConfig, TxType};
use crate::error::ProviderError;
use crate::retry::{with_retry, RetryConfig};

/// Gas parameters to attach to an update transaction, resolved once per provider per cycle.
#[derive(Debug, Clone, Copy)]
pub enum GasTarget {
    Legacy {
        gas_price: U256,
    },
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

/// Everything phases 4.5–4.7 need about one successfully-initialized `(chain, provider)`.
#[derive(Clone)]
pub struct ProviderState {
    pub provider_name: String,
    pub chain_id: u64,
    pub client: Arc<dyn Provider>,
    pub contracts: crate::config::ContractAddresses,
    pub current_block: u64,
    pub gas_target: GasTarget,
    pub block_history_limit: u64,
}

async fn fetch_current_block(client: &dyn Provider) -> Result<u64, ProviderError> {
    with_retry(RetryConfig::default(), || async {
        client
            .get_block_number()
            .await
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ProviderError::CurrentBlock(e.to_string()))
}

async fn fetch_gas_target(
    client: &dyn Provider,
    options: &crate::config::ChainOptions,
) -> Result<GasTarget, ProviderError> {
    match options.tx_type {
        TxType::Legacy => {
            let gas_price = with_retry(RetryConfig::default(), || async {
                client.get_gas_price().await.map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| ProviderError::GasTarget(e.to_string()))?;
            Ok(GasTarget::Legacy {
                gas_price: U256::from(gas_price),
            })
        }
        TxType::Eip1559 => {
            let base_fee = with_retry(RetryConfig::default(), || async {
                let block = client
                    .get_block_by_number(alloy_rpc_types_eth::BlockNumberOrTag::Latest)
                    .await
                    .map_err(|e| e.to_string())?;
                block
                    .and_then(|b| b.header.base_fee_per_gas)
                    .ok_or_else(|| "latest block has no base fee".to_string())
            })
            .await
            .map_err(|e| ProviderError::GasTarget(e.to_string()))?;
            let priority_fee = options.priority_fee.to_wei();
            let max_fee_per_gas =
                U256::from(base_fee) * U256::from(options.base_fee_multiplier) + priority_fee;
            Ok(GasTarget::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas: priority_fee,
            })
        }
    }
}

/// Initializes every `(chain, providerName)` pair declared in `chains`, dropping and logging
/// any that fail to produce a current block and gas target.
#[tracing::instrument(skip_all)]
pub async fn initialize_providers(chains: &[ChainConfig]) -> Vec<ProviderState> {
    let mut states = Vec::new();
    for chain in chains.iter().filter(|c| c.is_evm()) {
        for (provider_name, url) in &chain.providers {
            let client: Arc<dyn Provider> =
                Arc::new(ProviderBuilder::new().connect_http(url.clone()));
            let current_block = match fetch_current_block(client.as_ref()).await {
                Ok(block) => block,
                Err(error) => {
                    tracing::error!(%error, chain_id = chain.id, provider = %provider_name, "dropping provider: current block fetch failed");
                    continue;
                }
            };
            let gas_target = match fetch_gas_target(client.as_ref(), &chain.options).await {
                Ok(target) => target,
                Err(error) => {
                    tracing::error!(%error, chain_id = chain.id, provider = %provider_name, "dropping provider: gas target fetch failed");
                    continue;
                }
            };
            states.push(ProviderState {
                provider_name: provider_name.clone(),
                chain_id: chain.id,
                client,
                contracts: chain.contracts,
                current_block,
                gas_target,
                block_history_limit: chain.block_history_limit(),
            });
        }
    }
    states
}

impl ProviderState {
    /// The lower bound of the event-history scan window for duplicate suppression (§4.7):
    /// `max(0, currentBlock - blockHistoryLimit)`.
    pub fn history_from_block(&self) -> u64 {
        self.current_block.saturating_sub(self.block_history_limit)
    }

    /// Fetches the pending transaction count for `address`, used to seed nonce assignment
    /// for a sponsor wallet (§4.6 step 2).
    pub async fn pending_nonce(&self, address: Address) -> Result<u64, ProviderError> {
        with_retry(RetryConfig::default(), || async {
            self.client
                .get_transaction_count(address)
                .pending()
                .await
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_from_block_saturates_at_zero() {
        let state = ProviderState {
            provider_name: "main".to_string(),
            chain_id: 1,
            client: Arc::new(ProviderBuilder::new().connect_http(
                url::Url::parse("http://localhost:8545").unwrap(),
            )),
            contracts: crate::config::ContractAddresses {
                airnode_rrp: Address::ZERO,
                rrp_beacon_server: Address::ZERO,
                dapi_server: Address::ZERO,
            },
            current_block: 10,
            gas_target: GasTarget::Legacy {
                gas_price: U256::ZERO,
            },
            block_history_limit: 300,
        };
        assert_eq!(state.history_from_block(), 0);
    }
}
