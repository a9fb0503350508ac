//! Core data model: templates, endpoints, subscriptions, beacon jobs, and the
//! identity-hash invariants that bind a declared id to its canonical derivation (spec §3).

use alloy_primitives::{Address, Bytes, FixedBytes, B256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request template: an endpoint plus a fixed set of encoded parameters.
///
/// Identity: `keccak256(solidityPack(["bytes32", "bytes"], [endpointId, templateParameters]))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "endpointId")]
    pub endpoint_id: B256,
    #[serde(rename = "templateParameters")]
    pub template_parameters: Bytes,
}

impl Template {
    /// Derives the canonical template id from its fields.
    pub fn derive_id(&self) -> B256 {
        let packed = (self.endpoint_id, self.template_parameters.clone()).abi_encode_packed();
        alloy_primitives::keccak256(packed)
    }
}

/// An off-chain API endpoint descriptor: an OIS title plus a named operation within it.
///
/// Identity: `keccak256(defaultAbiCoder.encode(["string", "string"], [oisTitle, endpointName]))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "oisTitle")]
    pub ois_title: String,
    #[serde(rename = "endpointName")]
    pub endpoint_name: String,
}

impl Endpoint {
    /// Derives the canonical endpoint id from its fields.
    pub fn derive_id(&self) -> B256 {
        let encoded = (self.ois_title.clone(), self.endpoint_name.clone()).abi_encode_params();
        alloy_primitives::keccak256(encoded)
    }
}

/// A PSP subscription: a full nine-tuple describing one automated push-style update.
///
/// Identity: `keccak256(defaultAbiCoder.encode([...9 types], [...9 fields]))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    #[serde(rename = "airnodeAddress")]
    pub airnode_address: Address,
    #[serde(rename = "templateId")]
    pub template_id: B256,
    pub parameters: Bytes,
    pub conditions: Bytes,
    pub relayer: Address,
    pub sponsor: Address,
    pub requester: Address,
    #[serde(rename = "fulfillFunctionId")]
    pub fulfill_function_id: FixedBytes<4>,
}

impl Subscription {
    /// Derives the canonical subscription id from its nine fields.
    pub fn derive_id(&self) -> B256 {
        let encoded = (
            alloy_primitives::U256::from(self.chain_id),
            self.airnode_address,
            self.template_id,
            self.parameters.clone(),
            self.conditions.clone(),
            self.relayer,
            self.sponsor,
            self.requester,
            self.fulfill_function_id,
        )
            .abi_encode_params();
        alloy_primitives::keccak256(encoded)
    }

    /// Decodes `conditions` into the selector and parameters used by the condition check (§4.5).
    ///
    /// `conditions` is ABI-encoded as `(bytes4 conditionFunctionId, bytes conditionParameters)`.
    pub fn decode_conditions(&self) -> Result<(FixedBytes<4>, Bytes), alloy_sol_types::Error> {
        <(FixedBytes<4>, Bytes)>::abi_decode_params(&self.conditions)
    }
}

/// A legacy RRP beacon-update trigger.
///
/// `beaconId = keccak256(solidityPack(["bytes32", "bytes"], [templateId, templateParameters]))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconJob {
    #[serde(rename = "templateId")]
    pub template_id: B256,
    #[serde(rename = "templateParameters")]
    pub template_parameters: Bytes,
    #[serde(rename = "endpointId")]
    pub endpoint_id: B256,
    #[serde(rename = "deviationPercentage")]
    pub deviation_percentage: String,
    #[serde(rename = "keeperSponsor")]
    pub keeper_sponsor: Address,
    #[serde(rename = "requestSponsor")]
    pub request_sponsor: Address,
    #[serde(rename = "chainIds", default, skip_serializing_if = "Option::is_none")]
    pub chain_ids: Option<Vec<u64>>,
}

impl BeaconJob {
    /// Derives the beacon id this job updates.
    pub fn beacon_id(&self) -> B256 {
        let packed = (self.template_id, self.template_parameters.clone()).abi_encode_packed();
        alloy_primitives::keccak256(packed)
    }
}

/// Subscriptions sharing one template: they share a single off-chain API call (§4.2).
#[derive(Debug, Clone)]
pub struct GroupedSubscription {
    pub subscriptions: Vec<Subscription>,
    pub template: Template,
    pub endpoint: Endpoint,
}

/// Values fetched from the off-chain API this cycle, keyed by subscription id (PSP)
/// or beacon id (RRP). Shared read-only once phase 2 (API calls) completes.
pub type ApiValuesBySubscriptionId = HashMap<B256, alloy_primitives::I256>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn endpoint_id_is_stable() {
        let endpoint = Endpoint {
            ois_title: "coinmarketcap".to_string(),
            endpoint_name: "coin-market-data".to_string(),
        };
        let id1 = endpoint.derive_id();
        let id2 = endpoint.derive_id();
        assert_eq!(id1, id2);
    }

    #[test]
    fn template_id_changes_with_parameters() {
        let endpoint_id = B256::repeat_byte(0x11);
        let t1 = Template {
            endpoint_id,
            template_parameters: Bytes::from_str("0x1234").unwrap(),
        };
        let t2 = Template {
            endpoint_id,
            template_parameters: Bytes::from_str("0x5678").unwrap(),
        };
        assert_ne!(t1.derive_id(), t2.derive_id());
    }

    #[test]
    fn subscription_id_is_deterministic_over_all_nine_fields() {
        let sub = Subscription {
            chain_id: 1,
            airnode_address: Address::repeat_byte(0x01),
            template_id: B256::repeat_byte(0x02),
            parameters: Bytes::from_str("0xbeef").unwrap(),
            conditions: Bytes::from_str("0xcafe").unwrap(),
            relayer: Address::repeat_byte(0x03),
            sponsor: Address::repeat_byte(0x04),
            requester: Address::repeat_byte(0x05),
            fulfill_function_id: FixedBytes::<4>::from([0xaa, 0xbb, 0xcc, 0xdd]),
        };
        let mut other = sub.clone();
        other.sponsor = Address::repeat_byte(0x09);
        assert_ne!(sub.derive_id(), other.derive_id());
        assert_eq!(sub.derive_id(), sub.clone().derive_id());
    }

    #[test]
    fn beacon_id_matches_template_style_packing() {
        let job = BeaconJob {
            template_id: B256::repeat_byte(0x07),
            template_parameters: Bytes::from_str("0x1234").unwrap(),
            endpoint_id: B256::repeat_byte(0x08),
            deviation_percentage: "0.5".to_string(),
            keeper_sponsor: Address::repeat_byte(0x01),
            request_sponsor: Address::repeat_byte(0x02),
            chain_ids: None,
        };
        let template = Template {
            endpoint_id: job.template_id,
            template_parameters: job.template_parameters.clone(),
        };
        assert_eq!(job.beacon_id(), template.derive_id());
    }
}
