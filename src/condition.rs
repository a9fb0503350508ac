//! Condition Checker (C5, spec §4.5).
//!
//! Decides whether a candidate update is worth submitting. PSP subscriptions dispatch to an
//! on-chain view function selected by the `conditionFunctionId` byte selector embedded in
//! `subscription.conditions`; RRP beacon jobs compare a locally-computed deviation against a
//! percentage threshold with no on-chain call at all.

use alloy_primitives::{I256, U256};
use alloy_sol_types::SolValue;

use crate::contracts::{DapiServer, RrpBeaconServer};
use crate::error::WorkUnitError;
use crate::model::Subscription;
use crate::providers::ProviderState;
use alloy_primitives::B256;

/// The only condition selector this keeper understands (spec §9 "represent the
/// selector-to-function mapping as a lookup over a fixed set of known selectors plus a
/// fallback error").
const CONDITION_PSP_BEACON_UPDATE_SELECTOR: [u8; 4] =
    DapiServer::conditionPspBeaconUpdateCall::SELECTOR;

/// Evaluates a PSP subscription's on-chain condition for `api_value`. Returns `false` (no
/// update) on any call failure, per §4.5 "a failed call or `false` drops the subscription".
pub async fn check_psp_condition(
    provider: &ProviderState,
    subscription: &Subscription,
    api_value: I256,
) -> Result<bool, WorkUnitError> {
    let (selector, condition_parameters) = subscription
        .decode_conditions()
        .map_err(|e| WorkUnitError::Condition(e.to_string()))?;
    if selector.0 != CONDITION_PSP_BEACON_UPDATE_SELECTOR {
        return Err(WorkUnitError::Condition(format!(
            "unsupported condition selector {selector}"
        )));
    }
    let data = api_value.abi_encode();
    let call = DapiServer::conditionPspBeaconUpdateCall {
        subscriptionId: subscription.derive_id(),
        data: data.into(),
        conditionParameters: condition_parameters,
    };
    let contract = DapiServer::new(provider.contracts.dapi_server, provider.client.clone());
    contract
        .conditionPspBeaconUpdate(call.subscriptionId, call.data, call.conditionParameters)
        .call()
        .await
        .map_err(|e| WorkUnitError::Condition(e.to_string()))
}

/// Reads the current on-chain value for `beacon_id`, the left-hand side of the RRP
/// deviation comparison (spec §4.5, §6 `RrpBeaconServer.readBeacon`).
pub async fn read_rrp_beacon_value(
    provider: &ProviderState,
    beacon_id: B256,
) -> Result<I256, WorkUnitError> {
    let contract = RrpBeaconServer::new(provider.contracts.rrp_beacon_server, provider.client.clone());
    let value = contract
        .readBeacon(beacon_id)
        .call()
        .await
        .map_err(|e| WorkUnitError::Condition(e.to_string()))?;
    Ok(I256::try_from(value.value).unwrap_or(I256::ZERO))
}

/// `10^18`, the fixed-point scale the deviation ratio is expressed in (spec §4.5).
const DEVIATION_SCALE: u128 = 1_000_000_000_000_000_000;
/// The value of one hundredth-of-a-percent (`0.01%`) expressed at [`DEVIATION_SCALE`]:
/// `0.01% * 10^18 / 100 = 10^14`, matching spec §9's "1% = 10^14" (100 of these units).
const HUNDREDTH_PERCENT_UNIT: u128 = 100_000_000_000_000;

/// Computes `|beacon - api| * 10^18 / max(beacon, 1)` and compares it against
/// `deviationPercentage` (a decimal string with up to two decimal places), entirely in
/// signed 256-bit fixed point — no floating point anywhere in this path (spec §9).
pub fn rrp_condition_met(
    beacon_value: I256,
    api_value: I256,
    deviation_percentage: &str,
) -> Result<bool, WorkUnitError> {
    let threshold = parse_deviation_percentage(deviation_percentage)?;
    let diff = (beacon_value - api_value).unsigned_abs();
    let denominator = if beacon_value.is_zero() {
        U256::from(1u8)
    } else {
        beacon_value.unsigned_abs()
    };
    let deviation = diff
        .checked_mul(U256::from(DEVIATION_SCALE))
        .ok_or_else(|| WorkUnitError::Condition("deviation overflow".to_string()))?
        / denominator;
    Ok(deviation > threshold)
}

/// Parses a decimal string with up to two decimal places (e.g. `"0.75"`, `"5"`) into the
/// `10^16`-scaled basis-point representation `rrp_condition_met` compares against.
fn parse_deviation_percentage(raw: &str) -> Result<U256, WorkUnitError> {
    let raw = raw.trim();
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if frac.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(WorkUnitError::Condition(format!(
            "invalid deviationPercentage `{raw}`"
        )));
    }
    let whole: u128 = whole.parse().unwrap_or(0);
    let frac_padded = format!("{frac:0<2}");
    let hundredths: u128 = frac_padded.parse().unwrap_or(0);
    // whole percent contributes 100 hundredths-of-a-percent each; frac is already in
    // hundredths-of-a-percent since it's padded/truncated to exactly two digits.
    let hundredths_of_percent = whole * 100 + hundredths;
    Ok(U256::from(hundredths_of_percent) * U256::from(HUNDREDTH_PERCENT_UNIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_values_never_exceed_deviation() {
        let value = I256::try_from(100_000i128).unwrap();
        assert!(!rrp_condition_met(value, value, "0.01").unwrap());
    }

    #[test]
    fn large_deviation_exceeds_small_threshold() {
        let beacon = I256::try_from(100i128).unwrap();
        let api = I256::try_from(200i128).unwrap();
        assert!(rrp_condition_met(beacon, api, "1").unwrap());
    }

    #[test]
    fn small_deviation_stays_under_loose_threshold() {
        let beacon = I256::try_from(100_000i128).unwrap();
        let api = I256::try_from(100_050i128).unwrap();
        assert!(!rrp_condition_met(beacon, api, "5").unwrap());
    }

    #[test]
    fn zero_beacon_value_uses_one_as_denominator() {
        let beacon = I256::try_from(0i128).unwrap();
        let api = I256::try_from(1i128).unwrap();
        assert!(rrp_condition_met(beacon, api, "0.01").unwrap());
    }

    #[test]
    fn rejects_malformed_percentage_strings() {
        assert!(parse_deviation_percentage("1.2.3").is_err());
        assert!(parse_deviation_percentage("abc").is_err());
        assert!(parse_deviation_percentage("1.234").is_err());
    }

    #[test]
    fn parses_two_decimal_places() {
        // 0.75% == 75 hundredths-of-a-percent == 75 * 10^14
        let parsed = parse_deviation_percentage("0.75").unwrap();
        assert_eq!(parsed, U256::from(75u128) * U256::from(HUNDREDTH_PERCENT_UNIT));
    }
}
