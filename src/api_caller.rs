//! C3: API Caller.
//!
//! For each distinct work unit (a template shared by a group of PSP subscriptions, or an
//! RRP beacon job), resolves the endpoint through the [`HttpAdapter`], applies the
//! endpoint's reserved parameters to extract a single numeric field, and encodes it as a
//! signed 256-bit integer. A work unit's failure is isolated: it is dropped with a warning
//! and does not affect any other work unit running concurrently (§4.3, §5).

use alloy_primitives::I256;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::WorkUnitError;
use crate::http_adapter::{AdapterRequest, HttpAdapter};
use crate::model::{BeaconJob, GroupedSubscription};
use crate::ois::{Ois, OisCredentials, ReservedParameters};
use crate::retry::{with_retry, RetryConfig};

/// Walks a dot-separated `_path` into a JSON value (array indices are plain numeric
/// segments, matching the reserved-parameter convention used by Airnode OIS endpoints).
fn extract_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = if let Ok(index) = segment.parse::<usize>() {
            current.as_array()?.get(index)?
        } else {
            current.as_object()?.get(segment)?
        };
    }
    Some(current)
}

/// Coerces a JSON scalar (string or number) to a [`Decimal`] without going through `f64`.
fn json_to_decimal(value: &serde_json::Value) -> Result<Decimal, WorkUnitError> {
    match value {
        serde_json::Value::String(s) => {
            Decimal::from_str(s).map_err(|e| WorkUnitError::ApiCall(e.to_string()))
        }
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .map_err(|e| WorkUnitError::ApiCall(e.to_string())),
        other => Err(WorkUnitError::ApiCall(format!(
            "expected a numeric or string value, got {other}"
        ))),
    }
}

/// Applies `reserved.path` then `reserved.times` to a structured adapter response,
/// producing the signed 256-bit integer the rest of the cycle operates on.
///
/// `_type` presence is mandatory (§4.3); its value is not otherwise interpreted here since
/// `int256` is the only encoding the core consumes.
pub fn extract_value(
    response: &serde_json::Value,
    reserved: &ReservedParameters,
) -> Result<I256, WorkUnitError> {
    if reserved.type_.is_none() {
        return Err(WorkUnitError::MissingType);
    }
    let selected = match &reserved.path {
        Some(path) => {
            extract_path(response, path).ok_or_else(|| {
                WorkUnitError::ApiCall(format!("_path `{path}` did not resolve"))
            })?
        }
        None => response,
    };
    let raw = json_to_decimal(selected)?;
    let times = match &reserved.times {
        Some(times) => {
            Decimal::from_str(times).map_err(|e| WorkUnitError::ApiCall(e.to_string()))?
        }
        None => Decimal::ONE,
    };
    let scaled = raw
        .checked_mul(times)
        .ok_or_else(|| WorkUnitError::ApiCall("value overflow during scaling".to_string()))?
        .round();
    let as_i128: i128 = scaled
        .try_into()
        .map_err(|_| WorkUnitError::ApiCall("scaled value out of i128 range".to_string()))?;
    Ok(I256::try_from(as_i128).expect("i128 always fits in I256"))
}

/// Fetches one work unit's value through the adapter, with bounded retry.
async fn fetch_value(
    adapter: &dyn HttpAdapter,
    ois: &Ois,
    endpoint_name: &str,
    parameters: serde_json::Value,
    credentials: &[OisCredentials],
) -> Result<I256, WorkUnitError> {
    let endpoint_spec = ois
        .endpoint(endpoint_name)
        .ok_or_else(|| WorkUnitError::ApiCall(format!("unknown endpoint `{endpoint_name}`")))?;
    let reserved = endpoint_spec.reserved_parameters.clone();
    let result = with_retry(RetryConfig::default(), || {
        let parameters = parameters.clone();
        async {
            adapter
                .call(AdapterRequest {
                    ois_title: &ois.title,
                    endpoint_name,
                    parameters,
                    credentials,
                })
                .await
        }
    })
    .await;
    let response = result.map_err(|e| WorkUnitError::ApiCall(e.to_string()))?;
    extract_value(&response, &reserved)
}

/// Resolves one PSP group's shared template to a value, yielding `(subscriptionId, value)`
/// pairs for every subscription in the group — the "distribute the value to all
/// subscriptions sharing the template" step of §4.3.
pub async fn call_psp_group(
    adapter: &dyn HttpAdapter,
    ois: &Ois,
    group: &GroupedSubscription,
    credentials: &[OisCredentials],
) -> Result<Vec<(alloy_primitives::B256, I256)>, WorkUnitError> {
    let parameters = serde_json::json!({
        "templateParameters": format!("0x{}", hex::encode(&group.template.template_parameters)),
    });
    let value = fetch_value(
        adapter,
        ois,
        &group.endpoint.endpoint_name,
        parameters,
        credentials,
    )
    .await?;
    Ok(group
        .subscriptions
        .iter()
        .map(|sub| (sub.derive_id(), value))
        .collect())
}

/// Resolves one RRP beacon job to a value.
pub async fn call_rrp_job(
    adapter: &dyn HttpAdapter,
    ois: &Ois,
    endpoint_name: &str,
    job: &BeaconJob,
    credentials: &[OisCredentials],
) -> Result<I256, WorkUnitError> {
    let parameters = serde_json::json!({
        "templateParameters": format!("0x{}", hex::encode(&job.template_parameters)),
    });
    fetch_value(adapter, ois, endpoint_name, parameters, credentials).await
}

/// Runs C3 over every grouped PSP subscription concurrently; an individual failure is
/// logged and drops only that group's subscriptions (§4.3, §5 "Phase 2 ... failures are
/// isolated").
#[tracing::instrument(skip_all, fields(groups = groups.len()))]
pub async fn call_all_psp(
    adapter: Arc<dyn HttpAdapter>,
    ois_by_title: &std::collections::HashMap<String, Ois>,
    groups: Vec<GroupedSubscription>,
    credentials: &[OisCredentials],
) -> crate::model::ApiValuesBySubscriptionId {
    let futures = groups.into_iter().map(|group| {
        let adapter = Arc::clone(&adapter);
        let ois = ois_by_title.get(&group.endpoint.ois_title).cloned();
        async move {
            let Some(ois) = ois else {
                tracing::warn!(ois_title = %group.endpoint.ois_title, "unknown OIS title, dropping work unit");
                return Vec::new();
            };
            match call_psp_group(adapter.as_ref(), &ois, &group, credentials).await {
                Ok(values) => values,
                Err(error) => {
                    tracing::warn!(%error, endpoint = %group.endpoint.endpoint_name, "api call failed, dropping work unit");
                    Vec::new()
                }
            }
        }
    });
    let results = futures::future::join_all(futures).await;
    results.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_path_and_applies_times() {
        let response = serde_json::json!({"data": {"price": "723.39202"}});
        let reserved = ReservedParameters {
            type_: Some("int256".to_string()),
            path: Some("data.price".to_string()),
            times: Some("1000000".to_string()),
        };
        let value = extract_value(&response, &reserved).unwrap();
        assert_eq!(value, I256::try_from(723_392_020i128).unwrap());
    }

    #[test]
    fn missing_type_is_an_error() {
        let response = serde_json::json!({"price": "1"});
        let reserved = ReservedParameters {
            type_: None,
            path: Some("price".to_string()),
            times: None,
        };
        assert!(matches!(
            extract_value(&response, &reserved),
            Err(WorkUnitError::MissingType)
        ));
    }

    #[test]
    fn missing_path_is_an_error_not_a_panic() {
        let response = serde_json::json!({"price": "1"});
        let reserved = ReservedParameters {
            type_: Some("int256".to_string()),
            path: Some("nope.nested".to_string()),
            times: None,
        };
        assert!(extract_value(&response, &reserved).is_err());
    }

    #[test]
    fn default_times_is_identity() {
        let response = serde_json::json!({"value": 41091});
        let reserved = ReservedParameters {
            type_: Some("int256".to_string()),
            path: Some("value".to_string()),
            times: None,
        };
        let value = extract_value(&response, &reserved).unwrap();
        assert_eq!(value, I256::try_from(41091i128).unwrap());
    }
}
