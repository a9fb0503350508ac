//! Trigger Resolver (C2, spec §4.2).
//!
//! Validates the two trigger lists against the entity maps in [`crate::config::Config`] and
//! against their own identity-hash invariants (spec §3), grouping surviving PSP subscriptions
//! by shared template. Every validation failure is a non-fatal skip logged as a warning; the
//! cycle proceeds on whatever survives.

use alloy_primitives::B256;

use crate::config::Config;
use crate::error::ValidationError;
use crate::model::{BeaconJob, Endpoint, GroupedSubscription, Subscription, Template};

/// Looks up and validates one PSP subscription id, returning the subscription plus its
/// verified template and endpoint, or the reason it was skipped.
fn resolve_psp_subscription(
    config: &Config,
    subscription_id: B256,
) -> Result<(Subscription, Template, Endpoint), ValidationError> {
    let subscription = config
        .subscriptions
        .get(&subscription_id)
        .ok_or_else(|| ValidationError::SubscriptionNotFound(subscription_id.to_string()))?
        .clone();
    let derived = subscription.derive_id();
    if derived != subscription_id {
        return Err(ValidationError::SubscriptionIdMismatch {
            declared: subscription_id.to_string(),
            derived: derived.to_string(),
        });
    }

    let template = config
        .templates
        .get(&subscription.template_id)
        .ok_or_else(|| ValidationError::TemplateNotFound(subscription.template_id.to_string()))?
        .clone();
    let derived_template_id = template.derive_id();
    if derived_template_id != subscription.template_id {
        return Err(ValidationError::TemplateIdMismatch {
            declared: subscription.template_id.to_string(),
            derived: derived_template_id.to_string(),
        });
    }

    let endpoint = config
        .endpoints
        .get(&template.endpoint_id)
        .ok_or_else(|| ValidationError::EndpointNotFound(template.endpoint_id.to_string()))?
        .clone();
    let derived_endpoint_id = endpoint.derive_id();
    if derived_endpoint_id != template.endpoint_id {
        return Err(ValidationError::EndpointIdMismatch {
            declared: template.endpoint_id.to_string(),
            derived: derived_endpoint_id.to_string(),
        });
    }

    Ok((subscription, template, endpoint))
}

/// Resolves `triggers.protoPsp` into validated, template-grouped subscriptions (spec §4.2).
pub fn resolve_psp_triggers(config: &Config) -> Vec<GroupedSubscription> {
    let mut by_template: Vec<(B256, Template, Endpoint, Vec<Subscription>)> = Vec::new();
    for &subscription_id in &config.triggers.proto_psp {
        match resolve_psp_subscription(config, subscription_id) {
            Ok((subscription, template, endpoint)) => {
                let template_id = subscription.template_id;
                match by_template.iter_mut().find(|(id, ..)| *id == template_id) {
                    Some((_, _, _, subs)) => subs.push(subscription),
                    None => by_template.push((template_id, template, endpoint, vec![subscription])),
                }
            }
            Err(error) => {
                tracing::warn!(%error, %subscription_id, "skipping psp subscription");
            }
        }
    }
    by_template
        .into_iter()
        .map(|(_, template, endpoint, subscriptions)| GroupedSubscription {
            subscriptions,
            template,
            endpoint,
        })
        .collect()
}

/// Validates one RRP beacon job against its endpoint and template hash invariants (spec
/// §4.2: "verify `endpointId` against its hash, verify `templateId` against
/// `getExpectedTemplateId`").
fn validate_rrp_job(config: &Config, job: &BeaconJob) -> Result<(), ValidationError> {
    let endpoint = config
        .endpoints
        .get(&job.endpoint_id)
        .ok_or_else(|| ValidationError::EndpointNotFound(job.endpoint_id.to_string()))?;
    let derived_endpoint_id = endpoint.derive_id();
    if derived_endpoint_id != job.endpoint_id {
        return Err(ValidationError::EndpointIdMismatch {
            declared: job.endpoint_id.to_string(),
            derived: derived_endpoint_id.to_string(),
        });
    }

    let derived_template_id = Template {
        endpoint_id: job.endpoint_id,
        template_parameters: job.template_parameters.clone(),
    }
    .derive_id();
    if derived_template_id != job.template_id {
        return Err(ValidationError::TemplateIdMismatch {
            declared: job.template_id.to_string(),
            derived: derived_template_id.to_string(),
        });
    }
    Ok(())
}

/// Resolves `triggers.rrpBeaconServerKeeperJobs` into the subset that passes validation
/// (spec §4.2). Each surviving job's `beaconId` is available via [`BeaconJob::beacon_id`].
pub fn resolve_rrp_triggers(config: &Config) -> Vec<BeaconJob> {
    config
        .triggers
        .rrp_beacon_server_keeper_jobs
        .iter()
        .filter_map(|job| match validate_rrp_job(config, job) {
            Ok(()) => Some(job.clone()),
            Err(error) => {
                tracing::warn!(%error, template_id = %job.template_id, "skipping rrp beacon job");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, ChainOptions, ContractAddresses, GasUnit, PriorityFee, Triggers, TxType};
    use alloy_primitives::{Address, Bytes, FixedBytes};
    use std::collections::HashMap;
    use std::str::FromStr;

    fn base_config() -> Config {
        Config {
            chains: vec![ChainConfig {
                id: 1,
                chain_type: "evm".to_string(),
                contracts: ContractAddresses {
                    airnode_rrp: Address::ZERO,
                    rrp_beacon_server: Address::ZERO,
                    dapi_server: Address::ZERO,
                },
                providers: HashMap::new(),
                block_history_limit: None,
                options: ChainOptions {
                    tx_type: TxType::Eip1559,
                    base_fee_multiplier: 2,
                    priority_fee: PriorityFee {
                        value: rust_decimal::Decimal::new(1, 1),
                        unit: GasUnit::Gwei,
                    },
                },
            }],
            mnemonic: "test test test test test test test test test test test junk".to_string(),
            templates: HashMap::new(),
            endpoints: HashMap::new(),
            subscriptions: HashMap::new(),
            ois: Vec::new(),
            credentials: Vec::new(),
            triggers: Triggers::default(),
        }
    }

    fn sample_subscription() -> Subscription {
        Subscription {
            chain_id: 1,
            airnode_address: Address::repeat_byte(0x01),
            template_id: B256::ZERO, // overwritten below once the template id is known
            parameters: Bytes::from_str("0x").unwrap(),
            conditions: Bytes::from_str("0x").unwrap(),
            relayer: Address::repeat_byte(0x02),
            sponsor: Address::repeat_byte(0x03),
            requester: Address::repeat_byte(0x04),
            fulfill_function_id: FixedBytes::<4>::from([0, 0, 0, 1]),
        }
    }

    #[test]
    fn drops_subscription_referencing_unknown_id() {
        let config = base_config();
        let groups = resolve_psp_triggers(&Config {
            triggers: Triggers {
                proto_psp: vec![B256::repeat_byte(0x99)],
                ..Triggers::default()
            },
            ..config
        });
        assert!(groups.is_empty());
    }

    #[test]
    fn groups_two_subscriptions_sharing_a_template() {
        let endpoint = Endpoint {
            ois_title: "coinmarketcap".to_string(),
            endpoint_name: "coin-market-data".to_string(),
        };
        let endpoint_id = endpoint.derive_id();
        let template = Template {
            endpoint_id,
            template_parameters: Bytes::from_str("0x1234").unwrap(),
        };
        let template_id = template.derive_id();

        let mut sub1 = sample_subscription();
        sub1.template_id = template_id;
        let id1 = sub1.derive_id();

        let mut sub2 = sample_subscription();
        sub2.template_id = template_id;
        sub2.requester = Address::repeat_byte(0x05);
        let id2 = sub2.derive_id();

        let mut config = base_config();
        config.endpoints.insert(endpoint_id, endpoint);
        config.templates.insert(template_id, template);
        config.subscriptions.insert(id1, sub1);
        config.subscriptions.insert(id2, sub2);
        config.triggers.proto_psp = vec![id1, id2];

        let groups = resolve_psp_triggers(&config);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].subscriptions.len(), 2);
    }

    #[test]
    fn validates_rrp_job_endpoint_and_template_id() {
        let endpoint = Endpoint {
            ois_title: "coinmarketcap".to_string(),
            endpoint_name: "coin-market-data".to_string(),
        };
        let endpoint_id = endpoint.derive_id();

        let mut config = base_config();
        config.endpoints.insert(endpoint_id, endpoint);

        let job = BeaconJob {
            template_id: B256::repeat_byte(0xaa), // deliberately wrong
            template_parameters: Bytes::from_str("0x1234").unwrap(),
            endpoint_id,
            deviation_percentage: "5".to_string(),
            keeper_sponsor: Address::repeat_byte(0x01),
            request_sponsor: Address::repeat_byte(0x02),
            chain_ids: None,
        };
        assert!(validate_rrp_job(&config, &job).is_err());

        let correct_template_id = Template {
            endpoint_id: job.endpoint_id,
            template_parameters: job.template_parameters.clone(),
        }
        .derive_id();
        let valid_job = BeaconJob {
            template_id: correct_template_id,
            ..job
        };
        assert!(validate_rrp_job(&config, &valid_job).is_ok());

        let unknown_endpoint_job = BeaconJob {
            endpoint_id: B256::repeat_byte(0x11),
            ..valid_job.clone()
        };
        assert!(matches!(
            validate_rrp_job(&config, &unknown_endpoint_job),
            Err(ValidationError::EndpointNotFound(_))
        ));
    }
}
