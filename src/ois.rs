//! Minimal Oracle Integration Specification (OIS) surface consumed by the API Caller (§4.3).
//!
//! The full OIS schema (operations, security schemes, fixed/default parameters) is the
//! off-chain HTTP adapter's concern and is explicitly out of scope (spec §1): this module
//! only carries what the core needs to (a) look up an endpoint's reserved parameters and
//! (b) build the narrow [`crate::http_adapter::AdapterRequest`] the adapter consumes.

use serde::{Deserialize, Serialize};

/// Reserved parameters attached to one OIS endpoint (spec §6 "HTTP adapter").
///
/// `_type` is mandatory: a missing `_type` drops the work unit (§4.3). `_path` selects a
/// field out of the adapter's structured JSON response (dot-separated, array indices as
/// plain numbers); absent means "the whole response is the value". `_times` is a decimal
/// string multiplier applied after extraction, used to convert a human-readable decimal
/// reading into the on-chain fixed-point integer representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedParameters {
    #[serde(rename = "_type")]
    pub type_: Option<String>,
    #[serde(rename = "_path", default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "_times", default, skip_serializing_if = "Option::is_none")]
    pub times: Option<String>,
}

/// One operation exposed by an [`Ois`], identified by name within that OIS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OisEndpointSpec {
    pub name: String,
    #[serde(rename = "reservedParameters")]
    pub reserved_parameters: ReservedParameters,
}

/// One Oracle Integration Specification: a named off-chain API surface plus the endpoints
/// exposed through it. `title` is what `Endpoint::ois_title` references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ois {
    pub title: String,
    pub endpoints: Vec<OisEndpointSpec>,
}

impl Ois {
    pub fn endpoint(&self, endpoint_name: &str) -> Option<&OisEndpointSpec> {
        self.endpoints.iter().find(|e| e.name == endpoint_name)
    }
}

/// Credentials the off-chain HTTP adapter needs to authenticate a call for a given OIS's
/// security scheme. Opaque to the core beyond routing: the adapter alone interprets
/// `security_scheme_name` against the OIS's (out-of-scope) security scheme definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OisCredentials {
    #[serde(rename = "oisTitle")]
    pub ois_title: String,
    #[serde(rename = "securitySchemeName")]
    pub security_scheme_name: String,
    pub value: String,
}
