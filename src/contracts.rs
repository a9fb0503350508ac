//! On-chain ABI surface (spec §6 "Contracts"), generated with `alloy_sol_types::sol!`.
//!
//! Only the functions and events the cycle actually calls are declared; this crate is not a
//! general-purpose binding for these contracts.

use alloy_sol_types::sol;

sol! {
    /// The legacy RRP beacon-update contract: request/fulfill cycle driven by events.
    #[sol(rpc)]
    #[derive(Debug)]
    interface RrpBeaconServer {
        function readBeacon(bytes32 beaconId) external view returns (uint128 value, uint32 timestamp);
        function requestBeaconUpdate(bytes32 templateId, address requestSponsor, address requestSponsorWallet, bytes calldata parameters) external returns (bytes32 requestId);
        function fulfillBeaconUpdate(bytes32 requestId, uint256 timestamp, bytes calldata data) external;

        event RequestedBeaconUpdate(bytes32 indexed beaconId, address indexed sponsor, bytes32 indexed requestId, address sponsorWallet);
        event UpdatedBeacon(bytes32 indexed beaconId, bytes32 requestId, int224 value, uint32 timestamp);
    }

    /// The PSP beacon-set/dAPI server: beacon values are pushed directly, gated by a
    /// client-side condition check before the keeper bothers signing a transaction.
    #[sol(rpc)]
    #[derive(Debug)]
    interface DapiServer {
        function conditionPspBeaconUpdate(bytes32 subscriptionId, bytes calldata data, bytes calldata conditionParameters) external view returns (bool);
        function fulfillPspBeaconUpdate(
            bytes32 subscriptionId,
            address airnode,
            address relayer,
            address sponsor,
            uint256 timestamp,
            bytes calldata data,
            bytes calldata signature
        ) external;
        function readDataFeedWithId(bytes32 dataFeedId) external view returns (int224 value, uint32 timestamp);
    }

    /// The sponsorship/request-bookkeeping contract backing RRP: duplicate-suppression reads
    /// `requestIsAwaitingFulfillment` here, not on `RrpBeaconServer`.
    #[sol(rpc)]
    #[derive(Debug)]
    interface AirnodeRrp {
        function requestIsAwaitingFulfillment(bytes32 requestId) external view returns (bool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;

    #[test]
    fn request_beacon_update_call_encodes_with_selector() {
        let call = RrpBeaconServer::requestBeaconUpdateCall {
            templateId: Default::default(),
            requestSponsor: Default::default(),
            requestSponsorWallet: Default::default(),
            parameters: Default::default(),
        };
        let encoded = call.abi_encode();
        assert_eq!(&encoded[0..4], &RrpBeaconServer::requestBeaconUpdateCall::SELECTOR);
    }

    #[test]
    fn condition_psp_beacon_update_call_encodes_with_selector() {
        let call = DapiServer::conditionPspBeaconUpdateCall {
            subscriptionId: Default::default(),
            data: Default::default(),
            conditionParameters: Default::default(),
        };
        let encoded = call.abi_encode();
        assert_eq!(&encoded[0..4], &DapiServer::conditionPspBeaconUpdateCall::SELECTOR);
    }
}
