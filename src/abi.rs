use crate::errors::{Result, SdkError};
use crate::types::event_topic;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};

alloy_sol_types::sol! {
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }

    interface IBridgehub {
        struct L2TransactionRequestDirect {
            uint256 chainId;
            uint256 mintValue;
            address l2Contract;
            uint256 l2Value;
            bytes l2Calldata;
            uint256 l2GasLimit;
            uint256 l2GasPerPubdataByteLimit;
            bytes[] factoryDeps;
            address refundRecipient;
        }

        struct L2TransactionRequestTwoBridgesOuter {
            uint256 chainId;
            uint256 mintValue;
            uint256 l2Value;
            uint256 l2GasLimit;
            uint256 l2GasPerPubdataByteLimit;
            address refundRecipient;
            address secondBridgeAddress;
            uint256 secondBridgeValue;
            bytes secondBridgeCalldata;
        }

        function requestL2TransactionDirect(L2TransactionRequestDirect _request)
            external
            payable
            returns (bytes32);
        function requestL2TransactionTwoBridges(L2TransactionRequestTwoBridgesOuter _request)
            external
            payable
            returns (bytes32);
        function l2TransactionBaseCost(
            uint256 _chainId,
            uint256 _gasPrice,
            uint256 _l2GasLimit,
            uint256 _l2GasPerPubdataByteLimit
        ) external view returns (uint256);
        function baseToken(uint256 _chainId) external view returns (address);
        function assetRouter() external view returns (address);
    }

    interface IL1AssetRouter {
        function L1_NULLIFIER() external view returns (address);
    }

    interface IL1Nullifier {
        struct FinalizeL1DepositParams {
            uint256 chainId;
            uint256 l2BatchNumber;
            uint256 l2MessageIndex;
            address l2Sender;
            uint16 l2TxNumberInBatch;
            bytes message;
            bytes32[] merkleProof;
        }

        function finalizeDeposit(FinalizeL1DepositParams _finalizeWithdrawalParams) external;
        function isWithdrawalFinalized(
            uint256 _chainId,
            uint256 _l2BatchNumber,
            uint256 _l2MessageIndex
        ) external view returns (bool);
    }

    interface IL2BaseToken {
        function withdraw(address _l1Receiver) external payable;
    }

    interface IL2AssetRouter {
        function withdraw(bytes32 _assetId, bytes _assetData) external returns (bytes32);
    }

    interface IL2NativeTokenVault {
        function assetId(address token) external view returns (bytes32);
        function ensureTokenIsRegistered(address _nativeToken) external returns (bytes32);
    }

    interface IInteropCenter {
        struct InteropCallStarter {
            bytes to;
            bytes data;
            bytes[] callAttributes;
        }

        function sendBundle(
            bytes _destinationChainId,
            InteropCallStarter[] _callStarters,
            bytes[] _bundleAttributes
        ) external payable returns (bytes32);
    }

    struct InteropCall {
        bytes1 version;
        bool shadowAccount;
        address to;
        address from;
        uint256 value;
        bytes data;
    }

    struct BundleAttributes {
        bytes executionAddress;
        bytes unbundlerAddress;
    }

    struct InteropBundle {
        bytes1 version;
        uint256 sourceChainId;
        uint256 destinationChainId;
        bytes32 interopBundleSalt;
        InteropCall[] calls;
        BundleAttributes bundleAttributes;
    }

    struct InteropBundleSent {
        bytes32 l2l1MsgHash;
        bytes32 interopBundleHash;
        InteropBundle interopBundle;
    }

    struct L2Message {
        uint16 txNumberInBatch;
        address sender;
        bytes data;
    }

    struct MessageInclusionProofSol {
        uint256 chainId;
        uint256 l1BatchNumber;
        uint256 l2MessageIndex;
        L2Message message;
        bytes32[] proof;
    }

    interface IInteropHandler {
        function verifyBundle(bytes _bundle, MessageInclusionProofSol _proof) external;
        function executeBundle(bytes _bundle, MessageInclusionProofSol _proof) external;
        function bundleStatus(bytes32 bundleHash) external view returns (uint8);
        function callStatus(bytes32 bundleHash, uint256 callIndex) external view returns (uint8);
    }

    interface IInteropRootStorage {
        function interopRoots(uint256 chainId, uint256 batchNumber) external view returns (bytes32);
    }

    struct L2CanonicalTransaction {
        uint256 txType;
        uint256 from;
        uint256 to;
        uint256 gasLimit;
        uint256 gasPerPubdataByteLimit;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        uint256 paymaster;
        uint256 nonce;
        uint256 value;
        uint256[4] reserved;
        bytes data;
        bytes signature;
        uint256[] factoryDeps;
        bytes paymasterInput;
        bytes reservedDynamic;
    }

    struct NewPriorityRequest {
        uint256 txId;
        bytes32 txHash;
        uint64 expirationTimestamp;
        L2CanonicalTransaction transaction;
        bytes[] factoryDeps;
    }
}

/// Error signatures the revert decoder recognises by selector.
pub const KNOWN_ERRORS: &[&str] = &[
    // bridgehub / asset router / nullifier
    "AssetIdNotSupported(bytes32)",
    "ChainIdNotRegistered(uint256)",
    "EmptyDeposit()",
    "InsufficientChainBalance()",
    "InvalidProof()",
    "LocalRootIsZero()",
    "MsgValueMismatch(uint256,uint256)",
    "NotEnoughGas()",
    "TokenNotSupported(address)",
    "TooManyFactoryDeps()",
    "ValueMismatch(uint256,uint256)",
    "WithdrawalAlreadyFinalized()",
    "ZeroAddress()",
    // interop center / handler
    "AttributeAlreadySet(bytes4)",
    "AttributeViolatesRestriction(bytes4,uint256)",
    "BundleAlreadyProcessed(bytes32)",
    "BundleVerifiedAlready(bytes32)",
    "CallAlreadyExecuted(bytes32,uint256)",
    "CallNotExecutable(bytes32,uint256)",
    "CanNotUnbundle(bytes32)",
    "ExecutingNotAllowed(bytes32,bytes,bytes)",
    "IndirectCallValueMismatch(uint256,uint256)",
    "InteroperableAddressChainReferenceNotEmpty(bytes)",
    "InteroperableAddressNotEmpty(bytes)",
    "InvalidInteropBundleVersion()",
    "InvalidInteropCallVersion()",
    "MessageNotIncluded()",
    "UnauthorizedMessageSender(address,address)",
    "UnbundlingNotAllowed(bytes32,bytes,bytes)",
    "WrongCallStatusLength(uint256,uint256)",
    "WrongDestinationChainId(bytes32,uint256,uint256)",
    "WrongSourceChainId(bytes32,uint256,uint256)",
];

pub fn new_priority_request_topic() -> B256 {
    event_topic(
        "NewPriorityRequest(uint256,bytes32,uint64,(uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256,uint256[4],bytes,bytes,uint256[],bytes,bytes),bytes[])",
    )
}

pub fn interop_bundle_sent_topic() -> B256 {
    event_topic(
        "InteropBundleSent(bytes32,bytes32,(bytes1,uint256,uint256,bytes32,(bytes1,bool,address,address,uint256,bytes)[],(bytes,bytes)))",
    )
}

pub fn l1_message_sent_topic() -> B256 {
    event_topic("L1MessageSent(address,bytes32,bytes)")
}

pub fn bundle_verified_topic() -> B256 {
    event_topic("BundleVerified(bytes32)")
}

pub fn bundle_executed_topic() -> B256 {
    event_topic("BundleExecuted(bytes32)")
}

pub fn bundle_unbundled_topic() -> B256 {
    event_topic("BundleUnbundled(bytes32)")
}

/// ABI-encode a typed call into calldata.
pub fn calldata<C: SolCall>(call: C) -> Bytes {
    Bytes::from(call.abi_encode())
}

pub fn decode_new_priority_request(data: &[u8]) -> Result<NewPriorityRequest> {
    NewPriorityRequest::abi_decode_params(data)
        .map_err(|err| SdkError::contract(format!("failed to decode NewPriorityRequest: {err}")))
}

pub fn decode_interop_bundle_sent(data: &[u8]) -> Result<(B256, B256, InteropBundle)> {
    let decoded = InteropBundleSent::abi_decode_params(data)
        .map_err(|err| SdkError::contract(format!("failed to decode InteropBundleSent: {err}")))?;
    Ok((
        decoded.l2l1MsgHash,
        decoded.interopBundleHash,
        decoded.interopBundle,
    ))
}

/// Payload of an `L1MessageSent` log: a single dynamic `bytes` argument.
pub fn decode_l1_message(data: &[u8]) -> Result<Bytes> {
    <(Bytes,)>::abi_decode_params(data)
        .map(|(message,)| message)
        .map_err(|err| SdkError::contract(format!("failed to decode L1MessageSent: {err}")))
}

pub fn encode_interop_bundle(bundle: &InteropBundle) -> Bytes {
    Bytes::from(bundle.abi_encode())
}

pub fn decode_address(data: &[u8]) -> Result<Address> {
    <(Address,)>::abi_decode(data)
        .map(|(value,)| value)
        .map_err(|err| SdkError::contract(format!("expected address return data: {err}")))
}

pub fn decode_u256(data: &[u8]) -> Result<U256> {
    <(U256,)>::abi_decode(data)
        .map(|(value,)| value)
        .map_err(|err| SdkError::contract(format!("expected uint256 return data: {err}")))
}

pub fn decode_bool(data: &[u8]) -> Result<bool> {
    <(bool,)>::abi_decode(data)
        .map(|(value,)| value)
        .map_err(|err| SdkError::contract(format!("expected bool return data: {err}")))
}

pub fn decode_bytes32(data: &[u8]) -> Result<B256> {
    <(B256,)>::abi_decode(data)
        .map(|(value,)| value)
        .map_err(|err| SdkError::contract(format!("expected bytes32 return data: {err}")))
}

pub fn decode_u8(data: &[u8]) -> Result<u8> {
    let value = decode_u256(data)?;
    u8::try_from(value).map_err(|_| SdkError::contract(format!("status {value} out of range")))
}
