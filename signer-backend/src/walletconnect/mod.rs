//! WalletConnect signer core
//!
//! Pairing kickoff, session proposal approval, session request dispatch and
//! the operation ledger, driven by a lazily connected protocol engine.
//!
//! Flow:
//! 1. `SignerEngine::kickoff` writes a pending connection and asks the engine to pair
//! 2. The engine delivers `session_proposal`; `proposal` correlates it by pairing
//!    topic, approves the supported chains and registers the session
//! 3. Every `session_request` goes through `dispatcher`, which records sensitive
//!    methods in the ledger before and after execution

pub mod dispatcher;
pub mod engine;
mod error;
pub mod pairing;
pub mod proposal;
pub mod protocol;
pub mod relay_bridge;
pub mod transactions;
pub mod uri;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineConnection, EngineConnector, ProtocolEngine, SignerContext, SignerEngine};
pub use error::SignerError;
pub use relay_bridge::RelayBridgeConnector;
pub use transactions::{EvmTransactionForwarder, TransactionForwarder};

/// Methods exposed in every approved eip155 namespace
pub const EIP155_METHODS: [&str; 8] = [
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v4",
    "eth_accounts",
    "eth_requestAccounts",
];

pub const EIP155_EVENTS: [&str; 2] = ["accountsChanged", "chainChanged"];

/// JSON-RPC error code sent for requests on a topic with no registered session
pub const UNKNOWN_SESSION_CODE: i32 = 5000;

/// JSON-RPC error code sent when a request fails during execution
pub const REQUEST_FAILED_CODE: i32 = 5001;
