pub mod wallet_session;

pub use wallet_session::{
    OperationRecord, OperationStatus, PendingConnection, PendingConnectionRecord,
    SessionOperation, SessionSignerRecord, WalletSession, DEFAULT_CHAIN_ID,
    MAX_OPERATION_RECORDS, PENDING_TTL_SECONDS,
};
