use std::fmt;

/// Failures of the pairing, approval and request paths
#[derive(Debug)]
pub enum SignerError {
    /// Pairing URI could not be parsed
    InvalidUri(String),
    /// A non-expired pairing attempt already exists for this topic
    AlreadyPending(String),
    /// The engine rejected or failed the pairing call
    PairingFailed(String),
    /// The engine failed to approve a proposal
    ApprovalFailed(String),
    /// No chain in the proposal (or the fallback) resolves to an endpoint
    NoSupportedChains,
    /// Request arrived on a topic with no registered session
    UnknownSession(String),
    /// Method is not one the signer serves
    UnsupportedMethod(String),
    /// Execution of a session request failed
    RequestFailed(String),
    /// The key authority could not derive the owner's account
    KeyDerivation(String),
    /// The protocol engine could not be constructed
    EngineUnavailable(String),
    Storage(rusqlite::Error),
}

impl SignerError {
    /// Stable machine-readable code
    pub fn reason(&self) -> &'static str {
        match self {
            SignerError::InvalidUri(_) => "INVALID_URI",
            SignerError::AlreadyPending(_) => "ALREADY_PENDING",
            SignerError::PairingFailed(_) => "PAIRING_FAILED",
            SignerError::ApprovalFailed(_) => "APPROVAL_FAILED",
            SignerError::NoSupportedChains => "NO_SUPPORTED_CHAINS",
            SignerError::UnknownSession(_) => "UNKNOWN_SESSION",
            SignerError::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            SignerError::RequestFailed(_) => "REQUEST_FAILED",
            SignerError::KeyDerivation(_) => "KEY_DERIVATION_FAILED",
            SignerError::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            SignerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Whether the caller supplied bad input, as opposed to a downstream failure
    pub fn is_client_error(&self) -> bool {
        matches!(self, SignerError::InvalidUri(_))
    }
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerError::InvalidUri(detail) => write!(f, "invalid pairing uri: {}", detail),
            SignerError::AlreadyPending(topic) => {
                write!(f, "pairing already pending for topic {}", topic)
            }
            SignerError::PairingFailed(detail) => write!(f, "pairing failed: {}", detail),
            SignerError::ApprovalFailed(detail) => write!(f, "session approval failed: {}", detail),
            SignerError::NoSupportedChains => {
                write!(f, "no supported eip155 chains in session proposal")
            }
            SignerError::UnknownSession(topic) => {
                write!(f, "unknown WalletConnect session {}", topic)
            }
            SignerError::UnsupportedMethod(method) => {
                write!(f, "unsupported WalletConnect method: {}", method)
            }
            SignerError::RequestFailed(detail) => write!(f, "{}", detail),
            SignerError::KeyDerivation(detail) => write!(f, "key derivation failed: {}", detail),
            SignerError::EngineUnavailable(detail) => {
                write!(f, "WalletConnect engine unavailable: {}", detail)
            }
            SignerError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for SignerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SignerError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SignerError {
    fn from(e: rusqlite::Error) -> Self {
        SignerError::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_and_messages() {
        let err = SignerError::AlreadyPending("abc".to_string());
        assert_eq!(err.reason(), "ALREADY_PENDING");
        assert_eq!(err.to_string(), "pairing already pending for topic abc");
        assert!(!err.is_client_error());
        assert!(SignerError::InvalidUri("empty pairing topic".to_string()).is_client_error());

        let err = SignerError::UnsupportedMethod("wallet_switchEthereumChain".to_string());
        assert_eq!(err.to_string(), "unsupported WalletConnect method: wallet_switchEthereumChain");
    }

    #[test]
    fn test_storage_error_has_source() {
        let err: SignerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.reason(), "STORAGE_ERROR");
        assert!(std::error::Error::source(&err).is_some());
    }
}
