//! Pairing URI parsing: `wc:<topic>@<version>?relay-protocol=<p>&symKey=<key>`

use url::Url;

use super::SignerError;

pub const PAIRING_URI_SCHEME: &str = "wc";
pub const SUPPORTED_PAIRING_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUri {
    pub topic: String,
    pub version: u32,
    pub relay_protocol: Option<String>,
    pub sym_key: Option<String>,
}

impl PairingUri {
    pub fn parse(uri: &str) -> Result<Self, SignerError> {
        let url = Url::parse(uri.trim()).map_err(|e| SignerError::InvalidUri(e.to_string()))?;

        if url.scheme() != PAIRING_URI_SCHEME {
            return Err(SignerError::InvalidUri(format!(
                "expected '{}:' scheme, got '{}:'",
                PAIRING_URI_SCHEME,
                url.scheme()
            )));
        }

        let (topic, version) = url
            .path()
            .split_once('@')
            .ok_or_else(|| SignerError::InvalidUri("missing '@<version>'".to_string()))?;

        if topic.is_empty() {
            return Err(SignerError::InvalidUri("empty pairing topic".to_string()));
        }

        let version: u32 = version
            .parse()
            .map_err(|_| SignerError::InvalidUri(format!("invalid version '{}'", version)))?;
        if version != SUPPORTED_PAIRING_VERSION {
            return Err(SignerError::InvalidUri(format!("unsupported version {}", version)));
        }

        let mut relay_protocol = None;
        let mut sym_key = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "relay-protocol" => relay_protocol = Some(value.into_owned()),
                "symKey" => sym_key = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            topic: topic.to_string(),
            version,
            relay_protocol,
            sym_key,
        })
    }
}
