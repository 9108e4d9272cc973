//! Compact JWS decoding.
//!
//! Only what the guard needs: the header, the claims and the signing input.
//! Nothing here checks signatures or claim values.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserializer;
use serde::{Deserialize, Serialize};

use crate::foundation::{AuthError, AuthResult};

/// JOSE header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm, e.g. `RS256`.
    pub alg: String,
    /// Key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Token type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// Registered claims plus everything else.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audiences; a single string is accepted.
    #[serde(default, deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    /// Not before, seconds since the epoch.
    #[serde(default)]
    pub nbf: Option<i64>,
    /// Expiration, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Other claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JwtClaims {
    /// Returns a non-registered claim as a string.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(serde_json::Value::as_str)
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null,
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null => Vec::new(),
    })
}

/// A decoded, unverified token.
#[derive(Debug, Clone)]
pub struct Jwt {
    /// Header.
    pub header: JwtHeader,
    /// Claims.
    pub claims: JwtClaims,
    signing_input: String,
    signature: Vec<u8>,
}

impl Jwt {
    /// Decodes `header.payload.signature`.
    pub fn decode(token: &str) -> AuthResult<Self> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::malformed("expected three segments"));
        };

        let header_json = decode_segment(header, "header")?;
        let payload_json = decode_segment(payload, "payload")?;
        let signature = decode_segment(signature, "signature")?;

        Ok(Self {
            header: serde_json::from_slice(&header_json)
                .map_err(|e| AuthError::malformed(format!("header: {e}")))?,
            claims: serde_json::from_slice(&payload_json)
                .map_err(|e| AuthError::malformed(format!("claims: {e}")))?,
            signing_input: format!("{header}.{payload}"),
            signature,
        })
    }

    /// The bytes the signature covers.
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }

    /// The raw signature.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

fn decode_segment(segment: &str, name: &str) -> AuthResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::malformed(format!("{name}: {e}")))
}

/// Encodes a segment the way tokens carry them.
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
