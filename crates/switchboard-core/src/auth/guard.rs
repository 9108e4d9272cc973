//! Bearer token validation for channels that sign their requests.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. bearer token present
//! 2. issuer equals the expected issuer
//! 3. audience contains the application id
//! 4. `nbf <= now <= exp`, with clock skew
//! 5. signature verifies against the key named by `kid`
//! 6. the binding claim equals the value found in the request body

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use ring::signature::{
    ECDSA_P256_SHA256_FIXED, RSA_PKCS1_2048_8192_SHA256, RsaPublicKeyComponents,
    UnparsedPublicKey,
};
use tracing::debug;

use super::jwt::Jwt;
use super::keys::{Jwk, KeySetCache};
use crate::foundation::{AuthError, AuthResult};

/// Default tolerance on `nbf` and `exp`, in seconds.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 5 * 60;

/// Validates signed inbound requests.
pub struct AuthGuard {
    issuer: String,
    audience: String,
    binding_claim: String,
    clock_skew_secs: i64,
    keys: Arc<KeySetCache>,
}

impl AuthGuard {
    /// Creates a guard expecting `issuer`, `audience` and a `binding_claim`.
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        binding_claim: impl Into<String>,
        keys: Arc<KeySetCache>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            binding_claim: binding_claim.into(),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            keys,
        }
    }

    /// Sets the clock skew tolerance.
    pub fn with_clock_skew(mut self, seconds: i64) -> Self {
        self.clock_skew_secs = seconds;
        self
    }

    /// The key cache.
    pub fn keys(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Validates an `Authorization` header against the request's binding value.
    pub async fn verify(&self, authorization: Option<&str>, binding_value: &str) -> AuthResult<Jwt> {
        self.verify_at(authorization, binding_value, Utc::now().timestamp())
            .await
    }

    /// Like [`verify`](Self::verify) at an explicit instant, in seconds since the epoch.
    pub async fn verify_at(
        &self,
        authorization: Option<&str>,
        binding_value: &str,
        now: i64,
    ) -> AuthResult<Jwt> {
        let header = authorization
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let token = match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token,
            _ => return Err(AuthError::InvalidScheme),
        };
        let jwt = Jwt::decode(token)?;
        let claims = &jwt.claims;

        let issuer = claims.iss.as_deref().unwrap_or_default();
        if issuer != self.issuer {
            return Err(AuthError::InvalidIssuer {
                found: issuer.to_string(),
            });
        }

        if !claims.aud.iter().any(|aud| *aud == self.audience) {
            return Err(AuthError::InvalidAudience);
        }

        if claims.nbf.is_some_and(|nbf| now + self.clock_skew_secs < nbf) {
            return Err(AuthError::NotYetValid);
        }
        let exp = claims.exp.ok_or_else(|| AuthError::malformed("missing exp"))?;
        if now - self.clock_skew_secs > exp {
            return Err(AuthError::Expired);
        }

        let kid = jwt
            .header
            .kid
            .as_deref()
            .ok_or_else(|| AuthError::malformed("missing kid"))?;
        let key = self.keys.key(kid).await?;
        verify_signature(&jwt, &key)?;

        if claims.claim_str(&self.binding_claim) != Some(binding_value) {
            return Err(AuthError::BindingMismatch {
                claim: self.binding_claim.clone(),
            });
        }

        debug!(kid, "Request token verified");
        Ok(jwt)
    }
}

fn key_part(key: &Jwk, value: &Option<String>, name: &str) -> AuthResult<Vec<u8>> {
    let encoded = value
        .as_deref()
        .ok_or_else(|| AuthError::key_set(format!("key is missing '{name}'")))?;
    URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| {
            AuthError::key_set(format!(
                "key '{}' has invalid '{name}': {e}",
                key.kid.as_deref().unwrap_or_default()
            ))
        })
}

fn verify_signature(jwt: &Jwt, key: &Jwk) -> AuthResult<()> {
    let message = jwt.signing_input();
    let signature = jwt.signature();
    match (jwt.header.alg.as_str(), key.kty.as_str()) {
        ("RS256", "RSA") => {
            let components = RsaPublicKeyComponents {
                n: key_part(key, &key.n, "n")?,
                e: key_part(key, &key.e, "e")?,
            };
            components
                .verify(&RSA_PKCS1_2048_8192_SHA256, message, signature)
                .map_err(|_| AuthError::InvalidSignature)
        }
        ("ES256", "EC") if key.crv.as_deref() == Some("P-256") => {
            let mut point = vec![0x04];
            point.extend(key_part(key, &key.x, "x")?);
            point.extend(key_part(key, &key.y, "y")?);
            UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, point)
                .verify(message, signature)
                .map_err(|_| AuthError::InvalidSignature)
        }
        (alg, _) => Err(AuthError::UnsupportedAlgorithm {
            alg: alg.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::encode_segment;
    use crate::auth::keys::{JwkSet, StaticKeySet};
    use ring::rand::SystemRandom;
    use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};
    use serde_json::{Value, json};

    const ISSUER: &str = "https://api.channel.example";
    const APP: &str = "app-id";
    const SERVICE: &str = "https://service.example/";
    const NOW: i64 = 1_700_000_000;

    struct Signer {
        pair: EcdsaKeyPair,
        rng: SystemRandom,
    }

    impl Signer {
        fn new() -> Self {
            let rng = SystemRandom::new();
            let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
            let pair =
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                    .unwrap();
            Self { pair, rng }
        }

        fn jwk(&self, kid: &str) -> Jwk {
            let public = self.pair.public_key().as_ref();
            Jwk {
                kty: "EC".into(),
                kid: Some(kid.into()),
                alg: Some("ES256".into()),
                n: None,
                e: None,
                crv: Some("P-256".into()),
                x: Some(encode_segment(&public[1..33])),
                y: Some(encode_segment(&public[33..65])),
                endorsements: Vec::new(),
            }
        }

        fn token(&self, kid: &str, claims: Value) -> String {
            let header = json!({ "alg": "ES256", "kid": kid, "typ": "JWT" });
            let input = format!(
                "{}.{}",
                encode_segment(header.to_string().as_bytes()),
                encode_segment(claims.to_string().as_bytes())
            );
            let signature = self.pair.sign(&self.rng, input.as_bytes()).unwrap();
            format!("{input}.{}", encode_segment(signature.as_ref()))
        }
    }

    fn claims() -> Value {
        json!({
            "iss": ISSUER,
            "aud": APP,
            "nbf": NOW - 60,
            "exp": NOW + 3600,
            "serviceurl": SERVICE,
        })
    }

    fn guard(signer: &Signer) -> AuthGuard {
        let keys = KeySetCache::new(Arc::new(StaticKeySet(JwkSet {
            keys: vec![signer.jwk("k1")],
        })));
        AuthGuard::new(ISSUER, APP, "serviceurl", Arc::new(keys))
    }

    async fn check(guard: &AuthGuard, header: Option<String>) -> AuthResult<Jwt> {
        guard.verify_at(header.as_deref(), SERVICE, NOW).await
    }

    fn with(mut claims: Value, key: &str, value: Value) -> Value {
        claims[key] = value;
        claims
    }

    #[tokio::test]
    async fn valid_token_passes() {
        let signer = Signer::new();
        let header = format!("Bearer {}", signer.token("k1", claims()));
        let jwt = check(&guard(&signer), Some(header)).await.unwrap();
        assert_eq!(jwt.claims.aud, [APP]);
    }

    #[tokio::test]
    async fn presence_and_scheme_come_first() {
        let signer = Signer::new();
        let guard = guard(&signer);
        assert_eq!(check(&guard, None).await.unwrap_err(), AuthError::MissingToken);
        assert_eq!(
            check(&guard, Some(format!("Basic {}", signer.token("k1", claims()))))
                .await
                .unwrap_err(),
            AuthError::InvalidScheme
        );
    }

    #[tokio::test]
    async fn issuer_checked_before_audience() {
        let signer = Signer::new();
        let token = signer.token(
            "k1",
            with(with(claims(), "iss", json!("evil")), "aud", json!("other")),
        );
        let err = check(&guard(&signer), Some(format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidIssuer { found: "evil".into() });
    }

    #[tokio::test]
    async fn audience_list_must_contain_app() {
        let signer = Signer::new();
        let token = signer.token("k1", with(claims(), "aud", json!(["a", "b"])));
        let err = check(&guard(&signer), Some(format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidAudience);
    }

    #[tokio::test]
    async fn lifetime_honours_skew() {
        let signer = Signer::new();
        let guard = guard(&signer);

        let within_skew = signer.token("k1", with(claims(), "exp", json!(NOW - 120)));
        assert!(check(&guard, Some(format!("Bearer {within_skew}"))).await.is_ok());

        let expired = signer.token("k1", with(claims(), "exp", json!(NOW - 301)));
        assert_eq!(
            check(&guard, Some(format!("Bearer {expired}"))).await.unwrap_err(),
            AuthError::Expired
        );

        let early = signer.token("k1", with(claims(), "nbf", json!(NOW + 301)));
        assert_eq!(
            check(&guard, Some(format!("Bearer {early}"))).await.unwrap_err(),
            AuthError::NotYetValid
        );
    }

    #[tokio::test]
    async fn signature_from_other_key_fails() {
        let signer = Signer::new();
        let intruder = Signer::new();
        let token = intruder.token("k1", claims());
        let err = check(&guard(&signer), Some(format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    #[tokio::test]
    async fn unknown_kid_fails() {
        let signer = Signer::new();
        let token = signer.token("k2", claims());
        let err = check(&guard(&signer), Some(format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::UnknownKey { kid: "k2".into() });
    }

    #[tokio::test]
    async fn binding_claim_checked_last() {
        let signer = Signer::new();
        let token = signer.token("k1", with(claims(), "serviceurl", json!("https://other/")));
        let err = check(&guard(&signer), Some(format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::BindingMismatch {
                claim: "serviceurl".into()
            }
        );
    }

    #[test]
    fn rsa_signature_mismatch_is_rejected() {
        let jwt = Jwt::decode(&format!(
            "{}.{}.{}",
            encode_segment(br#"{"alg":"RS256","kid":"r"}"#),
            encode_segment(b"{}"),
            encode_segment(&[0u8; 256]),
        ))
        .unwrap();
        let key = Jwk {
            kty: "RSA".into(),
            kid: Some("r".into()),
            alg: Some("RS256".into()),
            n: Some(encode_segment(&[0xC5; 256])),
            e: Some("AQAB".into()),
            crv: None,
            x: None,
            y: None,
            endorsements: Vec::new(),
        };
        assert_eq!(verify_signature(&jwt, &key), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn unsupported_algorithm_is_rejected() {
        let jwt = Jwt::decode(&format!(
            "{}.{}.{}",
            encode_segment(br#"{"alg":"HS256","kid":"r"}"#),
            encode_segment(b"{}"),
            encode_segment(b"x"),
        ))
        .unwrap();
        let key = Jwk {
            kty: "oct".into(),
            kid: Some("r".into()),
            alg: None,
            n: None,
            e: None,
            crv: None,
            x: None,
            y: None,
            endorsements: Vec::new(),
        };
        assert_eq!(
            verify_signature(&jwt, &key),
            Err(AuthError::UnsupportedAlgorithm { alg: "HS256".into() })
        );
    }
}
