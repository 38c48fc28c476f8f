/// Signed Token Codec
///
/// Tokens are RS256 JWTs. Issuing needs the private key; verifying needs only
/// the public key, so request-facing code holds a `TokenVerifier` and never
/// sees signing material. Any algorithm other than RS256 is rejected.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::claims::SignedClaims;
use crate::auth::error::{AuthError, TokenError};

const ALGORITHM: Algorithm = Algorithm::RS256;

/// Verification half of the codec: public key only
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &ALGORITHM)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl TokenVerifier {
    /// Build a verifier from a PEM-encoded RSA public key
    ///
    /// # Errors
    /// Returns the PEM parse error; callers treat it as fatal at startup
    pub fn from_rsa_pem(
        public_key_pem: &[u8],
        issuer: impl Into<String>,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let issuer = issuer.into();
        let mut validation = Validation::new(ALGORITHM);
        // Embedded expiry is trusted as-is, no skew allowance
        validation.leeway = 0;
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Ok(Self {
            decoding_key: DecodingKey::from_rsa_pem(public_key_pem)?,
            validation,
            issuer,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Validate signature, algorithm, issuer and expiry, returning the claims
    ///
    /// # Errors
    /// `Expired`, `InvalidSignature` (bad signature, foreign key, disallowed
    /// algorithm, foreign issuer) or `Malformed` (anything structural)
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<SignedClaims<T>, TokenError> {
        decode::<SignedClaims<T>>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let kind = classify(e.kind());
                tracing::debug!(error = %e, kind = kind.code(), "JWT validation error");
                kind
            })
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidIssuer
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidKeyFormat => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    }
}

/// Issuing codec: private key plus the matching verifier
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    verifier: TokenVerifier,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl TokenCodec {
    /// Build a codec from PEM-encoded RSA private and public keys
    pub fn from_rsa_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        issuer: impl Into<String>,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self {
            encoding_key: EncodingKey::from_rsa_pem(private_key_pem)?,
            verifier: TokenVerifier::from_rsa_pem(public_key_pem, issuer)?,
        })
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Sign `body` with a lifetime of `ttl` from now
    ///
    /// # Errors
    /// Returns `TokenIssue` if signing fails
    pub fn issue<T: Serialize>(&self, body: T, ttl: Duration) -> Result<String, AuthError> {
        self.issue_at(body, ttl, Utc::now().timestamp())
    }

    pub(crate) fn issue_at<T: Serialize>(
        &self,
        body: T,
        ttl: Duration,
        issued_at: i64,
    ) -> Result<String, AuthError> {
        let claims = SignedClaims {
            body,
            iss: self.verifier.issuer.clone(),
            iat: issued_at,
            exp: issued_at + ttl.num_seconds(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Token signing failed");
            AuthError::TokenIssue(e.to_string())
        })
    }

    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<SignedClaims<T>, TokenError> {
        self.verifier.verify(token)
    }
}
