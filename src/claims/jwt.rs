//! Signed claims encoding
//!
//! NATS JWTs are ordinary three-segment JWTs with an `ed25519-nkey`
//! algorithm: the issuer nkey signs `base64url(header).base64url(claims)`.
//! The `jti` is the unpadded base32 SHA-512/256 digest of the claims
//! serialized with an empty `jti`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use data_encoding::BASE32_NOPAD;
use nkeys::KeyPair;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use super::nats::JwtClaims;
use super::ClaimsError;

/// Algorithm name NATS uses for nkey-signed JWTs
pub const ALGORITHM: &str = "ed25519-nkey";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    typ: String,
    alg: String,
}

/// Stamp issuer, issue time and id onto `claims` and sign them with `signer`
pub fn encode<T: Serialize>(mut claims: JwtClaims<T>, signer: &KeyPair) -> Result<String, ClaimsError> {
    claims.iss = signer.public_key();
    claims.iat = chrono::Utc::now().timestamp();
    claims.jti = String::new();
    claims.jti = claims_id(&claims)?;

    let header = Header {
        typ: "JWT".to_string(),
        alg: ALGORITHM.to_string(),
    };
    let header = BASE64URL.encode(
        serde_json::to_vec(&header).map_err(|e| ClaimsError::Encoding(e.to_string()))?,
    );
    let payload = BASE64URL.encode(
        serde_json::to_vec(&claims).map_err(|e| ClaimsError::Encoding(e.to_string()))?,
    );

    let signing_input = format!("{header}.{payload}");
    let signature = signer
        .sign(signing_input.as_bytes())
        .map_err(|e| ClaimsError::Encoding(format!("signing failed: {e}")))?;

    Ok(format!("{signing_input}.{}", BASE64URL.encode(signature)))
}

/// Decode a JWT and verify its signature against the `iss` key it names
pub fn decode<T: DeserializeOwned>(token: &str) -> Result<JwtClaims<T>, ClaimsError> {
    let mut parts = token.trim().split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ClaimsError::Decoding("expected three JWT segments".into()));
    };

    let header: Header = decode_segment(header)?;
    if header.alg != ALGORITHM && header.alg != "ed25519" {
        return Err(ClaimsError::Decoding(format!(
            "unsupported algorithm {}",
            header.alg
        )));
    }

    let claims: JwtClaims<T> = decode_segment(payload)?;
    let signature = BASE64URL
        .decode(signature)
        .map_err(|e| ClaimsError::Decoding(format!("bad signature encoding: {e}")))?;

    let issuer = KeyPair::from_public_key(&claims.iss)
        .map_err(|e| ClaimsError::Decoding(format!("bad issuer {}: {e}", claims.iss)))?;
    let signing_input = &token.trim()[..token.trim().rfind('.').unwrap_or(0)];
    issuer
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| ClaimsError::Decoding(format!("signature does not match issuer {}", claims.iss)))?;

    Ok(claims)
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, ClaimsError> {
    let bytes = BASE64URL
        .decode(segment)
        .map_err(|e| ClaimsError::Decoding(format!("bad base64 segment: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Decoding(e.to_string()))
}

fn claims_id<T: Serialize>(claims: &JwtClaims<T>) -> Result<String, ClaimsError> {
    let json = serde_json::to_vec(claims).map_err(|e| ClaimsError::Encoding(e.to_string()))?;
    Ok(BASE32_NOPAD.encode(&Sha512_256::digest(&json)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::nats::NatsAccountDeletion;

    fn deletion_claims(sub: &str) -> JwtClaims<NatsAccountDeletion> {
        JwtClaims {
            jti: String::new(),
            iat: 0,
            iss: String::new(),
            name: String::new(),
            sub: sub.to_string(),
            exp: None,
            nats: NatsAccountDeletion::new(vec!["ABC".to_string()]),
        }
    }

    #[test]
    fn test_encode_then_decode_verifies() {
        let operator = KeyPair::new_operator();
        let token = encode(deletion_claims(&operator.public_key()), &operator).unwrap();

        assert_eq!(token.split('.').count(), 3);

        let decoded: JwtClaims<NatsAccountDeletion> = decode(&token).unwrap();
        assert_eq!(decoded.iss, operator.public_key());
        assert_eq!(decoded.nats.accounts, vec!["ABC"]);
        assert!(!decoded.jti.is_empty());
        assert!(decoded.iat > 0);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let operator = KeyPair::new_operator();
        let token = encode(deletion_claims("sub"), &operator).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let forged = BASE64URL.encode(
            serde_json::to_vec(&deletion_claims("someone-else")).unwrap(),
        );
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert!(decode::<NatsAccountDeletion>(&tampered).is_err());
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(decode::<NatsAccountDeletion>("not-a-jwt").is_err());
        assert!(decode::<NatsAccountDeletion>("a.b.c.d").is_err());
    }
}
