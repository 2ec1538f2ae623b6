//! Signing keypairs for tests
//!
//! Keys are generated fresh per call with `ring` and can publish their public
//! half as a JWK, so tests can serve them from a mock JWKS endpoint.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
};
use serde_json::{json, Value};

/// A signing keypair with its key id.
pub struct TestKeypair {
    kid: String,
    algorithm: Algorithm,
    pkcs8: Vec<u8>,
    public_jwk: Value,
}

impl TestKeypair {
    /// Generate a P-256 keypair (ES256), the key type IAP signs with.
    pub fn es256(kid: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .expect("Failed to generate ES256 keypair");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .expect("Failed to load ES256 keypair");

        // Uncompressed point: 0x04 || X || Y
        let point = key_pair.public_key().as_ref();
        assert_eq!(point.len(), 65, "unexpected P-256 public key length");
        let (x, y) = point[1..].split_at(32);

        let public_jwk = json!({
            "kty": "EC",
            "crv": "P-256",
            "kid": kid,
            "use": "sig",
            "alg": "ES256",
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
        });

        Self {
            kid: kid.to_string(),
            algorithm: Algorithm::ES256,
            pkcs8: pkcs8.as_ref().to_vec(),
            public_jwk,
        }
    }

    /// Generate an Ed25519 keypair (EdDSA).
    pub fn ed25519(kid: &str) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("Failed to generate Ed25519 keypair");
        let key_pair =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("Failed to load Ed25519 keypair");

        let public_jwk = json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": kid,
            "use": "sig",
            "alg": "EdDSA",
            "x": URL_SAFE_NO_PAD.encode(key_pair.public_key().as_ref()),
        });

        Self {
            kid: kid.to_string(),
            algorithm: Algorithm::EdDSA,
            pkcs8: pkcs8.as_ref().to_vec(),
            public_jwk,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Public half as a JWK object.
    pub fn jwk(&self) -> Value {
        self.public_jwk.clone()
    }

    /// Public half as a JWK object without `alg` and `kid`.
    pub fn bare_jwk(&self) -> Value {
        let mut jwk = self.public_jwk.clone();
        if let Some(obj) = jwk.as_object_mut() {
            obj.remove("alg");
            obj.remove("kid");
        }
        jwk
    }

    fn encoding_key(&self) -> EncodingKey {
        match self.algorithm {
            Algorithm::EdDSA => EncodingKey::from_ed_der(&self.pkcs8),
            _ => EncodingKey::from_ec_der(&self.pkcs8),
        }
    }

    /// Sign `claims` with this key, setting `kid` in the header.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_kid(claims, Some(&self.kid))
    }

    /// Sign `claims`, with an arbitrary (or no) `kid` in the header.
    pub fn sign_with_kid(&self, claims: &Value, kid: Option<&str>) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = kid.map(str::to_string);
        encode(&header, claims, &self.encoding_key()).expect("Failed to sign test token")
    }
}

/// Flip one character of the signature segment so it no longer verifies.
pub fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').expect("token has three segments");
    let mut chars: Vec<char> = signature.chars().collect();
    let first = chars.first_mut().expect("signature is not empty");
    *first = if *first == 'A' { 'B' } else { 'A' };
    format!("{signed}.{}", chars.into_iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_es256_jwk_shape() {
        let key = TestKeypair::es256("ec-1");
        let jwk = key.jwk();
        assert_eq!(jwk["kty"], "EC");
        assert_eq!(jwk["kid"], "ec-1");
        assert_eq!(jwk["alg"], "ES256");
        assert!(jwk["x"].as_str().unwrap().len() > 40);
    }

    #[test]
    fn test_sign_sets_kid_and_alg() {
        let key = TestKeypair::ed25519("ed-1");
        let token = key.sign(&json!({"sub": "alice"}));
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("ed-1"));
        assert_eq!(header.alg, Algorithm::EdDSA);
    }

    #[test]
    fn test_bare_jwk_drops_alg_and_kid() {
        let jwk = TestKeypair::ed25519("ed-1").bare_jwk();
        assert!(jwk.get("alg").is_none());
        assert!(jwk.get("kid").is_none());
    }

    #[test]
    fn test_tamper_signature_changes_token() {
        let key = TestKeypair::es256("ec-1");
        let token = key.sign(&json!({"sub": "alice"}));
        assert_ne!(tamper_signature(&token), token);
    }
}
