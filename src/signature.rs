//! RSASSA-PKCS1-v1_5 signature verification
//!
//! Both formats append a signature over a canonical "signed body" prefix of
//! the file: RSA-1024 with SHA-1 for PPM, RSA-2048 with SHA-256 for KWZ.
//! Nintendo's public keys for both are built in; any other primitive can be
//! injected through [`SignatureVerifier`].

use crate::error::{FlipnoteError, Result};
use crate::format::FlipnoteFormat;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;

/// Flipnote Studio signing key (RSA-1024)
pub const PPM_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQDCPLwTL6oSflv+gjywi/sM0TUB
90xqOvxBGD0zPpbbGhtAeB0thRCBIw6nJUAPhbzRBRLZRQ1JGQz1kAtlgYeKAwXF
mAI9xnuJLBGJvvD7JYf85QKvYpgapVAmxAUyyQoUJjkZjO4wJ5/Q+IuldhOrxfC+
g0D3G1UdkIzZxIx4zwIDAQAB
-----END PUBLIC KEY-----
";

/// Flipnote Studio 3D signing key (RSA-2048)
pub const KWZ_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAuv+zHAXXvbbtRqxADDeJ
ArX2b9RMxj3T+qpRg3FnIE/jXaYgxpXeKVkG7kaC0L5EBjl3UXxcRO3o5e6jLDMG
1u25m4pFPnXMjAPyN6PJRXELsWK1vhO6CL7cWrzcBNj1FXXgsBrzNL+2SnzhUTnL
hu+sv/8U+1v4i+ZFOOr9tBThw1ZlyDW1jm9dPKbLg5Ejz9bIRfuadxhK13VoAz5D
jg4N8xGK6WHbxeHj2bHO0KZHmqZc/M5G2NuJbwGykPEr9K2Dpbc5c23BD3OjqHBp
QMTiB69ctGRZojx3IyYBHeZEFZX1xgFB48yvtJyLqS5NOcj8G9iqyeDOBOh2wepk
KQIDAQAB
-----END PUBLIC KEY-----
";

/// Digest paired with the RSA key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureHash {
    /// SHA-1, used by PPM
    Sha1,
    /// SHA-256, used by KWZ
    Sha256,
}

/// Verification primitive for a signed body
pub trait SignatureVerifier {
    /// Returns `Ok(false)` for a mismatching signature; errors are reserved
    /// for unusable key material.
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool>;
}

/// PKCS#1 v1.5 verifier over an RSA public key
#[derive(Debug, Clone)]
pub struct RsaPkcs1Verifier {
    key: RsaPublicKey,
    hash: SignatureHash,
}

impl RsaPkcs1Verifier {
    /// Wrap an already parsed key
    pub fn new(key: RsaPublicKey, hash: SignatureHash) -> Self {
        RsaPkcs1Verifier { key, hash }
    }

    /// Parse a PEM key, accepting either SPKI (`PUBLIC KEY`) or PKCS#1
    /// (`RSA PUBLIC KEY`) encoding
    pub fn from_pem(pem: &str, hash: SignatureHash) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| FlipnoteError::SignatureKeyError(e.to_string()))?;
        Ok(Self::new(key, hash))
    }

    /// Built-in key and digest for `format`
    pub fn builtin(format: FlipnoteFormat) -> Result<Self> {
        match format {
            FlipnoteFormat::Ppm => Self::from_pem(PPM_PUBLIC_KEY_PEM, SignatureHash::Sha1),
            FlipnoteFormat::Kwz => Self::from_pem(KWZ_PUBLIC_KEY_PEM, SignatureHash::Sha256),
        }
    }

    /// Digest this verifier hashes the signed body with
    pub fn hash(&self) -> SignatureHash {
        self.hash
    }

    /// Modulus size in bytes, which is also the signature length
    pub fn signature_len(&self) -> usize {
        self.key.size()
    }

    fn digest(&self, message: &[u8]) -> (Pkcs1v15Sign, Vec<u8>) {
        match self.hash {
            SignatureHash::Sha1 => (Pkcs1v15Sign::new::<Sha1>(), Sha1::digest(message).to_vec()),
            SignatureHash::Sha256 => (
                Pkcs1v15Sign::new::<Sha256>(),
                Sha256::digest(message).to_vec(),
            ),
        }
    }
}

impl SignatureVerifier for RsaPkcs1Verifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        if signature.len() != self.signature_len() {
            tracing::debug!(
                expected = self.signature_len(),
                actual = signature.len(),
                "signature length does not match key size"
            );
            return Ok(false);
        }
        let (scheme, hashed) = self.digest(message);
        match self.key.verify(scheme, &hashed, signature) {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::debug!(%err, "signature rejected");
                Ok(false)
            }
        }
    }
}
