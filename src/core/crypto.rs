// Copyright (c) 2026 Data Mesher
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Ed25519 signing and verification over canonical bytes, plus the on-disk
//! key file. Keys travel as base64 of their 32-byte form; signatures as
//! base64 of 64 bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair as _, UnparsedPublicKey, ED25519};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroize;

/// Key and signature errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key file IO failure.
    #[error("key file io: {0}")]
    Io(#[from] std::io::Error),
    /// Key material does not parse.
    #[error("invalid key material")]
    InvalidKey,
    /// Base64 or length error on a wire-encoded key or signature.
    #[error("bad key encoding")]
    BadEncoding,
}

/// Ed25519 verify key; doubles as host identity and network id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VerifyKey([u8; 32]);

impl VerifyKey {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse the padded-base64 wire form.
    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(s).map_err(|_| CryptoError::BadEncoding)?;
        let raw: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::BadEncoding)?;
        Ok(Self(raw))
    }

    /// Padded-base64 wire form.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl fmt::Display for VerifyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key::{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for VerifyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyKey({})", hex::encode(self.0))
    }
}

/// Ed25519 signature bytes (64 on the wire). `Ord` is the lexicographic
/// tie-breaker for equal-timestamp hostname claims.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Parse the padded-base64 wire form; must decode to 64 bytes.
    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(s).map_err(|_| CryptoError::BadEncoding)?;
        if bytes.len() != 64 {
            return Err(CryptoError::BadEncoding);
        }
        Ok(Self(bytes))
    }

    /// Padded-base64 wire form.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }
}

/// Verify `sig` over `msg` under `key`.
pub fn verify(key: &VerifyKey, msg: &[u8], sig: &Signature) -> bool {
    if sig.0.len() != 64 {
        return false;
    }
    UnparsedPublicKey::new(&ED25519, key.as_bytes())
        .verify(msg, &sig.0)
        .is_ok()
}

/// Process signing key.
pub struct Keypair {
    keypair: Ed25519KeyPair,
}

impl Keypair {
    /// Generate a fresh keypair, returning it with its PKCS#8 document.
    pub fn generate() -> Result<(Self, Vec<u8>), CryptoError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| CryptoError::InvalidKey)?;
        let keypair =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| CryptoError::InvalidKey)?;
        Ok((Self { keypair }, pkcs8.as_ref().to_vec()))
    }

    /// Parse a PKCS#8 document.
    pub fn from_pkcs8(bytes: &[u8]) -> Result<Self, CryptoError> {
        let keypair = Ed25519KeyPair::from_pkcs8(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { keypair })
    }

    /// Load the PKCS#8 key file at `path`, generating and persisting one on
    /// first run. Parents are created; the file ends up 0600 on unix.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let mut bytes = fs::read(path)?;
            let parsed = Self::from_pkcs8(&bytes);
            bytes.zeroize();
            return parsed;
        }

        let (keypair, mut pkcs8) = Self::generate()?;
        let written = atomic_write_private(path, &pkcs8);
        pkcs8.zeroize();
        written?;
        Ok(keypair)
    }

    /// Sign message bytes.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.keypair.sign(msg).as_ref().to_vec())
    }

    /// The matching verify key.
    pub fn verify_key(&self) -> VerifyKey {
        let pk = self.keypair.public_key().as_ref();
        let mut out = [0u8; 32];
        out.copy_from_slice(pk);
        VerifyKey(out)
    }
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Atomic write to disk (fsync, then rename).
fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        let _ = f.sync_all();
    }

    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path)?;
    set_private_perms_best_effort(path);
    Ok(())
}
