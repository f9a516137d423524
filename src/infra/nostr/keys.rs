//! Nostr identity: a secp256k1 keypair and its NIP-19 bech32 forms.

use bech32::{Bech32, Hrp};
use secp256k1::{All, Keypair, Message, Secp256k1, SecretKey};
use thiserror::Error;

const NSEC_HRP: Hrp = Hrp::parse_unchecked("nsec");
const NPUB_HRP: Hrp = Hrp::parse_unchecked("npub");

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid bech32 string: {0}")]
    Decode(#[from] bech32::DecodeError),
    #[error("failed to encode bech32 string: {0}")]
    Encode(#[from] bech32::EncodeError),
    #[error("expected a `{expected}` string, found `{found}`")]
    WrongPrefix {
        expected: &'static str,
        found: String,
    },
    #[error("invalid secret key: {0}")]
    InvalidKey(#[from] secp256k1::Error),
}

pub struct NostrKeys {
    secp: Secp256k1<All>,
    keypair: Keypair,
    public: [u8; 32],
}

impl std::fmt::Debug for NostrKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NostrKeys")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl NostrKeys {
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut secp256k1::rand::thread_rng());
        Self::from_secret(secret)
    }

    /// Load the identity from a bech32 `nsec1…` string.
    pub fn from_nsec(nsec: &str) -> Result<Self, KeyError> {
        let (hrp, data) = bech32::decode(nsec.trim())?;
        if hrp != NSEC_HRP {
            return Err(KeyError::WrongPrefix {
                expected: "nsec",
                found: hrp.to_string(),
            });
        }
        let secret = SecretKey::from_slice(&data)?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret);
        let public = keypair.x_only_public_key().0.serialize();
        Self {
            secp,
            keypair,
            public,
        }
    }

    /// The x-only public key, as used in event `pubkey` fields.
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public)
    }

    pub fn npub(&self) -> Result<String, KeyError> {
        Ok(bech32::encode::<Bech32>(NPUB_HRP, &self.public)?)
    }

    pub fn nsec(&self) -> Result<String, KeyError> {
        Ok(bech32::encode::<Bech32>(
            NSEC_HRP,
            &self.keypair.secret_key().secret_bytes(),
        )?)
    }

    /// BIP-340 signature over a 32-byte digest, hex encoded.
    pub fn sign(&self, digest: [u8; 32]) -> String {
        let message = Message::from_digest(digest);
        self.secp
            .sign_schnorr(&message, &self.keypair)
            .to_string()
    }
}
