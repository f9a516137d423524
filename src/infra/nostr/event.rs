//! NIP-01 events and NIP-19 `naddr` references.

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::keys::{KeyError, NostrKeys};

/// NIP-23 long-form content.
pub const KIND_LONG_FORM: u32 = 30023;

const NADDR_HRP: Hrp = Hrp::parse_unchecked("naddr");
const TLV_IDENTIFIER: u8 = 0;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

/// A signed event as sent to relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    /// SHA-256 of the canonical `[0, pubkey, created_at, kind, tags, content]` array.
    pub fn digest(&self) -> [u8; 32] {
        let canonical = json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ])
        .to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        digest
    }

    pub fn sign(self, keys: &NostrKeys) -> Event {
        let digest = self.digest();
        Event {
            id: hex::encode(digest),
            sig: keys.sign(digest),
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }
}

/// Fields of a long-form article event.
#[derive(Debug, Clone)]
pub struct LongFormArticle<'a> {
    /// Value of the `d` tag; replaceable events share it across revisions.
    pub identifier: &'a str,
    pub title: &'a str,
    pub client: &'a str,
    pub topics: &'a [String],
    pub content: String,
    pub created_at: i64,
}

impl LongFormArticle<'_> {
    pub fn into_event(self, keys: &NostrKeys) -> Event {
        let mut tags = vec![
            vec!["d".to_string(), self.identifier.to_string()],
            vec!["title".to_string(), self.title.to_string()],
            vec!["client".to_string(), self.client.to_string()],
        ];
        tags.extend(
            self.topics
                .iter()
                .map(|topic| vec!["t".to_string(), topic.clone()]),
        );

        UnsignedEvent {
            pubkey: keys.public_key_hex(),
            created_at: self.created_at,
            kind: KIND_LONG_FORM,
            tags,
            content: self.content,
        }
        .sign(keys)
    }
}

/// Bech32 `naddr` pointing at a replaceable event by kind, author and identifier.
pub fn encode_naddr(identifier: &str, author: [u8; 32], kind: u32) -> Result<String, KeyError> {
    let mut tlv = Vec::with_capacity(identifier.len() + 44);
    push_tlv(&mut tlv, TLV_IDENTIFIER, identifier.as_bytes());
    push_tlv(&mut tlv, TLV_AUTHOR, &author);
    push_tlv(&mut tlv, TLV_KIND, &kind.to_be_bytes());
    Ok(bech32::encode::<Bech32>(NADDR_HRP, &tlv)?)
}

fn push_tlv(buf: &mut Vec<u8>, kind: u8, value: &[u8]) {
    // Identifiers are hex digests, well under the one-byte length limit.
    let len = u8::try_from(value.len()).unwrap_or(u8::MAX);
    buf.push(kind);
    buf.push(len);
    buf.extend_from_slice(&value[..usize::from(len)]);
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use secp256k1::{Message, Secp256k1, XOnlyPublicKey, schnorr::Signature};

    use super::*;

    fn article(topics: &[String]) -> LongFormArticle<'_> {
        LongFormArticle {
            identifier: "abc123",
            title: "Hello",
            client: "lantern",
            topics,
            content: "body".to_string(),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn event_carries_article_tags_in_order() {
        let keys = NostrKeys::generate();
        let topics = vec!["rust".to_string(), "nostr".to_string()];
        let event = article(&topics).into_event(&keys);

        assert_eq!(event.kind, KIND_LONG_FORM);
        assert_eq!(event.pubkey, keys.public_key_hex());
        assert_eq!(
            event.tags,
            vec![
                vec!["d".to_string(), "abc123".to_string()],
                vec!["title".to_string(), "Hello".to_string()],
                vec!["client".to_string(), "lantern".to_string()],
                vec!["t".to_string(), "rust".to_string()],
                vec!["t".to_string(), "nostr".to_string()],
            ]
        );
    }

    #[test]
    fn id_is_the_digest_and_signature_verifies() {
        let keys = NostrKeys::generate();
        let event = article(&[]).into_event(&keys);

        let unsigned = UnsignedEvent {
            pubkey: event.pubkey.clone(),
            created_at: event.created_at,
            kind: event.kind,
            tags: event.tags.clone(),
            content: event.content.clone(),
        };
        let digest = unsigned.digest();
        assert_eq!(event.id, hex::encode(digest));

        let signature = Signature::from_str(&event.sig).expect("signature");
        let public = XOnlyPublicKey::from_slice(&keys.public_key()).expect("public key");
        Secp256k1::verification_only()
            .verify_schnorr(&signature, &Message::from_digest(digest), &public)
            .expect("valid signature");
    }

    #[test]
    fn naddr_encodes_identifier_author_and_kind() {
        let author = [9u8; 32];
        let naddr = encode_naddr("abc123", author, KIND_LONG_FORM).expect("naddr");
        assert!(naddr.starts_with("naddr1"));

        let (hrp, data) = bech32::decode(&naddr).expect("decode");
        assert_eq!(hrp.as_str(), "naddr");
        assert_eq!(&data[..2], &[TLV_IDENTIFIER, 6]);
        assert_eq!(&data[2..8], b"abc123");
        assert_eq!(&data[8..10], &[TLV_AUTHOR, 32]);
        assert_eq!(&data[10..42], &author);
        assert_eq!(&data[42..44], &[TLV_KIND, 4]);
        assert_eq!(&data[44..], &KIND_LONG_FORM.to_be_bytes());
    }
}
