//! Minimal Nostr client: keys, signed long-form events and relay broadcast.

mod event;
mod keys;
mod relay;

pub use event::{Event, KIND_LONG_FORM, LongFormArticle, UnsignedEvent, encode_naddr};
pub use keys::{KeyError, NostrKeys};
pub use relay::{
    BroadcastReport, DryRunTransport, RelayError, RelayTransport, WebSocketTransport, broadcast,
};

use tracing::{info, warn};

/// Load the configured identity, or create a throwaway one when none is set.
pub fn load_or_generate_keys(nsec: Option<&str>) -> Result<NostrKeys, KeyError> {
    match nsec.map(str::trim).filter(|value| !value.is_empty()) {
        Some(nsec) => {
            let keys = NostrKeys::from_nsec(nsec)?;
            info!(
                target = "lantern::nostr",
                npub = %keys.npub()?,
                "Loaded Nostr identity"
            );
            Ok(keys)
        }
        None => {
            let keys = NostrKeys::generate();
            warn!(
                target = "lantern::nostr",
                nsec = %keys.nsec()?,
                npub = %keys.npub()?,
                "nostr.nsec is not set; generated a new identity for this run"
            );
            Ok(keys)
        }
    }
}
