//! Sharing provider keys with another user.

mod bundle;
mod identity;

pub use bundle::{
    unwrap, unwrap_at, wrap, BundlePayload, EncryptionDescriptor, KeyShareBundle, ProviderEntry,
    SenderInfo, UnwrapOutcome, WrapOptions, BUNDLE_VERSION,
};
pub use identity::{fingerprint, PublicIdentity, RecipientIdentity, SHORT_FINGERPRINT_LEN};
