//! Shared fixtures for the cross-crate integration tests.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;
use vaultproxy_core::config::KdfConfig;
use vaultproxy_core::provider::{AuthScheme, ProviderSpec};
use vaultproxy_core::{Config, SecretString};
use vaultproxy_gateway::{Envelope, HandlerContext, MessageRouter};
use vaultproxy_secrets::{
    CryptoProvider, DefaultCrypto, EncryptedKeyRecord, KdfParams, KeyStore, MemoryKeyStore,
    WritableKeyStore,
};

/// A config with a KDF cheap enough for tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.kdf = KdfConfig {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };
    config
}

/// [`test_config`] with `provider` pointed at `target` using bearer auth.
pub fn config_with_target(provider: &str, target: &str) -> Config {
    let mut config = test_config();
    config.providers.insert(
        provider.to_string(),
        ProviderSpec::new(target, AuthScheme::Bearer),
    );
    config
}

pub fn crypto(config: &Config) -> Arc<dyn CryptoProvider> {
    Arc::new(DefaultCrypto::new(KdfParams::from(&config.kdf)))
}

/// Seal `(provider, key)` pairs under `password` into `store`.
pub async fn seed(
    store: &dyn WritableKeyStore,
    config: &Config,
    keys: &[(&str, &str)],
    password: &str,
) {
    let crypto = crypto(config);
    for (provider, key) in keys {
        let record = EncryptedKeyRecord::seal(
            crypto.as_ref(),
            provider,
            &SecretString::new(password),
            &SecretString::new(*key),
        )
        .unwrap();
        store.put(record).await.unwrap();
    }
}

/// An in-memory store holding `keys` sealed under `password`.
pub async fn memory_store(
    config: &Config,
    keys: &[(&str, &str)],
    password: &str,
) -> Arc<MemoryKeyStore> {
    let store = Arc::new(MemoryKeyStore::new());
    seed(store.as_ref(), config, keys, password).await;
    store
}

/// A router over `store` with its initial status derived.
pub async fn router(config: &Config, store: Arc<dyn KeyStore>) -> MessageRouter {
    let context = HandlerContext::new(config, store, crypto(config)).unwrap();
    let router = MessageRouter::new(context);
    router.init().await.unwrap();
    router
}

/// The data of a success envelope.
pub fn data(envelope: Envelope) -> Value {
    assert!(envelope.success, "expected success: {envelope:?}");
    envelope.data.unwrap()
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Install a subscriber writing VaultProxy logs at every level into the
    /// returned capture, for the current thread.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("vaultproxy=trace"))
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: self.buffer.clone(),
        }
    }
}
