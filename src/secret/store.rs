use std::sync::{Arc, Mutex};

use aes_gcm::{
    aead::{consts::U16, AeadInPlace},
    aes::Aes256,
    AesGcm, KeyInit, Nonce, Tag,
};
use rand::RngCore;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::settings::SettingsStore;

use super::error::{Result, SecretError};

/// Settings key the encryption key is persisted under, hex-encoded.
pub const KEY_SETTING: &str = "secret.key";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const FIELD_DELIMITER: char = ':';

/// AES-256-GCM with the 16-byte initialization vector the envelope format carries.
type EnvelopeCipher = AesGcm<Aes256, U16>;

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct KeyMaterial([u8; KEY_LEN]);

impl KeyMaterial {
    fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn decode(encoded: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(encoded)?;
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow::anyhow!("expected {KEY_LEN} key bytes, got {}", b.len()))?;
        Ok(Self(bytes))
    }

    fn encode(&self) -> String {
        hex::encode(self.0)
    }
}

/// Authenticated encryption of small text blobs.
///
/// The key is provisioned on first use: read back from the settings store when one
/// was persisted earlier, generated otherwise, then cached for the process
/// lifetime. Construct one store at startup and hand it to whatever needs
/// encryption instead of reaching for process-global key state.
///
/// Envelopes are `hex(iv):hex(tag):hex(ciphertext)`. A fresh random IV is drawn per
/// encryption, reuse under one key would void the cipher's guarantees.
pub struct SecretStore {
    settings: Option<Arc<dyn SettingsStore>>,
    key: Mutex<Option<KeyMaterial>>,
}

impl SecretStore {
    /// A store without settings works purely in memory: secrets encrypted by it
    /// can't be recovered after the process exits.
    pub fn new(settings: Option<Arc<dyn SettingsStore>>) -> Self {
        Self {
            settings,
            key: Mutex::new(None),
        }
    }

    /// Encrypts `plaintext` into an envelope string. Empty input is a contract
    /// violation, not an encryptable value.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(SecretError::InvalidInput);
        }

        let key = self.obtain_key();
        let cipher = EnvelopeCipher::new_from_slice(&key.0)
            .expect("key length is fixed at 32 bytes");

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .expect("in-place encryption of a Vec buffer cannot overflow");

        Ok(format!(
            "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// Decrypts an envelope produced by [SecretStore::encrypt]. Tampered or
    /// foreign-key ciphertext surfaces as [SecretError::AuthenticationFailure],
    /// never as garbage plaintext.
    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        if envelope.is_empty() {
            return Err(SecretError::InvalidInput);
        }

        let fields = envelope.split(FIELD_DELIMITER).collect::<Vec<_>>();
        let (iv_hex, tag_hex, ciphertext_hex) = match fields.as_slice() {
            [iv, tag, ciphertext] => (*iv, *tag, *ciphertext),
            parts => {
                return Err(SecretError::MalformedEnvelope(format!(
                    "expected 3 fields, got {}",
                    parts.len()
                )))
            }
        };

        let iv = decode_field(iv_hex, "iv", Some(IV_LEN))?;
        let tag = decode_field(tag_hex, "tag", Some(TAG_LEN))?;
        let mut buffer = decode_field(ciphertext_hex, "ciphertext", None)?;

        let key = self.obtain_key();
        let cipher = EnvelopeCipher::new_from_slice(&key.0)
            .expect("key length is fixed at 32 bytes");

        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| SecretError::AuthenticationFailure)?;

        // The tag authenticates the plaintext, so non-utf8 output means the
        // envelope never came from this store's encrypt.
        String::from_utf8(buffer).map_err(|_| SecretError::AuthenticationFailure)
    }

    /// Drops the cached key. The persisted copy, when there is one, is left in
    /// place and gets reloaded on the next operation. Without persistence this is
    /// destructive: everything encrypted under the dropped key stays unreadable.
    /// Meant for rotation tooling and test isolation.
    pub fn reset_key(&self) {
        self.key.lock().unwrap().take();
    }

    /// Read-or-generate-and-cache, done under one lock so concurrent callers can
    /// never end up with two different keys.
    fn obtain_key(&self) -> KeyMaterial {
        let mut cached = self.key.lock().unwrap();
        if let Some(key) = cached.as_ref() {
            return key.clone();
        }

        if let Some(settings) = &self.settings {
            if let Some(encoded) = settings.get(KEY_SETTING) {
                match KeyMaterial::decode(&encoded) {
                    Ok(key) => {
                        *cached = Some(key.clone());
                        return key;
                    }
                    Err(e) => {
                        warn!("Persisted encryption key is unusable, generating a fresh one: {e}")
                    }
                }
            }
        }

        let key = KeyMaterial::generate();
        if let Some(settings) = &self.settings {
            settings.set(KEY_SETTING, &key.encode());
            if let Err(e) = settings.flush() {
                // Non-fatal: the key keeps working for this process but won't
                // survive a restart.
                warn!("Couldn't persist the encryption key: {e:?}");
            }
        }
        *cached = Some(key.clone());
        key
    }
}

fn decode_field(encoded: &str, name: &str, expected_len: Option<usize>) -> Result<Vec<u8>> {
    let bytes = hex::decode(encoded)
        .map_err(|_| SecretError::MalformedEnvelope(format!("{name} field is not valid hex")))?;
    if let Some(expected) = expected_len {
        if bytes.len() != expected {
            return Err(SecretError::MalformedEnvelope(format!(
                "{name} field must hold {expected} bytes, got {}",
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use tempfile::tempdir;

    use crate::{
        secret::error::SecretError,
        settings::{JsonSettingsStore, MockSettingsStore, SettingsStore},
    };

    use super::{SecretStore, KEY_SETTING};

    fn in_memory_store() -> SecretStore {
        SecretStore::new(None)
    }

    /// Re-encodes an envelope with one bit flipped inside the chosen field.
    fn flip_bit_in_field(envelope: &str, field: usize) -> String {
        let mut fields = envelope
            .split(':')
            .map(|v| hex::decode(v).unwrap())
            .collect::<Vec<_>>();
        fields[field][0] ^= 0x01;
        fields
            .iter()
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(":")
    }

    #[test]
    fn test_round_trip() {
        let store = in_memory_store();
        let envelope = store.encrypt("refresh-token-123").unwrap();
        assert_eq!(store.decrypt(&envelope).unwrap(), "refresh-token-123");
    }

    #[test]
    fn test_envelope_layout() {
        let store = in_memory_store();
        let envelope = store.encrypt("value").unwrap();
        let fields = envelope.split(':').collect::<Vec<_>>();
        assert_eq!(fields.len(), 3);
        // 16 byte iv, 16 byte tag, ciphertext as long as the plaintext
        assert_eq!(fields[0].len(), 32);
        assert_eq!(fields[1].len(), 32);
        assert_eq!(fields[2].len(), "value".len() * 2);
        assert!(envelope.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let store = in_memory_store();
        let first = store.encrypt("same plaintext").unwrap();
        let second = store.encrypt("same plaintext").unwrap();
        assert_ne!(first, second);

        let iv_of = |envelope: &str| envelope.split(':').next().unwrap().to_string();
        let ciphertext_of = |envelope: &str| envelope.split(':').last().unwrap().to_string();
        assert_ne!(iv_of(&first), iv_of(&second));
        assert_ne!(ciphertext_of(&first), ciphertext_of(&second));
    }

    #[test]
    fn test_empty_plaintext_is_rejected() {
        let store = in_memory_store();
        assert!(matches!(store.encrypt(""), Err(SecretError::InvalidInput)));
        assert!(matches!(store.decrypt(""), Err(SecretError::InvalidInput)));
    }

    #[test]
    fn test_wrong_field_count_is_malformed() {
        let store = in_memory_store();
        assert!(matches!(
            store.decrypt("onlyonefield"),
            Err(SecretError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            store.decrypt("aa:bb:cc:dd"),
            Err(SecretError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_non_hex_field_is_malformed() {
        let store = in_memory_store();
        let envelope = store.encrypt("value").unwrap();
        let broken = format!("zz{}", &envelope[2..]);
        assert!(matches!(
            store.decrypt(&broken),
            Err(SecretError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_tampered_tag_fails_authentication() {
        let store = in_memory_store();
        let envelope = store.encrypt("important secret").unwrap();
        let tampered = flip_bit_in_field(&envelope, 1);
        assert!(matches!(
            store.decrypt(&tampered),
            Err(SecretError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let store = in_memory_store();
        let envelope = store.encrypt("important secret").unwrap();
        let tampered = flip_bit_in_field(&envelope, 2);
        assert!(matches!(
            store.decrypt(&tampered),
            Err(SecretError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_key_survives_a_restart_through_settings() -> anyhow::Result<()> {
        let dir = tempdir()?;

        let settings: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::open(dir.path())?);
        let store = SecretStore::new(Some(settings));
        let envelope = store.encrypt("oauth refresh token")?;
        drop(store);

        // fresh store over the same settings file simulates a new process
        let settings: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::open(dir.path())?);
        let reopened = SecretStore::new(Some(settings.clone()));
        assert_eq!(reopened.decrypt(&envelope)?, "oauth refresh token");
        assert_eq!(settings.get(KEY_SETTING).map(|k| k.len()), Some(64));
        Ok(())
    }

    #[test]
    fn test_reset_without_persistence_orphans_old_ciphertext() {
        let store = in_memory_store();
        let envelope = store.encrypt("soon unreadable").unwrap();
        store.reset_key();
        assert!(matches!(
            store.decrypt(&envelope),
            Err(SecretError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_reset_with_persistence_reloads_the_same_key() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let settings: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::open(dir.path())?);
        let store = SecretStore::new(Some(settings));

        let envelope = store.encrypt("still readable")?;
        store.reset_key();
        assert_eq!(store.decrypt(&envelope)?, "still readable");
        Ok(())
    }

    #[test]
    fn test_failed_persistence_degrades_to_in_memory() {
        let mut settings = MockSettingsStore::new();
        settings.expect_get().returning(|_| None);
        settings
            .expect_set()
            .withf(|key, value| key == KEY_SETTING && value.len() == 64)
            .times(1)
            .return_const(());
        settings
            .expect_flush()
            .times(1)
            .returning(|| Err(anyhow!("disk full")));

        let store = SecretStore::new(Some(Arc::new(settings)));
        // the operation still succeeds, only durability is degraded
        let envelope = store.encrypt("works anyway").unwrap();
        assert_eq!(store.decrypt(&envelope).unwrap(), "works anyway");
    }

    #[test]
    fn test_unusable_persisted_key_is_replaced() {
        let mut settings = MockSettingsStore::new();
        settings
            .expect_get()
            .returning(|_| Some("not hex at all".to_string()));
        settings.expect_set().times(1).return_const(());
        settings.expect_flush().times(1).returning(|| Ok(()));

        let store = SecretStore::new(Some(Arc::new(settings)));
        let envelope = store.encrypt("fresh key").unwrap();
        assert_eq!(store.decrypt(&envelope).unwrap(), "fresh key");
    }
}
