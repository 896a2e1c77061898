//! Credential storage.
//!
//! Known networks are kept as one `identifier;secret` line per entry in a
//! small UTF-8 file. There is no escaping: an identifier holding `;` or a
//! line break, or a secret holding a line break, cannot be stored.
//!
//! Storage backends implement [`CredentialStorage`]:
//! - `FileCredentialStorage` for a file on the device filesystem
//! - `MemoryCredentialStorage` for tests and the simulator

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Known networks, identifier to secret. Ordered so serialization is stable.
pub type Credentials = BTreeMap<String, String>;

/// Errors that can occur during credential storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing resource is missing, unreadable or unwritable.
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    /// An entry cannot be represented in the line format.
    #[error("Invalid credential entry: {0}")]
    InvalidEntry(String),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Abstract credential storage.
pub trait CredentialStorage {
    /// Read every stored credential.
    fn load(&self) -> Result<Credentials, StoreError>;

    /// Replace the stored credentials with `credentials`.
    fn save(&mut self, credentials: &Credentials) -> Result<(), StoreError>;

    /// Where the credentials live, for display to an operator.
    fn location(&self) -> Option<String> {
        None
    }
}

/// Parse the line format. Malformed lines are skipped.
pub fn parse_credentials(text: &str) -> Credentials {
    let mut credentials = Credentials::new();

    for (index, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        match line.split_once(';') {
            Some((ssid, password)) if !ssid.is_empty() => {
                credentials.insert(ssid.to_string(), password.to_string());
            }
            _ => warn!("Skipping malformed credential line {}", index + 1),
        }
    }

    credentials
}

/// Decode raw store contents.
pub fn decode_credentials(bytes: &[u8]) -> Result<Credentials, StoreError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::Unavailable(format!("not UTF-8: {}", e)))?;
    Ok(parse_credentials(text))
}

/// Serialize to the line format, one `identifier;secret\n` per entry.
pub fn serialize_credentials(credentials: &Credentials) -> Result<String, StoreError> {
    let mut out = String::new();

    for (ssid, password) in credentials {
        validate_entry(ssid, password)?;
        out.push_str(ssid);
        out.push(';');
        out.push_str(password);
        out.push('\n');
    }

    Ok(out)
}

/// Check that an entry survives the line format unchanged.
pub fn validate_entry(ssid: &str, password: &str) -> Result<(), StoreError> {
    if ssid.is_empty() {
        return Err(StoreError::InvalidEntry("empty identifier".to_string()));
    }
    if ssid.contains([';', '\n', '\r']) {
        return Err(StoreError::InvalidEntry(format!(
            "identifier {:?} contains a separator",
            ssid
        )));
    }
    if password.contains(['\n', '\r']) {
        return Err(StoreError::InvalidEntry(format!(
            "secret for {:?} contains a line break",
            ssid
        )));
    }
    Ok(())
}

/// Add or overwrite one credential, keeping all other entries.
///
/// A store that cannot be read is treated as empty.
pub fn merge_credential<C: CredentialStorage + ?Sized>(
    storage: &mut C,
    ssid: &str,
    password: &str,
) -> Result<(), StoreError> {
    validate_entry(ssid, password)?;

    let mut credentials = storage.load().unwrap_or_else(|e| {
        warn!("Starting from empty credentials: {}", e);
        Credentials::new()
    });
    credentials.insert(ssid.to_string(), password.to_string());
    storage.save(&credentials)
}

/// File-based credential storage.
///
/// Saves write a sibling temporary file and rename it over the target, so a
/// reader sees either the old or the new contents.
#[derive(Debug, Clone)]
pub struct FileCredentialStorage {
    path: PathBuf,
}

impl FileCredentialStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialStorage for FileCredentialStorage {
    fn load(&self) -> Result<Credentials, StoreError> {
        let bytes = fs::read(&self.path).map_err(|e| {
            StoreError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        decode_credentials(&bytes)
    }

    fn save(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        let contents = serialize_credentials(credentials)?;
        let temp = self.temp_path();
        fs::write(&temp, contents.as_bytes())?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn location(&self) -> Option<String> {
        Some(self.path.display().to_string())
    }
}

/// In-memory credential storage.
///
/// Clones share the same contents, so a test can keep a handle while the
/// manager owns another. `None` contents behave like a missing file.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStorage {
    contents: Arc<Mutex<Option<Vec<u8>>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryCredentialStorage {
    /// Storage with no backing resource yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding the given raw contents.
    pub fn with_contents(contents: &str) -> Self {
        let storage = Self::default();
        storage.set_contents(Some(contents.as_bytes().to_vec()));
        storage
    }

    /// Replace the raw contents.
    pub fn set_contents(&self, contents: Option<Vec<u8>>) {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = contents;
    }

    /// Raw contents as text, if present.
    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Make subsequent saves fail.
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

impl CredentialStorage for MemoryCredentialStorage {
    fn load(&self) -> Result<Credentials, StoreError> {
        let contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        match contents.as_ref() {
            Some(bytes) => decode_credentials(bytes),
            None => Err(StoreError::Unavailable("no stored credentials".to_string())),
        }
    }

    fn save(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StoreError::Unavailable("write refused".to_string()));
        }
        let text = serialize_credentials(credentials)?;
        self.set_contents(Some(text.into_bytes()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn creds(entries: &[(&str, &str)]) -> Credentials {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let text = "home;secret1\nno-separator\n;orphan\n\r\ncafe;\noffice;a;b\r\n";
        let parsed = parse_credentials(text);

        assert_eq!(
            parsed,
            creds(&[("cafe", ""), ("home", "secret1"), ("office", "a;b")])
        );
    }

    #[test]
    fn test_serialize_is_sorted() {
        let text = serialize_credentials(&creds(&[("zeta", "z"), ("alpha", "")])).unwrap();
        assert_eq!(text, "alpha;\nzeta;z\n");
    }

    #[test]
    fn test_serialize_rejects_separators() {
        assert!(matches!(
            serialize_credentials(&creds(&[("a;b", "x")])),
            Err(StoreError::InvalidEntry(_))
        ));
        assert!(matches!(
            serialize_credentials(&creds(&[("net", "x\ny")])),
            Err(StoreError::InvalidEntry(_))
        ));
    }

    #[test]
    fn test_save_load_preserves_content() {
        let mut storage = MemoryCredentialStorage::with_contents("b;2\na;1\nc;\n");
        let loaded = storage.load().unwrap();
        storage.save(&loaded).unwrap();

        assert_eq!(storage.load().unwrap(), loaded);
        assert_eq!(storage.contents().unwrap(), "a;1\nb;2\nc;\n");
    }

    #[test]
    fn test_missing_store_is_unavailable() {
        let storage = MemoryCredentialStorage::new();
        assert!(matches!(storage.load(), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_invalid_utf8_is_unavailable() {
        let storage = MemoryCredentialStorage::new();
        storage.set_contents(Some(vec![0x68, 0xff, b';', b'x']));
        assert!(matches!(storage.load(), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_merge_overwrites_one_entry() {
        let mut storage = MemoryCredentialStorage::with_contents("home;old\nwork;w\n");

        merge_credential(&mut storage, "home", "new").unwrap();
        merge_credential(&mut storage, "cafe", "").unwrap();

        assert_eq!(
            storage.load().unwrap(),
            creds(&[("cafe", ""), ("home", "new"), ("work", "w")])
        );
    }

    #[test]
    fn test_merge_into_missing_store() {
        let mut storage = MemoryCredentialStorage::new();
        merge_credential(&mut storage, "home", "secret").unwrap();
        assert_eq!(storage.contents().unwrap(), "home;secret\n");
    }

    #[test]
    fn test_merge_write_failure() {
        let mut storage = MemoryCredentialStorage::with_contents("home;x\n");
        storage.fail_writes(true);

        assert!(merge_credential(&mut storage, "work", "y").is_err());
        assert_eq!(storage.contents().unwrap(), "home;x\n");
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wifi.dat");
        let mut storage = FileCredentialStorage::new(&path);

        assert!(matches!(storage.load(), Err(StoreError::Unavailable(_))));

        storage
            .save(&creds(&[("home", "secret1"), ("guest", "")]))
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "guest;\nhome;secret1\n"
        );
        assert_eq!(
            storage.load().unwrap(),
            creds(&[("guest", ""), ("home", "secret1")])
        );
        assert!(!dir.path().join("wifi.dat.tmp").exists());
    }

    #[test]
    fn test_file_storage_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wifi.dat");
        std::fs::write(&path, "old;1\nstale;2\n").unwrap();

        let mut storage = FileCredentialStorage::new(&path);
        storage.save(&creds(&[("new", "3")])).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new;3\n");
    }

    #[test]
    fn test_storage_location() {
        let file = FileCredentialStorage::new("/data/wifi.dat");
        assert_eq!(file.location().as_deref(), Some("/data/wifi.dat"));
        assert_eq!(MemoryCredentialStorage::new().location(), None);
    }
}
