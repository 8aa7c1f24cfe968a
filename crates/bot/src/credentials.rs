//! File-backed credential state for the session.
//!
//! Layout: `<session_dir>/creds.json`. The file is seeded once from the
//! configured session id and afterwards only rewritten by credential updates
//! coming from the transport.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {serde_json::Value, tracing::debug};

use crate::error::Result;

pub const CREDENTIALS_FILE: &str = "creds.json";

/// What [`CredentialStore::initialize`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// A credential file already existed and was left untouched.
    Existing,
    /// A new credential file was written from the session id.
    Seeded,
    /// No file and no session id; the transport will have to pair.
    Unseeded,
}

pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    /// Create the session directory and seed the credential file.
    ///
    /// Never overwrites an existing file.
    pub fn initialize(&self, session_id: Option<&str>) -> Result<SeedOutcome> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path();
        if path.exists() {
            debug!(path = %path.display(), "credential file present");
            return Ok(SeedOutcome::Existing);
        }

        let Some(session_id) = session_id else {
            return Ok(SeedOutcome::Unseeded);
        };

        let seed = serde_json::json!({ "session": session_id });
        // create_new so a concurrent writer can't be clobbered.
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        serde_json::to_writer(file, &seed)?;
        debug!(path = %path.display(), "seeded credential file");
        Ok(SeedOutcome::Seeded)
    }

    /// Current credential state, `Null` when nothing has been stored yet.
    pub fn load(&self) -> Result<Value> {
        let path = self.path();
        if !path.exists() {
            return Ok(Value::Null);
        }
        let data = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Replace the stored credentials.
    pub fn save(&self, credentials: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{CREDENTIALS_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec(credentials)?)?;
        fs::rename(&tmp, self.path())?;
        Ok(())
    }
}
