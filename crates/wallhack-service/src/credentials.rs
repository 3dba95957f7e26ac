//! Credential file loading.

use std::path::Path;

use serde::Deserialize;

use crate::ServiceError;

/// Environment variable naming the directory of supervisor-delivered
/// credential files.
pub(crate) const CREDENTIALS_DIR_ENV: &str = "CREDENTIALS_DIRECTORY";

/// Name of the credential file inside that directory.
pub(crate) const CREDENTIAL_NAME: &str = "wallhack";

/// Endpoint credentials, parsed once at startup and immutable afterwards.
///
/// Each field is a PEM string, not a path. `ca` is only delivered to
/// servers; clients fall back to the system root set without it.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub cert: String,
    pub key: String,
    #[serde(default)]
    pub ca: Option<String>,
}

pub(crate) fn load(dir: &Path) -> Result<Credentials, ServiceError> {
    let blob = std::fs::read_to_string(dir.join(CREDENTIAL_NAME))?;
    Ok(serde_yaml::from_str(&blob)?)
}
