//! Supervisor integration.
//!
//! The supervisor hands the process pre-bound listeners, a notification
//! socket for readiness and status updates, and a directory of credential
//! files. This crate collects those hand-offs behind one [`Service`] handle;
//! everything here is read from the environment exactly once at startup.

mod credentials;
mod notify;
mod socket;

pub use credentials::Credentials;

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::warn;

/// Service error type.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("environment variable {0} not set")]
    MissingEnv(&'static str),
    #[error("socket activation: {0}")]
    Activation(String),
    #[error("no listeners inherited from supervisor")]
    NoListeners,
    #[error("credentials: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to everything the supervisor delivered to this process.
pub struct Service {
    listeners: Mutex<Vec<std::net::TcpListener>>,
    notify: Option<UnixDatagram>,
    credentials_dir: Option<PathBuf>,
}

impl Service {
    /// Collects supervisor hand-offs from the environment.
    ///
    /// A missing notification socket or credentials directory is not an
    /// error here; the parts that need them fail later with context.
    pub fn from_env() -> Result<Self, ServiceError> {
        Ok(Self {
            listeners: Mutex::new(socket::take_activation_listeners()?),
            notify: notify::connect_from_env(),
            credentials_dir: std::env::var_os(credentials::CREDENTIALS_DIR_ENV).map(PathBuf::from),
        })
    }

    /// Takes ownership of the inherited listeners. Fails if the supervisor
    /// passed none; they cannot be re-taken afterwards.
    pub fn take_listeners(&self) -> Result<Vec<std::net::TcpListener>, ServiceError> {
        let mut listeners = self.listeners.lock();
        if listeners.is_empty() {
            return Err(ServiceError::NoListeners);
        }
        Ok(std::mem::take(&mut *listeners))
    }

    /// Loads and parses the credential file delivered by the supervisor.
    pub fn load_credentials(&self) -> Result<Credentials, ServiceError> {
        let dir = self
            .credentials_dir
            .as_ref()
            .ok_or(ServiceError::MissingEnv(credentials::CREDENTIALS_DIR_ENV))?;
        credentials::load(dir)
    }

    /// Tells the supervisor this service is up and running.
    pub fn mark_ready(&self) {
        self.send_state("READY=1");
    }

    /// Tells the supervisor this service is about to stop.
    pub fn mark_stopping(&self) {
        self.send_state("STOPPING=1");
    }

    /// Publishes a one-line status text to the supervisor.
    pub fn status(&self, text: &str) {
        self.send_state(&format!("STATUS={text}"));
    }

    fn send_state(&self, state: &str) {
        let Some(socket) = &self.notify else {
            return;
        };
        if let Err(err) = socket.send(state.as_bytes()) {
            warn!(error = %err, state, "supervisor notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn service_with_credentials_dir(dir: Option<PathBuf>) -> Service {
        Service {
            listeners: Mutex::new(Vec::new()),
            notify: None,
            credentials_dir: dir,
        }
    }

    #[test]
    fn notifications_without_socket_are_noops() {
        let service = service_with_credentials_dir(None);
        service.mark_ready();
        service.status("listening");
        service.mark_stopping();
    }

    #[test]
    fn missing_credentials_dir_is_reported() {
        let service = service_with_credentials_dir(None);
        assert!(matches!(
            service.load_credentials(),
            Err(ServiceError::MissingEnv(_))
        ));
    }

    #[test]
    fn no_listeners_is_an_error() {
        let service = service_with_credentials_dir(None);
        assert!(matches!(
            service.take_listeners(),
            Err(ServiceError::NoListeners)
        ));
    }

    #[test]
    fn credentials_round_trip_through_directory() {
        let dir = std::env::temp_dir().join(format!("wallhack-creds-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join(credentials::CREDENTIAL_NAME)).unwrap();
        file.write_all(b"cert: CERT PEM\nkey: KEY PEM\nca: CA PEM\n")
            .unwrap();

        let service = service_with_credentials_dir(Some(dir.clone()));
        let creds = service.load_credentials().unwrap();
        assert_eq!(creds.cert, "CERT PEM");
        assert_eq!(creds.key, "KEY PEM");
        assert_eq!(creds.ca.as_deref(), Some("CA PEM"));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
