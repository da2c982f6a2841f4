//! Alert side effects for newly arrived unread notifications.
//!
//! The synchronization logic only knows the [`Alerter`] capability; what
//! "play a sound" or "show a native notification" means is up to the
//! platform implementation.

use std::io::Write;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use steward_shared::NotificationRecord;

/// Platform notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Sound playback failed: {0}")]
    Sound(String),

    #[error("Native notification failed: {0}")]
    Native(String),
}

pub trait Alerter: Send + Sync {
    /// Current permission to raise native notifications.
    fn permission(&self) -> Permission;

    /// Ask the platform for permission. Called once per context.
    fn request_permission(&self) -> Permission;

    fn play_sound(&self) -> Result<(), AlertError>;

    fn show_native(&self, title: &str, body: &str) -> Result<(), AlertError>;
}

/// Fire the alert for `record`: sound first, then a native notification when
/// permitted. Failures are logged and swallowed.
pub fn raise_alert(alerter: &dyn Alerter, record: &NotificationRecord) {
    if let Err(e) = alerter.play_sound() {
        debug!(id = %record.id, error = %e, "Notification sound failed");
    }

    if alerter.permission() == Permission::Granted {
        if let Err(e) = alerter.show_native(&record.title, &record.message) {
            debug!(id = %record.id, error = %e, "Native notification failed");
        }
    }
}

/// Terminal alerter: rings the bell on stderr and prints a banner line.
#[derive(Debug)]
pub struct TerminalAlerter {
    sound: bool,
    permission: Mutex<Permission>,
}

impl TerminalAlerter {
    pub fn new(sound: bool) -> Self {
        Self {
            sound,
            permission: Mutex::new(Permission::Default),
        }
    }
}

impl Alerter for TerminalAlerter {
    fn permission(&self) -> Permission {
        self.permission.lock().map(|p| *p).unwrap_or(Permission::Denied)
    }

    fn request_permission(&self) -> Permission {
        match self.permission.lock() {
            Ok(mut guard) => {
                if *guard == Permission::Default {
                    *guard = Permission::Granted;
                }
                *guard
            }
            Err(_) => Permission::Denied,
        }
    }

    fn play_sound(&self) -> Result<(), AlertError> {
        if !self.sound {
            return Ok(());
        }
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| AlertError::Sound(e.to_string()))
    }

    fn show_native(&self, title: &str, body: &str) -> Result<(), AlertError> {
        let mut stderr = std::io::stderr();
        writeln!(stderr, "[notification] {title}: {body}").map_err(|e| AlertError::Native(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        granted: bool,
        fail_sound: bool,
        calls: Mutex<Vec<String>>,
    }

    impl Alerter for Recorder {
        fn permission(&self) -> Permission {
            if self.granted {
                Permission::Granted
            } else {
                Permission::Denied
            }
        }

        fn request_permission(&self) -> Permission {
            self.permission()
        }

        fn play_sound(&self) -> Result<(), AlertError> {
            self.calls.lock().unwrap().push("sound".into());
            if self.fail_sound {
                Err(AlertError::Sound("autoplay blocked".into()))
            } else {
                Ok(())
            }
        }

        fn show_native(&self, title: &str, _body: &str) -> Result<(), AlertError> {
            self.calls.lock().unwrap().push(format!("native:{title}"));
            Ok(())
        }
    }

    #[test]
    fn test_raise_alert_with_permission() {
        let recorder = Recorder {
            granted: true,
            ..Default::default()
        };
        raise_alert(&recorder, &NotificationRecord::new(1u64, "Pledge due", "Reminder"));
        assert_eq!(*recorder.calls.lock().unwrap(), ["sound", "native:Pledge due"]);
    }

    #[test]
    fn test_raise_alert_without_permission_only_sounds() {
        let recorder = Recorder::default();
        raise_alert(&recorder, &NotificationRecord::new(1u64, "t", "m"));
        assert_eq!(*recorder.calls.lock().unwrap(), ["sound"]);
    }

    #[test]
    fn test_sound_failure_is_swallowed() {
        let recorder = Recorder {
            granted: true,
            fail_sound: true,
            ..Default::default()
        };
        raise_alert(&recorder, &NotificationRecord::new(1u64, "t", "m"));
        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_terminal_permission_flow() {
        let alerter = TerminalAlerter::new(false);
        assert_eq!(alerter.permission(), Permission::Default);
        assert_eq!(alerter.request_permission(), Permission::Granted);
        assert_eq!(alerter.permission(), Permission::Granted);
        assert!(alerter.play_sound().is_ok());
    }
}
