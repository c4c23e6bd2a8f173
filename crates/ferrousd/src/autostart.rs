//! Launch-at-login registration
//!
//! Only the local panel toggles this. The default registrar manages an XDG
//! autostart entry, which GNOME, KDE, XFCE and most other Linux desktops read.

use ferrous_shared::ControlError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

const DESKTOP_FILE_NAME: &str = "ferrous-control.desktop";

pub trait AutostartRegistrar: Send + Sync {
    fn is_enabled(&self) -> Result<bool, ControlError>;
    fn enable(&self) -> Result<(), ControlError>;
    fn disable(&self) -> Result<(), ControlError>;
}

/// XDG `.desktop` entry under `~/.config/autostart`
#[derive(Debug, Clone)]
pub struct DesktopEntryRegistrar {
    entry_path: PathBuf,
    exec: PathBuf,
}

impl DesktopEntryRegistrar {
    /// Registrar for the running executable in the user's autostart dir.
    pub fn for_current_user() -> Result<Self, ControlError> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ControlError::Autostart("no user config directory".to_string()))?
            .join("autostart");
        let exec = std::env::current_exe()?;
        Ok(Self::new(dir, exec))
    }

    pub fn new(autostart_dir: impl Into<PathBuf>, exec: impl Into<PathBuf>) -> Self {
        Self {
            entry_path: autostart_dir.into().join(DESKTOP_FILE_NAME),
            exec: exec.into(),
        }
    }

    pub fn entry_path(&self) -> &Path {
        &self.entry_path
    }

    fn render(&self) -> String {
        format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name=Ferrous Control\n\
             Comment=Remote shutdown and volume control\n\
             Exec=\"{}\" --no-panel\n\
             Terminal=false\n\
             X-GNOME-Autostart-enabled=true\n",
            self.exec.display()
        )
    }
}

impl AutostartRegistrar for DesktopEntryRegistrar {
    fn is_enabled(&self) -> Result<bool, ControlError> {
        match fs::read_to_string(&self.entry_path) {
            Ok(contents) => Ok(!contents
                .lines()
                .any(|l| l.trim() == "Hidden=true" || l.trim() == "X-GNOME-Autostart-enabled=false")),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn enable(&self) -> Result<(), ControlError> {
        if let Some(parent) = self.entry_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.entry_path, self.render())?;
        info!("Autostart enabled: {}", self.entry_path.display());
        Ok(())
    }

    fn disable(&self) -> Result<(), ControlError> {
        match fs::remove_file(&self.entry_path) {
            Ok(()) => {
                info!("Autostart disabled: {}", self.entry_path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registrar(dir: &TempDir) -> DesktopEntryRegistrar {
        DesktopEntryRegistrar::new(dir.path().join("autostart"), "/usr/bin/ferrousd")
    }

    #[test]
    fn test_enable_disable_cycle() {
        let dir = TempDir::new().unwrap();
        let reg = registrar(&dir);
        assert!(!reg.is_enabled().unwrap());

        reg.enable().unwrap();
        assert!(reg.is_enabled().unwrap());
        let contents = fs::read_to_string(reg.entry_path()).unwrap();
        assert!(contents.contains("Exec=\"/usr/bin/ferrousd\" --no-panel"));

        reg.disable().unwrap();
        assert!(!reg.is_enabled().unwrap());
        // Disabling twice is fine
        reg.disable().unwrap();
    }

    #[test]
    fn test_hidden_entry_counts_as_disabled() {
        let dir = TempDir::new().unwrap();
        let reg = registrar(&dir);
        fs::create_dir_all(dir.path().join("autostart")).unwrap();
        fs::write(reg.entry_path(), "[Desktop Entry]\nHidden=true\n").unwrap();
        assert!(!reg.is_enabled().unwrap());
    }
}
