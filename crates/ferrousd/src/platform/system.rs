//! Platform backend that shells out to the host's power and mixer tools.

use super::{PowerPlatform, ShutdownReceipt};
use async_trait::async_trait;
use ferrous_shared::{ControlError, VolumeLevel};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl HostOs {
    fn detect() -> Self {
        if cfg!(target_os = "linux") {
            HostOs::Linux
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else if cfg!(target_os = "windows") {
            HostOs::Windows
        } else {
            HostOs::Other
        }
    }
}

/// Runs the real shutdown/sleep/volume commands.
#[derive(Debug, Clone)]
pub struct SystemPlatform {
    os: HostOs,
}

impl SystemPlatform {
    pub fn new() -> Self {
        Self {
            os: HostOs::detect(),
        }
    }

    fn unsupported() -> ControlError {
        ControlError::PlatformFailure("Unsupported operating system".to_string())
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a program and capture its output
async fn run(program: &str, args: &[String]) -> std::io::Result<Output> {
    debug!("Executing: {} {:?}", program, args);
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
}

/// Run a program that must exit successfully; `what` names the operation in
/// the failure message.
async fn run_checked(program: &str, args: &[String], what: &str) -> Result<String, ControlError> {
    let output = run(program, args)
        .await
        .map_err(|e| ControlError::PlatformFailure(format!("Failed to execute {}: {}", what, e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ControlError::PlatformFailure(format!(
            "Failed to execute {}: {}",
            what,
            stderr.trim()
        )))
    }
}

/// Start a script that backgrounds its own work and returns at once.
///
/// No pipes are attached: a backgrounded child would hold them open and
/// make the caller wait for the whole delay.
async fn spawn_detached(program: &str, args: &[String], what: &str) -> Result<(), ControlError> {
    debug!("Spawning detached: {} {:?}", program, args);
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ControlError::PlatformFailure(format!("Failed to execute {}: {}", what, e)))?
        .wait()
        .await
        .map_err(|e| ControlError::PlatformFailure(format!("Failed to execute {}: {}", what, e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(ControlError::PlatformFailure(format!(
            "Failed to execute {}: exited with {}",
            what, status
        )))
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// `shutdown -h +N` takes whole minutes; never round a delay down to "now".
fn delay_minutes(delay: Duration) -> u64 {
    delay.as_secs().div_ceil(60).max(1)
}

fn macos_delayed_shutdown_script(delay: Duration) -> String {
    format!(
        "sleep {} && osascript -e 'tell app \"System Events\" to shut down'",
        delay.as_secs()
    )
}

/// Parse `pactl get-sink-volume` output:
/// "Volume: front-left: 65536 / 100% / 0.00 dB, ..."
pub(crate) fn parse_pactl_volume(stdout: &str) -> Option<VolumeLevel> {
    let percent_pos = stdout.find('%')?;
    let before = &stdout[..percent_pos];
    let start = before.rfind(char::is_whitespace).map(|i| i + 1).unwrap_or(0);
    before[start..].parse::<i32>().ok().map(VolumeLevel::new)
}

/// Parse `amixer get Master` output: "... [65%] [on]"
pub(crate) fn parse_amixer_volume(stdout: &str) -> Option<VolumeLevel> {
    let start = stdout.find('[')?;
    let end = stdout[start..].find('%')?;
    stdout[start + 1..start + end]
        .parse::<i32>()
        .ok()
        .map(VolumeLevel::new)
}

/// Parse `osascript -e "output volume of (get volume settings)"` output
pub(crate) fn parse_osascript_volume(stdout: &str) -> Option<VolumeLevel> {
    stdout.trim().parse::<i32>().ok().map(VolumeLevel::new)
}

#[async_trait]
impl PowerPlatform for SystemPlatform {
    async fn shutdown(&self, delay: Duration) -> Result<ShutdownReceipt, ControlError> {
        info!("Scheduling OS shutdown in {}s", delay.as_secs());
        let fires_in = match self.os {
            HostOs::Linux => {
                let minutes = delay_minutes(delay);
                let when = format!("+{}", minutes);
                run_checked("shutdown", &args(&["-h", &when]), "shutdown").await?;
                Duration::from_secs(minutes * 60)
            }
            HostOs::MacOs => {
                // Detached so the cancel path can find and kill it.
                let script = format!("{} &", macos_delayed_shutdown_script(delay));
                spawn_detached("sh", &args(&["-c", &script]), "shutdown").await?;
                delay
            }
            HostOs::Windows => {
                let secs = delay.as_secs().to_string();
                run_checked("shutdown", &args(&["/s", "/t", &secs]), "shutdown").await?;
                delay
            }
            HostOs::Other => return Err(Self::unsupported()),
        };
        Ok(ShutdownReceipt {
            message: format!("Shutdown scheduled in {} seconds", fires_in.as_secs()),
            fires_in,
        })
    }

    async fn sleep(&self) -> Result<String, ControlError> {
        match self.os {
            HostOs::Linux => run_checked("systemctl", &args(&["suspend"]), "sleep").await?,
            HostOs::MacOs => run_checked("pmset", &args(&["sleepnow"]), "sleep").await?,
            HostOs::Windows => {
                run_checked(
                    "rundll32.exe",
                    &args(&["powrprof.dll,SetSuspendState", "0,1,0"]),
                    "sleep",
                )
                .await?
            }
            HostOs::Other => return Err(Self::unsupported()),
        };
        Ok("Sleep command executed".to_string())
    }

    async fn restart(&self) -> Result<String, ControlError> {
        match self.os {
            HostOs::Linux | HostOs::MacOs => {
                run_checked("shutdown", &args(&["-r", "now"]), "restart").await?
            }
            HostOs::Windows => {
                run_checked("shutdown", &args(&["/r", "/t", "0"]), "restart").await?
            }
            HostOs::Other => return Err(Self::unsupported()),
        };
        Ok("Restart command executed".to_string())
    }

    async fn cancel_shutdown(&self) -> Result<String, ControlError> {
        match self.os {
            HostOs::Linux => run_checked("shutdown", &args(&["-c"]), "cancel").await?,
            HostOs::MacOs => {
                run_checked("pkill", &args(&["-f", "sleep [0-9]+ && osascript"]), "cancel").await?
            }
            HostOs::Windows => run_checked("shutdown", &args(&["/a"]), "cancel").await?,
            HostOs::Other => return Err(Self::unsupported()),
        };
        Ok("Shutdown cancelled".to_string())
    }

    async fn get_volume(&self) -> Result<VolumeLevel, ControlError> {
        let parse_error = || ControlError::PlatformFailure("Failed to parse volume".to_string());
        match self.os {
            HostOs::Linux => {
                // PulseAudio first, ALSA as fallback
                match run_checked("pactl", &args(&["get-sink-volume", "@DEFAULT_SINK@"]), "volume read").await {
                    Ok(stdout) => parse_pactl_volume(&stdout).ok_or_else(parse_error),
                    Err(e) => {
                        warn!("pactl unavailable ({}), falling back to amixer", e);
                        let stdout =
                            run_checked("amixer", &args(&["get", "Master"]), "volume read").await?;
                        parse_amixer_volume(&stdout).ok_or_else(parse_error)
                    }
                }
            }
            HostOs::MacOs => {
                let stdout = run_checked(
                    "osascript",
                    &args(&["-e", "output volume of (get volume settings)"]),
                    "volume read",
                )
                .await?;
                parse_osascript_volume(&stdout).ok_or_else(parse_error)
            }
            HostOs::Windows | HostOs::Other => Err(ControlError::PlatformFailure(
                "Volume control is not supported on this platform".to_string(),
            )),
        }
    }

    async fn set_volume(&self, level: VolumeLevel) -> Result<VolumeLevel, ControlError> {
        let percent = level.percent();
        match self.os {
            HostOs::Linux => {
                let pactl_level = format!("{}%", percent);
                let pactl = run_checked(
                    "pactl",
                    &args(&["set-sink-volume", "@DEFAULT_SINK@", &pactl_level]),
                    "volume change",
                )
                .await;
                if let Err(e) = pactl {
                    warn!("pactl unavailable ({}), falling back to amixer", e);
                    run_checked("amixer", &args(&["set", "Master", &pactl_level]), "volume change")
                        .await?;
                }
            }
            HostOs::MacOs => {
                let script = format!("set volume output volume {}", percent);
                run_checked("osascript", &args(&["-e", &script]), "volume change").await?;
            }
            HostOs::Windows | HostOs::Other => {
                return Err(ControlError::PlatformFailure(
                    "Volume control is not supported on this platform".to_string(),
                ))
            }
        }
        Ok(level)
    }

    fn name(&self) -> &'static str {
        "system"
    }
}
