//! Local control panel - a line-oriented console front end
//!
//! Commands run on their own tasks so the panel keeps reading input while a
//! shutdown waits for approval. While the gate holds a request, the next line
//! answers it: `y`/`yes` approves, anything else rejects. Closing input
//! rejects whatever is still pending.

use crate::autostart::AutostartRegistrar;
use crate::dispatcher::{CommandDispatcher, Origin};
use crate::network::AdvertisedAddress;
use ferrous_shared::{Command, CommandKind, CommandResult, ControlError, Severity};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const HELP: &str = "\
Commands:
  shutdown          schedule a shutdown (asks for confirmation)
  sleep             put the machine to sleep (asks for confirmation)
  restart           restart now (asks for confirmation)
  cancel            cancel a pending shutdown
  up [n] / down [n] change volume by n (default step)
  set <n>           set volume to n (0-100)
  volume            show current volume
  status            show the last outcome
  address           show the remote control URL
  autostart [on|off] show or change launch at login
  help              this text
  quit              exit";

/// One parsed panel line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    Execute(Command),
    Volume,
    Status,
    Address,
    Autostart(Option<bool>),
    Help,
    Quit,
    Empty,
}

pub fn parse_line(line: &str, step: i32) -> Result<PanelCommand, ControlError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(PanelCommand::Empty);
    };
    let arg = words.next();
    let head = head.to_ascii_lowercase();

    let amount = |arg: Option<&str>| -> Result<Option<i32>, ControlError> {
        arg.map(|a| {
            a.trim_end_matches('%')
                .parse::<i32>()
                .map_err(|_| ControlError::UnsupportedCommand(format!("{} {}", head, a)))
        })
        .transpose()
    };

    let command = match head.as_str() {
        "volume" | "vol" => PanelCommand::Volume,
        "status" => PanelCommand::Status,
        "address" | "url" => PanelCommand::Address,
        "help" | "?" => PanelCommand::Help,
        "quit" | "exit" | "q" => PanelCommand::Quit,
        "autostart" => match arg.map(str::to_ascii_lowercase).as_deref() {
            None => PanelCommand::Autostart(None),
            Some("on") => PanelCommand::Autostart(Some(true)),
            Some("off") => PanelCommand::Autostart(Some(false)),
            Some(other) => {
                return Err(ControlError::UnsupportedCommand(format!("autostart {}", other)))
            }
        },
        name => {
            let kind: CommandKind = name.parse()?;
            match kind {
                CommandKind::VolumeUp | CommandKind::VolumeDown => PanelCommand::Execute(
                    Command::with_amount(kind, amount(arg)?.unwrap_or(step)),
                ),
                CommandKind::SetVolume => match amount(arg)? {
                    Some(level) => PanelCommand::Execute(Command::set_volume(level)),
                    None => {
                        return Err(ControlError::UnsupportedCommand(
                            "set needs a level".to_string(),
                        ))
                    }
                },
                _ => PanelCommand::Execute(Command::new(kind)),
            }
        }
    };
    Ok(command)
}

pub struct ControlPanel {
    dispatcher: Arc<CommandDispatcher>,
    address: AdvertisedAddress,
    autostart: Option<Arc<dyn AutostartRegistrar>>,
    volume_step: i32,
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

impl ControlPanel {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        address: AdvertisedAddress,
        autostart: Option<Arc<dyn AutostartRegistrar>>,
        volume_step: i32,
    ) -> Self {
        Self {
            dispatcher,
            address,
            autostart,
            volume_step,
        }
    }

    /// Drive the panel until `quit` or end of input.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<(), ControlError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let gate = Arc::clone(self.dispatcher.gate());
        let mut pending = gate.subscribe();
        let mut lines = input.lines();
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<String>();

        say(&mut output, &format!("Ferrous Control - {}", self.address.display())).await?;
        say(&mut output, "Type 'help' for commands.").await?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Panel input closed");
                        break;
                    };
                    if self.handle_line(&line, &mut output, &results_tx).await? == Flow::Quit {
                        break;
                    }
                }
                Ok(()) = pending.changed() => {
                    let request = pending.borrow_and_update().clone();
                    if let Some(request) = request {
                        say(&mut output, &format!("{}: {} [y/N]", request.title, request.message)).await?;
                    }
                }
                Some(message) = results_rx.recv() => {
                    say(&mut output, &message).await?;
                }
            }
        }

        // Nobody is left to answer; reject anything pending or still arriving.
        if gate.dismiss() {
            info!("Pending confirmation rejected: panel closed");
        }
        drop(results_tx);
        loop {
            tokio::select! {
                message = results_rx.recv() => match message {
                    Some(message) => say(&mut output, &message).await?,
                    None => break,
                },
                Ok(()) = pending.changed() => {
                    let request = pending.borrow_and_update().clone();
                    if let Some(request) = request {
                        gate.resolve_request(request.id, false);
                    }
                }
            }
        }
        output.flush().await?;
        Ok(())
    }

    async fn handle_line<W>(
        &self,
        line: &str,
        output: &mut W,
        results: &mpsc::UnboundedSender<String>,
    ) -> Result<Flow, ControlError>
    where
        W: AsyncWrite + Unpin,
    {
        let gate = self.dispatcher.gate();
        if let Some(request) = gate.pending() {
            let approved = matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes");
            gate.resolve_request(request.id, approved);
            if !approved {
                say(output, "Rejected.").await?;
            }
            return Ok(Flow::Continue);
        }

        let command = match parse_line(line, self.volume_step) {
            Ok(command) => command,
            Err(e) => {
                self.dispatcher
                    .publish(Origin::Local, e.to_string(), Severity::Error);
                say(output, &format!("{} (try 'help')", e)).await?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            PanelCommand::Empty => {}
            PanelCommand::Quit => return Ok(Flow::Quit),
            PanelCommand::Help => say(output, HELP).await?,
            PanelCommand::Address => say(output, self.address.display()).await?,
            PanelCommand::Status => {
                let text = match self.dispatcher.status(Origin::Local) {
                    Some(status) => status.message,
                    None => "No recent status".to_string(),
                };
                say(output, &text).await?;
            }
            PanelCommand::Volume => {
                let text = match self.dispatcher.volume().await {
                    Ok(snapshot) => format!("Volume: {}", snapshot.volume),
                    Err(e) => render(&CommandResult::from(e)),
                };
                say(output, &text).await?;
            }
            PanelCommand::Autostart(wanted) => {
                let text = self.autostart(wanted);
                say(output, &text).await?;
            }
            PanelCommand::Execute(command) => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let results = results.clone();
                tokio::spawn(async move {
                    let result = dispatcher.execute_uniform(command, Origin::Local).await;
                    let _ = results.send(render(&result));
                });
            }
        }
        Ok(Flow::Continue)
    }

    fn autostart(&self, wanted: Option<bool>) -> String {
        let Some(registrar) = &self.autostart else {
            return "Autostart is not available on this system".to_string();
        };
        let outcome = match wanted {
            None => registrar.is_enabled(),
            Some(true) => registrar.enable().map(|_| true),
            Some(false) => registrar.disable().map(|_| false),
        };
        match outcome {
            Ok(true) => "Autostart: enabled".to_string(),
            Ok(false) => "Autostart: disabled".to_string(),
            Err(e) => {
                self.dispatcher
                    .publish(Origin::Local, e.to_string(), Severity::Error);
                e.to_string()
            }
        }
    }
}

fn render(result: &CommandResult) -> String {
    if result.success {
        format!("[ok] {}", result.message)
    } else {
        format!("[failed] {}", result.message)
    }
}

async fn say<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<(), ControlError> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    Ok(())
}
