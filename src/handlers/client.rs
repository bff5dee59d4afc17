// Author: Lukas Bower
// Purpose: Handlers steering clients and columns through the control files.

use std::sync::Arc;

use log::debug;

use crate::events::{Handler, Lazy};
use crate::wm::{last_token, Wm, CLIENT_CTL, CTL, TAG_CTL};

/// Direction named by the trailing key of a key event.
///
/// `h`, `j`, `k`, `l` map to left, down, up, right; arrow names are
/// lower-cased. Returns `None` when the event does not end in a direction.
#[must_use]
pub fn direction(event: &str) -> Option<&'static str> {
    let (_, key) = event.trim_end().rsplit_once('-')?;
    match key.to_ascii_lowercase().as_str() {
        "h" | "left" => Some("left"),
        "j" | "down" => Some("down"),
        "k" | "up" => Some("up"),
        "l" | "right" => Some("right"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Select,
    Send,
}

/// Focus (`select`) or move (`send sel`) in a direction.
pub struct Move {
    wm: Arc<Wm>,
    motion: Motion,
    direction: Option<String>,
}

impl Move {
    /// Focus the client in the event's direction.
    #[must_use]
    pub fn select(wm: Arc<Wm>) -> Self {
        Self {
            wm,
            motion: Motion::Select,
            direction: None,
        }
    }

    /// Move the selected client in the event's direction.
    #[must_use]
    pub fn send(wm: Arc<Wm>) -> Self {
        Self {
            wm,
            motion: Motion::Send,
            direction: None,
        }
    }

    /// Use `direction` instead of reading it from the event.
    #[must_use]
    pub fn toward(mut self, direction: &str) -> Self {
        self.direction = Some(direction.to_owned());
        self
    }
}

impl Handler for Move {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        let direction = match &self.direction {
            Some(direction) => direction.as_str(),
            None => direction(event)
                .ok_or_else(|| anyhow::anyhow!("no direction in event {event:?}"))?,
        };
        let command = match self.motion {
            Motion::Select => format!("select {direction}"),
            Motion::Send => format!("send sel {direction}"),
        };
        debug!("{:?}: {command}", self.motion);
        Ok(self.wm.client().write(TAG_CTL, &command)?)
    }
}

/// Write a fixed command to a control file.
pub struct Command {
    wm: Arc<Wm>,
    path: &'static str,
    command: String,
}

impl Command {
    /// Toggle focus between the managed and floating layers.
    #[must_use]
    pub fn toggle(wm: Arc<Wm>) -> Self {
        Self::new(wm, TAG_CTL, "select toggle")
    }

    /// Move the selected client between the managed and floating layers.
    #[must_use]
    pub fn send_toggle(wm: Arc<Wm>) -> Self {
        Self::new(wm, TAG_CTL, "send sel toggle")
    }

    /// Close the selected client.
    #[must_use]
    pub fn kill(wm: Arc<Wm>) -> Self {
        Self::new(wm, CLIENT_CTL, "kill")
    }

    /// Quit the window manager.
    #[must_use]
    pub fn quit(wm: Arc<Wm>) -> Self {
        Self::new(wm, CTL, "quit")
    }

    /// Write `command` to `path`.
    #[must_use]
    pub fn new(wm: Arc<Wm>, path: &'static str, command: &str) -> Self {
        Self {
            wm,
            path,
            command: command.to_owned(),
        }
    }
}

impl Handler for Command {
    fn handle(&self, _: &str, _: &[String]) -> anyhow::Result<()> {
        debug!("{} <- {}", self.path, self.command);
        Ok(self.wm.client().write(self.path, &self.command)?)
    }
}

/// Set the layout of the selected column.
///
/// The mode comes from the handler, or else from the binding's first default
/// argument, or else is `default`.
pub struct ColMode {
    wm: Arc<Wm>,
    mode: Option<Lazy<String>>,
}

impl ColMode {
    /// Column mode from the binding defaults.
    #[must_use]
    pub fn new(wm: Arc<Wm>) -> Self {
        Self { wm, mode: None }
    }

    /// Fixed column mode.
    pub fn with_mode(wm: Arc<Wm>, mode: impl Into<Lazy<String>>) -> Self {
        Self {
            wm,
            mode: Some(mode.into()),
        }
    }
}

impl Handler for ColMode {
    fn handle(&self, _: &str, defaults: &[String]) -> anyhow::Result<()> {
        let mode = match &self.mode {
            Some(mode) => mode.resolve()?,
            None => defaults
                .first()
                .cloned()
                .unwrap_or_else(|| "default".to_owned()),
        };
        if mode.is_empty() {
            return Ok(());
        }
        Ok(self.wm.client().write(TAG_CTL, &format!("colmode sel {mode}"))?)
    }
}

/// When a view holds exactly two clients stacked in column one, move the new
/// one to a second column.
pub struct SecondColumn {
    wm: Arc<Wm>,
}

impl SecondColumn {
    /// Handler over `wm`.
    #[must_use]
    pub fn new(wm: Arc<Wm>) -> Self {
        Self { wm }
    }
}

impl Handler for SecondColumn {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        let Some(client_id) = last_token(event) else {
            return Ok(());
        };
        let index = self.wm.client().read("/tag/sel/index")?;
        let columns: Vec<&str> = index
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        if columns == ["1", "1"] {
            debug!("move {client_id} to the second column");
            self.wm
                .client()
                .write(TAG_CTL, &format!("send {client_id} right"))?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "inprocess"))]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::p9::inprocess::InProcessServer;
    use crate::p9::Client;

    fn setup() -> (InProcessServer, Arc<Wm>) {
        let server = InProcessServer::new();
        for path in ["/ctl", "/tag/sel/ctl", "/client/sel/ctl"] {
            server.put(path, "").unwrap();
        }
        let client = Client::connect(server.transport()).unwrap();
        (server, Arc::new(Wm::new(Arc::new(client), Settings::default())))
    }

    #[test]
    fn directions_are_normalised() {
        assert_eq!(direction("Key Mod4-Shift-h"), Some("left"));
        assert_eq!(direction("Key Mod4-Control-j"), Some("down"));
        assert_eq!(direction("Key Mod4-Shift-Up"), Some("up"));
        assert_eq!(direction("Key Mod4-RIGHT"), Some("right"));
        assert_eq!(direction("Key Mod4-Tab"), None);
        assert_eq!(direction("FocusTag"), None);
    }

    #[test]
    fn select_and_send_write_tag_ctl() {
        let (server, wm) = setup();
        Move::select(Arc::clone(&wm)).handle("Key Mod4-Shift-k", &[]).unwrap();
        Move::send(Arc::clone(&wm)).handle("Key Mod4-Control-Left", &[]).unwrap();
        Move::select(Arc::clone(&wm)).toward("down").handle("Key Mod4-Tab", &[]).unwrap();
        assert!(Move::select(wm).handle("Key Mod4-Tab", &[]).is_err());
        assert_eq!(
            server.writes("/tag/sel/ctl"),
            vec!["select up\n", "send sel left\n", "select down\n"]
        );
    }

    #[test]
    fn fixed_commands() {
        let (server, wm) = setup();
        Command::toggle(Arc::clone(&wm)).handle("", &[]).unwrap();
        Command::send_toggle(Arc::clone(&wm)).handle("", &[]).unwrap();
        Command::kill(Arc::clone(&wm)).handle("", &[]).unwrap();
        Command::quit(wm).handle("", &[]).unwrap();
        assert_eq!(
            server.writes("/tag/sel/ctl"),
            vec!["select toggle\n", "send sel toggle\n"]
        );
        assert_eq!(server.writes("/client/sel/ctl"), vec!["kill\n"]);
        assert_eq!(server.writes("/ctl"), vec!["quit\n"]);
    }

    #[test]
    fn colmode_sources() {
        let (server, wm) = setup();
        ColMode::with_mode(Arc::clone(&wm), "max").handle("", &[]).unwrap();
        ColMode::new(Arc::clone(&wm)).handle("", &["stack".to_owned()]).unwrap();
        ColMode::new(wm).handle("", &[]).unwrap();
        assert_eq!(
            server.writes("/tag/sel/ctl"),
            vec!["colmode sel max\n", "colmode sel stack\n", "colmode sel default\n"]
        );
    }

    #[test]
    fn second_client_moves_right() {
        let (server, wm) = setup();
        server.put("/tag/sel/index", "# 1 0 800\n1 0x1 0 400 term\n1 0x2 400 400 term\n").unwrap();
        let hack = SecondColumn::new(Arc::clone(&wm));
        hack.handle("CreateClient 0x2", &[]).unwrap();
        server.put("/tag/sel/index", "# 1 0 800\n1 0x1 0 400 term\n2 0x3 0 800 term\n").unwrap();
        hack.handle("CreateClient 0x3", &[]).unwrap();
        assert_eq!(server.writes("/tag/sel/ctl"), vec!["send 0x2 right\n"]);
    }
}
