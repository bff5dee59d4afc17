// Author: Lukas Bower
// Purpose: Push settings, rules and key grabs into the manager at startup.

//! Startup configuration of a running wmii.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::bindings::START_EVENT;
use crate::events::{Dispatcher, PatternTable};
use crate::p9::{Client, ProtocolError};
use crate::wm::{Wm, CTL, LBAR};

/// Event file shared by every client of the manager.
pub const EVENT: &str = "/event";
/// Environment variable listing configuration directories.
pub const CONFPATH_ENV: &str = "WMII_CONFPATH";

/// Lines written to `/ctl`.
#[must_use]
pub fn ctl_lines(wm: &Wm) -> Vec<String> {
    let settings = wm.settings();
    vec![
        format!("font {}", settings.font),
        format!("focuscolors {}", settings.focus_colors),
        format!("normcolors {}", settings.normal_colors),
        format!("grabmod {}", settings.modkey),
        format!("border {}", settings.border),
    ]
}

/// Write the manager settings, rules and grabbed keys.
pub fn configure(wm: &Wm, table: &PatternTable) -> Result<(), ProtocolError> {
    let client = wm.client();
    let settings = wm.settings();
    client.write_lines(CTL, &ctl_lines(wm))?;
    client.write_lines("/tagrules", &settings.tag_rules)?;
    client.write_lines("/colrules", &settings.col_rules)?;
    client.write_lines("/keys", table.keys())?;
    info!("configured manager ({} keys)", table.keys().len());
    Ok(())
}

/// Rebuild the left bar: drop stale entries, add one per view, focus the active one.
pub fn init_lbar(wm: &Wm) -> Result<(), ProtocolError> {
    let client = wm.client();
    for entry in client.list(LBAR)? {
        client.remove(&format!("{LBAR}/{entry}"))?;
    }
    let active = wm.active_view()?;
    let settings = wm.settings();
    for tag in wm.views(false)? {
        let colors = if active.as_deref() == Some(tag.as_str()) {
            settings.bar_focus_colors
        } else {
            settings.bar_normal_colors
        };
        let label = format!("{colors} {}", wm.tags().t2d(&tag));
        debug!("lbar entry {tag}");
        client.create(&wm.lbar_path(&tag), Some(&label))?;
    }
    Ok(())
}

/// Tell older instances listening on `/event` to exit.
pub fn announce(client: &Client) -> Result<(), ProtocolError> {
    client.write(EVENT, START_EVENT)
}

/// Feed every line of `/event` to `dispatcher` until the stream ends or the
/// dispatcher is stopped.
pub fn forward_events(client: &Client, dispatcher: &Dispatcher) -> Result<(), ProtocolError> {
    client.process(EVENT, |line| {
        if !line.is_empty() {
            dispatcher.push(line);
        }
        dispatcher.is_running()
    })
}

/// `autostart.sh` candidates from a `WMII_CONFPATH`-style list.
#[must_use]
pub fn autostart_scripts(confpath: &str) -> Vec<PathBuf> {
    confpath
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join("autostart.sh"))
        .filter(|script| script.is_file())
        .collect()
}

/// Run every `autostart.sh` found in `WMII_CONFPATH`, one after another.
pub fn autostart() {
    let Ok(confpath) = env::var(CONFPATH_ENV) else {
        return;
    };
    for script in autostart_scripts(&confpath) {
        info!("autostart {}", script.display());
        match Command::new("sh").arg(&script).status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("{} exited with {status}", script.display()),
            Err(err) => warn!("failed to run {}: {err}", script.display()),
        }
    }
}
