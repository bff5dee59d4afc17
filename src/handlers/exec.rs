// Author: Lukas Bower
// Purpose: Launch programs, run menu pickers and route menu choices to handlers.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{self, Command, Stdio};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use log::{debug, info, warn};

use crate::config::{hex, Settings};
use crate::events::{Handler, Lazy};
use crate::wm::Wm;

const REAPER_NAME: &str = "wmiirc-reap";

/// Split `command` on whitespace and start it without waiting.
///
/// A detached thread waits for the child so it never lingers as a zombie.
pub fn spawn(command: &str) -> anyhow::Result<()> {
    let mut words = command.split_whitespace();
    let Some(program) = words.next() else {
        return Ok(());
    };
    debug!("execute {command:?}");
    let mut child = Command::new(program)
        .args(words)
        .stdin(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let program = program.to_owned();
    thread::Builder::new()
        .name(REAPER_NAME.into())
        .spawn(move || match child.wait() {
            Ok(status) if status.success() => debug!("{program} exited"),
            Ok(status) => warn!("{program} exited with {status}"),
            Err(err) => warn!("failed to reap {program}: {err}"),
        })
        .context("failed to start reaper thread")?;
    Ok(())
}

/// Start a command, possibly produced when the event fires.
pub struct Execute {
    command: Lazy<String>,
}

impl Execute {
    /// Handler starting `command`.
    pub fn new(command: impl Into<Lazy<String>>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Handler for Execute {
    fn handle(&self, _: &str, _: &[String]) -> anyhow::Result<()> {
        spawn(&self.command.resolve()?)
    }
}

/// Exit the process with a fixed status.
pub struct Exit {
    code: i32,
}

impl Exit {
    /// Handler exiting with `code`.
    #[must_use]
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

impl Handler for Exit {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        info!("exiting with {} on {event:?}", self.code);
        process::exit(self.code)
    }
}

/// Ask dmenu to pick one of `items`.
///
/// The selection is the first line dmenu prints, trimmed; cancelling yields
/// an empty string.
pub fn dmenu(settings: &Settings, prompt: Option<&str>, items: &[String]) -> anyhow::Result<String> {
    let args = dmenu_args(settings, prompt);
    let mut child = Command::new(&settings.menu.dmenu)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {}", settings.menu.dmenu))?;
    if let Some(mut stdin) = child.stdin.take() {
        for item in items {
            writeln!(stdin, "{item}").context("failed to feed dmenu")?;
        }
    }
    let output = child.wait_with_output().context("dmenu did not finish")?;
    Ok(first_line(&output.stdout))
}

/// Arguments passed to dmenu.
#[must_use]
pub fn dmenu_args(settings: &Settings, prompt: Option<&str>) -> Vec<String> {
    let menu = &settings.menu;
    let mut args = Vec::new();
    if menu.bottom {
        args.push("-b".to_owned());
    }
    if let Some(prompt) = prompt {
        args.extend(["-p".to_owned(), prompt.to_owned()]);
    }
    args.extend([
        "-fn".to_owned(),
        settings.menu_font().to_owned(),
        "-nf".to_owned(),
        hex(menu.normal_colors.foreground),
        "-nb".to_owned(),
        hex(menu.normal_colors.background),
        "-sf".to_owned(),
        hex(menu.selection_colors.foreground),
        "-sb".to_owned(),
        hex(menu.selection_colors.background),
    ]);
    args
}

/// Ask wmii9menu to pick one of `items`.
pub fn wmii9menu(settings: &Settings, items: &[String]) -> anyhow::Result<String> {
    let menu = &settings.menu;
    let args = [
        "-font".to_owned(),
        settings.menu_font().to_owned(),
        "-nf".to_owned(),
        hex(menu.normal_colors.foreground),
        "-nb".to_owned(),
        hex(menu.normal_colors.background),
        "-sf".to_owned(),
        hex(menu.selection_colors.foreground),
        "-sb".to_owned(),
        hex(menu.selection_colors.background),
        "-br".to_owned(),
        hex(menu.normal_colors.border),
    ];
    let output = Command::new(&menu.wmii9menu)
        .args(&args)
        .args(items)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to start {}", menu.wmii9menu))?;
    Ok(first_line(&output.stdout))
}

fn first_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned()
}

/// A dmenu selection over `items`, made when resolved.
pub fn dmenu_choice(
    settings: Arc<Settings>,
    prompt: Option<&str>,
    items: Lazy<Vec<String>>,
) -> Lazy<String> {
    let prompt = prompt.map(str::to_owned);
    Lazy::deferred(move || dmenu(&settings, prompt.as_deref(), &items.resolve()?))
}

/// Executables found on `PATH`, sorted and deduplicated.
#[must_use]
pub fn applications() -> Vec<String> {
    let Some(path) = env::var_os("PATH") else {
        return Vec::new();
    };
    let mut found = BTreeSet::new();
    for dir in env::split_paths(&path) {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if is_executable(&entry.path()) {
                found.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    found.into_iter().collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Display names of the existing views, as a lazy item list.
#[must_use]
pub fn tag_choices(wm: Arc<Wm>) -> Lazy<Vec<String>> {
    Lazy::deferred(move || {
        Ok(wm
            .views(false)?
            .iter()
            .map(|tag| wm.tags().t2d(tag).to_owned())
            .collect())
    })
}

/// Route a selection to the handler registered under that name.
pub struct Call {
    source: Lazy<String>,
    actions: Vec<(String, Arc<dyn Handler>)>,
}

impl Call {
    /// Ask `source` for a name and run the matching entry of `actions`.
    #[must_use]
    pub fn new(source: Lazy<String>, actions: Vec<(String, Arc<dyn Handler>)>) -> Self {
        Self { source, actions }
    }

    /// Offer the action names in dmenu.
    #[must_use]
    pub fn dmenu(settings: Arc<Settings>, actions: Vec<(String, Arc<dyn Handler>)>) -> Self {
        let names: Vec<String> = actions.iter().map(|(name, _)| name.clone()).collect();
        Self::new(dmenu_choice(settings, None, Lazy::Value(names)), actions)
    }

    /// Offer the action names in wmii9menu.
    #[must_use]
    pub fn wmii9menu(settings: Arc<Settings>, actions: Vec<(String, Arc<dyn Handler>)>) -> Self {
        let names: Vec<String> = actions.iter().map(|(name, _)| name.clone()).collect();
        let source = Lazy::deferred(move || wmii9menu(&settings, &names));
        Self::new(source, actions)
    }
}

impl Handler for Call {
    fn handle(&self, event: &str, defaults: &[String]) -> anyhow::Result<()> {
        let choice = self.source.resolve()?;
        if choice.is_empty() {
            return Ok(());
        }
        match self.actions.iter().find(|(name, _)| *name == choice) {
            Some((_, handler)) => handler.handle(event, defaults),
            None => {
                warn!("no action named {choice:?}");
                Ok(())
            }
        }
    }
}
