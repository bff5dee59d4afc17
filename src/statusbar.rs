// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Poll status bar plugins on their own threads and publish them under /rbar.
// Author: Lukas Bower

//! Status bar scheduler.
//!
//! Every plugin owns an entry `/rbar/<name>` and a thread that refreshes it
//! at the plugin's interval. A watcher thread replaces plugin threads that
//! died. [`Statusbar::stop`] wakes every thread and joins them.

use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::{Colors, Settings};
use crate::p9::Client;
use crate::wm::RBAR;

/// Text shown in a bar entry, with its colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Entry colors.
    pub colors: Colors,
    /// Entry label.
    pub text: String,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.colors, self.text)
    }
}

/// Source of one status bar entry.
pub trait StatusPlugin: Send + Sync {
    /// Entry name under `/rbar`; entries sort by name.
    fn name(&self) -> &str;

    /// Refresh period; `None` uses the configured default.
    fn interval(&self) -> Option<Duration> {
        None
    }

    /// Current status, or `None` to leave the entry unchanged.
    fn update(&self) -> anyhow::Result<Option<Status>>;
}

/// Local date and time.
pub struct Clock {
    colors: Colors,
    format: String,
}

impl Clock {
    /// Clock formatted as `2025-01-31 - 18:05`.
    #[must_use]
    pub fn new(colors: Colors) -> Self {
        Self::with_format(colors, "%Y-%m-%d - %H:%M")
    }

    /// Clock with a custom `strftime` format.
    #[must_use]
    pub fn with_format(colors: Colors, format: &str) -> Self {
        Self {
            colors,
            format: format.to_owned(),
        }
    }
}

impl StatusPlugin for Clock {
    fn name(&self) -> &str {
        "99_datetime"
    }

    fn update(&self) -> anyhow::Result<Option<Status>> {
        Ok(Some(Status {
            colors: self.colors,
            text: chrono::Local::now().format(&self.format).to_string(),
        }))
    }
}

/// One, five and fifteen minute load averages.
pub struct LoadAverage {
    colors: Colors,
    source: PathBuf,
}

impl LoadAverage {
    /// Load average read from `/proc/loadavg`.
    #[must_use]
    pub fn new(colors: Colors) -> Self {
        Self::from_path(colors, "/proc/loadavg")
    }

    /// Load average read from `source`.
    #[must_use]
    pub fn from_path(colors: Colors, source: impl Into<PathBuf>) -> Self {
        Self {
            colors,
            source: source.into(),
        }
    }
}

impl StatusPlugin for LoadAverage {
    fn name(&self) -> &str {
        "50_load"
    }

    fn update(&self) -> anyhow::Result<Option<Status>> {
        let text = fs::read_to_string(&self.source)?;
        let fields: Vec<&str> = text.split_whitespace().take(3).collect();
        if fields.len() < 3 {
            anyhow::bail!("malformed load average {text:?}");
        }
        Ok(Some(Status {
            colors: self.colors,
            text: fields.join(" "),
        }))
    }
}

/// Built-in plugins for `settings`.
#[must_use]
pub fn default_plugins(settings: &Settings) -> Vec<Arc<dyn StatusPlugin>> {
    vec![
        Arc::new(LoadAverage::new(settings.bar_normal_colors)),
        Arc::new(Clock::new(settings.bar_normal_colors)),
    ]
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn raise(&self) {
        *self.lock() = true;
        self.wake.notify_all();
    }

    fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `timeout`; true when stopped meanwhile.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

struct Runner {
    plugin: Arc<dyn StatusPlugin>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    client: Arc<Client>,
    default_interval: Duration,
    stop: StopSignal,
    runners: Mutex<Vec<Runner>>,
}

impl Shared {
    fn runners(&self) -> MutexGuard<'_, Vec<Runner>> {
        self.runners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(self: &Arc<Self>, plugin: &Arc<dyn StatusPlugin>) -> Option<JoinHandle<()>> {
        let shared = Arc::clone(self);
        let runner_plugin = Arc::clone(plugin);
        thread::Builder::new()
            .name(format!("rbar-{}", plugin.name()))
            .spawn(move || shared.run(&*runner_plugin))
            .map_err(|err| error!("failed to start status plugin {}: {err}", plugin.name()))
            .ok()
    }

    fn run(&self, plugin: &dyn StatusPlugin) {
        let interval = plugin.interval().unwrap_or(self.default_interval);
        while !self.stop.wait(interval) {
            self.refresh(plugin);
        }
        debug!("status plugin {} stopped", plugin.name());
    }

    fn refresh(&self, plugin: &dyn StatusPlugin) {
        match plugin.update() {
            Ok(Some(status)) => {
                let path = format!("{RBAR}/{}", plugin.name());
                debug!("update {path}: {status}");
                if let Err(err) = self.client.write(&path, &status.to_string()) {
                    warn!("status plugin {}: {err}", plugin.name());
                }
            }
            Ok(None) => {}
            Err(err) => warn!("status plugin {} failed: {err:#}", plugin.name()),
        }
    }

    fn watch(self: &Arc<Self>, period: Duration) {
        while !self.stop.wait(period) {
            let mut runners = self.runners();
            for runner in runners.iter_mut() {
                if runner.handle.as_ref().is_some_and(|handle| !handle.is_finished()) {
                    continue;
                }
                if let Some(handle) = runner.handle.take() {
                    if handle.join().is_err() {
                        warn!("status plugin {} died", runner.plugin.name());
                    }
                }
                info!("restarting status plugin {}", runner.plugin.name());
                runner.handle = self.spawn(&runner.plugin);
            }
        }
    }
}

/// Running status bar.
pub struct Statusbar {
    shared: Arc<Shared>,
    watcher: Option<JoinHandle<()>>,
}

impl Statusbar {
    /// Create an entry for every plugin and start polling.
    ///
    /// Each plugin is updated once up front; its `/rbar` entry is created with
    /// that status, or overwritten when it already exists.
    pub fn start(
        client: Arc<Client>,
        plugins: Vec<Arc<dyn StatusPlugin>>,
        default_interval: Duration,
        watcher_interval: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            client,
            default_interval,
            stop: StopSignal::default(),
            runners: Mutex::new(Vec::new()),
        });
        for plugin in plugins {
            let initial = panic::catch_unwind(AssertUnwindSafe(|| plugin.update()));
            match initial {
                Ok(Ok(Some(status))) => publish(&shared.client, plugin.name(), &status),
                Ok(Ok(None)) => {}
                Ok(Err(err)) => warn!("status plugin {} failed: {err:#}", plugin.name()),
                Err(_) => warn!("status plugin {} panicked", plugin.name()),
            }
            info!("starting status plugin {}", plugin.name());
            let handle = shared.spawn(&plugin);
            shared.runners().push(Runner { plugin, handle });
        }
        let watcher_shared = Arc::clone(&shared);
        let watcher = thread::Builder::new()
            .name("rbar-watcher".into())
            .spawn(move || watcher_shared.watch(watcher_interval))
            .map_err(|err| error!("failed to start status watcher: {err}"))
            .ok();
        Self { shared, watcher }
    }

    /// Start the built-in plugins with the intervals from `settings`.
    #[must_use]
    pub fn from_settings(client: Arc<Client>, settings: &Settings) -> Self {
        Self::start(
            client,
            default_plugins(settings),
            settings.statusbar.interval(),
            settings.statusbar.watcher_interval(),
        )
    }

    /// Names of the plugins whose threads are currently alive.
    #[must_use]
    pub fn alive(&self) -> Vec<String> {
        self.shared
            .runners()
            .iter()
            .filter(|runner| runner.handle.as_ref().is_some_and(|handle| !handle.is_finished()))
            .map(|runner| runner.plugin.name().to_owned())
            .collect()
    }

    /// Stop the watcher and every plugin thread and wait for them.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if self.shared.stop.is_raised() {
            return;
        }
        info!("stopping status bar");
        self.shared.stop.raise();
        if let Some(watcher) = self.watcher.take() {
            if watcher.join().is_err() {
                warn!("status bar watcher exited by panic");
            }
        }
        for runner in self.shared.runners().iter_mut() {
            if let Some(handle) = runner.handle.take() {
                if handle.join().is_err() {
                    warn!("status plugin {} exited by panic", runner.plugin.name());
                }
            }
        }
    }
}

impl Drop for Statusbar {
    fn drop(&mut self) {
        self.halt();
    }
}

fn publish(client: &Client, name: &str, status: &Status) {
    let path = format!("{RBAR}/{name}");
    let text = status.to_string();
    if let Err(err) = client.create(&path, Some(&text)) {
        debug!("create {path} failed ({err}), overwriting");
        if let Err(err) = client.write(&path, &text) {
            warn!("status plugin {name}: {err}");
        }
    }
}
