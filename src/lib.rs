// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Library root for the wmii control loop.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Runtime glue between wmii's 9P control filesystem and user reaction rules.

/// Default binding table.
pub mod bindings;
/// Settings file and defaults.
pub mod config;
/// Event queue, binding table and dispatcher.
pub mod events;
/// Reaction library.
pub mod handlers;
/// View history.
pub mod history;
/// 9P client, transports and address parsing.
pub mod p9;
/// Startup configuration of the manager.
pub mod setup;
/// Status bar plugins and scheduler.
pub mod statusbar;
/// Shared manager context.
pub mod wm;

pub use config::Settings;
pub use events::{Dispatcher, PatternTable};
pub use p9::Client;
pub use wm::Wm;
