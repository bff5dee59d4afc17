// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Reaction library used by the binding table.
// Author: Lukas Bower

//! Handlers reacting to manager events.
//!
//! Each handler owns an `Arc<Wm>` and performs its protocol operations
//! through it; failures are returned to the dispatcher, which logs them.

pub mod client;
pub mod exec;
pub mod tags;

pub use client::{direction, ColMode, Command, Move, SecondColumn};
pub use exec::{applications, dmenu_choice, spawn, tag_choices, Call, Execute, Exit};
pub use tags::{Bar, BarUpdate, ClientTag, CycleView, HistoryStep, TagHistory, ToggleScratchpad, View, WheelView};
