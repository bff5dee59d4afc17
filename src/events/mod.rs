// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Event queue, binding table and dispatcher for manager events.
// Author: Lukas Bower

//! Event handling: rules are compiled into a [`PatternTable`], event lines
//! flow through an [`EventQueue`], and a [`Dispatcher`] runs the matching
//! handlers on its own thread.

mod dispatcher;
mod lazy;
mod pattern;
mod queue;

pub use dispatcher::{dispatch_line, Dispatcher};
pub use lazy::Lazy;
pub use pattern::{
    direction_set, key, Binding, BindingError, DirectionStyle, Entry, Handler, PatternTable,
    Trigger,
};
pub use queue::{Event, EventQueue};
