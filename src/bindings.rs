// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Default event and key bindings for the wmii control loop.
// Author: Lukas Bower

//! Default binding table.
//!
//! Manager notifications come first, followed by the numbered views, the
//! named views from the tag mapping, navigation, layout and launchers. All key
//! chords are placed under the configured modifier.

use std::sync::Arc;

use crate::events::{
    direction_set, BindingError, DirectionStyle, Entry, Handler, Lazy, PatternTable, Trigger,
};
use crate::handlers::{
    applications, dmenu_choice, tag_choices, Bar, BarUpdate, Call, ClientTag, ColMode, Command,
    CycleView, Execute, Exit, HistoryStep, Move, SecondColumn, TagHistory, ToggleScratchpad,
    View, WheelView,
};
use crate::wm::Wm;

/// Event line announcing a newly started instance.
pub const START_EVENT: &str = "Start wmiirc";

fn shared<H: Handler + 'static>(handler: H) -> Arc<dyn Handler> {
    Arc::new(handler)
}

/// Entries of the default table, in dispatch order.
#[must_use]
pub fn default_entries(wm: &Arc<Wm>) -> Vec<Entry> {
    let settings = wm.shared_settings();
    let modkey = settings.modkey.clone();
    let key = |chord: &str| Trigger::key(&modkey, chord);
    let wm = || Arc::clone(wm);

    let mut entries = vec![
        Entry::rule(format!("^{START_EVENT}$"), Exit::new(0)),
        Entry::rule("^CreateTag", Bar::new(wm(), BarUpdate::Create)),
        Entry::rule("^DestroyTag", Bar::new(wm(), BarUpdate::Destroy)),
        Entry::rule("^FocusTag", Bar::new(wm(), BarUpdate::Focus)),
        Entry::rule("^FocusTag", TagHistory::new(wm())),
        Entry::rule("^UnfocusTag", Bar::new(wm(), BarUpdate::Unfocus)),
        Entry::rule("^CreateClient", SecondColumn::new(wm())),
        Entry::rule("^LeftBarClick", View::from_event(wm())),
        Entry::rule("^LeftBarClick", WheelView::new(wm())),
        Entry::rule(
            "^ClientMouseDown",
            Call::wmii9menu(
                Arc::clone(&settings),
                vec![
                    ("nop".to_owned(), shared(|_: &str, _: &[String]| -> anyhow::Result<()> { Ok(()) })),
                    ("close".to_owned(), shared(Command::kill(wm()))),
                ],
            ),
        ),
        Entry::rule("^UrgentTag", Bar::new(wm(), BarUpdate::Urgent)),
        Entry::rule("^NotUrgentTag", Bar::new(wm(), BarUpdate::NotUrgent)),
    ];

    for n in 1..=9 {
        let tag = n.to_string();
        entries.push(Entry::rule(key(&tag), View::to(wm(), tag.as_str())));
        entries.push(Entry::rule(key(&format!("Shift-{n}")), ClientTag::add(wm(), tag.as_str())));
        entries.push(Entry::rule(key(&format!("Control-{n}")), ClientTag::set(wm(), tag.as_str())));
    }

    for (index, name) in settings.named_views().into_iter().enumerate() {
        let f = index + 1;
        entries.push(Entry::rule(key(&format!("F{f}")), View::to(wm(), name.as_str())));
        entries.push(Entry::rule(key(&format!("Shift-F{f}")), ClientTag::add(wm(), name.as_str())));
        entries.push(Entry::rule(key(&format!("Control-F{f}")), ClientTag::set(wm(), name.as_str())));
    }

    let select = shared(Move::select(wm()));
    let send = shared(Move::send(wm()));
    let shift = format!("{modkey}-Shift");
    let control = format!("{modkey}-Control");
    entries.extend([
        direction_set(&shift, DirectionStyle::Vim, Arc::clone(&select)),
        direction_set(&shift, DirectionStyle::Cursor, select),
        Entry::rule(key("Tab"), Move::select(wm()).toward("down")),
        direction_set(&control, DirectionStyle::Vim, Arc::clone(&send)),
        direction_set(&control, DirectionStyle::Cursor, send),
        Entry::rule(key("Right"), CycleView::next(wm())),
        Entry::rule(key("l"), CycleView::next(wm())),
        Entry::rule(key("Left"), CycleView::prev(wm())),
        Entry::rule(key("h"), CycleView::prev(wm())),
        Entry::rule(key("plus"), HistoryStep::forward(wm())),
        Entry::rule(key("minus"), HistoryStep::back(wm())),
        Entry::rule(key("space"), ToggleScratchpad::new(wm())),
        Entry::rule(key("f"), Command::toggle(wm())),
        Entry::rule(key("Control-f"), Command::send_toggle(wm())),
        Entry::rule(
            key("Shift-t"),
            ClientTag::add(wm(), dmenu_choice(Arc::clone(&settings), Some("tag:"), tag_choices(wm()))),
        ),
        Entry::rule(
            key("Control-t"),
            ClientTag::set(wm(), dmenu_choice(Arc::clone(&settings), Some("tag:"), tag_choices(wm()))),
        ),
        Entry::rule(key("Shift-u"), ClientTag::remove(wm(), wm().active_view_lazy())),
        Entry::rule(key("Control-u"), ClientTag::set(wm(), wm().active_view_lazy())),
        Entry::rule(key("s"), ColMode::new(wm())).with_defaults(["stack"]),
        Entry::rule(key("d"), ColMode::new(wm())),
        Entry::rule(key("m"), ColMode::new(wm())).with_defaults(["max"]),
        Entry::rule(key("Control-c"), Command::kill(wm())),
        Entry::rule(key("Return"), Execute::new(settings.terminal.as_str())),
        Entry::rule(
            key("p"),
            Execute::new(dmenu_choice(
                Arc::clone(&settings),
                None,
                Lazy::deferred(|| Ok(applications())),
            )),
        ),
        Entry::rule(
            key("a"),
            Call::dmenu(
                Arc::clone(&settings),
                vec![
                    ("quit".to_owned(), shared(Command::quit(wm()))),
                    ("terminal".to_owned(), shared(Execute::new(settings.terminal.as_str()))),
                ],
            ),
        ),
    ]);
    entries
}

/// Compile the default table for `wm`.
pub fn default_table(wm: &Arc<Wm>) -> Result<PatternTable, BindingError> {
    PatternTable::build(default_entries(wm))
}
