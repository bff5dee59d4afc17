// Author: Lukas Bower
// Purpose: Handlers for views, client tags, the left bar and view history.

use std::sync::Arc;

use log::debug;

use crate::events::{Handler, Lazy};
use crate::wm::{button_token, last_token, Wm};

fn resolve_tag(tag: &Lazy<String>) -> anyhow::Result<Option<String>> {
    let tag = tag.resolve()?;
    let tag = tag.trim();
    Ok((!tag.is_empty()).then(|| tag.to_owned()))
}

/// Switch to a fixed view or to the view named by the event.
///
/// When the tag comes from the event (`LeftBarClick <button> <tag>`), the
/// button must be one of `buttons`.
pub struct View {
    wm: Arc<Wm>,
    tag: Option<Lazy<String>>,
    buttons: Vec<String>,
}

impl View {
    /// View taking its tag from the event, for buttons 1 and 2.
    #[must_use]
    pub fn from_event(wm: Arc<Wm>) -> Self {
        Self {
            wm,
            tag: None,
            buttons: vec!["1".to_owned(), "2".to_owned()],
        }
    }

    /// View switching to `tag`.
    pub fn to(wm: Arc<Wm>, tag: impl Into<Lazy<String>>) -> Self {
        Self {
            wm,
            tag: Some(tag.into()),
            buttons: Vec::new(),
        }
    }

    /// Restrict event-driven switching to `buttons`.
    #[must_use]
    pub fn with_buttons<I, S>(mut self, buttons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.buttons = buttons.into_iter().map(Into::into).collect();
        self
    }
}

impl Handler for View {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        let tag = match &self.tag {
            Some(tag) => resolve_tag(tag)?,
            None => {
                let button = button_token(event).unwrap_or("1");
                if !self.buttons.iter().any(|allowed| allowed == button) {
                    return Ok(());
                }
                last_token(event).map(str::to_owned)
            }
        };
        match tag {
            Some(tag) => Ok(self.wm.view(&tag)?),
            None => Ok(()),
        }
    }
}

/// Move through the sorted view list, wrapping at both ends.
pub struct CycleView {
    wm: Arc<Wm>,
    step: isize,
    ignore_scratchpad: bool,
}

impl CycleView {
    /// Next view.
    #[must_use]
    pub fn next(wm: Arc<Wm>) -> Self {
        Self {
            wm,
            step: 1,
            ignore_scratchpad: true,
        }
    }

    /// Previous view.
    #[must_use]
    pub fn prev(wm: Arc<Wm>) -> Self {
        Self {
            wm,
            step: -1,
            ignore_scratchpad: true,
        }
    }

    /// Include the scratchpad in the cycle.
    #[must_use]
    pub fn including_scratchpad(mut self) -> Self {
        self.ignore_scratchpad = false;
        self
    }

    fn cycle(&self) -> anyhow::Result<()> {
        let views = self.wm.views(self.ignore_scratchpad)?;
        let active = self.wm.active_view()?;
        if views.is_empty() {
            return Ok(());
        }
        let len = views.len() as isize;
        let target = match active.and_then(|active| views.iter().position(|view| *view == active)) {
            Some(index) => (index as isize + self.step).rem_euclid(len),
            None if self.step > 0 => 0,
            None => len - 1,
        };
        let target = &views[target as usize];
        debug!("cycle view {} to {target}", self.step);
        Ok(self.wm.view(target)?)
    }
}

impl Handler for CycleView {
    fn handle(&self, _: &str, _: &[String]) -> anyhow::Result<()> {
        self.cycle()
    }
}

/// Mouse wheel on the bar: button 4 is previous, 5 is next.
pub struct WheelView {
    prev: CycleView,
    next: CycleView,
}

impl WheelView {
    /// Wheel handler over `wm`.
    #[must_use]
    pub fn new(wm: Arc<Wm>) -> Self {
        Self {
            prev: CycleView::prev(Arc::clone(&wm)),
            next: CycleView::next(wm),
        }
    }
}

impl Handler for WheelView {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        match button_token(event) {
            Some("4") => self.prev.cycle(),
            Some("5") => self.next.cycle(),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagEdit {
    Set,
    Add,
    Remove,
}

/// Change the tags of the selected client.
pub struct ClientTag {
    wm: Arc<Wm>,
    tag: Lazy<String>,
    edit: TagEdit,
}

impl ClientTag {
    /// Replace all tags with `tag`.
    pub fn set(wm: Arc<Wm>, tag: impl Into<Lazy<String>>) -> Self {
        Self {
            wm,
            tag: tag.into(),
            edit: TagEdit::Set,
        }
    }

    /// Add `tag`, keeping the others.
    pub fn add(wm: Arc<Wm>, tag: impl Into<Lazy<String>>) -> Self {
        Self {
            wm,
            tag: tag.into(),
            edit: TagEdit::Add,
        }
    }

    /// Remove `tag`, keeping the others.
    pub fn remove(wm: Arc<Wm>, tag: impl Into<Lazy<String>>) -> Self {
        Self {
            wm,
            tag: tag.into(),
            edit: TagEdit::Remove,
        }
    }
}

impl Handler for ClientTag {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        let Some(tag) = resolve_tag(&self.tag)? else {
            return Ok(());
        };
        let tag = self.wm.tags().d2t(&tag).to_owned();
        let tags = match self.edit {
            TagEdit::Set => vec![tag],
            TagEdit::Add => {
                let mut tags = self.wm.client_tags()?;
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
                tags
            }
            TagEdit::Remove => {
                let mut tags = self.wm.client_tags()?;
                tags.retain(|existing| *existing != tag);
                tags
            }
        };
        debug!("{:?} tags on {event:?}: {}", self.edit, tags.join("+"));
        Ok(self.wm.set_client_tags(&tags)?)
    }
}

/// Which left bar update a [`Bar`] handler performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarUpdate {
    /// `CreateTag`: create the entry with normal colors.
    Create,
    /// `DestroyTag`: remove the entry.
    Destroy,
    /// `FocusTag`: focus colors.
    Focus,
    /// `UnfocusTag`: normal colors.
    Unfocus,
    /// `UrgentTag`: prefix the label with `*`.
    Urgent,
    /// `NotUrgentTag`: plain label.
    NotUrgent,
}

/// Keep the left bar entry of the tag named by the event in sync.
pub struct Bar {
    wm: Arc<Wm>,
    update: BarUpdate,
}

impl Bar {
    /// Handler performing `update`.
    #[must_use]
    pub fn new(wm: Arc<Wm>, update: BarUpdate) -> Self {
        Self { wm, update }
    }
}

impl Handler for Bar {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        let Some(tag) = last_token(event).filter(|tag| *tag != "NULL") else {
            return Ok(());
        };
        let tags = self.wm.tags();
        let tag = tags.d2t(tag);
        let display = tags.t2d(tag);
        let path = self.wm.lbar_path(tag);
        let settings = self.wm.settings();
        debug!("bar {:?}: {path}", self.update);
        let client = self.wm.client();
        match self.update {
            BarUpdate::Create => client.create(
                &path,
                Some(&format!("{} {display}", settings.bar_normal_colors)),
            )?,
            BarUpdate::Destroy => client.remove(&path)?,
            BarUpdate::Focus => {
                client.write(&path, &format!("{} {display}", settings.bar_focus_colors))?;
            }
            BarUpdate::Unfocus => {
                client.write(&path, &format!("{} {display}", settings.bar_normal_colors))?;
            }
            BarUpdate::Urgent => client.write(&path, &format!("*{display}"))?,
            BarUpdate::NotUrgent => client.write(&path, display)?,
        }
        Ok(())
    }
}

/// Record focused views in the history.
pub struct TagHistory {
    wm: Arc<Wm>,
}

impl TagHistory {
    /// Recorder over the context's history.
    #[must_use]
    pub fn new(wm: Arc<Wm>) -> Self {
        Self { wm }
    }
}

impl Handler for TagHistory {
    fn handle(&self, event: &str, _: &[String]) -> anyhow::Result<()> {
        if let Some(tag) = last_token(event) {
            self.wm.history().record(tag);
        }
        Ok(())
    }
}

/// Step back or forward through the history and show that view.
pub struct HistoryStep {
    wm: Arc<Wm>,
    delta: isize,
}

impl HistoryStep {
    /// Step to the previous view.
    #[must_use]
    pub fn back(wm: Arc<Wm>) -> Self {
        Self { wm, delta: -1 }
    }

    /// Step to the next view.
    #[must_use]
    pub fn forward(wm: Arc<Wm>) -> Self {
        Self { wm, delta: 1 }
    }
}

impl Handler for HistoryStep {
    fn handle(&self, _: &str, _: &[String]) -> anyhow::Result<()> {
        let target = self.wm.history().step(self.delta);
        match target {
            Some(tag) => Ok(self.wm.view(&tag)?),
            None => Ok(()),
        }
    }
}

/// Jump to the scratchpad, or back to where the jump started.
pub struct ToggleScratchpad {
    wm: Arc<Wm>,
}

impl ToggleScratchpad {
    /// Toggle over `wm`.
    #[must_use]
    pub fn new(wm: Arc<Wm>) -> Self {
        Self { wm }
    }
}

impl Handler for ToggleScratchpad {
    fn handle(&self, _: &str, _: &[String]) -> anyhow::Result<()> {
        let scratchpad = self.wm.settings().scratchpad.clone();
        let active = self.wm.active_view()?;
        let target = if active.as_deref() == Some(scratchpad.as_str()) {
            self.wm.scratchpad_origin().take().unwrap_or(scratchpad)
        } else {
            *self.wm.scratchpad_origin() = active;
            scratchpad
        };
        Ok(self.wm.view(&target)?)
    }
}

#[cfg(all(test, feature = "inprocess"))]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::p9::inprocess::InProcessServer;
    use crate::p9::Client;

    fn setup(tags: &[&str], active: &str) -> (InProcessServer, Arc<Wm>) {
        let server = InProcessServer::new();
        server.mkdir("/tag/sel").unwrap();
        server.mkdir("/lbar").unwrap();
        for tag in tags {
            server.mkdir(&format!("/tag/{tag}")).unwrap();
        }
        server.put("/ctl", &format!("view {active}\n")).unwrap();
        server.put("/client/sel/tags", "1\n").unwrap();
        let client = Client::connect(server.transport()).unwrap();
        let wm = Arc::new(Wm::new(Arc::new(client), Settings::default()));
        server.clear_log();
        (server, wm)
    }

    #[test]
    fn view_from_bar_click_honours_buttons() {
        let (server, wm) = setup(&["1"], "1");
        let view = View::from_event(wm);
        view.handle("LeftBarClick 3 mail", &[]).unwrap();
        assert!(server.writes("/ctl").is_empty());
        view.handle("LeftBarClick 1 mail", &[]).unwrap();
        assert_eq!(server.writes("/ctl"), vec!["view 01_mail\n"]);
    }

    #[test]
    fn fixed_and_lazy_view_targets() {
        let (server, wm) = setup(&["1"], "1");
        View::to(Arc::clone(&wm), "browser").handle("Key Mod4-F2", &[]).unwrap();
        View::to(Arc::clone(&wm), Lazy::deferred(|| Ok(String::new())))
            .handle("Key Mod4-p", &[])
            .unwrap();
        assert_eq!(server.writes("/ctl"), vec!["view 02_browser\n"]);
    }

    #[test]
    fn cycling_wraps_and_skips_scratchpad() {
        let (server, wm) = setup(&["1", "2", "_sp"], "2");
        CycleView::next(Arc::clone(&wm)).handle("", &[]).unwrap();
        CycleView::prev(Arc::clone(&wm)).handle("", &[]).unwrap();
        CycleView::next(Arc::clone(&wm)).including_scratchpad().handle("", &[]).unwrap();
        assert_eq!(server.writes("/ctl"), vec!["view 1\n", "view 2\n", "view _sp\n"]);
    }

    #[test]
    fn wheel_maps_buttons_to_directions() {
        let (server, wm) = setup(&["1", "2", "3"], "2");
        let wheel = WheelView::new(wm);
        wheel.handle("LeftBarClick 4 2", &[]).unwrap();
        wheel.handle("LeftBarClick 5 2", &[]).unwrap();
        wheel.handle("LeftBarClick 1 2", &[]).unwrap();
        assert_eq!(server.writes("/ctl"), vec!["view 1\n", "view 2\n"]);
    }

    #[test]
    fn client_tag_edits() {
        let (server, wm) = setup(&["1"], "1");
        ClientTag::add(Arc::clone(&wm), "mail").handle("", &[]).unwrap();
        assert_eq!(server.contents("/client/sel/tags").as_deref(), Some("1+01_mail\n"));
        ClientTag::remove(Arc::clone(&wm), "1").handle("", &[]).unwrap();
        assert_eq!(server.contents("/client/sel/tags").as_deref(), Some("01_mail\n"));
        ClientTag::set(wm, "4").handle("", &[]).unwrap();
        assert_eq!(server.contents("/client/sel/tags").as_deref(), Some("4\n"));
    }

    #[test]
    fn bar_lifecycle() {
        let (server, wm) = setup(&["1"], "1");
        Bar::new(Arc::clone(&wm), BarUpdate::Create).handle("CreateTag 01_mail", &[]).unwrap();
        assert_eq!(
            server.contents("/lbar/01_mail").as_deref(),
            Some("#A0A0A0 #505050 #404040 mail")
        );
        Bar::new(Arc::clone(&wm), BarUpdate::Urgent).handle("UrgentTag Client 01_mail", &[]).unwrap();
        assert_eq!(server.contents("/lbar/01_mail").as_deref(), Some("*mail\n"));
        Bar::new(Arc::clone(&wm), BarUpdate::Focus).handle("FocusTag NULL", &[]).unwrap();
        Bar::new(Arc::clone(&wm), BarUpdate::Destroy).handle("DestroyTag 01_mail", &[]).unwrap();
        assert!(!server.exists("/lbar/01_mail"));
    }

    #[test]
    fn history_navigation_views_recorded_tags() {
        let (server, wm) = setup(&["1", "2", "3"], "3");
        let record = TagHistory::new(Arc::clone(&wm));
        for tag in ["1", "2", "3"] {
            record.handle(&format!("FocusTag {tag}"), &[]).unwrap();
        }
        HistoryStep::back(Arc::clone(&wm)).handle("", &[]).unwrap();
        record.handle("FocusTag 2", &[]).unwrap();
        HistoryStep::forward(Arc::clone(&wm)).handle("", &[]).unwrap();
        assert_eq!(server.writes("/ctl"), vec!["view 2\n", "view 3\n"]);
        assert_eq!(wm.history().len(), 3);
    }

    #[test]
    fn scratchpad_toggle_returns_to_origin() {
        let (server, wm) = setup(&["2", "_sp"], "2");
        let toggle = ToggleScratchpad::new(Arc::clone(&wm));
        toggle.handle("", &[]).unwrap();
        server.put("/ctl", "view _sp\n").unwrap();
        toggle.handle("", &[]).unwrap();
        assert_eq!(server.writes("/ctl"), vec!["view _sp\n", "view 2\n"]);
    }
}
