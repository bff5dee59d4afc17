// Author: Lukas Bower
// Purpose: Shared manager context handed to handlers, setup and the status bar.

//! Manager context.
//!
//! [`Wm`] bundles the protocol client with the settings, the tag name
//! mapping and the little mutable state the handlers share (view history and
//! the view to return to from the scratchpad).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::config::Settings;
use crate::events::Lazy;
use crate::history::HistoryRing;
use crate::p9::{Client, ProtocolError};

/// Root control file.
pub const CTL: &str = "/ctl";
/// Control file of the selected view.
pub const TAG_CTL: &str = "/tag/sel/ctl";
/// Control file of the selected client.
pub const CLIENT_CTL: &str = "/client/sel/ctl";
/// Tags of the selected client.
pub const CLIENT_TAGS: &str = "/client/sel/tags";
/// Left bar directory.
pub const LBAR: &str = "/lbar";
/// Right bar directory.
pub const RBAR: &str = "/rbar";

/// Mapping between real tag names and the names shown in the bar.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    to_display: HashMap<String, String>,
    to_tag: HashMap<String, String>,
}

impl TagMap {
    /// Build from `(display, tag)` pairs.
    pub fn new<I, D, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (D, T)>,
        D: Into<String>,
        T: Into<String>,
    {
        let mut map = Self::default();
        for (display, tag) in pairs {
            let (display, tag) = (display.into(), tag.into());
            map.to_display.insert(tag.clone(), display.clone());
            map.to_tag.insert(display, tag);
        }
        map
    }

    /// Display name of `tag`; unmapped tags are shown as is.
    #[must_use]
    pub fn t2d<'a>(&'a self, tag: &'a str) -> &'a str {
        self.to_display.get(tag).map_or(tag, String::as_str)
    }

    /// Real tag of display name `display`; unmapped names are tags already.
    #[must_use]
    pub fn d2t<'a>(&'a self, display: &'a str) -> &'a str {
        self.to_tag.get(display).map_or(display, String::as_str)
    }
}

/// Manager context shared by every handler.
pub struct Wm {
    client: Arc<Client>,
    settings: Arc<Settings>,
    tags: TagMap,
    history: Mutex<HistoryRing>,
    scratchpad_origin: Mutex<Option<String>>,
}

impl Wm {
    /// Context over `client` configured by `settings`.
    #[must_use]
    pub fn new(client: Arc<Client>, settings: Settings) -> Self {
        let tags = TagMap::new(settings.tag_mapping.iter().cloned());
        let history = HistoryRing::new(settings.history_size);
        Self {
            client,
            settings: Arc::new(settings),
            tags,
            history: Mutex::new(history),
            scratchpad_origin: Mutex::new(None),
        }
    }

    /// Protocol client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Shared protocol client.
    #[must_use]
    pub fn shared_client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shared settings, for lazy values outliving the borrow.
    #[must_use]
    pub fn shared_settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }

    /// Tag name mapping.
    #[must_use]
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    /// View history.
    pub fn history(&self) -> MutexGuard<'_, HistoryRing> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn scratchpad_origin(&self) -> MutexGuard<'_, Option<String>> {
        self.scratchpad_origin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Tag of the view currently shown, from the `view` line of `/ctl`.
    pub fn active_view(&self) -> Result<Option<String>, ProtocolError> {
        let lines = self.client.read(CTL)?;
        Ok(lines.iter().find_map(|line| {
            line.strip_prefix("view ")
                .and_then(|rest| rest.split_whitespace().next())
                .map(str::to_owned)
        }))
    }

    /// [`Wm::active_view`] as a lazy value, empty when no view is reported.
    #[must_use]
    pub fn active_view_lazy(self: &Arc<Self>) -> Lazy<String> {
        let wm = Arc::clone(self);
        Lazy::deferred(move || Ok(wm.active_view()?.unwrap_or_default()))
    }

    /// Existing view tags, sorted.
    ///
    /// The `sel` alias is always skipped; the scratchpad is skipped when
    /// `ignore_scratchpad` is set, unless it is the active view.
    pub fn views(&self, ignore_scratchpad: bool) -> Result<Vec<String>, ProtocolError> {
        let skip_scratchpad = ignore_scratchpad
            && self.active_view()?.as_deref() != Some(self.settings.scratchpad.as_str());
        let mut views: Vec<String> = self
            .client
            .list("/tag")?
            .into_iter()
            .filter_map(|entry| entry.strip_suffix('/').map(str::to_owned))
            .filter(|tag| tag != "sel")
            .filter(|tag| !(skip_scratchpad && *tag == self.settings.scratchpad))
            .collect();
        views.sort();
        Ok(views)
    }

    /// Switch to `tag`, translating display names.
    pub fn view(&self, tag: &str) -> Result<(), ProtocolError> {
        let tag = self.tags.d2t(tag);
        debug!("view {tag}");
        self.client.write(CTL, &format!("view {tag}"))
    }

    /// Tags of the selected client.
    pub fn client_tags(&self) -> Result<Vec<String>, ProtocolError> {
        let lines = self.client.read(CLIENT_TAGS)?;
        Ok(lines
            .first()
            .map(|line| {
                line.split('+')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Replace the tags of the selected client.
    pub fn set_client_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<(), ProtocolError> {
        let joined = tags.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("+");
        self.client.write(CLIENT_TAGS, &joined)
    }

    /// Path of the left bar entry for `tag`.
    #[must_use]
    pub fn lbar_path(&self, tag: &str) -> String {
        format!("{LBAR}/{}", self.tags.d2t(tag))
    }
}

/// Last whitespace-separated token of an event line.
#[must_use]
pub fn last_token(event: &str) -> Option<&str> {
    event.split_whitespace().next_back()
}

/// Token before the last one (the mouse button of bar click events).
#[must_use]
pub fn button_token(event: &str) -> Option<&str> {
    let mut tokens = event.split_whitespace().rev();
    tokens.next()?;
    tokens.next()
}

#[cfg(all(test, feature = "inprocess"))]
mod tests {
    use super::*;
    use crate::p9::inprocess::InProcessServer;

    fn wm(server: &InProcessServer) -> Wm {
        let client = Client::connect(server.transport()).unwrap();
        Wm::new(Arc::new(client), Settings::default())
    }

    #[test]
    fn tag_map_is_bidirectional_and_passes_unknown_names() {
        let map = TagMap::new([("mail", "01_mail")]);
        assert_eq!(map.t2d("01_mail"), "mail");
        assert_eq!(map.d2t("mail"), "01_mail");
        assert_eq!(map.t2d("3"), "3");
        assert_eq!(map.d2t("01_mail"), "01_mail");
    }

    #[test]
    fn event_tokens() {
        assert_eq!(last_token("FocusTag sel 01_mail\n"), Some("01_mail"));
        assert_eq!(button_token("LeftBarClick 4 01_mail"), Some("4"));
        assert_eq!(button_token("FocusTag"), None);
        assert_eq!(last_token("   "), None);
    }

    #[test]
    fn active_view_reads_ctl() {
        let server = InProcessServer::new();
        server.put("/ctl", "font fixed\nview 02_browser\nborder 0\n").unwrap();
        assert_eq!(wm(&server).active_view().unwrap().as_deref(), Some("02_browser"));
        server.put("/ctl", "font fixed\n").unwrap();
        assert_eq!(wm(&server).active_view().unwrap(), None);
    }

    #[test]
    fn views_skip_sel_and_scratchpad() {
        let server = InProcessServer::new();
        for tag in ["sel", "2", "01_mail", "_sp", "1"] {
            server.mkdir(&format!("/tag/{tag}")).unwrap();
        }
        server.put("/ctl", "view 1\n").unwrap();
        let wm = wm(&server);
        assert_eq!(wm.views(true).unwrap(), vec!["01_mail", "1", "2"]);
        assert_eq!(wm.views(false).unwrap(), vec!["01_mail", "1", "2", "_sp"]);
        server.put("/ctl", "view _sp\n").unwrap();
        assert_eq!(wm.views(true).unwrap(), vec!["01_mail", "1", "2", "_sp"]);
    }

    #[test]
    fn client_tags_round_trip() {
        let server = InProcessServer::new();
        server.put("/client/sel/tags", "1+01_mail\n").unwrap();
        let wm = wm(&server);
        assert_eq!(wm.client_tags().unwrap(), vec!["1", "01_mail"]);
        wm.set_client_tags(&["2", "3"]).unwrap();
        assert_eq!(server.contents("/client/sel/tags").as_deref(), Some("2+3\n"));
    }

    #[test]
    fn view_translates_display_names() {
        let server = InProcessServer::new();
        server.put("/ctl", "").unwrap();
        wm(&server).view("mail").unwrap();
        assert_eq!(server.writes("/ctl"), vec!["view 01_mail\n"]);
    }
}
