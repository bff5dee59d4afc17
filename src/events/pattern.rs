// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Compile declarative event rules into the ordered binding table.
// Author: Lukas Bower

//! Event rules and the pattern table built from them.
//!
//! A rule pairs a trigger with a handler and optional default arguments.
//! Generators expand into several rules at build time. The resulting table is
//! immutable and its order decides the order in which matching handlers run.

use std::fmt;
use std::sync::Arc;

use log::debug;
use regex::Regex;
use thiserror::Error;

use super::Lazy;

/// Reaction to a matched event.
pub trait Handler: Send + Sync {
    /// Handle `event`; `defaults` are the binding's default arguments.
    fn handle(&self, event: &str, defaults: &[String]) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&str, &[String]) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &str, defaults: &[String]) -> anyhow::Result<()> {
        self(event, defaults)
    }
}

/// Problems detected while building the table.
#[derive(Debug, Error)]
pub enum BindingError {
    /// The trigger is not a valid regular expression.
    #[error("invalid trigger {pattern:?}: {source}")]
    InvalidPattern {
        /// Trigger text.
        pattern: String,
        /// Regex compiler error.
        #[source]
        source: regex::Error,
    },
    /// The trigger is empty.
    #[error("empty trigger")]
    EmptyPattern,
    /// A rule was declared without a handler.
    #[error("no handler for trigger {0:?}")]
    MissingHandler(String),
    /// A deferred trigger could not be produced.
    #[error("trigger could not be produced: {0:#}")]
    Trigger(anyhow::Error),
    /// A generator failed.
    #[error("pattern generator failed: {0:#}")]
    Generator(anyhow::Error),
}

/// Compose a key descriptor such as `Mod4-Shift-h`.
#[must_use]
pub fn key(modifier: &str, chord: &str) -> String {
    match (modifier.trim_end_matches('-'), chord.trim_start_matches('-')) {
        ("", chord) => chord.to_owned(),
        (modifier, "") => modifier.to_owned(),
        (modifier, chord) => format!("{modifier}-{chord}"),
    }
}

/// What an event line must look like for a rule to fire.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Regular expression source.
    Regex(String),
    /// Precompiled regular expression.
    Compiled(Regex),
    /// Key descriptor; matches `Key <descriptor>` exactly and is grabbed.
    Key(String),
}

impl Trigger {
    /// Key trigger for `chord` under `modifier`.
    #[must_use]
    pub fn key(modifier: &str, chord: &str) -> Self {
        Self::Key(key(modifier, chord))
    }

    fn compile(self) -> Result<(Regex, Option<String>), BindingError> {
        let (source, grabbed) = match self {
            Self::Compiled(regex) => return Ok((regex, None)),
            Self::Regex(source) => (source, None),
            Self::Key(desc) => {
                if desc.trim().is_empty() {
                    return Err(BindingError::EmptyPattern);
                }
                (format!("^Key {}$", regex::escape(&desc)), Some(desc))
            }
        };
        if source.is_empty() {
            return Err(BindingError::EmptyPattern);
        }
        let regex = Regex::new(&source).map_err(|source_err| BindingError::InvalidPattern {
            pattern: source.clone(),
            source: source_err,
        })?;
        Ok((regex, grabbed))
    }
}

impl From<&str> for Trigger {
    fn from(value: &str) -> Self {
        Self::Regex(value.to_owned())
    }
}

impl From<String> for Trigger {
    fn from(value: String) -> Self {
        Self::Regex(value)
    }
}

impl From<Regex> for Trigger {
    fn from(value: Regex) -> Self {
        Self::Compiled(value)
    }
}

/// A compiled rule.
#[derive(Clone)]
pub struct Binding {
    regex: Regex,
    handler: Arc<dyn Handler>,
    defaults: Vec<String>,
    key: Option<String>,
}

impl Binding {
    /// Compile `trigger` and bind it to `handler`.
    pub fn new(
        trigger: Trigger,
        handler: Arc<dyn Handler>,
        defaults: Vec<String>,
    ) -> Result<Self, BindingError> {
        let (regex, key) = trigger.compile()?;
        Ok(Self {
            regex,
            handler,
            defaults,
            key,
        })
    }

    /// Regular expression source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Key descriptor when the trigger was a key.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Default arguments passed to the handler.
    #[must_use]
    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Whether the trigger matches anywhere in `event`.
    #[must_use]
    pub fn is_match(&self, event: &str) -> bool {
        self.regex.is_match(event)
    }

    /// Run the handler for `event`.
    pub fn invoke(&self, event: &str) -> anyhow::Result<()> {
        self.handler.handle(event, &self.defaults)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("pattern", &self.regex.as_str())
            .field("defaults", &self.defaults)
            .finish()
    }
}

type Generator = Arc<dyn Fn() -> anyhow::Result<Vec<Entry>> + Send + Sync>;

/// Declarative table entry.
pub enum Entry {
    /// Trigger, handler and default arguments.
    Rule {
        /// Trigger, possibly produced at build time.
        trigger: Lazy<Trigger>,
        /// Handler; `None` is reported as a configuration error.
        handler: Option<Arc<dyn Handler>>,
        /// Default arguments handed to the handler.
        defaults: Vec<String>,
    },
    /// Producer of further entries, expanded at build time.
    Generator(Generator),
    /// Already compiled binding.
    Built(Binding),
}

impl Entry {
    /// Rule binding `trigger` to `handler`.
    pub fn rule<T, H>(trigger: T, handler: H) -> Self
    where
        T: Into<Lazy<Trigger>>,
        H: Handler + 'static,
    {
        Self::shared(trigger, Arc::new(handler))
    }

    /// Rule binding `trigger` to an already shared handler.
    pub fn shared<T>(trigger: T, handler: Arc<dyn Handler>) -> Self
    where
        T: Into<Lazy<Trigger>>,
    {
        Self::Rule {
            trigger: trigger.into(),
            handler: Some(handler),
            defaults: Vec::new(),
        }
    }

    /// Attach default arguments to a rule; other entries are returned as is.
    #[must_use]
    pub fn with_defaults<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Self::Rule {
                trigger, handler, ..
            } => Self::Rule {
                trigger,
                handler,
                defaults: values.into_iter().map(Into::into).collect(),
            },
            other => other,
        }
    }

    /// Entry expanded by calling `generator` when the table is built.
    pub fn generator<F>(generator: F) -> Self
    where
        F: Fn() -> anyhow::Result<Vec<Entry>> + Send + Sync + 'static,
    {
        Self::Generator(Arc::new(generator))
    }
}

impl From<Binding> for Entry {
    fn from(value: Binding) -> Self {
        Self::Built(value)
    }
}

impl From<&str> for Lazy<Trigger> {
    fn from(value: &str) -> Self {
        Lazy::Value(Trigger::from(value))
    }
}

impl From<String> for Lazy<Trigger> {
    fn from(value: String) -> Self {
        Lazy::Value(Trigger::from(value))
    }
}

/// Key naming used by [`direction_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionStyle {
    /// `h`, `j`, `k`, `l`.
    Vim,
    /// `Up`, `Down`, `Left`, `Right`.
    Cursor,
}

impl DirectionStyle {
    /// Key names in left/down/up/right order for vim, up/down/left/right for cursor keys.
    #[must_use]
    pub fn keys(self) -> [&'static str; 4] {
        match self {
            Self::Vim => ["h", "j", "k", "l"],
            Self::Cursor => ["Up", "Down", "Left", "Right"],
        }
    }
}

/// Generator binding one handler to the four direction keys under `prefix`.
pub fn direction_set(prefix: &str, style: DirectionStyle, handler: Arc<dyn Handler>) -> Entry {
    let prefix = prefix.to_owned();
    Entry::generator(move || {
        Ok(style
            .keys()
            .iter()
            .map(|direction| Entry::shared(Trigger::key(&prefix, direction), Arc::clone(&handler)))
            .collect())
    })
}

/// Immutable, ordered set of compiled bindings.
#[derive(Debug, Default, Clone)]
pub struct PatternTable {
    bindings: Vec<Binding>,
    keys: Vec<String>,
}

impl PatternTable {
    /// Compile `entries`, expanding generators in place.
    pub fn build<I>(entries: I) -> Result<Self, BindingError>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut table = Self::default();
        for entry in entries {
            table.add(entry)?;
        }
        debug!(
            "pattern table: {} bindings, {} keys",
            table.bindings.len(),
            table.keys.len()
        );
        Ok(table)
    }

    fn add(&mut self, entry: Entry) -> Result<(), BindingError> {
        match entry {
            Entry::Rule {
                trigger,
                handler,
                defaults,
            } => {
                let trigger = trigger.resolve().map_err(BindingError::Trigger)?;
                let Some(handler) = handler else {
                    return Err(BindingError::MissingHandler(describe(&trigger)));
                };
                self.push(Binding::new(trigger, handler, defaults)?);
            }
            Entry::Generator(generator) => {
                for entry in generator().map_err(BindingError::Generator)? {
                    self.add(entry)?;
                }
            }
            Entry::Built(binding) => self.push(binding),
        }
        Ok(())
    }

    fn push(&mut self, binding: Binding) {
        debug!("add binding {:?}", binding.pattern());
        if let Some(key) = binding.key() {
            if !self.keys.iter().any(|known| known == key) {
                self.keys.push(key.to_owned());
            }
        }
        self.bindings.push(binding);
    }

    /// Bindings in declaration order.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Bindings matching `event`, in declaration order.
    pub fn matching<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a Binding> + 'a {
        self.bindings
            .iter()
            .filter(move |binding| binding.is_match(event))
    }

    /// Key descriptors used by key triggers, first use first.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn describe(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Regex(source) => source.clone(),
        Trigger::Compiled(regex) => regex.as_str().to_owned(),
        Trigger::Key(desc) => format!("Key {desc}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &str, _: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn key_descriptor_builder() {
        assert_eq!(key("Mod4", "Shift-h"), "Mod4-Shift-h");
        assert_eq!(key("Mod4-", "Return"), "Mod4-Return");
        assert_eq!(key("", "F12"), "F12");
    }

    #[test]
    fn key_triggers_are_anchored_and_grabbed() {
        let table = PatternTable::build([
            Entry::rule(Trigger::key("Mod4", "plus"), noop),
            Entry::rule(Trigger::key("Mod4", "plus"), noop),
        ])
        .unwrap();
        let binding = &table.bindings()[0];
        assert!(binding.is_match("Key Mod4-plus"));
        assert!(!binding.is_match("Key Mod4-plusx"));
        assert!(!binding.is_match("xKey Mod4-plus"));
        assert_eq!(table.keys(), ["Mod4-plus"]);
    }

    #[test]
    fn generators_expand_in_place() {
        let handler: Arc<dyn Handler> = Arc::new(noop);
        let table = PatternTable::build([
            Entry::rule("^Start", noop),
            direction_set("Mod4-Shift", DirectionStyle::Vim, handler),
            Entry::rule("^Stop", noop),
        ])
        .unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.bindings()[0].pattern(), "^Start");
        assert_eq!(table.bindings()[5].pattern(), "^Stop");
        let fired: Vec<usize> = ["Key Mod4-Shift-h", "Key Mod4-Shift-l"]
            .iter()
            .map(|event| {
                table
                    .bindings()
                    .iter()
                    .position(|binding| binding.is_match(event))
                    .unwrap()
            })
            .collect();
        assert_eq!(fired, vec![1, 4]);
        assert_eq!(table.keys().len(), 4);
    }

    #[test]
    fn deferred_triggers_resolve_at_build_time() {
        let modkey = String::from("Mod1");
        let trigger = Lazy::deferred(move || Ok(Trigger::key(&modkey, "Return")));
        let table = PatternTable::build([Entry::rule(trigger, noop)]).unwrap();
        assert!(table.bindings()[0].is_match("Key Mod1-Return"));
    }

    #[test]
    fn missing_handler_is_a_build_error() {
        let entry = Entry::Rule {
            trigger: "^FocusTag".into(),
            handler: None,
            defaults: Vec::new(),
        };
        let err = PatternTable::build([entry]).unwrap_err();
        assert!(matches!(err, BindingError::MissingHandler(ref pattern) if pattern == "^FocusTag"));
    }

    #[test]
    fn malformed_triggers_are_build_errors() {
        assert!(matches!(
            PatternTable::build([Entry::rule("^Key (", noop)]),
            Err(BindingError::InvalidPattern { .. })
        ));
        assert!(matches!(
            PatternTable::build([Entry::rule("", noop)]),
            Err(BindingError::EmptyPattern)
        ));
    }

    #[test]
    fn defaults_are_passed_through() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let table = PatternTable::build([Entry::rule("^ColMode", move |_: &str, defaults: &[String]| -> anyhow::Result<()> {
            sink.lock().unwrap().extend(defaults.iter().cloned());
            Ok(())
        })
        .with_defaults(["stack"])])
        .unwrap();
        for binding in table.matching("ColMode") {
            binding.invoke("ColMode").unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), vec!["stack".to_owned()]);
    }
}
