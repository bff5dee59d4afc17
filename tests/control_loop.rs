// Author: Lukas Bower
// Purpose: End-to-end checks of event ordering, handler isolation and the default bar reactions.
#![cfg(feature = "inprocess")]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use wmiirc::bindings::default_table;
use wmiirc::config::Settings;
use wmiirc::events::{dispatch_line, Dispatcher, Entry, EventQueue, Event, PatternTable};
use wmiirc::history::HistoryRing;
use wmiirc::p9::inprocess::InProcessServer;
use wmiirc::p9::Client;
use wmiirc::wm::Wm;

const WAIT: Duration = Duration::from_secs(2);

fn line(event: Event) -> String {
    match event {
        Event::Line(text) => text,
        Event::Deferred(_) => panic!("unexpected deferred event"),
    }
}

#[test]
fn queue_keeps_each_producer_in_order() {
    let queue = Arc::new(EventQueue::new());
    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..50 {
                    queue.push(format!("{producer} {seq}"));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut last = [None::<u32>; 4];
    for _ in 0..200 {
        let text = line(queue.pop());
        let (producer, seq) = text.split_once(' ').unwrap();
        let producer: usize = producer.parse().unwrap();
        let seq: u32 = seq.parse().unwrap();
        if let Some(prev) = last[producer] {
            assert!(seq > prev, "producer {producer}: {seq} after {prev}");
        }
        last[producer] = Some(seq);
    }
    assert!(queue.is_empty());
}

#[test]
fn sequenced_pushes_pop_in_arrival_order() {
    let queue = Arc::new(EventQueue::new());
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || (0..3).map(|_| line(queue.pop())).collect::<Vec<_>>())
    };
    for event in ["E1", "E2", "E3"] {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.push(event)).join().unwrap();
    }
    assert_eq!(consumer.join().unwrap(), vec!["E1", "E2", "E3"]);
}

#[test]
fn matching_handlers_run_in_declaration_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = |label: &'static str| {
        let seen = Arc::clone(&seen);
        move |event: &str, _: &[String]| -> anyhow::Result<()> {
            seen.lock().unwrap().push(format!("{label}:{event}"));
            Ok(())
        }
    };
    let table = PatternTable::build([
        Entry::rule("^Focus", record("first")),
        Entry::rule("^Unfocus", record("never")),
        Entry::rule("Tag", record("second")),
    ])
    .unwrap();
    dispatch_line(&table, "FocusTag 1");
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["first:FocusTag 1", "second:FocusTag 1"]
    );
}

#[test]
fn failing_handler_does_not_stop_siblings_or_later_events() {
    let (tx, rx) = mpsc::channel();
    let table = PatternTable::build([
        Entry::rule("^X", |_: &str, _: &[String]| -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }),
        Entry::rule("^X", |_: &str, _: &[String]| -> anyhow::Result<()> {
            panic!("handler panic")
        }),
        Entry::rule(".", move |event: &str, _: &[String]| -> anyhow::Result<()> {
            tx.send(event.to_owned())?;
            Ok(())
        }),
    ])
    .unwrap();
    let dispatcher = Dispatcher::new(table);
    dispatcher.push("X 1");
    dispatcher.push("Y 2");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "X 1");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "Y 2");
    assert_eq!(dispatcher.starts(), 1);
    dispatcher.shutdown();
}

#[test]
fn history_branching_discards_forward_entries() {
    let mut ring = HistoryRing::new(3);
    for id in ["A", "B", "C"] {
        ring.record(id);
    }
    assert_eq!(ring.step(-1).as_deref(), Some("B"));
    assert_eq!(ring.step(-1).as_deref(), Some("A"));
    ring.record("D");
    assert_eq!(ring.step(1), None);
    assert_eq!(ring.iter().collect::<Vec<_>>(), vec!["A", "D"]);
    assert_eq!(ring.step(-1).as_deref(), Some("A"));
    assert_eq!(ring.step(1).as_deref(), Some("D"));
}

#[test]
fn focus_event_updates_the_mapped_bar_entry_once() {
    let server = InProcessServer::new();
    server.put("/lbar/01_mail", "#A0A0A0 #505050 #404040 mail").unwrap();
    let client = Client::connect(server.transport()).unwrap();
    let wm = Arc::new(Wm::new(Arc::new(client), Settings::default()));
    let dispatcher = Dispatcher::new(default_table(&wm).unwrap());

    dispatcher.push("FocusTag sel 01_mail");
    dispatcher.shutdown();

    assert_eq!(
        server.writes("/lbar/01_mail"),
        vec!["#FFFFFF #1C2636 #0F1729 mail\n"]
    );
    assert_eq!(server.written_paths(), vec!["/lbar/01_mail"]);
    assert_eq!(wm.history().current(), Some("01_mail"));
}

#[test]
fn created_tags_get_bar_entries_through_the_default_table() {
    let server = InProcessServer::new();
    server.mkdir("/lbar").unwrap();
    let client = Client::connect(server.transport()).unwrap();
    let wm = Arc::new(Wm::new(Arc::new(client), Settings::default()));
    let table = default_table(&wm).unwrap();

    dispatch_line(&table, "CreateTag 01_mail");
    dispatch_line(&table, "CreateTag 3");
    assert_eq!(server.children("/lbar"), vec!["01_mail", "3"]);
    assert_eq!(
        server.contents("/lbar/3").as_deref(),
        Some("#A0A0A0 #505050 #404040 3")
    );

    dispatch_line(&table, "DestroyTag 3");
    assert_eq!(server.children("/lbar"), vec!["01_mail"]);
}
