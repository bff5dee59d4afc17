// Author: Lukas Bower
// Purpose: Exercise the 9P client against the in-process server: bar nodes, walks and fid hygiene.
#![cfg(feature = "inprocess")]

use wmiirc::p9::inprocess::{Fault, InProcessServer};
use wmiirc::p9::{Client, ProtocolError, ROOT_FID};

fn connect(server: &InProcessServer) -> Client {
    Client::connect(server.transport()).expect("attach")
}

#[test]
fn created_bar_entry_is_listed_as_leaf() {
    let server = InProcessServer::new();
    server.mkdir("/lbar").unwrap();
    let client = connect(&server);
    client
        .create("/lbar/01_mail", Some("#FFFFFF #1C2636 #0F1729 mail"))
        .unwrap();
    let entries = client.list("/lbar").unwrap();
    assert!(entries.iter().any(|entry| entry == "01_mail"), "{entries:?}");
    assert!(!entries.iter().any(|entry| entry.ends_with('/')));
    assert_eq!(
        server.contents("/lbar/01_mail").as_deref(),
        Some("#FFFFFF #1C2636 #0F1729 mail")
    );
}

#[test]
fn partial_walk_is_a_protocol_error() {
    let server = InProcessServer::new();
    server.mkdir("/client/sel").unwrap();
    let client = connect(&server);
    let err = client.read("/client/sel/missing").unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(matches!(
        err,
        ProtocolError::NotFound { resolved: 2, requested: 3, .. }
    ));
    assert_eq!(server.live_fids(), vec![ROOT_FID]);
}

#[test]
fn no_fid_leaks_when_requests_fail() {
    let server = InProcessServer::new();
    server.put("/ctl", "").unwrap();
    server.mkdir("/lbar").unwrap();
    let client = connect(&server);

    for fault in [
        Fault::Reject("Topen"),
        Fault::Reject("Twrite"),
        Fault::Drop("Twrite"),
        Fault::Drop("Tread"),
    ] {
        server.inject(fault);
        let _ = client.write("/ctl", "view 1");
        let _ = client.read("/ctl");
        assert_eq!(server.live_fids(), vec![ROOT_FID], "after {fault:?}");
    }

    server.inject(Fault::Reject("Tcreate"));
    assert!(client.create("/lbar/1", Some("x")).is_err());
    assert_eq!(server.live_fids(), vec![ROOT_FID]);

    client.write("/ctl", "view 2").unwrap();
    assert_eq!(server.contents("/ctl").as_deref(), Some("view 2\n"));
    assert_eq!(server.live_fids(), vec![ROOT_FID]);
}

#[test]
fn remove_releases_its_fid_even_when_rejected() {
    let server = InProcessServer::new();
    server.put("/lbar/1", "x").unwrap();
    let client = connect(&server);
    server.inject(Fault::Reject("Tremove"));
    assert!(client.remove("/lbar/1").is_err());
    assert_eq!(server.live_fids(), vec![ROOT_FID]);
}

#[test]
fn connections_keep_separate_fid_tables() {
    let server = InProcessServer::new();
    server.put("/event", "CreateTag 1\n").unwrap();
    let first = connect(&server);
    let second = connect(&server);
    assert_eq!(server.live_fids(), vec![ROOT_FID, ROOT_FID]);
    let mut lines = Vec::new();
    first
        .process("/event", |line| {
            lines.push(line.to_owned());
            second.read("/event").is_ok()
        })
        .unwrap();
    assert_eq!(lines, vec!["CreateTag 1"]);
    assert_eq!(server.live_fids(), vec![ROOT_FID, ROOT_FID]);
}
