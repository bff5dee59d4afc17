// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Check that corrupted wmii 9P frames are rejected without panicking.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wmii9p_codec::{
    decode_stats, Codec, OpenMode, Perm, Qid, QidType, Request, RequestBody, Response,
    ResponseBody, DEFAULT_MSIZE, VERSION,
};

#[test]
fn corrupted_frames_never_panic() {
    let iterations = std::env::var("WMII9P_FUZZ_ITERS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(512);
    let mut rng = StdRng::seed_from_u64(0x9_2000);
    let codec = Codec;

    for _ in 0..iterations {
        let mut frame = codec.encode_request(&random_request(&mut rng)).unwrap();
        corrupt(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| codec.decode_request(&frame)));
        assert!(result.is_ok(), "request decoder panicked");

        let mut frame = codec.encode_response(&random_response(&mut rng)).unwrap();
        corrupt(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| codec.decode_response(&frame)));
        assert!(result.is_ok(), "response decoder panicked");

        let mut garbage = vec![0u8; rng.random_range(0..96)];
        rng.fill(&mut garbage[..]);
        let result = catch_unwind(AssertUnwindSafe(|| decode_stats(&garbage)));
        assert!(result.is_ok(), "stat decoder panicked");
    }
}

fn corrupt<R: Rng>(rng: &mut R, frame: &mut Vec<u8>) {
    match rng.random_range(0..3) {
        0 => {
            let declared: u32 = rng.random();
            frame[0..4].copy_from_slice(&declared.to_le_bytes());
        }
        1 => {
            let keep = rng.random_range(0..frame.len());
            frame.truncate(keep);
            if keep >= 4 {
                frame[0..4].copy_from_slice(&(keep as u32).to_le_bytes());
            }
        }
        _ => {
            if frame.len() > 7 {
                let at = rng.random_range(7..frame.len());
                frame[at] = rng.random();
            }
        }
    }
}

fn random_name<R: Rng>(rng: &mut R) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789_";
    (0..rng.random_range(1..=8))
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

fn random_qid<R: Rng>(rng: &mut R) -> Qid {
    let ty = if rng.random_bool(0.5) {
        QidType::DIRECTORY
    } else {
        QidType::FILE
    };
    Qid::new(ty, rng.random(), rng.random())
}

fn random_request<R: Rng>(rng: &mut R) -> Request {
    let tag = rng.random();
    let body = match rng.random_range(0..7) {
        0 => RequestBody::Version {
            msize: DEFAULT_MSIZE,
            version: VERSION.to_owned(),
        },
        1 => RequestBody::Walk {
            fid: rng.random(),
            newfid: rng.random(),
            wnames: (0..rng.random_range(0..5)).map(|_| random_name(rng)).collect(),
        },
        2 => RequestBody::Open {
            fid: rng.random(),
            mode: OpenMode::write_truncate(),
        },
        3 => RequestBody::Create {
            fid: rng.random(),
            name: random_name(rng),
            perm: Perm::FILE,
            mode: OpenMode::write_only(),
        },
        4 => RequestBody::Read {
            fid: rng.random(),
            offset: rng.random(),
            count: 4096,
        },
        5 => RequestBody::Write {
            fid: rng.random(),
            offset: 0,
            data: random_name(rng).into_bytes(),
        },
        _ => RequestBody::Remove { fid: rng.random() },
    };
    Request { tag, body }
}

fn random_response<R: Rng>(rng: &mut R) -> Response {
    let tag = rng.random();
    let body = match rng.random_range(0..5) {
        0 => ResponseBody::Walk {
            qids: (0..rng.random_range(0..5)).map(|_| random_qid(rng)).collect(),
        },
        1 => ResponseBody::Create {
            qid: random_qid(rng),
            iounit: 0,
        },
        2 => ResponseBody::Read {
            data: random_name(rng).into_bytes(),
        },
        3 => ResponseBody::Write {
            count: rng.random(),
        },
        _ => ResponseBody::Error {
            message: random_name(rng),
        },
    };
    Response { tag, body }
}
