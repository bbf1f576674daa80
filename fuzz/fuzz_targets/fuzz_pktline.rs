//! Fuzz target for pkt-line parsing.
//!
//! The reader must reject malformed framing with an error, never a panic, and
//! every data packet it accepts must carry the bytes that followed its prefix.

#![no_main]

use ferry_git::{PktLine, PktLineReader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = PktLineReader::new(Cursor::new(data));
    let mut consumed = 0usize;

    // Bounded so crafted input cannot spin forever.
    for _ in 0..100 {
        match reader.read() {
            Ok(Some(pkt)) => {
                let len = pkt.encode().len();
                if let PktLine::Data(payload) = &pkt {
                    assert_eq!(&data[consumed + 4..consumed + len], &payload[..]);
                }
                consumed += len;
            }
            Ok(None) | Err(_) => break,
        }
    }
});
