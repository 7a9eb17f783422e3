#![no_main]

use libfuzzer_sys::fuzz_target;
use strata_rtp::wire::{DataHeader, DataPacket, HEADER_LEN};

/// Data packet decoding must never panic, and whatever decodes must
/// re-encode to the exact input bytes.
fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    let _ = DataHeader::decode(&mut buf);

    let mut buf = data;
    match DataPacket::decode(&mut buf) {
        Ok(pkt) => assert_eq!(&pkt.encode()[..], data),
        Err(_) => assert!(data.len() < HEADER_LEN),
    }
});
