#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use strata_rtp::SenderReport;

// Walk the input as a compound control datagram.
fuzz_target!(|data: &[u8]| {
    let mut buf = Bytes::copy_from_slice(data);
    while let Ok(report) = SenderReport::decode(&mut buf) {
        let reencoded = report.to_bytes();
        assert_eq!(reencoded.len(), SenderReport::ENCODED_LEN);
    }
});
