#![no_main]

use libfuzzer_sys::fuzz_target;
use sptps_core::{Session, SessionHandler, SessionParams};
use sptps_crypto::sign::SigningKey;

struct Sink;

impl SessionHandler for Sink {
    fn send_data(&mut self, _record_type: u8, _data: &[u8]) -> bool {
        true
    }

    fn receive_record(&mut self, _record_type: u8, _data: &[u8]) -> bool {
        true
    }
}

fuzz_target!(|data: &[u8]| {
    // Inbound bytes must never panic a session, stream or datagram.
    let mykey = SigningKey::from_bytes(&[0x42; 32]);
    let hiskey = SigningKey::from_bytes(&[0x43; 32]).verifying_key();

    for datagram in [false, true] {
        let mut session = match Session::start(SessionParams::new(
            Sink,
            false,
            datagram,
            &mykey,
            &hiskey,
            b"fuzz".to_vec(),
        )) {
            Ok(session) => session,
            Err(_) => return,
        };
        let _ = session.receive_data(data);
    }
});
