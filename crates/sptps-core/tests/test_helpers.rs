//! Shared harness for session integration tests: two sessions wired
//! back-to-back through in-memory frame queues, no sockets involved.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::rngs::OsRng;
use sptps_core::record::RECORD_HANDSHAKE;
use sptps_core::{Session, SessionHandler, SessionParams};
use sptps_crypto::sign::{SigningKey, VerifyingKey};

/// One endpoint's view of the wire: frames it sent, records it received.
#[derive(Default, Clone)]
pub struct Wire {
    pub frames: Rc<RefCell<VecDeque<Vec<u8>>>>,
    pub records: Rc<RefCell<Vec<(u8, Vec<u8>)>>>,
}

impl Wire {
    /// Pop the oldest frame this endpoint sent.
    pub fn pop_frame(&self) -> Option<Vec<u8>> {
        self.frames.borrow_mut().pop_front()
    }

    /// Application records received so far, in order.
    pub fn app_records(&self) -> Vec<(u8, Vec<u8>)> {
        self.records
            .borrow()
            .iter()
            .filter(|(record_type, _)| *record_type < RECORD_HANDSHAKE)
            .cloned()
            .collect()
    }

    /// Number of handshake-complete signals (empty HANDSHAKE records)
    /// delivered so far.
    pub fn handshake_signals(&self) -> usize {
        self.records
            .borrow()
            .iter()
            .filter(|(record_type, data)| *record_type == RECORD_HANDSHAKE && data.is_empty())
            .count()
    }
}

/// Handler capturing everything into a [`Wire`].
pub struct WireHandler(pub Wire);

impl SessionHandler for WireHandler {
    fn send_data(&mut self, _record_type: u8, data: &[u8]) -> bool {
        self.0.frames.borrow_mut().push_back(data.to_vec());
        true
    }

    fn receive_record(&mut self, record_type: u8, data: &[u8]) -> bool {
        self.0.records.borrow_mut().push((record_type, data.to_vec()));
        true
    }
}

/// Long-term keys for both sides of a test session.
pub struct KeyRing {
    pub initiator: SigningKey,
    pub responder: SigningKey,
    pub initiator_public: VerifyingKey,
    pub responder_public: VerifyingKey,
}

impl KeyRing {
    pub fn generate() -> Self {
        let initiator = SigningKey::generate(&mut OsRng);
        let responder = SigningKey::generate(&mut OsRng);
        let initiator_public = initiator.verifying_key();
        let responder_public = responder.verifying_key();
        Self {
            initiator,
            responder,
            initiator_public,
            responder_public,
        }
    }
}

pub type TestSession<'k> = Session<'k, WireHandler>;

/// Start an initiator/responder pair without delivering any frames yet.
pub fn start_pair<'k>(
    keys: &'k KeyRing,
    datagram: bool,
    label: &[u8],
) -> (TestSession<'k>, Wire, TestSession<'k>, Wire) {
    let initiator_wire = Wire::default();
    let responder_wire = Wire::default();

    let mut initiator_params = SessionParams::new(
        WireHandler(initiator_wire.clone()),
        true,
        datagram,
        &keys.initiator,
        &keys.responder_public,
        label.to_vec(),
    );
    initiator_params.cipher_suites = 0xFFFF;

    let mut responder_params = SessionParams::new(
        WireHandler(responder_wire.clone()),
        false,
        datagram,
        &keys.responder,
        &keys.initiator_public,
        label.to_vec(),
    );
    responder_params.cipher_suites = 0xFFFF;

    let initiator = Session::start(initiator_params).unwrap();
    let responder = Session::start(responder_params).unwrap();

    (initiator, initiator_wire, responder, responder_wire)
}

/// Deliver queued frames in both directions until the wire is quiet.
pub fn pump(
    a: &mut Session<'_, WireHandler>,
    a_wire: &Wire,
    b: &mut Session<'_, WireHandler>,
    b_wire: &Wire,
) {
    loop {
        if let Some(frame) = a_wire.pop_frame() {
            let consumed = b.receive_data(&frame).unwrap();
            assert_eq!(consumed, frame.len());
            continue;
        }
        if let Some(frame) = b_wire.pop_frame() {
            let consumed = a.receive_data(&frame).unwrap();
            assert_eq!(consumed, frame.len());
            continue;
        }
        break;
    }
}

/// Start a pair and run the handshake to completion.
pub fn established_pair<'k>(
    keys: &'k KeyRing,
    datagram: bool,
    label: &[u8],
) -> (TestSession<'k>, Wire, TestSession<'k>, Wire) {
    let (mut initiator, initiator_wire, mut responder, responder_wire) =
        start_pair(keys, datagram, label);

    pump(&mut initiator, &initiator_wire, &mut responder, &responder_wire);

    assert!(initiator.is_established());
    assert!(responder.is_established());
    assert_eq!(initiator_wire.handshake_signals(), 1);
    assert_eq!(responder_wire.handshake_signals(), 1);

    (initiator, initiator_wire, responder, responder_wire)
}
