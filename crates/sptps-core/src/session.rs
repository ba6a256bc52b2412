//! The SPTPS session: handshake state machine and record pump.
//!
//! A session is owned by the caller and never touches sockets. Outbound
//! bytes leave through [`SessionHandler::send_data`]; decrypted inbound
//! records arrive at [`SessionHandler::receive_record`]. All calls are
//! synchronous and the session is not internally synchronized; callers
//! serialize access, and callbacks must not re-enter the session.
//!
//! The handshake drives KEX → SIG → ACK and then idles in
//! `SecondaryKex`, from which either side can renegotiate. An empty
//! HANDSHAKE record delivered to the caller signals handshake completion.

use zeroize::Zeroizing;

use sptps_crypto::aead::{RecordCipher, KEY_MATERIAL_LEN};
use sptps_crypto::kdf;
use sptps_crypto::kex::EphemeralKeyPair;
use sptps_crypto::sign::{self, SigningKey, VerifyingKey, SIGNATURE_LEN};
use sptps_crypto::suite::{self, ALL_SUITES};
use sptps_crypto::CipherSuite;

use crate::handshake::{sig_transcript, KexRecord};
use crate::record::{
    self, ReassemblyBuffer, DATAGRAM_HEADER_LEN, DATAGRAM_OVERHEAD, RECORD_HANDSHAKE,
};
use crate::replay::{ReplayWindow, DEFAULT_REPLAY_WINDOW};
use crate::{Error, Result};

/// Outbound sequence numbers at which sending stops until the caller
/// renegotiates; keeps the 32-bit nonce space from being exhausted.
const REKEY_THRESHOLD: u32 = 1 << 30;

/// Callbacks a session uses to reach its transport and its application.
///
/// Returning `false` from either callback aborts the triggering operation
/// with [`Error::Callback`].
pub trait SessionHandler {
    /// Write framed bytes to the underlying transport.
    fn send_data(&mut self, record_type: u8, data: &[u8]) -> bool;

    /// Consume a decrypted inbound record. An empty record of type 128
    /// signals that a handshake completed.
    fn receive_record(&mut self, record_type: u8, data: &[u8]) -> bool;
}

/// Parameters for [`Session::start`].
pub struct SessionParams<'k, H> {
    /// Callback sink; the session owns it for its lifetime.
    pub handler: H,
    /// Whether this side drives the handshake.
    pub initiator: bool,
    /// Datagram framing instead of stream framing.
    pub datagram: bool,
    /// Local long-term signing key, borrowed for the session's lifetime.
    pub mykey: &'k SigningKey,
    /// Peer's long-term verifying key, borrowed for the session's lifetime.
    pub hiskey: &'k VerifyingKey,
    /// Domain-separation label mixed into key expansion. Both sides must
    /// use the same label.
    pub label: Vec<u8>,
    /// Enable mask of cipher suites; 0 means all supported.
    pub cipher_suites: u16,
    /// Preferred suite id.
    pub preferred_suite: u8,
    /// Replay window size in bytes; 0 disables replay protection.
    pub replay_window: usize,
}

impl<'k, H> SessionParams<'k, H> {
    /// Parameters with the default suite set, preference and replay
    /// window.
    pub fn new(
        handler: H,
        initiator: bool,
        datagram: bool,
        mykey: &'k SigningKey,
        hiskey: &'k VerifyingKey,
        label: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            handler,
            initiator,
            datagram,
            mykey,
            hiskey,
            label: label.into(),
            cipher_suites: 0,
            preferred_suite: 0,
            replay_window: DEFAULT_REPLAY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Own KEX sent, waiting for the peer's.
    Kex,
    /// Both KEX records held, waiting for the peer's signature.
    Sig,
    /// Keys derived, waiting for the peer to switch directions.
    Ack,
    /// Established; a renegotiation may start here.
    SecondaryKex,
    /// A fatal error occurred; only dropping the session is useful.
    Dead,
}

/// An SPTPS session endpoint.
pub struct Session<'k, H: SessionHandler> {
    handler: H,
    initiator: bool,
    datagram: bool,
    mykey: &'k SigningKey,
    hiskey: &'k VerifyingKey,
    label: Vec<u8>,
    enabled_suites: u16,
    preferred_suite: u8,
    selected_suite: Option<CipherSuite>,

    state: HandshakeState,
    /// Outbound direction encrypts under the negotiated key.
    outstate: bool,
    /// Inbound direction decrypts under the negotiated key.
    instate: bool,

    ephemeral: Option<EphemeralKeyPair>,
    mykex: Option<KexRecord>,
    hiskex: Option<KexRecord>,
    key_material: Option<Zeroizing<[u8; KEY_MATERIAL_LEN]>>,
    outcipher: Option<RecordCipher>,
    incipher: Option<RecordCipher>,

    outseqno: u32,
    replay: ReplayWindow,
    reassembly: ReassemblyBuffer,
}

impl<'k, H: SessionHandler> Session<'k, H> {
    /// Start a session: allocate state and send the initial KEX record.
    ///
    /// Both sides send their KEX unsolicited; the handshake then proceeds
    /// as inbound records arrive through [`receive_data`](Self::receive_data).
    pub fn start(params: SessionParams<'k, H>) -> Result<Self> {
        let SessionParams {
            handler,
            initiator,
            datagram,
            mykey,
            hiskey,
            label,
            cipher_suites,
            preferred_suite,
            replay_window,
        } = params;

        let enabled_suites = if cipher_suites == 0 {
            ALL_SUITES
        } else {
            cipher_suites & ALL_SUITES
        };

        let mut session = Self {
            handler,
            initiator,
            datagram,
            mykey,
            hiskey,
            label,
            enabled_suites,
            preferred_suite,
            selected_suite: None,
            state: HandshakeState::Kex,
            outstate: false,
            instate: false,
            ephemeral: None,
            mykex: None,
            hiskex: None,
            key_material: None,
            outcipher: None,
            incipher: None,
            outseqno: 0,
            replay: ReplayWindow::new(replay_window),
            reassembly: ReassemblyBuffer::new(),
        };

        session.send_kex()?;
        Ok(session)
    }

    /// Send an application record (type < 128).
    ///
    /// Fails until the first handshake completes, and once the outbound
    /// sequence space nears exhaustion until [`force_kex`](Self::force_kex)
    /// has been completed.
    pub fn send_record(&mut self, record_type: u8, data: &[u8]) -> Result<()> {
        self.ensure_alive()?;

        if !self.outstate {
            return Err(Error::Misuse("handshake phase not finished yet"));
        }
        if record_type >= RECORD_HANDSHAKE {
            return Err(Error::Misuse("invalid application record type"));
        }
        if data.len() > u16::MAX as usize {
            return Err(Error::Misuse("record payload too large"));
        }
        if self.outseqno >= REKEY_THRESHOLD {
            return Err(Error::Misuse(
                "renegotiation required before sequence numbers are exhausted",
            ));
        }

        self.send_record_priv(record_type, data)
    }

    /// Feed inbound transport bytes into the session.
    ///
    /// Stream mode reassembles and processes every complete record in
    /// `data` and returns the number of bytes consumed. Datagram mode
    /// treats `data` as one packet and returns its length on success.
    pub fn receive_data(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_alive()?;

        if self.datagram {
            self.receive_data_datagram(data)?;
            return Ok(data.len());
        }

        match self.receive_data_stream(data) {
            Ok(consumed) => Ok(consumed),
            Err(err) => {
                // A stream that fails mid-record cannot resynchronize.
                if !matches!(err, Error::Callback(_)) {
                    self.state = HandshakeState::Dead;
                }
                Err(err)
            }
        }
    }

    /// Check a datagram's sequence admissibility and AEAD tag without
    /// mutating any session state.
    ///
    /// A `true` result means an immediate
    /// [`receive_data`](Self::receive_data) of the same packet succeeds.
    pub fn verify_datagram(&self, data: &[u8]) -> bool {
        if !self.instate || data.len() < DATAGRAM_OVERHEAD {
            return false;
        }

        let seqno = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if !self.replay.probe(seqno) {
            return false;
        }

        match &self.incipher {
            Some(cipher) => cipher.decrypt(seqno, &data[4..]).is_ok(),
            None => false,
        }
    }

    /// Start a renegotiation: send a fresh KEX under the current keys.
    ///
    /// Permitted only once the session is established and idle.
    pub fn force_kex(&mut self) -> Result<()> {
        self.ensure_alive()?;

        if !self.outstate || self.state != HandshakeState::SecondaryKex {
            return Err(Error::Misuse("cannot force key exchange in the current state"));
        }

        self.state = HandshakeState::Kex;
        self.send_kex()
    }

    /// Destroy the session. Derived keys, the ephemeral secret and the
    /// shared-secret material are wiped as they drop.
    pub fn stop(self) {}

    /// Whether both directions run under negotiated keys.
    pub fn is_established(&self) -> bool {
        self.instate && self.outstate
    }

    /// Sequence number the next outbound record will use.
    pub fn outbound_seqno(&self) -> u32 {
        self.outseqno
    }

    /// Sequence number expected next on the inbound direction.
    pub fn next_inbound_seqno(&self) -> u32 {
        self.replay.next_seqno()
    }

    /// The cipher suite agreed during the last key exchange.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.selected_suite
    }

    /// Borrow the caller-supplied handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutably borrow the caller-supplied handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == HandshakeState::Dead {
            return Err(Error::Misuse("session is dead"));
        }
        Ok(())
    }

    /// Frame, encrypt (once the outbound direction switched) and send any
    /// record type.
    fn send_record_priv(&mut self, record_type: u8, payload: &[u8]) -> Result<()> {
        let seqno = self.outseqno;
        self.outseqno = self.outseqno.wrapping_add(1);

        let cipher = if self.outstate {
            self.outcipher.as_ref()
        } else {
            None
        };

        let frame = if self.datagram {
            record::encode_datagram(record_type, payload, seqno, cipher)?
        } else {
            record::encode_stream(record_type, payload, seqno, cipher)?
        };

        if self.handler.send_data(record_type, &frame) {
            Ok(())
        } else {
            Err(Error::Callback("send_data"))
        }
    }

    /// Send a KEX record: version, suite negotiation data, a fresh nonce
    /// and a fresh ephemeral public key. The record is kept until the
    /// signature exchange needs it.
    fn send_kex(&mut self) -> Result<()> {
        if self.mykex.is_some() {
            return Err(Error::Misuse("key exchange already in progress"));
        }

        let ephemeral = EphemeralKeyPair::generate();
        let kex = KexRecord::build(
            self.preferred_suite,
            self.enabled_suites,
            ephemeral.public_key(),
        );
        self.ephemeral = Some(ephemeral);

        let body = *kex.as_bytes();
        self.mykex = Some(kex);
        self.send_record_priv(RECORD_HANDSHAKE, &body)
    }

    /// Send a SIG record: our signature over both KEX records and the
    /// label.
    fn send_sig(&mut self) -> Result<()> {
        let (mykex, hiskex) = match (&self.mykex, &self.hiskex) {
            (Some(mine), Some(his)) => (mine, his),
            _ => {
                return Err(Error::Protocol(
                    "signature requested without a pending key exchange".into(),
                ))
            }
        };

        let transcript = sig_transcript(self.initiator, mykex, hiskex, &self.label);
        let signature = sign::sign(self.mykey, &transcript);
        self.send_record_priv(RECORD_HANDSHAKE, &signature)
    }

    /// Send an ACK record: empty, signalling that our outbound direction
    /// switched to the new keys.
    fn send_ack(&mut self) -> Result<()> {
        self.send_record_priv(RECORD_HANDSHAKE, &[])
    }

    /// Process a peer KEX record: negotiate the suite and store the
    /// record; the initiator answers with its signature.
    fn receive_kex(&mut self, data: &[u8]) -> Result<()> {
        let kex = KexRecord::parse(data)?;

        let agreed = kex.suite_mask() & self.enabled_suites;
        let selected =
            suite::select_cipher_suite(agreed, self.preferred_suite, kex.preferred_suite() & 0x0F)?;
        self.selected_suite = Some(selected);

        if self.hiskex.is_some() {
            return Err(Error::Protocol(
                "second KEX received before the first was processed".into(),
            ));
        }
        self.hiskex = Some(kex);

        if self.initiator {
            self.send_sig()?;
        }
        Ok(())
    }

    /// Process a peer SIG record: verify it, derive the key material and
    /// switch the outbound direction to the new key.
    fn receive_sig(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != SIGNATURE_LEN {
            return Err(Error::Protocol(format!(
                "invalid SIG record length {}",
                data.len()
            )));
        }

        let (mykex, hiskex) = match (&self.mykex, &self.hiskex) {
            (Some(mine), Some(his)) => (mine, his),
            _ => {
                return Err(Error::Protocol(
                    "SIG record without a pending key exchange".into(),
                ))
            }
        };

        // The peer signed from its own perspective: its KEX first, its
        // originator flag.
        let transcript = sig_transcript(!self.initiator, hiskex, mykex, &self.label);
        sign::verify(self.hiskey, &transcript, data)?;

        let peer_public = hiskex.ephemeral_public();
        let (initiator_nonce, responder_nonce) = if self.initiator {
            (mykex.nonce(), hiskex.nonce())
        } else {
            (hiskex.nonce(), mykex.nonce())
        };

        // Computing the shared secret consumes the ephemeral key.
        let ephemeral = self
            .ephemeral
            .take()
            .ok_or_else(|| Error::Protocol("no ephemeral key for this exchange".into()))?;
        let shared = ephemeral.agree(&peer_public)?;

        self.key_material = Some(kdf::expand_key_material(
            &*shared,
            &initiator_nonce,
            &responder_nonce,
            &self.label,
        )?);

        if !self.initiator {
            self.send_sig()?;
        }

        self.mykex = None;
        self.hiskex = None;

        // In a renegotiation the ACK is the last record under the old
        // outbound key.
        if self.outstate {
            self.send_ack()?;
        }

        let suite = self
            .selected_suite
            .ok_or_else(|| Error::Protocol("no cipher suite negotiated".into()))?;
        let key = self
            .key_material
            .as_ref()
            .ok_or_else(|| Error::Protocol("key material missing".into()))?;
        self.outcipher = Some(RecordCipher::new(suite, key, self.initiator)?);
        self.outseqno = 0;
        Ok(())
    }

    /// Process a peer ACK record: switch the inbound direction to the new
    /// key and wipe the key material.
    fn receive_ack(&mut self, data: &[u8]) -> Result<()> {
        if !data.is_empty() {
            return Err(Error::Protocol("invalid ACK record length".into()));
        }

        let suite = self
            .selected_suite
            .ok_or_else(|| Error::Protocol("no cipher suite negotiated".into()))?;
        let key = self
            .key_material
            .take()
            .ok_or_else(|| Error::Protocol("ACK without key material".into()))?;

        self.incipher = Some(RecordCipher::new(suite, &key, !self.initiator)?);
        self.replay.reset();
        self.instate = true;
        Ok(())
    }

    /// Drive the handshake state machine with an inbound HANDSHAKE record.
    fn receive_handshake(&mut self, data: &[u8]) -> Result<()> {
        match self.state {
            HandshakeState::SecondaryKex => {
                // The peer started a renegotiation; answer with our own
                // KEX, then treat theirs as usual.
                self.send_kex()?;
                self.receive_kex(data)?;
                self.state = HandshakeState::Sig;
                Ok(())
            }
            HandshakeState::Kex => {
                self.receive_kex(data)?;
                self.state = HandshakeState::Sig;
                Ok(())
            }
            HandshakeState::Sig => {
                self.receive_sig(data)?;

                if self.outstate {
                    self.state = HandshakeState::Ack;
                } else {
                    // First handshake: both directions switch at once and
                    // our own ACK is implicit.
                    self.outstate = true;
                    self.receive_ack(&[])?;
                    self.notify_handshake_complete()?;
                    self.state = HandshakeState::SecondaryKex;
                }
                Ok(())
            }
            HandshakeState::Ack => {
                self.receive_ack(data)?;
                self.notify_handshake_complete()?;
                self.state = HandshakeState::SecondaryKex;
                Ok(())
            }
            HandshakeState::Dead => Err(Error::Misuse("session is dead")),
        }
    }

    /// The empty HANDSHAKE record delivered to the caller is the
    /// "handshake complete" signal.
    fn notify_handshake_complete(&mut self) -> Result<()> {
        tracing::debug!(initiator = self.initiator, "handshake complete");
        if self.handler.receive_record(RECORD_HANDSHAKE, &[]) {
            Ok(())
        } else {
            Err(Error::Callback("receive_record"))
        }
    }

    /// Run a handshake record through the state machine; any failure
    /// there is fatal for the session.
    fn handle_handshake_record(&mut self, data: &[u8]) -> Result<()> {
        match self.receive_handshake(data) {
            Ok(()) => Ok(()),
            Err(err) => {
                if !matches!(err, Error::Callback(_)) {
                    tracing::warn!(error = %err, "handshake failed");
                    self.state = HandshakeState::Dead;
                }
                Err(err)
            }
        }
    }

    /// Deliver a decrypted (or plaintext handshake-phase) record.
    fn dispatch(&mut self, record_type: u8, payload: &[u8]) -> Result<()> {
        if record_type == RECORD_HANDSHAKE {
            self.handle_handshake_record(payload)
        } else if record_type < RECORD_HANDSHAKE {
            if !self.instate {
                return Err(Error::Protocol(
                    "application record received before handshake finished".into(),
                ));
            }
            if self.handler.receive_record(record_type, payload) {
                Ok(())
            } else {
                Err(Error::Callback("receive_record"))
            }
        } else {
            Err(Error::Protocol(format!(
                "invalid record type {record_type}"
            )))
        }
    }

    fn receive_data_datagram(&mut self, data: &[u8]) -> Result<()> {
        let min_len = if self.instate {
            DATAGRAM_OVERHEAD
        } else {
            DATAGRAM_HEADER_LEN
        };
        if data.len() < min_len {
            return Err(Error::Protocol(format!(
                "short packet of {} bytes",
                data.len()
            )));
        }

        let seqno = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let body = &data[4..];

        if !self.instate {
            // Before the inbound direction has keys, only strictly
            // in-order handshake records are acceptable.
            if seqno != self.replay.next_seqno() {
                return Err(Error::Protocol(format!(
                    "invalid packet seqno {seqno}, expected {}",
                    self.replay.next_seqno()
                )));
            }
            self.replay.claim_next();

            if body[0] != RECORD_HANDSHAKE {
                return Err(Error::Protocol(
                    "application record received before handshake finished".into(),
                ));
            }
            return self.handle_handshake_record(&body[1..]);
        }

        // Decrypt first: only authentic packets may move the replay
        // window.
        let plaintext = match &self.incipher {
            Some(cipher) => cipher.decrypt(seqno, body)?,
            None => return Err(Error::Protocol("inbound cipher missing".into())),
        };
        self.replay.accept(seqno)?;

        let (record_type, payload) = plaintext
            .split_first()
            .ok_or_else(|| Error::Protocol("empty record".into()))?;
        self.dispatch(*record_type, payload)
    }

    fn receive_data_stream(&mut self, data: &[u8]) -> Result<usize> {
        let mut consumed = 0;

        loop {
            consumed += self.reassembly.feed(&data[consumed..], self.instate);
            if !self.reassembly.is_complete(self.instate) {
                break;
            }
            self.process_stream_record()?;
            if consumed >= data.len() {
                break;
            }
        }

        Ok(consumed)
    }

    fn process_stream_record(&mut self) -> Result<()> {
        let frame = self.reassembly.take();
        let seqno = self.replay.claim_next();
        let body = &frame[2..];

        if self.instate {
            let plaintext = match &self.incipher {
                Some(cipher) => cipher.decrypt(seqno, body)?,
                None => return Err(Error::Protocol("inbound cipher missing".into())),
            };
            let (record_type, payload) = plaintext
                .split_first()
                .ok_or_else(|| Error::Protocol("empty record".into()))?;
            self.dispatch(*record_type, payload)
        } else {
            let (record_type, payload) = body
                .split_first()
                .ok_or_else(|| Error::Protocol("empty record".into()))?;
            self.dispatch(*record_type, payload)
        }
    }
}
