use flow_core::Buffer;

/// Outcome of one [`Tunnel::handshake`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeAction {
    /// The handshake is complete; any remaining ciphertext must still be
    /// drained and sent.
    Success,
    /// The engine needs ciphertext I/O before it can advance: drain its
    /// output queue first, and if that is empty feed it more input.
    WantIo,
    /// The handshake failed permanently.
    Error,
}

/// The TLS record-layer engine consumed by a TLS flow stage.
///
/// The engine is synchronous and single-threaded; the flow stage is the sole
/// driver of its progress. It exposes four byte queues (plaintext in/out,
/// ciphertext in/out) and a handshake driver.
pub trait Tunnel {
    /// Sets the SNI and certificate-validation name. Must precede the
    /// handshake.
    fn set_domain(&mut self, host: &str);

    /// Advances the handshake using whatever ciphertext is already queued,
    /// producing any required output into the ciphertext-out queue.
    fn handshake(&mut self) -> HandshakeAction;

    /// Drains pending outbound ciphertext. An empty buffer means nothing to
    /// send right now.
    fn read_ciphertext(&mut self) -> Buffer;

    /// Feeds inbound ciphertext into the engine.
    fn write_ciphertext(&mut self, buffer: Buffer);

    /// Whether decrypted plaintext is ready to read.
    fn has_plaintext(&self) -> bool;

    /// Drains decrypted plaintext.
    fn read_plaintext(&mut self) -> Buffer;

    /// Queues outbound plaintext to be ciphered.
    fn write_plaintext(&mut self, buffer: Buffer);

    /// Whether the engine cannot make further progress without more inbound
    /// ciphertext.
    fn need_cipher_input(&self) -> bool;

    /// Whether all queued plaintext has been encrypted and its ciphertext
    /// drained by [`read_ciphertext`](Self::read_ciphertext).
    fn finished_writing_ciphertext(&self) -> bool;

    /// Whether the engine is in a permanent failure state.
    fn errored(&self) -> bool;
}
