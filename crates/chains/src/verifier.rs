use models::{Chain, RawMessage};

/// One chain's signature scheme. Implementations receive the canonical form
/// (see `canonical::verification_buffer`) and the envelope's claimed
/// signature, and report whether it's valid for `msg.sender`.
pub trait SignatureVerifier: Send + Sync + 'static {
    fn chain(&self) -> Chain;

    fn verify(&self, msg: &RawMessage, canonical: &[u8]) -> bool;
}

/// Always accepts. Used for the `Test` chain tag so integration tests and
/// fixtures can submit messages without constructing a real signature.
pub struct TestVerifier;

impl SignatureVerifier for TestVerifier {
    fn chain(&self) -> Chain {
        Chain::Test
    }

    fn verify(&self, _msg: &RawMessage, _canonical: &[u8]) -> bool {
        true
    }
}

/// A placeholder Ethereum verifier: checks that the signature is present
/// and is the correct length for a recoverable ECDSA signature (65 bytes,
/// hex-encoded with an optional `0x` prefix), but does not perform secp256k1
/// recovery. Real signature recovery is explicitly out of scope (see
/// DESIGN.md); this exists so the dispatch and error-classification paths
/// for the Ethereum chain tag are exercised end to end.
pub struct EthStubVerifier;

impl SignatureVerifier for EthStubVerifier {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    fn verify(&self, msg: &RawMessage, _canonical: &[u8]) -> bool {
        let Some(sig) = msg.signature.as_deref() else {
            return false;
        };
        let hex_part = sig.strip_prefix("0x").unwrap_or(sig);
        hex_part.len() == 130 && hex_part.bytes().all(|b| b.is_ascii_hexdigit())
    }
}
