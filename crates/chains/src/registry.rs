use crate::canonical::verification_buffer;
use crate::verifier::SignatureVerifier;
use models::{Chain, MessageOrigin, RawMessage};
use std::sync::Arc;

/// Dispatches signature verification by `chain` tag. Registration mirrors
/// the task-executor registry elsewhere in this codebase: a builder-style
/// `register` call per chain, with registering the same chain twice a
/// programming error caught at startup rather than silently overwritten.
#[derive(Default)]
pub struct VerifierRegistry(Vec<Arc<dyn SignatureVerifier>>);

impl VerifierRegistry {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn register<V: SignatureVerifier>(mut self, verifier: V) -> Self {
        let chain = verifier.chain();
        if self.find(&chain).is_some() {
            panic!("a verifier for {chain:?} is already registered");
        }
        self.0.push(Arc::new(verifier));
        self
    }

    fn find(&self, chain: &Chain) -> Option<&Arc<dyn SignatureVerifier>> {
        self.0.iter().find(|v| &v.chain() == chain)
    }

    /// Verifies `msg`'s signature against its claimed chain. Returns `true`
    /// unconditionally for trusted origins (spec §4.2): on-chain events are
    /// authenticated by the chain itself and carry no signature to check.
    pub fn verify(&self, msg: &RawMessage, origin: MessageOrigin) -> VerifyOutcome {
        if origin.is_trusted() {
            return VerifyOutcome::Skipped;
        }
        let Some(verifier) = self.find(&msg.chain) else {
            return VerifyOutcome::UnknownChain;
        };
        let canonical = verification_buffer(msg);
        if verifier.verify(msg, &canonical) {
            VerifyOutcome::Valid
        } else {
            VerifyOutcome::Invalid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    Invalid,
    Skipped,
    UnknownChain,
}

impl VerifyOutcome {
    pub fn is_acceptable(&self) -> bool {
        matches!(self, VerifyOutcome::Valid | VerifyOutcome::Skipped)
    }
}
