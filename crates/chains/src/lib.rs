//! Signature verification dispatched by chain tag, plus the canonical-form
//! builder all verifiers check against.

pub mod canonical;
pub mod registry;
pub mod verifier;

pub use canonical::verification_buffer;
pub use registry::{VerifierRegistry, VerifyOutcome};
pub use verifier::{EthStubVerifier, SignatureVerifier, TestVerifier};
