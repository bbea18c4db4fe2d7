use models::{Chain, RawMessage};

/// Builds the canonical byte string a sender signs over. Mirrors the
/// originating node's `get_verification_buffer`: a stable, deterministic
/// join of the envelope fields that determine message identity, excluding
/// the signature itself.
pub fn verification_buffer(msg: &RawMessage) -> Vec<u8> {
    format!(
        "{}\n{}\n{}\n{}",
        chain_tag(&msg.chain),
        msg.sender,
        msg.message_type.as_str(),
        msg.item_hash,
    )
    .into_bytes()
}

fn chain_tag(chain: &Chain) -> &str {
    chain.as_str()
}
