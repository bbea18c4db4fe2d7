use models::MessageProcessingError;
use rust_decimal::Decimal;

/// Looks up an account's current balance. The `db` crate's `balances`
/// table accessor implements this; tests use a fixed map.
pub trait BalanceSource {
    fn balance_of(&self, address: &str) -> Decimal;
}

/// Checks that `address` can afford `required` tokens, returning the
/// typed rejection spec §4.4 expects when it can't. Never debits --
/// holding balances are enforced, not spent, by this node (spec §9).
pub fn check_balance(
    source: &dyn BalanceSource,
    address: &str,
    required: Decimal,
) -> Result<(), MessageProcessingError> {
    let balance = source.balance_of(address);
    if balance >= required {
        Ok(())
    } else {
        Err(MessageProcessingError::BalanceInsufficient { balance, required })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FixedBalances(HashMap<String, Decimal>);

    impl BalanceSource for FixedBalances {
        fn balance_of(&self, address: &str) -> Decimal {
            self.0.get(address).copied().unwrap_or(Decimal::ZERO)
        }
    }

    #[test]
    fn sufficient_balance_passes() {
        let source = FixedBalances(HashMap::from([("0xa".to_string(), dec!(100))]));
        assert!(check_balance(&source, "0xa", dec!(50)).is_ok());
    }

    #[test]
    fn insufficient_balance_is_rejected() {
        let source = FixedBalances(HashMap::from([("0xa".to_string(), dec!(10))]));
        let err = check_balance(&source, "0xa", dec!(50)).unwrap_err();
        assert!(matches!(err, MessageProcessingError::BalanceInsufficient { .. }));
    }

    #[test]
    fn unknown_address_has_zero_balance() {
        let source = FixedBalances(HashMap::new());
        assert!(check_balance(&source, "0xghost", dec!(0)).is_ok());
        assert!(check_balance(&source, "0xghost", dec!(1)).is_err());
    }
}
