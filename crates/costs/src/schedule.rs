use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

/// The product a cost is being computed for. The active pricing model is
/// keyed by this tag, mirroring the on-chain `pricing` aggregate's
/// structure (spec §3.8); GPU/confidential compute tiers are out of scope
/// here (see DESIGN.md) and fold into `Program`/`Instance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductPriceType {
    Storage,
    Program,
    ProgramPersistent,
    Instance,
}

/// Per-unit rates for one product. `holding` is the one-time token amount
/// held for the item's lifetime; `payg` is the per-second pay-as-you-go
/// rate an account is debited while the item is live. Either or both may
/// apply depending on the account's chosen payment method -- this node
/// only implements the `holding` tier (spec §9's Open Question decision).
#[derive(Debug, Clone, Copy)]
pub struct Rate {
    pub holding: Decimal,
    pub payg_per_second: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct ComputeUnit {
    pub vcpus: u32,
    pub memory_mib: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ProductPrice {
    pub storage: Rate,
    pub compute_unit: Option<Rate>,
    pub compute_unit_shape: Option<ComputeUnit>,
}

/// The active pricing model: one `ProductPrice` per `ProductPriceType`.
/// Loaded at startup from the `pricing` aggregate (or, absent one, the
/// seeded `default_schedule`) and held for the lifetime of the cost gate.
#[derive(Debug, Clone)]
pub struct PricingSchedule {
    prices: BTreeMap<ProductPriceType, ProductPrice>,
}

impl PricingSchedule {
    pub fn new(prices: BTreeMap<ProductPriceType, ProductPrice>) -> Self {
        Self { prices }
    }

    pub fn price(&self, product: ProductPriceType) -> Option<&ProductPrice> {
        self.prices.get(&product)
    }
}

/// A single seeded default schedule, carrying the values the originating
/// node ships as `DEFAULT_PRICE_AGGREGATE` for its non-GPU product types.
/// See DESIGN.md for why this node doesn't model the full historical
/// pricing-aggregate feed.
pub fn default_schedule() -> PricingSchedule {
    let mut prices = BTreeMap::new();

    prices.insert(
        ProductPriceType::Program,
        ProductPrice {
            storage: Rate {
                holding: dec!(0.05),
                payg_per_second: dec!(0.000000977) / Decimal::from(crate::constants::HOUR),
            },
            compute_unit: Some(Rate {
                holding: dec!(200),
                payg_per_second: dec!(0.011) / Decimal::from(crate::constants::HOUR),
            }),
            compute_unit_shape: Some(ComputeUnit {
                vcpus: 1,
                memory_mib: 2048,
            }),
        },
    );

    prices.insert(
        ProductPriceType::ProgramPersistent,
        ProductPrice {
            storage: Rate {
                holding: dec!(0.05),
                payg_per_second: dec!(0.000000977) / Decimal::from(crate::constants::HOUR),
            },
            compute_unit: Some(Rate {
                holding: dec!(2000),
                payg_per_second: dec!(0.11) / Decimal::from(crate::constants::HOUR),
            }),
            compute_unit_shape: Some(ComputeUnit {
                vcpus: 1,
                memory_mib: 2048,
            }),
        },
    );

    prices.insert(
        ProductPriceType::Instance,
        ProductPrice {
            storage: Rate {
                holding: dec!(0.05),
                payg_per_second: dec!(0.000000977) / Decimal::from(crate::constants::HOUR),
            },
            compute_unit: Some(Rate {
                holding: dec!(1000),
                payg_per_second: dec!(0.055) / Decimal::from(crate::constants::HOUR),
            }),
            compute_unit_shape: Some(ComputeUnit {
                vcpus: 1,
                memory_mib: 2048,
            }),
        },
    );

    prices.insert(
        ProductPriceType::Storage,
        ProductPrice {
            storage: Rate {
                holding: dec!(0.333333333),
                payg_per_second: Decimal::ZERO,
            },
            compute_unit: None,
            compute_unit_shape: None,
        },
    );

    PricingSchedule::new(prices)
}
