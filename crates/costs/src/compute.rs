use crate::constants::MIB;
use crate::schedule::{PricingSchedule, ProductPriceType};
use models::content::ExecutableContent;
use models::ItemHash;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Resolves the byte size of a file an `ImmutableVolume` points at. The
/// cost gate needs this to size ref-volumes (STORE's target, PROGRAM's
/// code/runtime/data, any ref-typed extra volume); the `db` crate supplies
/// the real implementation backed by the file/pin tables.
pub trait FileSizeResolver {
    fn size_of(&self, reference: &ItemHash) -> Option<u64>;
}

/// A resolver over a fixed map, for tests and for pre-fetched batches.
pub struct StaticSizeResolver(pub HashMap<ItemHash, u64>);

impl FileSizeResolver for StaticSizeResolver {
    fn size_of(&self, reference: &ItemHash) -> Option<u64> {
        self.0.get(reference).copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CostError {
    #[error("referenced volume {0} could not be resolved to a known file")]
    UnresolvedVolume(ItemHash),
}

/// Total size, in bytes, of all volumes attached to `content`: sized
/// volumes counted directly, ref volumes (including `code`/`runtime`/`data`
/// for programs, and `rootfs.parent` for instances) resolved through
/// `resolver`. Mirrors `get_volume_size` in the originating cost service.
pub fn volume_size(
    content: &dyn ExecutableContent,
    resolver: &dyn FileSizeResolver,
) -> Result<u64, CostError> {
    let mut total = 0u64;

    for reference in content.immutable_refs() {
        let size = resolver
            .size_of(reference)
            .ok_or_else(|| CostError::UnresolvedVolume(reference.clone()))?;
        total += size;
    }

    for volume in content.volumes() {
        if let Some(bytes) = volume.declared_size_bytes() {
            total += bytes;
        }
    }

    total += content.extra_sized_bytes();

    Ok(total)
}

fn compute_units_required(content: &dyn ExecutableContent) -> u64 {
    let cpu = content.resources().vcpus as u64;
    let memory_units = (content.resources().memory + 2047) / 2048;
    cpu.max(memory_units)
}

fn product_type(content: &dyn ExecutableContent, is_instance: bool) -> ProductPriceType {
    if is_instance {
        ProductPriceType::Instance
    } else if content.is_persistent() {
        ProductPriceType::ProgramPersistent
    } else {
        ProductPriceType::Program
    }
}

/// One-time token amount to hold for the lifetime of this executable item:
/// compute-unit holding cost plus any storage beyond the per-compute-unit
/// allowance. Mirrors `compute_cost` in the originating cost service.
pub fn compute_hold_cost(
    content: &dyn ExecutableContent,
    is_instance: bool,
    resolver: &dyn FileSizeResolver,
    schedule: &PricingSchedule,
) -> Result<Decimal, CostError> {
    let product = product_type(content, is_instance);
    let price = schedule
        .price(product)
        .expect("default schedule always carries program/instance entries");
    let compute_unit = price
        .compute_unit
        .expect("program/instance prices always carry a compute_unit rate");

    let units = compute_units_required(content);
    let compute_cost = Decimal::from(units) * compute_unit.holding;

    let storage_cost = additional_storage_hold_cost(content, resolver, price.storage.holding, units)?;

    Ok(compute_cost + storage_cost)
}

fn additional_storage_hold_cost(
    content: &dyn ExecutableContent,
    resolver: &dyn FileSizeResolver,
    storage_holding_rate: Decimal,
    units: u64,
) -> Result<Decimal, CostError> {
    const INCLUDED_PER_UNIT_ON_DEMAND_GIB: u64 = 2;
    const INCLUDED_PER_UNIT_PERSISTENT_GIB: u64 = 20;

    let included_gib = if content.is_persistent() {
        INCLUDED_PER_UNIT_PERSISTENT_GIB
    } else {
        INCLUDED_PER_UNIT_ON_DEMAND_GIB
    };
    let included_bytes = included_gib * 1024 * MIB * units;

    let total = volume_size(content, resolver)?;
    let additional = total.saturating_sub(included_bytes);

    // `EXTRA_STORAGE_TOKEN_TO_HOLD = 1 / (20 MiB)`, expressed directly so we
    // don't need a second constant entangled with the storage rate table.
    let extra_token_per_byte = storage_holding_rate / Decimal::from(20 * MIB) * Decimal::from(MIB);
    Ok(Decimal::from(additional) * extra_token_per_byte / Decimal::from(MIB))
}

/// Holding cost, in tokens, for a pure STORE message: `size` bytes billed
/// at the storage product's holding rate, floored at `MIN_STORE_COST_MIB`.
pub fn compute_store_hold_cost(size_bytes: u64, schedule: &PricingSchedule) -> Decimal {
    let price = schedule
        .price(ProductPriceType::Storage)
        .expect("default schedule always carries a storage entry");
    let billable_mib = (size_bytes / MIB).max(crate::constants::MIN_STORE_COST_MIB);
    Decimal::from(billable_mib) * price.storage.holding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::default_schedule;
    use models::content::{Environment, InstanceContent, ProgramContent, Resources, RootfsVolume, Triggers};

    fn program(persistent: bool) -> ProgramContent {
        ProgramContent {
            address: "0xowner".into(),
            allow_amend: false,
            metadata: None,
            variables: None,
            environment: Environment::default(),
            resources: Resources {
                vcpus: 1,
                memory: 128,
                seconds: 30,
            },
            requirements: None,
            code: models::content::executable::CodeVolume {
                encoding: "zip".into(),
                entrypoint: "main.py".into(),
                reference: ItemHash::new("code"),
                use_latest: false,
            },
            runtime: models::content::executable::RuntimeRef {
                reference: ItemHash::new("runtime"),
                use_latest: false,
                comment: None,
            },
            data: None,
            volumes: vec![],
            on: Triggers {
                http: true,
                message: None,
                persistent,
            },
            replaces: None,
            time: 0.0,
        }
    }

    #[test]
    fn on_demand_program_holds_less_than_persistent() {
        let schedule = default_schedule();
        let resolver = StaticSizeResolver(HashMap::from([
            (ItemHash::new("code"), MIB),
            (ItemHash::new("runtime"), MIB),
        ]));

        let on_demand = program(false);
        let persistent = program(true);

        let on_demand_cost = compute_hold_cost(&on_demand, false, &resolver, &schedule).unwrap();
        let persistent_cost = compute_hold_cost(&persistent, false, &resolver, &schedule).unwrap();

        assert!(persistent_cost > on_demand_cost);
    }

    #[test]
    fn unresolved_volume_is_an_error() {
        let schedule = default_schedule();
        let resolver = StaticSizeResolver(HashMap::new());
        let content = program(false);
        let err = compute_hold_cost(&content, false, &resolver, &schedule).unwrap_err();
        assert!(matches!(err, CostError::UnresolvedVolume(_)));
    }

    #[test]
    fn store_cost_is_floored_at_minimum_mib() {
        let schedule = default_schedule();
        let tiny = compute_store_hold_cost(1024, &schedule);
        let at_floor = compute_store_hold_cost(crate::constants::MIN_STORE_COST_MIB * MIB, &schedule);
        assert_eq!(tiny, at_floor);
    }

    #[allow(dead_code)]
    fn instance_uses_rootfs(content: &InstanceContent) -> &RootfsVolume {
        &content.rootfs
    }
}
