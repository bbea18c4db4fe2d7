use crate::aggregate::AggregateHandler;
use crate::forget::ForgetHandler;
use crate::handler::ContentHandler;
use crate::post::PostHandler;
use crate::store::StoreHandler;
use crate::vm::VmHandler;
use costs::PricingSchedule;
use models::MessageType;
use std::collections::HashMap;
use std::sync::Arc;
use storage::ContentFetcher;

/// Builds the `MessageType` -> handler dispatch table the worker pool and
/// commit coordinator use to process a committed message (spec §4.4).
pub struct ContentRegistry {
    handlers: HashMap<MessageType, Arc<dyn ContentHandler>>,
}

/// Configuration for the balance-oracle special case in the POST handler
/// (spec §4.6, §4.13).
pub struct BalancesOracleConfig {
    pub post_type: String,
    pub addresses: Vec<String>,
}

/// Per-deployment overrides for the handler policy constants (spec §9.2's
/// `--dirty-threshold`/`--max-file-size`); `Default` reproduces the values
/// each handler hardcoded before these became configurable.
pub struct ContentLimits {
    pub dirty_threshold: i64,
    pub max_file_size: i64,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            dirty_threshold: crate::aggregate::DEFAULT_DIRTY_THRESHOLD,
            max_file_size: crate::store::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ContentRegistry {
    pub fn new(
        fetcher: Arc<ContentFetcher>,
        schedule: PricingSchedule,
        balances_oracle: BalancesOracleConfig,
        limits: ContentLimits,
    ) -> Self {
        let vm_handler: Arc<dyn ContentHandler> = Arc::new(VmHandler::new(schedule.clone()));

        let mut handlers: HashMap<MessageType, Arc<dyn ContentHandler>> = HashMap::new();
        handlers.insert(
            MessageType::Aggregate,
            Arc::new(AggregateHandler::new(limits.dirty_threshold)),
        );
        handlers.insert(
            MessageType::Post,
            Arc::new(PostHandler {
                balances_post_type: balances_oracle.post_type,
                balances_addresses: balances_oracle.addresses,
            }),
        );
        handlers.insert(
            MessageType::Store,
            Arc::new(StoreHandler::new(fetcher, limits.max_file_size, schedule)),
        );
        handlers.insert(MessageType::Program, vm_handler.clone());
        handlers.insert(MessageType::Instance, vm_handler);

        let forget_handler: Arc<dyn ContentHandler> = Arc::new(ForgetHandler::new(handlers.clone()));
        handlers.insert(MessageType::Forget, forget_handler);

        Self { handlers }
    }

    pub fn get(&self, message_type: MessageType) -> Arc<dyn ContentHandler> {
        self.handlers
            .get(&message_type)
            .cloned()
            .unwrap_or_else(|| panic!("no content handler registered for {message_type:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::FileSystemEngine;

    #[tokio::test]
    async fn every_message_type_has_a_handler() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(FileSystemEngine::new(dir.path()).await.unwrap());
        let fetcher = Arc::new(ContentFetcher::new(local, None, None));
        let registry = ContentRegistry::new(
            fetcher,
            costs::default_schedule(),
            BalancesOracleConfig {
                post_type: "balances".to_string(),
                addresses: vec![],
            },
            ContentLimits::default(),
        );

        for mt in [
            MessageType::Aggregate,
            MessageType::Post,
            MessageType::Store,
            MessageType::Program,
            MessageType::Instance,
            MessageType::Forget,
        ] {
            let _ = registry.get(mt);
        }
    }
}
