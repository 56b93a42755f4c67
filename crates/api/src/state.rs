use std::sync::Arc;

use cart::{CartConsistencyEngine, EngineConfig, InMemoryProductCatalog};
use cart_store::CartStore;
use reconciliation::ReconciliationCoordinator;

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CartStore> {
    pub engine: Arc<CartConsistencyEngine<S, InMemoryProductCatalog>>,
    pub catalog: InMemoryProductCatalog,
    pub coordinator: Arc<ReconciliationCoordinator<S, InMemoryProductCatalog>>,
}

/// Wires the engine, catalog and reconciliation coordinator around a cart store.
///
/// The reconciliation listener is not started here; call
/// [`ReconciliationCoordinator::spawn_listener`] on `coordinator`.
pub fn create_default_state<S: CartStore + 'static>(store: S, config: &Config) -> Arc<AppState<S>> {
    let catalog = InMemoryProductCatalog::new();
    let engine = Arc::new(CartConsistencyEngine::with_config(
        store,
        catalog.clone(),
        EngineConfig::default().with_lock_timeout(config.lock_timeout),
    ));
    let coordinator = Arc::new(ReconciliationCoordinator::new(engine.clone()));

    Arc::new(AppState {
        engine,
        catalog,
        coordinator,
    })
}
