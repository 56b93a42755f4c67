//! Reconciliation coordinator reacting to product catalog changes.

use std::sync::Arc;
use std::time::Instant;

use cart::{
    CartConsistencyEngine, CartId, CartView, Discount, Money, ProductCatalog, ProductChange,
    ProductId,
};
use cart_store::CartStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::report::{SweepKind, SweepReport};

#[derive(Debug, Clone, Copy)]
enum Action {
    Reprice {
        special_price: Money,
        discount: Discount,
    },
    Evict,
}

impl Action {
    fn kind(&self) -> SweepKind {
        match self {
            Action::Reprice { .. } => SweepKind::Reprice,
            Action::Evict => SweepKind::Removal,
        }
    }
}

/// Propagates price, discount and removal changes into every cart holding
/// the affected product.
///
/// A sweep visits the carts one at a time and reconciles each under that
/// cart's lock, so it interleaves safely with direct cart operations. The
/// sweep as a whole is not atomic: while it runs, a reader can see one cart
/// already updated and another still carrying the old price. A cart that
/// fails is logged, recorded in the [`SweepReport`] and skipped.
///
/// The listener started by [`Self::spawn`] can fall behind a bounded
/// channel. Notifications skipped while it lags are lost, not replayed: carts
/// holding those products keep the old snapshot until the product changes
/// again or the line is adjusted through [`CartConsistencyEngine::adjust_quantity`].
/// Lost notifications are counted in `reconciliation_notifications_missed_total`.
pub struct ReconciliationCoordinator<S, C>
where
    S: CartStore,
    C: ProductCatalog,
{
    engine: Arc<CartConsistencyEngine<S, C>>,
}

impl<S, C> ReconciliationCoordinator<S, C>
where
    S: CartStore + 'static,
    C: ProductCatalog + 'static,
{
    /// Creates a coordinator driving the given engine.
    pub fn new(engine: Arc<CartConsistencyEngine<S, C>>) -> Self {
        Self { engine }
    }

    /// Returns the engine used for per-cart updates.
    pub fn engine(&self) -> &Arc<CartConsistencyEngine<S, C>> {
        &self.engine
    }

    /// Re-prices the product's line in every cart holding it.
    ///
    /// Each cart's total moves by `(new_special_price - old_snapshot) * quantity`.
    #[tracing::instrument(skip(self))]
    pub async fn on_product_price_or_discount_changed(
        &self,
        product_id: &ProductId,
        special_price: Money,
        discount: Discount,
    ) -> Result<SweepReport> {
        self.sweep(
            product_id,
            Action::Reprice {
                special_price,
                discount,
            },
        )
        .await
    }

    /// Deletes the product's line from every cart holding it, as if
    /// `remove_item` had been called on each.
    #[tracing::instrument(skip(self))]
    pub async fn on_product_removed(&self, product_id: &ProductId) -> Result<SweepReport> {
        self.sweep(product_id, Action::Evict).await
    }

    /// Dispatches a catalog notification.
    ///
    /// Stock changes touch no cart and yield `None`.
    pub async fn handle(&self, change: &ProductChange) -> Result<Option<SweepReport>> {
        match change {
            ProductChange::PricingChanged {
                product_id,
                special_price,
                discount,
            } => self
                .on_product_price_or_discount_changed(product_id, *special_price, *discount)
                .await
                .map(Some),
            ProductChange::Removed { product_id } => {
                self.on_product_removed(product_id).await.map(Some)
            }
            ProductChange::StockChanged { product_id, stock } => {
                tracing::debug!(%product_id, stock, "stock change needs no cart update");
                Ok(None)
            }
        }
    }

    /// Runs a listener task that handles every notification from `changes`
    /// until the channel closes.
    pub fn spawn(
        self: Arc<Self>,
        mut changes: broadcast::Receiver<ProductChange>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if let Err(e) = self.handle(&change).await {
                            tracing::error!(
                                product_id = %change.product_id(),
                                kind = change.kind(),
                                error = %e,
                                "reconciliation sweep failed"
                            );
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Skipped changes are gone; their carts stay stale
                        metrics::counter!("reconciliation_notifications_missed_total")
                            .increment(missed);
                        tracing::warn!(
                            missed,
                            "reconciliation listener lagged behind catalog, skipped changes are lost"
                        );
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("catalog change channel closed, listener stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Subscribes to the engine's catalog and spawns the listener.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let changes = self.engine.catalog().subscribe();
        Arc::clone(self).spawn(changes)
    }

    async fn sweep(&self, product_id: &ProductId, action: Action) -> Result<SweepReport> {
        let kind = action.kind();
        let started = Instant::now();
        let carts = self.engine.store().find_carts_by_product(product_id).await?;
        let mut report = SweepReport::new(product_id.clone(), kind);

        for cart in carts {
            match self.reconcile_cart(cart.id, product_id, action).await {
                Ok(Some(_)) => report.reconciled += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    metrics::counter!("reconciliation_cart_failures_total").increment(1);
                    tracing::warn!(cart_id = %cart.id, error = %e, "cart reconciliation failed, skipping");
                    report.failed.push((cart.id, e.to_string()));
                }
            }
        }

        metrics::counter!("reconciliation_sweeps_total", "kind" => kind.as_str()).increment(1);
        metrics::histogram!("reconciliation_sweep_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            %product_id,
            %kind,
            reconciled = report.reconciled,
            skipped = report.skipped,
            failed = report.failed.len(),
            "reconciliation sweep finished"
        );

        Ok(report)
    }

    async fn reconcile_cart(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        action: Action,
    ) -> cart::Result<Option<CartView>> {
        match action {
            Action::Reprice {
                special_price,
                discount,
            } => {
                self.engine
                    .reprice_item(cart_id, product_id, special_price, discount)
                    .await
            }
            Action::Evict => self.engine.evict_product(cart_id, product_id).await,
        }
    }
}
