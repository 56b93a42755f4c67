use cart::{CartId, ProductId};
use serde::Serialize;

/// What a sweep does to each cart holding the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    Reprice,
    Removal,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::Reprice => "reprice",
            SweepKind::Removal => "removal",
        }
    }
}

impl std::fmt::Display for SweepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one reconciliation sweep over the carts holding a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub product_id: ProductId,
    pub kind: SweepKind,
    /// Carts updated (or already up to date).
    pub reconciled: usize,
    /// Carts that no longer held the product once their lock was granted.
    pub skipped: usize,
    /// Carts that could not be reconciled, with the reason.
    pub failed: Vec<(CartId, String)>,
}

impl SweepReport {
    pub fn new(product_id: ProductId, kind: SweepKind) -> Self {
        Self {
            product_id,
            kind,
            reconciled: 0,
            skipped: 0,
            failed: Vec::new(),
        }
    }

    /// Number of carts the sweep visited.
    pub fn visited(&self) -> usize {
        self.reconciled + self.skipped + self.failed.len()
    }

    /// Returns true if no cart failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
