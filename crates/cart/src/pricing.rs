//! Special price computation.

use common::Money;
use serde::{Deserialize, Serialize};

const FULL_DISCOUNT_BP: u32 = 10_000;

/// A flat per-item discount, held in basis points (1/100 of a percent).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Discount(u32);

impl Discount {
    /// No discount.
    pub const NONE: Discount = Discount(0);

    /// Creates a discount from a whole percentage.
    pub const fn percent(percent: u32) -> Self {
        Self(percent.saturating_mul(100))
    }

    /// Creates a discount from basis points.
    pub const fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    pub const fn basis_points(&self) -> u32 {
        self.0
    }

    /// Returns true if the discount is between 0% and 100% inclusive.
    pub fn is_valid(&self) -> bool {
        self.0 <= FULL_DISCOUNT_BP
    }
}

impl std::fmt::Display for Discount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Computes the special price: `price` reduced by `discount`.
///
/// The discounted amount is rounded half up to the cent. The result is never
/// negative, also for discounts above 100%.
pub fn special_price(price: Money, discount: Discount) -> Money {
    let cents = i128::from(price.cents());
    let bp = i128::from(discount.basis_points().min(FULL_DISCOUNT_BP));
    let off = (cents * bp + i128::from(FULL_DISCOUNT_BP / 2)).div_euclid(i128::from(FULL_DISCOUNT_BP));
    let special = (cents - off).max(0);

    Money::from_cents(i64::try_from(special).unwrap_or(i64::MAX))
}
