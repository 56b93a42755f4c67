//! Consistency checks between a cart row and its lines.

use std::collections::HashSet;

use cart_store::{CartId, CartItem, CartItemId, Money, ProductId};
use thiserror::Error;

/// A cart state that must never be committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("Cart {cart_id} total is {stored} but its lines sum to {expected}")]
    TotalMismatch {
        cart_id: CartId,
        stored: Money,
        expected: Money,
    },

    #[error("Cart {cart_id} holds more than one line for product {product_id}")]
    DuplicateProduct {
        cart_id: CartId,
        product_id: ProductId,
    },

    #[error("Line {item_id} of cart {cart_id} has zero quantity")]
    EmptyLine { cart_id: CartId, item_id: CartItemId },

    #[error("Line {item_id} belongs to cart {owner}, not {cart_id}")]
    ForeignLine {
        cart_id: CartId,
        item_id: CartItemId,
        owner: CartId,
    },

    #[error("Cart {0} total is negative")]
    NegativeTotal(CartId),

    #[error("Cart {0} lines sum beyond the representable range")]
    TotalOverflow(CartId),
}

/// Sum of `quantity * product_price` over the lines, or `None` on overflow.
pub fn expected_total(items: &[CartItem]) -> Option<Money> {
    items
        .iter()
        .try_fold(Money::zero(), |sum, item| sum.checked_add(item.line_total()?))
}

/// Checks a prospective cart state: the total matches the lines, is not
/// negative, and no product appears twice.
pub fn check(cart_id: CartId, total: Money, items: &[CartItem]) -> Result<(), InvariantViolation> {
    let mut products = HashSet::with_capacity(items.len());

    for item in items {
        if item.cart_id != cart_id {
            return Err(InvariantViolation::ForeignLine {
                cart_id,
                item_id: item.id,
                owner: item.cart_id,
            });
        }
        if item.quantity == 0 {
            return Err(InvariantViolation::EmptyLine {
                cart_id,
                item_id: item.id,
            });
        }
        if !products.insert(&item.product_id) {
            return Err(InvariantViolation::DuplicateProduct {
                cart_id,
                product_id: item.product_id.clone(),
            });
        }
    }

    if total.is_negative() {
        return Err(InvariantViolation::NegativeTotal(cart_id));
    }

    let expected = expected_total(items).ok_or(InvariantViolation::TotalOverflow(cart_id))?;
    if expected != total {
        return Err(InvariantViolation::TotalMismatch {
            cart_id,
            stored: total,
            expected,
        });
    }

    Ok(())
}
