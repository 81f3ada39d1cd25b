//! Menu catalogue entries.

use common::{MenuId, StoreId};
use serde::{Deserialize, Serialize};

use crate::order::{Money, OrderLine};

/// A menu item sold by a store. Its price is the only price checkout trusts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,
    pub store_id: StoreId,
    pub name: String,
    pub price: Money,
}

impl Menu {
    pub fn new(id: MenuId, store_id: StoreId, name: impl Into<String>, price: Money) -> Self {
        Self {
            id,
            store_id,
            name: name.into(),
            price,
        }
    }

    /// Builds an order line priced from this entry.
    pub fn line(&self, quantity: u32) -> OrderLine {
        OrderLine::new(self.id, self.name.clone(), self.price, quantity)
    }
}
