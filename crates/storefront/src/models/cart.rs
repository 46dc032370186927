//! Shopping cart and the incremental delta pushed to the backend.
//!
//! Every cart mutation goes through [`Cart`], which keeps the invariants in
//! one place: quantities never drop below one, never exceed a known positive
//! stock level, and totals are summed in decimal.

use myrmeco_core::{PlantId, Price, Quantity};
use serde::{Deserialize, Serialize};

/// Identity of a cart line: one plant in one size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub id: PlantId,
    pub size: String,
}

impl LineKey {
    #[must_use]
    pub fn new(id: PlantId, size: impl Into<String>) -> Self {
        Self {
            id,
            size: size.into(),
        }
    }
}

/// One line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub plant_id: PlantId,
    pub size: String,
    pub name: String,
    pub latin_name: String,
    pub unit_price: Price,
    pub image_url: String,
    pub quantity: Quantity,
    /// Last known stock; `None` until the backend has told us.
    #[serde(default)]
    pub stock: Option<u32>,
}

impl CartLine {
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::new(self.plant_id, self.size.clone())
    }

    fn matches(&self, id: PlantId, size: &str) -> bool {
        self.plant_id == id && self.size == size
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }

    /// Stock is known to be zero.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.stock == Some(0)
    }

    /// Quantity already equals the known stock, so "+" is pointless.
    #[must_use]
    pub fn at_stock_limit(&self) -> bool {
        self.stock
            .is_some_and(|s| s > 0 && self.quantity.get() >= s)
    }

    fn set_quantity(&mut self, quantity: Quantity) {
        self.quantity = quantity.capped_at(self.stock.unwrap_or(0));
    }
}

/// A visitor's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Add a line, merging with an existing line for the same plant and size.
    pub fn add(&mut self, mut line: CartLine) {
        if let Some(existing) = self
            .lines
            .iter_mut()
            .find(|l| l.matches(line.plant_id, &line.size))
        {
            if line.stock.is_some() {
                existing.stock = line.stock;
            }
            let merged = existing.quantity.saturating_add(line.quantity);
            existing.set_quantity(merged);
        } else {
            let quantity = line.quantity;
            line.set_quantity(quantity);
            self.lines.push(line);
        }
    }

    /// Set a line's quantity. Values below one clamp to one.
    ///
    /// Returns `false` if no such line exists.
    pub fn update_quantity(&mut self, id: PlantId, size: &str, quantity: i64) -> bool {
        self.with_line(id, size, |line| line.set_quantity(Quantity::from_i64(quantity)))
    }

    /// Add one to a line.
    pub fn increase(&mut self, id: PlantId, size: &str) -> bool {
        self.with_line(id, size, |line| line.set_quantity(line.quantity.increment()))
    }

    /// Take one from a line, stopping at one.
    pub fn decrease(&mut self, id: PlantId, size: &str) -> bool {
        self.with_line(id, size, |line| line.set_quantity(line.quantity.decrement()))
    }

    /// Remove a line. Returns `false` if it wasn't there.
    pub fn remove(&mut self, id: PlantId, size: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| !l.matches(id, size));
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of line totals.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Sum of quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity.get())).sum()
    }

    /// Any line known to be out of stock.
    #[must_use]
    pub fn has_sold_out(&self) -> bool {
        self.lines.iter().any(CartLine::is_sold_out)
    }

    /// Record stock levels and clamp quantities to them.
    pub fn apply_stock<I>(&mut self, levels: I)
    where
        I: IntoIterator<Item = (LineKey, u32)>,
    {
        for (key, stock) in levels {
            self.with_line(key.id, &key.size, |line| {
                line.stock = Some(stock);
                let quantity = line.quantity;
                line.set_quantity(quantity);
            });
        }
    }

    /// Fold another cart into this one (guest cart into user cart on login).
    pub fn merge_from(&mut self, other: Self) {
        for line in other.lines {
            self.add(line);
        }
    }

    fn with_line(&mut self, id: PlantId, size: &str, f: impl FnOnce(&mut CartLine)) -> bool {
        match self.lines.iter_mut().find(|l| l.matches(id, size)) {
            Some(line) => {
                f(line);
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Delta
// =============================================================================

/// A line that was added or whose quantity changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaLine {
    pub id: PlantId,
    pub size: String,
    pub quantity: Quantity,
}

impl DeltaLine {
    fn is_for(&self, key: &LineKey) -> bool {
        self.id == key.id && self.size == key.size
    }
}

/// Incremental cart change, in the shape `/api/cart/sync-redis` expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartDelta {
    #[serde(rename = "addedOrUpdatedItems")]
    pub added_or_updated: Vec<DeltaLine>,
    #[serde(rename = "deletedItems")]
    pub deleted: Vec<LineKey>,
}

impl CartDelta {
    /// Lines new in `current` or with a different quantity, plus lines gone
    /// from `previous`.
    #[must_use]
    pub fn between(previous: &Cart, current: &Cart) -> Self {
        let added_or_updated = current
            .lines
            .iter()
            .filter(|cur| {
                previous
                    .lines
                    .iter()
                    .find(|prev| prev.matches(cur.plant_id, &cur.size))
                    .is_none_or(|prev| prev.quantity != cur.quantity)
            })
            .map(|l| DeltaLine {
                id: l.plant_id,
                size: l.size.clone(),
                quantity: l.quantity,
            })
            .collect();

        let deleted = previous
            .lines
            .iter()
            .filter(|prev| {
                !current
                    .lines
                    .iter()
                    .any(|cur| cur.matches(prev.plant_id, &prev.size))
            })
            .map(CartLine::key)
            .collect();

        Self {
            added_or_updated,
            deleted,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_or_updated.is_empty() && self.deleted.is_empty()
    }

    /// Fold a later delta into this one. The later change for a line wins.
    pub fn merge(&mut self, later: Self) {
        for line in later.added_or_updated {
            let key = LineKey::new(line.id, line.size.clone());
            self.deleted.retain(|d| *d != key);
            match self.added_or_updated.iter_mut().find(|l| l.is_for(&key)) {
                Some(existing) => existing.quantity = line.quantity,
                None => self.added_or_updated.push(line),
            }
        }
        for key in later.deleted {
            self.added_or_updated.retain(|l| !l.is_for(&key));
            if !self.deleted.contains(&key) {
                self.deleted.push(key);
            }
        }
    }
}
