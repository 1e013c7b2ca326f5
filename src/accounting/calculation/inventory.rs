use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::accounting::ShortfallPolicy;

/// An open purchase parcel. Its total cost is fixed at creation; consuming the
/// lot apportions that cost to the units taken.
#[derive(Clone, Debug, PartialEq)]
pub struct Lot {
    acquired_date: NaiveDate,
    units: Decimal,
    remaining_units: Decimal,
    total_cost: Decimal,
    apportioned_cost: Decimal,
}

impl Lot {
    pub fn new(acquired_date: NaiveDate, units: Decimal, total_cost: Decimal) -> Lot {
        Lot {
            acquired_date,
            units,
            remaining_units: units,
            total_cost,
            apportioned_cost: Decimal::ZERO,
        }
    }

    pub fn acquired_date(&self) -> NaiveDate {
        self.acquired_date
    }

    pub fn units(&self) -> Decimal {
        self.units
    }

    pub fn remaining_units(&self) -> Decimal {
        self.remaining_units
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    /// Cost still attributable to the units left in the lot.
    pub fn remaining_cost(&self) -> Decimal {
        self.total_cost - self.apportioned_cost
    }

    fn is_drained(&self) -> bool {
        self.remaining_units <= Decimal::ZERO
    }

    // the take that drains the lot absorbs whatever cost is left, so the
    // apportioned costs always sum to total_cost
    fn take(&mut self, units: Decimal) -> Decimal {
        let cost = if units >= self.remaining_units {
            self.remaining_cost()
        } else {
            // the fraction is below one, so the product stays within range
            self.remaining_cost() * (units / self.remaining_units)
        };
        self.remaining_units -= units;
        self.apportioned_cost += cost;
        cost
    }
}

/// Units taken from one lot while satisfying a sale.
#[derive(Clone, Debug, PartialEq)]
pub struct LotTake {
    pub acquired_date: NaiveDate,
    pub units: Decimal,
    pub cost: Decimal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Consumption {
    pub takes: Vec<LotTake>,
    pub shortfall: Decimal,
}

impl Consumption {
    pub fn is_complete(&self) -> bool {
        self.shortfall <= Decimal::ZERO
    }

    pub fn units_taken(&self) -> Decimal {
        self.takes
            .iter()
            .fold(Decimal::ZERO, |acc, t| acc.saturating_add(t.units))
    }

    pub fn cost(&self) -> Decimal {
        self.takes
            .iter()
            .fold(Decimal::ZERO, |acc, t| acc.saturating_add(t.cost))
    }
}

/// FIFO queue of open lots for a single symbol.
#[derive(Debug, Default)]
pub struct Inventory {
    layers: VecDeque<Lot>,
}

impl Inventory {
    pub fn new() -> Inventory {
        Inventory {
            layers: VecDeque::new(),
        }
    }

    pub fn deposit(&mut self, lot: Lot) {
        self.layers.push_back(lot);
    }

    /// Open units across all lots, capped at `Decimal::MAX`.
    pub fn available(&self) -> Decimal {
        self.layers
            .iter()
            .fold(Decimal::ZERO, |acc, l| acc.saturating_add(l.remaining_units))
    }

    pub fn withdraw(
        &mut self,
        amount_to_withdraw: Decimal,
        policy: ShortfallPolicy,
    ) -> Consumption {
        let available = self.available();
        if amount_to_withdraw > available && policy == ShortfallPolicy::Rollback {
            return Consumption {
                takes: Vec::new(),
                shortfall: amount_to_withdraw - available,
            };
        }

        let mut remaining = amount_to_withdraw;
        let mut takes = Vec::new();

        // withdraw layer by layer, oldest first
        while remaining > Decimal::ZERO {
            let layer = match self.layers.front_mut() {
                Some(layer) => layer,
                None => break,
            };

            let units = remaining.min(layer.remaining_units);
            let cost = layer.take(units);
            takes.push(LotTake {
                acquired_date: layer.acquired_date,
                units,
                cost,
            });

            if layer.is_drained() {
                self.layers.pop_front();
            }
            remaining -= units;
        }

        Consumption {
            takes,
            shortfall: remaining.max(Decimal::ZERO),
        }
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.layers.iter()
    }
}

/// Open lots for every symbol in one processing run.
#[derive(Debug, Default)]
pub struct LotBook {
    inventories: HashMap<String, Inventory>,
    shortfall_policy: ShortfallPolicy,
}

impl LotBook {
    pub fn new(shortfall_policy: ShortfallPolicy) -> LotBook {
        LotBook {
            inventories: HashMap::new(),
            shortfall_policy,
        }
    }

    /// Appends a lot to the tail of the symbol's queue. Callers add lots in
    /// acquisition order.
    pub fn add_lot(&mut self, symbol: &str, lot: Lot) {
        self.inventories
            .entry(symbol.to_string())
            .or_insert_with(Inventory::new)
            .deposit(lot);
    }

    pub fn consume(&mut self, symbol: &str, units_requested: Decimal) -> Consumption {
        match self.inventories.get_mut(symbol) {
            Some(inventory) => inventory.withdraw(units_requested, self.shortfall_policy),
            None => Consumption {
                takes: Vec::new(),
                shortfall: units_requested,
            },
        }
    }

    pub fn open_units(&self, symbol: &str) -> Decimal {
        self.inventories
            .get(symbol)
            .map(Inventory::available)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn open_lots(&self, symbol: &str) -> Vec<Lot> {
        self.inventories
            .get(symbol)
            .map(|i| i.lots().cloned().collect())
            .unwrap_or_default()
    }

    /// Symbols that still hold open units, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self
            .inventories
            .iter()
            .filter(|(_, inventory)| inventory.available() > Decimal::ZERO)
            .map(|(symbol, _)| symbol.as_str())
            .collect();
        symbols.sort_unstable();
        symbols
    }
}
