use crate::id::ItemTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stock level of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stock {
    Finite(u64),
    /// Raw sources that never run out.
    Infinite,
}

impl Stock {
    pub fn at_least(self, n: u64) -> bool {
        match self {
            Stock::Finite(v) => v >= n,
            Stock::Infinite => true,
        }
    }
}

/// Initial warehouse contents for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub infinite_items: Vec<ItemTypeId>,
    #[serde(default)]
    pub initial_stock: Vec<(ItemTypeId, u64)>,
}

/// Global item ledger fed by storage submissions and drained by pickups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    stock: BTreeMap<ItemTypeId, Stock>,
}

impl Warehouse {
    pub fn from_config(config: &WarehouseConfig) -> Self {
        let mut warehouse = Self::default();
        for &(item, n) in &config.initial_stock {
            warehouse.deposit(item, n);
        }
        for &item in &config.infinite_items {
            warehouse.stock.insert(item, Stock::Infinite);
        }
        warehouse
    }

    pub fn available(&self, item: ItemTypeId) -> Stock {
        self.stock.get(&item).copied().unwrap_or(Stock::Finite(0))
    }

    /// Take `n` units. Fails without effect when fewer are in stock.
    pub fn withdraw(&mut self, item: ItemTypeId, n: u64) -> bool {
        match self.stock.get_mut(&item) {
            Some(Stock::Infinite) => true,
            Some(Stock::Finite(v)) if *v >= n => {
                *v -= n;
                true
            }
            _ => n == 0,
        }
    }

    pub fn deposit(&mut self, item: ItemTypeId, n: u64) {
        let entry = self.stock.entry(item).or_insert(Stock::Finite(0));
        if let Stock::Finite(v) = entry {
            *v = v.saturating_add(n);
        }
    }

    /// Stock as a display number; infinite sources report `f64::INFINITY`.
    pub fn as_f64(&self, item: ItemTypeId) -> f64 {
        match self.available(item) {
            Stock::Finite(v) => v as f64,
            Stock::Infinite => f64::INFINITY,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemTypeId, Stock)> + '_ {
        self.stock.iter().map(|(&item, &s)| (item, s))
    }

    /// Sum of all finite stock.
    pub fn total_finite(&self) -> u64 {
        self.stock
            .values()
            .map(|s| match s {
                Stock::Finite(v) => *v,
                Stock::Infinite => 0,
            })
            .sum()
    }
}
