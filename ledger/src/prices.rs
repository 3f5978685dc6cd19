use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server-authoritative mapping from gated actions to marker costs.
/// Clients may cache a copy for display but the debit path always reads
/// from this table.
#[derive(Debug, Clone)]
pub struct PriceTable {
    costs: HashMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub action_type: String,
    pub cost: u32,
}

impl PriceTable {
    pub fn new() -> Self {
        PriceTable {
            costs: HashMap::new(),
        }
    }

    /// Default launch prices.
    pub fn with_defaults() -> Self {
        let mut table = PriceTable::new();
        table.set("friend_request", 3);
        table.set("join_application", 5);
        table.set("profile_view", 3);
        table
    }

    pub fn set(&mut self, action_type: &str, cost: u32) {
        self.costs.insert(action_type.to_string(), cost);
    }

    pub fn cost(&self, action_type: &str) -> Option<u32> {
        self.costs.get(action_type).copied()
    }

    pub fn entries(&self) -> Vec<PriceEntry> {
        let mut entries: Vec<PriceEntry> = self
            .costs
            .iter()
            .map(|(action_type, cost)| PriceEntry {
                action_type: action_type.clone(),
                cost: *cost,
            })
            .collect();
        entries.sort_by(|a, b| a.action_type.cmp(&b.action_type));
        entries
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        PriceTable::with_defaults()
    }
}
