// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! User-chosen visible columns for the item table, stored server-side as a
//! JSON-encoded list of field identifiers.

use tracing::warn;

pub const ITEM_SCREEN_CODE: &str = "ITEM_MANAGEMENT";

/// Keys never offered as configurable columns.
pub const HIDDEN_KEYS: [&str; 4] = ["id", "createdAt", "updatedAt", "qcDate"];

/// `mobilePhone` reads as `Mobile Phone`.
pub fn column_label(key: &str) -> String {
    let mut label = String::with_capacity(key.len() + 4);
    for (index, ch) in key.chars().enumerate() {
        if index == 0 {
            label.extend(ch.to_uppercase());
        } else if ch.is_uppercase() {
            label.push(' ');
            label.push(ch);
        } else {
            label.push(ch);
        }
    }
    label
}

/// Configurable columns from a sample record's keys, hidden keys removed.
pub fn derive_columns<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in keys {
        if HIDDEN_KEYS.contains(&key) || columns.iter().any(|known| known == key) {
            continue;
        }
        columns.push(key.to_owned());
    }
    columns
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnConfig {
    available: Vec<String>,
    selected: Vec<String>,
}

impl ColumnConfig {
    pub fn new(available: Vec<String>) -> Self {
        Self {
            available,
            selected: Vec::new(),
        }
    }

    /// Parses stored config defensively: bad JSON yields nothing selected,
    /// unknown or repeated entries are dropped and stored order is kept.
    /// Entries may name a column by key or by its display label.
    pub fn from_stored(stored: Option<&str>, available: Vec<String>) -> Self {
        let mut config = Self::new(available);
        let Some(stored) = stored.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return config;
        };
        let entries: Vec<serde_json::Value> = match serde_json::from_str(stored) {
            Ok(serde_json::Value::Array(entries)) => entries,
            Ok(_) => {
                warn!("stored column config is not a list, ignoring it");
                return config;
            }
            Err(error) => {
                warn!(%error, "stored column config is malformed, ignoring it");
                return config;
            }
        };
        for entry in entries {
            let Some(name) = entry.as_str() else {
                continue;
            };
            match config.resolve(name) {
                Some(key) if !config.selected.contains(&key) => config.selected.push(key),
                Some(_) => {}
                None => warn!(column = name, "dropping unknown stored column"),
            }
        }
        config
    }

    pub fn to_stored(&self) -> String {
        serde_json::to_string(&self.selected).unwrap_or_else(|_| "[]".to_owned())
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.selected.iter().any(|selected| selected == key)
    }

    pub fn is_all_selected(&self) -> bool {
        !self.available.is_empty() && self.available.iter().all(|key| self.is_selected(key))
    }

    /// Adds at the end or removes in place. Unknown keys are ignored.
    pub fn toggle(&mut self, key: &str) {
        if self.is_selected(key) {
            self.remove(key);
        } else if self.available.iter().any(|known| known == key) {
            self.selected.push(key.to_owned());
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.selected.retain(|selected| selected != key);
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Selects everything, or clears when everything is already selected.
    pub fn toggle_all(&mut self) {
        if self.is_all_selected() {
            self.clear();
        } else {
            self.select_all();
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.available.clone();
    }

    /// Drag reorder within the selection. Out-of-range positions are ignored.
    pub fn move_to(&mut self, from: usize, to: usize) {
        if from >= self.selected.len() || to >= self.selected.len() || from == to {
            return;
        }
        let key = self.selected.remove(from);
        self.selected.insert(to, key);
    }

    /// Available columns whose label contains `query`, case-insensitively.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let needle = query.to_lowercase();
        self.available
            .iter()
            .filter(|key| column_label(key).to_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    fn resolve(&self, name: &str) -> Option<String> {
        self.available
            .iter()
            .find(|key| key.as_str() == name || column_label(key) == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnConfig, column_label, derive_columns};

    fn available() -> Vec<String> {
        derive_columns([
            "id",
            "code",
            "name",
            "category",
            "unitPrice",
            "qcDate",
            "createdAt",
        ])
    }

    #[test]
    fn labels_split_camel_case() {
        assert_eq!(column_label("unitPrice"), "Unit Price");
        assert_eq!(column_label("code"), "Code");
        assert_eq!(column_label(""), "");
    }

    #[test]
    fn derived_columns_skip_bookkeeping_keys() {
        assert_eq!(available(), ["code", "name", "category", "unitPrice"]);
    }

    #[test]
    fn stored_config_keeps_known_order_and_drops_the_rest() {
        let stored = r#"["unitPrice","bogus","Code","unitPrice",7,"name"]"#;
        let config = ColumnConfig::from_stored(Some(stored), available());
        assert_eq!(config.selected(), ["unitPrice", "code", "name"]);
    }

    #[test]
    fn malformed_config_selects_nothing() {
        for stored in [Some("{not json"), Some(r#"{"a":1}"#), Some(""), None] {
            let config = ColumnConfig::from_stored(stored, available());
            assert!(config.selected().is_empty());
        }
    }

    #[test]
    fn toggle_move_and_round_trip() {
        let mut config = ColumnConfig::new(available());
        config.toggle("code");
        config.toggle("name");
        config.toggle("category");
        config.toggle("ghost");
        config.move_to(2, 0);
        assert_eq!(config.selected(), ["category", "code", "name"]);

        config.toggle("code");
        assert_eq!(config.selected(), ["category", "name"]);

        let reloaded = ColumnConfig::from_stored(Some(&config.to_stored()), available());
        assert_eq!(reloaded.selected(), config.selected());
    }

    #[test]
    fn toggle_all_flips_between_everything_and_nothing() {
        let mut config = ColumnConfig::new(available());
        config.toggle_all();
        assert!(config.is_all_selected());
        config.toggle_all();
        assert!(config.selected().is_empty());
    }

    #[test]
    fn search_matches_labels() {
        let config = ColumnConfig::new(available());
        assert_eq!(config.search("PRICE"), ["unitPrice"]);
    }
}
