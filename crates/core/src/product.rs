//! Catalog product model.
//!
//! Products are owned by the headless CMS and are read-only to the storefront.
//! Stock is either a flat count or a per-option-value map; the two shapes are
//! a tagged variant here rather than a runtime type check.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::Options;
use crate::types::ProductId;

/// Allowed values per option name, e.g. `{"size": ["S", "M", "L"]}`.
pub type OptionSchema = BTreeMap<String, Vec<String>>;

/// Units on hand for a product.
///
/// Deserializes from either a bare number (`12`) or a map keyed by option
/// value (`{"S": 3, "M": 0}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stock {
    /// One count for the whole product.
    Flat(u32),
    /// One count per option value.
    ByOption(BTreeMap<String, u32>),
}

impl Default for Stock {
    fn default() -> Self {
        Self::Flat(0)
    }
}

impl Stock {
    /// Units available for a given selection.
    ///
    /// For `ByOption` stock the first selected value that has an entry wins;
    /// a selection matching no entry has nothing available.
    #[must_use]
    pub fn available_for(&self, selection: &Options) -> u32 {
        match self {
            Self::Flat(count) => *count,
            Self::ByOption(counts) => selection
                .values()
                .find_map(|value| counts.get(value).copied())
                .unwrap_or(0),
        }
    }
}

/// Catalog data integrity problems.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProductError {
    /// Product has options but a single flat stock count.
    #[error("product {0} has options but flat stock")]
    FlatStockWithOptions(ProductId),

    /// Stock map keys differ from the allowed option values.
    #[error("product {product} stock keys do not match option values (missing: {missing:?}, unexpected: {unexpected:?})")]
    StockKeysMismatch {
        /// Offending product.
        product: ProductId,
        /// Option values without a stock entry.
        missing: Vec<String>,
        /// Stock entries for values that are not options.
        unexpected: Vec<String>,
    },
}

/// A shopper's option selection does not fit the product.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// Option name the product does not have.
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// Value not allowed for the option.
    #[error("'{value}' is not a valid {option}")]
    DisallowedValue {
        /// Option name.
        option: String,
        /// Rejected value.
        value: String,
    },

    /// Product requires a choice that was not made.
    #[error("please choose a {0}")]
    MissingOption(String),
}

/// A product as the storefront sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub stock: Stock,
    #[serde(default)]
    pub options: OptionSchema,
    #[serde(default)]
    pub is_out_of_stock: bool,
    /// External price reference used by the payment processor.
    #[serde(default)]
    pub stripe_price_id: Option<String>,
}

impl Product {
    /// Check the "options imply per-option stock" invariant.
    ///
    /// # Errors
    ///
    /// Returns a [`ProductError`] when the stock shape does not match the
    /// option schema.
    pub fn validate(&self) -> Result<(), ProductError> {
        if self.options.is_empty() {
            return Ok(());
        }

        let Stock::ByOption(counts) = &self.stock else {
            return Err(ProductError::FlatStockWithOptions(self.id.clone()));
        };

        let values: Vec<&String> = self.options.values().flatten().collect();
        let missing: Vec<String> = values
            .iter()
            .filter(|value| !counts.contains_key(value.as_str()))
            .map(|value| (*value).clone())
            .collect();
        let unexpected: Vec<String> = counts
            .keys()
            .filter(|key| !values.contains(key))
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(ProductError::StockKeysMismatch {
                product: self.id.clone(),
                missing,
                unexpected,
            })
        }
    }

    /// Check that a selection names every option exactly once with an
    /// allowed value.
    ///
    /// # Errors
    ///
    /// Returns the first [`SelectionError`] found.
    pub fn validate_selection(&self, selection: &Options) -> Result<(), SelectionError> {
        if let Some(name) = selection.keys().find(|name| !self.options.contains_key(*name)) {
            return Err(SelectionError::UnknownOption(name.clone()));
        }

        for (option, allowed) in &self.options {
            let value = selection
                .get(option)
                .ok_or_else(|| SelectionError::MissingOption(option.clone()))?;
            if !allowed.contains(value) {
                return Err(SelectionError::DisallowedValue {
                    option: option.clone(),
                    value: value.clone(),
                });
            }
        }

        Ok(())
    }

    /// Whether `quantity` units of the selection can be sold right now.
    #[must_use]
    pub fn can_fulfil(&self, selection: &Options, quantity: u32) -> bool {
        !self.is_out_of_stock && self.stock.available_for(selection) >= quantity
    }
}
