//! Line-item identity.
//!
//! A line item is identified by its product plus the option values chosen for
//! it. The same coffee in two grind sizes is two line items.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// Option selections for a line item, e.g. `{"size": "M"}`.
///
/// Ordered by option name so that the key derivation never depends on the
/// order in which the shopper (or the client) supplied the options.
pub type Options = BTreeMap<String, String>;

const PAIR_SEPARATOR: char = '|';
const NAME_VALUE_SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// Composite identity of a line item within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemKey(String);

impl LineItemKey {
    /// Wrap a key received from a client. No validation: an unknown key
    /// simply matches nothing.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the key for a product and option selection.
///
/// The key is the product id followed by `|name:value` for every option in
/// name order. Separator characters inside names and values are escaped, so
/// distinct selections never produce the same key.
#[must_use]
pub fn make_key(product_id: &ProductId, options: &Options) -> LineItemKey {
    let mut key = String::with_capacity(product_id.as_str().len() + options.len() * 12);
    push_escaped(&mut key, product_id.as_str());

    for (name, value) in options {
        key.push(PAIR_SEPARATOR);
        push_escaped(&mut key, name);
        key.push(NAME_VALUE_SEPARATOR);
        push_escaped(&mut key, value);
    }

    LineItemKey(key)
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        if matches!(c, PAIR_SEPARATOR | NAME_VALUE_SEPARATOR | ESCAPE) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> Options {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_no_options_is_bare_product_id() {
        let key = make_key(&ProductId::new("espresso-blend"), &Options::new());
        assert_eq!(key.as_str(), "espresso-blend");
    }

    #[test]
    fn test_options_sorted_by_name() {
        let key = make_key(
            &ProductId::new("tee"),
            &options(&[("size", "M"), ("color", "black")]),
        );
        assert_eq!(key.as_str(), "tee|color:black|size:M");
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let id = ProductId::new("beans");
        let a = options(&[("grind", "fine"), ("bag", "1kg")]);
        let b = options(&[("bag", "1kg"), ("grind", "fine")]);
        assert_eq!(make_key(&id, &a), make_key(&id, &b));
    }

    #[test]
    fn test_different_values_are_different_items() {
        let id = ProductId::new("tee");
        assert_ne!(
            make_key(&id, &options(&[("size", "S")])),
            make_key(&id, &options(&[("size", "M")]))
        );
        assert_ne!(make_key(&id, &Options::new()), make_key(&id, &options(&[("size", "S")])));
    }

    #[test]
    fn test_separators_are_escaped() {
        let id = ProductId::new("p");
        let tricky = make_key(&id, &options(&[("a", "b|c:d")]));
        let split = make_key(&id, &options(&[("a", "b"), ("c", "d")]));
        assert_ne!(tricky, split);
        assert_eq!(tricky.as_str(), "p|a:b\\|c\\:d");
    }
}
