//! Category-specific record attributes.
//!
//! Records carry a small set of free-form attributes whose keys depend on the
//! record's category (e.g. `resolution` for a camera, `frequency` for a
//! radio). They are modelled as an ordered mapping validated once at the
//! boundary; the persistence layer stores the map as a JSON document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Display position given to attributes submitted without one.
pub const DEFAULT_DISPLAY_ORDER: u32 = 999;

/// Validation errors raised while building an [`AttributeMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValidationError {
    /// An attribute key was blank.
    EmptyKey,
}

impl std::fmt::Display for AttributeValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "attribute key must not be empty"),
        }
    }
}

impl std::error::Error for AttributeValidationError {}

/// A single attribute entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeValue {
    /// Trimmed, non-empty value.
    pub value: String,
    /// Label shown next to the value.
    pub label: String,
    /// Position among the record's attributes, ascending.
    pub display_order: u32,
}

/// Raw attribute input before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeInput {
    pub key: String,
    pub value: String,
    pub label: Option<String>,
    pub display_order: Option<u32>,
}

/// Ordered attribute mapping keyed by attribute name.
///
/// ## Invariants
/// - keys are trimmed and non-empty;
/// - values are trimmed and non-empty (blank inputs are dropped);
/// - [`AttributeMap::ordered`] yields entries by `(display_order, key)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, AttributeValue>);

impl AttributeMap {
    /// Build a map from raw inputs.
    ///
    /// # Examples
    /// ```
    /// use inventory::domain::{AttributeInput, AttributeMap};
    ///
    /// let map = AttributeMap::from_inputs([
    ///     AttributeInput { key: "sensor_size".into(), value: " 35mm ".into(), ..Default::default() },
    ///     AttributeInput { key: "mount".into(), value: "  ".into(), ..Default::default() },
    /// ])
    /// .expect("valid attributes");
    ///
    /// assert_eq!(map.len(), 1);
    /// let (_, attribute) = map.ordered().next().expect("one entry");
    /// assert_eq!(attribute.value, "35mm");
    /// assert_eq!(attribute.label, "Sensor Size");
    /// ```
    pub fn from_inputs(
        inputs: impl IntoIterator<Item = AttributeInput>,
    ) -> Result<Self, AttributeValidationError> {
        let mut entries = BTreeMap::new();
        for input in inputs {
            let key = input.key.trim();
            if key.is_empty() {
                return Err(AttributeValidationError::EmptyKey);
            }
            let value = input.value.trim();
            if value.is_empty() {
                continue;
            }
            let label = input
                .label
                .map(|label| label.trim().to_owned())
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| default_label(key));
            entries.insert(
                key.to_owned(),
                AttributeValue {
                    value: value.to_owned(),
                    label,
                    display_order: input.display_order.unwrap_or(DEFAULT_DISPLAY_ORDER),
                },
            );
        }
        Ok(Self(entries))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a single attribute.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Entries in display order, ties broken by key.
    pub fn ordered(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        let mut entries: Vec<_> = self.0.iter().map(|(key, value)| (key.as_str(), value)).collect();
        entries.sort_by(|(left_key, left), (right_key, right)| {
            left.display_order
                .cmp(&right.display_order)
                .then_with(|| left_key.cmp(right_key))
        });
        entries.into_iter()
    }
}

fn default_label(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
