//! Human-facing inventory codes and the fixed format the allocator fills.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Validation errors for [`InventoryCode`] and [`CodeFormat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCodeValidationError {
    /// The code was empty once trimmed.
    Empty,
    /// The code carried leading or trailing whitespace.
    SurroundingWhitespace,
    /// The format prefix was empty.
    EmptyPrefix,
    /// The numeric width was zero or too wide to represent.
    InvalidWidth(usize),
}

impl fmt::Display for InventoryCodeValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "inventory code must not be empty"),
            Self::SurroundingWhitespace => {
                write!(f, "inventory code must not contain surrounding whitespace")
            }
            Self::EmptyPrefix => write!(f, "inventory code prefix must not be empty"),
            Self::InvalidWidth(width) => {
                write!(f, "inventory code width must be between 1 and 9, got {width}")
            }
        }
    }
}

impl std::error::Error for InventoryCodeValidationError {}

/// A non-empty inventory code such as `INV_IC2_0042`.
///
/// Any non-empty trimmed string is accepted: operators may type codes that
/// do not follow the allocator's pattern, and those still take part in the
/// uniqueness check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InventoryCode(String);

impl InventoryCode {
    /// Validate and construct an inventory code.
    ///
    /// # Examples
    /// ```
    /// use inventory::domain::InventoryCode;
    ///
    /// let code = InventoryCode::new("INV_IC2_0007").expect("valid code");
    /// assert_eq!(code.as_str(), "INV_IC2_0007");
    /// assert!(InventoryCode::new("  ").is_err());
    /// ```
    pub fn new(value: impl Into<String>) -> Result<Self, InventoryCodeValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(InventoryCodeValidationError::Empty);
        }
        if raw.trim() != raw {
            return Err(InventoryCodeValidationError::SurroundingWhitespace);
        }
        Ok(Self(raw))
    }

    /// Interpret optional form input: blank input means "no code".
    pub fn from_optional(
        value: Option<&str>,
    ) -> Result<Option<Self>, InventoryCodeValidationError> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(trimmed) => Self::new(trimmed).map(Some),
        }
    }

    /// Borrow the code as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for InventoryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for InventoryCode {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<String> for InventoryCode {
    type Error = InventoryCodeValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InventoryCode> for String {
    fn from(value: InventoryCode) -> Self {
        value.0
    }
}

/// The fixed `PREFIX` + zero-padded digits pattern handed out by the allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFormat {
    prefix: String,
    width: usize,
}

impl CodeFormat {
    /// Prefix used by the catalog since its first import.
    pub const DEFAULT_PREFIX: &'static str = "INV_IC2_";
    /// Number of zero-padded digits following the prefix.
    pub const DEFAULT_WIDTH: usize = 4;
    const MAX_WIDTH: usize = 9;

    /// Build a format from a prefix and digit width.
    pub fn new(prefix: impl Into<String>, width: usize) -> Result<Self, InventoryCodeValidationError> {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(InventoryCodeValidationError::EmptyPrefix);
        }
        if prefix.trim() != prefix {
            return Err(InventoryCodeValidationError::SurroundingWhitespace);
        }
        if width == 0 || width > Self::MAX_WIDTH {
            return Err(InventoryCodeValidationError::InvalidWidth(width));
        }
        Ok(Self { prefix, width })
    }

    /// Code prefix, e.g. `INV_IC2_`.
    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    /// Number of digits after the prefix.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of distinct codes this format can express.
    pub fn capacity(&self) -> u32 {
        // Width is capped at 9 so the power always fits in a u32.
        10_u32.pow(u32::try_from(self.width).unwrap_or(9))
    }

    /// Extract the number from a code that matches the pattern exactly.
    ///
    /// # Examples
    /// ```
    /// use inventory::domain::CodeFormat;
    ///
    /// let format = CodeFormat::default();
    /// assert_eq!(format.parse_number("INV_IC2_0042"), Some(42));
    /// assert_eq!(format.parse_number("INV_IC2_42"), None);
    /// assert_eq!(format.parse_number("LEGACY-0042"), None);
    /// ```
    pub fn parse_number(&self, code: &str) -> Option<u32> {
        let digits = code.strip_prefix(self.prefix.as_str())?;
        if digits.len() != self.width || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Render a number with the prefix and zero padding.
    ///
    /// Returns `None` when the number needs more digits than the format
    /// allows, since such a code would no longer parse back.
    pub fn format(&self, number: u32) -> Option<InventoryCode> {
        if number >= self.capacity() {
            return None;
        }
        let rendered = format!("{}{:0width$}", self.prefix, number, width = self.width);
        InventoryCode::new(rendered).ok()
    }
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self {
            prefix: Self::DEFAULT_PREFIX.to_owned(),
            width: Self::DEFAULT_WIDTH,
        }
    }
}
