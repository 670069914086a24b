//! Queue naming: validated names, environment prefixes and handler-derived names.
//!
//! A queue has a logical name used in code and a full name used on the wire.
//! Outside production every full name is prefixed so that several
//! environments can share one queue-service account:
//!
//! ```rust
//! use queue_registry::naming::{full_queue_name, NamingMode, QueueName};
//!
//! let name = QueueName::new("orders").unwrap();
//! let staging = NamingMode::Prefixed("staging".to_string());
//!
//! assert_eq!(full_queue_name(&name, &NamingMode::Production).unwrap().as_str(), "orders");
//! assert_eq!(full_queue_name(&name, &staging).unwrap().as_str(), "staging__orders");
//! ```

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator joining prefix, name, suffix and derived name segments
pub const NAME_SEPARATOR: &str = "__";

/// Maximum queue name length accepted by the managed queue service
pub const MAX_QUEUE_NAME_LENGTH: usize = 80;

/// Validated queue name with length and character restrictions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();

        if name.is_empty() || name.len() > MAX_QUEUE_NAME_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("must be 1-{} characters", MAX_QUEUE_NAME_LENGTH),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Append a suffix segment, yielding `name__suffix`
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, ValidationError> {
        if suffix.is_empty() {
            return Err(ValidationError::Required {
                field: "suffix".to_string(),
            });
        }
        Self::new(format!("{}{}{}", self.0, NAME_SEPARATOR, suffix))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// How logical names map to wire names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingMode {
    /// Production: the full name is the logical name
    Production,
    /// Non-production: the full name is `prefix__name`
    Prefixed(String),
}

/// Derive the wire name for a logical queue name.
///
/// Pure and deterministic in `name` and `mode`.
pub fn full_queue_name(name: &QueueName, mode: &NamingMode) -> Result<QueueName, ValidationError> {
    match mode {
        NamingMode::Production => Ok(name.clone()),
        NamingMode::Prefixed(prefix) => {
            QueueName::new(format!("{}{}{}", prefix, NAME_SEPARATOR, name.as_str()))
        }
    }
}

/// Derive a queue name from the location of a handler function.
///
/// Module path separators (`::`) become `__`, then the function name is
/// appended: `billing::handlers` + `charge` gives `billing__handlers__charge`.
pub fn derive_queue_name(module_path: &str, function: &str) -> String {
    format!(
        "{}{}{}",
        module_path.replace("::", NAME_SEPARATOR),
        NAME_SEPARATOR,
        function
    )
}

/// Where a receiver function is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOrigin {
    pub module_path: &'static str,
    pub function: &'static str,
}

impl HandlerOrigin {
    pub const fn new(module_path: &'static str, function: &'static str) -> Self {
        Self {
            module_path,
            function,
        }
    }

    /// Queue name derived from this origin
    pub fn queue_name(&self) -> String {
        derive_queue_name(self.module_path, self.function)
    }
}

/// Capture the [`HandlerOrigin`] of a function defined in the calling module.
///
/// ```rust
/// use queue_registry::handler_origin;
///
/// async fn charge_card() {}
///
/// let origin = handler_origin!(charge_card);
/// assert_eq!(origin.function, "charge_card");
/// ```
#[macro_export]
macro_rules! handler_origin {
    ($function:ident) => {
        $crate::naming::HandlerOrigin::new(module_path!(), stringify!($function))
    };
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;
