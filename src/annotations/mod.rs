//! Rate-limit annotation processing.
//!
//! Annotations attached to a routing rule are turned into a pair of rule
//! fragments (see [`crate::rules`]) by [`RateLimitAnnotations`]. Directives
//! are applied one at a time and later directives refine the fragments
//! created by `rate-limit-requests`.

mod directive;
mod processor;
mod whitelist;

use std::collections::HashMap;

pub use directive::Directive;
pub use processor::{PrerequisiteMode, RateLimitAnnotations};
pub use whitelist::{is_valid_address, whitelist_map_name, PATTERNS_PREFIX, WHITELIST_MAP_PREFIX};

/// Why a directive left the rules untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The annotation was absent or set to an empty string
    NoValue,
    /// `rate-limit-requests` has not been processed yet
    MissingPrerequisite,
}

/// Result of processing a single directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
}

/// Look up an annotation across layered sources.
///
/// Layers are consulted in order (for example ingress, then service, then
/// defaults) and the first one holding the key wins.
pub fn get_value<'a>(name: &str, layers: &[&'a HashMap<String, String>]) -> Option<&'a str> {
    layers
        .iter()
        .find_map(|layer| layer.get(name))
        .map(String::as_str)
}
