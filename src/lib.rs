//! Rate-limit annotations for HAProxy.
//!
//! This crate translates the rate-limit annotations of a routing rule into
//! HAProxy request tracking and deny rules. Inline whitelists are stored as
//! content-addressed maps so rules sharing a whitelist share one map file.

pub mod annotations;
pub mod config;
pub mod error;
pub mod maps;
pub mod rules;
pub mod units;

pub use annotations::{Directive, Outcome, PrerequisiteMode, RateLimitAnnotations, SkipReason};
pub use error::{Error, Result};
pub use maps::{MapName, MapPath, MapStore, MemoryMaps};
pub use rules::{ReqRateLimit, ReqTrack, Rule, RuleList};
