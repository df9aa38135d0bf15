//! The rate-limit annotation vocabulary.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A rate-limit annotation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Requests,
    Period,
    Size,
    StatusCode,
    Whitelist,
}

impl Directive {
    /// Every directive, in the order they should be applied.
    pub const ALL: [Directive; 5] = [
        Directive::Requests,
        Directive::Period,
        Directive::Size,
        Directive::StatusCode,
        Directive::Whitelist,
    ];

    /// Annotation key of this directive.
    pub fn name(self) -> &'static str {
        match self {
            Directive::Requests => "rate-limit-requests",
            Directive::Period => "rate-limit-period",
            Directive::Size => "rate-limit-size",
            Directive::StatusCode => "rate-limit-status-code",
            Directive::Whitelist => "rate-limit-whitelist",
        }
    }
}

impl FromStr for Directive {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Directive::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| Error::UnknownDirective(s.to_string()))
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
