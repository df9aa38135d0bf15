//! Builds rate limit rule fragments from annotations.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::directive::Directive;
use super::whitelist::{is_valid_address, whitelist_map_name, PATTERNS_PREFIX};
use super::{get_value, Outcome, SkipReason};
use crate::config::RateLimitingConfig;
use crate::error::{Error, Result};
use crate::maps::{MapPath, MapStore};
use crate::rules::{ReqRateLimit, ReqTrack, RuleId, RuleList, TRACK_KEY_SRC};
use crate::units;

/// Default status returned to limited clients.
const DEFAULT_STATUS_CODE: u16 = 403;

/// How period, size, status-code and whitelist annotations are handled when
/// they arrive before `rate-limit-requests`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrerequisiteMode {
    /// Skip the annotation and report [`SkipReason::MissingPrerequisite`]
    #[default]
    Lenient,
    /// Fail with [`Error::MissingPrerequisite`]
    Strict,
}

/// Rate-limit annotation processor for one routing rule.
///
/// `rate-limit-requests` registers a [`ReqRateLimit`] and a [`ReqTrack`]
/// into the rule list; the other directives refine those two rules in
/// place. Directives must be fed sequentially through the same instance.
pub struct RateLimitAnnotations<'a, M: MapStore + ?Sized> {
    rules: &'a mut RuleList,
    maps: &'a M,
    mode: PrerequisiteMode,
    default_status_code: u16,
    limit: Option<RuleId>,
    track: Option<RuleId>,
}

impl<'a, M: MapStore + ?Sized> RateLimitAnnotations<'a, M> {
    /// Create a processor writing rules into `rules` and whitelists into `maps`.
    pub fn new(rules: &'a mut RuleList, maps: &'a M) -> Self {
        Self {
            rules,
            maps,
            mode: PrerequisiteMode::default(),
            default_status_code: DEFAULT_STATUS_CODE,
            limit: None,
            track: None,
        }
    }

    /// Create a processor using the configured mode and defaults.
    pub fn from_config(
        rules: &'a mut RuleList,
        maps: &'a M,
        config: &RateLimitingConfig,
    ) -> Self {
        let mode = if config.strict_prerequisites {
            PrerequisiteMode::Strict
        } else {
            PrerequisiteMode::Lenient
        };
        Self::new(rules, maps)
            .with_mode(mode)
            .with_default_status_code(config.default_status_code)
    }

    pub fn with_mode(mut self, mode: PrerequisiteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_default_status_code(mut self, code: u16) -> Self {
        self.default_status_code = code;
        self
    }

    /// The limiting rule, once `rate-limit-requests` has been processed.
    pub fn limit(&self) -> Option<&ReqRateLimit> {
        self.rules.req_rate_limit(self.limit?)
    }

    /// The tracking rule, once `rate-limit-requests` has been processed.
    pub fn track(&self) -> Option<&ReqTrack> {
        self.rules.req_track(self.track?)
    }

    /// Process an annotation by name.
    pub fn process(&mut self, name: &str, value: &str) -> Result<Outcome> {
        let directive: Directive = name.parse()?;
        self.process_directive(directive, value)
    }

    /// Process every rate-limit annotation found in `layers`, requests first.
    ///
    /// Stops at the first error.
    pub fn process_annotations(
        &mut self,
        layers: &[&HashMap<String, String>],
    ) -> Result<Vec<(Directive, Outcome)>> {
        let mut outcomes = Vec::with_capacity(Directive::ALL.len());
        for directive in Directive::ALL {
            let value = get_value(directive.name(), layers).unwrap_or_default();
            let outcome = self.process_directive(directive, value)?;
            outcomes.push((directive, outcome));
        }
        Ok(outcomes)
    }

    /// Apply a single directive.
    pub fn process_directive(&mut self, directive: Directive, value: &str) -> Result<Outcome> {
        if value.is_empty() {
            trace!(annotation = %directive, "Annotation not set");
            return Ok(Outcome::Skipped(SkipReason::NoValue));
        }

        match directive {
            Directive::Requests => self.requests(value),
            Directive::Period => self.period(value),
            Directive::Size => self.size(value),
            Directive::StatusCode => self.status_code(value),
            Directive::Whitelist => self.whitelist(value),
        }
    }

    fn requests(&mut self, value: &str) -> Result<Outcome> {
        let reqs_limit: u64 = value
            .trim()
            .parse()
            .map_err(|e| Error::parse(Directive::Requests.name(), value, e))?;
        if reqs_limit == 0 {
            return Err(Error::parse(
                Directive::Requests.name(),
                value,
                "limit must be positive",
            ));
        }

        if self.limit.is_some() {
            debug!("Replacing previously registered rate limit rules");
        }
        let limit = ReqRateLimit::new(reqs_limit, self.default_status_code);
        self.limit = Some(self.rules.add(limit));
        self.track = Some(self.rules.add(ReqTrack::new(TRACK_KEY_SRC)));

        debug!(reqs_limit = reqs_limit, "Rate limiting enabled");
        Ok(Outcome::Applied)
    }

    fn period(&mut self, value: &str) -> Result<Outcome> {
        let Some((limit_id, track_id)) = self.limit.zip(self.track) else {
            return self.missing_prerequisite(Directive::Period);
        };
        let period = units::parse_time(value)
            .map_err(|e| Error::parse(Directive::Period.name(), value, e))?;
        let table_name = format!("RateLimit-{}", period);

        if let Some(track) = self.rules.req_track_mut(track_id) {
            track.table_period = Some(period);
            track.table_name = table_name.clone();
        }
        if let Some(limit) = self.rules.req_rate_limit_mut(limit_id) {
            limit.table_name = table_name.clone();
        }

        debug!(table = %table_name, period_ms = period, "Rate limit period set");
        Ok(Outcome::Applied)
    }

    fn size(&mut self, value: &str) -> Result<Outcome> {
        let Some((_, track_id)) = self.limit.zip(self.track) else {
            return self.missing_prerequisite(Directive::Size);
        };
        let size = units::parse_size(value)
            .map_err(|e| Error::parse(Directive::Size.name(), value, e))?;

        if let Some(track) = self.rules.req_track_mut(track_id) {
            track.table_size = Some(size);
        }

        debug!(size = size, "Rate limit table size set");
        Ok(Outcome::Applied)
    }

    fn status_code(&mut self, value: &str) -> Result<Outcome> {
        let Some((limit_id, _)) = self.limit.zip(self.track) else {
            return self.missing_prerequisite(Directive::StatusCode);
        };
        let code: u16 = value
            .trim()
            .parse()
            .map_err(|e| Error::parse(Directive::StatusCode.name(), value, e))?;

        if let Some(limit) = self.rules.req_rate_limit_mut(limit_id) {
            limit.deny_status_code = code;
        }

        debug!(status_code = code, "Rate limit deny status set");
        Ok(Outcome::Applied)
    }

    fn whitelist(&mut self, value: &str) -> Result<Outcome> {
        let Some(limit_id) = self.limit else {
            return self.missing_prerequisite(Directive::Whitelist);
        };

        if value.starts_with(PATTERNS_PREFIX) {
            self.set_whitelist(limit_id, MapPath::new(value));
            debug!(pattern = value, "Rate limit whitelist references pattern file");
            return Ok(Outcome::Applied);
        }

        let map_name = whitelist_map_name(value);
        if self.maps.exists(&map_name) {
            trace!(map = %map_name, "Reusing whitelist map");
        } else {
            for address in value.split(',') {
                let address = address.trim();
                if !is_valid_address(address) {
                    return Err(Error::InvalidAddress {
                        address: address.to_string(),
                        directive: Directive::Whitelist.name().to_string(),
                    });
                }
                self.maps.append(&map_name, address);
            }
            debug!(map = %map_name, "Whitelist map populated");
        }

        let path = self.maps.path(&map_name);
        self.set_whitelist(limit_id, path);
        Ok(Outcome::Applied)
    }

    fn set_whitelist(&mut self, limit_id: RuleId, path: MapPath) {
        if let Some(limit) = self.rules.req_rate_limit_mut(limit_id) {
            limit.whitelist_map = Some(path);
        }
    }

    fn missing_prerequisite(&self, directive: Directive) -> Result<Outcome> {
        match self.mode {
            PrerequisiteMode::Strict => Err(Error::MissingPrerequisite {
                directive: directive.name().to_string(),
            }),
            PrerequisiteMode::Lenient => {
                warn!(
                    annotation = %directive,
                    "Ignoring annotation set without rate-limit-requests"
                );
                Ok(Outcome::Skipped(SkipReason::MissingPrerequisite))
            }
        }
    }
}
