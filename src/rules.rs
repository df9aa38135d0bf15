//! Rate limiting rule fragments and the ordered rule list that collects them.
//!
//! A rate limit is expressed with two correlated fragments:
//! - [`ReqTrack`] counts requests per source address in a table
//! - [`ReqRateLimit`] denies requests once the tracked rate exceeds a limit
//!
//! Both fragments name the same table once a period is known.

use std::fmt;

use serde::Serialize;

use crate::maps::MapPath;

/// Key requests are tracked by.
pub const TRACK_KEY_SRC: &str = "src";

/// Identifies the kind of a rule fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    ReqRateLimit,
    ReqTrack,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::ReqRateLimit => f.write_str("REQ_RATELIMIT"),
            RuleType::ReqTrack => f.write_str("REQ_TRACK"),
        }
    }
}

/// Denies requests whose tracked rate is above `reqs_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReqRateLimit {
    /// Table the request rate is read from (empty until a period is set)
    pub table_name: String,
    /// Maximum number of requests per period
    pub reqs_limit: u64,
    /// Status returned when the limit is hit
    pub deny_status_code: u16,
    /// Addresses exempted from the limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist_map: Option<MapPath>,
}

impl ReqRateLimit {
    pub fn new(reqs_limit: u64, deny_status_code: u16) -> Self {
        Self {
            table_name: String::new(),
            reqs_limit,
            deny_status_code,
            whitelist_map: None,
        }
    }

    pub fn rule_type(&self) -> RuleType {
        RuleType::ReqRateLimit
    }

    /// The ACL condition under which a request is denied.
    ///
    /// ```
    /// use ratelimit_annotations::rules::ReqRateLimit;
    ///
    /// let mut limit = ReqRateLimit::new(100, 429);
    /// limit.table_name = "RateLimit-10000".to_string();
    /// assert_eq!(limit.condition(), "{ sc0_http_req_rate(RateLimit-10000) gt 100 }");
    /// ```
    pub fn condition(&self) -> String {
        let rate = format!(
            "{{ sc0_http_req_rate({}) gt {} }}",
            self.table_name, self.reqs_limit
        );
        match &self.whitelist_map {
            Some(whitelist) => format!("({}) !{{ src -f {} }}", rate, whitelist),
            None => rate,
        }
    }
}

impl fmt::Display for ReqRateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "http-request deny deny_status {} if {}",
            self.deny_status_code,
            self.condition()
        )
    }
}

/// Tracks requests by `track_key` in a rate counting table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReqTrack {
    pub track_key: String,
    pub table_name: String,
    /// Counting period in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_period: Option<u64>,
    /// Table size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_size: Option<u64>,
}

impl ReqTrack {
    pub fn new(track_key: impl Into<String>) -> Self {
        Self {
            track_key: track_key.into(),
            table_name: String::new(),
            table_period: None,
            table_size: None,
        }
    }

    pub fn rule_type(&self) -> RuleType {
        RuleType::ReqTrack
    }

    /// Declaration of the table this rule tracks into.
    ///
    /// Returns `None` until a period has been set. `default_size` is used
    /// when no explicit size was configured.
    pub fn stick_table(&self, default_size: u64) -> Option<StickTable> {
        let period = self.table_period?;
        Some(StickTable {
            name: self.table_name.clone(),
            size: self.table_size.unwrap_or(default_size),
            period,
        })
    }
}

impl fmt::Display for ReqTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http-request track-sc0 {}", self.track_key)?;
        if !self.table_name.is_empty() {
            write!(f, " table {}", self.table_name)?;
        }
        Ok(())
    }
}

/// A request rate counting table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StickTable {
    pub name: String,
    pub size: u64,
    /// Period in milliseconds
    pub period: u64,
}

impl fmt::Display for StickTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stick-table type ip size {} expire {}ms store http_req_rate({}ms)",
            self.size, self.period, self.period
        )
    }
}

/// A rule fragment held by a [`RuleList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    ReqRateLimit(ReqRateLimit),
    ReqTrack(ReqTrack),
}

impl Rule {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Rule::ReqRateLimit(r) => r.rule_type(),
            Rule::ReqTrack(r) => r.rule_type(),
        }
    }
}

impl From<ReqRateLimit> for Rule {
    fn from(rule: ReqRateLimit) -> Self {
        Rule::ReqRateLimit(rule)
    }
}

impl From<ReqTrack> for Rule {
    fn from(rule: ReqTrack) -> Self {
        Rule::ReqTrack(rule)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::ReqRateLimit(r) => fmt::Display::fmt(r, f),
            Rule::ReqTrack(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// Position of a rule inside a [`RuleList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(usize);

/// Ordered collection of rule fragments for one routing rule.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RuleList {
    rules: Vec<Rule>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, returning its id.
    pub fn add(&mut self, rule: impl Into<Rule>) -> RuleId {
        self.rules.push(rule.into());
        RuleId(self.rules.len() - 1)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    pub fn get_mut(&mut self, id: RuleId) -> Option<&mut Rule> {
        self.rules.get_mut(id.0)
    }

    pub fn req_rate_limit(&self, id: RuleId) -> Option<&ReqRateLimit> {
        match self.get(id)? {
            Rule::ReqRateLimit(r) => Some(r),
            _ => None,
        }
    }

    pub fn req_rate_limit_mut(&mut self, id: RuleId) -> Option<&mut ReqRateLimit> {
        match self.get_mut(id)? {
            Rule::ReqRateLimit(r) => Some(r),
            _ => None,
        }
    }

    pub fn req_track(&self, id: RuleId) -> Option<&ReqTrack> {
        match self.get(id)? {
            Rule::ReqTrack(r) => Some(r),
            _ => None,
        }
    }

    pub fn req_track_mut(&mut self, id: RuleId) -> Option<&mut ReqTrack> {
        match self.get_mut(id)? {
            Rule::ReqTrack(r) => Some(r),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// One proxy configuration line per rule, in insertion order.
    pub fn render(&self) -> Vec<String> {
        self.rules.iter().map(ToString::to_string).collect()
    }

    /// Tables declared by the tracking rules, one per distinct name.
    pub fn stick_tables(&self, default_size: u64) -> Vec<StickTable> {
        let mut tables: Vec<StickTable> = Vec::new();
        for rule in &self.rules {
            if let Rule::ReqTrack(track) = rule {
                if let Some(table) = track.stick_table(default_size) {
                    if !tables.iter().any(|t| t.name == table.name) {
                        tables.push(table);
                    }
                }
            }
        }
        tables
    }
}
