use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ratelimit_annotations::config::{LogFormat, Settings};
use ratelimit_annotations::rules::StickTable;
use ratelimit_annotations::{MapStore, MemoryMaps, RateLimitAnnotations, RuleList};

/// Render HAProxy rate limiting rules from rate-limit annotations.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Annotations file (YAML or JSON map of annotation name to value)
    annotations: PathBuf,

    /// Fallback annotations consulted when a key is missing from the main file
    #[arg(long)]
    defaults: Option<PathBuf>,

    /// Settings file
    #[arg(short, long)]
    config: Option<String>,

    /// Directory whitelist maps are written to
    #[arg(long)]
    maps_dir: Option<PathBuf>,

    /// Fail on annotations set without rate-limit-requests
    #[arg(long)]
    strict: bool,

    /// Print a JSON summary instead of configuration lines
    #[arg(long)]
    json: bool,
}

/// Rules, stick tables and whitelist maps generated for one annotation set.
#[derive(Debug, Serialize)]
struct Summary {
    rules: RuleList,
    stick_tables: Vec<StickTable>,
    maps: BTreeMap<String, Vec<String>>,
}

impl Summary {
    /// Configuration lines: stick tables, then rules, then map contents.
    fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for table in &self.stick_tables {
            lines.push(format!("# table {}", table.name));
            lines.push(table.to_string());
        }
        lines.extend(self.rules.render());
        for (path, entries) in &self.maps {
            lines.push(format!("# map {}", path));
            lines.extend(entries.iter().cloned());
        }
        lines
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    if let Some(dir) = args.maps_dir {
        settings.maps.dir = dir;
    }
    if args.strict {
        settings.rate_limiting.strict_prerequisites = true;
    }

    init_tracing(settings.logging.format);
    debug!(?settings, "Configuration loaded");

    let annotations = read_annotations(&args.annotations)?;
    let defaults = match &args.defaults {
        Some(path) => read_annotations(path)?,
        None => HashMap::new(),
    };

    let summary = generate(&settings, &[&annotations, &defaults])
        .with_context(|| format!("processing {}", args.annotations.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    for line in summary.lines() {
        println!("{}", line);
    }

    Ok(())
}

/// Process layered annotations into rules and whitelist maps.
fn generate(settings: &Settings, layers: &[&HashMap<String, String>]) -> anyhow::Result<Summary> {
    let maps = MemoryMaps::new(&settings.maps.dir);
    let mut rules = RuleList::new();
    let mut processor =
        RateLimitAnnotations::from_config(&mut rules, &maps, &settings.rate_limiting);
    let outcomes = processor.process_annotations(layers)?;

    for (directive, outcome) in &outcomes {
        debug!(annotation = %directive, ?outcome, "Annotation processed");
    }
    info!(rules = rules.len(), maps = maps.map_count(), "Rate limit rules generated");

    let stick_tables = rules.stick_tables(settings.rate_limiting.default_table_size);
    let map_entries = maps
        .names()
        .into_iter()
        .filter_map(|name| {
            let entries = maps.entries(&name)?;
            Some((maps.path(&name).to_string(), entries))
        })
        .collect();

    Ok(Summary {
        rules,
        stick_tables,
        maps: map_entries,
    })
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn read_annotations(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let raw: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;

    // Unquoted numbers are common in annotation files
    raw.into_iter()
        .map(|(name, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => anyhow::bail!("annotation {} has non-scalar value {:?}", name, other),
            };
            Ok((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn layer(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_read_annotations_coerces_scalars() {
        let file = write_file(
            r#"
rate-limit-requests: 100
rate-limit-period: "10s"
rate-limit-status-code: 429
rate-limit-whitelist:
strict: true
"#,
        );

        let annotations = read_annotations(file.path()).unwrap();
        assert_eq!(annotations["rate-limit-requests"], "100");
        assert_eq!(annotations["rate-limit-period"], "10s");
        assert_eq!(annotations["rate-limit-status-code"], "429");
        assert_eq!(annotations["rate-limit-whitelist"], "");
        assert_eq!(annotations["strict"], "true");
    }

    #[test]
    fn test_read_annotations_rejects_lists() {
        let file = write_file("rate-limit-whitelist:\n  - 10.0.0.1\n  - 10.0.0.2\n");

        let err = read_annotations(file.path()).unwrap_err();
        assert!(err.to_string().contains("rate-limit-whitelist"));
    }

    #[test]
    fn test_read_annotations_missing_file() {
        let err = read_annotations(Path::new("/nonexistent/annotations.yaml")).unwrap_err();
        assert!(err.to_string().contains("reading"));
    }

    #[test]
    fn test_generate_falls_back_to_defaults() {
        let settings = Settings::default();
        let annotations = layer(&[("rate-limit-requests", "10")]);
        let defaults = layer(&[
            ("rate-limit-requests", "500"),
            ("rate-limit-period", "10s"),
            ("rate-limit-status-code", "429"),
        ]);

        let summary = generate(&settings, &[&annotations, &defaults]).unwrap();
        assert_eq!(
            summary.lines(),
            vec![
                "# table RateLimit-10000".to_string(),
                "stick-table type ip size 102400 expire 10000ms store http_req_rate(10000ms)"
                    .to_string(),
                "http-request deny deny_status 429 if { sc0_http_req_rate(RateLimit-10000) gt 10 }"
                    .to_string(),
                "http-request track-sc0 src table RateLimit-10000".to_string(),
            ]
        );
    }

    #[test]
    fn test_generate_strict_settings_reject_orphan_annotations() {
        let mut settings = Settings::default();
        settings.rate_limiting.strict_prerequisites = true;
        let annotations = HashMap::new();
        let defaults = layer(&[("rate-limit-whitelist", "10.0.0.0/8")]);

        assert!(generate(&settings, &[&annotations, &defaults]).is_err());

        settings.rate_limiting.strict_prerequisites = false;
        let summary = generate(&settings, &[&annotations, &defaults]).unwrap();
        assert!(summary.rules.is_empty());
        assert!(summary.maps.is_empty());
    }

    #[test]
    fn test_json_summary() {
        let mut settings = Settings::default();
        settings.maps.dir = PathBuf::from("/etc/haproxy/maps");
        let annotations = layer(&[
            ("rate-limit-requests", "100"),
            ("rate-limit-period", "1m"),
            ("rate-limit-whitelist", "10.0.0.0/8, 192.168.1.1"),
        ]);

        let summary = generate(&settings, &[&annotations]).unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        let rules = json["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["type"], "req_rate_limit");
        assert_eq!(rules[0]["reqs_limit"], 100);
        assert_eq!(rules[0]["table_name"], "RateLimit-60000");
        assert_eq!(rules[1]["type"], "req_track");
        assert_eq!(rules[1]["table_name"], "RateLimit-60000");

        assert_eq!(json["stick_tables"][0]["name"], "RateLimit-60000");
        assert_eq!(json["stick_tables"][0]["period"], 60000);

        let maps = json["maps"].as_object().unwrap();
        assert_eq!(maps.len(), 1);
        let (path, entries) = maps.iter().next().unwrap();
        assert!(path.starts_with("/etc/haproxy/maps/ratelimit-whitelist-"));
        assert_eq!(rules[0]["whitelist_map"], path.as_str());
        assert_eq!(entries, &serde_json::json!(["10.0.0.0/8", "192.168.1.1"]));
    }
}
