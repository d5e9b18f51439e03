//! Doctor command - validate configuration, database and credentials

use anyhow::Result;
use everylot_adapters::lots::SqliteLotStore;
use everylot_domain::{
    Platform,
    usecases::{ComposeConfig, Composer},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::args::DoctorArgs;
use crate::commands::env_is_set;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    templates: CheckResult,
    database: CheckResult,
    streetview: CheckResult,
    bluesky: CheckResult,
    twitter: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        templates: CheckResult::error("Not checked"),
        database: CheckResult::error("Not checked"),
        streetview: CheckResult::error("Not checked"),
        bluesky: CheckResult::error("Not checked"),
        twitter: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = check_platforms(&c);
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.templates = check_templates(config);
        report.database = check_database(&config.general.database_path).await;
        report.streetview = check_streetview(config);
        report.bluesky = check_bluesky(config);
        report.twitter = check_twitter(config);
    }

    let checks = [
        &report.config,
        &report.templates,
        &report.database,
        &report.streetview,
        &report.bluesky,
        &report.twitter,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn check_platforms(config: &AppConfig) -> CheckResult {
    let platforms = config.enabled_platforms();
    match Platform::primary(&platforms) {
        Some(primary) => CheckResult::ok(format!(
            "Configuration loaded, platforms: {}, cursor follows {}",
            platforms
                .iter()
                .map(Platform::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            primary
        )),
        None => CheckResult::error("Neither Bluesky nor Twitter is enabled"),
    }
}

fn check_templates(config: &AppConfig) -> CheckResult {
    let compose = ComposeConfig {
        print_format: config.templates.print_format.clone(),
        search_format: config.templates.search_format.clone(),
    };

    match Composer::new(&compose) {
        Ok(_) => CheckResult::ok(format!(
            "print: {:?}, search: {:?}",
            compose.print_format, compose.search_format
        )),
        Err(e) => CheckResult::error(e.to_string()),
    }
}

async fn check_database(path: &Path) -> CheckResult {
    let store = match SqliteLotStore::open(path).await {
        Ok(store) => store,
        Err(e) => return CheckResult::error(e.to_string()),
    };

    let total = match store.count().await {
        Ok(total) => total,
        Err(e) => return CheckResult::error(format!("Failed to count lots: {}", e)),
    };

    let mut posted = serde_json::Map::new();
    for platform in Platform::PRIORITY {
        match store.count_posted(platform).await {
            Ok(count) => {
                posted.insert(platform.as_str().to_string(), count.into());
            }
            Err(e) => {
                return CheckResult::error(format!(
                    "Failed to read {} markers: {}",
                    platform.marker_column(),
                    e
                ));
            }
        }
    }

    let details = serde_json::json!({
        "path": path.display().to_string(),
        "lots": total,
        "posted": posted,
    });

    if total == 0 {
        return CheckResult::warn(format!("{} has no lots", path.display())).with_details(details);
    }

    CheckResult::ok(format!("{} lots in {}", total, path.display())).with_details(details)
}

fn check_streetview(config: &AppConfig) -> CheckResult {
    let env_var = &config.streetview.api_key_env;

    if env_var.is_empty() {
        return CheckResult::error("No Street View API key env var configured");
    }

    if env_is_set(env_var) {
        CheckResult::ok(format!("API key: {} (set)", env_var))
    } else {
        CheckResult::warn(format!(
            "API key: {} (not set, only --dry-run will work)",
            env_var
        ))
    }
}

fn check_bluesky(config: &AppConfig) -> CheckResult {
    if !config.bluesky.enabled {
        return CheckResult::ok("Bluesky disabled");
    }

    let identifier = &config.bluesky.identifier_env;
    let password = &config.bluesky.password_env;

    if identifier.is_empty() || password.is_empty() {
        return CheckResult::error("Bluesky identifier or password env var not configured");
    }

    let state = |var: &str| if env_is_set(var) { "set" } else { "not set" };
    let message = format!(
        "PDS: {}, identifier: {} ({}), password: {} ({})",
        config.bluesky.pds_url,
        identifier,
        state(identifier),
        password,
        state(password)
    );

    if env_is_set(identifier) && env_is_set(password) {
        CheckResult::ok(message)
    } else {
        CheckResult::warn(message)
    }
}

fn check_twitter(config: &AppConfig) -> CheckResult {
    if !config.twitter.enabled {
        return CheckResult::ok("Twitter disabled");
    }

    let env_var = &config.twitter.user_token_env;

    if env_var.is_empty() {
        return CheckResult::error("No user token env var configured");
    }

    if env_is_set(env_var) {
        CheckResult::ok(format!(
            "User token: {} (set), max chars: {}",
            env_var, config.twitter.max_chars
        ))
    } else {
        CheckResult::warn(format!(
            "User token: {} (not set), max chars: {}",
            env_var, config.twitter.max_chars
        ))
    }
}

fn print_report(report: &DoctorReport) {
    println!("everylot Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Templates", &report.templates);
    print_check("Database", &report.database);
    print_check("Street View", &report.streetview);
    print_check("Bluesky", &report.bluesky);
    print_check("Twitter", &report.twitter);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to post! Try: everylot post --dry-run");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
