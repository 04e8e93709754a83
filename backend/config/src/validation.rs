//! Config validation: schema checks with user-friendly error messages.

use crate::schema::ForgeConfig;
use thiserror::Error;

/// Allowed deviation of the ratio sum from 1.0.
pub const RATIO_SUM_TOLERANCE: f64 = 0.001;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &ForgeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_api(config, &mut report);
    validate_mcp(config, &mut report);
    validate_generation(config, &mut report);
    validate_completion(config, &mut report);
    report
}

fn validate_url(path: &str, raw: &str, report: &mut ValidationReport) {
    match url::Url::parse(raw) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {}
        Ok(u) => report.error(path, format!("Unsupported URL scheme '{}'", u.scheme())),
        Err(e) => report.error(path, format!("Invalid URL '{raw}': {e}")),
    }
}

fn validate_api(config: &ForgeConfig, report: &mut ValidationReport) {
    let api = config.api();
    validate_url("api.baseUrl", api.base_url(), report);
    if api.api_key.as_deref().map(str::trim).map(str::is_empty).unwrap_or(true) {
        report.error(
            "api.apiKey",
            "API key is required (set api.apiKey or DEEPSEEK_API_KEY)",
        );
    }
    if api.max_retries() == 0 {
        report.error("api.maxRetries", "maxRetries must be >= 1");
    }
    if !(0.0..=2.0).contains(&api.temperature()) {
        report.warn("api.temperature", "temperature outside [0, 2]");
    }
}

fn validate_mcp(config: &ForgeConfig, report: &mut ValidationReport) {
    let mcp = config.mcp();
    validate_url("mcp.baseUrl", mcp.base_url(), report);
    if !mcp.sse_path().starts_with('/') {
        report.error("mcp.ssePath", "ssePath must start with '/'");
    }
    if mcp.request_timeout_secs() == 0 {
        report.error("mcp.requestTimeoutSecs", "requestTimeoutSecs must be >= 1");
    }
}

fn validate_generation(config: &ForgeConfig, report: &mut ValidationReport) {
    let generation = config.generation();
    if generation.batch_size() == 0 {
        report.error("generation.batchSize", "batchSize must be >= 1");
    }

    let ratios = generation.category_ratios();
    if ratios.is_empty() {
        report.error("generation.categoryRatios", "At least one category is required");
        return;
    }
    for (name, ratio) in &ratios {
        if !ratio.is_finite() || *ratio < 0.0 {
            report.error(
                format!("generation.categoryRatios.{name}"),
                format!("Ratio must be a finite non-negative number, got {ratio}"),
            );
        }
    }
    let sum: f64 = ratios.values().sum();
    if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
        report.error(
            "generation.categoryRatios",
            format!("Ratios must sum to 1.0, got {sum:.4}"),
        );
    }
}

fn validate_completion(config: &ForgeConfig, report: &mut ValidationReport) {
    let c = config.completion();
    if c.max_concurrent() == 0 {
        report.error("completion.maxConcurrent", "maxConcurrent must be >= 1");
    }
    if c.batch_size() == 0 {
        report.error("completion.batchSize", "batchSize must be >= 1");
    }
    if c.max_tool_rounds() == 0 {
        report.error("completion.maxToolRounds", "maxToolRounds must be >= 1");
    }
    if c.item_timeout_secs() == 0 {
        report.error("completion.itemTimeoutSecs", "itemTimeoutSecs must be >= 1");
    }
    if c.pause_every() == 0 {
        report.warn("completion.pauseEvery", "pauseEvery of 0 disables sequential pauses");
    }
}
