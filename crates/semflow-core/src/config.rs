//! Engine configuration that downstream crates can serialize/deserialize.
//!
//! One `EngineConfig` is built per run (defaults → env → pipeline file → CLI)
//! and travels inside the `DataDirectory` context; nothing reads the
//! environment after that.

use serde::{Deserialize, Serialize};

/// Where PDF text extraction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfProcessing {
    #[default]
    Local,
    Remote,
}

impl PdfProcessing {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Some(PdfProcessing::Local),
            "remote" | "modal" => Some(PdfProcessing::Remote),
            _ => None,
        }
    }
}

/// What a filter/convert with no declared `depends_on` is assumed to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplicitDependencies {
    /// Every field generated by an earlier convert in the same run.
    #[default]
    AllUpstream,
    /// Nothing; the step may move freely.
    None,
}

impl ImplicitDependencies {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_upstream" | "all" => Some(ImplicitDependencies::AllUpstream),
            "none" => Some(ImplicitDependencies::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// LLM provider name (informational; selects the client in the binary layer).
    pub llm_service: String,
    pub llm_model: String,
    /// Base URL of an OpenAI-compatible chat completions API.
    pub llm_endpoint: String,
    pub openai_api_key: Option<String>,

    pub pdf_processing: PdfProcessing,
    /// Remote text-extraction endpoint; required when `pdf_processing` is remote.
    pub pdf_endpoint: Option<String>,

    /// Root directory for persisted cache targets.
    pub cache_dir: String,
    /// Skip cache lookups when building logical plans.
    pub no_cache: bool,

    /// Seconds per KB read from cold storage (directories/files).
    pub cold_scan_time_per_kb: f64,
    /// Seconds per KB read from a cache or an in-memory dataset.
    pub cache_scan_time_per_kb: f64,

    /// Parallelism hint attached to LLM-bound operators.
    pub max_workers: usize,

    pub implicit_dependencies: ImplicitDependencies,

    pub http_timeout_secs: u64,
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm_service: "openai".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_endpoint: "https://api.openai.com/v1".to_string(),
            openai_api_key: None,
            pdf_processing: PdfProcessing::Local,
            pdf_endpoint: None,
            cache_dir: "/tmp/semflow-cache".to_string(),
            no_cache: false,
            // ~500 MB/s local disk
            cold_scan_time_per_kb: 1.0 / (500.0 * 1024.0),
            // ~10 GB/s memory
            cache_scan_time_per_kb: 1.0 / (10.0 * 1024.0 * 1024.0),
            max_workers: 1,
            implicit_dependencies: ImplicitDependencies::AllUpstream,
            http_timeout_secs: 60,
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SEMFLOW_LLM_SERVICE`, `SEMFLOW_LLM_MODEL`, `SEMFLOW_LLM_ENDPOINT`
    /// - `OPENAI_API_KEY`
    /// - `SEMFLOW_PDF_PROCESSING` (`local`/`remote`), `SEMFLOW_PDF_ENDPOINT`
    /// - `SEMFLOW_CACHE_DIR`, `SEMFLOW_NO_CACHE`
    /// - `SEMFLOW_COLD_SCAN_TIME_PER_KB`, `SEMFLOW_CACHE_SCAN_TIME_PER_KB`
    /// - `SEMFLOW_MAX_WORKERS`
    /// - `SEMFLOW_IMPLICIT_DEPS` (`all_upstream`/`none`)
    /// - `SEMFLOW_HTTP_TIMEOUT_SECS`, `SEMFLOW_VERBOSE`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SEMFLOW_LLM_SERVICE") {
            cfg.llm_service = s;
        }

        if let Ok(s) = std::env::var("SEMFLOW_LLM_MODEL") {
            cfg.llm_model = s;
        }

        if let Ok(s) = std::env::var("SEMFLOW_LLM_ENDPOINT") {
            cfg.llm_endpoint = s;
        }

        if let Ok(s) = std::env::var("OPENAI_API_KEY") {
            if !s.trim().is_empty() {
                cfg.openai_api_key = Some(s);
            }
        }

        if let Ok(s) = std::env::var("SEMFLOW_PDF_PROCESSING") {
            if let Some(v) = PdfProcessing::parse(&s) {
                cfg.pdf_processing = v;
            }
        }

        if let Ok(s) = std::env::var("SEMFLOW_PDF_ENDPOINT") {
            cfg.pdf_endpoint = Some(s);
        }

        if let Ok(s) = std::env::var("SEMFLOW_CACHE_DIR") {
            cfg.cache_dir = s;
        }

        if let Ok(s) = std::env::var("SEMFLOW_NO_CACHE") {
            cfg.no_cache = parse_flag(&s);
        }

        if let Ok(s) = std::env::var("SEMFLOW_COLD_SCAN_TIME_PER_KB") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.cold_scan_time_per_kb = v;
            }
        }

        if let Ok(s) = std::env::var("SEMFLOW_CACHE_SCAN_TIME_PER_KB") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.cache_scan_time_per_kb = v;
            }
        }

        if let Ok(s) = std::env::var("SEMFLOW_MAX_WORKERS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_workers = v;
            }
        }

        if let Ok(s) = std::env::var("SEMFLOW_IMPLICIT_DEPS") {
            if let Some(v) = ImplicitDependencies::parse(&s) {
                cfg.implicit_dependencies = v;
            }
        }

        if let Ok(s) = std::env::var("SEMFLOW_HTTP_TIMEOUT_SECS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.http_timeout_secs = v;
            }
        }

        if let Ok(s) = std::env::var("SEMFLOW_VERBOSE") {
            cfg.verbose = parse_flag(&s);
        }

        cfg
    }

    /// Reject values that would make cost estimates or extraction meaningless.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;

        if !(self.cold_scan_time_per_kb >= 0.0) || !(self.cache_scan_time_per_kb >= 0.0) {
            return Err(Error::Config(
                "scan time per KB constants must be non-negative".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be >= 1".into()));
        }
        if self.pdf_processing == PdfProcessing::Remote && self.pdf_endpoint.is_none() {
            return Err(Error::Config(
                "remote PDF processing requires pdf_endpoint".into(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::Config("http_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert!(cfg.cache_scan_time_per_kb < cfg.cold_scan_time_per_kb);
    }

    #[test]
    fn remote_pdf_requires_endpoint() {
        let cfg = EngineConfig {
            pdf_processing: PdfProcessing::Remote,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parsers_accept_aliases() {
        assert_eq!(PdfProcessing::parse("modal"), Some(PdfProcessing::Remote));
        assert_eq!(
            ImplicitDependencies::parse("NONE"),
            Some(ImplicitDependencies::None)
        );
        assert!(parse_flag("Yes"));
        assert!(!parse_flag("0"));
    }
}
