//! External capabilities the solver's functions call into.
//!
//! Each capability is a small sync trait so tests can plug in scripted fakes
//! and the binary can plug in HTTP clients (`http` feature).

mod pdf;

#[cfg(feature = "http")]
mod openai;

pub use pdf::LocalPdfExtractor;

#[cfg(feature = "http")]
pub use openai::OpenAiChatService;
#[cfg(feature = "http")]
pub use pdf::RemotePdfExtractor;

use std::sync::Arc;

use semflow_core::config::{EngineConfig, PdfProcessing};
use semflow_core::cost::{NAIVE_EST_USD_PER_INPUT_TOKEN, NAIVE_EST_USD_PER_OUTPUT_TOKEN};
use tracing::{debug, warn};

use crate::error::{Result, SolverError};

/// Token usage of one or more model invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: f64,
    pub output_tokens: f64,
}

impl Usage {
    pub fn new(input_tokens: f64, output_tokens: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// USD at the default model's list prices.
    pub fn cost_usd(&self) -> f64 {
        self.input_tokens * NAIVE_EST_USD_PER_INPUT_TOKEN
            + self.output_tokens * NAIVE_EST_USD_PER_OUTPUT_TOKEN
    }
}

/// A model's final answer plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub answer: String,
    pub usage: Usage,
}

impl Completion {
    pub fn new(answer: impl Into<String>, usage: Usage) -> Self {
        Self {
            answer: answer.into(),
            usage,
        }
    }
}

/// Describes the document a question is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSignature {
    /// Rendered schema, e.g. `Email(sender, subject)`.
    pub doc_schema: String,
    /// Schema name, e.g. `Email`.
    pub doc_type: String,
}

pub trait LlmService: Send + Sync {
    fn model(&self) -> &str;

    /// Chain-of-thought question answering over `context`.
    fn cot_qa(&self, context: &str, question: &str, sig: &PromptSignature) -> Result<Completion>;

    /// Chain-of-thought yes/no judgement; the answer is expected to be the
    /// literal token `TRUE` or `FALSE`.
    fn cot_bool(&self, context: &str, condition: &str, sig: &PromptSignature)
        -> Result<Completion>;
}

pub trait VisionService: Send + Sync {
    /// Describe a base64-encoded image.
    fn describe_image(&self, image_b64: &str) -> Result<Completion>;
}

pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, filename: &str, bytes: &[u8]) -> Result<String>;
}

/// Capability bundle handed to the solver.
#[derive(Clone)]
pub struct Services {
    pub llm: Option<Arc<dyn LlmService>>,
    pub vision: Option<Arc<dyn VisionService>>,
    pub pdf: Arc<dyn TextExtractor>,
}

impl Default for Services {
    /// No model access; local PDF extraction.
    fn default() -> Self {
        Self {
            llm: None,
            vision: None,
            pdf: Arc::new(LocalPdfExtractor),
        }
    }
}

impl Services {
    pub fn with_llm(mut self, llm: Arc<dyn LlmService>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionService>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_pdf(mut self, pdf: Arc<dyn TextExtractor>) -> Self {
        self.pdf = pdf;
        self
    }

    /// Build the capabilities a config asks for.
    ///
    /// A missing API key is not an error here: model-backed functions fail
    /// with `MissingCredential` when invoked, before any request is made.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let mut services = Services::default();

        match cfg.pdf_processing {
            PdfProcessing::Local => {}
            PdfProcessing::Remote => {
                #[cfg(feature = "http")]
                {
                    let endpoint = cfg.pdf_endpoint.clone().ok_or_else(|| {
                        SolverError::Config("remote PDF processing requires pdf_endpoint".into())
                    })?;
                    services.pdf = Arc::new(RemotePdfExtractor::new(
                        endpoint,
                        cfg.http_timeout_secs,
                    )?);
                }
                #[cfg(not(feature = "http"))]
                {
                    return Err(SolverError::Config(
                        "remote PDF processing needs the `http` feature".into(),
                    ));
                }
            }
        }

        match &cfg.openai_api_key {
            Some(_key) => {
                #[cfg(feature = "http")]
                {
                    let client = Arc::new(OpenAiChatService::from_config(cfg)?);
                    services.llm = Some(client.clone());
                    services.vision = Some(client);
                    debug!(model = %cfg.llm_model, "configured chat service");
                }
                #[cfg(not(feature = "http"))]
                warn!("API key configured but built without the `http` feature");
            }
            None => warn!("OPENAI_API_KEY not set; LLM-backed operators will fail when run"),
        }

        Ok(services)
    }
}
