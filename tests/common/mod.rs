//! Shared fixtures for the cross-crate tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use semflow_core::config::EngineConfig;
use semflow_core::record::DataRecord;
use semflow_core::schema::{builtin, Field, FieldType, Schema, SchemaRef};
use semflow_io::DataDirectory;
use semflow_solver::{Completion, LlmService, PromptSignature, Services, Solver, Usage};

/// Deterministic stand-in for a chat model.
///
/// - `cot_qa` answers with the first `(needle, answer)` whose needle appears
///   in the question, else `"unknown"`.
/// - `cot_bool` answers `TRUE` when the context contains the keyword mapped
///   from the condition, else `FALSE`.
#[derive(Default)]
pub struct ScriptedLlm {
    pub qa: Vec<(String, String)>,
    pub judgements: Vec<(String, String)>,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn answer(mut self, needle: &str, answer: &str) -> Self {
        self.qa.push((needle.into(), answer.into()));
        self
    }

    pub fn judge(mut self, condition: &str, keyword: &str) -> Self {
        self.judgements.push((condition.into(), keyword.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmService for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    fn cot_qa(
        &self,
        _context: &str,
        question: &str,
        _sig: &PromptSignature,
    ) -> semflow_solver::Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .qa
            .iter()
            .find(|(needle, _)| question.contains(needle.as_str()))
            .map(|(_, a)| a.clone())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Completion::new(answer, Usage::new(100.0, 10.0)))
    }

    fn cot_bool(
        &self,
        context: &str,
        condition: &str,
        _sig: &PromptSignature,
    ) -> semflow_solver::Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hit = self
            .judgements
            .iter()
            .any(|(cond, kw)| condition.contains(cond.as_str()) && context.contains(kw.as_str()));
        let answer = if hit { "TRUE" } else { "FALSE" };
        Ok(Completion::new(answer, Usage::new(100.0, 1.0)))
    }
}

pub fn solver_with(llm: Arc<ScriptedLlm>) -> Solver {
    Solver::new(Services::default().with_llm(llm))
}

pub fn email_schema() -> SchemaRef {
    Schema::new(
        "Email",
        "A single email",
        vec![
            Field::new("filename", FieldType::String, "The file name", true),
            Field::new("contents", FieldType::String, "The email text", true),
            Field::new("sender", FieldType::String, "The sender address", true),
            Field::new("subject", FieldType::String, "The subject line", false),
        ],
    )
    .into_ref()
}

pub fn text_docs(bodies: &[(&str, &str)]) -> Vec<DataRecord> {
    bodies
        .iter()
        .map(|(name, body)| {
            DataRecord::new(builtin::text_file())
                .with("filename", *name)
                .with("contents", *body)
        })
        .collect()
}

pub fn memory_dir(config: EngineConfig) -> DataDirectory {
    DataDirectory::in_memory(config)
}

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

/// Fresh directory under the system temp dir, unique per call and process.
pub fn create_temp_dir(tag: &str) -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("semflow-{tag}-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}
