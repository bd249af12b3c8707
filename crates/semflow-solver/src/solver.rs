//! Task resolution.
//!
//! Conversion precedence: registered field copy, then the fixed hard-coded
//! set, then per-field LLM question answering. Filters with no conditions
//! pass everything; otherwise one yes/no question over all conditions.

use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use semflow_core::aggregate::AggFunc;
use semflow_core::record::DataRecord;
use semflow_core::schema::{builtin, Schema, SchemaRef};

use crate::error::{Result, SolverError};
use crate::services::{PromptSignature, Services, Usage};
use crate::task::{TaskDescriptor, TaskKind, TaskParams};

/// A function result plus the model usage spent producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub usage: Usage,
}

impl<T> Outcome<T> {
    pub fn free(value: T) -> Self {
        Self {
            value,
            usage: Usage::default(),
        }
    }
}

pub type Converted = Result<Outcome<Option<DataRecord>>>;

/// `Ok(None)` is a per-record soft failure (e.g. schema mismatch).
pub type ConvertFn = Box<dyn Fn(&DataRecord) -> Converted + Send + Sync>;

pub type FilterFn = Box<dyn Fn(&DataRecord) -> Result<Outcome<bool>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardCoded {
    FileToPdf,
    FileToText,
    FileToImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionStrategy {
    FieldCopy,
    HardCoded(HardCoded),
    Llm,
}

impl ConversionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStrategy::FieldCopy => "field_copy",
            ConversionStrategy::HardCoded(_) => "hardcoded",
            ConversionStrategy::Llm => "llm",
        }
    }
}

/// Aggregate state machine: `init`, `merge` per record, `finalize` once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
}

impl AggregateFn {
    pub fn init(&self) -> i64 {
        match self {
            AggregateFn::Count => 0,
        }
    }

    pub fn merge(&self, state: i64, _record: &DataRecord) -> i64 {
        match self {
            AggregateFn::Count => state + 1,
        }
    }

    /// Single `Number` record carrying the result.
    pub fn finalize(&self, state: i64) -> DataRecord {
        match self {
            AggregateFn::Count => DataRecord::new(builtin::number()).with("value", state),
        }
    }
}

pub enum Synthesized {
    Convert(ConvertFn),
    Filter(FilterFn),
    Aggregate(AggregateFn),
}

impl std::fmt::Debug for Synthesized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Synthesized::Convert(_) => f.write_str("Convert(<fn>)"),
            Synthesized::Filter(_) => f.write_str("Filter(<fn>)"),
            Synthesized::Aggregate(a) => write!(f, "Aggregate({a:?})"),
        }
    }
}

type SchemaPair = (String, String);

pub struct Solver {
    simple: HashSet<SchemaPair>,
    hardcoded: HashMap<SchemaPair, HardCoded>,
    services: Services,
}

fn pair(output: &Schema, input: &Schema) -> SchemaPair {
    (output.name.clone(), input.name.clone())
}

impl Solver {
    pub fn new(services: Services) -> Self {
        let mut hardcoded = HashMap::new();
        hardcoded.insert(
            (builtin::PDF_FILE.to_string(), builtin::FILE.to_string()),
            HardCoded::FileToPdf,
        );
        hardcoded.insert(
            (builtin::TEXT_FILE.to_string(), builtin::FILE.to_string()),
            HardCoded::FileToText,
        );
        hardcoded.insert(
            (builtin::IMAGE_FILE.to_string(), builtin::FILE.to_string()),
            HardCoded::FileToImage,
        );
        Self {
            simple: HashSet::new(),
            hardcoded,
            services,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Declare that `output` can be built from `input` by copying fields.
    pub fn register_simple_conversion(&mut self, output: &Schema, input: &Schema) {
        self.simple.insert(pair(output, input));
    }

    /// True when no model call is needed to convert `input` into `output`.
    pub fn easy_conversion_available(&self, output: &Schema, input: &Schema) -> bool {
        self.resolve_conversion(output, input) != ConversionStrategy::Llm
    }

    pub fn resolve_conversion(&self, output: &Schema, input: &Schema) -> ConversionStrategy {
        let key = pair(output, input);
        if self.simple.contains(&key) {
            ConversionStrategy::FieldCopy
        } else if let Some(kind) = self.hardcoded.get(&key) {
            ConversionStrategy::HardCoded(*kind)
        } else {
            ConversionStrategy::Llm
        }
    }

    pub fn synthesize(&self, task: &TaskDescriptor) -> Result<Synthesized> {
        match (task.kind, &task.params) {
            (TaskKind::InduceFromCandidateOp, _) => Ok(Synthesized::Convert(
                self.synthesize_convert(task.output.clone(), task.input.clone()),
            )),
            (TaskKind::FilterCandidateOp, TaskParams::Conditions(conds)) => Ok(
                Synthesized::Filter(self.synthesize_filter(task.input.clone(), conds.clone())),
            ),
            (TaskKind::FilterCandidateOp, TaskParams::None) => Ok(Synthesized::Filter(
                self.synthesize_filter(task.input.clone(), Vec::new()),
            )),
            (TaskKind::ApplyAggFunctionOp, TaskParams::Aggregate(func)) => {
                Ok(Synthesized::Aggregate(self.synthesize_aggregate(*func)?))
            }
            _ => Err(SolverError::Unsupported(format!(
                "cannot synthesize function for task descriptor {task}"
            ))),
        }
    }

    pub fn synthesize_convert(&self, output: SchemaRef, input: SchemaRef) -> ConvertFn {
        let strategy = self.resolve_conversion(&output, &input);
        debug!(
            output = %output.name,
            input = %input.name,
            strategy = strategy.as_str(),
            "resolved conversion"
        );
        match strategy {
            ConversionStrategy::FieldCopy => field_copy_fn(output, input),
            ConversionStrategy::HardCoded(kind) => self.hardcoded_fn(kind, output, input),
            ConversionStrategy::Llm => self.llm_convert_fn(output),
        }
    }

    /// Predicate over records of `schema`. The model sees the record's full
    /// JSON, byte fields included as lossy UTF-8.
    pub fn synthesize_filter(&self, schema: SchemaRef, conditions: Vec<String>) -> FilterFn {
        if conditions.is_empty() {
            return Box::new(|_: &DataRecord| -> Result<Outcome<bool>> { Ok(Outcome::free(true)) });
        }
        let condition = conditions.join(" and ");
        let sig = PromptSignature {
            doc_schema: schema.to_string(),
            doc_type: schema.name.clone(),
        };
        let llm = self.services.llm.clone();
        debug!(schema = %schema.name, %condition, "resolved llm filter");
        Box::new(move |candidate: &DataRecord| -> Result<Outcome<bool>> {
            if *candidate.schema != *schema {
                return Ok(Outcome::free(false));
            }
            let llm = llm.as_ref().ok_or_else(|| {
                SolverError::MissingCredential("no LLM service configured for filter".into())
            })?;
            let completion = llm.cot_bool(&candidate.as_json().to_string(), &condition, &sig)?;
            Ok(Outcome {
                value: completion.answer == "TRUE",
                usage: completion.usage,
            })
        })
    }

    pub fn synthesize_aggregate(&self, func: AggFunc) -> Result<AggregateFn> {
        match func {
            AggFunc::Count => Ok(AggregateFn::Count),
            other => Err(SolverError::Unsupported(format!(
                "cannot synthesize aggregation function for {other}"
            ))),
        }
    }

    fn hardcoded_fn(&self, kind: HardCoded, output: SchemaRef, input: SchemaRef) -> ConvertFn {
        match kind {
            HardCoded::FileToPdf => {
                let extractor = self.services.pdf.clone();
                Box::new(move |candidate: &DataRecord| -> Converted {
                    if candidate.schema_name() != input.name {
                        return Ok(Outcome::free(None));
                    }
                    let Some((filename, contents)) = file_parts(candidate) else {
                        return Ok(Outcome::free(None));
                    };
                    let text = extractor.extract_text(&filename, &contents)?;
                    let dr = DataRecord::derived(output.clone(), candidate)
                        .with("filename", filename)
                        .with("contents", contents)
                        .with("text_contents", text);
                    Ok(Outcome::free(Some(dr)))
                })
            }
            HardCoded::FileToText => Box::new(move |candidate: &DataRecord| -> Converted {
                if candidate.schema_name() != input.name {
                    return Ok(Outcome::free(None));
                }
                let Some((filename, contents)) = file_parts(candidate) else {
                    return Ok(Outcome::free(None));
                };
                let dr = DataRecord::derived(output.clone(), candidate)
                    .with("filename", filename)
                    .with("contents", String::from_utf8_lossy(&contents).into_owned());
                Ok(Outcome::free(Some(dr)))
            }),
            HardCoded::FileToImage => {
                let vision = self.services.vision.clone();
                Box::new(move |candidate: &DataRecord| -> Converted {
                    if candidate.schema_name() != input.name {
                        return Ok(Outcome::free(None));
                    }
                    let vision = vision.as_ref().ok_or_else(|| {
                        SolverError::MissingCredential(
                            "OPENAI_API_KEY not configured for image analysis".into(),
                        )
                    })?;
                    let Some((filename, contents)) = file_parts(candidate) else {
                        return Ok(Outcome::free(None));
                    };
                    let completion = vision.describe_image(&STANDARD.encode(&contents))?;
                    let dr = DataRecord::derived(output.clone(), candidate)
                        .with("filename", filename)
                        .with("contents", completion.answer);
                    Ok(Outcome {
                        value: Some(dr),
                        usage: completion.usage,
                    })
                })
            }
        }
    }

    fn llm_convert_fn(&self, output: SchemaRef) -> ConvertFn {
        let llm = self.services.llm.clone();
        let sig = PromptSignature {
            doc_schema: output.to_string(),
            doc_type: output.name.clone(),
        };
        Box::new(move |candidate: &DataRecord| -> Converted {
            let llm = llm.as_ref().ok_or_else(|| {
                SolverError::MissingCredential("no LLM service configured for conversion".into())
            })?;
            let context = candidate.as_text_json();
            let mut dr = DataRecord::derived(output.clone(), candidate);
            let mut usage = Usage::default();
            for field in &output.fields {
                let question = format!(
                    "What is the {} of the {}? ({})",
                    field.name, sig.doc_type, field.desc
                );
                let completion = llm.cot_qa(&context, &question, &sig)?;
                usage.add(completion.usage);
                dr.set(field.name.clone(), completion.answer);
            }
            Ok(Outcome {
                value: Some(dr),
                usage,
            })
        })
    }
}

fn field_copy_fn(output: SchemaRef, input: SchemaRef) -> ConvertFn {
    Box::new(move |candidate: &DataRecord| -> Converted {
        if *candidate.schema != *input {
            return Ok(Outcome::free(None));
        }
        let mut dr = DataRecord::derived(output.clone(), candidate);
        for field in &output.fields {
            match candidate.get(&field.name) {
                Some(v) => dr.set(field.name.clone(), v.clone()),
                None if field.required => return Ok(Outcome::free(None)),
                None => {}
            }
        }
        Ok(Outcome::free(Some(dr)))
    })
}

/// `(filename, contents)` of a file-like record.
fn file_parts(candidate: &DataRecord) -> Option<(String, Vec<u8>)> {
    let filename = candidate.get("filename")?.as_str()?.to_string();
    let contents = candidate.get("contents")?.as_bytes()?.to_vec();
    Some((filename, contents))
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("simple", &self.simple)
            .field("hardcoded", &self.hardcoded)
            .field("llm", &self.services.llm.is_some())
            .field("vision", &self.services.vision.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Completion, LlmService, TextExtractor, VisionService};
    use semflow_core::schema::Field;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        answers: Mutex<Vec<String>>,
        questions: Mutex<Vec<String>>,
        contexts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
                questions: Mutex::new(Vec::new()),
                contexts: Mutex::new(Vec::new()),
            })
        }
    }

    impl LlmService for Scripted {
        fn model(&self) -> &str {
            "scripted"
        }
        fn cot_qa(&self, _c: &str, q: &str, _s: &PromptSignature) -> Result<Completion> {
            self.questions.lock().unwrap().push(q.to_string());
            let a = self.answers.lock().unwrap().pop().unwrap_or_default();
            Ok(Completion::new(a, Usage::new(10.0, 2.0)))
        }
        fn cot_bool(&self, c: &str, cond: &str, _s: &PromptSignature) -> Result<Completion> {
            self.contexts.lock().unwrap().push(c.to_string());
            self.questions.lock().unwrap().push(cond.to_string());
            let a = self.answers.lock().unwrap().pop().unwrap_or_default();
            Ok(Completion::new(a, Usage::new(10.0, 1.0)))
        }
    }

    fn email() -> SchemaRef {
        Schema::new(
            "Email",
            "An email",
            vec![
                Field::string("sender", "The sender").required(),
                Field::string("subject", "The subject"),
            ],
        )
        .into_ref()
    }

    fn file(name: &str, body: &[u8]) -> DataRecord {
        DataRecord::new(builtin::file())
            .with("filename", name)
            .with("contents", body.to_vec())
    }

    #[test]
    fn field_copy_beats_hardcoded_beats_llm() {
        let mut solver = Solver::new(Services::default());
        let pdf = builtin::pdf_file();
        let f = builtin::file();
        assert_eq!(
            solver.resolve_conversion(&pdf, &f),
            ConversionStrategy::HardCoded(HardCoded::FileToPdf)
        );
        solver.register_simple_conversion(&pdf, &f);
        assert_eq!(solver.resolve_conversion(&pdf, &f), ConversionStrategy::FieldCopy);
        assert_eq!(solver.resolve_conversion(&email(), &f), ConversionStrategy::Llm);
        assert!(!solver.easy_conversion_available(&email(), &f));
    }

    #[test]
    fn field_copy_soft_fails_on_mismatch_or_missing_required() {
        let mut solver = Solver::new(Services::default());
        solver.register_simple_conversion(&builtin::pdf_file(), &builtin::file());
        let convert = solver.synthesize_convert(builtin::pdf_file(), builtin::file());

        // text_contents is required and absent on File.
        let out = convert(&file("a.pdf", b"x")).unwrap();
        assert!(out.value.is_none());

        let wrong = DataRecord::new(builtin::number()).with("value", 1i64);
        assert!(convert(&wrong).unwrap().value.is_none());
    }

    #[test]
    fn field_copy_copies_declared_fields() {
        let mut solver = Solver::new(Services::default());
        let text = builtin::text_file();
        solver.register_simple_conversion(&text, &text);
        let convert = solver.synthesize_convert(text.clone(), text.clone());
        let src = DataRecord::new(text)
            .with("filename", "n.txt")
            .with("contents", "body")
            .with("extra", 1i64);
        let out = convert(&src).unwrap().value.unwrap();
        assert_eq!(out.get("contents").and_then(|v| v.as_str()), Some("body"));
        assert!(!out.has_field("extra"));
        assert_eq!(out.parent_id, Some(src.id));
    }

    #[test]
    fn file_to_text_and_pdf_are_hardcoded() {
        let solver = Solver::new(Services::default());
        let to_text = solver.synthesize_convert(builtin::text_file(), builtin::file());
        let out = to_text(&file("a.txt", b"hello")).unwrap().value.unwrap();
        assert_eq!(out.get("contents").and_then(|v| v.as_str()), Some("hello"));
        assert!(out.is_complete());

        let to_pdf = solver.synthesize_convert(builtin::pdf_file(), builtin::file());
        let out = to_pdf(&file("a.pdf", b"%PDF-1 (Hi) Tj")).unwrap().value.unwrap();
        assert_eq!(out.get("text_contents").and_then(|v| v.as_str()), Some("Hi"));
        assert!(out.is_complete());
    }

    #[test]
    fn image_conversion_requires_credential_before_any_call() {
        let solver = Solver::new(Services::default());
        let to_image = solver.synthesize_convert(builtin::image_file(), builtin::file());
        let err = to_image(&file("a.png", b"\x89PNG")).unwrap_err();
        assert!(matches!(err, SolverError::MissingCredential(_)));
    }

    #[test]
    fn llm_conversion_asks_one_question_per_field() {
        let llm = Scripted::new(&["alice@x.org", "Hello"]);
        let solver = Solver::new(Services::default().with_llm(llm.clone()));
        let convert = solver.synthesize_convert(email(), builtin::text_file());
        let src = DataRecord::new(builtin::text_file())
            .with("filename", "m.eml")
            .with("contents", "From: alice");
        let out = convert(&src).unwrap();
        let rec = out.value.unwrap();
        assert_eq!(rec.get("sender").and_then(|v| v.as_str()), Some("alice@x.org"));
        assert_eq!(rec.get("subject").and_then(|v| v.as_str()), Some("Hello"));
        assert_eq!(out.usage, Usage::new(20.0, 4.0));
        let qs = llm.questions.lock().unwrap();
        assert_eq!(qs[0], "What is the sender of the Email? (The sender)");
    }

    #[test]
    fn filter_matches_exact_true_only() {
        let llm = Scripted::new(&["TRUE", "true", "TRUE."]);
        let solver = Solver::new(Services::default().with_llm(llm.clone()));
        let schema = email();
        let filter =
            solver.synthesize_filter(schema.clone(), vec!["is urgent".into(), "is short".into()]);
        let rec = DataRecord::new(schema).with("sender", "a");
        assert!(filter(&rec).unwrap().value);
        assert!(!filter(&rec).unwrap().value);
        assert!(!filter(&rec).unwrap().value);
        assert_eq!(llm.questions.lock().unwrap()[0], "is urgent and is short");

        let other = DataRecord::new(builtin::number()).with("value", 1i64);
        assert!(!filter(&other).unwrap().value);
    }

    #[test]
    fn filter_context_is_the_full_record() {
        let llm = Scripted::new(&["TRUE"]);
        let solver = Solver::new(Services::default().with_llm(llm.clone()));
        let filter = solver.synthesize_filter(builtin::file(), vec!["mentions lunch".into()]);
        let rec = file("memo.txt", b"lunch at noon");
        assert!(filter(&rec).unwrap().value);

        let contexts = llm.contexts.lock().unwrap();
        assert_eq!(contexts[0], rec.as_json().to_string());
        assert!(contexts[0].contains("lunch at noon"));
        assert!(!contexts[0].contains("[binary"));
    }

    #[test]
    fn empty_filter_passes_everything_without_a_model() {
        let solver = Solver::new(Services::default());
        let filter = solver.synthesize_filter(email(), vec![]);
        let rec = DataRecord::new(builtin::number());
        assert!(filter(&rec).unwrap().value);
    }

    #[test]
    fn count_aggregate_triple() {
        let solver = Solver::new(Services::default());
        let agg = solver.synthesize_aggregate(AggFunc::Count).unwrap();
        let rec = DataRecord::new(builtin::number());
        let state = (0..3).fold(agg.init(), |s, _| agg.merge(s, &rec));
        let out = agg.finalize(state);
        assert_eq!(out.schema_name(), builtin::NUMBER);
        assert_eq!(out.get("value"), Some(&semflow_core::types::Value::Int(3)));
        assert!(matches!(
            solver.synthesize_aggregate(AggFunc::Average),
            Err(SolverError::Unsupported(_))
        ));
    }

    struct Captioner;

    impl VisionService for Captioner {
        fn describe_image(&self, image_b64: &str) -> Result<Completion> {
            Ok(Completion::new(format!("{} b64 chars", image_b64.len()), Usage::new(50.0, 5.0)))
        }
    }

    struct Shouting;

    impl TextExtractor for Shouting {
        fn extract_text(&self, filename: &str, bytes: &[u8]) -> Result<String> {
            Ok(format!("{filename}: {}", String::from_utf8_lossy(bytes).to_uppercase()))
        }
    }

    #[test]
    fn pluggable_vision_and_pdf_capabilities() {
        let services = Services::default()
            .with_vision(Arc::new(Captioner))
            .with_pdf(Arc::new(Shouting));
        let solver = Solver::new(services);

        let to_image = solver.synthesize_convert(builtin::image_file(), builtin::file());
        let out = to_image(&file("a.png", b"abc")).unwrap();
        let rec = out.value.unwrap();
        assert_eq!(rec.get("contents").and_then(|v| v.as_str()), Some("4 b64 chars"));
        assert_eq!(out.usage, Usage::new(50.0, 5.0));

        let to_pdf = solver.synthesize_convert(builtin::pdf_file(), builtin::file());
        let rec = to_pdf(&file("r.pdf", b"hi")).unwrap().value.unwrap();
        assert_eq!(rec.get("text_contents").and_then(|v| v.as_str()), Some("r.pdf: HI"));
        assert!(rec.is_complete());
    }
}
