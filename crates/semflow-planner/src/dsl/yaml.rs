//! YAML → `Dataset` parser for linear semantic pipelines.
//!
//! Example:
//! ```yaml
//! config:
//!   llm_model: gpt-4o-mini
//!   policy: min_cost
//! schemas:
//!   - name: Email
//!     desc: "A single email"
//!     extends: TextFile
//!     fields:
//!       - { name: sender,  type: string, desc: "The email address of the sender", required: true }
//!       - { name: subject, type: string, desc: "The subject line" }
//! steps:
//!   - { op: source, dataset: enron, schema: TextFile, path: "data/enron" }
//!   - { op: convert, schema: Email }
//!   - { op: filter, condition: "The email is about a business meeting" }
//!   - { op: group_by, group_by: [sender], aggregates: [ { func: count, field: sender } ] }
//!   - { op: limit, n: 5 }
//! ```
//!
//! Schema names resolve against the inline `schemas:` list first, then the
//! builtin schemas (`File`, `TextFile`, `PDFFile`, `ImageFile`, `Number`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use semflow_core::aggregate::{AggFunc, GroupBySig};
use semflow_core::schema::{builtin, Field, FieldType, Schema, SchemaRef};
use semflow_operators::Cardinality;

use crate::builder::Dataset;
use crate::error::{PlanError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub config: Option<PipelineConfig>,
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDef {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    /// Schema whose fields are copied in ahead of `fields`.
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub required: bool,
}

fn default_field_type() -> String {
    "string".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Step {
    Source {
        dataset: String,
        schema: String,
        /// File or directory to register under `dataset` before running.
        #[serde(default)]
        path: Option<String>,
    },

    Convert {
        schema: String,
        #[serde(default)]
        cardinality: Option<String>,
        #[serde(default)]
        depends_on: Option<Vec<String>>,
    },

    Filter {
        #[serde(default)]
        condition: Option<String>,
        #[serde(default)]
        conditions: Vec<String>,
        #[serde(default)]
        depends_on: Option<Vec<String>>,
    },

    GroupBy {
        group_by: Vec<String>,
        #[serde(default)]
        aggregates: Vec<AggregateDef>,
    },

    Count,

    Average,

    Limit {
        n: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateDef {
    pub func: String,
    pub field: String,
}

/// Engine overrides carried by a pipeline file. Applied over env values and
/// under CLI flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm_service: Option<String>,
    pub llm_model: Option<String>,
    pub llm_endpoint: Option<String>,
    pub pdf_processing: Option<String>,
    pub pdf_endpoint: Option<String>,
    pub cache_dir: Option<String>,
    pub no_cache: Option<bool>,
    pub max_workers: Option<usize>,
    pub implicit_dependencies: Option<String>,
    /// `max_quality`, `min_cost` or `min_time`.
    pub policy: Option<String>,
    pub num_samples: Option<usize>,
    pub scan_start_idx: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ParsedPipeline {
    pub dataset: Dataset,
    pub config: PipelineConfig,
    /// Path declared on the source step, if any.
    pub source_path: Option<String>,
}

fn dsl_err(msg: impl Into<String>) -> PlanError {
    PlanError::Dsl(msg.into())
}

struct SchemaTable {
    custom: HashMap<String, SchemaRef>,
}

impl SchemaTable {
    fn build(defs: &[SchemaDef]) -> Result<Self> {
        let mut table = Self {
            custom: HashMap::new(),
        };
        for def in defs {
            if table.custom.contains_key(&def.name) || builtin::lookup(&def.name).is_some() {
                return Err(dsl_err(format!("schema '{}' is defined twice", def.name)));
            }
            let mut fields: Vec<Field> = match &def.extends {
                Some(base) => table.resolve(base)?.fields.clone(),
                None => Vec::new(),
            };
            for f in &def.fields {
                let field_type = FieldType::parse(&f.field_type).ok_or_else(|| {
                    dsl_err(format!(
                        "schema '{}': unknown type '{}' for field '{}'",
                        def.name, f.field_type, f.name
                    ))
                })?;
                let field = Field::new(f.name.clone(), field_type, f.desc.clone(), f.required);
                match fields.iter_mut().find(|existing| existing.name == f.name) {
                    Some(existing) => *existing = field,
                    None => fields.push(field),
                }
            }
            let schema = Schema::new(def.name.clone(), def.desc.clone(), fields).into_ref();
            table.custom.insert(def.name.clone(), schema);
        }
        Ok(table)
    }

    fn resolve(&self, name: &str) -> Result<SchemaRef> {
        self.custom
            .get(name)
            .cloned()
            .or_else(|| builtin::lookup(name))
            .ok_or_else(|| dsl_err(format!("unknown schema '{name}'")))
    }
}

/// Parse a YAML pipeline into a `Dataset` plus its config block.
pub fn parse_yaml_pipeline(yaml_src: &str) -> Result<ParsedPipeline> {
    let doc: Pipeline = serde_yaml::from_str(yaml_src)?;
    let schemas = SchemaTable::build(&doc.schemas)?;
    let mut cur: Option<Dataset> = None;
    let mut source_path = None;

    for (i, step) in doc.steps.into_iter().enumerate() {
        cur = Some(match (step, cur) {
            (
                Step::Source {
                    dataset,
                    schema,
                    path,
                },
                None,
            ) => {
                source_path = path;
                Dataset::source(dataset, schemas.resolve(&schema)?)
            }
            (Step::Source { .. }, Some(_)) => {
                return Err(dsl_err(format!("step {i}: only the first step may be a source")));
            }
            (s, None) => {
                return Err(dsl_err(format!("first step must be 'source', got {s:?}")));
            }
            (
                Step::Convert {
                    schema,
                    cardinality,
                    depends_on,
                },
                Some(input),
            ) => {
                let cardinality = match cardinality {
                    Some(c) => Cardinality::parse(&c)
                        .ok_or_else(|| dsl_err(format!("step {i}: unknown cardinality '{c}'")))?,
                    None => Cardinality::OneToOne,
                };
                input.convert_with(schemas.resolve(&schema)?, cardinality, depends_on)
            }
            (
                Step::Filter {
                    condition,
                    mut conditions,
                    depends_on,
                },
                Some(input),
            ) => {
                if let Some(c) = condition {
                    conditions.insert(0, c);
                }
                if conditions.is_empty() {
                    return Err(dsl_err(format!("step {i}: filter without a condition")));
                }
                input.filter_with(conditions, depends_on)
            }
            (
                Step::GroupBy {
                    group_by,
                    aggregates,
                },
                Some(input),
            ) => {
                let mut funcs = Vec::with_capacity(aggregates.len());
                let mut fields = Vec::with_capacity(aggregates.len());
                for agg in aggregates {
                    funcs.push(AggFunc::parse(&agg.func)?);
                    fields.push(agg.field);
                }
                input.group_by(GroupBySig::new(group_by, funcs, fields)?)
            }
            (Step::Count, Some(input)) => input.count(),
            (Step::Average, Some(input)) => input.average(),
            (Step::Limit { n }, Some(input)) => input.limit(n),
        });
    }

    let dataset = cur.ok_or_else(|| dsl_err("empty pipeline"))?;
    Ok(ParsedPipeline {
        dataset,
        config: doc.config.unwrap_or_default(),
        source_path,
    })
}
