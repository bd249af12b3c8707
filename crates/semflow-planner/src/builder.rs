//! Fluent pipeline builder and naive logical plan construction.
//!
//! Each `Dataset` node is immutable and points at its source; its universal
//! identifier hashes the node's own description together with the source's
//! identifier, so equal pipelines get equal ids across runs. The id doubles
//! as the node's cache target.

use std::sync::Arc;

use tracing::debug;

use semflow_core::aggregate::{AggFunc, GroupBySig};
use semflow_core::hash::hash_str;
use semflow_core::schema::{builtin, SchemaRef};
use semflow_io::DataDirectory;
use semflow_operators::Cardinality;

use crate::error::{PlanError, Result};
use crate::logical::{LogicalOperator, LogicalPlan};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Source {
        dataset_id: String,
    },
    Convert {
        cardinality: Cardinality,
        depends_on: Option<Vec<String>>,
    },
    Filter {
        conditions: Vec<String>,
        depends_on: Option<Vec<String>>,
    },
    GroupBy(GroupBySig),
    Aggregate(AggFunc),
    Limit(usize),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    schema: SchemaRef,
    source: Option<Arc<Node>>,
    uid: String,
}

fn describe(kind: &NodeKind, schema: &SchemaRef) -> String {
    let deps = |d: &Option<Vec<String>>| match d {
        Some(d) => format!("[{}]", d.join(",")),
        None => "*".to_string(),
    };
    match kind {
        NodeKind::Source { dataset_id } => format!("source:{dataset_id}:{schema}"),
        NodeKind::Convert {
            cardinality,
            depends_on,
        } => format!("convert:{schema}:{}:{}", cardinality.as_str(), deps(depends_on)),
        NodeKind::Filter {
            conditions,
            depends_on,
        } => format!("filter:{}:{}", conditions.join(" and "), deps(depends_on)),
        NodeKind::GroupBy(sig) => {
            let aggs: Vec<String> = sig.aggregates().map(|(f, t)| f.output_field(t)).collect();
            format!("groupby:{}:{}", sig.group_by_fields().join(","), aggs.join(","))
        }
        NodeKind::Aggregate(func) => format!("aggregate:{func}"),
        NodeKind::Limit(n) => format!("limit:{n}"),
    }
}

impl Node {
    fn new(kind: NodeKind, schema: SchemaRef, source: Option<Arc<Node>>) -> Self {
        let upstream = source.as_ref().map(|s| s.uid.as_str()).unwrap_or("");
        let uid = hash_str(&format!("{}|{upstream}", describe(&kind, &schema))).to_hex();
        Self {
            kind,
            schema,
            source,
            uid,
        }
    }
}

/// A declarative pipeline: a source followed by zero or more steps.
#[derive(Debug, Clone)]
pub struct Dataset {
    node: Arc<Node>,
}

impl Dataset {
    /// Records of the registered dataset `dataset_id`, read as `schema`.
    pub fn source(dataset_id: impl Into<String>, schema: SchemaRef) -> Self {
        let kind = NodeKind::Source {
            dataset_id: dataset_id.into(),
        };
        Self {
            node: Arc::new(Node::new(kind, schema, None)),
        }
    }

    fn then(&self, kind: NodeKind, schema: SchemaRef) -> Self {
        Self {
            node: Arc::new(Node::new(kind, schema, Some(self.node.clone()))),
        }
    }

    pub fn convert(&self, schema: SchemaRef) -> Self {
        self.convert_with(schema, Cardinality::OneToOne, None)
    }

    pub fn convert_with(
        &self,
        schema: SchemaRef,
        cardinality: Cardinality,
        depends_on: Option<Vec<String>>,
    ) -> Self {
        self.then(
            NodeKind::Convert {
                cardinality,
                depends_on,
            },
            schema,
        )
    }

    pub fn filter(&self, condition: impl Into<String>) -> Self {
        self.filter_with(vec![condition.into()], None)
    }

    pub fn filter_with(&self, conditions: Vec<String>, depends_on: Option<Vec<String>>) -> Self {
        self.then(
            NodeKind::Filter {
                conditions,
                depends_on,
            },
            self.schema(),
        )
    }

    pub fn group_by(&self, sig: GroupBySig) -> Self {
        let schema = sig.output_schema(&self.node.schema);
        self.then(NodeKind::GroupBy(sig), schema)
    }

    pub fn aggregate(&self, func: AggFunc) -> Self {
        self.then(NodeKind::Aggregate(func), builtin::number())
    }

    pub fn count(&self) -> Self {
        self.aggregate(AggFunc::Count)
    }

    pub fn average(&self) -> Self {
        self.aggregate(AggFunc::Average)
    }

    pub fn limit(&self, n: usize) -> Self {
        self.then(NodeKind::Limit(n), self.schema())
    }

    pub fn schema(&self) -> SchemaRef {
        self.node.schema.clone()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.node.kind
    }

    pub fn universal_identifier(&self) -> &str {
        &self.node.uid
    }

    /// Registered dataset the pipeline reads.
    pub fn dataset_id(&self) -> &str {
        let mut node = &self.node;
        while let Some(src) = &node.source {
            node = src;
        }
        match &node.kind {
            NodeKind::Source { dataset_id } => dataset_id,
            _ => "",
        }
    }

    /// Nodes source-first.
    fn chain(&self) -> Vec<Arc<Node>> {
        let mut out = vec![self.node.clone()];
        let mut node = &self.node;
        while let Some(src) = &node.source {
            out.push(src.clone());
            node = src;
        }
        out.reverse();
        out
    }
}

/// `(kind, schema, uid)` of one step while the naive plan is assembled.
#[derive(Debug, Clone)]
struct Step {
    kind: NodeKind,
    schema: SchemaRef,
    uid: String,
}

/// Build the naive logical plan for `dataset`, declared order.
///
/// - A first convert to the source's own schema is dropped.
/// - An `ImageFile` source is read as `File` and converted to `ImageFile`.
/// - The last step with a published cache (unless caching is off) replaces
///   everything before it with a `CacheScan`.
pub fn naive_logical_plan(dataset: &Dataset, ctx: &DataDirectory) -> Result<LogicalPlan> {
    let nodes = dataset.chain();
    let mut steps: Vec<Step> = nodes
        .iter()
        .map(|n| Step {
            kind: n.kind.clone(),
            schema: n.schema.clone(),
            uid: n.uid.clone(),
        })
        .collect();

    let dataset_id = match &steps[0].kind {
        NodeKind::Source { dataset_id } => dataset_id.clone(),
        other => {
            return Err(PlanError::Contract(format!(
                "pipeline does not start at a source: {other:?}"
            )))
        }
    };

    if steps.len() > 1
        && matches!(steps[1].kind, NodeKind::Convert { .. })
        && steps[1].schema == steps[0].schema
    {
        steps.remove(1);
    }

    if steps[0].schema.name == builtin::IMAGE_FILE {
        let image = steps[0].schema.clone();
        steps[0].schema = builtin::file();
        let kind = NodeKind::Convert {
            cardinality: Cardinality::OneToOne,
            depends_on: None,
        };
        let uid = hash_str(&format!("{}|{}", describe(&kind, &image), steps[0].uid)).to_hex();
        steps.insert(
            1,
            Step {
                kind,
                schema: image,
                uid,
            },
        );
    }

    let mut start = 1;
    let mut operators = vec![LogicalOperator::BaseScan {
        dataset_id: dataset_id.clone(),
        output_schema: steps[0].schema.clone(),
    }];
    if !ctx.config().no_cache {
        for (i, step) in steps.iter().enumerate().rev() {
            if ctx.has_cached_answer(&step.uid)? {
                debug!(cache = %step.uid, position = i, "reusing cached result");
                operators = vec![LogicalOperator::CacheScan {
                    cache_id: step.uid.clone(),
                    output_schema: step.schema.clone(),
                }];
                start = i + 1;
                break;
            }
        }
    }

    for i in start..steps.len() {
        let input = steps[i - 1].schema.clone();
        let step = &steps[i];
        let target = Some(step.uid.clone());
        let op = match &step.kind {
            NodeKind::Filter {
                conditions,
                depends_on,
            } => LogicalOperator::FilteredScan {
                input_schema: input,
                output_schema: step.schema.clone(),
                conditions: conditions.clone(),
                depends_on: depends_on.clone(),
                target_cache_id: target,
            },
            NodeKind::GroupBy(sig) => LogicalOperator::GroupByAggregate {
                input_schema: input,
                output_schema: step.schema.clone(),
                gby_sig: sig.clone(),
                target_cache_id: target,
            },
            NodeKind::Aggregate(func) => LogicalOperator::ApplyAggregateFunction {
                input_schema: input,
                output_schema: step.schema.clone(),
                func: *func,
                target_cache_id: target,
            },
            NodeKind::Limit(n) => LogicalOperator::LimitScan {
                input_schema: input,
                output_schema: step.schema.clone(),
                limit: *n,
                target_cache_id: target,
            },
            NodeKind::Convert {
                cardinality,
                depends_on,
            } => {
                if step.schema == input {
                    return Err(PlanError::Contract(format!(
                        "convert at step {i} does not change the schema {input}"
                    )));
                }
                LogicalOperator::ConvertScan {
                    input_schema: input,
                    output_schema: step.schema.clone(),
                    cardinality: *cardinality,
                    depends_on: depends_on.clone(),
                    target_cache_id: target,
                }
            }
            NodeKind::Source { .. } => {
                return Err(PlanError::Contract(format!(
                    "source node in the middle of a pipeline at step {i}"
                )))
            }
        };
        operators.push(op);
    }

    Ok(LogicalPlan::new(operators, dataset_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semflow_core::config::EngineConfig;
    use semflow_core::record::DataRecord;
    use semflow_core::schema::{Field, Schema};

    fn email() -> SchemaRef {
        Schema::new(
            "Email",
            "An email",
            vec![
                Field::string("filename", "name"),
                Field::string("contents", "body"),
                Field::string("sender", "from"),
            ],
        )
        .into_ref()
    }

    fn ctx() -> DataDirectory {
        DataDirectory::in_memory(EngineConfig::default())
    }

    #[test]
    fn identifiers_are_stable_and_chain_sensitive() {
        let a = Dataset::source("d", builtin::text_file()).convert(email()).filter("urgent");
        let b = Dataset::source("d", builtin::text_file()).convert(email()).filter("urgent");
        let c = Dataset::source("e", builtin::text_file()).convert(email()).filter("urgent");
        assert_eq!(a.universal_identifier(), b.universal_identifier());
        assert_ne!(a.universal_identifier(), c.universal_identifier());
        assert_eq!(c.dataset_id(), "e");
    }

    #[test]
    fn naive_plan_in_declared_order() {
        let ds = Dataset::source("d", builtin::file())
            .convert(builtin::text_file())
            .convert(email())
            .filter("from alice")
            .limit(3);
        let plan = naive_logical_plan(&ds, &ctx()).unwrap();
        let kinds: Vec<_> = plan.operators.iter().map(|o| o.kind_name()).collect();
        assert_eq!(
            kinds,
            vec!["BaseScan", "ConvertScan", "ConvertScan", "FilteredScan", "LimitScan"]
        );
        assert_eq!(plan.dataset_id, "d");
        assert_eq!(plan.operators[4].target_cache_id(), Some(ds.universal_identifier()));
        plan.validate().unwrap();
    }

    #[test]
    fn first_convert_to_source_schema_is_collapsed() {
        let ds = Dataset::source("d", builtin::text_file())
            .convert(builtin::text_file())
            .filter("x");
        let plan = naive_logical_plan(&ds, &ctx()).unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn image_sources_read_files_then_convert() {
        let ds = Dataset::source("imgs", builtin::image_file()).filter("has a dog");
        let plan = naive_logical_plan(&ds, &ctx()).unwrap();
        assert_eq!(plan.operators[0].output_schema().name, builtin::FILE);
        assert_eq!(plan.operators[1].kind_name(), "ConvertScan");
        assert_eq!(plan.operators[1].output_schema().name, builtin::IMAGE_FILE);
        plan.validate().unwrap();
    }

    #[test]
    fn non_changing_convert_is_a_contract_violation() {
        let ds = Dataset::source("d", builtin::file())
            .convert(builtin::text_file())
            .convert(builtin::text_file());
        assert!(matches!(
            naive_logical_plan(&ds, &ctx()),
            Err(PlanError::Contract(_))
        ));
    }

    #[test]
    fn published_cache_replaces_its_prefix() {
        let dd = ctx();
        let converted = Dataset::source("d", builtin::file()).convert(builtin::text_file());
        let ds = converted.filter("x");
        let uid = converted.universal_identifier().to_string();
        dd.open_cache(&uid).unwrap();
        dd.append_cache(&uid, &DataRecord::new(builtin::text_file())).unwrap();
        dd.close_cache(&uid).unwrap();

        let plan = naive_logical_plan(&ds, &dd).unwrap();
        assert_eq!(plan.operators[0].kind_name(), "CacheScan");
        assert_eq!(plan.len(), 2);

        let no_cache = DataDirectory::in_memory(EngineConfig {
            no_cache: true,
            ..EngineConfig::default()
        });
        assert_eq!(naive_logical_plan(&ds, &no_cache).unwrap().len(), 3);
    }
}
