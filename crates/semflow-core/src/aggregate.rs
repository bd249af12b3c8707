//! Aggregate functions and group-by signatures.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{Field, FieldType, Schema, SchemaRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Count,
    Average,
}

impl AggFunc {
    /// Unknown names are an unsupported operation, never a silent default.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(AggFunc::Count),
            "average" | "avg" => Ok(AggFunc::Average),
            other => Err(Error::Unsupported(format!("aggregate function '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Average => "average",
        }
    }

    /// Output field name, e.g. `count(s)`.
    pub fn output_field(&self, target: &str) -> String {
        format!("{}({})", self.as_str(), target)
    }
}

impl std::fmt::Display for AggFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping fields plus parallel lists of aggregate functions and targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBySig {
    group_by_fields: Vec<String>,
    agg_funcs: Vec<AggFunc>,
    agg_fields: Vec<String>,
}

impl GroupBySig {
    pub fn new(
        group_by_fields: Vec<String>,
        agg_funcs: Vec<AggFunc>,
        agg_fields: Vec<String>,
    ) -> Result<Self> {
        if agg_funcs.len() != agg_fields.len() {
            return Err(Error::Schema(format!(
                "group-by declares {} aggregate functions but {} aggregate fields",
                agg_funcs.len(),
                agg_fields.len()
            )));
        }
        for (i, f) in group_by_fields.iter().enumerate() {
            if group_by_fields[..i].contains(f) {
                return Err(Error::Schema(format!("duplicate group-by field '{f}'")));
            }
        }
        Ok(Self {
            group_by_fields,
            agg_funcs,
            agg_fields,
        })
    }

    pub fn group_by_fields(&self) -> &[String] {
        &self.group_by_fields
    }

    pub fn agg_funcs(&self) -> &[AggFunc] {
        &self.agg_funcs
    }

    pub fn agg_fields(&self) -> &[String] {
        &self.agg_fields
    }

    /// `(function, target field)` pairs in declared order.
    pub fn aggregates(&self) -> impl Iterator<Item = (AggFunc, &str)> {
        self.agg_funcs
            .iter()
            .copied()
            .zip(self.agg_fields.iter().map(|s| s.as_str()))
    }

    /// Every field a record must carry to be grouped.
    pub fn required_input_fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.group_by_fields.iter().map(|s| s.as_str()).collect();
        for f in &self.agg_fields {
            if !out.contains(&f.as_str()) {
                out.push(f);
            }
        }
        out
    }

    /// Group-by fields first (types taken from `input` when declared there),
    /// then one numeric field per aggregate.
    pub fn output_schema(&self, input: &Schema) -> SchemaRef {
        let mut fields = Vec::with_capacity(self.group_by_fields.len() + self.agg_funcs.len());
        for name in &self.group_by_fields {
            let field = match input.field(name) {
                Some(f) => Field::new(name.clone(), f.field_type, f.desc.clone(), true),
                None => Field::new(name.clone(), FieldType::String, "group-by key", true),
            };
            fields.push(field);
        }
        for (func, target) in self.aggregates() {
            fields.push(Field::new(
                func.output_field(target),
                FieldType::Numeric,
                format!("{func} of {target}"),
                true,
            ));
        }
        Schema::new(
            format!("GroupBy({})", self.group_by_fields.join(",")),
            format!("Group-by over {}", input.name),
            fields,
        )
        .into_ref()
    }
}
