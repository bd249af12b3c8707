//! Schemas: named, ordered sets of typed field declarations.
//!
//! Schemas are compared only for equality and field-subset tests. The
//! "specialization" between e.g. `PDFFile` and `File` is just a superset of
//! fields; nothing dispatches on it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Shared handle; records and operators hold schemas by reference count.
pub type SchemaRef = Arc<Schema>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Bytes,
    Numeric,
    Boolean,
    List,
}

impl FieldType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" | "String" | "str" | "Utf8" => Some(FieldType::String),
            "bytes" | "Bytes" | "Binary" => Some(FieldType::Bytes),
            "numeric" | "Numeric" | "number" | "Float64" | "Int64" => Some(FieldType::Numeric),
            "boolean" | "Boolean" | "bool" => Some(FieldType::Boolean),
            "list" | "List" => Some(FieldType::List),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// Human-readable description; fed verbatim into LLM questions.
    pub desc: String,
    pub required: bool,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        desc: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            desc: desc.into(),
            required,
        }
    }

    pub fn string(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self::new(name, FieldType::String, desc, false)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            fields,
        }
    }

    pub fn into_ref(self) -> SchemaRef {
        Arc::new(self)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Fields declared here that `input` does not declare, in declaration order.
    pub fn generated_fields(&self, input: &Schema) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !input.has_field(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    /// True if every field of `self` is also declared (by name) on `other`.
    pub fn is_subset_of(&self, other: &Schema) -> bool {
        self.fields.iter().all(|f| other.has_field(&f.name))
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field.name)?;
        }
        write!(f, ")")
    }
}

/// Schemas almost every pipeline needs: files, text, PDFs, images, numbers.
pub mod builtin {
    use super::*;

    pub const FILE: &str = "File";
    pub const TEXT_FILE: &str = "TextFile";
    pub const PDF_FILE: &str = "PDFFile";
    pub const IMAGE_FILE: &str = "ImageFile";
    pub const NUMBER: &str = "Number";

    fn file_fields() -> Vec<Field> {
        vec![
            Field::new(
                "filename",
                FieldType::String,
                "The UNIX-style name of the file",
                true,
            ),
            Field::new(
                "contents",
                FieldType::Bytes,
                "The contents of the file",
                true,
            ),
        ]
    }

    pub fn file() -> SchemaRef {
        Schema::new(FILE, "A file with a name and raw contents", file_fields()).into_ref()
    }

    pub fn text_file() -> SchemaRef {
        let fields = vec![
            Field::new(
                "filename",
                FieldType::String,
                "The UNIX-style name of the file",
                true,
            ),
            Field::new(
                "contents",
                FieldType::String,
                "The text contents of the file",
                true,
            ),
        ];
        Schema::new(TEXT_FILE, "A file that contains only text", fields).into_ref()
    }

    pub fn pdf_file() -> SchemaRef {
        let mut fields = file_fields();
        fields.push(Field::new(
            "text_contents",
            FieldType::String,
            "The text-only contents of the PDF",
            true,
        ));
        Schema::new(PDF_FILE, "A file that is a PDF", fields).into_ref()
    }

    pub fn image_file() -> SchemaRef {
        let fields = vec![
            Field::new(
                "filename",
                FieldType::String,
                "The UNIX-style name of the file",
                true,
            ),
            Field::new(
                "contents",
                FieldType::String,
                "A textual description of the image",
                true,
            ),
        ];
        Schema::new(IMAGE_FILE, "A file that contains an image", fields).into_ref()
    }

    pub fn number() -> SchemaRef {
        Schema::new(
            NUMBER,
            "Just a number; used for aggregates",
            vec![Field::new("value", FieldType::Numeric, "A single number", true)],
        )
        .into_ref()
    }

    pub fn lookup(name: &str) -> Option<SchemaRef> {
        match name {
            FILE => Some(file()),
            TEXT_FILE => Some(text_file()),
            PDF_FILE => Some(pdf_file()),
            IMAGE_FILE => Some(image_file()),
            NUMBER => Some(number()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_fields_are_output_minus_input() {
        let pdf = builtin::pdf_file();
        let file = builtin::file();
        assert_eq!(pdf.generated_fields(&file), vec!["text_contents".to_string()]);
        assert!(file.generated_fields(&pdf).is_empty());
        assert!(file.is_subset_of(&pdf));
    }

    #[test]
    fn builtins_are_distinct_by_name() {
        assert_ne!(builtin::file(), builtin::text_file());
        assert_eq!(builtin::lookup("Number"), Some(builtin::number()));
        assert!(builtin::lookup("Email").is_none());
    }
}
