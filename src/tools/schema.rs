//! JSON Schema fragments shared by the tool definitions.

use serde_json::{json, Value};

use crate::genome::variant_format::VariantFormat;
use crate::genome::{
    DEFAULT_ORGANISM, MAX_SEQUENCE_LENGTH, MAX_WORKERS, MIN_WORKERS, OUTPUT_TYPES,
};

pub fn sequence(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "pattern": "^[ATGCNatgcn]+$",
        "minLength": 1,
        "maxLength": MAX_SEQUENCE_LENGTH
    })
}

pub fn chromosome() -> Value {
    json!({
        "type": "string",
        "description": "Chromosome name (e.g. 'chr1', 'chrX')",
        "minLength": 1
    })
}

pub fn position(description: &str) -> Value {
    json!({ "type": "integer", "description": description, "minimum": 1 })
}

pub fn allele(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "pattern": "^[ATGCatgc]+$",
        "minLength": 1
    })
}

pub fn interval_object(description: &str) -> Value {
    json!({
        "type": "object",
        "description": description,
        "properties": {
            "chromosome": chromosome(),
            "start": position("Start position (1-based)"),
            "end": position("End position, greater than start")
        },
        "required": ["chromosome", "start", "end"]
    })
}

pub fn variant_object() -> Value {
    json!({
        "type": "object",
        "properties": {
            "chromosome": chromosome(),
            "position": position("Variant position (1-based)"),
            "ref": allele("Reference allele"),
            "alt": allele("Alternate allele")
        },
        "required": ["chromosome", "position", "ref", "alt"]
    })
}

pub fn organism() -> Value {
    json!({
        "type": "string",
        "description": format!("Organism (default: {DEFAULT_ORGANISM})"),
        "minLength": 1
    })
}

pub fn output_types() -> Value {
    let names: Vec<&str> = OUTPUT_TYPES.iter().map(|(name, _)| *name).collect();
    json!({
        "type": "array",
        "description": "Output tracks to request (default: all available)",
        "items": { "type": "string", "enum": names }
    })
}

pub fn ontology_terms() -> Value {
    json!({
        "type": "array",
        "description": "Ontology terms for tissue/cell-type context (e.g. 'UBERON:0002048')",
        "items": { "type": "string", "minLength": 1 }
    })
}

pub fn max_workers() -> Value {
    json!({
        "type": "integer",
        "description": "Maximum concurrent engine invocations",
        "minimum": MIN_WORKERS,
        "maximum": MAX_WORKERS
    })
}

pub fn variant_format() -> Value {
    let names: Vec<&str> = VariantFormat::ALL.iter().map(|f| f.as_str()).collect();
    json!({
        "type": "string",
        "description": "Variant string format (default: 'default')",
        "enum": names
    })
}

/// Object schema from `(name, schema)` pairs and required names.
pub fn object(properties: Vec<(&str, Value)>, required: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_owned(), schema))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// `organism`, `outputTypes` and `ontologyTerms`, in that order.
pub fn prediction_options() -> Vec<(&'static str, Value)> {
    vec![
        ("organism", organism()),
        ("outputTypes", output_types()),
        ("ontologyTerms", ontology_terms()),
    ]
}
