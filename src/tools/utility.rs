//! Metadata, capability and sequence utilities.
//!
//! `get_metadata` and `analyze_gene_region` go to the engine; the rest are
//! answered in-process from the same validators the engine-backed operations
//! use.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{json, Value};

use super::registry::{Arity, Operation};
use super::{schema, Defaults, Plan};
use crate::engine::EngineInvocation;
use crate::error::{GatewayError, GatewayResult};
use crate::genome::validate::{self, IntervalFields, Violations};
use crate::genome::variant_format::{self, VariantFormat};
use crate::genome::{
    GenomicInterval, RawInterval, RawVariant, MAX_INTERVAL_WIDTH, MAX_ISM_WIDTH,
    MAX_SEQUENCE_LENGTH, MAX_VARIANT_SCORERS, OUTPUT_TYPES, SUPPORTED_SEQUENCE_LENGTHS,
};

pub const OPERATIONS: &[Operation] = &[
    Operation {
        name: "get_metadata",
        description: "List the engine's output track metadata for an organism.",
        arity: Arity::Single,
        input_schema: get_metadata_schema,
        plan: plan_get_metadata,
    },
    Operation {
        name: "analyze_gene_region",
        description: "Analyze regulatory elements around a gene, with flanking sequence.",
        arity: Arity::Single,
        input_schema: analyze_gene_region_schema,
        plan: plan_analyze_gene_region,
    },
    Operation {
        name: "parse_variant_string",
        description: "Parse a variant string (default, gnomAD, GTEx, Open Targets formats) \
            into chromosome, position and alleles.",
        arity: Arity::Local,
        input_schema: parse_variant_string_schema,
        plan: plan_parse_variant_string,
    },
    Operation {
        name: "validate_genomic_data",
        description: "Check a sequence, interval or variant and report errors and warnings \
            without calling the engine.",
        arity: Arity::Local,
        input_schema: validate_genomic_data_schema,
        plan: plan_validate_genomic_data,
    },
    Operation {
        name: "get_supported_outputs",
        description: "List supported output types, sequence lengths, organisms and limits.",
        arity: Arity::Local,
        input_schema: get_supported_outputs_schema,
        plan: plan_get_supported_outputs,
    },
    Operation {
        name: "calculate_genomic_overlap",
        description: "Compute the intersection of two genomic intervals and the overlap \
            fraction of each.",
        arity: Arity::Local,
        input_schema: calculate_genomic_overlap_schema,
        plan: plan_calculate_genomic_overlap,
    },
    Operation {
        name: "get_sequence_info",
        description: "Base composition, GC content and supported-length check for a DNA sequence.",
        arity: Arity::Local,
        input_schema: get_sequence_info_schema,
        plan: plan_get_sequence_info,
    },
];

const DEFAULT_FLANKING_SIZE: i64 = 10_000;
const MAX_FLANKING_SIZE: i64 = 1_000_000;

const SUPPORTED_ORGANISMS: [&str; 1] = ["human"];

/// Named context sizes, matching [`SUPPORTED_SEQUENCE_LENGTHS`].
const SEQUENCE_LENGTH_NAMES: [&str; 5] = [
    "SEQUENCE_LENGTH_2KB",
    "SEQUENCE_LENGTH_16KB",
    "SEQUENCE_LENGTH_100KB",
    "SEQUENCE_LENGTH_500KB",
    "SEQUENCE_LENGTH_1MB",
];

#[derive(Debug, Deserialize)]
struct NoParams {}

#[derive(Debug, Deserialize)]
struct OrganismParams {
    #[serde(default)]
    organism: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneRegionParams {
    gene_symbol: String,
    #[serde(default)]
    organism: Option<String>,
    #[serde(default)]
    flanking_size: Option<i64>,
    #[serde(default)]
    output_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantStringParams {
    variant_string: String,
    #[serde(default)]
    variant_format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenomicDataParams {
    data_type: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct SequenceData {
    sequence: String,
}

#[derive(Debug, Deserialize)]
struct OverlapParams {
    interval1: Value,
    interval2: Value,
}

#[derive(Debug, Deserialize)]
struct SequenceParams {
    sequence: String,
}

fn get_metadata_schema() -> Value {
    schema::object(vec![("organism", schema::organism())], &[])
}

fn plan_get_metadata(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "get_metadata";
    let params: OrganismParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let organism = validate::organism(
        &mut v,
        "organism",
        params.organism.as_deref(),
        &defaults.organism,
    );
    let organism = v.finish(OP, Some(organism))?;
    Ok(Plan::Single(EngineInvocation::new(OP).arg("organism", organism)))
}

fn analyze_gene_region_schema() -> Value {
    schema::object(
        vec![
            (
                "geneSymbol",
                json!({
                    "type": "string",
                    "description": "Gene symbol (e.g. 'BRCA1', 'TP53')",
                    "minLength": 1
                }),
            ),
            ("organism", schema::organism()),
            (
                "flankingSize",
                json!({
                    "type": "integer",
                    "description": "Bases of flanking sequence on each side",
                    "default": DEFAULT_FLANKING_SIZE,
                    "minimum": 0,
                    "maximum": MAX_FLANKING_SIZE
                }),
            ),
            ("outputTypes", schema::output_types()),
        ],
        &["geneSymbol"],
    )
}

fn plan_analyze_gene_region(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "analyze_gene_region";
    let params: GeneRegionParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let gene = validate::text(&mut v, "geneSymbol", &params.gene_symbol);
    let organism = validate::organism(
        &mut v,
        "organism",
        params.organism.as_deref(),
        &defaults.organism,
    );
    let flanking = params.flanking_size.unwrap_or(DEFAULT_FLANKING_SIZE);
    if !(0..=MAX_FLANKING_SIZE).contains(&flanking) {
        v.push(
            "flankingSize",
            format!("must be between 0 and {MAX_FLANKING_SIZE}, got {flanking}"),
        );
    }
    let output_types = validate::output_types(&mut v, "outputTypes", params.output_types.as_deref());
    let gene = v.finish(OP, gene)?;

    Ok(Plan::Single(
        EngineInvocation::new(OP)
            .arg("gene-symbol", gene)
            .arg("organism", organism)
            .arg("flanking-size", flanking)
            .list_arg("output-types", &output_types),
    ))
}

fn parse_variant_string_schema() -> Value {
    schema::object(
        vec![
            (
                "variantString",
                json!({
                    "type": "string",
                    "description": "Variant string, e.g. 'chr1:1001000:A>G' or 'chr1-1001000-A-G'",
                    "minLength": 1
                }),
            ),
            ("variantFormat", schema::variant_format()),
        ],
        &["variantString"],
    )
}

fn plan_parse_variant_string(arguments: Value, _defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "parse_variant_string";
    let params: VariantStringParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let format = match params.variant_format.as_deref() {
        None => VariantFormat::Default,
        Some(raw) => raw.parse::<VariantFormat>().unwrap_or_else(|reason: String| {
            v.push("variantFormat", reason);
            VariantFormat::Default
        }),
    };
    let variant = if v.is_empty() {
        variant_format::parse(&mut v, "variantString", &params.variant_string, format)
    } else {
        None
    };
    let variant = v.finish(OP, variant)?;

    Ok(Plan::Local(json!({
        "chromosome": variant.chromosome,
        "position": variant.position,
        "reference_bases": variant.reference,
        "alternate_bases": variant.alternate,
        "name": params.variant_string.trim(),
        "parsed_format": format.as_str(),
    })))
}

fn validate_genomic_data_schema() -> Value {
    schema::object(
        vec![
            (
                "dataType",
                json!({
                    "type": "string",
                    "description": "Kind of data to check",
                    "enum": ["sequence", "interval", "variant"]
                }),
            ),
            (
                "data",
                json!({
                    "type": "object",
                    "description": "{sequence} | {chromosome, start, end} | {chromosome, position, ref, alt}"
                }),
            ),
        ],
        &["dataType", "data"],
    )
}

/// Reports problems as a successful payload; only an unknown `dataType` is
/// a caller error.
fn plan_validate_genomic_data(arguments: Value, _defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "validate_genomic_data";
    let params: GenomicDataParams = validate::parse_arguments(OP, arguments)?;
    let data_type = params.data_type.trim().to_ascii_lowercase();

    let mut found = Violations::new();
    let mut warnings = Vec::new();
    match data_type.as_str() {
        "sequence" => {
            let data = validate::decode::<SequenceData>(&mut found, "data", &params.data);
            if let Some(data) = data {
                let length = data.sequence.chars().count();
                validate::sequence(&mut found, "sequence", &data.sequence);
                if length > 0 && !SUPPORTED_SEQUENCE_LENGTHS.contains(&length) {
                    warnings.push(format!(
                        "sequence length {length} is not one of the supported lengths {SUPPORTED_SEQUENCE_LENGTHS:?}"
                    ));
                }
            }
        }
        "interval" => {
            if let Some(raw) = validate::decode::<RawInterval>(&mut found, "data", &params.data) {
                validate::interval(
                    &mut found,
                    &IntervalFields::flat(),
                    &raw,
                    Some(MAX_INTERVAL_WIDTH),
                );
            }
        }
        "variant" => {
            if let Some(raw) = validate::decode::<RawVariant>(&mut found, "data", &params.data) {
                validate::variant(&mut found, "", &raw);
            }
        }
        other => {
            return Err(GatewayError::invalid(
                OP,
                "dataType",
                format!("unknown data type '{other}'; expected sequence, interval or variant"),
            ));
        }
    }

    let errors: Vec<String> = found.into_inner().iter().map(ToString::to_string).collect();
    Ok(Plan::Local(json!({
        "valid": errors.is_empty(),
        "errors": errors,
        "warnings": warnings,
        "data_type": data_type,
    })))
}

fn get_supported_outputs_schema() -> Value {
    schema::object(Vec::new(), &[])
}

fn plan_get_supported_outputs(arguments: Value, _defaults: &Defaults) -> GatewayResult<Plan> {
    let _: NoParams = validate::parse_arguments("get_supported_outputs", arguments)?;

    let output_types: serde_json::Map<String, Value> = OUTPUT_TYPES
        .iter()
        .map(|(name, description)| ((*name).to_owned(), json!(description)))
        .collect();
    let lengths: serde_json::Map<String, Value> = SEQUENCE_LENGTH_NAMES
        .iter()
        .zip(SUPPORTED_SEQUENCE_LENGTHS)
        .map(|(name, length)| ((*name).to_owned(), json!(length)))
        .collect();
    let formats: Vec<&str> = VariantFormat::ALL.iter().map(|f| f.as_str()).collect();

    Ok(Plan::Local(json!({
        "output_types": output_types,
        "supported_sequence_lengths": lengths,
        "max_sequence_length": MAX_SEQUENCE_LENGTH,
        "max_interval_width": MAX_INTERVAL_WIDTH,
        "max_ism_interval_width": MAX_ISM_WIDTH,
        "max_variant_scorers_per_request": MAX_VARIANT_SCORERS,
        "supported_organisms": SUPPORTED_ORGANISMS,
        "variant_formats": formats,
    })))
}

fn calculate_genomic_overlap_schema() -> Value {
    schema::object(
        vec![
            ("interval1", schema::interval_object("First interval")),
            ("interval2", schema::interval_object("Second interval")),
        ],
        &["interval1", "interval2"],
    )
}

fn plan_calculate_genomic_overlap(arguments: Value, _defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "calculate_genomic_overlap";
    let params: OverlapParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let first = any_width_interval(&mut v, "interval1", &params.interval1);
    let second = any_width_interval(&mut v, "interval2", &params.interval2);
    let (first, second) = v.finish(OP, first.zip(second))?;

    Ok(Plan::Local(overlap(&first, &second)))
}

fn any_width_interval(v: &mut Violations, field: &str, raw: &Value) -> Option<GenomicInterval> {
    validate::decode::<RawInterval>(v, field, raw)
        .and_then(|raw| validate::interval(v, &IntervalFields::nested(field), &raw, None))
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Reported lengths count both endpoints (`end - start + 1`); whether two
/// intervals overlap at all is decided on `[start, end)`.
fn overlap(first: &GenomicInterval, second: &GenomicInterval) -> Value {
    let inclusive = |interval: &GenomicInterval| interval.width() + 1;
    let mut result = json!({
        "overlaps": first.overlaps(second),
        "interval1": first.to_string(),
        "interval2": second.to_string(),
    });
    if let Some(shared) = first.intersect(second) {
        let length = inclusive(&shared);
        let (first_length, second_length) = (inclusive(first), inclusive(second));
        result["intersection"] = json!({
            "chromosome": shared.chromosome,
            "start": shared.start,
            "end": shared.end,
            "length": length,
        });
        result["overlap_stats"] = json!({
            "overlap_length": length,
            "interval1_length": first_length,
            "interval2_length": second_length,
            "overlap_percentage_int1": round2(percent(length, first_length)),
            "overlap_percentage_int2": round2(percent(length, second_length)),
        });
    }
    result
}

fn get_sequence_info_schema() -> Value {
    schema::object(
        vec![(
            "sequence",
            json!({
                "type": "string",
                "description": "DNA sequence to analyze",
                "minLength": 1,
                "maxLength": MAX_SEQUENCE_LENGTH
            }),
        )],
        &["sequence"],
    )
}

/// Characters outside the alphabet are reported in the payload rather than
/// rejected.
fn plan_get_sequence_info(arguments: Value, _defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "get_sequence_info";
    let params: SequenceParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let length = params.sequence.chars().count();
    if length == 0 {
        v.push("sequence", "sequence must not be empty");
    } else if length > MAX_SEQUENCE_LENGTH {
        v.push(
            "sequence",
            format!("sequence length {length} exceeds maximum of {MAX_SEQUENCE_LENGTH}"),
        );
    }
    v.finish(OP, Some(()))?;

    Ok(Plan::Local(sequence_info(&params.sequence.to_ascii_uppercase())))
}

fn sequence_info(sequence: &str) -> Value {
    let count = |base: char| sequence.chars().filter(|&c| c == base).count() as u64;
    let (a, t, g, c, n) = (count('A'), count('T'), count('G'), count('C'), count('N'));
    let length = sequence.chars().count();
    let known = a + t + g + c;
    let gc = round2(percent(g + c, known));
    let invalid: BTreeSet<String> = sequence
        .chars()
        .filter(|c| !"ATGCN".contains(*c))
        .map(String::from)
        .collect();
    let closest = SUPPORTED_SEQUENCE_LENGTHS
        .iter()
        .copied()
        .min_by_key(|supported| supported.abs_diff(length))
        .unwrap_or(SUPPORTED_SEQUENCE_LENGTHS[0]);

    json!({
        "length": length,
        "base_counts": { "A": a, "T": t, "G": g, "C": c, "N": n },
        "gc_content": gc,
        "at_content": round2(100.0 - gc),
        "n_content": round2(percent(n, length as u64)),
        "is_valid": invalid.is_empty(),
        "invalid_characters": invalid,
        "is_supported_length": SUPPORTED_SEQUENCE_LENGTHS.contains(&length),
        "closest_supported_length": closest,
        "supported_lengths": SUPPORTED_SEQUENCE_LENGTHS,
    })
}
