//! Prediction operations: sequences, intervals, variants, and their batches.

use serde::Deserialize;
use serde_json::{json, Value};

use super::registry::{Arity, Operation};
use super::{schema, Defaults, Plan, RawPredictionOptions};
use crate::engine::{EngineInvocation, EngineResult};
use crate::error::{GatewayError, GatewayResult};
use crate::genome::validate::{self, IntervalFields, Violations};
use crate::genome::{GenomicInterval, RawInterval, RawVariant, Variant, MAX_INTERVAL_WIDTH};

pub const OPERATIONS: &[Operation] = &[
    Operation {
        name: "predict_sequence",
        description: "Predict regulatory tracks for a raw DNA sequence. Sequences of \
            2048, 16384, 131072, 524288 or 1048576 bases match the model's context sizes.",
        arity: Arity::Single,
        input_schema: predict_sequence_schema,
        plan: plan_predict_sequence,
    },
    Operation {
        name: "predict_interval",
        description: "Predict regulatory tracks for a genomic interval of the reference genome.",
        arity: Arity::Single,
        input_schema: predict_interval_schema,
        plan: plan_predict_interval,
    },
    Operation {
        name: "predict_variant",
        description: "Predict reference and alternate tracks for a variant within an interval.",
        arity: Arity::Single,
        input_schema: predict_variant_schema,
        plan: plan_predict_variant,
    },
    Operation {
        name: "predict_sequences",
        description: "Predict several DNA sequences in parallel. Results keep input order; \
            each item succeeds or fails on its own.",
        arity: Arity::Batch,
        input_schema: predict_sequences_schema,
        plan: plan_predict_sequences,
    },
    Operation {
        name: "predict_intervals",
        description: "Predict several genomic intervals in parallel. Results keep input order.",
        arity: Arity::Batch,
        input_schema: predict_intervals_schema,
        plan: plan_predict_intervals,
    },
    Operation {
        name: "predict_variants",
        description: "Predict the effect of several variants within one interval in parallel.",
        arity: Arity::Batch,
        input_schema: predict_variants_schema,
        plan: plan_predict_variants,
    },
    Operation {
        name: "compare_sequences",
        description: "Predict two DNA sequences side by side and report both predictions.",
        arity: Arity::Batch,
        input_schema: compare_sequences_schema,
        plan: plan_compare_sequences,
    },
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SequenceParams {
    sequence: String,
    #[serde(flatten)]
    options: RawPredictionOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalParams {
    #[serde(flatten)]
    interval: RawInterval,
    #[serde(flatten)]
    options: RawPredictionOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantParams {
    #[serde(flatten)]
    variant: RawVariant,
    interval_start: i64,
    interval_end: i64,
    #[serde(flatten)]
    options: RawPredictionOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SequencesParams {
    sequences: Vec<Value>,
    #[serde(default)]
    max_workers: Option<i64>,
    #[serde(flatten)]
    options: RawPredictionOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalsParams {
    intervals: Vec<Value>,
    #[serde(default)]
    max_workers: Option<i64>,
    #[serde(flatten)]
    options: RawPredictionOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantsParams {
    variants: Vec<Value>,
    interval: Value,
    #[serde(default)]
    max_workers: Option<i64>,
    #[serde(flatten)]
    options: RawPredictionOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareParams {
    sequence1: String,
    sequence2: String,
    #[serde(flatten)]
    options: RawPredictionOptions,
}

/// Engine arguments locating a variant and its analysis window.
pub(super) fn variant_invocation(
    operation: &str,
    variant: &Variant,
    interval: &GenomicInterval,
) -> EngineInvocation {
    EngineInvocation::new(operation)
        .arg("chromosome", &variant.chromosome)
        .arg("position", variant.position)
        .arg("ref", &variant.reference)
        .arg("alt", &variant.alternate)
        .arg("interval-start", interval.start)
        .arg("interval-end", interval.end)
}

/// Validate a shared analysis interval and the variants scored inside it.
///
/// Every variant must sit on the interval's chromosome.
pub(super) fn variants_in_interval(
    v: &mut Violations,
    raw_variants: &[Value],
    raw_interval: &Value,
) -> (Vec<Variant>, Option<GenomicInterval>) {
    let interval = validate::decode::<RawInterval>(v, "interval", raw_interval).and_then(|raw| {
        validate::interval(
            v,
            &IntervalFields::nested("interval"),
            &raw,
            Some(MAX_INTERVAL_WIDTH),
        )
    });
    let variants = validate::batch(v, "variants", raw_variants, |v, path, raw: RawVariant| {
        let variant = validate::variant(v, path, &raw)?;
        match &interval {
            Some(window) if window.chromosome != variant.chromosome => {
                v.push(
                    validate::field_path(path, "chromosome"),
                    format!(
                        "variant chromosome '{}' differs from interval chromosome '{}'",
                        variant.chromosome, window.chromosome
                    ),
                );
                None
            }
            _ => Some(variant),
        }
    });
    (variants, interval)
}

fn predict_sequence_schema() -> Value {
    let mut properties = vec![("sequence", schema::sequence("DNA sequence (A, T, G, C, N)"))];
    properties.extend(schema::prediction_options());
    schema::object(properties, &["sequence"])
}

fn plan_predict_sequence(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "predict_sequence";
    let params: SequenceParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let sequence = validate::sequence(&mut v, "sequence", &params.sequence);
    let options = params.options.validate(&mut v, defaults);
    let sequence = v.finish(OP, sequence)?;

    Ok(Plan::Single(
        options.apply(EngineInvocation::new(OP).input("sequence", sequence.as_str())),
    ))
}

fn predict_interval_schema() -> Value {
    let mut properties = vec![
        ("chromosome", schema::chromosome()),
        ("start", schema::position("Start position (1-based)")),
        ("end", schema::position("End position, greater than start")),
    ];
    properties.extend(schema::prediction_options());
    schema::object(properties, &["chromosome", "start", "end"])
}

fn plan_predict_interval(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "predict_interval";
    let params: IntervalParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let interval = validate::interval(
        &mut v,
        &IntervalFields::flat(),
        &params.interval,
        Some(MAX_INTERVAL_WIDTH),
    );
    let options = params.options.validate(&mut v, defaults);
    let interval = v.finish(OP, interval)?;

    Ok(Plan::Single(
        options.apply(
            EngineInvocation::new(OP)
                .arg("chromosome", &interval.chromosome)
                .arg("start", interval.start)
                .arg("end", interval.end),
        ),
    ))
}

fn predict_variant_schema() -> Value {
    let mut properties = vec![
        ("chromosome", schema::chromosome()),
        ("position", schema::position("Variant position (1-based)")),
        ("ref", schema::allele("Reference allele")),
        ("alt", schema::allele("Alternate allele")),
        ("intervalStart", schema::position("Analysis interval start")),
        ("intervalEnd", schema::position("Analysis interval end")),
    ];
    properties.extend(schema::prediction_options());
    schema::object(
        properties,
        &["chromosome", "position", "ref", "alt", "intervalStart", "intervalEnd"],
    )
}

fn plan_predict_variant(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "predict_variant";
    let params: VariantParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let (variant, interval) =
        variant_with_window(&mut v, &params.variant, params.interval_start, params.interval_end);
    let options = params.options.validate(&mut v, defaults);
    let (variant, interval) = v.finish(OP, variant.zip(interval))?;

    Ok(Plan::Single(options.apply(variant_invocation(OP, &variant, &interval))))
}

/// Validate a variant plus the `intervalStart`/`intervalEnd` window on its chromosome.
pub(super) fn variant_with_window(
    v: &mut Violations,
    raw: &RawVariant,
    interval_start: i64,
    interval_end: i64,
) -> (Option<Variant>, Option<GenomicInterval>) {
    let variant = validate::variant(v, "", raw);
    let interval = validate::interval(
        v,
        &IntervalFields::named("chromosome", "intervalStart", "intervalEnd"),
        &RawInterval {
            chromosome: raw.chromosome.clone(),
            start: interval_start,
            end: interval_end,
        },
        Some(MAX_INTERVAL_WIDTH),
    );
    (variant, interval)
}

fn predict_sequences_schema() -> Value {
    let mut properties = vec![
        (
            "sequences",
            json!({
                "type": "array",
                "description": "DNA sequences to predict",
                "items": schema::sequence("DNA sequence (A, T, G, C, N)"),
                "minItems": 1
            }),
        ),
        ("maxWorkers", schema::max_workers()),
    ];
    properties.extend(schema::prediction_options());
    schema::object(properties, &["sequences"])
}

fn plan_predict_sequences(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "predict_sequences";
    let params: SequencesParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let sequences = validate::batch(&mut v, "sequences", &params.sequences, |v, path, raw: String| {
        validate::sequence(v, path, &raw)
    });
    let workers = validate::workers(&mut v, "maxWorkers", params.max_workers, defaults.workers);
    let options = params.options.validate(&mut v, defaults);
    let sequences = v.finish(OP, Some(sequences))?;

    let invocations = sequences
        .iter()
        .map(|s| options.apply(EngineInvocation::new("predict_sequence").input("sequence", s.as_str())))
        .collect();
    Ok(Plan::Batch {
        invocations,
        workers,
    })
}

fn predict_intervals_schema() -> Value {
    let mut properties = vec![
        (
            "intervals",
            json!({
                "type": "array",
                "description": "Genomic intervals to predict",
                "items": schema::interval_object("Genomic interval"),
                "minItems": 1
            }),
        ),
        ("maxWorkers", schema::max_workers()),
    ];
    properties.extend(schema::prediction_options());
    schema::object(properties, &["intervals"])
}

fn plan_predict_intervals(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "predict_intervals";
    let params: IntervalsParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let intervals = validate::batch(&mut v, "intervals", &params.intervals, |v, path, raw: RawInterval| {
        validate::interval(v, &IntervalFields::nested(path), &raw, Some(MAX_INTERVAL_WIDTH))
    });
    let workers = validate::workers(&mut v, "maxWorkers", params.max_workers, defaults.workers);
    let options = params.options.validate(&mut v, defaults);
    let intervals = v.finish(OP, Some(intervals))?;

    let invocations = intervals
        .iter()
        .map(|interval| {
            options.apply(
                EngineInvocation::new("predict_interval")
                    .arg("chromosome", &interval.chromosome)
                    .arg("start", interval.start)
                    .arg("end", interval.end),
            )
        })
        .collect();
    Ok(Plan::Batch {
        invocations,
        workers,
    })
}

fn predict_variants_schema() -> Value {
    let mut properties = vec![
        (
            "variants",
            json!({
                "type": "array",
                "description": "Variants to predict",
                "items": schema::variant_object(),
                "minItems": 1
            }),
        ),
        ("interval", schema::interval_object("Analysis interval containing the variants")),
        ("maxWorkers", schema::max_workers()),
    ];
    properties.extend(schema::prediction_options());
    schema::object(properties, &["variants", "interval"])
}

fn plan_predict_variants(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "predict_variants";
    let params: VariantsParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let (variants, interval) = variants_in_interval(&mut v, &params.variants, &params.interval);
    let workers = validate::workers(&mut v, "maxWorkers", params.max_workers, defaults.workers);
    let options = params.options.validate(&mut v, defaults);
    let interval = v.finish(OP, interval)?;

    let invocations = variants
        .iter()
        .map(|variant| options.apply(variant_invocation("predict_variant", variant, &interval)))
        .collect();
    Ok(Plan::Batch {
        invocations,
        workers,
    })
}

fn compare_sequences_schema() -> Value {
    let mut properties = vec![
        ("sequence1", schema::sequence("First DNA sequence")),
        ("sequence2", schema::sequence("Second DNA sequence")),
    ];
    properties.extend(schema::prediction_options());
    schema::object(properties, &["sequence1", "sequence2"])
}

fn plan_compare_sequences(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "compare_sequences";
    let params: CompareParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let first = validate::sequence(&mut v, "sequence1", &params.sequence1);
    let second = validate::sequence(&mut v, "sequence2", &params.sequence2);
    let options = params.options.validate(&mut v, defaults);
    let (first, second) = v.finish(OP, first.zip(second))?;

    let lengths = (first.len(), second.len());
    let invocations = [first, second]
        .iter()
        .map(|s| options.apply(EngineInvocation::new("predict_sequence").input("sequence", s.as_str())))
        .collect();
    Ok(Plan::Gather {
        invocations,
        workers: 2,
        gather: Box::new(move |results| compare(lengths, results)),
    })
}

/// Both predictions are required; the first failure is the answer.
fn compare(lengths: (usize, usize), results: Vec<EngineResult>) -> EngineResult {
    let mut predictions = results.into_iter();
    let (Some(first), Some(second)) = (predictions.next(), predictions.next()) else {
        return Err(GatewayError::Protocol {
            operation: "compare_sequences".to_owned(),
            reason: "expected two predictions".to_owned(),
        });
    };
    let (first, second) = (first?, second?);
    Ok(json!({
        "sequence1": { "length": lengths.0, "predictions": first },
        "sequence2": { "length": lengths.1, "predictions": second },
        "comparison": { "length_difference": lengths.0.abs_diff(lengths.1) },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn plan(op: fn(Value, &Defaults) -> GatewayResult<Plan>, args: Value) -> GatewayResult<Plan> {
        op(args, &Defaults::default())
    }

    fn single(plan: GatewayResult<Plan>) -> EngineInvocation {
        match plan.expect("valid") {
            Plan::Single(invocation) => invocation,
            _ => panic!("expected single invocation"),
        }
    }

    fn violation_fields(plan: GatewayResult<Plan>) -> Vec<String> {
        match plan {
            Err(GatewayError::Validation { violations, .. }) => {
                violations.into_iter().map(|f| f.field).collect()
            }
            Err(other) => panic!("expected validation error, got {other:?}"),
            Ok(_) => panic!("expected validation error"),
        }
    }

    #[test]
    fn test_predict_interval_arguments() {
        let invocation = single(plan(
            plan_predict_interval,
            json!({"chromosome": "chr1", "start": 1_000_000, "end": 1_002_048, "organism": "human"}),
        ));
        assert_eq!(invocation.operation(), "predict_interval");
        assert_eq!(invocation.value("start"), Some("1000000"));
        assert_eq!(invocation.value("end"), Some("1002048"));
        assert_eq!(invocation.value("organism"), Some("human"));
    }

    #[test]
    fn test_predict_sequence_uppercases_and_defaults() {
        let invocation = single(plan(
            plan_predict_sequence,
            json!({"sequence": "acgtn", "outputTypes": ["dnase"]}),
        ));
        assert_eq!(invocation.input_value("sequence"), Some(&json!("ACGTN")));
        assert_eq!(invocation.value("sequence"), None);
        assert_eq!(invocation.value("organism"), Some("human"));
        assert_eq!(invocation.value("output-types"), Some(r#"["DNASE"]"#));
    }

    #[test]
    fn test_predict_variant_with_inverted_window() {
        let fields = violation_fields(plan(
            plan_predict_variant,
            json!({
                "chromosome": "chr1", "position": 1_001_000, "ref": "A", "alt": "G",
                "intervalStart": 1_002_000, "intervalEnd": 1_000_000
            }),
        ));
        assert_eq!(fields, vec!["intervalEnd"]);
    }

    #[test]
    fn test_missing_required_argument() {
        let err = plan(plan_predict_sequence, json!({})).err().expect("error");
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn test_predict_sequences_reports_index() {
        let fields = violation_fields(plan(
            plan_predict_sequences,
            json!({"sequences": ["ACGT", "ACXT", 7], "maxWorkers": 11}),
        ));
        assert_eq!(fields, vec!["sequences[1]", "sequences[2]", "maxWorkers"]);
    }

    #[test]
    fn test_predict_variants_one_invocation_per_item() {
        let plan = plan(
            plan_predict_variants,
            json!({
                "variants": [
                    {"chromosome": "chr1", "position": 1_001_000, "ref": "A", "alt": "G"},
                    {"chromosome": "chr1", "position": 1_001_500, "ref": "C", "alt": "T"}
                ],
                "interval": {"chromosome": "chr1", "start": 1_000_000, "end": 1_002_048},
                "maxWorkers": 2
            }),
        )
        .expect("valid");
        let Plan::Batch { invocations, workers } = plan else {
            panic!("expected batch");
        };
        assert_eq!(workers, 2);
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[1].value("position"), Some("1001500"));
        assert_eq!(invocations[1].value("interval-end"), Some("1002048"));
    }

    #[test]
    fn test_predict_variants_chromosome_mismatch() {
        let fields = violation_fields(plan(
            plan_predict_variants,
            json!({
                "variants": [{"chromosome": "chr2", "position": 10, "ref": "A", "alt": "G"}],
                "interval": {"chromosome": "chr1", "start": 1, "end": 100}
            }),
        ));
        assert_eq!(fields, vec!["variants[0].chromosome"]);
    }

    #[test]
    fn test_compare_requires_both_predictions() {
        let ok = compare((4, 6), vec![Ok(json!({"a": 1})), Ok(json!({"b": 2}))]).expect("ok");
        assert_eq!(ok["comparison"]["length_difference"], 2);
        assert_eq!(ok["sequence2"]["predictions"]["b"], 2);

        let err = compare(
            (4, 6),
            vec![
                Ok(json!({})),
                Err(GatewayError::Engine {
                    operation: "predict_sequence".to_owned(),
                    message: "quota".to_owned(),
                }),
            ],
        )
        .expect_err("second failed");
        assert_eq!(err.kind(), ErrorKind::EngineError);
    }
}
