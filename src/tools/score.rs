//! Scoring operations: variant and interval scores, in-silico mutagenesis, ranking.

use serde::Deserialize;
use serde_json::{json, Value};

use super::predict::{variant_invocation, variant_with_window, variants_in_interval};
use super::registry::{Arity, Operation};
use super::{require_any_success, schema, Defaults, Plan};
use crate::engine::{EngineInvocation, EngineResult};
use crate::error::GatewayResult;
use crate::genome::validate::{self, IntervalFields, Violations};
use crate::genome::{GenomicInterval, RawInterval, RawVariant, Variant, MAX_INTERVAL_WIDTH, MAX_ISM_WIDTH};

pub const OPERATIONS: &[Operation] = &[
    Operation {
        name: "score_variant",
        description: "Score a variant's effect with the recommended variant scorers.",
        arity: Arity::Single,
        input_schema: score_variant_schema,
        plan: plan_score_variant,
    },
    Operation {
        name: "score_variants",
        description: "Score several variants within one interval in parallel. Results keep \
            input order; each item succeeds or fails on its own.",
        arity: Arity::Batch,
        input_schema: score_variants_schema,
        plan: plan_score_variants,
    },
    Operation {
        name: "score_interval",
        description: "Score a genomic interval with the recommended interval scorers.",
        arity: Arity::Single,
        input_schema: score_interval_schema,
        plan: plan_score_interval,
    },
    Operation {
        name: "score_intervals",
        description: "Score several genomic intervals in parallel. Results keep input order.",
        arity: Arity::Batch,
        input_schema: score_intervals_schema,
        plan: plan_score_intervals,
    },
    Operation {
        name: "score_ism_variants",
        description: "In-silico mutagenesis: score every single-base substitution in a \
            target window (at most 10 bp) within an analysis interval.",
        arity: Arity::Single,
        input_schema: score_ism_variants_schema,
        plan: plan_score_ism_variants,
    },
    Operation {
        name: "rank_variants_by_impact",
        description: "Score several variants and list them with their scores for ranking.",
        arity: Arity::Batch,
        input_schema: rank_variants_schema,
        plan: plan_rank_variants,
    },
];

const DEFAULT_RANKING_METRIC: &str = "composite";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantParams {
    #[serde(flatten)]
    variant: RawVariant,
    interval_start: i64,
    interval_end: i64,
    #[serde(default)]
    organism: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantsParams {
    variants: Vec<Value>,
    interval: Value,
    #[serde(default)]
    organism: Option<String>,
    #[serde(default)]
    max_workers: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalParams {
    #[serde(flatten)]
    interval: RawInterval,
    #[serde(default)]
    organism: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalsParams {
    intervals: Vec<Value>,
    #[serde(default)]
    organism: Option<String>,
    #[serde(default)]
    max_workers: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IsmParams {
    #[serde(flatten)]
    interval: RawInterval,
    #[serde(default)]
    ism_chromosome: Option<String>,
    ism_start: i64,
    ism_end: i64,
    #[serde(default)]
    organism: Option<String>,
    #[serde(default)]
    max_workers: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankParams {
    variants: Vec<Value>,
    interval: Value,
    #[serde(default)]
    organism: Option<String>,
    #[serde(default)]
    ranking_metric: Option<String>,
    #[serde(default)]
    max_workers: Option<i64>,
}

fn organism(v: &mut Violations, raw: Option<&str>, defaults: &Defaults) -> String {
    validate::organism(v, "organism", raw, &defaults.organism)
}

fn interval_invocation(operation: &str, interval: &GenomicInterval) -> EngineInvocation {
    EngineInvocation::new(operation)
        .arg("chromosome", &interval.chromosome)
        .arg("start", interval.start)
        .arg("end", interval.end)
}

fn variants_schema(description: &str) -> Value {
    json!({
        "type": "array",
        "description": description,
        "items": schema::variant_object(),
        "minItems": 1
    })
}

fn score_variant_schema() -> Value {
    schema::object(
        vec![
            ("chromosome", schema::chromosome()),
            ("position", schema::position("Variant position (1-based)")),
            ("ref", schema::allele("Reference allele")),
            ("alt", schema::allele("Alternate allele")),
            ("intervalStart", schema::position("Analysis interval start")),
            ("intervalEnd", schema::position("Analysis interval end")),
            ("organism", schema::organism()),
        ],
        &["chromosome", "position", "ref", "alt", "intervalStart", "intervalEnd"],
    )
}

fn plan_score_variant(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "score_variant";
    let params: VariantParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let (variant, interval) =
        variant_with_window(&mut v, &params.variant, params.interval_start, params.interval_end);
    let organism = organism(&mut v, params.organism.as_deref(), defaults);
    let (variant, interval) = v.finish(OP, variant.zip(interval))?;

    Ok(Plan::Single(
        variant_invocation(OP, &variant, &interval).arg("organism", organism),
    ))
}

fn score_variants_schema() -> Value {
    schema::object(
        vec![
            ("variants", variants_schema("Variants to score")),
            ("interval", schema::interval_object("Analysis interval containing the variants")),
            ("organism", schema::organism()),
            ("maxWorkers", schema::max_workers()),
        ],
        &["variants", "interval"],
    )
}

fn plan_score_variants(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "score_variants";
    let params: VariantsParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let (variants, interval) = variants_in_interval(&mut v, &params.variants, &params.interval);
    let organism = organism(&mut v, params.organism.as_deref(), defaults);
    let workers = validate::workers(&mut v, "maxWorkers", params.max_workers, defaults.workers);
    let interval = v.finish(OP, interval)?;

    Ok(Plan::Batch {
        invocations: score_invocations(&variants, &interval, &organism),
        workers,
    })
}

fn score_invocations(
    variants: &[Variant],
    interval: &GenomicInterval,
    organism: &str,
) -> Vec<EngineInvocation> {
    variants
        .iter()
        .map(|variant| variant_invocation("score_variant", variant, interval).arg("organism", organism))
        .collect()
}

fn score_interval_schema() -> Value {
    schema::object(
        vec![
            ("chromosome", schema::chromosome()),
            ("start", schema::position("Start position (1-based)")),
            ("end", schema::position("End position, greater than start")),
            ("organism", schema::organism()),
        ],
        &["chromosome", "start", "end"],
    )
}

fn plan_score_interval(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "score_interval";
    let params: IntervalParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let interval = validate::interval(
        &mut v,
        &IntervalFields::flat(),
        &params.interval,
        Some(MAX_INTERVAL_WIDTH),
    );
    let organism = organism(&mut v, params.organism.as_deref(), defaults);
    let interval = v.finish(OP, interval)?;

    Ok(Plan::Single(
        interval_invocation(OP, &interval).arg("organism", organism),
    ))
}

fn score_intervals_schema() -> Value {
    schema::object(
        vec![
            (
                "intervals",
                json!({
                    "type": "array",
                    "description": "Genomic intervals to score",
                    "items": schema::interval_object("Genomic interval"),
                    "minItems": 1
                }),
            ),
            ("organism", schema::organism()),
            ("maxWorkers", schema::max_workers()),
        ],
        &["intervals"],
    )
}

fn plan_score_intervals(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "score_intervals";
    let params: IntervalsParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let intervals = validate::batch(&mut v, "intervals", &params.intervals, |v, path, raw: RawInterval| {
        validate::interval(v, &IntervalFields::nested(path), &raw, Some(MAX_INTERVAL_WIDTH))
    });
    let organism = organism(&mut v, params.organism.as_deref(), defaults);
    let workers = validate::workers(&mut v, "maxWorkers", params.max_workers, defaults.workers);
    let intervals = v.finish(OP, Some(intervals))?;

    let invocations = intervals
        .iter()
        .map(|interval| interval_invocation("score_interval", interval).arg("organism", &organism))
        .collect();
    Ok(Plan::Batch {
        invocations,
        workers,
    })
}

fn score_ism_variants_schema() -> Value {
    schema::object(
        vec![
            ("chromosome", schema::chromosome()),
            ("start", schema::position("Analysis interval start")),
            ("end", schema::position("Analysis interval end")),
            (
                "ismChromosome",
                json!({
                    "type": "string",
                    "description": "Chromosome of the mutagenesis window (default: chromosome)",
                    "minLength": 1
                }),
            ),
            ("ismStart", schema::position("Mutagenesis window start")),
            (
                "ismEnd",
                json!({
                    "type": "integer",
                    "description": format!(
                        "Mutagenesis window end, at most {MAX_ISM_WIDTH} bp past ismStart"
                    ),
                    "minimum": 1
                }),
            ),
            ("organism", schema::organism()),
            ("maxWorkers", schema::max_workers()),
        ],
        &["chromosome", "start", "end", "ismStart", "ismEnd"],
    )
}

fn plan_score_ism_variants(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "score_ism_variants";
    let params: IsmParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let interval = validate::interval(
        &mut v,
        &IntervalFields::flat(),
        &params.interval,
        Some(MAX_INTERVAL_WIDTH),
    );
    let window = validate::interval(
        &mut v,
        &IntervalFields::named("ismChromosome", "ismStart", "ismEnd"),
        &RawInterval {
            chromosome: params
                .ism_chromosome
                .unwrap_or_else(|| params.interval.chromosome.clone()),
            start: params.ism_start,
            end: params.ism_end,
        },
        Some(MAX_ISM_WIDTH),
    );
    let organism = organism(&mut v, params.organism.as_deref(), defaults);
    let workers = validate::workers(&mut v, "maxWorkers", params.max_workers, defaults.workers);
    let (interval, window) = v.finish(OP, interval.zip(window))?;

    Ok(Plan::Single(
        interval_invocation(OP, &interval)
            .arg("ism-chromosome", &window.chromosome)
            .arg("ism-start", window.start)
            .arg("ism-end", window.end)
            .arg("organism", organism)
            .arg("max-workers", workers),
    ))
}

fn rank_variants_schema() -> Value {
    schema::object(
        vec![
            ("variants", variants_schema("Variants to rank")),
            ("interval", schema::interval_object("Analysis interval containing the variants")),
            ("organism", schema::organism()),
            (
                "rankingMetric",
                json!({
                    "type": "string",
                    "description": format!("Ranking metric (default: {DEFAULT_RANKING_METRIC})"),
                    "minLength": 1
                }),
            ),
            ("maxWorkers", schema::max_workers()),
        ],
        &["variants", "interval"],
    )
}

fn plan_rank_variants(arguments: Value, defaults: &Defaults) -> GatewayResult<Plan> {
    const OP: &str = "rank_variants_by_impact";
    let params: RankParams = validate::parse_arguments(OP, arguments)?;
    let mut v = Violations::new();
    let (variants, interval) = variants_in_interval(&mut v, &params.variants, &params.interval);
    let organism = organism(&mut v, params.organism.as_deref(), defaults);
    let workers = validate::workers(&mut v, "maxWorkers", params.max_workers, defaults.workers);
    let metric = match params.ranking_metric.as_deref() {
        None => Some(DEFAULT_RANKING_METRIC.to_owned()),
        Some(raw) => validate::text(&mut v, "rankingMetric", raw),
    };
    let (interval, metric) = v.finish(OP, interval.zip(metric))?;

    Ok(Plan::Gather {
        invocations: score_invocations(&variants, &interval, &organism),
        workers,
        gather: Box::new(move |results| rank(&variants, &interval, &metric, results)),
    })
}

/// List each variant with its scores or its own error, in input order.
///
/// Fails only when no variant could be scored.
fn rank(
    variants: &[Variant],
    interval: &GenomicInterval,
    metric: &str,
    results: Vec<EngineResult>,
) -> EngineResult {
    let results = require_any_success(results)?;
    let ranked: Vec<Value> = variants
        .iter()
        .zip(results)
        .enumerate()
        .map(|(i, (variant, result))| {
            let mut entry = json!({
                "rank": i + 1,
                "variant": variant.to_string(),
                "chromosome": variant.chromosome,
                "position": variant.position,
                "ref": variant.reference,
                "alt": variant.alternate,
                "impact_category": "unknown",
            });
            match result {
                Ok(scores) => entry["scores"] = scores,
                Err(e) => entry["error"] = e.to_json(),
            }
            entry
        })
        .collect();

    Ok(json!({
        "ranked_variants": ranked,
        "total_variants": variants.len(),
        "ranking_metric": metric,
        "interval": interval.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, GatewayError};

    fn violation_fields(plan: GatewayResult<Plan>) -> Vec<String> {
        match plan {
            Err(GatewayError::Validation { violations, .. }) => {
                violations.into_iter().map(|f| f.field).collect()
            }
            Err(other) => panic!("expected validation error, got {other:?}"),
            Ok(_) => panic!("expected validation error"),
        }
    }

    fn variant(position: u64) -> Variant {
        Variant {
            chromosome: "chr1".to_owned(),
            position,
            reference: "A".to_owned(),
            alternate: "G".to_owned(),
        }
    }

    #[test]
    fn test_ism_window_too_wide() {
        let fields = violation_fields(plan_score_ism_variants(
            json!({
                "chromosome": "chr1", "start": 1_000_000, "end": 1_002_048,
                "ismStart": 1_001_000, "ismEnd": 1_001_015
            }),
            &Defaults::default(),
        ));
        assert_eq!(fields, vec!["ismEnd"]);
    }

    #[test]
    fn test_ism_defaults_chromosome_and_workers() {
        let plan = plan_score_ism_variants(
            json!({
                "chromosome": "chr1", "start": 1_000_000, "end": 1_002_048,
                "ismStart": 1_001_000, "ismEnd": 1_001_010
            }),
            &Defaults::default(),
        )
        .expect("valid");
        let Plan::Single(invocation) = plan else {
            panic!("expected single invocation");
        };
        assert_eq!(invocation.value("ism-chromosome"), Some("chr1"));
        assert_eq!(invocation.value("max-workers"), Some("5"));
    }

    #[test]
    fn test_score_variant_with_inverted_interval() {
        let fields = violation_fields(plan_score_variant(
            json!({
                "chromosome": "chr1", "position": 1_001_000, "ref": "A", "alt": "G",
                "intervalStart": 1_002_048, "intervalEnd": 1_002_048
            }),
            &Defaults::default(),
        ));
        assert_eq!(fields, vec!["intervalEnd"]);
    }

    #[test]
    fn test_score_intervals_empty_batch() {
        let fields = violation_fields(plan_score_intervals(
            json!({"intervals": []}),
            &Defaults::default(),
        ));
        assert_eq!(fields, vec!["intervals"]);
    }

    #[test]
    fn test_rank_keeps_per_item_errors() {
        let interval = GenomicInterval {
            chromosome: "chr1".to_owned(),
            start: 1_000_000,
            end: 1_002_048,
        };
        let ranked = rank(
            &[variant(1_001_000), variant(1_001_500)],
            &interval,
            "composite",
            vec![
                Ok(json!({"quantile": 0.9})),
                Err(GatewayError::Engine {
                    operation: "score_variant".to_owned(),
                    message: "rejected".to_owned(),
                }),
            ],
        )
        .expect("one succeeded");
        assert_eq!(ranked["total_variants"], 2);
        assert_eq!(ranked["interval"], "chr1:1000000-1002048");
        let entries = ranked["ranked_variants"].as_array().expect("array");
        assert_eq!(entries[0]["variant"], "chr1:1001000A>G");
        assert_eq!(entries[0]["scores"]["quantile"], 0.9);
        assert_eq!(entries[1]["rank"], 2);
        assert_eq!(entries[1]["error"]["kind"], "engine_error");
    }

    #[test]
    fn test_rank_fails_when_nothing_scored() {
        let interval = GenomicInterval {
            chromosome: "chr1".to_owned(),
            start: 1,
            end: 100,
        };
        let err = rank(
            &[variant(10)],
            &interval,
            "composite",
            vec![Err(GatewayError::Protocol {
                operation: "score_variant".to_owned(),
                reason: "bad envelope".to_owned(),
            })],
        )
        .expect_err("nothing scored");
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }
}
