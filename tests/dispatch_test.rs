//! Dispatcher integration tests against an in-memory engine.

mod common;

use std::time::Duration;

use common::{echo_payload, router, FakeEngine};
use genome_gateway::tools::Outcome;
use genome_gateway::{ErrorKind, GatewayError};
use serde_json::json;

fn single(outcome: Result<Outcome, GatewayError>) -> serde_json::Value {
    match outcome.expect("dispatch should succeed") {
        Outcome::Single(payload) => payload,
        Outcome::Batch(_) => panic!("expected single outcome"),
    }
}

fn batch(outcome: Result<Outcome, GatewayError>) -> Vec<Result<serde_json::Value, GatewayError>> {
    match outcome.expect("dispatch should succeed") {
        Outcome::Batch(results) => results,
        Outcome::Single(_) => panic!("expected batch outcome"),
    }
}

fn violation_fields(err: &GatewayError) -> Vec<String> {
    match err {
        GatewayError::Validation { violations, .. } => {
            violations.iter().map(|f| f.field.clone()).collect()
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_interval_prediction_forwards_once_and_returns_payload_unchanged() {
    let payload = json!({"type": "prediction_output", "data": {"dnase": [0.1, 0.7]}});
    let expected = payload.clone();
    let (router, engine) = router(FakeEngine::with_responder(move |_| Ok(payload.clone())));

    let result = single(router.dispatch(
        "predict_interval",
        json!({"chromosome": "chr1", "start": 1_000_000, "end": 1_002_048, "organism": "human"}),
    ));

    assert_eq!(result, expected);
    let calls = engine.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation(), "predict_interval");
    assert_eq!(calls[0].value("chromosome"), Some("chr1"));
}

#[test]
fn test_variant_with_inverted_interval_never_reaches_engine() {
    let (router, engine) = router(FakeEngine::echo());

    let err = router
        .dispatch(
            "predict_variant",
            json!({
                "chromosome": "chr1", "position": 1_001_000, "ref": "A", "alt": "G",
                "intervalStart": 1_002_048, "intervalEnd": 1_000_000
            }),
        )
        .expect_err("inverted interval");

    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(violation_fields(&err), vec!["intervalEnd"]);
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_wide_ism_window_rejected_before_dispatch() {
    let (router, engine) = router(FakeEngine::echo());

    let err = router
        .dispatch(
            "score_ism_variants",
            json!({
                "chromosome": "chr1", "start": 1_000_000, "end": 1_002_048,
                "ismStart": 1_001_000, "ismEnd": 1_001_015
            }),
        )
        .expect_err("window too wide");

    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_oversized_sequence_rejected_without_engine() {
    let (router, engine) = router(FakeEngine::echo());
    let sequence = "A".repeat(1_000_001);

    for (name, args) in [
        ("predict_sequence", json!({"sequence": sequence})),
        ("predict_sequences", json!({"sequences": ["ACGT", sequence]})),
        ("compare_sequences", json!({"sequence1": "ACGT", "sequence2": sequence})),
    ] {
        let err = router.dispatch(name, args).expect_err("too long");
        assert_eq!(err.kind(), ErrorKind::ValidationError, "{name}");
    }
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_batch_failure_isolated_and_ordered() {
    let (router, engine) = router(
        FakeEngine::failing_when(|invocation| invocation.value("position") == Some("1001500"))
            .with_delay(Duration::from_millis(20)),
    );

    let results = batch(router.dispatch(
        "score_variants",
        json!({
            "variants": [
                {"chromosome": "chr1", "position": 1_001_000, "ref": "A", "alt": "G"},
                {"chromosome": "chr1", "position": 1_001_500, "ref": "C", "alt": "T"},
                {"chromosome": "chr1", "position": 1_002_000, "ref": "G", "alt": "A"}
            ],
            "interval": {"chromosome": "chr1", "start": 1_000_000, "end": 1_002_048},
            "maxWorkers": 2
        }),
    ));

    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().expect("first succeeds");
    assert_eq!(first["args"]["position"], "1001000");
    assert_eq!(
        results[1].as_ref().err().map(GatewayError::kind),
        Some(ErrorKind::EngineError)
    );
    let third = results[2].as_ref().expect("third succeeds");
    assert_eq!(third["args"]["position"], "1002000");

    assert_eq!(engine.call_count(), 3);
    assert!(engine.peak() <= 2, "peak {} exceeded bound", engine.peak());
}

#[test]
fn test_batch_concurrency_bound_respected() {
    let (router, engine) = router(FakeEngine::echo().with_delay(Duration::from_millis(15)));
    let sequences: Vec<String> = ["A", "C", "G", "T", "N", "AC", "GT", "NN"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();

    let results = batch(router.dispatch(
        "predict_sequences",
        json!({"sequences": sequences, "maxWorkers": 3}),
    ));

    assert_eq!(results.len(), 8);
    for (result, sequence) in results.iter().zip(&sequences) {
        let payload = result.as_ref().expect("success");
        assert_eq!(payload["input"]["sequence"], sequence.as_str());
    }
    assert!(engine.peak() <= 3);
}

#[test]
fn test_dispatch_is_not_cached() {
    let (router, engine) = router(FakeEngine::echo());
    let args = json!({"chromosome": "chr1", "start": 1_000_000, "end": 1_002_048});
    let before = router.registry().len();

    let first = single(router.dispatch("score_interval", args.clone()));
    let second = single(router.dispatch("score_interval", args));

    assert_eq!(first, second);
    assert_eq!(engine.call_count(), 2);
    assert_eq!(router.registry().len(), before);
}

#[test]
fn test_unknown_operation() {
    let (router, engine) = router(FakeEngine::echo());

    let err = router
        .dispatch("fold_protein", json!({}))
        .expect_err("unknown");

    assert_eq!(err.kind(), ErrorKind::UnknownOperation);
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_empty_batches_rejected() {
    let (router, engine) = router(FakeEngine::echo());

    for (name, args) in [
        ("predict_sequences", json!({"sequences": []})),
        ("predict_intervals", json!({"intervals": []})),
        ("score_intervals", json!({"intervals": []})),
        (
            "score_variants",
            json!({"variants": [], "interval": {"chromosome": "chr1", "start": 1, "end": 10}}),
        ),
    ] {
        let err = router.dispatch(name, args).expect_err("empty batch");
        let GatewayError::Validation { violations, .. } = err else {
            panic!("{name}: expected validation error");
        };
        assert!(
            violations
                .iter()
                .any(|v| v.reason == "at least one item required"),
            "{name}"
        );
    }
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_batch_validation_reports_failing_index() {
    let (router, engine) = router(FakeEngine::echo());

    let err = router
        .dispatch(
            "predict_intervals",
            json!({"intervals": [
                {"chromosome": "chr1", "start": 100, "end": 200},
                {"chromosome": "chr1", "start": 300, "end": 300},
                {"chromosome": "", "start": 1, "end": 2}
            ]}),
        )
        .expect_err("invalid items");

    assert_eq!(
        violation_fields(&err),
        vec!["intervals[1].end", "intervals[2].chromosome"]
    );
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_engine_errors_pass_through_single_calls() {
    let (router, _engine) = router(FakeEngine::with_responder(|invocation| {
        Err(GatewayError::Protocol {
            operation: invocation.operation().to_owned(),
            reason: "expected value at line 1 column 1".to_owned(),
        })
    }));

    let err = router
        .dispatch("get_metadata", json!({}))
        .expect_err("protocol error");
    assert_eq!(err.kind(), ErrorKind::ProtocolError);
    assert!(err.to_string().contains("expected value at line 1 column 1"));
}

#[test]
fn test_compare_sequences_issues_two_predictions() {
    let (router, engine) = router(FakeEngine::echo());

    let result = single(router.dispatch(
        "compare_sequences",
        json!({"sequence1": "ACGTACGT", "sequence2": "acg"}),
    ));

    assert_eq!(engine.call_count(), 2);
    assert_eq!(result["comparison"]["length_difference"], 5);
    assert_eq!(result["sequence2"]["predictions"]["input"]["sequence"], "ACG");
}

#[test]
fn test_rank_variants_keeps_failures_in_place() {
    let (router, engine) = router(FakeEngine::failing_when(|invocation| {
        invocation.value("ref") == Some("C")
    }));

    let result = single(router.dispatch(
        "rank_variants_by_impact",
        json!({
            "variants": [
                {"chromosome": "chr1", "position": 1_001_000, "ref": "A", "alt": "G"},
                {"chromosome": "chr1", "position": 1_001_500, "ref": "C", "alt": "T"}
            ],
            "interval": {"chromosome": "chr1", "start": 1_000_000, "end": 1_002_048}
        }),
    ));

    assert_eq!(engine.call_count(), 2);
    assert!(engine.calls().iter().all(|c| c.operation() == "score_variant"));
    assert_eq!(result["ranking_metric"], "composite");
    let ranked = result["ranked_variants"].as_array().expect("array");
    assert_eq!(ranked[0]["variant"], "chr1:1001000A>G");
    assert!(ranked[0].get("scores").is_some());
    assert_eq!(ranked[1]["error"]["kind"], "engine_error");
}

#[test]
fn test_local_operations_never_spawn() {
    let (router, engine) = router(FakeEngine::echo());

    for (name, args) in [
        ("parse_variant_string", json!({"variantString": "chr1:1001000:A>G"})),
        (
            "validate_genomic_data",
            json!({"dataType": "sequence", "data": {"sequence": "ACGT"}}),
        ),
        ("get_supported_outputs", json!({})),
        (
            "calculate_genomic_overlap",
            json!({
                "interval1": {"chromosome": "chr1", "start": 1, "end": 10},
                "interval2": {"chromosome": "chr1", "start": 5, "end": 20}
            }),
        ),
        ("get_sequence_info", json!({"sequence": "ACGT"})),
    ] {
        let outcome = router.dispatch(name, args);
        assert!(outcome.is_ok(), "{name}: {outcome:?}");
    }
    assert_eq!(engine.call_count(), 0);
}

#[test]
fn test_ism_forwards_window_and_workers() {
    let (router, engine) = router(FakeEngine::echo());

    let result = single(router.dispatch(
        "score_ism_variants",
        json!({
            "chromosome": "chr1", "start": 1_000_000, "end": 1_002_048,
            "ismStart": 1_001_000, "ismEnd": 1_001_010, "maxWorkers": 4
        }),
    ));

    assert_eq!(result, echo_payload(&engine.calls()[0]));
    assert_eq!(result["args"]["ism-chromosome"], "chr1");
    assert_eq!(result["args"]["max-workers"], "4");
}
