//! Argument validation rules.
//!
//! Validators never stop at the first problem: each one records every
//! violated field into a [`Violations`] collector and returns `None` when the
//! value is unusable. The caller turns the collector into a single
//! [`GatewayError::Validation`] with [`Violations::finish`].

use std::collections::BTreeSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    GenomicInterval, GenomicSequence, MAX_SEQUENCE_LENGTH, MAX_WORKERS, MIN_WORKERS, OUTPUT_TYPES,
    RawInterval, RawVariant, Variant,
};
use crate::error::{GatewayError, GatewayResult};

const SEQUENCE_ALPHABET: &str = "ATGCN";
const ALLELE_ALPHABET: &str = "ATGC";

/// Distinct offending characters shown in a message before truncating.
const MAX_REPORTED_CHARS: usize = 10;

/// One violated field and the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Collector for field violations.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation. Repeats of an identical violation are dropped.
    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        let violation = FieldViolation::new(field, reason);
        if !self.0.contains(&violation) {
            self.0.push(violation);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<FieldViolation> {
        self.0
    }

    /// Resolve the collected state into the validated value.
    ///
    /// Any recorded violation wins over `value`. A `None` value with nothing
    /// recorded is reported against `arguments` rather than silently accepted.
    pub fn finish<T>(self, operation: &str, value: Option<T>) -> GatewayResult<T> {
        if !self.0.is_empty() {
            return Err(GatewayError::Validation {
                operation: operation.to_owned(),
                violations: self.0,
            });
        }
        value.ok_or_else(|| GatewayError::invalid(operation, "arguments", "invalid arguments"))
    }
}

/// Deserialize the raw tool arguments into `T`.
///
/// A missing argument object is treated as `{}` so operations whose fields
/// are all optional accept a bare call.
pub fn parse_arguments<T: DeserializeOwned>(
    operation: &str,
    arguments: serde_json::Value,
) -> GatewayResult<T> {
    let arguments = if arguments.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| GatewayError::invalid(operation, "arguments", e.to_string()))
}

/// Field path `prefix.name`, or just `name` at the top level.
pub fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Deserialize a structured argument, recording failures under `field`.
pub fn decode<T: DeserializeOwned>(
    v: &mut Violations,
    field: &str,
    raw: &serde_json::Value,
) -> Option<T> {
    match T::deserialize(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            v.push(field, e.to_string());
            None
        }
    }
}

/// Validate a required free-text argument. Returns it trimmed.
pub fn text(v: &mut Violations, field: &str, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        v.push(field, "must not be empty");
        return None;
    }
    Some(trimmed.to_owned())
}

fn invalid_characters(raw: &str, alphabet: &str) -> BTreeSet<char> {
    raw.chars()
        .filter(|c| !alphabet.contains(c.to_ascii_uppercase()))
        .collect()
}

fn describe_characters(chars: &BTreeSet<char>) -> String {
    let mut shown: Vec<String> = chars
        .iter()
        .take(MAX_REPORTED_CHARS)
        .map(|c| format!("'{}'", c.escape_default()))
        .collect();
    if chars.len() > MAX_REPORTED_CHARS {
        shown.push("...".to_owned());
    }
    shown.join(", ")
}

/// Validate a DNA sequence. Returns it upper-cased.
pub fn sequence(v: &mut Violations, field: &str, raw: &str) -> Option<GenomicSequence> {
    if raw.is_empty() {
        v.push(field, "sequence must not be empty");
        return None;
    }
    let before = v.len();
    let length = raw.chars().count();
    if length > MAX_SEQUENCE_LENGTH {
        v.push(
            field,
            format!("sequence length {length} exceeds maximum of {MAX_SEQUENCE_LENGTH}"),
        );
    }
    let invalid = invalid_characters(raw, SEQUENCE_ALPHABET);
    if !invalid.is_empty() {
        v.push(
            field,
            format!(
                "invalid characters {}; only A, T, G, C, N are allowed",
                describe_characters(&invalid)
            ),
        );
    }
    (v.len() == before).then(|| GenomicSequence::new_unchecked(raw.to_ascii_uppercase()))
}

/// Names under which an interval's three fields are reported.
#[derive(Debug, Clone)]
pub struct IntervalFields {
    pub chromosome: String,
    pub start: String,
    pub end: String,
}

impl IntervalFields {
    /// Top-level `chromosome` / `start` / `end`.
    pub fn flat() -> Self {
        Self::named("chromosome", "start", "end")
    }

    /// Fields of an object argument, e.g. `interval.start` or `intervals[2].end`.
    pub fn nested(prefix: &str) -> Self {
        Self {
            chromosome: field_path(prefix, "chromosome"),
            start: field_path(prefix, "start"),
            end: field_path(prefix, "end"),
        }
    }

    pub fn named(chromosome: &str, start: &str, end: &str) -> Self {
        Self {
            chromosome: chromosome.to_owned(),
            start: start.to_owned(),
            end: end.to_owned(),
        }
    }
}

/// Validate an interval against an optional width ceiling.
pub fn interval(
    v: &mut Violations,
    fields: &IntervalFields,
    raw: &RawInterval,
    max_width: Option<u64>,
) -> Option<GenomicInterval> {
    let before = v.len();
    let chromosome = raw.chromosome.trim();
    if chromosome.is_empty() {
        v.push(&fields.chromosome, "chromosome must not be empty");
    }
    if raw.start < 1 {
        v.push(&fields.start, format!("start must be >= 1, got {}", raw.start));
    }
    if raw.end < 1 {
        v.push(&fields.end, format!("end must be >= 1, got {}", raw.end));
    }
    let (Ok(start @ 1..), Ok(end @ 1..)) = (u64::try_from(raw.start), u64::try_from(raw.end))
    else {
        return None;
    };
    if end <= start {
        v.push(
            &fields.end,
            format!("end ({end}) must be greater than start ({start})"),
        );
    } else if let Some(max) = max_width {
        let width = end - start;
        if width > max {
            v.push(
                &fields.end,
                format!("interval width {width} exceeds maximum of {max}"),
            );
        }
    }
    (v.len() == before).then(|| GenomicInterval {
        chromosome: chromosome.to_owned(),
        start,
        end,
    })
}

fn allele(v: &mut Violations, field: &str, label: &str, raw: &str) -> Option<String> {
    if raw.is_empty() {
        v.push(field, format!("{label} allele must not be empty"));
        return None;
    }
    let invalid = invalid_characters(raw, ALLELE_ALPHABET);
    if !invalid.is_empty() {
        v.push(
            field,
            format!(
                "{label} allele has invalid characters {}; only A, T, G, C are allowed",
                describe_characters(&invalid)
            ),
        );
        return None;
    }
    Some(raw.to_ascii_uppercase())
}

/// Validate a variant. Field names are reported under `prefix`.
pub fn variant(v: &mut Violations, prefix: &str, raw: &RawVariant) -> Option<Variant> {
    let before = v.len();
    let chromosome = raw.chromosome.trim();
    if chromosome.is_empty() {
        v.push(field_path(prefix, "chromosome"), "chromosome must not be empty");
    }
    if raw.position < 1 {
        v.push(
            field_path(prefix, "position"),
            format!("position must be >= 1, got {}", raw.position),
        );
    }
    let reference = allele(v, &field_path(prefix, "ref"), "reference", &raw.reference);
    let alternate = allele(v, &field_path(prefix, "alt"), "alternate", &raw.alternate);
    if v.len() != before {
        return None;
    }
    Some(Variant {
        chromosome: chromosome.to_owned(),
        position: u64::try_from(raw.position).ok()?,
        reference: reference?,
        alternate: alternate?,
    })
}

/// Validate the optional worker bound, falling back to `default`.
pub fn workers(v: &mut Violations, field: &str, raw: Option<i64>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    match usize::try_from(raw) {
        Ok(n) if (MIN_WORKERS..=MAX_WORKERS).contains(&n) => n,
        _ => {
            v.push(
                field,
                format!("must be between {MIN_WORKERS} and {MAX_WORKERS}, got {raw}"),
            );
            default
        }
    }
}

/// Validate the optional organism name, falling back to `default`.
pub fn organism(v: &mut Violations, field: &str, raw: Option<&str>, default: &str) -> String {
    match raw.map(str::trim) {
        None => default.to_owned(),
        Some("") => {
            v.push(field, "organism must not be empty");
            default.to_owned()
        }
        Some(name) => name.to_ascii_lowercase(),
    }
}

/// Validate requested output tracks. Returns them upper-cased and deduplicated.
pub fn output_types(v: &mut Violations, field: &str, raw: Option<&[String]>) -> Vec<String> {
    let mut accepted: Vec<String> = Vec::new();
    for (i, name) in raw.unwrap_or_default().iter().enumerate() {
        let upper = name.trim().to_ascii_uppercase();
        if OUTPUT_TYPES.iter().any(|(known, _)| *known == upper) {
            if !accepted.contains(&upper) {
                accepted.push(upper);
            }
        } else {
            let known: Vec<&str> = OUTPUT_TYPES.iter().map(|(k, _)| *k).collect();
            v.push(
                format!("{field}[{i}]"),
                format!("unknown output type '{name}'; expected one of {}", known.join(", ")),
            );
        }
    }
    accepted
}

/// Validate ontology term identifiers (e.g. `UBERON:0002048`).
pub fn ontology_terms(v: &mut Violations, field: &str, raw: Option<&[String]>) -> Vec<String> {
    let mut accepted = Vec::new();
    for (i, term) in raw.unwrap_or_default().iter().enumerate() {
        let term = term.trim();
        if term.is_empty() {
            v.push(format!("{field}[{i}]"), "ontology term must not be empty");
        } else {
            accepted.push(term.to_owned());
        }
    }
    accepted
}

/// Validate every element of a batch collection independently.
///
/// Each element is deserialized into `T` and passed to `check` with its
/// indexed field path (`field[i]`). Structural and semantic failures are both
/// recorded against that path; validation continues past failing elements.
pub fn batch<T, R>(
    v: &mut Violations,
    field: &str,
    items: &[serde_json::Value],
    mut check: impl FnMut(&mut Violations, &str, T) -> Option<R>,
) -> Vec<R>
where
    T: DeserializeOwned,
{
    if items.is_empty() {
        v.push(field, "at least one item required");
        return Vec::new();
    }
    let mut accepted = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("{field}[{i}]");
        if let Some(value) = decode(v, &path, item).and_then(|raw| check(v, &path, raw)) {
            accepted.push(value);
        }
    }
    accepted
}
