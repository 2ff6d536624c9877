//! Genomic value types shared by the validators and the tool handlers.
//!
//! The types here are only ever constructed by [`validate`], so holding one
//! means its invariants (alphabet, bounds, ordering) already hold.

pub mod validate;
pub mod variant_format;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest sequence accepted by any operation.
pub const MAX_SEQUENCE_LENGTH: usize = 1_000_000;

/// Widest interval accepted for prediction and scoring.
pub const MAX_INTERVAL_WIDTH: u64 = 1_000_000;

/// Widest in-silico mutagenesis target window.
pub const MAX_ISM_WIDTH: u64 = 10;

/// Sequence lengths the prediction model is trained on.
pub const SUPPORTED_SEQUENCE_LENGTHS: [usize; 5] = [2048, 16_384, 131_072, 524_288, 1_048_576];

/// Worker bound limits for batch operations.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 10;
pub const DEFAULT_WORKERS: usize = 5;

pub const DEFAULT_ORGANISM: &str = "human";

/// Upper bound on recommended variant scorers per request.
pub const MAX_VARIANT_SCORERS: usize = 20;

/// Output tracks the engine can produce, with a short description each.
pub const OUTPUT_TYPES: &[(&str, &str)] = &[
    ("ATAC", "ATAC-seq chromatin accessibility data"),
    ("CAGE", "CAGE transcription start site data"),
    ("CHIP_HISTONE", "ChIP-seq histone modification data"),
    ("CHIP_TF", "ChIP-seq transcription factor binding data"),
    ("CONTACT_MAPS", "3D chromatin contact maps"),
    ("DNASE", "DNase hypersensitivity data"),
    ("PROCAP", "PRO-cap nascent transcription data"),
    ("RNA_SEQ", "RNA-seq gene expression data"),
    ("SPLICE_JUNCTIONS", "Splice junction predictions"),
    ("SPLICE_SITES", "Splice site predictions"),
    ("SPLICE_SITE_USAGE", "Splice site usage predictions"),
];

/// A DNA sequence over `{A,T,G,C,N}`, stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomicSequence(String);

impl GenomicSequence {
    pub(crate) const fn new_unchecked(bases: String) -> Self {
        Self(bases)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A half-open genomic interval `[start, end)` on one chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenomicInterval {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicInterval {
    pub const fn width(&self) -> u64 {
        self.end - self.start
    }

    /// Whether both intervals share at least one position.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.chromosome == other.chromosome && self.start < other.end && other.start < self.end
    }

    /// The shared region, if any.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        self.overlaps(other).then(|| Self {
            chromosome: self.chromosome.clone(),
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

/// A single-site or indel variant with upper-cased alleles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub chromosome: String,
    pub position: u64,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "alt")]
    pub alternate: String,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}>{}",
            self.chromosome, self.position, self.reference, self.alternate
        )
    }
}

/// Interval as received from a client, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInterval {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
}

/// Variant as received from a client, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVariant {
    pub chromosome: String,
    pub position: i64,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "alt")]
    pub alternate: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(chromosome: &str, start: u64, end: u64) -> GenomicInterval {
        GenomicInterval {
            chromosome: chromosome.to_owned(),
            start,
            end,
        }
    }

    #[test]
    fn test_overlap_half_open() {
        let a = interval("chr1", 100, 200);
        assert!(a.overlaps(&interval("chr1", 199, 300)));
        assert!(!a.overlaps(&interval("chr1", 200, 300)));
        assert!(!a.overlaps(&interval("chr2", 150, 160)));
    }

    #[test]
    fn test_intersect() {
        let a = interval("chr1", 100, 200);
        let b = interval("chr1", 150, 400);
        assert_eq!(a.intersect(&b), Some(interval("chr1", 150, 200)));
        assert_eq!(a.intersect(&interval("chr1", 300, 400)), None);
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(interval("chr1", 1, 5).to_string(), "chr1:1-5");
        let v = Variant {
            chromosome: "chr1".to_owned(),
            position: 1_001_000,
            reference: "A".to_owned(),
            alternate: "G".to_owned(),
        };
        assert_eq!(v.to_string(), "chr1:1001000A>G");
    }
}
