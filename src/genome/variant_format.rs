//! Variant string formats used by public variant catalogues.
//!
//! | format                  | example                  |
//! |-------------------------|--------------------------|
//! | `default`               | `chr1:1001000:A>G`       |
//! | `gnomad`                | `chr1-1001000-A-G`       |
//! | `gtex`                  | `chr1_1001000_A_G_b38`   |
//! | `open_targets`          | `1_1001000_A_G`          |
//! | `open_targets_bigquery` | `1:1001000:A:G`          |
//!
//! Whatever format is requested, the dash- and colon-separated layouts are
//! accepted as a fallback.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::validate::{self, Violations};
use super::{RawVariant, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantFormat {
    Default,
    Gnomad,
    Gtex,
    OpenTargets,
    OpenTargetsBigquery,
}

impl VariantFormat {
    pub const ALL: [Self; 5] = [
        Self::Default,
        Self::Gnomad,
        Self::Gtex,
        Self::OpenTargets,
        Self::OpenTargetsBigquery,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Gnomad => "gnomad",
            Self::Gtex => "gtex",
            Self::OpenTargets => "open_targets",
            Self::OpenTargetsBigquery => "open_targets_bigquery",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Default => &*DEFAULT,
            Self::Gnomad => &*DASHED,
            Self::Gtex => &*GTEX,
            Self::OpenTargets => &*UNDERSCORED,
            Self::OpenTargetsBigquery => &*COLONED,
        }
    }
}

impl fmt::Display for VariantFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|f| f.as_str()).collect();
                format!("unknown variant format '{s}'; expected one of {}", known.join(", "))
            })
    }
}

macro_rules! variant_regex {
    ($name:ident, $pattern:literal) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| match Regex::new($pattern) {
            Ok(re) => re,
            Err(e) => unreachable!("invalid built-in pattern {}: {e}", $pattern),
        });
    };
}

variant_regex!(DEFAULT, r"^([^:\s]+):(\d+):([A-Za-z]+)>([A-Za-z]+)$");
variant_regex!(DASHED, r"^([^-\s]+)-(\d+)-([A-Za-z]+)-([A-Za-z]+)$");
variant_regex!(COLONED, r"^([^:\s]+):(\d+):([A-Za-z]+):([A-Za-z]+)$");
variant_regex!(GTEX, r"^(chr[^_\s]+)_(\d+)_([A-Za-z]+)_([A-Za-z]+)_b\d+$");
variant_regex!(UNDERSCORED, r"^([^_\s]+)_(\d+)_([A-Za-z]+)_([A-Za-z]+)$");

/// Bare chromosome names (`1`, `X`, `MT`) gain the `chr` prefix.
fn normalize_chromosome(raw: &str) -> String {
    if raw.starts_with("chr") {
        raw.to_owned()
    } else {
        format!("chr{raw}")
    }
}

fn capture(re: &Regex, text: &str) -> Option<RawVariant> {
    let caps = re.captures(text)?;
    Some(RawVariant {
        chromosome: normalize_chromosome(&caps[1]),
        position: caps[2].parse().ok()?,
        reference: caps[3].to_owned(),
        alternate: caps[4].to_owned(),
    })
}

/// Parse `text` in `format`, recording problems under `field`.
pub fn parse(
    v: &mut Violations,
    field: &str,
    text: &str,
    format: VariantFormat,
) -> Option<Variant> {
    let text = text.trim();
    if text.is_empty() {
        v.push(field, "variant string must not be empty");
        return None;
    }
    let raw = [format.pattern(), &*DASHED, &*COLONED]
        .into_iter()
        .find_map(|re| capture(re, text));
    let Some(raw) = raw else {
        v.push(
            field,
            format!("'{text}' is not a recognised {format} variant string"),
        );
        return None;
    };
    validate::variant(v, field, &raw)
}
