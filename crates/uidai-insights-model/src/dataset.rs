use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub const STATE_COLUMN: &str = "state";
pub const DISTRICT_COLUMN: &str = "district";
pub const DATE_COLUMN: &str = "date";
pub const PINCODE_COLUMN: &str = "pincode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Biometric,
    Demographic,
    Enrolment,
}

impl DatasetKind {
    pub const ALL: [Self; 3] = [Self::Enrolment, Self::Biometric, Self::Demographic];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    #[must_use]
    pub fn spec(self) -> &'static DatasetSpec {
        dataset_spec(self)
    }
}

impl Display for DatasetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dataset_kind(s)
    }
}

/// One age bucket of a dataset: the output label and the raw CSV column
/// whose per-row value feeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBucket {
    pub label: &'static str,
    pub column: &'static str,
}

/// Column and bucket layout of one dataset kind.
///
/// The per-row total of a record is the sum of its bucket values, so the
/// bucket list fully determines the derived counts. The aggregation engine
/// reads only this table and never branches on the kind itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSpec {
    pub kind: DatasetKind,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub buckets: &'static [AgeBucket],
}

impl DatasetSpec {
    #[must_use]
    pub fn required_columns(&self) -> Vec<&'static str> {
        let mut out = vec![STATE_COLUMN, DISTRICT_COLUMN, DATE_COLUMN, PINCODE_COLUMN];
        out.extend(self.buckets.iter().map(|b| b.column));
        out
    }

    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

pub const DATASET_SPECS: [DatasetSpec; 3] = [
    DatasetSpec {
        kind: DatasetKind::Biometric,
        name: "biometric",
        aliases: &[],
        buckets: &[
            AgeBucket {
                label: "5-17",
                column: "bio_age_5_17",
            },
            AgeBucket {
                label: "18+",
                column: "bio_age_17_",
            },
        ],
    },
    DatasetSpec {
        kind: DatasetKind::Demographic,
        name: "demographic",
        aliases: &[],
        buckets: &[
            AgeBucket {
                label: "5-17",
                column: "demo_age_5_17",
            },
            AgeBucket {
                label: "18+",
                column: "demo_age_17_",
            },
        ],
    },
    DatasetSpec {
        kind: DatasetKind::Enrolment,
        name: "enrolment",
        aliases: &["enrollment"],
        buckets: &[
            AgeBucket {
                label: "0-5",
                column: "age_0_5",
            },
            AgeBucket {
                label: "5-17",
                column: "age_5_17",
            },
            AgeBucket {
                label: "18+",
                column: "age_18_greater",
            },
        ],
    },
];

#[must_use]
pub fn dataset_spec(kind: DatasetKind) -> &'static DatasetSpec {
    DATASET_SPECS
        .iter()
        .find(|s| s.kind == kind)
        .unwrap_or(&DATASET_SPECS[0])
}

pub fn parse_dataset_kind(input: &str) -> Result<DatasetKind, ValidationError> {
    let lowered = input.trim().to_ascii_lowercase();
    let name = lowered.strip_suffix(".csv").unwrap_or(&lowered);
    DATASET_SPECS
        .iter()
        .find(|s| s.matches(name))
        .map(|s| s.kind)
        .ok_or_else(|| {
            let known: Vec<&str> = DATASET_SPECS.iter().map(|s| s.name).collect();
            ValidationError(format!(
                "unknown dataset '{}'; expected one of {}",
                input.trim(),
                known.join(", ")
            ))
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum YearScope {
    #[default]
    All,
    Year(u16),
}

impl YearScope {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if s.len() != 4 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError(format!(
                "year must be 'all' or a four digit year, got '{s}'"
            )));
        }
        s.parse::<u16>()
            .map(Self::Year)
            .map_err(|e| ValidationError(format!("invalid year '{s}': {e}")))
    }

    #[must_use]
    pub const fn is_year_specific(self) -> bool {
        matches!(self, Self::Year(_))
    }

    /// File name under which a dataset is published for this scope.
    #[must_use]
    pub fn file_name(self, kind: DatasetKind) -> String {
        match self {
            Self::All => format!("{}_full.csv", kind.as_str()),
            Self::Year(y) => format!("{}_{y}.csv", kind.as_str()),
        }
    }
}

impl Display for YearScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Year(y) => write!(f, "{y}"),
        }
    }
}
