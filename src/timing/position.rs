use serde::{Deserialize, Serialize};

use crate::error::{RecordError, ValidationError};

const MAX_RANK: i64 = 8;
const MAX_VALUE: i64 = 100;

/// One event as authored. Omitted timing fields inherit from the previous record.
///
/// Numbers are kept wide so that a stray `-1` or `300` in an input file fails
/// validation for that record alone instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseTimingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat: Option<i64>,
    #[serde(default, alias = "beat_div4", skip_serializing_if = "Option::is_none")]
    pub quarter_sub: Option<i64>,
    #[serde(default, alias = "beat_div16", skip_serializing_if = "Option::is_none")]
    pub sixteenth_sub: Option<i64>,
    pub event: String,
    pub value: i64,
}

/// The timing fields and value of a record that passed validation.
#[derive(Debug, Clone, Copy)]
struct CheckedRecord {
    measure: Option<u32>,
    beat: Option<u8>,
    quarter_sub: Option<u8>,
    sixteenth_sub: Option<u8>,
    value: u8,
}

impl SparseTimingRecord {
    pub fn new(event: impl Into<String>, value: impl Into<i64>) -> Self {
        Self {
            measure: None,
            beat: None,
            quarter_sub: None,
            sixteenth_sub: None,
            event: event.into(),
            value: value.into(),
        }
    }

    pub fn measure(mut self, measure: impl Into<i64>) -> Self {
        self.measure = Some(measure.into());
        self
    }

    pub fn beat(mut self, beat: impl Into<i64>) -> Self {
        self.beat = Some(beat.into());
        self
    }

    pub fn quarter_sub(mut self, quarter_sub: impl Into<i64>) -> Self {
        self.quarter_sub = Some(quarter_sub.into());
        self
    }

    pub fn sixteenth_sub(mut self, sixteenth_sub: impl Into<i64>) -> Self {
        self.sixteenth_sub = Some(sixteenth_sub.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.checked().map(|_| ())
    }

    fn checked(&self) -> Result<CheckedRecord, ValidationError> {
        let measure = match self.measure {
            Some(measure) => Some(
                u32::try_from(measure)
                    .ok()
                    .filter(|m| *m >= 1)
                    .ok_or(ValidationError::MeasureOutOfRange(measure))?,
            ),
            None => None,
        };
        let value = u8::try_from(self.value)
            .ok()
            .filter(|v| i64::from(*v) <= MAX_VALUE)
            .ok_or(ValidationError::ValueOutOfRange(self.value))?;

        Ok(CheckedRecord {
            measure,
            beat: check_rank("beat", self.beat)?,
            quarter_sub: check_rank("quarter_sub", self.quarter_sub)?,
            sixteenth_sub: check_rank("sixteenth_sub", self.sixteenth_sub)?,
            value,
        })
    }
}

fn check_rank(rank: &'static str, value: Option<i64>) -> Result<Option<u8>, ValidationError> {
    match value {
        Some(v) if !(1..=MAX_RANK).contains(&v) => {
            Err(ValidationError::RankOutOfRange { rank, value: v })
        }
        // In 1..=8, so the narrowing is lossless.
        Some(v) => Ok(Some(v as u8)),
        None => Ok(None),
    }
}

/// A fully qualified position: measure, beat, quarter of a beat, sixteenth of a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPosition {
    pub measure: u32,
    pub beat: u8,
    pub quarter_sub: u8,
    pub sixteenth_sub: u8,
}

impl ResolvedPosition {
    pub const START: ResolvedPosition = ResolvedPosition {
        measure: 1,
        beat: 1,
        quarter_sub: 1,
        sixteenth_sub: 1,
    };

    pub fn new(measure: u32, beat: u8, quarter_sub: u8, sixteenth_sub: u8) -> Self {
        Self {
            measure,
            beat,
            quarter_sub,
            sixteenth_sub,
        }
    }
}

impl Default for ResolvedPosition {
    fn default() -> Self {
        Self::START
    }
}

impl std::fmt::Display for ResolvedPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.measure, self.beat, self.quarter_sub, self.sixteenth_sub
        )
    }
}

/// A record after resolution. `event` and `value` are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub position: ResolvedPosition,
    pub event: String,
    pub value: u8,
}

/// Running state of the four ranks, folded over the record sequence.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    state: ResolvedPosition,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ResolvedPosition {
        self.state
    }

    /// Applies one record. On validation failure the running state is left as it was.
    ///
    /// A rank only resets the ranks below it when its value actually changes;
    /// restating the current value keeps finer subdivisions intact.
    pub fn apply(&mut self, record: &SparseTimingRecord) -> Result<ResolvedPosition, ValidationError> {
        self.resolve(record).map(|resolved| resolved.position)
    }

    /// Like [`Resolver::apply`], also returning the validated event and value.
    pub fn resolve(&mut self, record: &SparseTimingRecord) -> Result<ResolvedRecord, ValidationError> {
        let checked = record.checked()?;

        let mut next = self.state;
        if let Some(measure) = checked.measure.filter(|m| *m != next.measure) {
            next = ResolvedPosition::new(measure, 1, 1, 1);
        }
        if let Some(beat) = checked.beat.filter(|b| *b != next.beat) {
            next.beat = beat;
            next.quarter_sub = 1;
            next.sixteenth_sub = 1;
        }
        if let Some(quarter_sub) = checked.quarter_sub.filter(|q| *q != next.quarter_sub) {
            next.quarter_sub = quarter_sub;
            next.sixteenth_sub = 1;
        }
        if let Some(sixteenth_sub) = checked.sixteenth_sub {
            next.sixteenth_sub = sixteenth_sub;
        }

        self.state = next;
        Ok(ResolvedRecord {
            position: next,
            event: record.event.clone(),
            value: checked.value,
        })
    }
}

/// Resolves a whole sequence, skipping invalid records.
pub fn resolve_all(records: &[SparseTimingRecord]) -> (Vec<ResolvedRecord>, Vec<RecordError>) {
    let mut resolver = Resolver::new();
    let mut resolved = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match resolver.resolve(record) {
            Ok(record) => resolved.push(record),
            Err(e) => rejected.push(RecordError::new(index, e)),
        }
    }

    (resolved, rejected)
}
