// Municipality code correction
//
// Source files carry municipality codes in the exporter's numbering, which is
// offset for a handful of states. The correction table maps them onto the
// IBGE numbering. A code can be corrected at most once: the input and output
// are distinct types and correcting a `MunicipalityCode` is the identity.

use crate::geo::BrazilState;
use crate::partition::{COL_MUNICIPALITY, COL_STATE};
use crate::record::{Record, Value};

/// Rule table, evaluated in order; the first matching predicate wins.
const RULES: [(BrazilState, Predicate, i64); 4] = [
    (BrazilState::SaoPaulo, Predicate::Below(3_500_000), 100_000),
    (BrazilState::MatoGrossoDoSul, Predicate::Above(5_000_000), -200_000),
    (BrazilState::Goias, Predicate::Above(5_200_000), -100_000),
    (BrazilState::DistritoFederal, Predicate::Above(5_300_000), -100_000),
];

#[derive(Debug, Clone, Copy)]
enum Predicate {
    Below(i64),
    Above(i64),
}

impl Predicate {
    fn matches(self, code: i64) -> bool {
        match self {
            Predicate::Below(limit) => code < limit,
            Predicate::Above(limit) => code > limit,
        }
    }
}

/// A municipality code as it appears in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceCode(pub i64);

/// A municipality code in IBGE numbering. Only obtainable through correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MunicipalityCode(i64);

impl MunicipalityCode {
    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Maps a code into IBGE numbering.
pub trait Correct {
    fn correct(self, state: Option<BrazilState>) -> MunicipalityCode;
}

impl Correct for SourceCode {
    fn correct(self, state: Option<BrazilState>) -> MunicipalityCode {
        let Some(state) = state else {
            return MunicipalityCode(self.0);
        };
        let delta = RULES
            .iter()
            .find(|(rule_state, predicate, _)| *rule_state == state && predicate.matches(self.0))
            .map(|(_, _, delta)| *delta)
            .unwrap_or(0);
        MunicipalityCode(self.0 + delta)
    }
}

impl Correct for MunicipalityCode {
    fn correct(self, _state: Option<BrazilState>) -> MunicipalityCode {
        self
    }
}

/// A record whose municipality column (if any) is already in IBGE numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedRecord(Record);

impl CorrectedRecord {
    pub fn as_record(&self) -> &Record {
        &self.0
    }

    pub fn into_record(self) -> Record {
        self.0
    }

    /// Identity. Present so callers that want "make sure this is corrected"
    /// can call it on either form without double-applying the table.
    pub fn correct(self) -> CorrectedRecord {
        self
    }
}

impl AsRef<Record> for CorrectedRecord {
    fn as_ref(&self) -> &Record {
        &self.0
    }
}

/// Apply the correction table to a raw record.
///
/// Records without a municipality column, or whose code does not parse, pass
/// through unchanged.
pub fn correct_record(mut record: Record) -> CorrectedRecord {
    let code = record.get(COL_MUNICIPALITY).and_then(Value::as_i64);
    if let Some(code) = code {
        let state = record
            .get(COL_STATE)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<BrazilState>().ok());
        let corrected = SourceCode(code).correct(state);
        record.set(COL_MUNICIPALITY, Value::Int(corrected.value()));
    }
    CorrectedRecord(record)
}
