// Fixed sheet structure: 18 skill areas x 20 sessions, never derived from the image
use std::fmt;

use serde::{Serialize, Serializer};

use crate::config::segment::{COLS, ROWS};

pub const SESSIONS: usize = COLS;

/// Skill areas in the order they are printed on the form.
pub const SKILL_AREAS: [&str; ROWS] = [
    "Gross Motor",
    "Fine Motor",
    "Eating",
    "Dressing",
    "Grooming",
    "Toileting",
    "Receptive Language",
    "Expressive Language",
    "Social Interaction",
    "Reading",
    "Writing",
    "Numbers",
    "Time",
    "Money",
    "Domestic Behaviour",
    "Community Orientation",
    "Recreation",
    "Vocational",
];

pub const SESSION_HEADERS: [&str; SESSIONS] = [
    "Session 1", "Session 2", "Session 3", "Session 4", "Session 5",
    "Session 6", "Session 7", "Session 8", "Session 9", "Session 10",
    "Session 11", "Session 12", "Session 13", "Session 14", "Session 15",
    "Session 16", "Session 17", "Session 18", "Session 19", "Session 20",
];

pub const QUARTER_HEADERS: [&str; 4] = ["I Qr", "II Qr", "III Qr", "IV Qr"];

/// Every column of the output table, in order.
pub fn headers() -> Vec<&'static str> {
    let mut headers = vec!["Student Name", "Register Number", "Skill Area"];
    headers.extend(SESSION_HEADERS);
    headers.extend(["Total A", "Total B"]);
    headers.extend(QUARTER_HEADERS);
    headers.push("Assessment Date");
    headers
}

/// Index of a skill area in declared order
pub fn skill_index(name: &str) -> Option<usize> {
    SKILL_AREAS.iter().position(|s| *s == name)
}

/// One session mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionValue {
    A,
    B,
    #[default]
    Empty,
}

impl SessionValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionValue::A => "A",
            SessionValue::B => "B",
            SessionValue::Empty => "",
        }
    }

    pub fn is_mark(&self) -> bool {
        !matches!(self, SessionValue::Empty)
    }
}

impl fmt::Display for SessionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SessionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A-count, B-count and Empty-count of one row; always sums to 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RowTally {
    pub a: usize,
    pub b: usize,
    pub empty: usize,
}

impl RowTally {
    pub fn total(&self) -> usize {
        self.a + self.b + self.empty
    }
}

/// One fixed skill area and its 20 session values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRow {
    pub skill: &'static str,
    pub values: [SessionValue; SESSIONS],
}

impl SkillRow {
    pub fn empty(skill: &'static str) -> Self {
        Self {
            skill,
            values: [SessionValue::Empty; SESSIONS],
        }
    }

    pub fn tally(&self) -> RowTally {
        let mut tally = RowTally::default();
        for value in &self.values {
            match value {
                SessionValue::A => tally.a += 1,
                SessionValue::B => tally.b += 1,
                SessionValue::Empty => tally.empty += 1,
            }
        }
        tally
    }

    pub fn has_marks(&self) -> bool {
        self.values.iter().any(SessionValue::is_mark)
    }
}

/// Caller-supplied identity columns. Never guessed from the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetIdentity {
    pub student_name: String,
    pub register_number: String,
    pub assessment_date: String,
}
