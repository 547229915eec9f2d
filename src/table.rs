// Output table and the success/failure envelopes handed back to callers
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ExtractionWarning;
use crate::reconcile::{summarize, ExtractionSummary};
use crate::schema::{headers, SessionValue, SheetIdentity, SkillRow, SESSION_HEADERS, QUARTER_HEADERS};
use crate::vision::{GridLines, SegmentMode, TableDetection};

/// Which path produced the values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    DynamicTextOcr,
    FixedGridClassifier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridReport {
    pub mode: SegmentMode,
    pub cell_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<GridLines>,
}

/// Everything one extraction produced, before presentation
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub method: Method,
    /// Always the 18 skills, in printed order
    pub rows: Vec<SkillRow>,
    /// Skills that actually received values, in printed order
    pub skills_found: Vec<&'static str>,
    pub detection: TableDetection,
    pub grid: GridReport,
    pub warnings: Vec<ExtractionWarning>,
}

impl ExtractionResult {
    pub fn summary(&self) -> ExtractionSummary {
        summarize(&self.rows, &self.skills_found)
    }

    pub fn row(&self, skill: &str) -> Option<&SkillRow> {
        self.rows.iter().find(|r| r.skill == skill)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputTable {
    pub headers: Vec<&'static str>,
    /// One object per skill, keys in header order
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub extracted_values: Map<String, Value>,
    pub extraction_report: Vec<String>,
}

impl OutputTable {
    pub fn build(result: &ExtractionResult, identity: &SheetIdentity) -> Self {
        let rows: Vec<Map<String, Value>> = result.rows.iter().map(|row| table_row(row, identity)).collect();

        let mut extracted_values = Map::new();
        let mut extraction_report = Vec::with_capacity(result.skills_found.len());
        for row in result.rows.iter().filter(|r| result.skills_found.contains(&r.skill)) {
            extracted_values.insert(row.skill.to_string(), values_json(&row.values));
            let marks: Vec<&str> = row.values.iter().map(SessionValue::as_str).collect();
            extraction_report.push(format!("{}: [{}]", row.skill, marks.join(", ")));
        }

        Self {
            headers: headers(),
            row_count: rows.len(),
            rows,
            extracted_values,
            extraction_report,
        }
    }
}

fn values_json(values: &[SessionValue]) -> Value {
    Value::Array(values.iter().map(|v| Value::from(v.as_str())).collect())
}

fn table_row(row: &SkillRow, identity: &SheetIdentity) -> Map<String, Value> {
    let tally = row.tally();
    let mut map = Map::new();
    map.insert("Student Name".into(), identity.student_name.clone().into());
    map.insert("Register Number".into(), identity.register_number.clone().into());
    map.insert("Skill Area".into(), row.skill.into());
    for (header, value) in SESSION_HEADERS.iter().zip(&row.values) {
        map.insert(header.to_string(), value.as_str().into());
    }
    map.insert("Total A".into(), tally.a.to_string().into());
    map.insert("Total B".into(), tally.b.to_string().into());
    for header in QUARTER_HEADERS {
        map.insert(header.to_string(), "".into());
    }
    map.insert("Assessment Date".into(), identity.assessment_date.clone().into());
    map
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub warnings: Vec<ExtractionWarning>,
    pub grid: GridReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope {
    pub success: bool,
    pub method: Method,
    pub tables: Vec<OutputTable>,
    pub table_count: usize,
    pub extracted_data: Map<String, Value>,
    pub extraction_summary: ExtractionSummary,
    pub table_detection: TableDetection,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureEnvelope {
    pub success: bool,
    pub error: String,
    pub tables: Vec<OutputTable>,
    pub table_count: usize,
}

/// What an extraction hands back: a full 18-row table or an error message
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success(Box<SuccessEnvelope>),
    Failure(FailureEnvelope),
}

impl Envelope {
    pub fn success(result: ExtractionResult, identity: &SheetIdentity) -> Self {
        let table = OutputTable::build(&result, identity);
        let extracted_data = result
            .rows
            .iter()
            .map(|row| (row.skill.to_string(), values_json(&row.values)))
            .collect();

        Envelope::Success(Box::new(SuccessEnvelope {
            success: true,
            method: result.method,
            tables: vec![table],
            table_count: 1,
            extracted_data,
            extraction_summary: result.summary(),
            table_detection: result.detection,
            diagnostics: Diagnostics {
                warnings: result.warnings,
                grid: result.grid,
            },
        }))
    }

    pub fn failure(error: impl ToString) -> Self {
        Envelope::Failure(FailureEnvelope {
            success: false,
            error: error.to_string(),
            tables: Vec::new(),
            table_count: 0,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
