use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// One recorded paper/test result.
///
/// `total` is authoritative: it is not re-derived from the components, and
/// imported entries are stored as they arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntry {
    #[serde(default = "new_id")]
    pub id: String,
    pub subject: String,
    #[serde(alias = "paper", default)]
    pub paper_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcq: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essay: Option<f64>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub timestamp: i64,
}

impl MarkEntry {
    /// Sum of the component scores, only when all three are present.
    pub fn component_sum(&self) -> Option<f64> {
        match (self.mcq, self.seq, self.essay) {
            (Some(m), Some(s), Some(e)) => Some(m + s + e),
            _ => None,
        }
    }

    pub fn total_matches_components(&self) -> bool {
        self.component_sum()
            .map(|sum| (sum - self.total).abs() < 1e-9)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    #[serde(default = "new_id")]
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub created_at: i64,
}

pub const MAX_TUTORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tutor {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default = "default_tutor_color")]
    pub color: String,
}

pub fn default_tutor_color() -> String {
    "#6366f1".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Science,
    Commerce,
    Arts,
    Technology,
    Common,
    Other,
}

impl Stream {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "science" => Some(Self::Science),
            "commerce" => Some(Self::Commerce),
            "arts" => Some(Self::Arts),
            "technology" => Some(Self::Technology),
            "common" => Some(Self::Common),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomSubject {
    pub name: String,
    #[serde(default = "default_stream")]
    pub stream: Stream,
}

fn default_stream() -> Stream {
    Stream::Other
}

/// Curated A/L subject list.
pub const SUBJECT_CATALOG: &[(&str, Stream)] = &[
    ("Combined Mathematics", Stream::Science),
    ("Physics", Stream::Science),
    ("Chemistry", Stream::Science),
    ("Biology", Stream::Science),
    ("Agricultural Science", Stream::Science),
    ("Accounting", Stream::Commerce),
    ("Business Studies", Stream::Commerce),
    ("Economics", Stream::Commerce),
    ("Business Statistics", Stream::Commerce),
    ("Sinhala", Stream::Arts),
    ("Tamil", Stream::Arts),
    ("Geography", Stream::Arts),
    ("History", Stream::Arts),
    ("Political Science", Stream::Arts),
    ("Logic and Scientific Method", Stream::Arts),
    ("Buddhist Civilization", Stream::Arts),
    ("Engineering Technology", Stream::Technology),
    ("Bio-systems Technology", Stream::Technology),
    ("Science for Technology", Stream::Technology),
    ("Information & Communication Technology", Stream::Common),
    ("General English", Stream::Common),
    ("General Knowledge", Stream::Common),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectView {
    pub name: String,
    pub stream: Stream,
    pub custom: bool,
    pub favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub minutes: u32,
    pub date: String,
    #[serde(default)]
    pub timestamp: i64,
}
