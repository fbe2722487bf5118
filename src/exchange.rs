use crate::achievements::{self, AchievementProgress};
use crate::calc::{self, MarkFilters};
use crate::grading::GradeScale;
use crate::model::{CustomSubject, MarkEntry, Profile, StudySession, Todo, Tutor};
use crate::store::{self, keys, Storage};
use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

pub const APP_NAME: &str = "Marksy";
pub const EXPORT_VERSION: &str = "2.0";
pub const DEFAULT_WATERMARK: &str = "Exported from Marksy";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("import file must contain a JSON object")]
    NotAnObject,

    #[error("invalid {key}: {message}")]
    Shape { key: String, message: String },

    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("could not read workbook: {0}")]
    SheetRead(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ExchangeError {
    fn storage(e: anyhow::Error) -> Self {
        Self::Storage(format!("{e:#}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    pub app: String,
    pub version: String,
    pub exported_at: String,
    pub watermark: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub meta: ExportMeta,
    pub profile: Profile,
    pub marks: Vec<MarkEntry>,
    pub todos: Vec<Todo>,
    pub tutors: Vec<Tutor>,
    pub custom_subjects: Vec<CustomSubject>,
    pub favorite_subjects: Vec<String>,
    pub study_sessions: Vec<StudySession>,
    /// Informational; ignored on import.
    pub achievements: Vec<AchievementProgress>,
}

pub fn build_export(store: &dyn Storage, watermark: &str) -> Result<ExportDocument, ExchangeError> {
    let marks: Vec<MarkEntry> =
        store::load_list(store, keys::MARKS).map_err(ExchangeError::storage)?;
    let achievements = achievements::evaluate(&marks);
    Ok(ExportDocument {
        meta: ExportMeta {
            app: APP_NAME.to_string(),
            version: EXPORT_VERSION.to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            watermark: watermark.to_string(),
        },
        profile: store::load_or_default(store, keys::PROFILE).map_err(ExchangeError::storage)?,
        marks,
        todos: store::load_list(store, keys::TODOS).map_err(ExchangeError::storage)?,
        tutors: store::load_list(store, keys::TUTORS).map_err(ExchangeError::storage)?,
        custom_subjects: store::load_list(store, keys::CUSTOM_SUBJECTS)
            .map_err(ExchangeError::storage)?,
        favorite_subjects: store::load_list(store, keys::FAVORITE_SUBJECTS)
            .map_err(ExchangeError::storage)?,
        study_sessions: store::load_list(store, keys::STUDY_SESSIONS)
            .map_err(ExchangeError::storage)?,
        achievements,
    })
}

pub fn to_json_pretty(doc: &ExportDocument) -> Result<String, ExchangeError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

fn write_out(path: &Path, bytes: &[u8]) -> Result<(), ExchangeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn export_json_file(
    store: &dyn Storage,
    watermark: &str,
    path: &Path,
) -> Result<usize, ExchangeError> {
    let doc = build_export(store, watermark)?;
    let text = to_json_pretty(&doc)?;
    write_out(path, text.as_bytes())?;
    info!(path = %path.display(), marks = doc.marks.len(), "exported JSON");
    Ok(doc.marks.len())
}

pub fn export_xlsx_file(
    store: &dyn Storage,
    watermark: &str,
    scale: &GradeScale,
    path: &Path,
) -> Result<usize, ExchangeError> {
    let doc = build_export(store, watermark)?;
    let bytes = to_xlsx(&doc, scale)?;
    write_out(path, &bytes)?;
    info!(path = %path.display(), marks = doc.marks.len(), "exported spreadsheet");
    Ok(doc.marks.len())
}

fn write_header(ws: &mut Worksheet, headers: &[&str]) -> Result<(), XlsxError> {
    for (c, h) in headers.iter().enumerate() {
        ws.write_string(0, c as u16, *h)?;
    }
    Ok(())
}

fn write_opt_number(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    v: Option<f64>,
) -> Result<(), XlsxError> {
    if let Some(n) = v {
        ws.write_number(row, col, n)?;
    }
    Ok(())
}

/// One sheet per collection, header row first.
pub fn to_xlsx(doc: &ExportDocument, scale: &GradeScale) -> Result<Vec<u8>, ExchangeError> {
    let mut workbook = Workbook::new();

    let mut marks = Worksheet::new();
    marks.set_name("Marks")?;
    write_header(
        &mut marks,
        &["ID", "Subject", "Paper", "Date", "MCQ", "SEQ", "Essay", "Total", "Grade", "Timestamp"],
    )?;
    for (i, m) in doc.marks.iter().enumerate() {
        let r = (i + 1) as u32;
        marks.write_string(r, 0, m.id.as_str())?;
        marks.write_string(r, 1, m.subject.as_str())?;
        marks.write_string(r, 2, m.paper_name.as_str())?;
        marks.write_string(r, 3, m.date.as_str())?;
        write_opt_number(&mut marks, r, 4, m.mcq)?;
        write_opt_number(&mut marks, r, 5, m.seq)?;
        write_opt_number(&mut marks, r, 6, m.essay)?;
        marks.write_number(r, 7, m.total)?;
        marks.write_string(r, 8, scale.grade(m.total, 100.0).as_str())?;
        marks.write_number(r, 9, m.timestamp as f64)?;
    }
    workbook.push_worksheet(marks);

    let mut profile = Worksheet::new();
    profile.set_name("Profile")?;
    write_header(&mut profile, &["Field", "Value"])?;
    let age = doc.profile.age.map(|a| a.to_string()).unwrap_or_default();
    let rows = [
        ("Name", doc.profile.name.as_str()),
        ("Age", age.as_str()),
        ("School", doc.profile.school.as_str()),
        ("Notes", doc.profile.notes.as_str()),
    ];
    for (i, (k, v)) in rows.iter().enumerate() {
        profile.write_string((i + 1) as u32, 0, *k)?;
        profile.write_string((i + 1) as u32, 1, *v)?;
    }
    workbook.push_worksheet(profile);

    let mut todos = Worksheet::new();
    todos.set_name("Todos")?;
    write_header(&mut todos, &["ID", "Task", "Subject", "Due", "Done"])?;
    for (i, t) in doc.todos.iter().enumerate() {
        let r = (i + 1) as u32;
        todos.write_string(r, 0, t.id.as_str())?;
        todos.write_string(r, 1, t.text.as_str())?;
        todos.write_string(r, 2, t.subject.as_deref().unwrap_or(""))?;
        todos.write_string(r, 3, t.due_date.as_deref().unwrap_or(""))?;
        todos.write_boolean(r, 4, t.done)?;
    }
    workbook.push_worksheet(todos);

    let mut tutors = Worksheet::new();
    tutors.set_name("Tutors")?;
    write_header(&mut tutors, &["ID", "Name", "Contact", "Color"])?;
    for (i, t) in doc.tutors.iter().enumerate() {
        let r = (i + 1) as u32;
        tutors.write_string(r, 0, t.id.as_str())?;
        tutors.write_string(r, 1, t.name.as_str())?;
        tutors.write_string(r, 2, t.contact.as_str())?;
        tutors.write_string(r, 3, t.color.as_str())?;
    }
    workbook.push_worksheet(tutors);

    let summary = calc::summarize(&doc.marks, &MarkFilters::default(), scale);

    let mut subjects = Worksheet::new();
    subjects.set_name("Subjects")?;
    write_header(
        &mut subjects,
        &["Subject", "Papers", "Total", "Average", "Best", "Worst", "Favorite"],
    )?;
    for (i, s) in summary.per_subject.iter().enumerate() {
        let r = (i + 1) as u32;
        subjects.write_string(r, 0, s.subject.as_str())?;
        subjects.write_number(r, 1, s.paper_count as f64)?;
        subjects.write_number(r, 2, s.total_marks)?;
        subjects.write_number(r, 3, s.average_marks)?;
        subjects.write_number(r, 4, s.best_score)?;
        subjects.write_number(r, 5, s.worst_score)?;
        subjects.write_boolean(r, 6, doc.favorite_subjects.iter().any(|f| f == &s.subject))?;
    }
    workbook.push_worksheet(subjects);

    let mut overview = Worksheet::new();
    overview.set_name("Summary")?;
    write_header(&mut overview, &["Metric", "Value"])?;
    overview.write_string(1, 0, "Papers")?;
    overview.write_number(1, 1, summary.paper_count as f64)?;
    overview.write_string(2, 0, "Total marks")?;
    overview.write_number(2, 1, summary.total_marks)?;
    overview.write_string(3, 0, "Average")?;
    overview.write_number(3, 1, summary.average_marks)?;
    overview.write_string(4, 0, "Average grade")?;
    overview.write_string(4, 1, summary.average_grade.as_str())?;
    overview.write_string(5, 0, "Best")?;
    overview.write_number(5, 1, summary.best_score)?;
    overview.write_string(6, 0, "Worst")?;
    overview.write_number(6, 1, summary.worst_score)?;
    workbook.push_worksheet(overview);

    let mut meta = Worksheet::new();
    meta.set_name("Meta")?;
    write_header(&mut meta, &["Key", "Value"])?;
    let meta_rows = [
        ("app", doc.meta.app.as_str()),
        ("version", doc.meta.version.as_str()),
        ("exportedAt", doc.meta.exported_at.as_str()),
        ("watermark", doc.meta.watermark.as_str()),
    ];
    for (i, (k, v)) in meta_rows.iter().enumerate() {
        meta.write_string((i + 1) as u32, 0, *k)?;
        meta.write_string((i + 1) as u32, 1, *v)?;
    }
    workbook.push_worksheet(meta);

    Ok(workbook.save_to_buffer()?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub version: Option<String>,
    pub imported_keys: Vec<String>,
    pub skipped_keys: Vec<String>,
    pub mark_count: usize,
}

fn parse_array<T: DeserializeOwned + Serialize>(
    key: &str,
    v: &Value,
) -> Result<Option<String>, ExchangeError> {
    if !v.is_array() {
        return Ok(None);
    }
    let items: Vec<T> = serde_json::from_value(v.clone()).map_err(|e| ExchangeError::Shape {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(serde_json::to_string(&items)?))
}

/// Replaces each recognized top-level key wholesale.
///
/// Everything is parsed before the first write, and the writes go through
/// one `set_many` call.
pub fn import_json_str(store: &dyn Storage, text: &str) -> Result<ImportSummary, ExchangeError> {
    let root: Value = serde_json::from_str(text)?;
    import_document(store, &root)
}

fn import_document(store: &dyn Storage, root: &Value) -> Result<ImportSummary, ExchangeError> {
    let Some(obj) = root.as_object() else {
        return Err(ExchangeError::NotAnObject);
    };

    let mut summary = ImportSummary {
        version: obj
            .get("meta")
            .and_then(|m| m.get("version"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        ..ImportSummary::default()
    };
    let mut writes: Vec<(String, String)> = Vec::new();

    for (key, value) in obj {
        let parsed = match key.as_str() {
            "marks" => {
                let out = parse_array::<MarkEntry>(keys::MARKS, value)?;
                if out.is_some() {
                    summary.mark_count = value.as_array().map(|a| a.len()).unwrap_or(0);
                }
                out.map(|raw| (keys::MARKS, raw))
            }
            "todos" => parse_array::<Todo>(keys::TODOS, value)?.map(|raw| (keys::TODOS, raw)),
            "tutors" => parse_array::<Tutor>(keys::TUTORS, value)?.map(|raw| (keys::TUTORS, raw)),
            "customSubjects" => parse_array::<CustomSubject>(keys::CUSTOM_SUBJECTS, value)?
                .map(|raw| (keys::CUSTOM_SUBJECTS, raw)),
            "favoriteSubjects" => parse_array::<String>(keys::FAVORITE_SUBJECTS, value)?
                .map(|raw| (keys::FAVORITE_SUBJECTS, raw)),
            "studySessions" => parse_array::<StudySession>(keys::STUDY_SESSIONS, value)?
                .map(|raw| (keys::STUDY_SESSIONS, raw)),
            "profile" => {
                if value.is_object() {
                    let p: Profile = serde_json::from_value(value.clone()).map_err(|e| {
                        ExchangeError::Shape {
                            key: keys::PROFILE.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    Some((keys::PROFILE, serde_json::to_string(&p)?))
                } else {
                    None
                }
            }
            "meta" | "achievements" => continue,
            _ => {
                summary.skipped_keys.push(key.clone());
                continue;
            }
        };
        match parsed {
            Some((store_key, raw)) => {
                summary.imported_keys.push(store_key.to_string());
                writes.push((store_key.to_string(), raw));
            }
            None => {
                warn!(key = %key, "import value has the wrong shape; skipped");
                summary.skipped_keys.push(key.clone());
            }
        }
    }

    store.set_many(&writes).map_err(ExchangeError::storage)?;
    info!(keys = ?summary.imported_keys, marks = summary.mark_count, "import applied");
    Ok(summary)
}

pub fn import_json_file(store: &dyn Storage, path: &Path) -> Result<ImportSummary, ExchangeError> {
    let text = std::fs::read_to_string(path)?;
    import_json_str(store, &text)
}

fn cell_text(cell: &Data) -> Option<String> {
    let s = match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) if f.is_finite() => Some(*f),
        Data::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn cell_bool(cell: &Data) -> Option<bool> {
    match cell {
        Data::Bool(b) => Some(*b),
        Data::Int(i) => Some(*i != 0),
        Data::Float(f) => Some(*f != 0.0),
        Data::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Header row of a sheet, keyed by lowercased title.
struct SheetRows<'a> {
    columns: HashMap<String, usize>,
    rows: Vec<&'a [Data]>,
}

impl<'a> SheetRows<'a> {
    fn new(range: &'a Range<Data>) -> Self {
        let mut rows = range.rows();
        let columns: HashMap<String, usize> = rows
            .next()
            .map(|header| {
                header
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| cell_text(c).map(|t| (t.to_ascii_lowercase(), i)))
                    .collect()
            })
            .unwrap_or_default();
        let rows: Vec<&'a [Data]> = rows
            .filter(|r| r.iter().any(|c| cell_text(c).is_some()))
            .collect();
        Self { columns, rows }
    }

    fn cell<'r>(&self, row: &'r [Data], title: &str) -> Option<&'r Data> {
        self.columns.get(title).and_then(|i| row.get(*i))
    }

    fn text(&self, row: &[Data], title: &str) -> Option<String> {
        self.cell(row, title).and_then(cell_text)
    }

    fn number(&self, row: &[Data], title: &str) -> Option<f64> {
        self.cell(row, title).and_then(cell_number)
    }
}

fn put_text(obj: &mut Map<String, Value>, key: &str, v: Option<String>) {
    if let Some(v) = v {
        obj.insert(key.to_string(), Value::String(v));
    }
}

fn put_number(obj: &mut Map<String, Value>, key: &str, v: Option<f64>) {
    if let Some(v) = v {
        obj.insert(key.to_string(), json!(v));
    }
}

fn marks_from_sheet(sheet: &SheetRows) -> Value {
    let rows = sheet.rows.iter().map(|row| {
        let mut m = Map::new();
        put_text(&mut m, "id", sheet.text(row, "id"));
        put_text(&mut m, "subject", sheet.text(row, "subject"));
        put_text(&mut m, "paperName", sheet.text(row, "paper"));
        put_text(&mut m, "date", sheet.text(row, "date"));
        put_number(&mut m, "mcq", sheet.number(row, "mcq"));
        put_number(&mut m, "seq", sheet.number(row, "seq"));
        put_number(&mut m, "essay", sheet.number(row, "essay"));
        put_number(&mut m, "total", sheet.number(row, "total"));
        if let Some(ts) = sheet.number(row, "timestamp") {
            m.insert("timestamp".to_string(), json!(ts as i64));
        }
        Value::Object(m)
    });
    Value::Array(rows.collect())
}

fn todos_from_sheet(sheet: &SheetRows) -> Value {
    let rows = sheet.rows.iter().map(|row| {
        let mut t = Map::new();
        put_text(&mut t, "id", sheet.text(row, "id"));
        put_text(&mut t, "text", sheet.text(row, "task"));
        put_text(&mut t, "subject", sheet.text(row, "subject"));
        put_text(&mut t, "dueDate", sheet.text(row, "due"));
        let done = sheet.cell(row, "done").and_then(cell_bool).unwrap_or(false);
        t.insert("done".to_string(), Value::Bool(done));
        Value::Object(t)
    });
    Value::Array(rows.collect())
}

fn tutors_from_sheet(sheet: &SheetRows) -> Value {
    let rows = sheet.rows.iter().map(|row| {
        let mut t = Map::new();
        put_text(&mut t, "id", sheet.text(row, "id"));
        put_text(&mut t, "name", sheet.text(row, "name"));
        put_text(&mut t, "contact", sheet.text(row, "contact"));
        put_text(&mut t, "color", sheet.text(row, "color"));
        Value::Object(t)
    });
    Value::Array(rows.collect())
}

/// Two-column `Field | Value` sheets (Profile, Meta).
fn fields_from_sheet(sheet: &SheetRows) -> HashMap<String, Data> {
    sheet
        .rows
        .iter()
        .filter_map(|row| {
            let field = row.first().and_then(cell_text)?;
            Some((field.to_ascii_lowercase(), row.get(1).cloned().unwrap_or(Data::Empty)))
        })
        .collect()
}

fn profile_from_sheet(sheet: &SheetRows) -> Value {
    let fields = fields_from_sheet(sheet);
    let text = |k: &str| fields.get(k).and_then(cell_text).unwrap_or_default();
    json!({
        "name": text("name"),
        "age": fields.get("age").and_then(cell_number).map(|a| a as u32),
        "school": text("school"),
        "notes": text("notes"),
    })
}

/// Reads the sheets written by [`to_xlsx`] back into an import document.
///
/// Columns are matched by header title, so reordered or hand-made sheets
/// work as long as the titles match. Derived sheets (Subjects, Summary) are
/// ignored.
fn document_from_xlsx(bytes: &[u8]) -> Result<Value, ExchangeError> {
    let mut workbook: Xlsx<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: calamine::XlsxError| ExchangeError::SheetRead(e.to_string()))?;
    let names = workbook.sheet_names();

    let mut doc = Map::new();
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExchangeError::SheetRead(format!("{name}: {e}")))?;
        let sheet = SheetRows::new(&range);
        match name.to_ascii_lowercase().as_str() {
            "marks" => {
                doc.insert("marks".to_string(), marks_from_sheet(&sheet));
            }
            "todos" => {
                doc.insert("todos".to_string(), todos_from_sheet(&sheet));
            }
            "tutors" => {
                doc.insert("tutors".to_string(), tutors_from_sheet(&sheet));
            }
            "profile" => {
                doc.insert("profile".to_string(), profile_from_sheet(&sheet));
            }
            "meta" => {
                let fields = fields_from_sheet(&sheet);
                let version = fields.get("version").and_then(cell_text);
                doc.insert("meta".to_string(), json!({ "version": version }));
            }
            _ => {}
        }
    }
    if !doc.contains_key("marks") {
        return Err(ExchangeError::SheetRead("workbook has no Marks sheet".to_string()));
    }
    Ok(Value::Object(doc))
}

pub fn import_xlsx_bytes(
    store: &dyn Storage,
    bytes: &[u8],
) -> Result<ImportSummary, ExchangeError> {
    let doc = document_from_xlsx(bytes)?;
    import_document(store, &doc)
}

pub fn import_xlsx_file(store: &dyn Storage, path: &Path) -> Result<ImportSummary, ExchangeError> {
    let bytes = std::fs::read(path)?;
    import_xlsx_bytes(store, &bytes)
}
