use crate::grading::{Grade, GradeScale};
use crate::model::MarkEntry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// One-decimal round-off used for every displayed average:
/// `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkFilters {
    pub subject: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl MarkFilters {
    fn has_date_bound(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn matches(&self, entry: &MarkEntry) -> bool {
        if let Some(subject) = &self.subject {
            if !entry.subject.trim().eq_ignore_ascii_case(subject) {
                return false;
            }
        }
        if !self.has_date_bound() {
            return true;
        }
        let Some(d) = parse_entry_date(&entry.date) else {
            return false;
        };
        let from_ok = self.from.map(|f| d >= f).unwrap_or(true);
        let to_ok = self.to.map(|t| d <= t).unwrap_or(true);
        from_ok && to_ok
    }
}

/// Accepts `YYYY-MM-DD` optionally followed by a time part.
pub fn parse_entry_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    let head = t.get(..10).unwrap_or(t);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn parse_mark_filters(raw: Option<&serde_json::Value>) -> Result<MarkFilters, CalcError> {
    let Some(raw) = raw else {
        return Ok(MarkFilters::default());
    };
    if raw.is_null() {
        return Ok(MarkFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "filters must be an object"));
    };

    let subject = match obj.get("subject") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(CalcError::new(
                    "bad_params",
                    "filters.subject must be string or null",
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                None
            } else {
                Some(t.to_string())
            }
        }
    };

    let from = parse_date_bound(obj.get("from"), "filters.from")?;
    let to = parse_date_bound(obj.get("to"), "filters.to")?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(CalcError::new("bad_params", "filters.from must not be after filters.to"));
        }
    }

    Ok(MarkFilters { subject, from, to })
}

fn parse_date_bound(
    v: Option<&serde_json::Value>,
    key: &str,
) -> Result<Option<NaiveDate>, CalcError> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or_else(|| {
                CalcError::new("bad_params", format!("{} must be a date string", key))
            })?;
            if s.trim().is_empty() {
                return Ok(None);
            }
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|_| CalcError::new("bad_params", format!("{} must be YYYY-MM-DD", key)))
        }
    }
}

pub fn filter_entries<'a>(entries: &'a [MarkEntry], filters: &MarkFilters) -> Vec<&'a MarkEntry> {
    entries.iter().filter(|e| filters.matches(e)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCount {
    pub grade: Grade,
    pub count: usize,
}

fn grade_distribution(entries: &[&MarkEntry], scale: &GradeScale) -> Vec<GradeCount> {
    let mut counts: HashMap<Grade, usize> = HashMap::new();
    for e in entries {
        *counts.entry(scale.grade(e.total, 100.0)).or_insert(0) += 1;
    }
    scale
        .letters()
        .into_iter()
        .map(|grade| GradeCount {
            grade,
            count: counts.get(&grade).copied().unwrap_or(0),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject: String,
    pub paper_count: usize,
    pub total_marks: f64,
    pub average_marks: f64,
    pub best_score: f64,
    pub worst_score: f64,
    pub latest_date: Option<String>,
    pub distribution: Vec<GradeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: String,
    pub average_marks: f64,
    pub paper_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSummary {
    pub filters: MarkFilters,
    pub paper_count: usize,
    pub total_marks: f64,
    pub average_marks: f64,
    pub average_label: String,
    pub average_grade: Grade,
    pub best_score: f64,
    pub worst_score: f64,
    pub distribution: Vec<GradeCount>,
    pub per_subject: Vec<SubjectSummary>,
    pub recent: Vec<MarkEntry>,
    pub trend: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Totals {
    count: usize,
    sum: f64,
    best: f64,
    worst: f64,
}

fn totals(entries: &[&MarkEntry]) -> Totals {
    if entries.is_empty() {
        return Totals {
            count: 0,
            sum: 0.0,
            best: 0.0,
            worst: 0.0,
        };
    }
    let mut sum = 0.0_f64;
    let mut best = f64::NEG_INFINITY;
    let mut worst = f64::INFINITY;
    for e in entries {
        sum += e.total;
        best = best.max(e.total);
        worst = worst.min(e.total);
    }
    Totals {
        count: entries.len(),
        sum,
        best,
        worst,
    }
}

fn mean_or_zero(sum: f64, count: usize) -> f64 {
    if count > 0 {
        sum / (count as f64)
    } else {
        0.0
    }
}

pub const RECENT_LIMIT: usize = 5;

pub fn summarize(entries: &[MarkEntry], filters: &MarkFilters, scale: &GradeScale) -> MarkSummary {
    let selected = filter_entries(entries, filters);
    let overall = totals(&selected);
    let average_raw = mean_or_zero(overall.sum, overall.count);
    let average_marks = round_off_1_decimal(average_raw);

    let mut by_subject: BTreeMap<String, Vec<&MarkEntry>> = BTreeMap::new();
    for e in &selected {
        by_subject.entry(e.subject.trim().to_string()).or_default().push(e);
    }

    let mut per_subject: Vec<SubjectSummary> = by_subject
        .into_iter()
        .map(|(subject, rows)| {
            let t = totals(&rows);
            let latest_date = rows
                .iter()
                .filter_map(|e| parse_entry_date(&e.date))
                .max()
                .map(|d| d.format("%Y-%m-%d").to_string());
            SubjectSummary {
                subject,
                paper_count: t.count,
                total_marks: t.sum,
                average_marks: round_off_1_decimal(mean_or_zero(t.sum, t.count)),
                best_score: t.best,
                worst_score: t.worst,
                latest_date,
                distribution: grade_distribution(&rows, scale),
            }
        })
        .collect();
    // BTreeMap already yields names ascending; the stable sort keeps that as the tie-break.
    per_subject.sort_by(|a, b| b.paper_count.cmp(&a.paper_count));

    let mut recent: Vec<MarkEntry> = selected.iter().map(|e| (*e).clone()).collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(RECENT_LIMIT);

    MarkSummary {
        filters: filters.clone(),
        paper_count: overall.count,
        total_marks: overall.sum,
        average_marks,
        average_label: format!("{:.1}", average_marks),
        average_grade: scale.grade(average_marks, 100.0),
        best_score: overall.best,
        worst_score: overall.worst,
        distribution: grade_distribution(&selected, scale),
        per_subject,
        recent,
        trend: trend_by_date(&selected),
    }
}

fn trend_by_date(entries: &[&MarkEntry]) -> Vec<TrendPoint> {
    let mut by_date: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for e in entries {
        let Some(d) = parse_entry_date(&e.date) else {
            continue;
        };
        let slot = by_date.entry(d).or_insert((0.0, 0));
        slot.0 += e.total;
        slot.1 += 1;
    }
    by_date
        .into_iter()
        .map(|(d, (sum, count))| TrendPoint {
            date: d.format("%Y-%m-%d").to_string(),
            average_marks: round_off_1_decimal(mean_or_zero(sum, count)),
            paper_count: count,
        })
        .collect()
}

/// Population mean and standard deviation (denominator N).
pub fn population_stats(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Zero everywhere when the spread is zero.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    let (mean, std_dev) = population_stats(values);
    if !(std_dev > 0.0) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std_dev).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryZScore {
    pub id: String,
    pub subject: String,
    pub total: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispersion {
    pub count: usize,
    pub mean: f64,
    pub standard_deviation: f64,
    pub z_score_average: f64,
    pub above_average: usize,
    pub below_average: usize,
    pub at_average: usize,
    pub entries: Vec<EntryZScore>,
}

pub fn dispersion(entries: &[MarkEntry], filters: &MarkFilters) -> Dispersion {
    let selected = filter_entries(entries, filters);
    let values: Vec<f64> = selected.iter().map(|e| e.total).collect();
    let (mean, std_dev) = population_stats(&values);
    let zs = z_scores(&values);
    // Counts follow the reported (rounded) z-scores.
    let rounded: Vec<f64> = zs.iter().map(|z| round_off_2_decimal(*z)).collect();

    let mut above = 0;
    let mut below = 0;
    let mut at = 0;
    for z in &rounded {
        match z.partial_cmp(&0.0).unwrap_or(Ordering::Equal) {
            Ordering::Greater => above += 1,
            Ordering::Less => below += 1,
            Ordering::Equal => at += 1,
        }
    }
    let z_avg = mean_or_zero(zs.iter().sum(), zs.len());

    Dispersion {
        count: values.len(),
        mean: round_off_1_decimal(mean),
        standard_deviation: round_off_2_decimal(std_dev),
        z_score_average: round_off_2_decimal(z_avg),
        above_average: above,
        below_average: below,
        at_average: at,
        entries: selected
            .iter()
            .zip(rounded.iter())
            .map(|(e, z)| EntryZScore {
                id: e.id.clone(),
                subject: e.subject.clone(),
                total: e.total,
                z_score: *z,
            })
            .collect(),
    }
}

fn round_off_2_decimal(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}
