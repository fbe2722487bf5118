use crate::calc::parse_entry_date;
use crate::model::MarkEntry;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    PaperCount,
    SubjectCount,
    Streak,
    BestScore,
}

#[derive(Debug, Clone, Copy)]
pub struct AchievementDef {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub metric: Metric,
    pub threshold: f64,
}

pub const ACHIEVEMENTS: &[AchievementDef] = &[
    AchievementDef {
        id: "first-paper",
        title: "First Step",
        description: "Record your first paper",
        metric: Metric::PaperCount,
        threshold: 1.0,
    },
    AchievementDef {
        id: "five-papers",
        title: "Getting Serious",
        description: "Record 5 papers",
        metric: Metric::PaperCount,
        threshold: 5.0,
    },
    AchievementDef {
        id: "quarter-century",
        title: "Paper Trail",
        description: "Record 25 papers",
        metric: Metric::PaperCount,
        threshold: 25.0,
    },
    AchievementDef {
        id: "centurion",
        title: "Centurion",
        description: "Record 100 papers",
        metric: Metric::PaperCount,
        threshold: 100.0,
    },
    AchievementDef {
        id: "explorer",
        title: "Explorer",
        description: "Record papers in 3 different subjects",
        metric: Metric::SubjectCount,
        threshold: 3.0,
    },
    AchievementDef {
        id: "all-rounder",
        title: "All-Rounder",
        description: "Record papers in 5 different subjects",
        metric: Metric::SubjectCount,
        threshold: 5.0,
    },
    AchievementDef {
        id: "streak-3",
        title: "On a Roll",
        description: "Record papers on 3 consecutive days",
        metric: Metric::Streak,
        threshold: 3.0,
    },
    AchievementDef {
        id: "streak-7",
        title: "Week Warrior",
        description: "Record papers on 7 consecutive days",
        metric: Metric::Streak,
        threshold: 7.0,
    },
    AchievementDef {
        id: "distinction",
        title: "Distinction",
        description: "Score 75 or more on a paper",
        metric: Metric::BestScore,
        threshold: 75.0,
    },
    AchievementDef {
        id: "high-flyer",
        title: "High Flyer",
        description: "Score 90 or more on a paper",
        metric: Metric::BestScore,
        threshold: 90.0,
    },
    AchievementDef {
        id: "perfect-paper",
        title: "Perfect Paper",
        description: "Score 100 on a paper",
        metric: Metric::BestScore,
        threshold: 100.0,
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementInputs {
    pub paper_count: usize,
    pub subject_count: usize,
    pub longest_streak: u32,
    pub best_score: f64,
}

impl AchievementInputs {
    pub fn from_entries(entries: &[MarkEntry]) -> Self {
        let subjects: HashSet<&str> = entries
            .iter()
            .map(|e| e.subject.trim())
            .filter(|s| !s.is_empty())
            .collect();
        let best_score = entries
            .iter()
            .map(|e| e.total)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0);
        Self {
            paper_count: entries.len(),
            subject_count: subjects.len(),
            longest_streak: longest_streak(entries),
            best_score,
        }
    }

    fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::PaperCount => self.paper_count as f64,
            Metric::SubjectCount => self.subject_count as f64,
            Metric::Streak => self.longest_streak as f64,
            Metric::BestScore => self.best_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    pub id: String,
    pub title: String,
    pub description: String,
    pub metric: Metric,
    pub unlocked: bool,
    pub current: f64,
    pub threshold: f64,
    pub progress: f64,
}

pub fn evaluate_def(def: &AchievementDef, inputs: &AchievementInputs) -> AchievementProgress {
    let current = inputs.value(def.metric);
    let progress = if def.threshold > 0.0 {
        (current / def.threshold).clamp(0.0, 1.0)
    } else {
        1.0
    };
    AchievementProgress {
        id: def.id.to_string(),
        title: def.title.to_string(),
        description: def.description.to_string(),
        metric: def.metric,
        unlocked: current >= def.threshold,
        current,
        threshold: def.threshold,
        progress,
    }
}

pub fn evaluate(entries: &[MarkEntry]) -> Vec<AchievementProgress> {
    let inputs = AchievementInputs::from_entries(entries);
    ACHIEVEMENTS.iter().map(|d| evaluate_def(d, &inputs)).collect()
}

fn distinct_dates(entries: &[MarkEntry]) -> BTreeSet<NaiveDate> {
    entries
        .iter()
        .filter_map(|e| parse_entry_date(&e.date))
        .collect()
}

/// Longest run of calendar days, each exactly one day after the previous.
/// Several entries on the same day count once.
pub fn longest_streak(entries: &[MarkEntry]) -> u32 {
    longest_run(&distinct_dates(entries))
}

pub fn longest_run(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut best = 0_u32;
    let mut run = 0_u32;
    let mut prev: Option<NaiveDate> = None;
    for d in dates {
        run = match prev {
            Some(p) if p.succ_opt() == Some(*d) => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(*d);
    }
    best
}

/// Run ending today, or yesterday when nothing is recorded yet today.
pub fn current_run(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut cursor = if dates.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(y) if dates.contains(&y) => y,
            _ => return 0,
        }
    };
    let mut run = 0_u32;
    loop {
        if !dates.contains(&cursor) {
            break;
        }
        run += 1;
        match cursor.pred_opt() {
            Some(p) => cursor = p,
            None => break,
        }
    }
    run
}

pub fn current_streak(entries: &[MarkEntry], today: NaiveDate) -> u32 {
    current_run(&distinct_dates(entries), today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject: &str, date: &str, total: f64) -> MarkEntry {
        MarkEntry {
            id: crate::model::new_id(),
            subject: subject.to_string(),
            paper_name: "Past paper".to_string(),
            date: date.to_string(),
            mcq: None,
            seq: None,
            essay: None,
            total,
            timestamp: 0,
        }
    }

    fn find<'a>(list: &'a [AchievementProgress], id: &str) -> &'a AchievementProgress {
        list.iter().find(|a| a.id == id).expect("achievement present")
    }

    #[test]
    fn five_papers_unlocks_at_exactly_five() {
        let mut entries: Vec<MarkEntry> =
            (0..4).map(|_| entry("Physics", "2024-01-01", 50.0)).collect();
        let four = evaluate(&entries);
        let a = find(&four, "five-papers");
        assert!(!a.unlocked);
        assert_eq!(a.progress, 0.8);

        entries.push(entry("Physics", "2024-01-02", 50.0));
        let five = evaluate(&entries);
        let a = find(&five, "five-papers");
        assert!(a.unlocked);
        assert_eq!(a.progress, 1.0);

        entries.extend((0..7).map(|_| entry("Physics", "2024-01-03", 50.0)));
        let twelve = evaluate(&entries);
        let a = find(&twelve, "five-papers");
        assert!(a.unlocked);
        assert_eq!(a.progress, 1.0);
        assert_eq!(a.current, 12.0);
    }

    #[test]
    fn empty_list_unlocks_nothing() {
        let list = evaluate(&[]);
        assert_eq!(list.len(), ACHIEVEMENTS.len());
        assert!(list.iter().all(|a| !a.unlocked && a.progress == 0.0));
    }

    #[test]
    fn subject_diversity_and_best_score() {
        let entries = vec![
            entry("Physics", "2024-01-01", 91.0),
            entry(" Physics ", "2024-01-01", 40.0),
            entry("Chemistry", "2024-01-01", 60.0),
            entry("Biology", "2024-01-01", 70.0),
        ];
        let list = evaluate(&entries);
        assert!(find(&list, "explorer").unlocked);
        assert!(!find(&list, "all-rounder").unlocked);
        assert!(find(&list, "high-flyer").unlocked);
        assert!(!find(&list, "perfect-paper").unlocked);
    }

    #[test]
    fn streak_counts_distinct_consecutive_days() {
        let entries = vec![
            entry("Physics", "2024-01-01", 50.0),
            entry("Physics", "2024-01-02", 50.0),
            entry("Physics", "2024-01-02", 50.0),
            entry("Physics", "2024-01-03", 50.0),
            entry("Physics", "2024-01-05", 50.0),
            entry("Physics", "2024-01-06", 50.0),
            entry("Physics", "garbage", 50.0),
        ];
        assert_eq!(longest_streak(&entries), 3);
        assert_eq!(longest_streak(&[]), 0);
    }

    #[test]
    fn streak_crosses_month_boundary() {
        let entries = vec![
            entry("Physics", "2024-02-28", 50.0),
            entry("Physics", "2024-02-29", 50.0),
            entry("Physics", "2024-03-01", 50.0),
        ];
        assert_eq!(longest_streak(&entries), 3);
    }

    #[test]
    fn current_streak_allows_a_gap_of_today() {
        let entries = vec![
            entry("Physics", "2024-06-08", 50.0),
            entry("Physics", "2024-06-09", 50.0),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).expect("date");
        assert_eq!(current_streak(&entries, today), 2);
        let later = NaiveDate::from_ymd_opt(2024, 6, 11).expect("date");
        assert_eq!(current_streak(&entries, later), 0);
    }
}
