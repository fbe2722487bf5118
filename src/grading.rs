use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    S,
    W,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::S => "S",
            Grade::W => "W",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    /// A/B/C/S/F.
    #[default]
    Standard,
    /// Adds a W band between S and F.
    Extended,
}

impl ScaleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "extended" => Some(Self::Extended),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Extended => "extended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub grade: Grade,
    pub min_percent: f64,
}

const fn band(grade: Grade, min_percent: f64) -> GradeBand {
    GradeBand { grade, min_percent }
}

/// Percentage bands, highest first. The last band is the catch-all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeScale {
    pub kind: ScaleKind,
    pub bands: Vec<GradeBand>,
}

impl GradeScale {
    pub fn standard() -> Self {
        Self {
            kind: ScaleKind::Standard,
            bands: vec![
                band(Grade::A, 75.0),
                band(Grade::B, 65.0),
                band(Grade::C, 50.0),
                band(Grade::S, 40.0),
                band(Grade::F, f64::NEG_INFINITY),
            ],
        }
    }

    pub fn extended() -> Self {
        Self {
            kind: ScaleKind::Extended,
            bands: vec![
                band(Grade::A, 75.0),
                band(Grade::B, 65.0),
                band(Grade::C, 50.0),
                band(Grade::S, 40.0),
                band(Grade::W, 30.0),
                band(Grade::F, f64::NEG_INFINITY),
            ],
        }
    }

    pub fn for_kind(kind: ScaleKind) -> Self {
        match kind {
            ScaleKind::Standard => Self::standard(),
            ScaleKind::Extended => Self::extended(),
        }
    }

    pub fn letters(&self) -> Vec<Grade> {
        self.bands.iter().map(|b| b.grade).collect()
    }

    pub fn lowest(&self) -> Grade {
        self.bands.last().map(|b| b.grade).unwrap_or(Grade::F)
    }

    /// Grade for a score out of `max`.
    ///
    /// A non-positive `max` has no meaningful percentage and lands in the
    /// lowest band, as does any non-finite score.
    pub fn grade(&self, score: f64, max: f64) -> Grade {
        if !(max > 0.0) {
            return self.lowest();
        }
        self.grade_percent(100.0 * score / max)
    }

    pub fn grade_percent(&self, percent: f64) -> Grade {
        if !percent.is_finite() {
            return self.lowest();
        }
        self.bands
            .iter()
            .find(|b| percent >= b.min_percent)
            .map(|b| b.grade)
            .unwrap_or_else(|| self.lowest())
    }
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::standard()
    }
}
