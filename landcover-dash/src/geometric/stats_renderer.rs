use serde::Serialize;
use std::collections::BTreeSet;

use crate::commons::basic_functions::{format_fixed, round_to};
use crate::geometric::land_cover::{ClassCode, ClassTable, Rgb, UNKNOWN_CLASS_COLOR};
use crate::geometric::stats_store::{DerivedStat, StatsStore};

pub const STATS_TITLE: &str = "Land Cover Statistics (km²)";
pub const UNAVAILABLE_MESSAGE: &str = "Statistics unavailable";
pub const OTHER_CLASSES_LABEL: &str = "Other classes";

/// Display precision for areas and percentages
const DECIMALS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "code", rename_all = "snake_case")]
pub enum RenderScope {
    AllClasses,
    SingleClass(ClassCode),
}

impl RenderScope {
    fn includes(self, code: ClassCode) -> bool {
        match self {
            RenderScope::AllClasses => true,
            RenderScope::SingleClass(selected) => selected == code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatLine {
    pub code: ClassCode,
    pub label: String,
    pub area_km2: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub code: ClassCode,
    pub label: String,
    pub color: Rgb,
    pub percent: f64,
}

/// Pie slice, angles in degrees clockwise from 12 o'clock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSegment {
    /// `None` for the "Other classes" remainder
    pub code: Option<ClassCode>,
    pub label: String,
    pub color: Rgb,
    pub percent: f64,
    pub start_deg: f64,
    pub sweep_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsView {
    pub scope: RenderScope,
    pub title: String,
    pub total_area_km2: f64,
    /// Sorted by class code, ascending
    pub lines: Vec<StatLine>,
    pub legend: Vec<LegendEntry>,
    pub pie: Vec<PieSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DisplayPayload {
    Stats(StatsView),
    Unavailable { message: String },
}

impl DisplayPayload {
    pub fn unavailable() -> Self {
        DisplayPayload::Unavailable {
            message: UNAVAILABLE_MESSAGE.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, DisplayPayload::Unavailable { .. })
    }

    pub fn view(&self) -> Option<&StatsView> {
        match self {
            DisplayPayload::Stats(view) => Some(view),
            DisplayPayload::Unavailable { .. } => None,
        }
    }

    /// Plain text block for label widgets
    pub fn to_text(&self) -> String {
        match self {
            DisplayPayload::Unavailable { message } => message.clone(),
            DisplayPayload::Stats(view) => {
                let mut text = format!("{}\n\n", view.title);
                for line in &view.lines {
                    text.push_str(&format!(
                        "{}: {} km² ({}%)\n",
                        line.label,
                        format_fixed(line.area_km2, DECIMALS as usize),
                        format_fixed(line.percent, DECIMALS as usize)
                    ));
                }
                text
            }
        }
    }
}

/// Pure projection of a `StatsStore` into display payloads
#[derive(Debug, Clone)]
pub struct StatsRenderer {
    classes: ClassTable,
}

impl StatsRenderer {
    pub fn new(classes: ClassTable) -> Self {
        StatsRenderer { classes }
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn render(&self, store: &StatsStore, scope: RenderScope) -> DisplayPayload {
        if !store.is_available() {
            return DisplayPayload::unavailable();
        }

        let in_scope: Vec<&DerivedStat> = store
            .derived()
            .values()
            .filter(|stat| scope.includes(stat.code))
            .collect();

        let lines = in_scope
            .iter()
            .map(|stat| StatLine {
                code: stat.code,
                label: self.classes.label(stat.code),
                area_km2: round_to(stat.area_km2, DECIMALS),
                percent: round_to(stat.percent_of_total, DECIMALS),
            })
            .collect();

        DisplayPayload::Stats(StatsView {
            scope,
            title: STATS_TITLE.to_string(),
            total_area_km2: round_to(store.total_area_km2(), DECIMALS),
            lines,
            legend: self.legend(store, scope),
            pie: self.pie(&in_scope, scope),
        })
    }

    fn legend(&self, store: &StatsStore, scope: RenderScope) -> Vec<LegendEntry> {
        let codes: BTreeSet<ClassCode> = match scope {
            RenderScope::AllClasses => self
                .classes
                .codes()
                .chain(store.derived().keys().copied())
                .collect(),
            RenderScope::SingleClass(code) => std::iter::once(code).collect(),
        };

        codes
            .into_iter()
            .map(|code| LegendEntry {
                code,
                label: self.classes.label(code),
                color: self.classes.color(code),
                percent: store
                    .stat_for(code)
                    .map(|s| round_to(s.percent_of_total, DECIMALS))
                    .unwrap_or(0.0),
            })
            .collect()
    }

    fn pie(&self, in_scope: &[&DerivedStat], scope: RenderScope) -> Vec<PieSegment> {
        let mut segments = Vec::new();
        let mut start = 0.0;
        let mut covered = 0.0;

        for stat in in_scope.iter().filter(|s| s.percent_of_total > 0.0) {
            let sweep = stat.percent_of_total * 3.6;
            segments.push(PieSegment {
                code: Some(stat.code),
                label: self.classes.label(stat.code),
                color: self.classes.color(stat.code),
                percent: round_to(stat.percent_of_total, DECIMALS),
                start_deg: start,
                sweep_deg: sweep,
            });
            start += sweep;
            covered += stat.percent_of_total;
        }

        if let RenderScope::SingleClass(_) = scope {
            let remainder = (100.0 - covered).max(0.0);
            if remainder > 0.0 {
                segments.push(PieSegment {
                    code: None,
                    label: OTHER_CLASSES_LABEL.to_string(),
                    color: UNKNOWN_CLASS_COLOR,
                    percent: round_to(remainder, DECIMALS),
                    start_deg: start,
                    sweep_deg: remainder * 3.6,
                });
            }
        }

        segments
    }
}
