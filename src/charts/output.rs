//! Chart Output Module
//! Serializable chart configurations handed to the rendering layer.

use crate::charts::{ChartKind, Facet, Metric, Scope};
use chrono::NaiveDate;
use serde::Serialize;

/// Discrete colors for continent and country groups.
pub const PALETTE: [&str; 10] = [
    "#e74c3c", // Red
    "#2ecc71", // Green
    "#9b59b6", // Purple
    "#f39c12", // Orange
    "#1abc9c", // Teal
    "#e91e63", // Pink
    "#00bcd4", // Cyan
    "#ff5722", // Deep Orange
    "#795548", // Brown
    "#607d8b", // Blue Grey
];

/// Sequential color scheme of choropleth maps and geo markers.
pub const SEQUENTIAL_SCHEME: &str = "Reds";

/// Largest marker diameter in pixels for sized markers.
pub const SIZE_MAX_PX: u32 = 60;

/// Color for the group at `index` in sorted group order.
pub fn group_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// A complete animated chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub scope: Scope,
    pub metric: Metric,
    pub title: String,
    pub encoding: Encoding,
    /// One frame per date, ascending.
    pub frames: Vec<Frame>,
}

impl ChartSpec {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.frames.iter().map(|f| f.date).collect()
    }

    pub fn point_count(&self) -> usize {
        self.frames.iter().map(|f| f.points.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// How point fields map onto visual channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Encoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorScale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet: Option<FacetEncoding>,
    /// Discrete group colors, sorted by group name.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupColor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub field: String,
    pub label: String,
    pub range: [f64; 2],
}

/// Continuous color channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorScale {
    pub field: String,
    pub label: String,
    pub range: [f64; 2],
    pub log: bool,
    pub scheme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeEncoding {
    pub field: String,
    pub max_px: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetEncoding {
    pub field: String,
    pub direction: Facet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupColor {
    pub name: String,
    pub color: String,
}

/// Points shown on one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub date: NaiveDate,
    pub points: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    /// Country or group name shown on hover.
    pub label: String,
    /// Alpha-3 code placing the point on a map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Continent the point belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}
