//! Charts module - chart selection, scaling and animated chart configs

mod generator;
mod output;
mod scale;
mod selection;

pub use generator::{ChartError, ChartGenerator};
pub use output::{
    group_color, Axis, ChartSpec, ColorScale, DataPoint, Encoding, FacetEncoding, Frame,
    GroupColor, SizeEncoding, PALETTE, SEQUENTIAL_SCHEME, SIZE_MAX_PX,
};
pub use scale::{generate_scale, scale_lower_limit, scale_upper_limit};
pub use selection::{ChartKind, ChartOptions, ChartRequest, Facet, Metric, Scope, SizeMetric};
