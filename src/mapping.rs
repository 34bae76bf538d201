//! Coordinate mapping between viewer space and page space.
//!
//! Two coordinate spaces exist. *Viewer space* is the pixel space of the
//! on-screen rendered page element: origin top-left, size varies with zoom
//! and device. *Page space* is the PDF point space intrinsic to a page:
//! origin bottom-left, fixed per page.
//!
//! Placements are captured in viewer space together with the viewer's
//! dimensions at capture time, so a later session rendering at a different
//! zoom reproduces the same *relative* position instead of a stale absolute
//! pixel offset. Everything here is a pure transform: the caller supplies
//! the current render-surface dimensions, and no clamping is applied.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

/// Stamp width in points.
pub const STAMP_WIDTH: f64 = 220.0;
/// Stamp height in points.
pub const STAMP_HEIGHT: f64 = 100.0;
/// Margin from page edges used by grid anchors, in points.
pub const GRID_MARGIN: f64 = 50.0;

/// Pixel dimensions of the on-screen rendered page element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerDims {
    /// Rendered width in pixels
    pub width: f64,
    /// Rendered height in pixels
    pub height: f64,
}

impl ViewerDims {
    /// Create viewer dimensions.
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_usable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// One of the nine symbolic placement anchors of the compass grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridAnchor {
    /// Top-left corner region
    TopLeft,
    /// Top edge, horizontally centered
    TopCenter,
    /// Top-right corner region
    TopRight,
    /// Left edge, vertically centered
    MiddleLeft,
    /// Page center
    MiddleCenter,
    /// Right edge, vertically centered
    MiddleRight,
    /// Bottom-left corner region
    BottomLeft,
    /// Bottom edge, horizontally centered
    BottomCenter,
    /// Bottom-right corner region
    BottomRight,
}

impl GridAnchor {
    /// All nine anchors, row-major from the top-left.
    pub const ALL: [GridAnchor; 9] = [
        GridAnchor::TopLeft,
        GridAnchor::TopCenter,
        GridAnchor::TopRight,
        GridAnchor::MiddleLeft,
        GridAnchor::MiddleCenter,
        GridAnchor::MiddleRight,
        GridAnchor::BottomLeft,
        GridAnchor::BottomCenter,
        GridAnchor::BottomRight,
    ];

    /// Parse the wire form (`"top-left"`, `"middle-center"`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "top-left" => Some(GridAnchor::TopLeft),
            "top-center" => Some(GridAnchor::TopCenter),
            "top-right" => Some(GridAnchor::TopRight),
            "middle-left" => Some(GridAnchor::MiddleLeft),
            "middle-center" => Some(GridAnchor::MiddleCenter),
            "middle-right" => Some(GridAnchor::MiddleRight),
            "bottom-left" => Some(GridAnchor::BottomLeft),
            "bottom-center" => Some(GridAnchor::BottomCenter),
            "bottom-right" => Some(GridAnchor::BottomRight),
            _ => None,
        }
    }

    /// The wire form of this anchor.
    pub fn as_str(&self) -> &'static str {
        match self {
            GridAnchor::TopLeft => "top-left",
            GridAnchor::TopCenter => "top-center",
            GridAnchor::TopRight => "top-right",
            GridAnchor::MiddleLeft => "middle-left",
            GridAnchor::MiddleCenter => "middle-center",
            GridAnchor::MiddleRight => "middle-right",
            GridAnchor::BottomLeft => "bottom-left",
            GridAnchor::BottomCenter => "bottom-center",
            GridAnchor::BottomRight => "bottom-right",
        }
    }
}

/// Resolve a grid anchor into a stamp rectangle on a page.
///
/// Columns map to {left margin, horizontal center, right margin-adjusted};
/// rows map to {margin below the top edge, vertical center, margin above
/// the bottom edge}. Deterministic: identical inputs always yield an
/// identical rectangle.
pub fn resolve_grid(anchor: GridAnchor, page_width: f64, page_height: f64) -> Rect {
    let x = match anchor {
        GridAnchor::TopLeft | GridAnchor::MiddleLeft | GridAnchor::BottomLeft => GRID_MARGIN,
        GridAnchor::TopCenter | GridAnchor::MiddleCenter | GridAnchor::BottomCenter => {
            (page_width - STAMP_WIDTH) / 2.0
        },
        GridAnchor::TopRight | GridAnchor::MiddleRight | GridAnchor::BottomRight => {
            page_width - STAMP_WIDTH - GRID_MARGIN
        },
    };
    let y = match anchor {
        GridAnchor::TopLeft | GridAnchor::TopCenter | GridAnchor::TopRight => {
            page_height - GRID_MARGIN - STAMP_HEIGHT
        },
        GridAnchor::MiddleLeft | GridAnchor::MiddleCenter | GridAnchor::MiddleRight => {
            (page_height - STAMP_HEIGHT) / 2.0
        },
        GridAnchor::BottomLeft | GridAnchor::BottomCenter | GridAnchor::BottomRight => GRID_MARGIN,
    };
    Rect::new(x, y, STAMP_WIDTH, STAMP_HEIGHT)
}

/// Resolve a captured viewer-space point into a stamp rectangle.
///
/// The stored pixel point is first rescaled component-wise by
/// `current / captured` (scale 1.0 when the capture-time dimensions are
/// absent or zero), then normalized to `[0, 1]` against the current viewer
/// dimensions, mapped into page space, and flipped vertically to convert
/// the top-left viewer origin into the bottom-left page origin.
///
/// When no viewer dimensions are available at all, the point is treated as
/// already page-relative and only the vertical flip is applied.
pub fn resolve_custom(
    point: Point,
    captured: Option<ViewerDims>,
    current: Option<ViewerDims>,
    page_width: f64,
    page_height: f64,
) -> Rect {
    let captured = captured.filter(ViewerDims::is_usable);
    let current = current.filter(ViewerDims::is_usable);

    let (scale_x, scale_y) = match (captured, current) {
        (Some(cap), Some(cur)) => (cur.width / cap.width, cur.height / cap.height),
        _ => (1.0, 1.0),
    };
    let rescaled = Point::new(point.x * scale_x, point.y * scale_y);

    // Normalization basis: the surface the rescaled point lives on.
    let basis = current
        .or(captured)
        .unwrap_or(ViewerDims::new(page_width, page_height));

    let norm_x = rescaled.x / basis.width;
    let norm_y = rescaled.y / basis.height;

    let x = norm_x * page_width;
    let y = page_height - norm_y * page_height - STAMP_HEIGHT;
    Rect::new(x, y, STAMP_WIDTH, STAMP_HEIGHT)
}
