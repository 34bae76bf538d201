//! Minimal PDF content-stream builder.
//!
//! Emits only the operators stamping needs: graphics-state save/restore,
//! a transformation matrix, XObject painting, and simple text objects.
//! Operator syntax per ISO 32000-1:2008 Sections 8-9.

/// Operations a stamp content stream can contain.
#[derive(Debug, Clone)]
pub enum ContentOp {
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Set transformation matrix (cm)
    Transform(f64, f64, f64, f64, f64, f64),
    /// Paint a named XObject (Do)
    PaintXObject(String),
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,
    /// Set font and size (Tf)
    SetFont(String, f64),
    /// Position the text line (Td)
    MoveText(f64, f64),
    /// Show a literal string (Tj)
    ShowText(String),
}

impl ContentOp {
    fn write(&self, out: &mut String) {
        match self {
            ContentOp::SaveState => out.push_str("q\n"),
            ContentOp::RestoreState => out.push_str("Q\n"),
            ContentOp::Transform(a, b, c, d, e, f) => {
                out.push_str(&format!(
                    "{} {} {} {} {} {} cm\n",
                    fmt(*a),
                    fmt(*b),
                    fmt(*c),
                    fmt(*d),
                    fmt(*e),
                    fmt(*f)
                ));
            },
            ContentOp::PaintXObject(name) => out.push_str(&format!("/{} Do\n", name)),
            ContentOp::BeginText => out.push_str("BT\n"),
            ContentOp::EndText => out.push_str("ET\n"),
            ContentOp::SetFont(name, size) => {
                out.push_str(&format!("/{} {} Tf\n", name, fmt(*size)));
            },
            ContentOp::MoveText(x, y) => out.push_str(&format!("{} {} Td\n", fmt(*x), fmt(*y))),
            ContentOp::ShowText(text) => {
                out.push_str(&format!("({}) Tj\n", escape_literal(text)));
            },
        }
    }
}

/// Builder collecting stamp operations into one content stream.
#[derive(Debug, Default)]
pub struct ContentBuilder {
    ops: Vec<ContentOp>,
}

impl ContentBuilder {
    /// Start an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw operation.
    pub fn op(&mut self, op: ContentOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Save graphics state.
    pub fn save_state(&mut self) -> &mut Self {
        self.op(ContentOp::SaveState)
    }

    /// Restore graphics state.
    pub fn restore_state(&mut self) -> &mut Self {
        self.op(ContentOp::RestoreState)
    }

    /// Apply a transformation matrix.
    pub fn transform(&mut self, a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> &mut Self {
        self.op(ContentOp::Transform(a, b, c, d, e, f))
    }

    /// Paint a registered image XObject.
    pub fn paint_xobject(&mut self, name: impl Into<String>) -> &mut Self {
        self.op(ContentOp::PaintXObject(name.into()))
    }

    /// One positioned line of text as a self-contained text object.
    pub fn text_line(
        &mut self,
        font: impl Into<String>,
        size: f64,
        x: f64,
        y: f64,
        text: impl Into<String>,
    ) -> &mut Self {
        self.op(ContentOp::BeginText)
            .op(ContentOp::SetFont(font.into(), size))
            .op(ContentOp::MoveText(x, y))
            .op(ContentOp::ShowText(text.into()))
            .op(ContentOp::EndText)
    }

    /// Whether anything was recorded.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Serialize to content-stream bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut out = String::new();
        for op in &self.ops {
            op.write(&mut out);
        }
        out.into_bytes()
    }
}

/// Round-trip-safe number formatting for operands.
fn fmt(v: f64) -> String {
    if (v - v.round()).abs() < 1e-6 {
        format!("{}", v.round() as i64)
    } else {
        format!("{:.3}", v)
    }
}

/// Escape special characters in a PDF literal string.
pub fn escape_literal(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '(' => result.push_str("\\("),
            ')' => result.push_str("\\)"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(c),
        }
    }
    result
}
