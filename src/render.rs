//! Display pairs and the value formatting shared by every format.

use serde::Serialize;

pub const KB: u64 = 1024;
pub const MB: u64 = KB * 1024;
pub const GB: u64 = MB * 1024;

/// One ordered `(label, value)` line of a metadata view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayPair {
    pub label: String,
    pub value: String,
}

impl DisplayPair {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Append-only builder used by the per-format renderers.
#[derive(Debug, Default)]
pub struct Pairs {
    items: Vec<DisplayPair>,
}

impl Pairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<DisplayPair>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, label: &str, value: impl Into<String>) {
        self.items.push(DisplayPair::new(label, value));
    }

    /// Pushes only when the value is non-empty.
    pub fn push_nonempty(&mut self, label: &str, value: &str) {
        if !value.is_empty() {
            self.push(label, value);
        }
    }

    pub fn push_yes_no(&mut self, label: &str, value: bool) {
        self.push(label, yes_no(value));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<DisplayPair> {
        self.items
    }
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "Sí" } else { "No" }
}

/// `512 B`, `1.5 KB (1536 B)`, `2.0 MB (2097152 B)`, ...
pub fn size_to_text(size: u64) -> String {
    if size < KB {
        format!("{size} B")
    } else if size < MB {
        format!("{:.1} KB ({size} B)", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.1} MB ({size} B)", size as f64 / MB as f64)
    } else {
        format!("{:.1} GB ({size} B)", size as f64 / GB as f64)
    }
}

/// `16 KB` when the size is a whole number of KiB, otherwise `N B`.
pub fn kb_or_bytes(size: u64) -> String {
    if size % KB == 0 {
        format!("{} KB", size / KB)
    } else {
        format!("{size} B")
    }
}

/// Stored-versus-recomputed checksum, hex digits of the given width.
pub fn checksum(stored: u64, computed: u64, width: usize) -> String {
    if stored == computed {
        format!("{stored:0width$x} (Sí)")
    } else {
        format!("{stored:0width$x} (No != {computed:0width$x})")
    }
}

/// Joins the non-empty parts with `", "`.
pub fn join_list<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
