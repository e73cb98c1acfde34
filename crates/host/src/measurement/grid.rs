//! Labelled grid over the viewport.
//!
//! Rows are letters from the top (`A`..`Z`), columns are 1-based numbers from
//! the left, so `C4` is the third row, fourth column.

use serde::Serialize;
use shared::GridSnapshot;

use super::MeasurementError;

/// Sub-rectangle of the viewport in normalized coordinates, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewRect {
    pub const FULL: ViewRect = ViewRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }
}

/// A parsed, range-checked cell address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellLabel {
    /// 0-based row
    pub row: u32,
    /// 0-based column
    pub column: u32,
}

impl std::fmt::Display for CellLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = char::from(b'A' + self.row as u8);
        write!(f, "{letter}{}", self.column + 1)
    }
}

/// A cell resolved against one specific grid generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCell {
    pub label: CellLabel,
    pub generation: u64,
    /// Cell centre in normalized viewport coordinates
    pub center: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub columns: u32,
    pub rows: u32,
    pub region: ViewRect,
    pub generation: u64,
}

impl GridSpec {
    pub fn full(columns: u32, rows: u32, generation: u64) -> Self {
        Self {
            columns,
            rows,
            region: ViewRect::FULL,
            generation,
        }
    }

    /// Parse a label such as `c4` and check it against this grid.
    pub fn parse(&self, label: &str) -> Result<CellLabel, MeasurementError> {
        let invalid = || MeasurementError::InvalidCell(label.to_string());
        let trimmed = label.trim();
        let mut chars = trimmed.chars();
        let letter = chars.next().filter(char::is_ascii_alphabetic).ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let row = (letter.to_ascii_uppercase() as u8 - b'A') as u32;
        let column: u32 = digits.parse().map_err(|_| invalid())?;
        if row >= self.rows || column == 0 || column > self.columns {
            return Err(invalid());
        }
        Ok(CellLabel {
            row,
            column: column - 1,
        })
    }

    /// Parse a label and compute its centre in viewport coordinates.
    pub fn resolve(&self, label: &str) -> Result<ResolvedCell, MeasurementError> {
        let cell = self.parse(label)?;
        Ok(ResolvedCell {
            label: cell,
            generation: self.generation,
            center: self.cell_center(cell),
        })
    }

    /// Centre of a cell mapped through the region into the viewport
    pub fn cell_center(&self, cell: CellLabel) -> (f64, f64) {
        let cw = self.region.width / self.columns as f64;
        let ch = self.region.height / self.rows as f64;
        (
            self.region.x + (cell.column as f64 + 0.5) * cw,
            self.region.y + (cell.row as f64 + 0.5) * ch,
        )
    }

    /// Region covered by a `size × size` block starting at `start`, clamped
    /// so the block stays inside the grid.
    pub fn block_region(&self, start: CellLabel, size: u32) -> ViewRect {
        let cols = size.min(self.columns);
        let rows = size.min(self.rows);
        let col0 = start.column.min(self.columns - cols);
        let row0 = start.row.min(self.rows - rows);

        let cw = self.region.width / self.columns as f64;
        let ch = self.region.height / self.rows as f64;
        ViewRect {
            x: self.region.x + col0 as f64 * cw,
            y: self.region.y + row0 as f64 * ch,
            width: cols as f64 * cw,
            height: rows as f64 * ch,
        }
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            columns: self.columns,
            rows: self.rows,
            generation: self.generation,
            region: [
                self.region.x,
                self.region.y,
                self.region.width,
                self.region.height,
            ],
            zoomed: !self.region.is_full(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridSpec {
        GridSpec::full(8, 6, 1)
    }

    #[test]
    fn test_parse_case_insensitive() {
        let g = grid();
        assert_eq!(g.parse("C4").unwrap(), g.parse("c4").unwrap());
        assert_eq!(g.parse("C4").unwrap(), CellLabel { row: 2, column: 3 });
        assert_eq!(g.parse("A1").unwrap().to_string(), "A1");
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let g = grid();
        for label in ["Z99", "G1", "A0", "A9", "", "4C", "A", "AA1", "A-1"] {
            assert!(
                matches!(g.parse(label), Err(MeasurementError::InvalidCell(_))),
                "{label} should be invalid"
            );
        }
        assert!(g.parse("F8").is_ok());
    }

    #[test]
    fn test_cell_center_full_grid() {
        let g = grid();
        let c = g.resolve("A1").unwrap();
        assert!((c.center.0 - 1.0 / 16.0).abs() < 1e-12);
        assert!((c.center.1 - 1.0 / 12.0).abs() < 1e-12);
        assert_eq!(c.generation, 1);
    }

    #[test]
    fn test_block_region_clamps_at_edge() {
        let g = grid();
        let r = g.block_region(g.parse("F8").unwrap(), 2);
        assert!((r.x - 0.75).abs() < 1e-12);
        assert!((r.y - 4.0 / 6.0).abs() < 1e-12);
        assert!((r.width - 0.25).abs() < 1e-12);

        let whole = g.block_region(g.parse("C3").unwrap(), 20);
        assert_eq!(whole, ViewRect::FULL);
    }

    #[test]
    fn test_zoomed_centers_stay_inside_region() {
        let g = grid();
        let region = g.block_region(g.parse("B2").unwrap(), 2);
        let zoomed = GridSpec {
            region,
            generation: 2,
            ..g
        };
        let (x, y) = zoomed.resolve("A1").unwrap().center;
        assert!(x > region.x && x < region.x + region.width);
        assert!(y > region.y && y < region.y + region.height);
        assert!(zoomed.snapshot().zoomed);
    }
}
