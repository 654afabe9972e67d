//! Grid geometry and container-window binding
//!
//! Pane counts tile as follows: the perfect squares (1, 4, 9, 16) fill a
//! √ways × √ways grid; 6 is a 3×3 grid whose first cell spans 2×2; 8 is a
//! 4×4 grid whose first cell spans 3×3. The enlarged first cell is the
//! preview tile.

use std::sync::Arc;

use tracing::debug;

use gridcast_pipeline::{ContainerWindow, PipelineError, Result};

/// One grid cell in rows/columns, with its spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub row: usize,
    pub column: usize,
    pub row_span: usize,
    pub column_span: usize,
}

/// One pane's pixel rectangle inside the top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Cells for a pane count, in pane-index order.
pub fn layout(ways: usize) -> Result<Vec<GridCell>> {
    let (rows, columns, first_span) = match ways {
        1 => (1, 1, 1),
        4 => (2, 2, 1),
        9 => (3, 3, 1),
        16 => (4, 4, 1),
        6 => (3, 3, 2),
        8 => (4, 4, 3),
        other => return Err(PipelineError::InvalidWays(other)),
    };

    let mut cells = Vec::with_capacity(ways);
    for row in 0..rows {
        for column in 0..columns {
            if row == 0 && column == 0 {
                cells.push(GridCell {
                    row,
                    column,
                    row_span: first_span,
                    column_span: first_span,
                });
            } else if row >= first_span || column >= first_span {
                cells.push(GridCell {
                    row,
                    column,
                    row_span: 1,
                    column_span: 1,
                });
            }
            // Cells under the enlarged first cell are covered by it.
        }
    }
    Ok(cells)
}

/// Pixel rectangles for a layout inside a window.
pub fn pixel_rects(
    cells: &[GridCell],
    left: i32,
    top: i32,
    width: u32,
    height: u32,
) -> Vec<PixelRect> {
    let (rows, columns) = cells
        .iter()
        .fold((0, 0), |(rows, columns), cell| {
            (
                rows.max(cell.row + cell.row_span),
                columns.max(cell.column + cell.column_span),
            )
        });
    if rows == 0 || columns == 0 {
        return Vec::new();
    }

    let cell_width = width / columns as u32;
    let cell_height = height / rows as u32;
    cells
        .iter()
        .map(|cell| PixelRect {
            x: left + (cell.column as u32 * cell_width) as i32,
            y: top + (cell.row as u32 * cell_height) as i32,
            width: cell.column_span as u32 * cell_width,
            height: cell.row_span as u32 * cell_height,
        })
        .collect()
}

/// A container window bound from an embedding shell's native id.
///
/// The real windows live in whatever toolkit embeds the player; this
/// binding only carries the native id into the decoder and records
/// visibility changes for the shell to act on.
pub struct BoundWindow {
    pane: usize,
    native_id: i64,
    rect: PixelRect,
}

impl BoundWindow {
    pub fn new(pane: usize, native_id: i64, rect: PixelRect) -> Arc<Self> {
        Arc::new(Self {
            pane,
            native_id,
            rect,
        })
    }

    pub fn rect(&self) -> PixelRect {
        self.rect
    }
}

impl ContainerWindow for BoundWindow {
    fn native_id(&self) -> i64 {
        self.native_id
    }

    fn set_visible(&self, visible: bool) {
        debug!(
            pane = self.pane,
            wid = self.native_id,
            visible,
            rect = ?self.rect,
            "container window visibility changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_layouts() {
        for (ways, side) in [(1usize, 1usize), (4, 2), (9, 3), (16, 4)] {
            let cells = layout(ways).expect("layout");
            assert_eq!(cells.len(), ways, "ways {ways}");
            assert!(cells
                .iter()
                .all(|c| c.row_span == 1 && c.column_span == 1 && c.row < side && c.column < side));
        }
    }

    #[test]
    fn test_six_way_layout_has_double_first_cell() {
        let cells = layout(6).expect("layout");
        assert_eq!(cells.len(), 6);
        assert_eq!(
            cells[0],
            GridCell {
                row: 0,
                column: 0,
                row_span: 2,
                column_span: 2
            }
        );
        // The remaining five single cells wrap around the preview tile.
        assert!(cells[1..]
            .iter()
            .all(|c| (c.row >= 2 || c.column >= 2) && c.row_span == 1 && c.column_span == 1));
    }

    #[test]
    fn test_eight_way_layout_has_triple_first_cell() {
        let cells = layout(8).expect("layout");
        assert_eq!(cells.len(), 8);
        assert_eq!(
            cells[0],
            GridCell {
                row: 0,
                column: 0,
                row_span: 3,
                column_span: 3
            }
        );
        assert!(cells[1..]
            .iter()
            .all(|c| (c.row >= 3 || c.column >= 3) && c.row_span == 1 && c.column_span == 1));
    }

    #[test]
    fn test_unsupported_ways_rejected() {
        for ways in [0usize, 2, 3, 5, 7, 10, 12, 32] {
            assert!(
                matches!(layout(ways), Err(PipelineError::InvalidWays(_))),
                "ways {ways}"
            );
        }
    }

    #[test]
    fn test_pixel_rects_tile_the_window() {
        let cells = layout(4).expect("layout");
        let rects = pixel_rects(&cells, 0, 0, 800, 480);
        assert_eq!(
            rects,
            vec![
                PixelRect { x: 0, y: 0, width: 400, height: 240 },
                PixelRect { x: 400, y: 0, width: 400, height: 240 },
                PixelRect { x: 0, y: 240, width: 400, height: 240 },
                PixelRect { x: 400, y: 240, width: 400, height: 240 },
            ]
        );
    }

    #[test]
    fn test_pixel_rects_respect_spans_and_origin() {
        let cells = layout(6).expect("layout");
        let rects = pixel_rects(&cells, 30, 60, 900, 900);
        // Preview tile: 2x2 cells of a 3x3 grid.
        assert_eq!(
            rects[0],
            PixelRect { x: 30, y: 60, width: 600, height: 600 }
        );
        assert_eq!(rects.len(), 6);
    }
}
