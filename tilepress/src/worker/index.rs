//! Index document bundled with each archive.

use crate::job::{JobRecord, Placement};

/// Produces the `index.html` stored next to the tiles in an archive.
pub trait IndexDocument: Send + Sync + 'static {
    fn render(&self, record: &JobRecord, placement: &Placement) -> String;
}

/// Minimal HTML page describing the overlay placement and tile layout.
///
/// Corner coordinates are written as `"x, y"` with six decimals so the page
/// script can use them directly as array literals.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlIndex;

impl IndexDocument for HtmlIndex {
    fn render(&self, record: &JobRecord, placement: &Placement) -> String {
        let corners = &placement.corners;
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Tile overlay {id}</title>
<script>
var overlay = {{
  topLeft: [{tl}],
  topRight: [{tr}],
  bottomRight: [{br}],
  bottomLeft: [{bl}],
  minZoom: {min_zoom},
  maxZoom: {max_zoom},
  tiles: "{{z}}/{{x}}/{{y}}.png"
}};
</script>
</head>
<body>
<h1>Tile overlay {id}</h1>
<p>{total} tiles, zoom {min_zoom} to {max_zoom}, source image {width}x{height}.</p>
<p>Tiles are stored as <code>zoom/x/y.png</code> relative to this page.</p>
</body>
</html>
"#,
            id = record.id,
            tl = corners.top_left,
            tr = corners.top_right,
            br = corners.bottom_right,
            bl = corners.bottom_left(),
            min_zoom = placement.min_zoom,
            max_zoom = placement.max_zoom,
            total = record.total_tiles,
            width = record.width,
            height = record.height,
        )
    }
}
