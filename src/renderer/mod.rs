//! Glyph renderer with font fallback. Rasterization itself is delegated to
//! `ab_glyph`; this module wraps it with a small `load_fonts` / `metrics` /
//! `choose_font` / `render_cell` contract for painting a character grid into
//! a framebuffer.

use crate::framebuffer::Framebuffer;
use ab_glyph::{Font, FontArc, Glyph, PxScale, ScaleFont};
use anyhow::{Context, Result};
use std::path::Path;

/// Max number of loaded fonts: 1 primary + up to 3 fallbacks.
pub const MAX_FONTS: usize = 4;

pub struct FontEntry {
    pub font: FontArc,
    pub label: String,
}

pub struct FontTable {
    pub entries: Vec<FontEntry>,
}

impl FontTable {
    /// Reads the primary font and each fallback in order. A failed fallback
    /// is skipped with a warning; a failed primary is fatal.
    pub fn load(primary_path: &Path, fallback_paths: &[impl AsRef<Path>]) -> Result<Self> {
        let primary_bytes = std::fs::read(primary_path)
            .with_context(|| format!("reading primary font {:?}", primary_path))?;
        let primary = FontArc::try_from_vec(primary_bytes)
            .with_context(|| format!("parsing primary font {:?}", primary_path))?;
        let mut entries = vec![FontEntry {
            font: primary,
            label: primary_path.display().to_string(),
        }];

        for path in fallback_paths.iter() {
            let path = path.as_ref();
            if entries.len() >= MAX_FONTS {
                log::warn!("font table full, skipping fallback {:?}", path);
                break;
            }
            match std::fs::read(path).ok().and_then(|b| FontArc::try_from_vec(b).ok()) {
                Some(font) => {
                    log::info!("loaded fallback font {:?}", path);
                    entries.push(FontEntry {
                        font,
                        label: path.display().to_string(),
                    });
                }
                None => log::warn!("skipping unparseable fallback font {:?}", path),
            }
        }

        Ok(Self { entries })
    }

    /// Index of the first font whose glyph coverage includes `codepoint`;
    /// falls back to the primary (index 0) so missing glyphs render as a
    /// blank cell over the background rather than panic.
    pub fn choose_font(&self, codepoint: char) -> usize {
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.font.glyph_id(codepoint).0 != 0 {
                return i;
            }
        }
        0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CellMetrics {
    pub scale: PxScale,
    pub baseline: i32,
    pub cell_w: i32,
    pub cell_h: i32,
}

/// Compute fixed cell metrics from the primary font only. `ab_glyph`'s
/// scaled-font accessors already return pixel units, so no extra
/// multiplication by `scale` is needed here — it is baked into `as_scaled`.
pub fn metrics(table: &FontTable, size_px: f32) -> CellMetrics {
    let scale = PxScale::from(size_px);
    let primary = &table.entries[0].font;
    let scaled = primary.as_scaled(scale);

    let ascent = scaled.ascent();
    let descent = scaled.descent();
    let baseline = ascent.round() as i32;
    let cell_h = (ascent - descent).round() as i32 + 2;

    let mut max_advance = 0.0f32;
    for cp in 32u32..=126 {
        if let Some(c) = char::from_u32(cp) {
            let gid = primary.glyph_id(c);
            max_advance = max_advance.max(scaled.h_advance(gid));
        }
    }
    let cell_w = max_advance.round() as i32 + 1;

    CellMetrics { scale, baseline, cell_w, cell_h }
}

/// Paint one cell: fill the background rect, then rasterize and
/// alpha-blend the glyph (if any) on top.
pub fn render_cell(
    fb: &mut Framebuffer,
    table: &FontTable,
    metrics: &CellMetrics,
    x: i32,
    y: i32,
    codepoint: char,
    fg: u32,
    bg: u32,
) {
    for row in 0..metrics.cell_h {
        for col in 0..metrics.cell_w {
            fb.put_pixel(x + col, y + row, bg);
        }
    }

    if codepoint == '\0' || codepoint == ' ' {
        return;
    }

    let font_idx = table.choose_font(codepoint);
    let font = &table.entries[font_idx].font;
    let glyph: Glyph = font.glyph_id(codepoint).with_scale_and_position(
        metrics.scale,
        ab_glyph::point(0.0, metrics.baseline as f32),
    );

    let Some(outlined) = font.outline_glyph(glyph) else {
        // Missing glyph: background already fills the cell.
        return;
    };
    let bounds = outlined.px_bounds();
    let origin_x = x + bounds.min.x.round() as i32;
    let origin_y = y + bounds.min.y.round() as i32;

    outlined.draw(|gx, gy, coverage| {
        if coverage <= 0.0 {
            return;
        }
        let px = origin_x + gx as i32;
        let py = origin_y + gy as i32;
        let color = if coverage >= 1.0 {
            fg
        } else {
            blend(fg, bg, coverage)
        };
        fb.put_pixel(px, py, color);
    });
}

/// Per-channel linear blend: `out = fg*a + bg*(1-a)`.
fn blend(fg: u32, bg: u32, alpha: f32) -> u32 {
    let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u32;
    let blend_channel = |shift: u32| -> u32 {
        let f = (fg >> shift) & 0xFF;
        let b = (bg >> shift) & 0xFF;
        (f * a + b * (255 - a)) / 255
    };
    (blend_channel(16) << 16) | (blend_channel(8) << 8) | blend_channel(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_full_alpha_is_foreground() {
        assert_eq!(blend(0xFFFFFF, 0x000000, 1.0), 0xFFFFFF);
    }

    #[test]
    fn blend_zero_alpha_is_background() {
        assert_eq!(blend(0xFFFFFF, 0x000000, 0.0), 0x000000);
    }

    #[test]
    fn blend_half_alpha_is_midpoint() {
        let mid = blend(0xFFFFFF, 0x000000, 0.5);
        // Integer division rounds down slightly from the true midpoint.
        assert!((0x7D..=0x80).contains(&((mid >> 16) & 0xFF)));
    }
}
