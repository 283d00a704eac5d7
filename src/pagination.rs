//! Pagination – places flowed blocks onto fixed-size pages.
//!
//! Handles:
//! - page-break-before / page-break-after
//! - orphan and widow minimums when a paragraph splits across pages
//! - headings that must not split and stay with the next block's first lines
//! - vertical margins (collapsed between blocks, dropped at the top of a
//!   page reached by a natural break)

use crate::fonts::FontManager;
use crate::layout::FlowBlock;
use crate::layout_config::*;
use crate::style::TextAlign;

/// Page box and margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
}

impl PageGeometry {
    pub fn content_width(&self) -> f32 {
        (self.width - self.margin_left - self.margin_right).max(0.0)
    }

    pub fn content_height(&self) -> f32 {
        (self.height - self.margin_top - self.margin_bottom).max(0.0)
    }
}

/// Whole lines of `advance` that fit in `space`.
fn lines_fitting(space: f32, advance: f32) -> usize {
    if advance <= 0.0 || space < advance {
        return 0;
    }
    // Tolerate float error when a line lands exactly on the bottom edge.
    ((space + 0.01) / advance).floor() as usize
}

/// How many of `remaining` lines to keep on this page when only `fit` do,
/// honoring orphan and widow minimums. Zero means move everything on.
fn split_point(fit: usize, remaining: usize, orphans: usize, widows: usize) -> usize {
    let mut keep = fit.min(remaining);
    if keep < orphans {
        return 0;
    }
    if remaining - keep < widows {
        keep = remaining.saturating_sub(widows);
        if keep < orphans {
            return 0;
        }
    }
    keep
}

struct Paginator<'a> {
    geometry: PageGeometry,
    fonts: &'a FontManager,
    pages: Vec<PageLayout>,
    boxes: Vec<LayoutBox>,
    /// Used height of the content area on the current page.
    cursor: f32,
    /// Bottom margin of the last block placed on this page.
    pending_margin: f32,
    /// The current page was started by a forced break (or is the first).
    forced_top: bool,
    /// A page-break-after is waiting for the next block.
    break_pending: bool,
}

impl<'a> Paginator<'a> {
    fn new(geometry: PageGeometry, fonts: &'a FontManager) -> Self {
        Self {
            geometry,
            fonts,
            pages: Vec::new(),
            boxes: Vec::new(),
            cursor: 0.0,
            pending_margin: 0.0,
            forced_top: true,
            break_pending: false,
        }
    }

    fn page_is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    fn break_page(&mut self, forced: bool) {
        if self.page_is_empty() {
            self.forced_top |= forced;
            return;
        }
        let boxes = std::mem::take(&mut self.boxes);
        self.pages.push(PageLayout {
            page_index: self.pages.len(),
            boxes,
        });
        self.cursor = 0.0;
        self.pending_margin = 0.0;
        self.forced_top = forced;
    }

    /// Space above a block starting at the current position.
    fn gap_before(&self, margin_top: f32) -> f32 {
        if self.page_is_empty() {
            if self.forced_top {
                margin_top
            } else {
                0.0
            }
        } else {
            margin_top.max(self.pending_margin)
        }
    }

    /// Height the block after a heading needs on the same page. A paragraph
    /// too short to split under its orphan/widow minimums needs all its lines.
    fn keep_height(heading: &FlowBlock, next: Option<&FlowBlock>) -> f32 {
        match next {
            Some(next) if !next.style.page_break_before => {
                let orphans = next.style.orphans.max(1);
                let total = next.lines.len();
                let lines = if total < orphans + next.style.widows {
                    total
                } else {
                    orphans
                };
                heading.style.margin_bottom.max(next.style.margin_top)
                    + lines as f32 * next.line_advance()
            }
            _ => 0.0,
        }
    }

    fn place(&mut self, index: usize, block: &FlowBlock, next: Option<&FlowBlock>) {
        if block.style.page_break_before || self.break_pending {
            self.break_page(true);
            self.break_pending = false;
        }
        if block.lines.is_empty() {
            return;
        }

        let advance = block.line_advance();
        let total = block.lines.len();
        let content_height = self.geometry.content_height();

        if block.keep_with_next && !self.page_is_empty() {
            let y = self.cursor + self.gap_before(block.style.margin_top);
            let needed = block.height() + Self::keep_height(block, next);
            if y + needed > content_height {
                self.break_page(false);
            }
        }

        let mut start = 0;
        while start < total {
            let remaining = total - start;
            let mut y = self.cursor
                + if start == 0 {
                    self.gap_before(block.style.margin_top)
                } else {
                    0.0
                };
            let fit = lines_fitting(content_height - y, advance);

            let mut keep = if fit >= remaining {
                remaining
            } else if block.keep_with_next {
                0
            } else {
                split_point(fit, remaining, block.style.orphans, block.style.widows)
            };

            // Always make progress on an empty page.
            if keep == 0 && self.page_is_empty() {
                y = self.cursor;
                keep = lines_fitting(content_height - y, advance).clamp(1, remaining);
            }

            if keep > 0 {
                self.emit(index, block, start, keep, y);
                start += keep;
            }
            if start < total {
                self.break_page(false);
            }
        }

        self.pending_margin = block.style.margin_bottom;
        if block.style.page_break_after {
            self.break_pending = true;
        }
    }

    fn emit(&mut self, index: usize, block: &FlowBlock, start: usize, count: usize, y: f32) {
        let style = &block.style;
        let advance = block.line_advance();
        let lines = block.lines[start..start + count]
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let line_no = start + i;
                let indent = if line_no == 0 { style.text_indent } else { 0.0 };
                let width = self
                    .fonts
                    .measure_text_width(text, style.font_size, &block.font);
                let x_offset = match style.text_align {
                    TextAlign::Left | TextAlign::Justify => indent,
                    TextAlign::Center => ((block.width - width) / 2.0).max(0.0),
                    TextAlign::Right => (block.width - width).max(0.0),
                };
                TextLine {
                    text: text.clone(),
                    x_offset,
                    y_offset: i as f32 * advance,
                }
            })
            .collect();

        self.boxes.push(LayoutBox {
            x: self.geometry.margin_left + style.margin_left,
            y: self.geometry.margin_top + y,
            width: block.width,
            height: count as f32 * advance,
            block: index,
            first_line: start,
            text: TextContent {
                lines,
                font_family: style.font_family.clone(),
                font_size: style.font_size,
                bold: style.is_bold(),
                italic: style.is_italic(),
                color: style.color.to_array(),
                line_height: advance,
                ascender: self.fonts.ascender(style.font_size, &block.font),
                text_align: style.text_align,
            },
        });
        self.cursor = y + count as f32 * advance;
    }

    fn finish(mut self) -> Vec<PageLayout> {
        self.break_page(false);
        if self.pages.is_empty() {
            self.pages.push(PageLayout {
                page_index: 0,
                boxes: Vec::new(),
            });
        }
        self.pages
    }
}

/// Lay out `blocks` on pages of `geometry`.
pub fn paginate(blocks: &[FlowBlock], geometry: PageGeometry, fonts: &FontManager) -> LayoutConfig {
    let mut paginator = Paginator::new(geometry, fonts);
    for (index, block) in blocks.iter().enumerate() {
        paginator.place(index, block, blocks.get(index + 1));
    }
    let mut config = LayoutConfig::new(geometry.width, geometry.height);
    config.pages = paginator.finish();
    config
}
