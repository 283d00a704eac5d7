//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API) and the base-14 fonts.

use printpdf::*;

use crate::error::EngineError;
use crate::fonts::FontClass;
use crate::layout_config::*;

/// Millimetres per PDF point.
const MM_PER_PT: f32 = 0.352778;

/// Render a LayoutConfig into PDF bytes.
pub fn render_pdf(config: &LayoutConfig) -> Result<Vec<u8>, EngineError> {
    if config.page_width_pt <= 0.0 || config.page_height_pt <= 0.0 {
        return Err(EngineError::Render(format!(
            "page box {}x{}pt is empty",
            config.page_width_pt, config.page_height_pt
        )));
    }
    let page_w = Mm(config.page_width_pt * MM_PER_PT);
    let page_h = Mm(config.page_height_pt * MM_PER_PT);

    let mut doc = PdfDocument::new(&config.title);

    let mut pages: Vec<PdfPage> = config
        .pages
        .iter()
        .map(|page_layout| {
            let mut ops = Vec::new();
            for lbox in &page_layout.boxes {
                render_box(&mut ops, lbox, config.page_height_pt);
            }
            PdfPage::new(page_w, page_h, ops)
        })
        .collect();

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    log::debug!("rendered {} pages, {} bytes", config.pages.len().max(1), bytes.len());
    Ok(bytes)
}

fn builtin_font(family: &str, bold: bool, italic: bool) -> BuiltinFont {
    match (FontClass::for_family(family), bold, italic) {
        (FontClass::Serif, true, true) => BuiltinFont::TimesBoldItalic,
        (FontClass::Serif, true, false) => BuiltinFont::TimesBold,
        (FontClass::Serif, false, true) => BuiltinFont::TimesItalic,
        (FontClass::Serif, false, false) => BuiltinFont::TimesRoman,
        (FontClass::Sans, true, true) => BuiltinFont::HelveticaBoldOblique,
        (FontClass::Sans, true, false) => BuiltinFont::HelveticaBold,
        (FontClass::Sans, false, true) => BuiltinFont::HelveticaOblique,
        (FontClass::Sans, false, false) => BuiltinFont::Helvetica,
        (FontClass::Mono, true, true) => BuiltinFont::CourierBoldOblique,
        (FontClass::Mono, true, false) => BuiltinFont::CourierBold,
        (FontClass::Mono, false, true) => BuiltinFont::CourierOblique,
        (FontClass::Mono, false, false) => BuiltinFont::Courier,
    }
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80, // euro
            '\u{201A}' => 0x82, // single low-9 quote
            '\u{201E}' => 0x84, // double low-9 quote
            '\u{2026}' => 0x85, // ellipsis
            '\u{2018}' => 0x91, // left single quote
            '\u{2019}' => 0x92, // right single quote
            '\u{201C}' => 0x93, // left double quote
            '\u{201D}' => 0x94, // right double quote
            '\u{2022}' => 0x95, // bullet
            '\u{2013}' => 0x96, // en-dash
            '\u{2014}' => 0x97, // em-dash
            '\u{2122}' => 0x99, // trademark
            '\u{00A0}' => 0x20, // non-breaking space -> space
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for 0x80-0xFF; printpdf passes these
    // bytes straight to the PDF stream, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

/// Emit the text ops for one LayoutBox.
fn render_box(ops: &mut Vec<Op>, lbox: &LayoutBox, page_height: f32) {
    // PDF coordinate system: origin at bottom-left.
    // Our layout uses origin at top-left. Convert:
    let pdf_y = page_height - lbox.y;

    let text = &lbox.text;
    let font = builtin_font(&text.font_family, text.bold, text.italic);
    let [r, g, b] = text.color;

    for tline in &text.lines {
        if tline.text.is_empty() {
            continue;
        }
        let text_x = lbox.x + tline.x_offset;
        let text_y = pdf_y - tline.y_offset - text.ascender;

        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(text_x),
                y: Pt(text_y),
            },
        });
        ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(text.font_size),
            font,
        });
        ops.push(Op::SetLineHeight {
            lh: Pt(text.line_height),
        });
        ops.push(Op::SetFillColor {
            col: Color::Rgb(Rgb {
                r,
                g,
                b,
                icc_profile: None,
            }),
        });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(to_winlatin(&tline.text))],
            font,
        });
        ops.push(Op::EndTextSection);
    }
}
