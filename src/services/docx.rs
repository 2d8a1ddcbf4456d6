//! HTML to DOCX conversion for the `docx` export format.
//!
//! The rendered DOM is serialized by the browser and re-read here with
//! `scraper`. Block elements become paragraphs, headings get a larger bold
//! run, inline emphasis is kept, and PNG data-URL images (canvases
//! snapshotted before export) are embedded.

use base64::Engine;
use image::ImageFormat;
use docx_rs::{BreakType, Docx, Paragraph, Pic, Run};
use scraper::{ElementRef, Html};
use std::io::Cursor;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Heading run sizes in half-points, h1 through h6.
const HEADING_SIZES: [usize; 6] = [48, 36, 28, 26, 24, 22];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TextStyle {
    bold: bool,
    italic: bool,
    underline: bool,
    size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Span {
    Text { text: String, style: TextStyle },
    Break,
    Image(PngImage),
}

/// A PNG that decoded cleanly, with its pixel size.
#[derive(Debug, Clone, PartialEq)]
struct PngImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Block {
    heading: Option<u8>,
    spans: Vec<Span>,
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    heading: Option<u8>,
    spans: Vec<Span>,
}

impl BlockCollector {
    fn flush(&mut self) {
        while matches!(self.spans.last(), Some(Span::Break)) {
            self.spans.pop();
        }
        if let Some(Span::Text { text, .. }) = self.spans.last_mut() {
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
        }
        if !self.spans.is_empty() {
            self.blocks.push(Block {
                heading: self.heading,
                spans: std::mem::take(&mut self.spans),
            });
        }
    }

    fn push_text(&mut self, raw: &str, style: TextStyle, preformatted: bool) {
        let text = if preformatted {
            raw.to_string()
        } else {
            collapse_whitespace(raw)
        };
        let at_block_start = !matches!(self.spans.last(), Some(Span::Text { .. }));
        let text = if at_block_start && !preformatted {
            text.trim_start().to_string()
        } else {
            text
        };
        if text.is_empty() {
            return;
        }
        self.spans.push(Span::Text { text, style });
    }

    fn walk(&mut self, element: ElementRef<'_>, style: TextStyle, preformatted: bool) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.push_text(text, style, preformatted);
                continue;
            }
            let Some(child) = ElementRef::wrap(child) else {
                continue;
            };

            let name = child.value().name();
            match name {
                "script" | "style" | "head" | "noscript" | "template" => {}
                "br" => self.spans.push(Span::Break),
                "img" => {
                    if let Some(image) = child.value().attr("src").and_then(decode_png_data_url) {
                        self.spans.push(Span::Image(image));
                    }
                }
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let level = name[1..].parse::<u8>().unwrap_or(1);
                    self.flush();
                    self.heading = Some(level);
                    let heading_style = TextStyle {
                        bold: true,
                        size: Some(HEADING_SIZES[usize::from(level - 1)]),
                        ..style
                    };
                    self.walk(child, heading_style, preformatted);
                    self.flush();
                    self.heading = None;
                }
                "li" => {
                    self.flush();
                    self.spans.push(Span::Text {
                        text: "\u{2022} ".to_string(),
                        style,
                    });
                    self.walk(child, style, preformatted);
                    self.flush();
                }
                "pre" => {
                    self.flush();
                    self.walk(child, style, true);
                    self.flush();
                }
                "p" | "div" | "blockquote" | "section" | "article" | "header" | "footer"
                | "main" | "nav" | "aside" | "ul" | "ol" | "table" | "tr" | "td" | "th"
                | "figure" | "figcaption" | "body" | "html" => {
                    self.flush();
                    self.walk(child, style, preformatted);
                    self.flush();
                }
                "strong" | "b" => self.walk(child, TextStyle { bold: true, ..style }, preformatted),
                "em" | "i" => self.walk(child, TextStyle { italic: true, ..style }, preformatted),
                "u" => self.walk(child, TextStyle { underline: true, ..style }, preformatted),
                _ => self.walk(child, style, preformatted),
            }
        }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

/// Decode a PNG data URL. Payloads that are not a decodable PNG are dropped.
fn decode_png_data_url(src: &str) -> Option<PngImage> {
    let encoded = src.strip_prefix(PNG_DATA_URL_PREFIX)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    match image::load_from_memory_with_format(&bytes, ImageFormat::Png) {
        Ok(decoded) => Some(PngImage {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable inline PNG");
            None
        }
    }
}

fn collect_blocks(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let mut collector = BlockCollector::default();
    collector.walk(document.root_element(), TextStyle::default(), false);
    collector.flush();
    collector.blocks
}

fn to_run(span: Span) -> Run {
    match span {
        Span::Text { text, style } => {
            let mut run = Run::new().add_text(text);
            if style.bold {
                run = run.bold();
            }
            if style.italic {
                run = run.italic();
            }
            if style.underline {
                run = run.underline("single");
            }
            if let Some(size) = style.size {
                run = run.size(size);
            }
            run
        }
        Span::Break => Run::new().add_break(BreakType::TextWrapping),
        Span::Image(image) => Run::new().add_image(Pic::new_with_dimensions(
            image.bytes,
            image.width,
            image.height,
        )),
    }
}

/// Convert an HTML document into DOCX bytes.
pub fn html_to_docx(html: &str) -> Result<Vec<u8>, DocxError> {
    let mut docx = Docx::new();
    for block in collect_blocks(html) {
        let paragraph = block
            .spans
            .into_iter()
            .fold(Paragraph::new(), |paragraph, span| paragraph.add_run(to_run(span)));
        docx = docx.add_paragraph(paragraph);
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| DocxError::Pack(e.to_string()))?;
    Ok(buffer.into_inner())
}

#[derive(Debug, thiserror::Error)]
pub enum DocxError {
    #[error("Failed to package DOCX document: {0}")]
    Pack(String),
}
