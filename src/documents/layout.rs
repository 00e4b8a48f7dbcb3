//! Page Layout Reader
//!
//! Decodes a PDF into per-page text, positioned words and positioned
//! embedded images by walking each page's content stream. Positions are
//! approximate (fixed half-em glyph advance), which is all the proximity
//! heuristics downstream need.
//!
//! All rectangles use a top-left origin with y growing downward.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};

/// Fallback page size (US Letter) when no MediaBox can be resolved.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Glyph advance as a fraction of the font size.
const GLYPH_ADVANCE_EM: f32 = 0.5;

/// Portion of the font size above the baseline.
const ASCENT_EM: f32 = 0.8;

/// TJ adjustments at or below this (thousandths of an em) read as a word break.
const TJ_WORD_BREAK: f32 = -200.0;

/// Limit for walking `Parent` chains when resolving inherited attributes.
const MAX_INHERIT_DEPTH: usize = 32;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("Document has no pages")]
    NoPages,
}

impl Serialize for LayoutError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    pub fn x0(&self) -> f32 {
        self.x
    }

    pub fn y0(&self) -> f32 {
        self.y
    }

    pub fn x1(&self) -> f32 {
        self.x + self.width
    }

    pub fn y1(&self) -> f32 {
        self.y + self.height
    }
}

/// A word and its bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub rect: Rect,
}

/// An embedded raster image placed on a page
#[derive(Debug, Clone)]
pub struct PlacedImage {
    /// 1-based position among the decodable images on the page
    pub index: u32,
    /// File extension matching the encoded bytes
    pub ext: String,
    pub bytes: Vec<u8>,
    pub rect: Rect,
}

/// Everything the pipeline needs from one page
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    /// 1-based page number
    pub number: u32,
    pub text: String,
    pub words: Vec<Word>,
    pub images: Vec<PlacedImage>,
}

/// Decode every page of a PDF.
pub fn read_pdf(bytes: &[u8]) -> Result<Vec<PageLayout>, LayoutError> {
    let doc = Document::load_mem(bytes)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(LayoutError::NoPages);
    }

    let mut layouts = Vec::with_capacity(pages.len());
    for (number, page_id) in pages {
        layouts.push(read_page(&doc, number, page_id)?);
    }
    Ok(layouts)
}

fn read_page(doc: &Document, number: u32, page_id: ObjectId) -> Result<PageLayout, LayoutError> {
    let page = doc.get_dictionary(page_id)?;
    let media_box = inherited(doc, page, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .and_then(|arr| {
            let nums: Vec<f32> = arr.iter().filter_map(|o| number_of(doc, o)).collect();
            (nums.len() == 4).then(|| [nums[0], nums[1], nums[2], nums[3]])
        })
        .unwrap_or(DEFAULT_MEDIA_BOX);

    let xobjects = inherited(doc, page, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok());

    let content = match doc.get_page_content(page_id) {
        Ok(content) => content,
        Err(e) => {
            warn!(page = number, error = %e, "Page has no readable content stream");
            Vec::new()
        }
    };
    let operations = if content.is_empty() {
        Vec::new()
    } else {
        Content::decode(&content)?.operations
    };

    let mut walker = PageWalker::new(doc, xobjects, media_box);
    for op in &operations {
        walker.apply(op);
    }
    walker.flush_word();

    debug!(
        page = number,
        words = walker.words.len(),
        images = walker.images.len(),
        "Read page layout"
    );

    Ok(PageLayout {
        number,
        text: walker.text,
        words: walker.words,
        images: walker.images,
    })
}

// ============ Object helpers ============

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up a page attribute, following `Parent` links for inheritable keys.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut dict = page;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        let parent = dict.get(b"Parent").ok()?;
        dict = resolve(doc, parent)?.as_dict().ok()?;
    }
    None
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn number_of(doc: &Document, obj: &Object) -> Option<f32> {
    resolve(doc, obj).and_then(number)
}

fn operand_numbers(op: &Operation) -> Vec<f32> {
    op.operands.iter().filter_map(number).collect()
}

fn name_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Decode a PDF text string. UTF-16BE when it carries a BOM, Latin-1 otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    bytes.iter().map(|&b| b as char).collect()
}

// ============ Geometry ============

/// PDF affine matrix `[a b c d e f]`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn from_slice(values: &[f32]) -> Option<Matrix> {
        (values.len() == 6).then(|| {
            Matrix([values[0], values[1], values[2], values[3], values[4], values[5]])
        })
    }

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other` in PDF row-vector convention.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [oa, ob, oc, od, oe, of] = other.0;
        Matrix([
            a * oa + b * oc,
            a * ob + b * od,
            c * oa + d * oc,
            c * ob + d * od,
            e * oa + f * oc + oe,
            e * ob + f * od + of,
        ])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn x_scale(&self) -> f32 {
        self.0[0].hypot(self.0[1])
    }

    fn y_scale(&self) -> f32 {
        self.0[2].hypot(self.0[3])
    }
}

// ============ Content stream walker ============

#[derive(Debug, Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
        }
    }
}

/// Word being assembled, in unflipped device space
#[derive(Debug)]
struct PendingWord {
    text: String,
    x0: f32,
    x1: f32,
    baseline: f32,
    height: f32,
}

struct PageWalker<'a> {
    doc: &'a Document,
    xobjects: Option<&'a Dictionary>,
    media_box: [f32; 4],
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    ts: TextState,
    pending: Option<PendingWord>,
    /// (baseline, end x) of the last drawn text, for line/space detection
    last_run: Option<(f32, f32)>,
    text: String,
    words: Vec<Word>,
    images: Vec<PlacedImage>,
}

impl<'a> PageWalker<'a> {
    fn new(doc: &'a Document, xobjects: Option<&'a Dictionary>, media_box: [f32; 4]) -> Self {
        Self {
            doc,
            xobjects,
            media_box,
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            ts: TextState::default(),
            pending: None,
            last_run: None,
            text: String::new(),
            words: Vec::new(),
            images: Vec::new(),
        }
    }

    fn apply(&mut self, op: &Operation) {
        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => self.ctm = self.ctm_stack.pop().unwrap_or(Matrix::IDENTITY),
            "cm" => {
                if let Some(m) = Matrix::from_slice(&operand_numbers(op)) {
                    self.ctm = m.then(&self.ctm);
                }
            }
            "BT" => {
                self.ts.tm = Matrix::IDENTITY;
                self.ts.tlm = Matrix::IDENTITY;
            }
            "ET" => self.flush_word(),
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(number) {
                    self.ts.font_size = size;
                }
            }
            "Tc" => {
                if let Some(v) = op.operands.first().and_then(number) {
                    self.ts.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = op.operands.first().and_then(number) {
                    self.ts.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = op.operands.first().and_then(number) {
                    self.ts.h_scale = v / 100.0;
                }
            }
            "TL" => {
                if let Some(v) = op.operands.first().and_then(number) {
                    self.ts.leading = v;
                }
            }
            "Td" | "TD" => {
                let nums = operand_numbers(op);
                if nums.len() == 2 {
                    if op.operator == "TD" {
                        self.ts.leading = -nums[1];
                    }
                    self.move_line(nums[0], nums[1]);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_slice(&operand_numbers(op)) {
                    self.ts.tm = m;
                    self.ts.tlm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show_text(bytes);
                    self.flush_word();
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    self.show_text(bytes);
                    self.flush_word();
                }
            }
            "\"" => {
                if let [aw, ac, Object::String(bytes, _)] = op.operands.as_slice() {
                    self.ts.word_spacing = number(aw).unwrap_or(self.ts.word_spacing);
                    self.ts.char_spacing = number(ac).unwrap_or(self.ts.char_spacing);
                    self.next_line();
                    self.show_text(bytes);
                    self.flush_word();
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    self.show_adjusted(items);
                }
            }
            "Do" => {
                if let Some(name) = op.operands.first().and_then(name_bytes) {
                    self.draw_xobject(name);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.flush_word();
        self.ts.tlm = Matrix::translate(tx, ty).then(&self.ts.tlm);
        self.ts.tm = self.ts.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.ts.leading;
        self.move_line(0.0, -leading);
    }

    fn show_adjusted(&mut self, items: &[Object]) {
        for item in items {
            match item {
                Object::String(bytes, _) => self.show_text(bytes),
                other => {
                    if let Some(adjust) = number(other) {
                        let tx = -adjust / 1000.0 * self.ts.font_size * self.ts.h_scale;
                        self.ts.tm = Matrix::translate(tx, 0.0).then(&self.ts.tm);
                        if adjust <= TJ_WORD_BREAK {
                            self.flush_word();
                            if !self.text.ends_with(char::is_whitespace) && !self.text.is_empty() {
                                self.text.push(' ');
                            }
                        }
                    }
                }
            }
        }
        self.flush_word();
    }

    fn show_text(&mut self, bytes: &[u8]) {
        let decoded = decode_pdf_string(bytes);
        if decoded.is_empty() {
            return;
        }

        let rendering = self.ts.tm.then(&self.ctm);
        let (start_x, baseline) = rendering.apply(0.0, 0.0);
        let height = (self.ts.font_size * rendering.y_scale()).max(f32::EPSILON);
        self.separate_run(start_x, baseline, height);

        for ch in decoded.chars() {
            let rendering = self.ts.tm.then(&self.ctm);
            let (x, y) = rendering.apply(0.0, 0.0);
            let mut advance = GLYPH_ADVANCE_EM * self.ts.font_size + self.ts.char_spacing;
            if ch == ' ' {
                advance += self.ts.word_spacing;
            }
            advance *= self.ts.h_scale;
            let device_advance = advance * rendering.x_scale();

            if ch.is_whitespace() {
                self.flush_word();
            } else {
                let word = self.pending.get_or_insert_with(|| PendingWord {
                    text: String::new(),
                    x0: x,
                    x1: x,
                    baseline: y,
                    height,
                });
                word.text.push(ch);
                word.x1 = x + device_advance;
            }

            self.ts.tm = Matrix::translate(advance, 0.0).then(&self.ts.tm);
        }

        self.text.push_str(&decoded);
        let (end_x, _) = self.ts.tm.then(&self.ctm).apply(0.0, 0.0);
        self.last_run = Some((baseline, end_x));
    }

    /// Insert a newline or space between runs that are on different lines
    /// or visibly apart.
    fn separate_run(&mut self, start_x: f32, baseline: f32, height: f32) {
        let Some((last_baseline, last_end)) = self.last_run else {
            return;
        };
        if (baseline - last_baseline).abs() > height * 0.5 {
            self.flush_word();
            if !self.text.ends_with('\n') {
                self.text.push('\n');
            }
        } else if start_x - last_end > height * 0.15 && !self.text.ends_with(char::is_whitespace) {
            self.flush_word();
            self.text.push(' ');
        }
    }

    fn flush_word(&mut self) {
        let Some(word) = self.pending.take() else {
            return;
        };
        let top = self.media_box[3];
        let left = self.media_box[0];
        let rect = Rect::from_corners(
            word.x0 - left,
            top - (word.baseline + word.height * ASCENT_EM),
            word.x1 - left,
            top - (word.baseline - word.height * (1.0 - ASCENT_EM)),
        );
        self.words.push(Word { text: word.text, rect });
    }

    fn draw_xobject(&mut self, name: &[u8]) {
        let Some(stream) = self
            .xobjects
            .and_then(|dict| dict.get(name).ok())
            .and_then(|o| resolve(self.doc, o))
            .and_then(|o| o.as_stream().ok())
        else {
            debug!(name = %String::from_utf8_lossy(name), "XObject not found");
            return;
        };

        let is_image = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(name_bytes)
            .map_or(false, |s| s == b"Image");
        if !is_image {
            return;
        }

        let Some((ext, bytes)) = encode_image(self.doc, stream) else {
            warn!(name = %String::from_utf8_lossy(name), "Skipping image with unsupported encoding");
            return;
        };

        let corners = [
            self.ctm.apply(0.0, 0.0),
            self.ctm.apply(1.0, 0.0),
            self.ctm.apply(0.0, 1.0),
            self.ctm.apply(1.0, 1.0),
        ];
        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

        let top = self.media_box[3];
        let left = self.media_box[0];
        let rect = Rect::from_corners(min_x - left, top - max_y, max_x - left, top - min_y);

        self.images.push(PlacedImage {
            index: self.images.len() as u32 + 1,
            ext,
            bytes,
            rect,
        });
    }
}

// ============ Image decoding ============

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Some(filter) = dict.get(b"Filter").ok().and_then(|o| resolve(doc, o)) else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|o| resolve(doc, o).and_then(name_bytes).map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Produce `(extension, encoded bytes)` for an image XObject.
fn encode_image(doc: &Document, stream: &Stream) -> Option<(String, Vec<u8>)> {
    let filters = filter_names(doc, &stream.dict);
    let pixels = match filters.iter().map(|f| f.as_slice()).collect::<Vec<_>>().as_slice() {
        [b"DCTDecode"] => return Some(("jpeg".to_string(), stream.content.clone())),
        [b"JPXDecode"] => return Some(("jp2".to_string(), stream.content.clone())),
        [] => stream.content.clone(),
        [b"FlateDecode"] => stream.decompressed_content().ok()?,
        _ => return None,
    };

    let width = stream.dict.get(b"Width").ok().and_then(|o| number_of(doc, o))? as u32;
    let height = stream.dict.get(b"Height").ok().and_then(|o| number_of(doc, o))? as u32;
    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| number_of(doc, o))
        .unwrap_or(8.0) as u32;
    if bits != 8 || width == 0 || height == 0 {
        return None;
    }

    let area = (width as usize) * (height as usize);
    let image = match pixels.len() / area {
        3 => image::RgbImage::from_raw(width, height, pixels[..area * 3].to_vec())
            .map(image::DynamicImage::ImageRgb8)?,
        1 => image::GrayImage::from_raw(width, height, pixels[..area].to_vec())
            .map(image::DynamicImage::ImageLuma8)?,
        _ => return None,
    };

    let mut encoded = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
        .ok()?;
    Some(("png".to_string(), encoded))
}
