//! Single-page A4 landscape certificate built directly with lopdf.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

use super::font::{EmbeddedFont, GlyphSet};
use super::templates::{Language, Template, TextDirection};
use super::{qr, ArtifactRenderer, RenderRequest, RenderedArtifact};
use crate::error::RenderError;

const PAGE_WIDTH: f32 = 842.0;
const PAGE_HEIGHT: f32 = 595.0;
const MARGIN: f32 = 60.0;
const QR_SIZE: f32 = 100.0;
const QR_MODULE_PX: u32 = 4;
/// Rough Helvetica advance width in ems.
const AVG_GLYPH_WIDTH: f32 = 0.5;
const DETAIL_GAP: f32 = 6.0;

pub struct PdfRenderer {
    verification_base_url: String,
    default_language: String,
    fonts: Vec<EmbeddedFont>,
}

impl PdfRenderer {
    pub fn new(verification_base_url: &str, default_language: &str) -> Self {
        Self {
            verification_base_url: verification_base_url.trim_end_matches('/').to_string(),
            default_language: default_language.to_string(),
            fonts: Vec::new(),
        }
    }

    /// Adds a font for templates whose `font_family` matches its family.
    /// A later font replaces an earlier one of the same family.
    pub fn with_font(mut self, font: EmbeddedFont) -> Self {
        self.fonts.retain(|f| f.family() != font.family());
        self.fonts.push(font);
        self
    }

    /// Loads every configured font file.
    pub fn with_fonts(self, fonts: &BTreeMap<String, PathBuf>) -> Result<Self, RenderError> {
        fonts.iter().try_fold(self, |renderer, (family, path)| {
            let font = EmbeddedFont::load(family, path)?;
            log::info!("Loaded font '{}' from {}", family, path.display());
            Ok(renderer.with_font(font))
        })
    }

    /// The URL encoded in the QR code.
    pub fn verification_url(&self, access_token: &str) -> String {
        format!("{}/verify/{}", self.verification_base_url, access_token)
    }

    /// Configured fonts, the template's own family first.
    fn fonts_for(&self, template: &Template) -> Vec<&EmbeddedFont> {
        let mut fonts: Vec<&EmbeddedFont> = self.fonts.iter().collect();
        fonts.sort_by_key(|font| font.family() != template.font_family);
        fonts
    }

    fn build_document(
        &self,
        request: &RenderRequest,
        template: &Template,
        qr_image: image::GrayImage,
    ) -> Result<Vec<u8>, RenderError> {
        let mut doc = Document::with_version("1.5");

        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();
        let bold_font_id = doc.new_object_id();
        let qr_id = doc.new_object_id();
        let resources_id = doc.new_object_id();
        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        for (id, base_font) in [(font_id, "Helvetica"), (bold_font_id, "Helvetica-Bold")] {
            doc.objects.insert(
                id,
                Object::Dictionary(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => base_font,
                    "Encoding" => "WinAnsiEncoding",
                }),
            );
        }

        let (qr_width, qr_height) = qr_image.dimensions();
        doc.objects.insert(
            qr_id,
            Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => qr_width as i64,
                    "Height" => qr_height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                qr_image.into_raw(),
            )),
        );

        let glyph_sets = self
            .fonts_for(template)
            .into_iter()
            .enumerate()
            .map(|(i, font)| GlyphSet::new(font, format!("F{}", i + 3)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut page = PageWriter::new(template, glyph_sets);
        page.draw(request, template)?;
        let PageWriter {
            ops, glyph_sets, ..
        } = page;

        let mut fonts = dictionary! {
            "F1" => font_id,
            "F2" => bold_font_id,
        };
        for set in glyph_sets {
            if set.is_empty() {
                continue;
            }
            log::debug!(
                "Embedding font '{}' as {} for {}",
                set.font().postscript_name(),
                set.resource(),
                request.certificate_id
            );
            let resource = set.resource().to_string();
            let id = set.write(&mut doc);
            fonts.set(resource, id);
        }

        doc.objects.insert(
            resources_id,
            Object::Dictionary(dictionary! {
                "Font" => fonts,
                "XObject" => dictionary! {
                    "Qr" => qr_id,
                },
            }),
        );

        let encoded = Content { operations: ops }
            .encode()
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        doc.objects
            .insert(content_id, Object::Stream(Stream::new(dictionary! {}, encoded)));

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (PAGE_WIDTH as i64).into(), (PAGE_HEIGHT as i64).into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            }),
        );

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Lang" => Object::string_literal(template.language.code()),
        });
        doc.trailer.set("Root", catalog_id);

        let t = &template.translations;
        let subject = format!(
            "{} {} {} {}",
            t.this_is_to_certify, request.student_name, t.has_successfully_completed, request.course_title
        );
        let info_id = doc.add_object(dictionary! {
            "Title" => utf16_text(t.certificate_of_completion),
            "Subject" => utf16_text(&subject),
            "Author" => utf16_text(&request.student_name),
            "Keywords" => utf16_text(&request.certificate_id),
            "Producer" => Object::string_literal("certgen"),
        });
        doc.trailer.set("Info", info_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| RenderError::Pdf(e.to_string()))?;

        Ok(buffer)
    }
}

impl ArtifactRenderer for PdfRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderError> {
        let _span = tracing::info_span!("renderer.pdf", certificate_id = %request.certificate_id)
            .entered();
        let started = Instant::now();

        let language = Language::resolve(&request.language, &self.default_language)
            .ok_or_else(|| RenderError::UnsupportedLanguage(request.language.clone()))?;
        if language.code() != request.language {
            log::debug!(
                "Language '{}' not available for {}, using '{}'",
                request.language,
                request.certificate_id,
                language
            );
        }

        let qr_payload = self.verification_url(&request.access_token);
        let qr_image = qr::encode(&qr_payload, QR_MODULE_PX)?;

        let bytes = self.build_document(request, language.template(), qr_image)?;
        let byte_size = bytes.len() as u64;

        Ok(RenderedArtifact {
            bytes,
            qr_payload,
            byte_size,
            render_duration_ms: started.elapsed().as_millis() as u64,
            language,
        })
    }
}

/// A string encoded for one font resource.
struct TextRun {
    resource: String,
    operand: Object,
    /// Advance width in ems.
    width: f32,
}

impl TextRun {
    /// Latin-1 text in Helvetica, or `None` if it has other characters.
    fn builtin(text: &str, bold: bool) -> Option<Self> {
        let bytes = latin1(text)?;
        Some(Self {
            resource: if bold { "F2" } else { "F1" }.to_string(),
            width: bytes.len() as f32 * AVG_GLYPH_WIDTH,
            operand: Object::string_literal(bytes),
        })
    }
}

struct PageWriter<'f> {
    ops: Vec<Operation>,
    rtl: bool,
    family: &'static str,
    glyph_sets: Vec<GlyphSet<'f>>,
}

impl<'f> PageWriter<'f> {
    fn new(template: &Template, glyph_sets: Vec<GlyphSet<'f>>) -> Self {
        Self {
            ops: Vec::new(),
            rtl: template.direction == TextDirection::Rtl,
            family: template.font_family,
            glyph_sets,
        }
    }

    fn embedded(&mut self, text: &str) -> Option<TextRun> {
        self.glyph_sets.iter_mut().find_map(|set| {
            let encoded = set.encode(text)?;
            Some(TextRun {
                resource: set.resource().to_string(),
                operand: Object::String(encoded.bytes, StringFormat::Hexadecimal),
                width: encoded.width,
            })
        })
    }

    /// Student and course text is drawn exactly as given or not at all.
    fn value(&mut self, text: &str, bold: bool) -> Result<TextRun, RenderError> {
        if let Some(run) = TextRun::builtin(text, bold) {
            return Ok(run);
        }
        self.embedded(text).ok_or_else(|| RenderError::MissingGlyphs {
            family: self.family.to_string(),
            text: text.to_string(),
        })
    }

    /// Template wording, in English when no configured font can draw it.
    fn label(&mut self, localized: &str, english: &str, bold: bool) -> TextRun {
        if let Some(run) = TextRun::builtin(localized, bold).or_else(|| self.embedded(localized)) {
            return run;
        }
        log::debug!("No font for '{}' draws '{}', using English", self.family, localized);
        TextRun::builtin(english, bold).unwrap_or(TextRun {
            resource: "F1".to_string(),
            operand: Object::string_literal(""),
            width: 0.0,
        })
    }

    fn show(&mut self, run: TextRun, size: f32, x: f32, y: f32) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec![Object::Name(run.resource.into_bytes()), size.into()],
        ));
        self.ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.ops.push(Operation::new("Tj", vec![run.operand]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn centered(&mut self, run: TextRun, size: f32, y: f32) {
        let x = ((PAGE_WIDTH - run.width * size) / 2.0).max(MARGIN);
        self.show(run, size, x, y);
    }

    fn draw(&mut self, request: &RenderRequest, template: &Template) -> Result<(), RenderError> {
        let t = &template.translations;
        let en = &Language::En.template().translations;

        self.ops.extend([
            Operation::new("q", vec![]),
            Operation::new("w", vec![2.into()]),
            Operation::new(
                "re",
                vec![
                    20.into(),
                    20.into(),
                    ((PAGE_WIDTH - 40.0) as i64).into(),
                    ((PAGE_HEIGHT - 40.0) as i64).into(),
                ],
            ),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);

        let heading = self.label(t.certificate_of_completion, en.certificate_of_completion, true);
        self.centered(heading, 32.0, 470.0);
        let certify = self.label(t.this_is_to_certify, en.this_is_to_certify, false);
        self.centered(certify, 16.0, 410.0);
        let name = self.value(&request.student_name, true)?;
        self.centered(name, 30.0, 360.0);
        let completed = self.label(t.has_successfully_completed, en.has_successfully_completed, false);
        self.centered(completed, 16.0, 315.0);
        let course = self.value(&request.course_title, true)?;
        self.centered(course, 22.0, 275.0);
        if let Some(description) = request.course_description.as_deref() {
            let description = self.value(description, false)?;
            self.centered(description, 12.0, 245.0);
        }

        let details = [
            (
                t.completion_date,
                en.completion_date,
                format_date(&request.completion_date),
                170.0,
            ),
            (
                t.certificate_id,
                en.certificate_id,
                request.certificate_id.clone(),
                150.0,
            ),
            (
                t.date_issued,
                en.date_issued,
                format_date(&request.issue_date),
                130.0,
            ),
        ];
        let size = 12.0;
        let start_edge = PAGE_WIDTH - MARGIN - QR_SIZE;
        for (localized, english, value, y) in details {
            let label = self.label(&format!("{}:", localized), &format!("{}:", english), false);
            let value = self.value(&value, false)?;
            let (label_x, value_x) = if self.rtl {
                let label_x = (start_edge - label.width * size).max(MARGIN);
                (label_x, (label_x - DETAIL_GAP - value.width * size).max(MARGIN))
            } else {
                (MARGIN, MARGIN + label.width * size + DETAIL_GAP)
            };
            self.show(label, size, label_x, y);
            self.show(value, size, value_x, y);
        }

        let qr_x = PAGE_WIDTH - MARGIN - QR_SIZE + 10.0;
        let qr_y: f32 = 50.0;
        self.ops.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    QR_SIZE.into(),
                    0.into(),
                    0.into(),
                    QR_SIZE.into(),
                    qr_x.into(),
                    qr_y.into(),
                ],
            ),
            Operation::new("Do", vec!["Qr".into()]),
            Operation::new("Q", vec![]),
        ]);

        let caption = self.label(t.scan_qr_code, en.scan_qr_code, false);
        self.show(caption, 8.0, qr_x, qr_y - 12.0);

        Ok(())
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// WinAnsi bytes for text inside Latin-1, which the built-in fonts draw.
fn latin1(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

/// PDF text string in UTF-16BE with a byte order mark.
fn utf16_text(text: &str) -> Object {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
