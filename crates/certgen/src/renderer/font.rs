//! TrueType fonts embedded for text the built-in PDF fonts cannot draw.
//!
//! Each font is written as a Type0 font with Identity-H encoding, so content
//! strings are big-endian glyph ids. A ToUnicode CMap maps the glyphs back to
//! the logical text for copy and search.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use ttf_parser::{name_id, Face, GlyphId};

use super::shaping::{self, Cluster};
use crate::error::RenderError;

/// ToUnicode `bfchar` blocks hold at most 100 entries.
const CMAP_BLOCK: usize = 100;

#[derive(Clone)]
pub struct EmbeddedFont {
    family: String,
    postscript_name: String,
    data: Arc<[u8]>,
}

impl EmbeddedFont {
    pub fn load(family: &str, path: &Path) -> Result<Self, RenderError> {
        let data = std::fs::read(path).map_err(|e| RenderError::Font {
            family: family.to_string(),
            reason: format!("reading {}: {}", path.display(), e),
        })?;
        Self::from_bytes(family, data)
    }

    pub fn from_bytes(family: &str, data: Vec<u8>) -> Result<Self, RenderError> {
        let postscript_name = {
            let face = Face::parse(&data, 0).map_err(|e| RenderError::Font {
                family: family.to_string(),
                reason: e.to_string(),
            })?;
            face.names()
                .into_iter()
                .filter(|name| name.name_id == name_id::POST_SCRIPT_NAME)
                .find_map(|name| name.to_string())
                .unwrap_or_else(|| family.to_string())
        };

        Ok(Self {
            family: family.to_string(),
            postscript_name: pdf_name(&postscript_name),
            data: data.into(),
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn postscript_name(&self) -> &str {
        &self.postscript_name
    }

    fn face(&self) -> Result<Face<'_>, RenderError> {
        Face::parse(&self.data, 0).map_err(|e| RenderError::Font {
            family: self.family.clone(),
            reason: e.to_string(),
        })
    }
}

/// Characters allowed in a PDF name without escaping.
fn pdf_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        cleaned
    }
}

/// Glyph-id string ready for a `Tj` operand.
pub struct EncodedText {
    pub bytes: Vec<u8>,
    /// Advance width in ems.
    pub width: f32,
}

struct UsedGlyph {
    text: String,
    width: i64,
}

/// Glyphs one document draws with one embedded font.
pub struct GlyphSet<'f> {
    font: &'f EmbeddedFont,
    face: Face<'f>,
    resource: String,
    used: BTreeMap<u16, UsedGlyph>,
}

impl<'f> GlyphSet<'f> {
    pub fn new(font: &'f EmbeddedFont, resource: String) -> Result<Self, RenderError> {
        Ok(Self {
            face: font.face()?,
            font,
            resource,
            used: BTreeMap::new(),
        })
    }

    pub fn font(&self) -> &EmbeddedFont {
        self.font
    }

    /// Page resource name, e.g. `F3`.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Shapes `text` and maps it to glyphs. Returns `None`, recording
    /// nothing, when the font lacks a glyph for any character.
    pub fn encode(&mut self, text: &str) -> Option<EncodedText> {
        let mut glyphs: Vec<(GlyphId, String)> = Vec::new();
        for cluster in shaping::shape(text) {
            glyphs.extend(self.cluster_glyphs(&cluster)?);
        }

        let units_per_em = f32::from(self.face.units_per_em());
        let mut bytes = Vec::with_capacity(glyphs.len() * 2);
        let mut advance = 0u32;
        for (glyph, source) in glyphs {
            let glyph_advance = self.face.glyph_hor_advance(glyph).unwrap_or(0);
            advance += u32::from(glyph_advance);
            bytes.extend_from_slice(&glyph.0.to_be_bytes());
            let width = (f32::from(glyph_advance) * 1000.0 / units_per_em).round() as i64;
            self.used
                .entry(glyph.0)
                .or_insert(UsedGlyph { text: source, width });
        }

        Some(EncodedText {
            bytes,
            width: advance as f32 / units_per_em,
        })
    }

    /// Glyphs for one cluster. A missing presentation form falls back to the
    /// nominal glyphs of the letters it was built from.
    fn cluster_glyphs(&self, cluster: &Cluster) -> Option<Vec<(GlyphId, String)>> {
        let (base, marks) = cluster.glyphs.split_first()?;
        let mut glyphs = Vec::with_capacity(cluster.glyphs.len());

        let letters: String = cluster
            .source
            .chars()
            .filter(|c| !shaping::is_transparent(*c))
            .collect();
        match self.face.glyph_index(*base) {
            Some(glyph) => glyphs.push((glyph, letters)),
            None => {
                for letter in letters.chars() {
                    glyphs.push((self.face.glyph_index(letter)?, letter.to_string()));
                }
            }
        }
        for mark in marks {
            glyphs.push((self.face.glyph_index(*mark)?, mark.to_string()));
        }
        Some(glyphs)
    }

    /// Writes the font program and its dictionaries, returning the Type0 font id.
    pub fn write(self, doc: &mut Document) -> ObjectId {
        let scale = 1000.0 / f32::from(self.face.units_per_em());
        let scaled = |v: i16| (f32::from(v) * scale).round() as i64;
        let bbox = self.face.global_bounding_box();
        let base_font = Object::Name(self.font.postscript_name.as_bytes().to_vec());

        let file_id = doc.add_object(Stream::new(
            dictionary! { "Length1" => self.font.data.len() as i64 },
            self.font.data.to_vec(),
        ));

        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => base_font.clone(),
            "Flags" => 4,
            "FontBBox" => vec![
                scaled(bbox.x_min).into(),
                scaled(bbox.y_min).into(),
                scaled(bbox.x_max).into(),
                scaled(bbox.y_max).into(),
            ],
            "ItalicAngle" => 0,
            "Ascent" => scaled(self.face.ascender()),
            "Descent" => scaled(self.face.descender()),
            "CapHeight" => scaled(self.face.capital_height().unwrap_or(self.face.ascender())),
            "StemV" => 80,
            "FontFile2" => file_id,
        });

        let widths: Vec<Object> = self
            .used
            .iter()
            .flat_map(|(glyph, used)| {
                [
                    Object::Integer(i64::from(*glyph)),
                    Object::Array(vec![Object::Integer(used.width)]),
                ]
            })
            .collect();

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => base_font.clone(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(
            dictionary! {},
            to_unicode_cmap(&self.used).into_bytes(),
        ));

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => base_font,
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        })
    }
}

fn to_unicode_cmap(used: &BTreeMap<u16, UsedGlyph>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let entries: Vec<(&u16, &UsedGlyph)> = used.iter().filter(|(_, g)| !g.text.is_empty()).collect();
    for block in entries.chunks(CMAP_BLOCK) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (glyph, used) in block {
            let target: String = used
                .text
                .encode_utf16()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", glyph, target));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMapResource defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}
