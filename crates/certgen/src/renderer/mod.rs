pub mod font;
pub mod pdf;
pub mod qr;
pub mod shaping;
pub mod templates;

use chrono::{DateTime, Utc};

use crate::error::RenderError;

pub use font::EmbeddedFont;
pub use pdf::PdfRenderer;
pub use templates::{Language, Template, TextDirection};

/// Everything needed to draw one certificate.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub student_name: String,
    pub course_title: String,
    pub course_description: Option<String>,
    pub completion_date: DateTime<Utc>,
    pub issue_date: DateTime<Utc>,
    pub certificate_id: String,
    pub access_token: String,
    /// Requested language code. Unknown codes fall back to the renderer default.
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub qr_payload: String,
    pub byte_size: u64,
    pub render_duration_ms: u64,
    /// Language the artifact was actually rendered in.
    pub language: Language,
}

pub trait ArtifactRenderer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderError>;
}
