//! Certificate templates, one per supported language.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ur,
    Ar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDirection {
    Ltr,
    Rtl,
}

/// Localized strings printed on a certificate.
#[derive(Debug, Clone, Copy)]
pub struct Translations {
    pub certificate_of_completion: &'static str,
    pub this_is_to_certify: &'static str,
    pub has_successfully_completed: &'static str,
    pub completion_date: &'static str,
    pub certificate_id: &'static str,
    pub authorized_signature: &'static str,
    pub date_issued: &'static str,
    pub verify_at: &'static str,
    pub scan_qr_code: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub language: Language,
    pub name: &'static str,
    pub direction: TextDirection,
    /// Font family the template is designed for.
    pub font_family: &'static str,
    pub translations: Translations,
}

const ENGLISH: Template = Template {
    language: Language::En,
    name: "English",
    direction: TextDirection::Ltr,
    font_family: "Helvetica",
    translations: Translations {
        certificate_of_completion: "CERTIFICATE OF COMPLETION",
        this_is_to_certify: "This is to certify that",
        has_successfully_completed: "has successfully completed the course",
        completion_date: "Completion Date",
        certificate_id: "Certificate ID",
        authorized_signature: "Authorized Signature",
        date_issued: "Date Issued",
        verify_at: "Verify at",
        scan_qr_code: "Scan QR code to verify",
    },
};

const URDU: Template = Template {
    language: Language::Ur,
    name: "Urdu",
    direction: TextDirection::Rtl,
    font_family: "NotoNaskhArabic",
    translations: Translations {
        certificate_of_completion: "تکمیل کا سرٹیفکیٹ",
        this_is_to_certify: "یہ تصدیق کرتا ہے کہ",
        has_successfully_completed: "نے کامیابی سے کورس مکمل کیا",
        completion_date: "تکمیل کی تاریخ",
        certificate_id: "سرٹیفکیٹ نمبر",
        authorized_signature: "مجاز دستخط",
        date_issued: "جاری کرنے کی تاریخ",
        verify_at: "تصدیق کریں",
        scan_qr_code: "تصدیق کے لیے QR کوڈ اسکین کریں",
    },
};

const ARABIC: Template = Template {
    language: Language::Ar,
    name: "Arabic",
    direction: TextDirection::Rtl,
    font_family: "NotoNaskhArabic",
    translations: Translations {
        certificate_of_completion: "شهادة إتمام",
        this_is_to_certify: "هذا يشهد أن",
        has_successfully_completed: "قد أكمل بنجاح الدورة",
        completion_date: "تاريخ الإكمال",
        certificate_id: "رقم الشهادة",
        authorized_signature: "التوقيع المعتمد",
        date_issued: "تاريخ الإصدار",
        verify_at: "التحقق في",
        scan_qr_code: "امسح رمز QR للتحقق",
    },
};

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Ur, Language::Ar];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ur => "ur",
            Language::Ar => "ar",
        }
    }

    pub fn template(&self) -> &'static Template {
        match self {
            Language::En => &ENGLISH,
            Language::Ur => &URDU,
            Language::Ar => &ARABIC,
        }
    }

    /// Parses `code`, falling back to `default` for unknown codes.
    pub fn resolve(code: &str, default: &str) -> Option<Language> {
        code.parse().ok().or_else(|| default.parse().ok())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ur" => Ok(Language::Ur),
            "ar" => Ok(Language::Ar),
            other => Err(format!("unsupported language '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codes() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
        assert_eq!("AR".parse::<Language>().unwrap(), Language::Ar);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        assert_eq!(Language::resolve("fr", "en"), Some(Language::En));
        assert_eq!(Language::resolve("ur", "en"), Some(Language::Ur));
        assert_eq!(Language::resolve("fr", "de"), None);
    }

    #[test]
    fn test_arabic_script_templates_are_rtl() {
        for language in Language::ALL {
            let template = language.template();
            assert_eq!(template.language, language);
            let expected = if language == Language::En {
                TextDirection::Ltr
            } else {
                TextDirection::Rtl
            };
            assert_eq!(template.direction, expected);
        }
    }
}
