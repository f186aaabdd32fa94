//! Share links for social platforms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePlatform {
    Linkedin,
    Twitter,
    Facebook,
    Whatsapp,
}

/// Values substituted into a platform's share parameters.
#[derive(Debug, Clone, Copy)]
pub struct ShareContext<'a> {
    pub certificate_url: &'a str,
    pub course_title: &'a str,
    pub platform_name: &'a str,
}

struct ShareTemplate {
    endpoint: &'static str,
    params: fn(&ShareContext<'_>) -> Vec<(&'static str, String)>,
}

fn linkedin_params(ctx: &ShareContext<'_>) -> Vec<(&'static str, String)> {
    vec![("url", ctx.certificate_url.to_string())]
}

fn twitter_params(ctx: &ShareContext<'_>) -> Vec<(&'static str, String)> {
    vec![
        ("url", ctx.certificate_url.to_string()),
        (
            "text",
            format!(
                "I just earned a certificate in {} from {}! 🎓",
                ctx.course_title, ctx.platform_name
            ),
        ),
        ("hashtags", "elearning,certificate,achievement".to_string()),
    ]
}

fn facebook_params(ctx: &ShareContext<'_>) -> Vec<(&'static str, String)> {
    vec![("u", ctx.certificate_url.to_string())]
}

fn whatsapp_params(ctx: &ShareContext<'_>) -> Vec<(&'static str, String)> {
    vec![(
        "text",
        format!("Check out my certificate: {}", ctx.certificate_url),
    )]
}

const LINKEDIN: ShareTemplate = ShareTemplate {
    endpoint: "https://www.linkedin.com/sharing/share-offsite/",
    params: linkedin_params,
};

const TWITTER: ShareTemplate = ShareTemplate {
    endpoint: "https://twitter.com/intent/tweet",
    params: twitter_params,
};

const FACEBOOK: ShareTemplate = ShareTemplate {
    endpoint: "https://www.facebook.com/sharer/sharer.php",
    params: facebook_params,
};

const WHATSAPP: ShareTemplate = ShareTemplate {
    endpoint: "https://wa.me/",
    params: whatsapp_params,
};

impl SharePlatform {
    pub const ALL: [SharePlatform; 4] = [
        SharePlatform::Linkedin,
        SharePlatform::Twitter,
        SharePlatform::Facebook,
        SharePlatform::Whatsapp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SharePlatform::Linkedin => "linkedin",
            SharePlatform::Twitter => "twitter",
            SharePlatform::Facebook => "facebook",
            SharePlatform::Whatsapp => "whatsapp",
        }
    }

    fn template(&self) -> &'static ShareTemplate {
        match self {
            SharePlatform::Linkedin => &LINKEDIN,
            SharePlatform::Twitter => &TWITTER,
            SharePlatform::Facebook => &FACEBOOK,
            SharePlatform::Whatsapp => &WHATSAPP,
        }
    }

    pub fn share_url(&self, ctx: &ShareContext<'_>) -> Result<Url, url::ParseError> {
        let template = self.template();
        Url::parse_with_params(template.endpoint, (template.params)(ctx))
    }
}

impl fmt::Display for SharePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharePlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SharePlatform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}
