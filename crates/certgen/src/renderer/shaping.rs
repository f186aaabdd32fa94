//! Arabic-script text preparation for fonts drawn without a shaping engine.
//!
//! Letters are replaced by their contextual presentation forms (isolated,
//! final, initial, medial) and lam-alef pairs by their ligature, then the
//! result is put in visual order with the Unicode bidi algorithm so it can be
//! drawn left to right.

use unicode_bidi::BidiInfo;

/// One drawn unit: a base glyph, any marks stacked on it, and the logical
/// text it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub glyphs: Vec<char>,
    pub source: String,
}

const TATWEEL: char = '\u{0640}';
const LAM: char = '\u{0644}';

/// Presentation forms as `[isolated, final, initial, medial]`; 0 means the
/// letter has no such form.
const FORMS: &[(char, [u32; 4])] = &[
    ('\u{0621}', [0xFE80, 0, 0, 0]),
    ('\u{0622}', [0xFE81, 0xFE82, 0, 0]),
    ('\u{0623}', [0xFE83, 0xFE84, 0, 0]),
    ('\u{0624}', [0xFE85, 0xFE86, 0, 0]),
    ('\u{0625}', [0xFE87, 0xFE88, 0, 0]),
    ('\u{0626}', [0xFE89, 0xFE8A, 0xFE8B, 0xFE8C]),
    ('\u{0627}', [0xFE8D, 0xFE8E, 0, 0]),
    ('\u{0628}', [0xFE8F, 0xFE90, 0xFE91, 0xFE92]),
    ('\u{0629}', [0xFE93, 0xFE94, 0, 0]),
    ('\u{062A}', [0xFE95, 0xFE96, 0xFE97, 0xFE98]),
    ('\u{062B}', [0xFE99, 0xFE9A, 0xFE9B, 0xFE9C]),
    ('\u{062C}', [0xFE9D, 0xFE9E, 0xFE9F, 0xFEA0]),
    ('\u{062D}', [0xFEA1, 0xFEA2, 0xFEA3, 0xFEA4]),
    ('\u{062E}', [0xFEA5, 0xFEA6, 0xFEA7, 0xFEA8]),
    ('\u{062F}', [0xFEA9, 0xFEAA, 0, 0]),
    ('\u{0630}', [0xFEAB, 0xFEAC, 0, 0]),
    ('\u{0631}', [0xFEAD, 0xFEAE, 0, 0]),
    ('\u{0632}', [0xFEAF, 0xFEB0, 0, 0]),
    ('\u{0633}', [0xFEB1, 0xFEB2, 0xFEB3, 0xFEB4]),
    ('\u{0634}', [0xFEB5, 0xFEB6, 0xFEB7, 0xFEB8]),
    ('\u{0635}', [0xFEB9, 0xFEBA, 0xFEBB, 0xFEBC]),
    ('\u{0636}', [0xFEBD, 0xFEBE, 0xFEBF, 0xFEC0]),
    ('\u{0637}', [0xFEC1, 0xFEC2, 0xFEC3, 0xFEC4]),
    ('\u{0638}', [0xFEC5, 0xFEC6, 0xFEC7, 0xFEC8]),
    ('\u{0639}', [0xFEC9, 0xFECA, 0xFECB, 0xFECC]),
    ('\u{063A}', [0xFECD, 0xFECE, 0xFECF, 0xFED0]),
    ('\u{0641}', [0xFED1, 0xFED2, 0xFED3, 0xFED4]),
    ('\u{0642}', [0xFED5, 0xFED6, 0xFED7, 0xFED8]),
    ('\u{0643}', [0xFED9, 0xFEDA, 0xFEDB, 0xFEDC]),
    ('\u{0644}', [0xFEDD, 0xFEDE, 0xFEDF, 0xFEE0]),
    ('\u{0645}', [0xFEE1, 0xFEE2, 0xFEE3, 0xFEE4]),
    ('\u{0646}', [0xFEE5, 0xFEE6, 0xFEE7, 0xFEE8]),
    ('\u{0647}', [0xFEE9, 0xFEEA, 0xFEEB, 0xFEEC]),
    ('\u{0648}', [0xFEED, 0xFEEE, 0, 0]),
    ('\u{0649}', [0xFEEF, 0xFEF0, 0, 0]),
    ('\u{064A}', [0xFEF1, 0xFEF2, 0xFEF3, 0xFEF4]),
    // Urdu and Persian letters.
    ('\u{0679}', [0xFB66, 0xFB67, 0xFB68, 0xFB69]),
    ('\u{067E}', [0xFB56, 0xFB57, 0xFB58, 0xFB59]),
    ('\u{0686}', [0xFB7A, 0xFB7B, 0xFB7C, 0xFB7D]),
    ('\u{0688}', [0xFB88, 0xFB89, 0, 0]),
    ('\u{0691}', [0xFB8C, 0xFB8D, 0, 0]),
    ('\u{0698}', [0xFB8A, 0xFB8B, 0, 0]),
    ('\u{06A9}', [0xFB8E, 0xFB8F, 0xFB90, 0xFB91]),
    ('\u{06AF}', [0xFB92, 0xFB93, 0xFB94, 0xFB95]),
    // Noon ghunna has no connected forms of its own; noon's are used.
    ('\u{06BA}', [0xFB9E, 0xFB9F, 0xFEE7, 0xFEE8]),
    ('\u{06BE}', [0xFBAA, 0xFBAB, 0xFBAC, 0xFBAD]),
    ('\u{06C0}', [0xFBA4, 0xFBA5, 0, 0]),
    ('\u{06C1}', [0xFBA6, 0xFBA7, 0xFBA8, 0xFBA9]),
    ('\u{06CC}', [0xFBFC, 0xFBFD, 0xFBFE, 0xFBFF]),
    ('\u{06D2}', [0xFBAE, 0xFBAF, 0, 0]),
    ('\u{06D3}', [0xFBB0, 0xFBB1, 0, 0]),
];

/// Lam followed by an alef variant, as `[isolated, final]` ligatures.
const LAM_ALEF: &[(char, [u32; 2])] = &[
    ('\u{0622}', [0xFEF5, 0xFEF6]),
    ('\u{0623}', [0xFEF7, 0xFEF8]),
    ('\u{0625}', [0xFEF9, 0xFEFA]),
    ('\u{0627}', [0xFEFB, 0xFEFC]),
];

fn forms(c: char) -> Option<[u32; 4]> {
    FORMS.iter().find(|(base, _)| *base == c).map(|(_, f)| *f)
}

/// Harakat and other marks that do not break joining.
pub(crate) fn is_transparent(c: char) -> bool {
    matches!(
        c,
        '\u{0610}'..='\u{061A}'
            | '\u{064B}'..='\u{065F}'
            | '\u{0670}'
            | '\u{06D6}'..='\u{06DC}'
            | '\u{06DF}'..='\u{06E4}'
            | '\u{06E7}'
            | '\u{06E8}'
            | '\u{06EA}'..='\u{06ED}'
    )
}

/// Whether `c` connects to the letter after it.
fn joins_next(c: char) -> bool {
    c == TATWEEL || forms(c).is_some_and(|f| f[2] != 0)
}

/// Whether `c` connects to the letter before it.
fn joins_prev(c: char) -> bool {
    c == TATWEEL || forms(c).is_some_and(|f| f[1] != 0)
}

fn to_char(code: u32, fallback: char) -> char {
    char::from_u32(code).unwrap_or(fallback)
}

/// Replaces Arabic-script letters with their contextual forms, keeping
/// logical order. Other characters pass through unchanged.
pub fn contextual_forms(text: &str) -> Vec<Cluster> {
    let chars: Vec<char> = text.chars().collect();
    let letter_before = |i: usize| chars[..i].iter().rev().find(|c| !is_transparent(**c)).copied();
    let letter_after = |i: usize| chars[i + 1..].iter().find(|c| !is_transparent(**c)).copied();

    let mut clusters: Vec<Cluster> = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if is_transparent(c) {
            match clusters.last_mut() {
                Some(last) => {
                    last.glyphs.push(c);
                    last.source.push(c);
                }
                None => clusters.push(Cluster {
                    glyphs: vec![c],
                    source: c.to_string(),
                }),
            }
            i += 1;
            continue;
        }

        let connected_before = letter_before(i).is_some_and(joins_next);

        if c == LAM {
            let ligature = chars
                .get(i + 1)
                .and_then(|next| LAM_ALEF.iter().find(|(alef, _)| alef == next));
            if let Some((alef, lig)) = ligature {
                let code = if connected_before { lig[1] } else { lig[0] };
                clusters.push(Cluster {
                    glyphs: vec![to_char(code, c)],
                    source: [c, *alef].iter().collect(),
                });
                i += 2;
                continue;
            }
        }

        let glyph = match forms(c) {
            Some(f) => {
                let connected_after = f[2] != 0 && letter_after(i).is_some_and(joins_prev);
                let code = match (connected_before && f[1] != 0, connected_after) {
                    (false, false) => f[0],
                    (true, false) => f[1],
                    (false, true) => f[2],
                    (true, true) if f[3] != 0 => f[3],
                    (true, true) => f[1],
                };
                to_char(code, c)
            }
            None => c,
        };
        clusters.push(Cluster {
            glyphs: vec![glyph],
            source: c.to_string(),
        });
        i += 1;
    }

    clusters
}

/// Reorders logical clusters for left-to-right drawing.
pub fn visual_order(clusters: Vec<Cluster>) -> Vec<Cluster> {
    // Bidi classes come from each cluster's base glyph; marks ride along.
    let mut text = String::new();
    let mut starts = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        starts.push(text.len());
        text.push(cluster.glyphs[0]);
    }

    let info = BidiInfo::new(&text, None);
    if !info.has_rtl() {
        return clusters;
    }

    let mut slots: Vec<Option<Cluster>> = clusters.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    for para in &info.paragraphs {
        if para.range.is_empty() {
            continue;
        }
        let (levels, runs) = info.visual_runs(para, para.range.clone());
        for run in runs {
            let mut indices: Vec<usize> = starts
                .iter()
                .enumerate()
                .filter(|(_, start)| run.contains(*start))
                .map(|(index, _)| index)
                .collect();
            if levels[run.start].is_rtl() {
                indices.reverse();
            }
            ordered.extend(indices.into_iter().filter_map(|index| slots[index].take()));
        }
    }
    ordered
}

/// Contextual forms in visual order.
pub fn shape(text: &str) -> Vec<Cluster> {
    visual_order(contextual_forms(text))
}
