//! Keyword scanning and segmentation of a normalized command

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::grammar::Role;

/// Reserved words that tag the text following them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Atk,
    Vs,
    Dmg,
    /// Alias of `dmg`
    Dealing,
    Hp,
    Res,
    Vul,
    Imm,
    Save,
    Load,
    Delete,
}

impl Keyword {
    fn from_word(s: &str) -> Option<Keyword> {
        match s {
            "atk" => Some(Keyword::Atk),
            "vs" => Some(Keyword::Vs),
            "dmg" => Some(Keyword::Dmg),
            "dealing" => Some(Keyword::Dealing),
            "hp" => Some(Keyword::Hp),
            "res" => Some(Keyword::Res),
            "vul" => Some(Keyword::Vul),
            "imm" => Some(Keyword::Imm),
            "save" => Some(Keyword::Save),
            "load" => Some(Keyword::Load),
            "delete" => Some(Keyword::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Atk => "atk",
            Keyword::Vs => "vs",
            Keyword::Dmg => "dmg",
            Keyword::Dealing => "dealing",
            Keyword::Hp => "hp",
            Keyword::Res => "res",
            Keyword::Vul => "vul",
            Keyword::Imm => "imm",
            Keyword::Save => "save",
            Keyword::Load => "load",
            Keyword::Delete => "delete",
        }
    }

    /// The role this keyword fills; `None` for the save/load/delete meta keywords
    pub fn role(&self) -> Option<Role> {
        match self {
            Keyword::Atk => Some(Role::Attack),
            Keyword::Vs => Some(Role::TargetAc),
            Keyword::Dmg | Keyword::Dealing => Some(Role::Damage),
            Keyword::Hp => Some(Role::Hp),
            Keyword::Res => Some(Role::Res),
            Keyword::Vul => Some(Role::Vul),
            Keyword::Imm => Some(Role::Imm),
            Keyword::Save | Keyword::Load | Keyword::Delete => None,
        }
    }

    pub fn is_meta(&self) -> bool {
        self.role().is_none()
    }

    /// Spelling used in cleaned labels
    pub fn canonical(&self) -> &'static str {
        match self {
            Keyword::Dealing => Keyword::Dmg.as_str(),
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keywords are found anywhere in the text, leftmost first
static KEYWORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"atk|vs|dmg|dealing|hp|res|vul|imm|save|load|delete").unwrap()
});

/// A span of the command, tagged with the keyword governing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub keyword: Option<Keyword>,
    pub text: String,
}

impl Segment {
    fn new(keyword: Option<Keyword>, text: &str) -> Self {
        Self {
            keyword,
            text: text.to_string(),
        }
    }

    /// Canonical `keyword text` form
    pub fn label(&self) -> String {
        match self.keyword {
            Some(keyword) if self.text.is_empty() => keyword.canonical().to_string(),
            Some(keyword) => format!("{} {}", keyword.canonical(), self.text),
            None => self.text.clone(),
        }
    }
}

/// Strip all whitespace and lowercase
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Split a normalized command into segments.
///
/// Text before the first keyword becomes a keyword-less segment; each
/// keyword owns the text up to the next keyword (possibly empty).
pub fn segment(normalized: &str) -> Vec<Segment> {
    let matches: Vec<_> = KEYWORD_REGEX.find_iter(normalized).collect();

    let Some(first) = matches.first() else {
        if normalized.is_empty() {
            return Vec::new();
        }
        return vec![Segment::new(None, normalized)];
    };

    let mut segments = Vec::with_capacity(matches.len() + 1);
    if first.start() > 0 {
        segments.push(Segment::new(None, &normalized[..first.start()]));
    }

    for (i, m) in matches.iter().enumerate() {
        let end = matches.get(i + 1).map_or(normalized.len(), |next| next.start());
        // Every match of the keyword regex is a known keyword
        if let Some(keyword) = Keyword::from_word(m.as_str()) {
            segments.push(Segment::new(Some(keyword), &normalized[m.end()..end]));
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  3A + 2 VS 13\tdmg 1d8 FI\n"), "3a+2vs13dmg1d8fi");
        assert_eq!(normalize(" \t "), "");
    }

    #[test]
    fn test_segment_leading_keywordless_text() {
        let segments = segment("3a+2vs13dmg1d8fi");
        assert_eq!(
            segments,
            vec![
                Segment::new(None, "3a+2"),
                Segment::new(Some(Keyword::Vs), "13"),
                Segment::new(Some(Keyword::Dmg), "1d8fi"),
            ]
        );
    }

    #[test]
    fn test_segment_without_keywords() {
        assert_eq!(segment("1d6fi"), vec![Segment::new(None, "1d6fi")]);
        assert!(segment("").is_empty());
    }

    #[test]
    fn test_segment_empty_keyword_text() {
        let segments = segment("dmghp10");
        assert_eq!(
            segments,
            vec![
                Segment::new(Some(Keyword::Dmg), ""),
                Segment::new(Some(Keyword::Hp), "10"),
            ]
        );
    }

    #[test]
    fn test_segment_meta_keywords() {
        let segments = segment("1n+5dealing1d8savelongsword");
        assert_eq!(segments[1].keyword, Some(Keyword::Dealing));
        assert_eq!(segments[1].label(), "dmg 1d8");
        assert_eq!(segments[2], Segment::new(Some(Keyword::Save), "longsword"));
        assert!(Keyword::Save.is_meta());
        assert!(!Keyword::Dealing.is_meta());
    }
}
