use std::path::Path;

use super::segment::SubtitleSegment;
use crate::error::{RenderError, RenderResult};

/// Ordered literal substring replacements applied to transcript text.
///
/// Rules do not cascade: each position of the original text is matched
/// against the rules in order and the first hit is emitted verbatim, so one
/// rule's output is never rewritten by another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplacementRules {
    rules: Vec<(String, String)>,
}

impl ReplacementRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn push(&mut self, old: impl Into<String>, new: impl Into<String>) -> RenderResult<()> {
        let old = old.into();
        if old.is_empty() {
            return Err(RenderError::config("replacement rule has an empty search string"));
        }
        self.rules.push((old, new.into()));
        Ok(())
    }

    /// Add one `old=new` rule. The first `=` separates the two sides.
    pub fn push_inline(&mut self, rule: &str) -> RenderResult<()> {
        let (old, new) = rule
            .split_once('=')
            .ok_or_else(|| RenderError::config(format!("replacement '{rule}' must be old=new")))?;
        self.push(old, new)
    }

    /// Rules file: one `old=new` per line, blank lines and `#` comments ignored.
    pub fn parse_file_contents(&mut self, contents: &str) -> RenderResult<()> {
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.push_inline(line)
                .map_err(|e| RenderError::config(format!("line {}: {e}", lineno + 1)))?;
        }
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path) -> RenderResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RenderError::config(format!("cannot read replacements file {}: {e}", path.display()))
        })?;
        self.parse_file_contents(&contents)
            .map_err(|e| RenderError::config(format!("{}: {e}", path.display())))
    }

    pub fn apply(&self, text: &str) -> String {
        if self.rules.is_empty() {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(ch) = rest.chars().next() {
            match self.rules.iter().find(|(old, _)| rest.starts_with(old.as_str())) {
                Some((old, new)) => {
                    out.push_str(new);
                    rest = &rest[old.len()..];
                }
                None => {
                    out.push(ch);
                    rest = &rest[ch.len_utf8()..];
                }
            }
        }
        out
    }

    pub fn apply_all(&self, segments: &mut [SubtitleSegment]) {
        for s in segments {
            s.text = self.apply(&s.text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> ReplacementRules {
        let mut r = ReplacementRules::new();
        for (old, new) in pairs {
            r.push(*old, *new).unwrap();
        }
        r
    }

    #[test]
    fn replaces_every_occurrence() {
        let r = rules(&[("teh", "the")]);
        assert_eq!(r.apply("teh cat and teh dog"), "the cat and the dog");
    }

    #[test]
    fn is_case_sensitive() {
        let r = rules(&[("rust", "Rust")]);
        assert_eq!(r.apply("RUST rust"), "RUST Rust");
    }

    #[test]
    fn rules_do_not_cascade() {
        let r = rules(&[("a", "b"), ("b", "c")]);
        assert_eq!(r.apply("ab"), "bc");
    }

    #[test]
    fn earlier_rule_wins_at_the_same_position() {
        let r = rules(&[("New York", "NYC"), ("New", "Old")]);
        assert_eq!(r.apply("New York is New"), "NYC is Old");
    }

    #[test]
    fn triggers_are_replaced_in_every_segment() {
        let r = rules(&[("gonna", "going to"), ("wanna", "want to"), ("ur", "your")]);
        let mut segments = vec![
            SubtitleSegment {
                start: 0.0,
                end: 1.0,
                text: "I'm gonna say ur name".into(),
            },
            SubtitleSegment {
                start: 1.0,
                end: 2.0,
                text: "do you wanna?".into(),
            },
        ];
        r.apply_all(&mut segments);
        assert!(segments[0].text.contains("going to") && !segments[0].text.contains("gonna"));
        assert!(segments[0].text.contains("your name"));
        assert!(segments[1].text.contains("want to") && !segments[1].text.contains("wanna"));
    }

    #[test]
    fn handles_multibyte_text() {
        let r = rules(&[("ß", "ss"), ("日本", "Japan")]);
        assert_eq!(r.apply("Straße in 日本語"), "Strasse in Japan語");
    }

    #[test]
    fn parses_inline_rules() {
        let mut r = ReplacementRules::new();
        r.push_inline("a=b=c").unwrap();
        r.push_inline("drop=").unwrap();
        assert_eq!(r.apply("a drop"), "b=c ");
        assert!(r.push_inline("no separator").is_err());
        assert!(r.push_inline("=x").is_err());
    }

    #[test]
    fn parses_rule_files() {
        let mut r = ReplacementRules::new();
        r.parse_file_contents("# corrections\n\nteh=the\r\n  # indented comment\nwavvid=wavevid\n")
            .unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.apply("teh wavvid"), "the wavevid");

        let err = ReplacementRules::new()
            .parse_file_contents("ok=fine\nbroken line\n")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn loads_rule_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.txt");
        std::fs::write(&path, "foo=bar\n").unwrap();
        let mut r = ReplacementRules::new();
        r.load_file(&path).unwrap();
        assert_eq!(r.apply("foo"), "bar");

        let missing = ReplacementRules::new().load_file(&dir.path().join("missing.txt"));
        assert!(matches!(missing, Err(RenderError::Configuration(_))));
    }
}
