//! Command-line templates with `{{ .Key }}` placeholders.
//!
//! A template is split into shell words once, with placeholders masked, so
//! every placeholder expands inside exactly one argument. Substituted values
//! are never re-tokenized or interpreted by a shell.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

const MASK_OPEN: char = '\u{E000}';
const MASK_CLOSE: char = '\u{E001}';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unbalanced quotes or trailing escape")]
    Unbalanced,

    #[error("template has no command")]
    Empty,

    #[error("unrecognized placeholder syntax in '{0}'")]
    BadPlaceholder(String),

    #[error("template contains reserved characters")]
    Reserved,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*\.([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    words: Vec<Vec<Segment>>,
    placeholders: Vec<String>,
}

impl CommandTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        if source.contains(MASK_OPEN) || source.contains(MASK_CLOSE) {
            return Err(TemplateError::Reserved);
        }

        let mut placeholders: Vec<String> = Vec::new();
        let masked = placeholder_re().replace_all(source, |caps: &regex::Captures| {
            let key = &caps[1];
            let idx = match placeholders.iter().position(|p| p == key) {
                Some(idx) => idx,
                None => {
                    placeholders.push(key.to_string());
                    placeholders.len() - 1
                }
            };
            format!("{MASK_OPEN}{idx}{MASK_CLOSE}")
        });

        let raw_words = shlex::split(&masked).ok_or(TemplateError::Unbalanced)?;
        if raw_words.is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut words = Vec::with_capacity(raw_words.len());
        for raw in raw_words {
            if raw.contains("{{") || raw.contains("}}") {
                return Err(TemplateError::BadPlaceholder(unmask(&raw, &placeholders)));
            }
            words.push(split_segments(&raw, &placeholders));
        }

        Ok(Self {
            words,
            placeholders,
        })
    }

    /// Placeholder keys in order of first appearance, without duplicates.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Render the argument vector. Keys missing from `values` expand to "".
    pub fn render(&self, values: &HashMap<String, String>) -> Vec<String> {
        self.words
            .iter()
            .map(|segments| {
                segments
                    .iter()
                    .map(|seg| match seg {
                        Segment::Literal(text) => text.as_str(),
                        Segment::Var(key) => values.get(key).map(String::as_str).unwrap_or(""),
                    })
                    .collect::<String>()
            })
            .collect()
    }
}

fn split_segments(word: &str, placeholders: &[String]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = word;
    while let Some(start) = rest.find(MASK_OPEN) {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + MASK_OPEN.len_utf8()..];
        let end = after.find(MASK_CLOSE).unwrap_or(after.len());
        let key = after[..end]
            .parse::<usize>()
            .ok()
            .and_then(|idx| placeholders.get(idx))
            .cloned()
            .unwrap_or_default();
        segments.push(Segment::Var(key));
        rest = after.get(end + MASK_CLOSE.len_utf8()..).unwrap_or("");
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    segments
}

fn unmask(word: &str, placeholders: &[String]) -> String {
    split_segments(word, placeholders)
        .into_iter()
        .map(|seg| match seg {
            Segment::Literal(text) => text,
            Segment::Var(key) => format!("{{{{ .{key} }}}}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholders_in_first_appearance_order() {
        let t = CommandTemplate::parse(
            "amass enum -df {{ .RootDomsFile }} -o {{ .OutFile }} -log {{.OutFile}}.log",
        )
        .unwrap();
        assert_eq!(t.placeholders(), &["RootDomsFile", "OutFile"]);
    }

    #[test]
    fn test_render_keeps_values_in_one_argument() {
        let t = CommandTemplate::parse("echo {{ .Name }} 'quoted {{ .Name }}' x{{ .Name }}y").unwrap();
        let argv = t.render(&values(&[("Name", "a b; rm -rf /")]));
        assert_eq!(
            argv,
            vec![
                "echo",
                "a b; rm -rf /",
                "quoted a b; rm -rf /",
                "xa b; rm -rf /y"
            ]
        );
    }

    #[test]
    fn test_render_literal_only() {
        let t = CommandTemplate::parse("nmap -sn \"10.0.0.0/24\"").unwrap();
        assert!(t.placeholders().is_empty());
        assert_eq!(t.render(&HashMap::new()), vec!["nmap", "-sn", "10.0.0.0/24"]);
    }

    #[test]
    fn test_adjacent_placeholders() {
        let t = CommandTemplate::parse("cat {{ .Dir }}{{ .File }}").unwrap();
        assert_eq!(
            t.render(&values(&[("Dir", "/tmp/"), ("File", "targets")])),
            vec!["cat", "/tmp/targets"]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(CommandTemplate::parse("   "), Err(TemplateError::Empty));
        assert_eq!(
            CommandTemplate::parse("echo 'unterminated"),
            Err(TemplateError::Unbalanced)
        );
        assert!(matches!(
            CommandTemplate::parse("echo {{ .Bad-Key }}"),
            Err(TemplateError::BadPlaceholder(_))
        ));
        assert_eq!(
            CommandTemplate::parse("echo \u{E000}"),
            Err(TemplateError::Reserved)
        );
    }
}
