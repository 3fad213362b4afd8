//! Primitive-name pattern over free-text implementation snippets.
//!
//! Snippets are C++-like text that is never parsed. A reference to a known
//! primitive is any occurrence of its name that is not preceded by an ASCII
//! letter or `_` and not followed by an ASCII letter, `_`, `[`, `.` or `(`.
//! The heuristic is approximate and both over- and under-matches legal C++;
//! existing snippets are written against exactly this rule.
//!
//! The `regex` crate has no lookaround, so the regex only locates candidate
//! positions and the boundary rule is checked on the neighbouring characters.
//! At each position names are tried longest first, which gives the same
//! result as a backtracking engine trying every alternative.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::CoreError;

/// Whether instantiation arguments are extracted along with names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDetail {
    Names,
    Instantiations,
}

/// Explicit `<ctype, extension>` arguments following a primitive name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationArgs {
    /// The arguments were wrapped in `simd<...>`.
    pub simd: bool,
    pub ctype: Option<String>,
    pub extension: Option<String>,
    /// The matched argument text, for diagnostics.
    pub text: String,
}

/// One accepted primitive reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveMatch {
    pub primitive: String,
    pub start: usize,
    pub end: usize,
    pub instantiation: Option<InstantiationArgs>,
}

/// Compiled matcher for one library's primitive names.
#[derive(Debug, Clone)]
pub struct PrimitivePattern {
    names: Vec<String>,
    finder: Option<Regex>,
    instantiation: Option<Regex>,
    unknown: Option<Regex>,
}

const QUALIFIER: &str = r"(?:[A-Za-z_]\w*\s*::\s*)*";

/// Escapes and joins `items` longest first, so that alternation prefers the
/// longest candidate at a given position.
fn alternation<'a>(items: impl IntoIterator<Item = &'a str>) -> (Vec<String>, String) {
    let mut sorted: Vec<String> = items
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let joined = sorted
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    (sorted, joined)
}

fn blocks_prefix(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn blocks_suffix(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '_' | '[' | '.' | '(')
}

impl PrimitivePattern {
    pub fn new<'a>(
        names: impl IntoIterator<Item = &'a str>,
        extensions: impl IntoIterator<Item = &'a str>,
        ctypes: impl IntoIterator<Item = &'a str>,
        detail: PatternDetail,
    ) -> Result<Self, CoreError> {
        let (names, name_alt) = alternation(names);
        let finder = if names.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("(?P<primitive>{name_alt})"))?)
        };

        let (extensions, ext_alt) = alternation(extensions);
        let (ctypes, ctype_alt) = alternation(ctypes);
        let (instantiation, unknown) = if detail == PatternDetail::Instantiations
            && !extensions.is_empty()
            && !ctypes.is_empty()
        {
            let suffix = format!(
                r"^\s*<\s*(?P<simd>{QUALIFIER}simd\s*<\s*)?(?:{QUALIFIER}(?P<ctype>{ctype_alt})\b(?:\s*,\s*{QUALIFIER}(?P<extension>{ext_alt})\b)?)?"
            );
            let unknown = format!(
                r"(?P<primitive>[A-Za-z_]\w*)\s*<\s*(?:{QUALIFIER}simd\s*<\s*)?{QUALIFIER}(?P<ctype>{ctype_alt})\b\s*,\s*{QUALIFIER}(?P<extension>{ext_alt})\b"
            );
            (Some(Regex::new(&suffix)?), Some(Regex::new(&unknown)?))
        } else {
            (None, None)
        };

        Ok(PrimitivePattern {
            names,
            finder,
            instantiation,
            unknown,
        })
    }

    /// The known names, longest first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn extracts_instantiations(&self) -> bool {
        self.instantiation.is_some()
    }

    /// Iterates over accepted references in `text`, left to right.
    pub fn matches<'p, 't>(&'p self, text: &'t str) -> Matches<'p, 't> {
        Matches {
            pattern: self,
            text,
            pos: 0,
        }
    }

    /// Identifiers that are not known primitives but are written with an
    /// explicit `<ctype, extension>` instantiation over known arguments.
    ///
    /// Always empty unless instantiations are extracted. Generic references
    /// such as `subtract<Vec>(a, b)` cannot be told apart from any other
    /// template and are never reported.
    pub fn unknown_references(&self, text: &str) -> Vec<String> {
        let Some(unknown) = &self.unknown else {
            return Vec::new();
        };
        let mut found: Vec<String> = Vec::new();
        for caps in unknown.captures_iter(text) {
            let Some(name) = caps.name("primitive") else {
                continue;
            };
            let name = name.as_str();
            if name == "simd" || self.names.iter().any(|n| n == name) {
                continue;
            }
            if !found.iter().any(|f| f == name) {
                found.push(name.to_string());
            }
        }
        found
    }

    fn accept_at(&self, text: &str, start: usize) -> Option<PrimitiveMatch> {
        if text[..start].chars().next_back().is_some_and(blocks_prefix) {
            return None;
        }
        let rest = &text[start..];
        let name = self.names.iter().find(|name| {
            rest.starts_with(name.as_str())
                && !rest[name.len()..].chars().next().is_some_and(blocks_suffix)
        })?;
        let end = start + name.len();
        Some(PrimitiveMatch {
            primitive: name.clone(),
            start,
            end,
            instantiation: self.instantiation_at(text, end),
        })
    }

    fn instantiation_at(&self, text: &str, end: usize) -> Option<InstantiationArgs> {
        let caps = self.instantiation.as_ref()?.captures(&text[end..])?;
        let simd = caps.name("simd").is_some();
        let ctype = caps.name("ctype").map(|m| m.as_str().to_string());
        if !simd && ctype.is_none() {
            return None;
        }
        Some(InstantiationArgs {
            simd,
            ctype,
            extension: caps.name("extension").map(|m| m.as_str().to_string()),
            text: caps.get(0).map(|m| m.as_str().trim().to_string())?,
        })
    }
}

/// Iterator returned by [`PrimitivePattern::matches`].
pub struct Matches<'p, 't> {
    pattern: &'p PrimitivePattern,
    text: &'t str,
    pos: usize,
}

impl Iterator for Matches<'_, '_> {
    type Item = PrimitiveMatch;

    fn next(&mut self) -> Option<PrimitiveMatch> {
        let finder = self.pattern.finder.as_ref()?;
        while self.pos <= self.text.len() {
            let start = finder.find_at(self.text, self.pos)?.start();
            if let Some(found) = self.pattern.accept_at(self.text, start) {
                self.pos = found.end;
                return Some(found);
            }
            let step = self.text[start..].chars().next().map_or(1, char::len_utf8);
            self.pos = start + step;
        }
        None
    }
}
