//! Minimal CSS selector support for the in-memory document
//!
//! Supported: compound selectors (`tag`, `*`, `#id`, `.class`, `[attr]`,
//! `[attr=value]`), descendant combinators (whitespace) and comma lists.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,

    #[error("Unexpected `{found}` in selector `{text}`")]
    Unexpected { text: String, found: char },

    #[error("Unterminated attribute filter in selector `{0}`")]
    Unterminated(String),
}

/// One `[name]` or `[name=value]` test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrTest {
    pub name: String,
    pub value: Option<String>,
}

/// Simple selectors that must all match one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrTest>,
}

/// Compounds joined by descendant combinators, outermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
    pub parts: Vec<Compound>,
}

/// A comma separated selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub alternatives: Vec<Complex>,
}

/// What a matcher needs to know about a node
pub trait Element {
    fn tag(&self) -> &str;
    fn html_id(&self) -> Option<&str>;
    fn has_class(&self, class: &str) -> bool;
    fn attr(&self, name: &str) -> Option<&str>;
}

impl Compound {
    pub fn matches(&self, el: &dyn Element) -> bool {
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(el.tag()) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.html_id() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| el.has_class(c))
            && self.attrs.iter().all(|a| match (&a.value, el.attr(&a.name)) {
                (None, found) => found.is_some(),
                (Some(want), Some(found)) => want == found,
                (Some(_), None) => false,
            })
    }
}

impl Selector {
    pub fn parse(text: &str) -> Result<Selector, SelectorError> {
        let alternatives = text
            .split(',')
            .map(|alt| parse_complex(text, alt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Selector { alternatives })
    }

    /// Does the node at the end of `path` match?
    ///
    /// `path` lists the node first, then its ancestors up to the root.
    pub fn matches(&self, path: &[&dyn Element]) -> bool {
        self.alternatives.iter().any(|c| c.matches(path))
    }
}

impl Complex {
    fn matches(&self, path: &[&dyn Element]) -> bool {
        let Some((last, outer)) = self.parts.split_last() else {
            return false;
        };
        let Some((node, ancestors)) = path.split_first() else {
            return false;
        };
        if !last.matches(*node) {
            return false;
        }
        // nearest matching ancestor is enough for descendant-only chains
        let mut rest = ancestors.iter();
        outer
            .iter()
            .rev()
            .all(|part| rest.by_ref().any(|el| part.matches(*el)))
    }
}

fn parse_complex(full: &str, text: &str) -> Result<Complex, SelectorError> {
    let parts = text
        .split_whitespace()
        .map(|part| parse_compound(full, part))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.is_empty() {
        return Err(SelectorError::Empty);
    }
    Ok(Complex { parts })
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(full: &str, text: &str) -> Result<Compound, SelectorError> {
    let unexpected = |found| SelectorError::Unexpected {
        text: full.to_string(),
        found,
    };
    let mut compound = Compound::default();
    let mut chars = text.chars().peekable();

    let ident = |chars: &mut std::iter::Peekable<std::str::Chars<'_>>| {
        let mut out = String::new();
        while let Some(&c) = chars.peek() {
            if !is_ident(c) {
                break;
            }
            out.push(c);
            chars.next();
        }
        out
    };

    match chars.peek() {
        Some('*') => {
            chars.next();
        }
        Some(&c) if is_ident(c) => compound.tag = Some(ident(&mut chars)),
        _ => {}
    }

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let id = ident(&mut chars);
                if id.is_empty() {
                    return Err(unexpected('#'));
                }
                compound.id = Some(id);
            }
            '.' => {
                let class = ident(&mut chars);
                if class.is_empty() {
                    return Err(unexpected('.'));
                }
                compound.classes.push(class);
            }
            '[' => {
                let body: String = chars.by_ref().take_while(|&c| c != ']').collect();
                if !text.contains(']') {
                    return Err(SelectorError::Unterminated(full.to_string()));
                }
                let test = match body.split_once('=') {
                    Some((name, value)) => AttrTest {
                        name: name.trim().to_string(),
                        value: Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()),
                    },
                    None => AttrTest {
                        name: body.trim().to_string(),
                        value: None,
                    },
                };
                if test.name.is_empty() {
                    return Err(unexpected('['));
                }
                compound.attrs.push(test);
            }
            other => return Err(unexpected(other)),
        }
    }
    Ok(compound)
}
