//! Descriptor parser
//!
//! Turns the raw On/By/To attribute text of a node into descriptor groups:
//! event names ([`Evn`]), instruction calls ([`Call`]), a target lookup
//! ([`Query`]) and target updates ([`Update`]). Descriptors only live until
//! the chain builder has resolved them.

pub mod filter;
pub mod literal;

use crate::spliter::{Guard, Spliter};
use crate::types::{ObtError, Result, Value};
use filter::{Expr, Match};
use literal::parse_args;
use once_cell::sync::Lazy;
use regex::Regex;

/// Marker for an intentionally empty slot
pub const PLACEHOLDER: &str = "-";

/// Instruction an empty call name stands for
pub const PUSH: &str = "push";

/// Query token for the event's original target
pub const TARGET_TOKEN: &str = "~";

/// Query token for the event's current (delegate) node
pub const CURRENT_TOKEN: &str = "=";

static EVENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^([@^]?)(\w[\w.:-]*)(\((.*?)\))?$").expect("valid regex"));

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(|[$\w][$\w.-]*)(\((.*)\))?$").expect("valid regex"));

static UPDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(\w+)(\((.*)\))?$").expect("valid regex"));

static QUERY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\((.*?)\)\s*([(\[{].+[)\]}])?$").expect("valid regex"));

static RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(([\d,\s]*)\)$").expect("valid regex"));

static INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([\d,\s]*)\]$").expect("valid regex"));

static FILTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\{(.*)\}$").expect("valid regex"));

/// One On/By/To triple, trimmed, placeholders replaced by ""
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub on: String,
    pub by: String,
    pub to: String,
}

/// Event descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evn {
    pub name: String,
    /// Delegated selector, `click(.item)`
    pub selector: Option<String>,
    /// `^click`: listener fires once
    pub once: bool,
    /// `@click`: chain is stored, not bound
    pub store: bool,
}

/// Instruction call descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Value>,
    /// Flow extraction: `Some(0)` for `_`, `Some(k)` for `_k`
    pub rest: Option<usize>,
}

/// Post-filter of a multi-result query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// `(b,e)`: slice, either bound optional
    Range(Option<usize>, Option<usize>),
    /// `[i,j,...]`: explicit positions
    Indices(Vec<usize>),
    /// `{expr}`: predicate over value, index and count
    Expr(Expr),
}

impl QueryFilter {
    /// Apply the refinement to an ordered result set
    pub fn apply<T: Clone>(&self, items: Vec<T>) -> Vec<T> {
        self.apply_with(items, |_, _| None)
    }

    /// Like [`QueryFilter::apply`]; `value` answers `v` / `v.name` for an item
    pub fn apply_with<T, F>(&self, items: Vec<T>, value: F) -> Vec<T>
    where
        T: Clone,
        F: Fn(&T, Option<&str>) -> Option<Value>,
    {
        let len = items.len();
        match self {
            QueryFilter::Range(beg, end) => {
                let beg = beg.unwrap_or(0).min(len);
                let end = end.unwrap_or(len).min(len);
                if beg >= end {
                    return Vec::new();
                }
                items[beg..end].to_vec()
            }
            QueryFilter::Indices(ns) => ns.iter().filter_map(|&i| items.get(i).cloned()).collect(),
            QueryFilter::Expr(expr) => items
                .into_iter()
                .enumerate()
                .filter(|(i, item)| {
                    let read = |name: Option<&str>| value(item, name);
                    expr.keeps(&Match::at(*i, len).with_value(&read))
                })
                .map(|(_, v)| v)
                .collect(),
        }
    }
}

/// Target lookup descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Selector text; empty means the start node itself
    pub selector: String,
    pub single: bool,
    pub filter: Option<QueryFilter>,
}

impl Query {
    /// Query that resolves to the start node
    pub fn start() -> Self {
        Self {
            selector: String::new(),
            single: true,
            filter: None,
        }
    }
}

/// Target update descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub name: String,
    pub args: Vec<Value>,
}

/// The three parts of a To slot
#[derive(Debug, Clone, PartialEq)]
pub struct ToParts {
    pub query: Query,
    pub updates: Vec<Update>,
    pub calls: Vec<Call>,
}

fn slot(text: &str) -> String {
    let text = text.trim();
    if text == PLACEHOLDER {
        String::new()
    } else {
        text.to_string()
    }
}

fn group_spliter() -> Spliter {
    Spliter::new(';').guard(Guard::Call).guard(Guard::Quote)
}

fn token_spliter() -> Spliter {
    Spliter::new(' ')
        .guard(Guard::Call)
        .guard(Guard::Quote)
        .guard(Guard::Square)
        .guard(Guard::Brace)
}

fn part_spliter() -> Spliter {
    Spliter::new('|')
        .guard(Guard::Call)
        .guard(Guard::Quote)
        .guard(Guard::Square)
        .guard(Guard::Brace)
}

/// Non-blank tokens of a call or update list
fn tokens(text: &str) -> Vec<&str> {
    token_spliter()
        .split(text)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Zip the three raw attribute strings into descriptor groups
///
/// Groups whose On slot is empty are dropped; By and To slots are paired by
/// the index of kept On groups and default to "".
pub fn groups(on: &str, by: &str, to: &str) -> Vec<Group> {
    let sp = group_spliter();
    let bys: Vec<String> = sp.split(by).map(slot).collect();
    let tos: Vec<String> = sp.split(to).map(slot).collect();

    sp.split(on)
        .map(slot)
        .filter(|on| !on.is_empty())
        .enumerate()
        .map(|(i, on)| Group {
            on,
            by: bys.get(i).cloned().unwrap_or_default(),
            to: tos.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Parse an On slot into its events and calls
pub fn parse_on(raw: &str) -> Result<(Vec<Evn>, Vec<Call>)> {
    let mut parts = part_spliter().splitn(raw.trim(), 1);
    let events = parts.next().unwrap_or_default();
    let calls = parts.next().unwrap_or_default();

    let evns = tokens(&normalize_ws(events))
        .into_iter()
        .map(parse_evn)
        .collect::<Result<Vec<_>>>()?;
    if evns.is_empty() {
        return Err(ObtError::InvalidEvent(raw.trim().to_string()));
    }
    Ok((evns, parse_by(calls)?))
}

/// Parse a By slot (or any call list)
pub fn parse_by(raw: &str) -> Result<Vec<Call>> {
    let raw = normalize_ws(raw);
    if raw.trim() == PLACEHOLDER {
        return Ok(Vec::new());
    }
    tokens(&raw).into_iter().map(parse_call).collect()
}

/// Parse a To slot; an empty slot has no To part at all
pub fn parse_to(raw: &str) -> Result<Option<ToParts>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let mut parts = part_spliter().splitn(raw, 2);
    let query = parse_query(parts.next().unwrap_or_default())?;
    let updates = parse_updates(parts.next().unwrap_or_default())?;
    let calls = parse_by(parts.next().unwrap_or_default())?;

    Ok(Some(ToParts {
        query,
        updates,
        calls,
    }))
}

/// Parse one event token, e.g. `^click(.item)`
pub fn parse_evn(token: &str) -> Result<Evn> {
    let caps = EVENT_RE
        .captures(token)
        .ok_or_else(|| ObtError::InvalidEvent(token.to_string()))?;
    let marker = caps.get(1).map_or("", |m| m.as_str());
    let selector = caps
        .get(4)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(Evn {
        name: caps[2].to_string(),
        selector,
        once: marker == "^",
        store: marker == "@",
    })
}

/// Parse one call token, e.g. `pick(1, 'a', _2)`
pub fn parse_call(token: &str) -> Result<Call> {
    let caps = CALL_RE
        .captures(token)
        .ok_or_else(|| ObtError::InvalidCall(token.to_string()))?;
    let name = match &caps[1] {
        "" => PUSH.to_string(),
        name => name.to_string(),
    };
    let template = match caps.get(3) {
        Some(args) => parse_args(args.as_str())?,
        None => Default::default(),
    };

    Ok(Call {
        name,
        args: template.args,
        rest: template.rest,
    })
}

/// Parse the query segment of a To slot
pub fn parse_query(text: &str) -> Result<Query> {
    let text = text.trim();
    if text.is_empty() || text == PLACEHOLDER {
        return Ok(Query::start());
    }
    if !text.starts_with('(') {
        return Ok(Query {
            selector: text.to_string(),
            single: true,
            filter: None,
        });
    }
    let caps = QUERY_RE
        .captures(text)
        .ok_or_else(|| ObtError::InvalidQuery(text.to_string()))?;
    let filter = caps.get(2).map(|m| parse_refine(m.as_str())).transpose()?;

    Ok(Query {
        selector: caps[1].trim().to_string(),
        single: false,
        filter,
    })
}

fn parse_refine(text: &str) -> Result<QueryFilter> {
    if let Some(caps) = RANGE_RE.captures(text) {
        let mut bounds = caps[1].split(',').map(|s| s.trim().parse::<usize>().ok());
        let beg = bounds.next().flatten();
        let end = bounds.next().flatten();
        return Ok(QueryFilter::Range(beg, end));
    }
    if let Some(caps) = INDEX_RE.captures(text) {
        let ns = caps[1]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<usize>().map_err(|_| ObtError::InvalidQuery(text.to_string())))
            .collect::<Result<Vec<_>>>()?;
        return Ok(QueryFilter::Indices(ns));
    }
    if let Some(caps) = FILTER_RE.captures(text) {
        return Expr::compile(&caps[1]).map(QueryFilter::Expr);
    }
    Err(ObtError::InvalidQuery(text.to_string()))
}

/// Parse the update segment of a To slot
pub fn parse_updates(text: &str) -> Result<Vec<Update>> {
    let text = normalize_ws(text);
    if text.trim() == PLACEHOLDER {
        return Ok(Vec::new());
    }
    tokens(&text).into_iter().map(parse_update).collect()
}

/// Parse one update token, e.g. `@title`, `%color`, `text`, `addClass('on')`
pub fn parse_update(token: &str) -> Result<Update> {
    let mut chars = token.chars();
    let prefixed = match chars.next() {
        Some('@') => Some("attr"),
        Some('$') => Some("prop"),
        Some('%') => Some("css"),
        Some('^') => Some("toggleAttr"),
        _ => None,
    };
    if let Some(method) = prefixed {
        let rest = chars.as_str();
        if rest.is_empty() {
            return Err(ObtError::InvalidUpdate(token.to_string()));
        }
        return Ok(Update {
            name: method.to_string(),
            args: vec![Value::from(rest)],
        });
    }

    let caps = UPDATE_RE
        .captures(token)
        .ok_or_else(|| ObtError::InvalidUpdate(token.to_string()))?;
    let template = match caps.get(3) {
        Some(args) => parse_args(args.as_str())?,
        None => Default::default(),
    };
    if template.rest.is_some() {
        return Err(ObtError::InvalidUpdate(token.to_string()));
    }

    Ok(Update {
        name: caps[1].to_string(),
        args: template.args,
    })
}

/// Replace newlines and tabs outside of quotes with plain spaces
fn normalize_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote = None;
    let mut escaped = false;

    for ch in text.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
                out.push(ch);
            }
            None => {
                if matches!(ch, '"' | '\'' | '`') {
                    quote = Some(ch);
                }
                out.push(if ch.is_whitespace() { ' ' } else { ch });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_pairing() {
        let gs = groups("click|a; -; blur|b ;", "x; y", "p");
        assert_eq!(gs.len(), 2);
        assert_eq!(gs[0].on, "click|a");
        assert_eq!(gs[0].by, "x");
        assert_eq!(gs[0].to, "p");
        assert_eq!(gs[1].on, "blur|b");
        assert_eq!(gs[1].by, "y");
        assert_eq!(gs[1].to, "");
    }

    #[test]
    fn test_groups_placeholders() {
        let gs = groups("a; b", "-; c", "-");
        assert_eq!(gs[0].by, "");
        assert_eq!(gs[1].by, "c");
        assert_eq!(gs[0].to, "");
        assert!(groups("", "x", "y").is_empty());
    }

    #[test]
    fn test_parse_on() {
        let (evns, calls) = parse_on("click|push(1) push(2) add").unwrap();
        assert_eq!(evns.len(), 1);
        assert_eq!(evns[0].name, "click");
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].name, "push");
        assert_eq!(calls[0].args, vec![Value::Int(1)]);
        assert_eq!(calls[2].name, "add");
        assert!(calls[2].args.is_empty());
    }

    #[test]
    fn test_parse_events() {
        let (evns, calls) = parse_on("^click(.item a) @change input:x|('a|b')").unwrap();
        assert_eq!(evns.len(), 3);
        assert!(evns[0].once && !evns[0].store);
        assert_eq!(evns[0].selector.as_deref(), Some(".item a"));
        assert!(evns[1].store && !evns[1].once);
        assert_eq!(evns[2].name, "input:x");
        assert_eq!(calls[0].name, PUSH);
        assert_eq!(calls[0].args, vec![Value::from("a|b")]);

        assert!(matches!(parse_on("cl!ck"), Err(ObtError::InvalidEvent(_))));
        assert!(matches!(parse_on("|push"), Err(ObtError::InvalidEvent(_))));
    }

    #[test]
    fn test_parse_calls() {
        let calls = parse_by("dup pick(1,\n 2) x.y-z(_) ()").unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1].args, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(calls[2].name, "x.y-z");
        assert_eq!(calls[2].rest, Some(0));
        assert_eq!(calls[3].name, PUSH);
        assert!(parse_by("-").unwrap().is_empty());
        assert!(matches!(parse_by("a(b"), Err(ObtError::InvalidCall(_))));
    }

    #[test]
    fn test_parse_to_filter() {
        let to = parse_to("(.item){i<3}").unwrap().unwrap();
        assert!(!to.query.single);
        assert_eq!(to.query.selector, ".item");
        let filter = to.query.filter.unwrap();
        assert_eq!(filter.apply(vec![10, 11, 12, 13, 14]), vec![10, 11, 12]);
        assert!(to.updates.is_empty());
        assert!(to.calls.is_empty());
    }

    #[test]
    fn test_parse_to_parts() {
        assert!(parse_to("  ").unwrap().is_none());

        let to = parse_to("-|@title %color text|end").unwrap().unwrap();
        assert_eq!(to.query, Query::start());
        assert_eq!(to.updates.len(), 3);
        assert_eq!(to.updates[0].name, "attr");
        assert_eq!(to.updates[0].args, vec![Value::from("title")]);
        assert_eq!(to.updates[1].name, "css");
        assert_eq!(to.updates[2].name, "text");
        assert_eq!(to.calls[0].name, "end");

        let to = parse_to("form .name|addClass('on')").unwrap().unwrap();
        assert!(to.query.single);
        assert_eq!(to.query.selector, "form .name");
        assert_eq!(to.updates[0].args, vec![Value::from("on")]);
    }

    #[test]
    fn test_query_refinements() {
        let q = parse_query("(li)(1,3)").unwrap();
        assert_eq!(q.filter, Some(QueryFilter::Range(Some(1), Some(3))));
        assert_eq!(q.filter.unwrap().apply(vec![0, 1, 2, 3, 4]), vec![1, 2]);

        let q = parse_query("(li) (,2)").unwrap();
        assert_eq!(q.filter.unwrap().apply(vec![0, 1, 2]), vec![0, 1]);

        let q = parse_query("(li)[0, 4, 9]").unwrap();
        assert_eq!(q.filter.unwrap().apply(vec!['a', 'b', 'c', 'd', 'e']), vec!['a', 'e']);

        let q = parse_query("(li)").unwrap();
        assert!(!q.single && q.filter.is_none());

        let q = parse_query(TARGET_TOKEN).unwrap();
        assert_eq!(q.selector, "~");

        assert!(matches!(parse_query("(li)<1>"), Err(ObtError::InvalidQuery(_))));
        assert!(matches!(parse_query("(li){w.x}"), Err(ObtError::InvalidFilter { .. })));
    }

    #[test]
    fn test_filter_on_item_values() {
        let q = parse_query("(li){v.price >= 10 && v.kind != 'sold'}").unwrap();
        let items = vec![("a", 5, "new"), ("b", 12, "new"), ("c", 30, "sold"), ("d", 10, "used")];
        let kept = q.filter.unwrap().apply_with(items, |&(_, price, kind), name| match name {
            Some("price") => Some(Value::Int(price)),
            Some("kind") => Some(Value::from(kind)),
            _ => None,
        });
        let names: Vec<&str> = kept.iter().map(|(n, _, _)| *n).collect();
        assert_eq!(names, vec!["b", "d"]);
    }

    #[test]
    fn test_multiline_text() {
        let calls = parse_by("push('a\nb') pick(1,\n 'x\ty')").unwrap();
        assert_eq!(calls[0].args, vec![Value::from("a\nb")]);
        assert_eq!(calls[1].args, vec![Value::Int(1), Value::from("x\ty")]);

        let (_, calls) = parse_on("click|text('one\ntwo')").unwrap();
        assert_eq!(calls[0].args, vec![Value::from("one\ntwo")]);

        let u = parse_update("attr('title', 'a\nb')").unwrap();
        assert_eq!(u.args[1], Value::from("a\nb"));

        let q = parse_query("(li){i <\n 3}").unwrap();
        assert_eq!(q.filter.unwrap().apply(vec![0, 1, 2, 3]), vec![0, 1, 2]);
        let q = parse_query("(ul\nli)").unwrap();
        assert_eq!(q.selector, "ul\nli");
    }

    #[test]
    fn test_update_errors() {
        assert!(matches!(parse_update("@"), Err(ObtError::InvalidUpdate(_))));
        assert!(matches!(parse_update("a.b"), Err(ObtError::InvalidUpdate(_))));
        assert!(matches!(parse_update("text(_)"), Err(ObtError::InvalidUpdate(_))));
        let u = parse_update("^disabled").unwrap();
        assert_eq!(u.name, "toggleAttr");
    }
}
