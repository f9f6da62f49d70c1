use crate::value::Value;
use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// `$` followed by `.key`, `[N]` and `[*]` segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Option<Path> {
        let raw = raw.trim();
        let mut rest = raw.strip_prefix('$')?;
        let mut segments = Vec::new();

        while !rest.is_empty() {
            if let Some(after_dot) = rest.strip_prefix('.') {
                let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
                let key = after_dot[..end].trim();
                if key.is_empty() {
                    return None;
                }
                segments.push(Segment::Key(key.to_string()));
                rest = &after_dot[end..];
            } else if let Some(after_open) = rest.strip_prefix('[') {
                let close = after_open.find(']')?;
                let inner = after_open[..close].trim();
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    segments.push(Segment::Index(inner.parse::<usize>().ok()?));
                }
                rest = &after_open[close + 1..];
            } else {
                return None;
            }
        }

        Some(Path { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| *s == Segment::Wildcard)
    }

    /// The path up to its first `[*]`, i.e. the array the wildcard iterates.
    pub fn wildcard_prefix(&self) -> Option<Path> {
        let at = self.segments.iter().position(|s| *s == Segment::Wildcard)?;
        Some(Path {
            segments: self.segments[..at].to_vec(),
        })
    }

    /// For a path of the form `<array>[*]<rest>`, returns `$<rest>`.
    pub fn element_path(&self, array: &Path) -> Option<Path> {
        let bound = array.segments.len();
        if self.segments.len() <= bound
            || self.segments[..bound] != array.segments[..]
            || self.segments[bound] != Segment::Wildcard
        {
            return None;
        }
        Some(Path {
            segments: self.segments[bound + 1..].to_vec(),
        })
    }

    /// Walks the record; any absent key, out-of-range index, traversal into a
    /// scalar, or wildcard yields `None`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => current.get(key)?,
                Segment::Index(index) => current.get_index(*index)?,
                Segment::Wildcard => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
                Segment::Wildcard => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Path(Path),
    Literal(String),
    // Looked like a path but did not parse; renders empty. Keeps the raw text.
    Unresolvable(String),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Path(path) => write!(f, "{path}"),
            Term::Literal(text) if text.contains('\'') => write!(f, "\"{text}\""),
            Term::Literal(text) => write!(f, "'{text}'"),
            Term::Unresolvable(raw) => f.write_str(raw),
        }
    }
}

/// A parsed field expression: one path, or paths and literals joined by `+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    source: String,
    terms: Vec<Term>,
    concatenated: bool,
}

impl Expression {
    pub fn parse(raw: &str) -> Self {
        let pieces = split_concatenation(raw);
        let concatenated = pieces.len() > 1;
        let terms = pieces
            .into_iter()
            .filter_map(|piece| {
                let piece = piece.trim();
                if piece.is_empty() {
                    return None;
                }
                if piece.starts_with('$') {
                    return Some(match Path::parse(piece) {
                        Some(path) => Term::Path(path),
                        None => Term::Unresolvable(piece.to_string()),
                    });
                }
                Some(Term::Literal(unquote(piece).to_string()))
            })
            .collect();
        Self {
            source: raw.to_string(),
            terms,
            concatenated,
        }
    }

    /// Builds an expression from already-parsed terms; the source is
    /// rendered back from them.
    pub(crate) fn from_terms(terms: Vec<Term>, concatenated: bool) -> Self {
        let source = terms
            .iter()
            .map(Term::to_string)
            .collect::<Vec<_>>()
            .join(" + ");
        Self {
            source,
            terms,
            concatenated,
        }
    }

    pub fn is_concatenated(&self) -> bool {
        self.concatenated
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn evaluate(&self, record: &Value) -> String {
        if !self.concatenated {
            if let [Term::Path(path)] = self.terms.as_slice() {
                return format_value(path.resolve(record));
            }
        }

        let mut out = String::new();
        for term in &self.terms {
            match term {
                Term::Path(path) => out.push_str(&format_value(path.resolve(record))),
                Term::Literal(text) => out.push_str(text),
                Term::Unresolvable(_) => {}
            }
        }
        out
    }
}

pub fn evaluate(expression: &str, record: &Value) -> String {
    Expression::parse(expression).evaluate(record)
}

pub fn format_value(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match value {
        Value::Null => String::new(),
        Value::Bool(v) => v.to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::String(s) => match parse_iso_date(s) {
            Some(date) => format_date(date),
            None => s.clone(),
        },
        Value::Date(date) => format_date(*date),
        Value::DateTime(dt) => format_date(dt.date()),
        Value::List(_) | Value::Map(_) => {
            serde_json::to_string(&value.to_json()).unwrap_or_default()
        }
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    if !bytes
        .iter()
        .enumerate()
        .all(|(idx, b)| idx == 4 || idx == 7 || b.is_ascii_digit())
    {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

// `+` inside a quoted literal is text, not an operator.
fn split_concatenation(raw: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (idx, ch) in raw.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == '+' => {
                pieces.push(&raw[start..idx]);
                start = idx + 1;
            }
            None => {}
        }
    }
    pieces.push(&raw[start..]);
    pieces
}

fn unquote(piece: &str) -> &str {
    let bytes = piece.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' || first == b'"') && first == last {
            return &piece[1..piece.len() - 1];
        }
    }
    piece
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    #[test]
    fn resolves_nested_paths() {
        assert_eq!(evaluate("$.a.b", &record(json!({"a": {"b": "X"}}))), "X");
        assert_eq!(evaluate("$.a.b", &record(json!({"a": {}}))), "");
        assert_eq!(
            evaluate("$.delegato.nome", &record(json!({"delegato": {"nome": "Maria"}}))),
            "Maria"
        );
    }

    #[test]
    fn missing_segments_render_empty() {
        let data = record(json!({"a": [1, 2], "s": "text", "n": null}));
        assert_eq!(evaluate("$.a[5]", &data), "");
        assert_eq!(evaluate("$.s.inner", &data), "");
        assert_eq!(evaluate("$.s[0]", &data), "");
        assert_eq!(evaluate("$.n", &data), "");
        assert_eq!(evaluate("$.missing.deeper.still", &data), "");
        assert_eq!(evaluate("$.a[*]", &data), "");
    }

    #[test]
    fn index_segments_select_elements() {
        let data = record(json!({"sezioni": [{"numero": 12}, {"numero": 13}], "m": [[1, 2], [3, 4]]}));
        assert_eq!(evaluate("$.sezioni[1].numero", &data), "13");
        assert_eq!(evaluate("$.m[1][0]", &data), "3");
    }

    #[test]
    fn concatenates_paths_and_literals() {
        let data = record(json!({"a": "Foo", "b": "Bar"}));
        assert_eq!(evaluate("$.a + ' - ' + $.b", &data), "Foo - Bar");
        assert_eq!(evaluate("$.a + \" / \" + $.b", &data), "Foo / Bar");
        assert_eq!(evaluate("'Sig. ' + $.a", &data), "Sig. Foo");
        assert_eq!(evaluate("$.a + ' + ' + $.b", &data), "Foo + Bar");
        assert_eq!(evaluate("$.a + $.missing + $.b", &data), "FooBar");
    }

    #[test]
    fn literal_only_expressions_pass_through() {
        let data = Value::Null;
        assert_eq!(evaluate("'Sezione'", &data), "Sezione");
        assert_eq!(evaluate("Sezione", &data), "Sezione");
    }

    #[test]
    fn single_path_keeps_value_untrimmed() {
        let data = record(json!({"a": "  padded  "}));
        assert_eq!(evaluate("$.a", &data), "  padded  ");
        assert_eq!(evaluate("$.a + ''", &data), "  padded  ");
    }

    #[test]
    fn dates_render_day_month_year() {
        assert_eq!(evaluate("$.d", &record(json!({"d": "1990-03-20"}))), "20/03/1990");

        let date = NaiveDate::from_ymd_opt(1990, 3, 20).expect("date");
        let native: Value = [("d", Value::Date(date))].into_iter().collect();
        assert_eq!(evaluate("$.d", &native), "20/03/1990");

        let dt = NaiveDateTime::parse_from_str("1990-03-20 18:30:00", "%Y-%m-%d %H:%M:%S")
            .expect("datetime");
        let native: Value = [("d", Value::DateTime(dt))].into_iter().collect();
        assert_eq!(evaluate("$.d", &native), "20/03/1990");
    }

    #[test]
    fn date_like_strings_that_are_not_iso_stay_verbatim() {
        let data = record(json!({"a": "1990-13-40", "b": "20/03/1990", "c": "1990-03-20T10:00"}));
        assert_eq!(evaluate("$.a", &data), "1990-13-40");
        assert_eq!(evaluate("$.b", &data), "20/03/1990");
        assert_eq!(evaluate("$.c", &data), "1990-03-20T10:00");
    }

    #[test]
    fn scalars_use_default_textual_form() {
        let data = record(json!({"i": 42, "f": 3.5, "t": true, "l": [1, "x"]}));
        assert_eq!(evaluate("$.i", &data), "42");
        assert_eq!(evaluate("$.f", &data), "3.5");
        assert_eq!(evaluate("$.t", &data), "true");
        assert_eq!(evaluate("$.l", &data), "[1,\"x\"]");
    }

    #[test]
    fn malformed_paths_render_empty() {
        let data = record(json!({"a": {"b": "X"}}));
        assert_eq!(evaluate("$.a..b", &data), "");
        assert_eq!(evaluate("$.a[x]", &data), "");
        assert_eq!(evaluate("$.a[0", &data), "");
        assert_eq!(evaluate("$.a..b + '!'", &data), "!");
    }

    #[test]
    fn bare_root_resolves_to_record() {
        assert_eq!(evaluate("$", &Value::from("Rossi")), "Rossi");
        assert_eq!(Path::parse("$"), Some(Path::root()));
    }

    #[test]
    fn path_parse_exposes_segments() {
        let path = Path::parse("$.designazioni[*].effettivo_cognome").expect("path");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("designazioni".to_string()),
                Segment::Wildcard,
                Segment::Key("effettivo_cognome".to_string()),
            ]
        );
        assert!(path.has_wildcard());
        assert!(Path::parse("delegato.nome").is_none());
    }

    #[test]
    fn wildcard_prefix_and_element_path() {
        let path = Path::parse("$.sezioni[2].righe[*].nome").expect("path");
        let array = path.wildcard_prefix().expect("array");
        assert_eq!(array.to_string(), "$.sezioni[2].righe");
        assert_eq!(path.element_path(&array).expect("element").to_string(), "$.nome");
        let other = Path::parse("$.sezioni[2].altre[*].nome").expect("path");
        assert!(other.element_path(&array).is_none());
        assert!(Path::parse("$.a.b").expect("path").wildcard_prefix().is_none());
    }

    #[test]
    fn wildcard_inside_a_literal_is_text() {
        let expression = Expression::parse("'[*] ' + $.a");
        assert!(expression.terms().iter().all(|term| match term {
            Term::Path(path) => !path.has_wildcard(),
            _ => true,
        }));
        assert_eq!(expression.evaluate(&record(json!({"a": "X"}))), "[*] X");
    }
}
