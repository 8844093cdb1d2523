//! Incremental parsing of streamed tool-call arguments.
//!
//! Arguments arrive as arbitrary fragments of one JSON object. A strict parse
//! is only attempted once the buffer looks complete: it starts with `{`, ends
//! with `}`, and a string-aware brace scanner is back at depth zero. A failed
//! attempt just means more input is coming.

use serde_json::{Map, Value};

/// Result of feeding one fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    /// Not a complete object yet.
    Pending,
    /// The buffer parsed as a whole object.
    Complete(Value),
}

#[derive(Debug, Default)]
pub struct PartialJson {
    buffer: String,
    depth: i64,
    in_string: bool,
    escaped: bool,
    /// Fields of every successful parse, later parses overriding earlier ones.
    merged: Map<String, Value>,
    parsed_any: bool,
    /// Buffer length at the last parse attempt.
    attempted_at: usize,
}

impl PartialJson {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw text received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn feed(&mut self, fragment: &str) -> Feed {
        self.buffer.push_str(fragment);
        self.scan(fragment);

        if !self.looks_complete() {
            return Feed::Pending;
        }
        match self.try_parse() {
            Some(value) => Feed::Complete(value),
            None => Feed::Pending,
        }
    }

    /// Final attempt once the stream says the arguments are over. Returns the
    /// merged object, or `None` if no attempt ever succeeded.
    pub fn finish(&mut self) -> Option<Value> {
        if self.attempted_at != self.buffer.len() && !self.buffer.trim().is_empty() {
            self.try_parse();
        }
        self.parsed_any
            .then(|| Value::Object(self.merged.clone()))
    }

    fn scan(&mut self, fragment: &str) {
        for c in fragment.chars() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match c {
                '"' => self.in_string = true,
                '{' | '[' => self.depth += 1,
                '}' | ']' => self.depth -= 1,
                _ => {}
            }
        }
    }

    fn looks_complete(&self) -> bool {
        let trimmed = self.buffer.trim();
        self.depth == 0 && !self.in_string && trimmed.starts_with('{') && trimmed.ends_with('}')
    }

    fn try_parse(&mut self) -> Option<Value> {
        self.attempted_at = self.buffer.len();
        match serde_json::from_str::<Value>(self.buffer.trim()) {
            Ok(Value::Object(map)) => {
                self.parsed_any = true;
                for (key, value) in &map {
                    self.merged.insert(key.clone(), value.clone());
                }
                Some(Value::Object(map))
            }
            Ok(other) => {
                tracing::debug!("Tool arguments parsed to a non-object: {other}");
                None
            }
            Err(e) => {
                tracing::debug!("Tool arguments not parseable yet: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assemble(fragments: &[&str]) -> Option<Value> {
        let mut parser = PartialJson::new();
        for fragment in fragments {
            parser.feed(fragment);
        }
        parser.finish()
    }

    #[test]
    fn polka_fragments() {
        let mut parser = PartialJson::new();
        assert_eq!(parser.feed("{\"que"), Feed::Pending);
        assert_eq!(parser.feed("ry\":\"pol"), Feed::Pending);
        assert_eq!(parser.feed("ka\"}"), Feed::Complete(json!({"query": "polka"})));
        assert_eq!(parser.finish(), Some(json!({"query": "polka"})));
    }

    #[test]
    fn braces_inside_strings_do_not_complete() {
        let mut parser = PartialJson::new();
        assert_eq!(parser.feed(r#"{"text":"a } b"#), Feed::Pending);
        assert_eq!(parser.feed(r#" \" }"#), Feed::Pending);
        assert_eq!(
            parser.feed(r#""}"#),
            Feed::Complete(json!({"text": "a } b \" }"}))
        );
    }

    #[test]
    fn nested_values_keep_their_types() {
        let value = assemble(&[r#"{"n": 3, "flag": true, "#, r#""list": [1, {"x": null}], "s": "4"}"#]);
        assert_eq!(
            value,
            Some(json!({"n": 3, "flag": true, "list": [1, {"x": null}], "s": "4"}))
        );
    }

    #[test]
    fn empty_and_unparseable_input_yield_none() {
        assert_eq!(assemble(&[]), None);
        assert_eq!(assemble(&["{\"a\":"]), None);
        assert_eq!(assemble(&["not json"]), None);
    }

    #[test]
    fn reemitted_object_keeps_first_parse() {
        // The second copy makes the buffer unparseable, so only the first counts.
        assert_eq!(assemble(&["{\"a\":1}", "{\"a\":2}"]), Some(json!({"a": 1})));
    }

    #[test]
    fn trailing_whitespace_after_complete_object() {
        let mut parser = PartialJson::new();
        parser.feed("{\"a\":1,\"b\":1}");
        assert_eq!(parser.feed(" "), Feed::Complete(json!({"a": 1, "b": 1})));
        assert_eq!(parser.finish(), Some(json!({"a": 1, "b": 1})));
    }

    #[test]
    fn whitespace_around_object_is_accepted() {
        assert_eq!(assemble(&["  {\"q\": ", "\"x\"}\n"]), Some(json!({"q": "x"})));
    }

    #[test]
    fn fragmentation_never_changes_the_result() {
        let text = r#"{"query":"polka \"dots\" {x}","page":2,"filters":{"lang":["rust","go"],"stars":null},"emoji":"café ☕"}"#;
        let expected: Value = serde_json::from_str(text).unwrap();
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        for &i in &bounds {
            assert_eq!(
                assemble(&[&text[..i], &text[i..]]),
                Some(expected.clone()),
                "split at {i}"
            );
        }
        for (a, &i) in bounds.iter().enumerate().step_by(3) {
            for &j in bounds[a..].iter().step_by(5) {
                assert_eq!(
                    assemble(&[&text[..i], &text[i..j], &text[j..]]),
                    Some(expected.clone()),
                    "split at {i},{j}"
                );
            }
        }
        let singles: Vec<String> = text.chars().map(String::from).collect();
        let singles: Vec<&str> = singles.iter().map(String::as_str).collect();
        assert_eq!(assemble(&singles), Some(expected));
    }
}
