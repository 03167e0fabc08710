//! Reply parsing: raw provider text → ordered `(speaker, text)` pairs.
//!
//! Two shapes are accepted. A JSON array of `{"name", "text"}` objects (or a
//! single object), optionally wrapped in a markdown code fence. Otherwise
//! plain text split on `||` or newlines, each segment `Name: text`. A
//! segment without a recognisable name is attributed to the initiator.
//! Text that merely opens with a bracket (`[smiles] ...`) is read as plain
//! text; only a body that starts like a JSON object and fails to decode is
//! malformed.

use serde::Deserialize;

/// Longest prefix still treated as a speaker name in `Name: text`.
const MAX_NAME_CHARS: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("reply contained no dialogue")]
    Empty,
    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// One parsed line. `speaker == None` means "the initiator".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub speaker: Option<String>,
    pub text: String,
}

impl ParsedLine {
    fn new(speaker: Option<&str>, text: &str) -> Option<Self> {
        let text = strip_quotes(text.trim());
        if text.is_empty() {
            return None;
        }
        let speaker = speaker
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        Some(Self { speaker, text: text.to_owned() })
    }
}

#[derive(Deserialize)]
struct JsonLine {
    #[serde(default, alias = "speaker")]
    name: Option<String>,
    #[serde(alias = "line", alias = "content")]
    text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonReply {
    Many(Vec<JsonLine>),
    One(JsonLine),
}

pub fn parse_reply(raw: &str) -> Result<Vec<ParsedLine>, ParseError> {
    let body = strip_fence(raw.trim());
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let lines = if body.starts_with('[') || body.starts_with('{') {
        match parse_json(body) {
            Ok(lines) => lines,
            Err(e) if looks_structured(body) => return Err(e),
            Err(_) => parse_plain(body),
        }
    } else {
        parse_plain(body)
    };

    if lines.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(lines)
}

fn parse_json(body: &str) -> Result<Vec<ParsedLine>, ParseError> {
    let reply: JsonReply =
        serde_json::from_str(body).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let raw = match reply {
        JsonReply::Many(lines) => lines,
        JsonReply::One(line) => vec![line],
    };
    Ok(raw
        .iter()
        .filter_map(|l| ParsedLine::new(l.name.as_deref(), &l.text))
        .collect())
}

/// `{"...` or `[{...`: the provider was clearly attempting JSON.
fn looks_structured(body: &str) -> bool {
    let inner = body.strip_prefix('[').unwrap_or(body).trim_start();
    inner.strip_prefix('{').is_some_and(|rest| rest.trim_start().starts_with('"'))
}

fn parse_plain(body: &str) -> Vec<ParsedLine> {
    body.split("||")
        .flat_map(str::lines)
        .filter_map(|segment| {
            let segment = segment.trim();
            match split_speaker(segment) {
                Some((name, text)) => ParsedLine::new(Some(name), text),
                None => ParsedLine::new(None, segment),
            }
        })
        .collect()
}

/// `Name: text` → `(Name, text)` when the prefix looks like a name.
fn split_speaker(segment: &str) -> Option<(&str, &str)> {
    let (name, text) = segment.split_once(':')?;
    let name = name.trim().trim_matches('*');
    let plausible = !name.is_empty()
        && name.chars().count() <= MAX_NAME_CHARS
        && !name.contains(['.', '!', '?', '"']);
    plausible.then_some((name, text))
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, text: &str) -> ParsedLine {
        ParsedLine { speaker: Some(name.into()), text: text.into() }
    }

    #[test]
    fn double_bar_format() {
        let lines = parse_reply("A: Hello||B: Hi there").unwrap();
        assert_eq!(lines, vec![named("A", "Hello"), named("B", "Hi there")]);
    }

    #[test]
    fn newline_format_skips_blanks() {
        let lines = parse_reply("Mara: Cold today.\n\n  Jon: \"Sure is.\"\n").unwrap();
        assert_eq!(lines, vec![named("Mara", "Cold today."), named("Jon", "Sure is.")]);
    }

    #[test]
    fn unnamed_segment_goes_to_initiator() {
        let lines = parse_reply("Just thinking out loud.").unwrap();
        assert_eq!(lines[0].speaker, None);
        assert_eq!(lines[0].text, "Just thinking out loud.");
    }

    #[test]
    fn sentence_with_colon_is_not_a_name() {
        let lines = parse_reply("Well. Here is the thing: no.").unwrap();
        assert_eq!(lines[0].speaker, None);
    }

    #[test]
    fn json_array() {
        let raw = r#"[{"name":"A","text":"Hello"},{"speaker":"B","line":"Hi"}]"#;
        assert_eq!(parse_reply(raw).unwrap(), vec![named("A", "Hello"), named("B", "Hi")]);
    }

    #[test]
    fn fenced_json_object() {
        let raw = "```json\n{\"name\":\"A\",\"text\":\"Only me\"}\n```";
        assert_eq!(parse_reply(raw).unwrap(), vec![named("A", "Only me")]);
    }

    #[test]
    fn empty_and_malformed() {
        assert_eq!(parse_reply("   "), Err(ParseError::Empty));
        assert_eq!(parse_reply("|| \n ||"), Err(ParseError::Empty));
        assert_eq!(parse_reply(r#"[{"name":"A","text":""}]"#), Err(ParseError::Empty));
        assert!(matches!(parse_reply("[{\"name\": "), Err(ParseError::Malformed(_))));
        assert!(matches!(parse_reply("{\"text\": 3}"), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn bracketed_prose_falls_back_to_plain() {
        let lines = parse_reply("[smiles] Ana: hello||Bo: hey").unwrap();
        // The stage direction stays in the name; speaker matching finds Ana inside it.
        assert_eq!(lines[0], named("[smiles] Ana", "hello"));
        assert_eq!(lines[1], named("Bo", "hey"));

        let lines = parse_reply("{sighs} Long day.").unwrap();
        assert_eq!(lines, vec![ParsedLine { speaker: None, text: "{sighs} Long day.".into() }]);
    }

    #[test]
    fn name_only_segment_is_dropped() {
        let lines = parse_reply("A:||B: fine").unwrap();
        assert_eq!(lines, vec![named("B", "fine")]);
    }
}
