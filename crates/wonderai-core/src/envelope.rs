use serde::{Deserialize, Serialize};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One JSON object decoded from a `data: ` line of the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEnvelope {
    Content {
        #[serde(default)]
        content: String,
        #[serde(default)]
        finished: bool,
    },
    Complete {
        #[serde(
            default,
            alias = "fullContent",
            skip_serializing_if = "Option::is_none"
        )]
        full_content: Option<String>,
        #[serde(default)]
        finished: bool,
    },
    Error {
        error: String,
        #[serde(default)]
        finished: bool,
    },
}

impl StreamEnvelope {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEnvelope::Content {
            content: text.into(),
            finished: false,
        }
    }

    pub fn complete() -> Self {
        StreamEnvelope::Complete {
            full_content: None,
            finished: true,
        }
    }

    /// No further envelopes are processed after a terminal one.
    pub fn is_terminal(&self) -> bool {
        match self {
            StreamEnvelope::Content { finished, .. } => *finished,
            StreamEnvelope::Complete { .. } | StreamEnvelope::Error { .. } => true,
        }
    }
}

/// Parse a single line from the stream.
///
/// Returns `Ok(None)` for blank lines and lines without the `data: ` prefix,
/// and an error only when the payload after the prefix is not a valid
/// envelope.
pub fn parse_line(line: &str) -> Result<Option<StreamEnvelope>, serde_json::Error> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload == DONE_SENTINEL {
        return Ok(Some(StreamEnvelope::complete()));
    }
    serde_json::from_str(payload).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_content_envelope() {
        let env = parse_line(r#"data: {"type":"content","content":"Hi","finished":false}"#)
            .unwrap()
            .unwrap();
        assert_eq!(env, StreamEnvelope::content("Hi"));
        assert!(!env.is_terminal());
    }

    #[test]
    fn parses_complete_and_error() {
        let complete = parse_line(r#"data: {"type":"complete","finished":true}"#)
            .unwrap()
            .unwrap();
        assert!(complete.is_terminal());

        let error = parse_line(r#"data: {"type":"error","error":"rate limited","finished":true}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            error,
            StreamEnvelope::Error {
                error: "rate limited".to_string(),
                finished: true
            }
        );
    }

    #[test]
    fn accepts_camel_case_full_content() {
        let env = parse_line(r#"data: {"type":"complete","fullContent":"Hi there"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            env,
            StreamEnvelope::Complete {
                full_content: Some("Hi there".to_string()),
                finished: false
            }
        );
        assert!(env.is_terminal());
    }

    #[test]
    fn finished_content_is_terminal() {
        let env = parse_line(r#"data: {"type":"content","content":"!","finished":true}"#)
            .unwrap()
            .unwrap();
        assert!(env.is_terminal());
    }

    #[test]
    fn ignores_blank_and_unprefixed_lines() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("\r").unwrap(), None);
        assert_eq!(parse_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_line("event: ping").unwrap(), None);
        assert_eq!(parse_line("data: ").unwrap(), None);
    }

    #[test]
    fn done_sentinel_completes() {
        assert_eq!(
            parse_line("data: [DONE]\r").unwrap(),
            Some(StreamEnvelope::complete())
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_line("data: {not json").is_err());
        assert!(parse_line(r#"data: {"type":"mystery"}"#).is_err());
    }
}
