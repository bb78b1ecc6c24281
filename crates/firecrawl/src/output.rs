use serde_json::Value;

/// Where the primary output of an upstream payload was found.
///
/// Keys are probed in declaration order; the first present, non-null key
/// wins. An object without any of them but with a `success` key is its own
/// output.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryOutput {
    Output(Value),
    Data(Value),
    Result(Value),
    Markdown(Value),
    Content(Value),
    Whole(Value),
    Absent,
}

const PRIORITY: [&str; 5] = ["output", "data", "result", "markdown", "content"];

impl PrimaryOutput {
    pub fn extract(payload: &Value) -> Self {
        let Some(object) = payload.as_object() else {
            return match payload {
                Value::Null => PrimaryOutput::Absent,
                other => PrimaryOutput::Whole(other.clone()),
            };
        };

        for key in PRIORITY {
            match object.get(key) {
                None | Some(Value::Null) => continue,
                Some(value) => return Self::tagged(key, value.clone()),
            }
        }

        if object.contains_key("success") {
            PrimaryOutput::Whole(payload.clone())
        } else {
            PrimaryOutput::Absent
        }
    }

    fn tagged(key: &str, value: Value) -> Self {
        match key {
            "output" => PrimaryOutput::Output(value),
            "data" => PrimaryOutput::Data(value),
            "result" => PrimaryOutput::Result(value),
            "markdown" => PrimaryOutput::Markdown(value),
            _ => PrimaryOutput::Content(value),
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            PrimaryOutput::Output(_) => "output",
            PrimaryOutput::Data(_) => "data",
            PrimaryOutput::Result(_) => "result",
            PrimaryOutput::Markdown(_) => "markdown",
            PrimaryOutput::Content(_) => "content",
            PrimaryOutput::Whole(_) => "whole",
            PrimaryOutput::Absent => "absent",
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            PrimaryOutput::Output(v)
            | PrimaryOutput::Data(v)
            | PrimaryOutput::Result(v)
            | PrimaryOutput::Markdown(v)
            | PrimaryOutput::Content(v)
            | PrimaryOutput::Whole(v) => v,
            PrimaryOutput::Absent => Value::Null,
        }
    }
}

/// `creditsUsed` as reported by the upstream, if any.
pub fn credits_used(payload: &Value) -> Option<u64> {
    let credits = payload.get("creditsUsed")?;
    credits
        .as_u64()
        .or_else(|| credits.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64))
}
