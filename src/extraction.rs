//! The model's output contract: parsing, validation, and code normalization.
//!
//! The model answers with strict JSON, optionally inside a fenced code block:
//! `{"codeExist":0}` or
//! `{"title":"<sender>","code":"<digits>","topic":"<label>","codeExist":1}`,
//! with an optional `"classification"` of `LOGIN`, `PASSWORD_RESET` or `OTHER`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractionError;

/// What kind of flow the code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Login,
    PasswordReset,
    Other,
}

impl Classification {
    /// Whether codes of this kind must pass the repeat gate.
    pub fn requires_gate(&self) -> bool {
        matches!(self, Self::PasswordReset)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "LOGIN" => Some(Self::Login),
            "PASSWORD_RESET" | "RESET" => Some(Self::PasswordReset),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A validated code found in an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedCode {
    /// Sender address or organization label the model reported.
    pub sender: String,
    /// Normalized code: separators stripped, leading zeros kept.
    pub code: String,
    pub topic: String,
    pub classification: Classification,
}

/// Validated outcome of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    /// The model says the email carries no code.
    NoCode,
    Code(ExtractedCode),
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(rename = "codeExist", alias = "codeExists")]
    code_exist: Option<Value>,
    title: Option<Value>,
    code: Option<Value>,
    topic: Option<Value>,
    classification: Option<String>,
}

/// Parse and validate the model's candidate text.
///
/// Any deviation from the contract is `Malformed`, never a silent `NoCode`.
pub fn parse_response(text: &str) -> Result<ExtractionResult, ExtractionError> {
    let json = strip_code_fence(text);
    let raw: RawExtraction = serde_json::from_str(&json)
        .map_err(|e| ExtractionError::Malformed(format!("JSON parse error: {e}")))?;

    let exists = raw
        .code_exist
        .as_ref()
        .ok_or_else(|| ExtractionError::Malformed("missing codeExist".into()))
        .and_then(truthy)?;

    if !exists {
        return Ok(ExtractionResult::NoCode);
    }

    let sender = required_text(raw.title.as_ref(), "title")?;
    let topic = required_text(raw.topic.as_ref(), "topic")?;
    let code = normalize_code(&required_text(raw.code.as_ref(), "code")?);
    if code.is_empty() {
        return Err(ExtractionError::Malformed(
            "code has no alphanumeric characters".into(),
        ));
    }

    // Absent classification means the variant has no deferred release.
    let classification = match raw.classification.as_deref() {
        None => Classification::Login,
        Some(label) => Classification::parse(label).ok_or_else(|| {
            ExtractionError::Malformed(format!("unknown classification '{label}'"))
        })?,
    };

    Ok(ExtractionResult::Code(ExtractedCode {
        sender,
        code,
        topic,
        classification,
    }))
}

/// Strip spaces, dashes and other separators. Leading zeros are preserved.
pub fn normalize_code(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn truthy(value: &Value) -> Result<bool, ExtractionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(ExtractionError::Malformed(format!("codeExist out of range: {n}"))),
        },
        Value::String(s) => match s.trim() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(ExtractionError::Malformed(format!(
                "codeExist not a flag: '{other}'"
            ))),
        },
        other => Err(ExtractionError::Malformed(format!(
            "codeExist has unexpected type: {other}"
        ))),
    }
}

/// A present, non-blank field. Numbers are accepted as their decimal text.
fn required_text(value: Option<&Value>, field: &str) -> Result<String, ExtractionError> {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        return Err(ExtractionError::Malformed(format!(
            "codeExist=1 but '{field}' is missing or empty"
        )));
    }
    Ok(text)
}

/// Pull the JSON object out of a fenced block or surrounding prose.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // The info string may share the line with the object.
        let after = after
            .strip_prefix("json")
            .or_else(|| after.strip_prefix("JSON"))
            .unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Any other info string or surrounding prose: take the object bounds.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
