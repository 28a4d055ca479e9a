//! Declarative description of a service's error envelope.

use serde_json::Value;

/// What counts as "this response carries an error".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTest {
    /// The error record exists and its code is present and non-empty.
    Present,
    /// The code is present and numerically different from zero.
    NonZero,
}

/// Where a service reports errors and how to recognise one.
///
/// `container_path` leads from the response root to either a single
/// `{code, message}` record or a list of them; the first record is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSpec {
    pub container_path: Vec<String>,
    pub code_field: String,
    pub message_field: String,
    pub test: ErrorTest,
}

/// An error found in a response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
}

impl ErrorSpec {
    pub fn new<I, S>(
        container_path: I,
        code_field: impl Into<String>,
        message_field: impl Into<String>,
        test: ErrorTest,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            container_path: container_path.into_iter().map(Into::into).collect(),
            code_field: code_field.into(),
            message_field: message_field.into(),
            test,
        }
    }

    /// A list of records nested one level down, e.g. `Errors/Err[{Code, Msg}]`.
    pub fn record_list(outer: &str, inner: &str, code: &str, message: &str) -> Self {
        Self::new([outer, inner], code, message, ErrorTest::Present)
    }

    /// A single record whose code is zero on success, e.g. `FEXErr{ErrCode, ErrMsg}`.
    pub fn coded_record(key: &str, code: &str, message: &str) -> Self {
        Self::new([key], code, message, ErrorTest::NonZero)
    }

    /// Evaluate against a response; `None` means no error was reported.
    pub fn check(&self, response: &Value) -> Option<EnvelopeError> {
        let mut node = response;
        for key in &self.container_path {
            node = node.get(key.as_str())?;
        }
        let record = match node {
            Value::Array(items) => items.first()?,
            Value::Null => return None,
            other => other,
        };

        let code = record.get(self.code_field.as_str()).filter(|c| !c.is_null())?;
        let is_error = match self.test {
            ErrorTest::Present => !scalar_text(code).is_empty(),
            ErrorTest::NonZero => !is_zero(code),
        };
        if !is_error {
            return None;
        }

        let message = record
            .get(self.message_field.as_str())
            .map(scalar_text)
            .unwrap_or_default();
        Some(EnvelopeError {
            code: scalar_text(code),
            message,
        })
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().map(|n| n == 0.0).unwrap_or(false),
        Value::Bool(b) => !b,
        _ => false,
    }
}
