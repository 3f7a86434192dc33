//! Request and result types shared by agents and the orchestrator.

use serde::{Deserialize, Serialize};

/// One ownership-proof attempt for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Domain whose control is being proven.
    pub domain: String,
    /// DNS name queried for the CNAME record.
    pub challenge: String,
    /// Expected CNAME target.
    pub response: String,
}

impl ValidationRequest {
    /// Create a new request.
    pub fn new(
        domain: impl Into<String>,
        challenge: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            challenge: challenge.into(),
            response: response.into(),
        }
    }

    /// Agent URI path for this request.
    pub fn to_path(&self) -> String {
        format!(
            "/cname/{}/{}/{}",
            self.domain, self.challenge, self.response
        )
    }
}

/// Outcome of a validation, either from one agent or aggregated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the validation succeeded.
    pub success: bool,
    /// Observed CNAME target, empty when nothing was observed.
    #[serde(default)]
    pub response: String,
    /// Diagnostics in the order they were collected.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// An empty, unsuccessful result.
    pub fn new() -> Self {
        Self::default()
    }

    /// An unsuccessful result carrying a single error.
    pub fn failure(err: impl Into<String>) -> Self {
        Self {
            success: false,
            response: String::new(),
            errors: vec![err.into()],
        }
    }

    /// Append one error.
    pub fn append_error(&mut self, err: impl Into<String>) {
        self.errors.push(err.into());
    }

    /// Append `"<prefix>: <err>"`.
    pub fn append_error_with_prefix(&mut self, err: impl AsRef<str>, prefix: &str) {
        self.errors.push(format!("{}: {}", prefix, err.as_ref()));
    }

    /// Append errors verbatim.
    pub fn append_errors<I, S>(&mut self, errs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors.extend(errs.into_iter().map(Into::into));
    }

    /// Append errors, each prefixed with `prefix`.
    pub fn append_errors_with_prefix<I, S>(&mut self, errs: I, prefix: &str)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for err in errs {
            self.append_error_with_prefix(err, prefix);
        }
    }

    /// Tab-indented JSON, as served by agents and printed by the orchestrator.
    pub fn to_json(&self) -> String {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        if self.serialize(&mut ser).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }

    /// Parse an agent's JSON body.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// XML document with root `result`.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<result>\n");
        out.push_str(&format!("\t<success>{}</success>\n", self.success));
        out.push_str(&format!(
            "\t<response>{}</response>\n",
            escape_xml(&self.response)
        ));
        if self.errors.is_empty() {
            out.push_str("\t<errors></errors>\n");
        } else {
            out.push_str("\t<errors>\n");
            for err in &self.errors {
                out.push_str(&format!("\t\t<error>{}</error>\n", escape_xml(err)));
            }
            out.push_str("\t</errors>\n");
        }
        out.push_str("</result>");
        out
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
