//! Session context, the only input capability predicates may look at.

use std::fmt;

/// Issue category the subject declared at session start.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IssueCategory {
    Billing,
    Technical,
    General,
    /// Any other label, kept verbatim (trimmed, lower-cased).
    Other(String),
}

impl IssueCategory {
    /// Parse a free-form label. Never fails: unknown labels become `Other`.
    pub fn parse(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        match label.as_str() {
            "billing" => Self::Billing,
            "technical" => Self::Technical,
            "general" => Self::General,
            _ => Self::Other(label),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Billing => "billing",
            Self::Technical => "technical",
            Self::General => "general",
            Self::Other(label) => label,
        }
    }
}

impl From<&str> for IssueCategory {
    fn from(label: &str) -> Self {
        Self::parse(label)
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session attributes. Built once before the request and read-only
/// afterwards; fields are private so nothing downstream can mutate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    subject: String,
    premium: bool,
    issue: IssueCategory,
}

impl Context {
    pub fn new(subject: impl Into<String>, premium: bool, issue: impl Into<IssueCategory>) -> Self {
        Self {
            subject: subject.into(),
            premium,
            issue: issue.into(),
        }
    }

    /// Display name of the subject, templated into capability artifacts.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn is_premium(&self) -> bool {
        self.premium
    }

    pub fn issue(&self) -> &IssueCategory {
        &self.issue
    }
}
