use serde::{Deserialize, Serialize};

use deptflow_core::domain::department::DepartmentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    InternshipSubjectSwap,
    LeaveRequest,
    ExpenseReimbursement,
    ItSupport,
    GeneralInquiry,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternshipSubjectSwap => "internship_subject_swap",
            Self::LeaveRequest => "leave_request",
            Self::ExpenseReimbursement => "expense_reimbursement",
            Self::ItSupport => "it_support",
            Self::GeneralInquiry => "general_inquiry",
        }
    }

    /// Intents that come with a pre-built multi-step workflow.
    pub fn synthesizes_workflow(&self) -> bool {
        matches!(self, Self::InternshipSubjectSwap)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub departments: Vec<DepartmentId>,
    pub confidence: f64,
}

/// One ordered rule. Every clause must match; a clause matches when any of its
/// keywords is a substring of the lowercased text.
#[derive(Clone, Debug)]
struct IntentRule {
    clauses: &'static [&'static [&'static str]],
    intent: Intent,
    departments: &'static [&'static str],
    confidence: f64,
}

impl IntentRule {
    fn matches(&self, normalized_text: &str) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.iter().any(|keyword| normalized_text.contains(keyword)))
    }

    fn classification(&self) -> Classification {
        Classification {
            intent: self.intent,
            departments: self.departments.iter().map(|id| DepartmentId::from(*id)).collect(),
            confidence: self.confidence,
        }
    }
}

static RULES: [IntentRule; 4] = [
    IntentRule {
        clauses: &[&["internship"], &["subject", "change"]],
        intent: Intent::InternshipSubjectSwap,
        departments: &["tnp", "academics", "admin"],
        confidence: 0.95,
    },
    IntentRule {
        clauses: &[&["leave", "vacation"]],
        intent: Intent::LeaveRequest,
        departments: &["hr"],
        confidence: 0.90,
    },
    IntentRule {
        clauses: &[&["reimbursement", "expense"]],
        intent: Intent::ExpenseReimbursement,
        departments: &["finance", "hr"],
        confidence: 0.88,
    },
    IntentRule {
        clauses: &[&["it", "computer", "software"]],
        intent: Intent::ItSupport,
        departments: &["it"],
        confidence: 0.85,
    },
];

static FALLBACK: IntentRule = IntentRule {
    clauses: &[],
    intent: Intent::GeneralInquiry,
    departments: &["admin"],
    confidence: 0.60,
};

/// Fixed-rule text classifier. First matching rule wins.
#[derive(Clone, Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Classification {
        let normalized_text = normalize_text(text);
        RULES
            .iter()
            .find(|rule| rule.matches(&normalized_text))
            .unwrap_or(&FALLBACK)
            .classification()
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}
