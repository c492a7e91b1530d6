//! Keyword-based domain classification for persona selection.
//!
//! The prompt composer frames the model as an expert in the document's
//! domain. Classification is deliberately cheap: count keyword occurrences
//! in the retrieved context plus the question and pick the strict winner.

/// Document domain driving the advisor persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Insurance,
    Legal,
    Hr,
    Contracts,
    General,
}

impl Domain {
    /// Persona line injected at the top of the prompt.
    pub fn persona(self) -> &'static str {
        match self {
            Domain::Insurance => "a senior insurance advisor",
            Domain::Legal => "an experienced legal analyst",
            Domain::Hr => "a human resources policy specialist",
            Domain::Contracts => "a contract review specialist",
            Domain::General => "a meticulous document analyst",
        }
    }
}

struct DomainProfile {
    domain: Domain,
    keywords: &'static [&'static str],
}

// Order matters: earlier profiles win occurrence-count ties. Keywords are
// lowercase; matching lowercases the input.
static PROFILES: &[DomainProfile] = &[
    DomainProfile {
        domain: Domain::Insurance,
        keywords: &[
            "policy",
            "premium",
            "coverage",
            "claim",
            "insured",
            "deductible",
            "waiting period",
            "sum assured",
            "exclusion",
        ],
    },
    DomainProfile {
        domain: Domain::Legal,
        keywords: &[
            "plaintiff",
            "defendant",
            "jurisdiction",
            "statute",
            "liability",
            "court",
            "tribunal",
            "arbitration",
        ],
    },
    DomainProfile {
        domain: Domain::Hr,
        keywords: &[
            "employee",
            "employer",
            "leave",
            "payroll",
            "termination",
            "probation",
            "grievance",
            "appraisal",
        ],
    },
    DomainProfile {
        domain: Domain::Contracts,
        keywords: &[
            "party",
            "parties",
            "hereinafter",
            "indemnify",
            "breach",
            "consideration",
            "warranty",
            "term of this agreement",
        ],
    },
];

/// Picks the domain whose keywords occur most often in the context and
/// question combined. Ties and zero hits fall back to [`Domain::General`].
pub fn classify(context: &str, question: &str) -> Domain {
    let haystack = format!("{} {}", context.to_lowercase(), question.to_lowercase());
    let mut best = Domain::General;
    let mut best_hits = 0usize;
    for profile in PROFILES {
        let hits: usize = profile
            .keywords
            .iter()
            .map(|keyword| haystack.match_indices(keyword).count())
            .sum();
        if hits > best_hits {
            best_hits = hits;
            best = profile.domain;
        }
    }
    best
}

/// Questions the answerer must refuse regardless of what the document says.
static FORBIDDEN_KEYWORDS: &[&str] = &[
    "password",
    "credentials",
    "api key",
    "secret key",
    "internal system",
    "system prompt",
    "fabricate",
    "falsify",
    "fraudulent",
    "forge a",
];

/// True when a question asks for secrets, internals, or help with fraud.
pub fn is_forbidden(question: &str) -> bool {
    let lower = question.to_lowercase();
    FORBIDDEN_KEYWORDS.iter().any(|kw| lower.contains(kw))
}
