use serde::Serialize;

/// Kinds of risk the heuristics can flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RiskKind {
    MixerInteraction,
    HighValue,
    NewAddress,
    SuspiciousPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One heuristic finding attached to a transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskIndicator {
    pub kind: RiskKind,
    pub severity: Severity,
    pub description: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}
