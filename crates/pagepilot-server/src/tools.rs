//! The tool catalog.

use pagepilot_core::ContentType;
use std::fmt;
use std::str::FromStr;

/// The fixed set of retrieval tools both transports expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchRunbooks,
    SearchKnowledgeBase,
    GetProcedure,
    GetDecisionTree,
    GetEscalationPath,
    ListSources,
    RecordResolutionFeedback,
}

impl ToolName {
    /// Every tool, in catalog order.
    pub const ALL: [ToolName; 7] = [
        ToolName::SearchRunbooks,
        ToolName::SearchKnowledgeBase,
        ToolName::GetProcedure,
        ToolName::GetDecisionTree,
        ToolName::GetEscalationPath,
        ToolName::ListSources,
        ToolName::RecordResolutionFeedback,
    ];

    /// Wire name of the tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchRunbooks => "search_runbooks",
            ToolName::SearchKnowledgeBase => "search_knowledge_base",
            ToolName::GetProcedure => "get_procedure",
            ToolName::GetDecisionTree => "get_decision_tree",
            ToolName::GetEscalationPath => "get_escalation_path",
            ToolName::ListSources => "list_sources",
            ToolName::RecordResolutionFeedback => "record_resolution_feedback",
        }
    }

    /// One-line description for the tool catalog.
    pub fn description(&self) -> &'static str {
        match self {
            ToolName::SearchRunbooks => {
                "Search operational runbooks by alert type, severity and affected systems"
            }
            ToolName::SearchKnowledgeBase => {
                "Free-text search across all configured knowledge sources"
            }
            ToolName::GetProcedure => "Fetch one remediation procedure by id",
            ToolName::GetDecisionTree => "Fetch the decision tree for an alert type",
            ToolName::GetEscalationPath => {
                "Resolve the escalation path for a severity and time of day"
            }
            ToolName::ListSources => "List configured sources with health and metadata",
            ToolName::RecordResolutionFeedback => {
                "Record the outcome of a resolution attempt"
            }
        }
    }

    /// Cache namespace the tool's responses land in.
    pub fn content_type(&self) -> ContentType {
        match self {
            ToolName::SearchRunbooks => ContentType::Runbooks,
            ToolName::SearchKnowledgeBase => ContentType::KnowledgeBase,
            ToolName::GetProcedure => ContentType::Procedures,
            ToolName::GetDecisionTree => ContentType::DecisionTrees,
            ToolName::GetEscalationPath
            | ToolName::ListSources
            | ToolName::RecordResolutionFeedback => ContentType::WebResponse,
        }
    }

    /// Whether responses may be served from and stored into the cache.
    pub fn cacheable(&self) -> bool {
        !matches!(self, ToolName::RecordResolutionFeedback)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .find(|tool| tool.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown tool: {s}"))
    }
}
