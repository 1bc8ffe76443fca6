//! Risk classification for shell commands.
//!
//! The analyzer is a pure function over `(command text, rolling context)`.
//! Rules are evaluated in a fixed priority order, most destructive first;
//! the first matching rule wins. No rule ever mutates state — the context
//! window is read-only input supplied by the caller.

mod builtin;
mod shellwords;

pub use builtin::{default_rules, CautionStreakRule, PatternRule};

use serde::{Deserialize, Serialize};
use termgate_types::{AnalysisResult, CommandEvent, RiskLevel};

/// Outcome of a single rule firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub risk_level: RiskLevel,
    pub suggestions: Vec<String>,
}

impl RuleMatch {
    pub fn new(risk_level: RiskLevel) -> Self {
        Self {
            risk_level,
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// A single detection capability.
///
/// Adding a new capability to the analyzer means adding one more
/// implementation to the ordered list; nothing else changes.
pub trait Rule: Send + Sync {
    /// Stable identifier, surfaced as `matched_rule` in verdicts.
    fn id(&self) -> &str;

    /// Evaluate one command against this rule. `context` holds the
    /// session's previous command texts, oldest first.
    fn evaluate(&self, command: &str, context: &[String]) -> Option<RuleMatch>;
}

/// Analyzer configuration, validated at startup by the broker config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Verdicts at or above this level set `should_block`.
    /// CAUTION below the default threshold is advisory-only.
    pub block_threshold: RiskLevel,
    /// Enable the consecutive-caution escalation rule.
    pub caution_streak_enabled: bool,
    /// Consecutive caution-class commands (current one included) that
    /// trip the streak rule when enabled.
    pub caution_streak_threshold: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            block_threshold: RiskLevel::Dangerous,
            caution_streak_enabled: false,
            caution_streak_threshold: 3,
        }
    }
}

/// Stateless classification engine: an ordered rule list plus the
/// blocking threshold.
pub struct RiskAnalyzer {
    rules: Vec<Box<dyn Rule>>,
    block_threshold: RiskLevel,
}

impl RiskAnalyzer {
    /// Build an analyzer with the built-in rule set.
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self::with_rules(builtin::default_rules(config), config.block_threshold)
    }

    /// Build an analyzer from an explicit ordered rule list.
    pub fn with_rules(rules: Vec<Box<dyn Rule>>, block_threshold: RiskLevel) -> Self {
        Self {
            rules,
            block_threshold,
        }
    }

    pub fn block_threshold(&self) -> RiskLevel {
        self.block_threshold
    }

    /// Classify one command event. First matching rule wins; no match
    /// is SAFE with no suggestions.
    pub fn analyze(&self, event: &CommandEvent) -> AnalysisResult {
        let command = event.raw_text.trim();
        if command.is_empty() {
            return AnalysisResult::safe();
        }

        for rule in &self.rules {
            if let Some(m) = rule.evaluate(command, &event.context) {
                return AnalysisResult {
                    risk_level: m.risk_level,
                    matched_rule: Some(rule.id().to_string()),
                    suggestions: m.suggestions,
                    should_block: m.risk_level >= self.block_threshold,
                };
            }
        }

        AnalysisResult::safe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(text: &str, context: &[&str]) -> CommandEvent {
        CommandEvent::new(
            Uuid::new_v4(),
            text,
            context.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn analyzer() -> RiskAnalyzer {
        RiskAnalyzer::new(&AnalyzerConfig::default())
    }

    #[test]
    fn test_safe_command_passes() {
        let result = analyzer().analyze(&event("echo \"hi\"", &[]));
        assert_eq!(result.risk_level, RiskLevel::Safe);
        assert_eq!(result.matched_rule, None);
        assert!(result.suggestions.is_empty());
        assert!(!result.should_block);
    }

    #[test]
    fn test_recursive_root_delete_is_critical() {
        let result = analyzer().analyze(&event("rm -rf /", &[]));
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.matched_rule.as_deref(), Some("recursive_root_delete"));
        assert!(result.should_block);
        assert!(result.suggestions.iter().any(|s| s.contains("-i")));
    }

    #[test]
    fn test_first_match_wins_over_generic_delete() {
        // `rm -rf /` matches both the root-delete rule and the generic
        // recursive-delete rule; the more specific one is ordered first.
        let result = analyzer().analyze(&event("sudo rm -rf --no-preserve-root /", &[]));
        assert_eq!(result.matched_rule.as_deref(), Some("recursive_root_delete"));
    }

    #[test]
    fn test_generic_recursive_delete_is_advisory() {
        let result = analyzer().analyze(&event("rm -rf ./build", &[]));
        assert_eq!(result.risk_level, RiskLevel::Caution);
        assert!(!result.should_block, "caution is advisory at the default threshold");
    }

    #[test]
    fn test_context_escalation_after_cd() {
        // A wildcard delete right after a directory change escalates.
        let alone = analyzer().analyze(&event("rm -rf *", &[]));
        assert_eq!(alone.risk_level, RiskLevel::Caution);

        let chained = analyzer().analyze(&event("rm -rf *", &["cd /var/log"]));
        assert_eq!(chained.risk_level, RiskLevel::Dangerous);
        assert_eq!(chained.matched_rule.as_deref(), Some("wildcard_delete_after_cd"));
        assert!(chained.should_block);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let config = AnalyzerConfig {
            block_threshold: RiskLevel::Caution,
            ..AnalyzerConfig::default()
        };
        let result = RiskAnalyzer::new(&config).analyze(&event("rm -rf ./build", &[]));
        assert!(result.should_block);
    }

    #[test]
    fn test_caution_streak_escalates_through_analyzer() {
        // With the streak rule enabled, the third consecutive
        // recursive delete must be claimed by `caution_streak`, not by
        // the generic `recursive_delete` rule ordered behind it.
        let config = AnalyzerConfig {
            caution_streak_enabled: true,
            caution_streak_threshold: 3,
            ..AnalyzerConfig::default()
        };
        let analyzer = RiskAnalyzer::new(&config);

        let result = analyzer.analyze(&event("rm -rf c", &["rm -rf a", "rm -rf b"]));
        assert_eq!(result.matched_rule.as_deref(), Some("caution_streak"));
        assert_eq!(result.risk_level, RiskLevel::Dangerous);
        assert!(result.should_block);

        // Below the threshold the generic rule still applies.
        let below = analyzer.analyze(&event("rm -rf c", &["rm -rf a"]));
        assert_eq!(below.matched_rule.as_deref(), Some("recursive_delete"));
        assert!(!below.should_block);
    }

    #[test]
    fn test_blank_command_is_safe() {
        let result = analyzer().analyze(&event("   ", &[]));
        assert_eq!(result, AnalysisResult::safe());
    }

    #[test]
    fn test_analyzer_does_not_mutate_context() {
        let e = event("rm -rf *", &["cd /tmp"]);
        let before = e.context.clone();
        let _ = analyzer().analyze(&e);
        assert_eq!(e.context, before);
    }
}
