//! Built-in detection rules, ordered most destructive first.

use regex::Regex;

use crate::shellwords::{self, ParsedCommand};
use crate::{AnalyzerConfig, Rule, RuleMatch};
use termgate_types::RiskLevel;

/// A regex-backed rule: pattern plus metadata, nothing else.
pub struct PatternRule {
    id: &'static str,
    pattern: Regex,
    risk_level: RiskLevel,
    suggestions: Vec<String>,
}

impl PatternRule {
    pub fn new(id: &'static str, pattern: &str, risk_level: RiskLevel) -> Self {
        Self {
            id,
            pattern: Regex::new(pattern).expect("built-in rule pattern must compile"),
            risk_level,
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

impl Rule for PatternRule {
    fn id(&self) -> &str {
        self.id
    }

    fn evaluate(&self, command: &str, _context: &[String]) -> Option<RuleMatch> {
        if self.pattern.is_match(command) {
            Some(RuleMatch {
                risk_level: self.risk_level,
                suggestions: self.suggestions.clone(),
            })
        } else {
            None
        }
    }
}

fn is_root_target(operand: &str) -> bool {
    matches!(operand, "/" | "//" | "/*" | "/.")
}

fn is_wildcard_target(operand: &str) -> bool {
    operand == "*" || operand == "./*" || operand.ends_with("/*")
}

fn parse_recursive_delete(command: &str) -> Option<ParsedCommand> {
    let parsed = shellwords::parse(command)?;
    if parsed.program != "rm" && parsed.program != "/bin/rm" && parsed.program != "/usr/bin/rm" {
        return None;
    }
    if parsed.has_flag('r', "recursive") || parsed.has_flag('R', "recursive") {
        Some(parsed)
    } else {
        None
    }
}

/// Recursive delete aimed at the filesystem root.
pub struct RecursiveRootDeleteRule;

impl Rule for RecursiveRootDeleteRule {
    fn id(&self) -> &str {
        "recursive_root_delete"
    }

    fn evaluate(&self, command: &str, _context: &[String]) -> Option<RuleMatch> {
        let parsed = parse_recursive_delete(command)?;
        let aims_at_root = parsed.has_long_flag("no-preserve-root")
            || parsed.operands.iter().any(|op| is_root_target(op));
        if !aims_at_root {
            return None;
        }
        Some(
            RuleMatch::new(RiskLevel::Critical)
                .with_suggestion("Add -i to prompt before each removal")
                .with_suggestion("Target an explicit subdirectory instead of the filesystem root"),
        )
    }
}

/// Wildcard recursive delete issued right after a directory change.
/// On its own `rm -rf *` is caution-class; the preceding `cd` means the
/// user may not be where they think they are, so it escalates.
pub struct WildcardDeleteAfterCdRule;

impl Rule for WildcardDeleteAfterCdRule {
    fn id(&self) -> &str {
        "wildcard_delete_after_cd"
    }

    fn evaluate(&self, command: &str, context: &[String]) -> Option<RuleMatch> {
        let parsed = parse_recursive_delete(command)?;
        if !parsed.operands.iter().any(|op| is_wildcard_target(op)) {
            return None;
        }
        let after_cd = context
            .last()
            .map(|prev| {
                let prev = prev.trim();
                prev == "cd" || prev.starts_with("cd ") || prev.starts_with("pushd ")
            })
            .unwrap_or(false);
        if !after_cd {
            return None;
        }
        Some(
            RuleMatch::new(RiskLevel::Dangerous)
                .with_suggestion("Run pwd and ls first to confirm the current directory")
                .with_suggestion("Name the directory explicitly instead of using *"),
        )
    }
}

/// Any other recursive delete. Advisory at the default threshold.
pub struct RecursiveDeleteRule;

impl Rule for RecursiveDeleteRule {
    fn id(&self) -> &str {
        "recursive_delete"
    }

    fn evaluate(&self, command: &str, _context: &[String]) -> Option<RuleMatch> {
        let _ = parse_recursive_delete(command)?;
        Some(
            RuleMatch::new(RiskLevel::Caution)
                .with_suggestion("Add -i to prompt before each removal")
                .with_suggestion("Double-check the target path before confirming"),
        )
    }
}

/// Escalates when the session has produced a streak of caution-class
/// commands. Off by default; enabled per deployment.
pub struct CautionStreakRule {
    threshold: usize,
}

impl CautionStreakRule {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    fn is_caution_class(command: &str) -> bool {
        parse_recursive_delete(command).is_some()
    }
}

impl Rule for CautionStreakRule {
    fn id(&self) -> &str {
        "caution_streak"
    }

    fn evaluate(&self, command: &str, context: &[String]) -> Option<RuleMatch> {
        if self.threshold < 2 || !Self::is_caution_class(command) {
            return None;
        }
        let prior_needed = self.threshold - 1;
        if context.len() < prior_needed {
            return None;
        }
        let streak = context
            .iter()
            .rev()
            .take(prior_needed)
            .all(|c| Self::is_caution_class(c));
        if !streak {
            return None;
        }
        Some(
            RuleMatch::new(RiskLevel::Dangerous)
                .with_suggestion("Several destructive commands in a row; pause and review"),
        )
    }
}

/// The built-in ordered rule set. Specific destructive signatures come
/// first; generic categories follow. First match wins.
pub fn default_rules(config: &AnalyzerConfig) -> Vec<Box<dyn Rule>> {
    let mut rules: Vec<Box<dyn Rule>> = vec![
        Box::new(RecursiveRootDeleteRule),
        Box::new(
            PatternRule::new(
                "disk_format",
                r"(?i)\b(mkfs(\.\w+)?|wipefs|mkswap)\b",
                RiskLevel::Critical,
            )
            .with_suggestion("Formatting destroys all data on the device; verify the device name")
            .with_suggestion("Take a backup before reformatting"),
        ),
        Box::new(
            PatternRule::new(
                "device_overwrite",
                r"(?i)(\bdd\b[^|]*\bof=/dev/(sd|hd|vd|nvme|mmcblk)|>\s*/dev/(sd|hd|vd|nvme|mmcblk))",
                RiskLevel::Critical,
            )
            .with_suggestion("Writing directly to a block device is unrecoverable")
            .with_suggestion("Confirm the device with lsblk before proceeding"),
        ),
        Box::new(
            PatternRule::new(
                "fork_bomb",
                r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;|\(\)\s*\{[^}]*\|[^}]*&[^}]*\}\s*;",
                RiskLevel::Critical,
            )
            .with_suggestion("This recursively spawns processes until the system is exhausted"),
        ),
        Box::new(WildcardDeleteAfterCdRule),
        Box::new(
            PatternRule::new(
                "root_permission_sweep",
                r"(?i)\b(chmod|chown)\b\s+(-[a-z]*R[a-z]*\s+).*\s(/|/\*)\s*$",
                RiskLevel::Dangerous,
            )
            .with_suggestion("Recursive permission changes from / break system packages")
            .with_suggestion("Scope the change to the specific directory that needs it"),
        ),
        Box::new(
            PatternRule::new(
                "curl_pipe_shell",
                r"(?i)\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba|z|da|k)?sh\b",
                RiskLevel::Dangerous,
            )
            .with_suggestion("Download to a file and inspect it before executing")
            .with_suggestion("Pin the script to a checksum or known release"),
        ),
        Box::new(
            PatternRule::new(
                "system_power",
                r"(?i)^\s*(sudo\s+)?(shutdown|reboot|halt|poweroff)\b|(?i)^\s*(sudo\s+)?init\s+0\b",
                RiskLevel::Dangerous,
            )
            .with_suggestion("This takes the host down for every user and session"),
        ),
    ];

    // The streak rule escalates commands the generic recursive-delete
    // rule would otherwise claim at CAUTION, so it must be ordered
    // ahead of it.
    if config.caution_streak_enabled {
        rules.push(Box::new(CautionStreakRule::new(
            config.caution_streak_threshold,
        )));
    }

    rules.push(Box::new(RecursiveDeleteRule));
    rules.push(Box::new(
        PatternRule::new(
            "service_control",
            r"(?i)^\s*(sudo\s+)?(systemctl\s+(stop|disable|mask)|service\s+\S+\s+stop)\b",
            RiskLevel::Caution,
        )
        .with_suggestion("Confirm nothing depends on this service before stopping it"),
    ));

    rules
}
