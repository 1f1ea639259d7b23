//! Managed firewall rule model.

use std::path::PathBuf;

use serde::Serialize;

use crate::target::ApplicationTarget;

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Inbound,
    Outbound,
}

/// What a rule does with matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Block,
    Allow,
}

/// One platform-native firewall rule created by this system.
///
/// Managed rules are distinguishable from user and system rules by a stable
/// tagging convention: a rule-name prefix on the rule-table driver, a
/// comment tag plus a pid-bound owner match on the chain driver. `program`
/// is the resolved executable path when the binding still names a live
/// process (or when the rule binds to a path directly); `pid` is set only
/// for pid-bound rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedRule {
    pub name: String,
    pub program: Option<PathBuf>,
    pub pid: Option<u32>,
    pub direction: RuleDirection,
    pub action: RuleAction,
}

impl ManagedRule {
    /// Whether this rule belongs to `target`.
    ///
    /// Resolution prefers the program path when it is known; rules whose
    /// process already exited fall back to the tag name.
    pub fn is_attributable_to(&self, target: &ApplicationTarget) -> bool {
        match &self.program {
            Some(program) => program == target.canonical_path(),
            None => self.name == target.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_for(file_name: &str) -> (tempfile::TempDir, ApplicationTarget) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(file_name);
        std::fs::write(&file, b"").unwrap();
        let target = ApplicationTarget::resolve(&file).unwrap();
        (dir, target)
    }

    #[test]
    fn attribution_prefers_program_path() {
        let (_dir, target) = target_for("curl");
        let rule = ManagedRule {
            name: "curl".into(),
            program: Some(PathBuf::from("/somewhere/else/curl")),
            pid: Some(4821),
            direction: RuleDirection::Outbound,
            action: RuleAction::Block,
        };
        // Same file name, different binary: not ours.
        assert!(!rule.is_attributable_to(&target));
    }

    #[test]
    fn attribution_falls_back_to_tag_name() {
        let (_dir, target) = target_for("curl");
        let rule = ManagedRule {
            name: "curl".into(),
            program: None,
            pid: Some(4821),
            direction: RuleDirection::Inbound,
            action: RuleAction::Block,
        };
        assert!(rule.is_attributable_to(&target));
    }
}
