//! Rule-table driver.
//!
//! Manages named rules directly against the platform's firewall rule table.
//! Rules bind to the program path, so one outbound/inbound pair covers every
//! current and future process instance of the target, and queries need no
//! elevation because they shell out to an unprivileged listing command.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use appvakt_core::error::ControlError;
use appvakt_core::process::ProcessHandle;
use appvakt_core::rule::{ManagedRule, RuleAction, RuleDirection};
use appvakt_core::target::ApplicationTarget;

use crate::backend::FirewallBackend;
use crate::command::{CommandOutput, CommandRunner};
use crate::privilege::PrivilegeGate;

const NETSH: &str = "netsh";
const INBOUND_SUFFIX: &str = "-In";

pub struct TableBackend {
    prefix: String,
    runner: Arc<dyn CommandRunner>,
    gate: PrivilegeGate,
}

impl TableBackend {
    pub fn new(
        prefix: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        gate: PrivilegeGate,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            runner,
            gate,
        }
    }

    fn rule_name(&self, target: &ApplicationTarget, direction: RuleDirection) -> String {
        match direction {
            RuleDirection::Outbound => format!("{}{}", self.prefix, target.name()),
            RuleDirection::Inbound => {
                format!("{}{}{INBOUND_SUFFIX}", self.prefix, target.name())
            }
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<CommandOutput, ControlError> {
        self.runner.run(NETSH, &args).await
    }

    async fn add_rule(
        &self,
        target: &ApplicationTarget,
        direction: RuleDirection,
    ) -> Result<CommandOutput, ControlError> {
        let dir = match direction {
            RuleDirection::Outbound => "dir=out",
            RuleDirection::Inbound => "dir=in",
        };
        self.run(vec![
            "advfirewall".into(),
            "firewall".into(),
            "add".into(),
            "rule".into(),
            format!("name={}", self.rule_name(target, direction)),
            dir.into(),
            "action=block".into(),
            format!("program={}", target.canonical_path().display()),
            "enable=yes".into(),
            "profile=any".into(),
        ])
        .await
    }

    async fn delete_rule(
        &self,
        target: &ApplicationTarget,
        direction: RuleDirection,
    ) -> Result<CommandOutput, ControlError> {
        self.run(vec![
            "advfirewall".into(),
            "firewall".into(),
            "delete".into(),
            "rule".into(),
            format!("name={}", self.rule_name(target, direction)),
            format!("program={}", target.canonical_path().display()),
        ])
        .await
    }
}

#[async_trait]
impl FirewallBackend for TableBackend {
    async fn ensure_initialized(&self) -> Result<(), ControlError> {
        self.gate.require_elevated()?;

        // The rule table needs no setup of our own; probe that the firewall
        // service answers at all.
        let probe = self
            .run(vec![
                "advfirewall".into(),
                "show".into(),
                "currentprofile".into(),
            ])
            .await
            .map_err(|e| ControlError::Initialization(format!("firewall tool unavailable: {e}")))?;
        if !probe.success() {
            return Err(ControlError::Initialization(format!(
                "firewall service probe failed: {}",
                probe.error_text()
            )));
        }
        Ok(())
    }

    async fn list_managed_rules(&self) -> Result<Vec<ManagedRule>, ControlError> {
        let listing = self
            .run(vec![
                "advfirewall".into(),
                "firewall".into(),
                "show".into(),
                "rule".into(),
                "name=all".into(),
                "verbose".into(),
            ])
            .await?;
        if !listing.success() {
            return Err(ControlError::Initialization(format!(
                "rule table listing failed: {}",
                listing.error_text()
            )));
        }
        Ok(parse_rule_table(&self.prefix, &listing.stdout))
    }

    async fn add_block_rule(
        &self,
        target: &ApplicationTarget,
        _live: &[ProcessHandle],
    ) -> Result<(), ControlError> {
        self.gate.require_elevated()?;

        // Path binding covers future process instances, so an existing pair
        // means there is nothing to add.
        let existing = self.list_managed_rules().await?;
        if existing
            .iter()
            .any(|rule| rule.is_attributable_to(target) && rule.action == RuleAction::Block)
        {
            return Ok(());
        }

        let outbound = self.add_rule(target, RuleDirection::Outbound).await?;
        if !outbound.success() {
            return Err(rule_error(
                target,
                format!("outbound rule: {}", outbound.error_text()),
            ));
        }
        let inbound = self.add_rule(target, RuleDirection::Inbound).await?;
        if !inbound.success() {
            return Err(rule_error(
                target,
                format!(
                    "outbound rule installed, inbound rule failed: {}",
                    inbound.error_text()
                ),
            ));
        }
        debug!(program = %target, "installed path-bound block rule pair");
        Ok(())
    }

    async fn remove_block_rule(
        &self,
        target: &ApplicationTarget,
        _live: &[ProcessHandle],
    ) -> Result<(), ControlError> {
        self.gate.require_elevated()?;

        let existing = self.list_managed_rules().await?;
        if !existing.iter().any(|rule| rule.is_attributable_to(target)) {
            return Ok(());
        }

        for direction in [RuleDirection::Outbound, RuleDirection::Inbound] {
            let deleted = self.delete_rule(target, direction).await?;
            if !deleted.success() && !no_rules_match(&deleted) {
                return Err(rule_error(
                    target,
                    format!(
                        "deleting {} rule: {}",
                        match direction {
                            RuleDirection::Outbound => "outbound",
                            RuleDirection::Inbound => "inbound",
                        },
                        deleted.error_text()
                    ),
                ));
            }
        }
        Ok(())
    }

    async fn is_blocked(&self, target: &ApplicationTarget) -> Result<bool, ControlError> {
        let rules = self.list_managed_rules().await?;
        Ok(rules
            .iter()
            .any(|rule| rule.is_attributable_to(target) && rule.action == RuleAction::Block))
    }
}

fn rule_error(target: &ApplicationTarget, reason: String) -> ControlError {
    ControlError::RuleCreation {
        target: target.canonical_path().display().to_string(),
        reason,
    }
}

/// A pair of deletes where one half was already gone is still a clean
/// removal.
fn no_rules_match(output: &CommandOutput) -> bool {
    output.stdout.contains("No rules match") || output.stderr.contains("No rules match")
}

/// Parse the rule-table listing into managed rules.
///
/// Only blocks whose rule name carries our prefix are considered; rows with
/// the tag but missing program, direction or action fields are omitted, not
/// errored. The inbound pair member is recognized by its name suffix when
/// the direction field is absent.
fn parse_rule_table(prefix: &str, output: &str) -> Vec<ManagedRule> {
    struct Row {
        raw_name: String,
        direction: Option<RuleDirection>,
        program: Option<PathBuf>,
        action: Option<RuleAction>,
    }

    fn finish(prefix: &str, row: Row) -> Option<ManagedRule> {
        let payload = row.raw_name.strip_prefix(prefix)?;
        let (name, suffix_direction) = match payload.strip_suffix(INBOUND_SUFFIX) {
            Some(base) => (base.to_string(), Some(RuleDirection::Inbound)),
            None => (payload.to_string(), Some(RuleDirection::Outbound)),
        };
        Some(ManagedRule {
            name,
            program: Some(row.program?),
            pid: None,
            direction: row.direction.or(suffix_direction)?,
            action: row.action?,
        })
    }

    let mut rules = Vec::new();
    let mut current: Option<Row> = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Rule Name:") {
            if let Some(row) = current.take() {
                rules.extend(finish(prefix, row));
            }
            current = Some(Row {
                raw_name: value.trim().to_string(),
                direction: None,
                program: None,
                action: None,
            });
        } else if let Some(row) = current.as_mut() {
            if let Some(value) = line.strip_prefix("Direction:") {
                row.direction = match value.trim() {
                    "In" => Some(RuleDirection::Inbound),
                    "Out" => Some(RuleDirection::Outbound),
                    _ => None,
                };
            } else if let Some(value) = line.strip_prefix("Program:") {
                let value = value.trim();
                if !value.is_empty() {
                    row.program = Some(PathBuf::from(value));
                }
            } else if let Some(value) = line.strip_prefix("Action:") {
                row.action = match value.trim() {
                    "Block" => Some(RuleAction::Block),
                    "Allow" => Some(RuleAction::Allow),
                    _ => None,
                };
            }
        }
    }
    if let Some(row) = current.take() {
        rules.extend(finish(prefix, row));
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const PREFIX: &str = "Appvakt-";

    #[test]
    fn rule_table_parsing_keeps_only_tagged_complete_rows() {
        let output = "\
Rule Name:                            Appvakt-curl
----------------------------------------------------------------------
Enabled:                              Yes
Direction:                            Out
Program:                              /usr/bin/curl
Action:                               Block

Rule Name:                            Appvakt-curl-In
----------------------------------------------------------------------
Enabled:                              Yes
Direction:                            In
Program:                              /usr/bin/curl
Action:                               Block

Rule Name:                            CoreNetworking-DHCP
----------------------------------------------------------------------
Direction:                            Out
Action:                               Allow

Rule Name:                            Appvakt-broken
----------------------------------------------------------------------
Direction:                            Out
";
        let rules = parse_rule_table(PREFIX, output);
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.name == "curl"));
        assert!(rules.iter().all(|r| r.pid.is_none()));
        assert!(rules.iter().any(|r| r.direction == RuleDirection::Inbound));
        assert!(rules.iter().any(|r| r.direction == RuleDirection::Outbound));
    }

    /// In-memory rule table speaking just enough of the tool's dialect.
    struct FakeRuleTable {
        rules: Mutex<Vec<FakeRule>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[derive(Clone)]
    struct FakeRule {
        name: String,
        direction: &'static str,
        action: &'static str,
        program: Option<String>,
    }

    impl FakeRuleTable {
        fn new() -> Self {
            Self {
                rules: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn seed(&self, name: &str, direction: &'static str, action: &'static str, program: Option<&str>) {
            self.rules.lock().push(FakeRule {
                name: name.to_string(),
                direction,
                action,
                program: program.map(|p| p.to_string()),
            });
        }

        fn names(&self) -> Vec<String> {
            self.rules.lock().iter().map(|r| r.name.clone()).collect()
        }

        fn render(&self) -> String {
            let mut out = String::new();
            for rule in self.rules.lock().iter() {
                out.push_str(&format!(
                    "Rule Name:                            {}\n\
                     ----------------------------------------------------------------------\n\
                     Enabled:                              Yes\n\
                     Direction:                            {}\n",
                    rule.name, rule.direction
                ));
                if let Some(program) = &rule.program {
                    out.push_str(&format!(
                        "Program:                              {program}\n"
                    ));
                }
                out.push_str(&format!(
                    "Action:                               {}\n\n",
                    rule.action
                ));
            }
            out
        }

        fn field<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
            args.iter().find_map(|arg| arg.strip_prefix(key))
        }

        fn ok(stdout: String) -> CommandOutput {
            CommandOutput {
                status: Some(0),
                stdout,
                stderr: String::new(),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRuleTable {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
        ) -> Result<CommandOutput, ControlError> {
            self.calls.lock().push(args.to_vec());
            let output = match args {
                [a, s, c] if a == "advfirewall" && s == "show" && c == "currentprofile" => {
                    Self::ok("Domain Profile Settings:\nState  ON\n".into())
                }
                [a, f, s, r, ..] if a == "advfirewall" && f == "firewall" && s == "show" && r == "rule" => {
                    Self::ok(self.render())
                }
                [a, f, verb, r, rest @ ..] if a == "advfirewall" && f == "firewall" && verb == "add" && r == "rule" => {
                    let name = Self::field(rest, "name=").unwrap().to_string();
                    let direction = match Self::field(rest, "dir=") {
                        Some("in") => "In",
                        _ => "Out",
                    };
                    let action = match Self::field(rest, "action=") {
                        Some("block") => "Block",
                        _ => "Allow",
                    };
                    let program = Self::field(rest, "program=").map(|p| p.to_string());
                    self.rules.lock().push(FakeRule {
                        name,
                        direction,
                        action,
                        program,
                    });
                    Self::ok("Ok.\n".into())
                }
                [a, f, verb, r, rest @ ..] if a == "advfirewall" && f == "firewall" && verb == "delete" && r == "rule" => {
                    let name = Self::field(rest, "name=").unwrap();
                    let program = Self::field(rest, "program=");
                    let mut rules = self.rules.lock();
                    let before = rules.len();
                    rules.retain(|rule| {
                        rule.name != name
                            || program.is_some_and(|p| rule.program.as_deref() != Some(p))
                    });
                    if rules.len() == before {
                        CommandOutput {
                            status: Some(1),
                            stdout: "No rules match the specified criteria.\n".into(),
                            stderr: String::new(),
                        }
                    } else {
                        Self::ok(format!("Deleted {} rule(s).\nOk.\n", before - rules.len()))
                    }
                }
                _ => CommandOutput {
                    status: Some(1),
                    stdout: String::new(),
                    stderr: "unhandled invocation".into(),
                },
            };
            Ok(output)
        }
    }

    struct Fixture {
        backend: TableBackend,
        fake: Arc<FakeRuleTable>,
        target: ApplicationTarget,
        live: Vec<ProcessHandle>,
        _dir: tempfile::TempDir,
    }

    fn fixture(file_name: &str, pids: &[u32]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(file_name);
        std::fs::write(&file, b"").unwrap();
        let target = ApplicationTarget::resolve(&file).unwrap();

        let live = pids
            .iter()
            .map(|pid| ProcessHandle::new(*pid, target.canonical_path()))
            .collect();

        let fake = Arc::new(FakeRuleTable::new());
        let backend = TableBackend::new(PREFIX, fake.clone(), PrivilegeGate::always_elevated());
        Fixture {
            backend,
            fake,
            target,
            live,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn one_rule_pair_regardless_of_instance_count() {
        let f = fixture("curl", &[101, 202, 303]);
        f.backend.ensure_initialized().await.unwrap();
        f.backend.add_block_rule(&f.target, &f.live).await.unwrap();

        let names = f.fake.names();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&format!("{PREFIX}curl")));
        assert!(names.contains(&format!("{PREFIX}curl{INBOUND_SUFFIX}")));
    }

    #[tokio::test]
    async fn double_block_installs_no_duplicates() {
        let f = fixture("curl", &[101]);
        f.backend.add_block_rule(&f.target, &f.live).await.unwrap();
        f.backend.add_block_rule(&f.target, &f.live).await.unwrap();
        assert_eq!(f.fake.names().len(), 2);
    }

    #[tokio::test]
    async fn block_then_unblock_round_trips_clean() {
        let f = fixture("curl", &[101]);
        f.backend.add_block_rule(&f.target, &f.live).await.unwrap();
        assert!(f.backend.is_blocked(&f.target).await.unwrap());

        f.backend
            .remove_block_rule(&f.target, &f.live)
            .await
            .unwrap();
        assert!(!f.backend.is_blocked(&f.target).await.unwrap());
        assert!(f.backend.list_managed_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn block_without_live_process_binds_to_the_path() {
        // Path binding has no live-process requirement.
        let f = fixture("curl", &[]);
        f.backend.add_block_rule(&f.target, &[]).await.unwrap();
        assert!(f.backend.is_blocked(&f.target).await.unwrap());
    }

    #[tokio::test]
    async fn unblock_without_any_rule_is_a_no_op_success() {
        let f = fixture("curl", &[]);
        f.backend.remove_block_rule(&f.target, &[]).await.unwrap();
        // Nothing was attributable, so no delete was ever issued.
        assert!(f
            .fake
            .calls
            .lock()
            .iter()
            .all(|args| args.iter().all(|arg| arg != "delete")));
    }

    #[tokio::test]
    async fn unblock_without_live_process_removes_path_bound_rules() {
        let f = fixture("curl", &[]);
        f.backend.add_block_rule(&f.target, &[]).await.unwrap();
        f.backend.remove_block_rule(&f.target, &[]).await.unwrap();
        assert!(f.fake.names().is_empty());
    }

    #[tokio::test]
    async fn foreign_rules_stay_invisible_and_untouched() {
        let f = fixture("curl", &[101]);
        f.fake
            .seed("CoreNetworking-DHCP", "Out", "Allow", Some("svchost"));

        assert!(f.backend.list_managed_rules().await.unwrap().is_empty());
        f.backend.add_block_rule(&f.target, &f.live).await.unwrap();
        f.backend
            .remove_block_rule(&f.target, &f.live)
            .await
            .unwrap();
        assert_eq!(f.fake.names(), vec!["CoreNetworking-DHCP".to_string()]);
    }

    #[tokio::test]
    async fn same_file_name_from_another_directory_is_not_ours() {
        let f = fixture("curl", &[101]);
        f.fake.seed(
            &format!("{PREFIX}curl"),
            "Out",
            "Block",
            Some("/somewhere/else/curl"),
        );
        assert!(!f.backend.is_blocked(&f.target).await.unwrap());
    }
}
