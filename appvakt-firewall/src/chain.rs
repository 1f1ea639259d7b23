//! Packet-filter chain driver.
//!
//! Manages block rules inside a dedicated chain that the platform's global
//! inbound/outbound chains jump to. Rules bind to live process ids via the
//! owner match and carry a comment tag naming the application, so rules
//! whose process already exited stay attributable and can be swept out by
//! the numbered-listing fallback.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use appvakt_core::error::ControlError;
use appvakt_core::inventory::ProcessInventory;
use appvakt_core::process::ProcessHandle;
use appvakt_core::rule::{ManagedRule, RuleAction, RuleDirection};
use appvakt_core::target::ApplicationTarget;

use crate::backend::FirewallBackend;
use crate::command::{CommandOutput, CommandRunner};
use crate::privilege::PrivilegeGate;

const IPTABLES: &str = "iptables";
const TAG_PREFIX: &str = "appvakt:";
const BASE_CHAINS: [&str; 2] = ["INPUT", "OUTPUT"];

pub struct ChainBackend {
    chain: String,
    runner: Arc<dyn CommandRunner>,
    gate: PrivilegeGate,
    inventory: Arc<dyn ProcessInventory>,
}

impl ChainBackend {
    pub fn new(
        chain: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        gate: PrivilegeGate,
        inventory: Arc<dyn ProcessInventory>,
    ) -> Self {
        Self {
            chain: chain.into(),
            runner,
            gate,
            inventory,
        }
    }

    fn tag_for(&self, target: &ApplicationTarget) -> String {
        format!("{TAG_PREFIX}{}", target.name())
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, ControlError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run(IPTABLES, &args).await
    }

    async fn run_owned(&self, args: Vec<String>) -> Result<CommandOutput, ControlError> {
        self.runner.run(IPTABLES, &args).await
    }

    /// Typed view of the chain's current rules.
    ///
    /// A chain that does not exist yet holds no managed rules; that is not
    /// a failure.
    async fn chain_rules(&self) -> Result<Vec<ChainRule>, ControlError> {
        let listing = self.run(&["-S", &self.chain]).await?;
        if !listing.success() {
            debug!(chain = %self.chain, "chain not present, no managed rules");
            return Ok(Vec::new());
        }
        Ok(parse_save_listing(&self.chain, &listing.stdout))
    }

    /// Delete leftover tagged rows whose pid can no longer be looked up.
    ///
    /// Works off the numbered human-readable listing and deletes by index in
    /// descending order; ascending deletion shifts every subsequent index.
    async fn sweep_tagged_rows(&self, target: &ApplicationTarget) -> Result<(), ControlError> {
        let listing = self
            .run(&["-n", "-L", &self.chain, "--line-numbers"])
            .await?;
        if !listing.success() {
            debug!(chain = %self.chain, "numbered listing unavailable, nothing to sweep");
            return Ok(());
        }

        let marker = format!("/* {} */", self.tag_for(target));
        let mut indices: Vec<u32> = parse_numbered_listing(&listing.stdout)
            .into_iter()
            .filter(|row| row.line.contains(&marker))
            .map(|row| row.index)
            .collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));

        for index in indices {
            let deleted = self.run(&["-D", &self.chain, &index.to_string()]).await?;
            if !deleted.success() {
                return Err(rule_error(
                    target,
                    format!("deleting rule at index {}: {}", index, deleted.error_text()),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FirewallBackend for ChainBackend {
    async fn ensure_initialized(&self) -> Result<(), ControlError> {
        self.gate.require_elevated()?;

        // Existence is decided by name lookup, not a "did I already run"
        // flag, so a chain deleted out from under us gets recreated.
        let probe = self.run(&["-n", "-L", &self.chain]).await?;
        if !probe.success() {
            let created = self.run(&["-N", &self.chain]).await?;
            if !created.success() {
                return Err(ControlError::Initialization(format!(
                    "creating chain {}: {}",
                    self.chain,
                    created.error_text()
                )));
            }
        }

        for base in BASE_CHAINS {
            let check = self.run(&["-C", base, "-j", &self.chain]).await?;
            if check.success() {
                continue;
            }
            let inserted = self.run(&["-I", base, "-j", &self.chain]).await?;
            if !inserted.success() {
                return Err(ControlError::Initialization(format!(
                    "inserting jump from {base} to {}: {}",
                    self.chain,
                    inserted.error_text()
                )));
            }
        }
        Ok(())
    }

    async fn list_managed_rules(&self) -> Result<Vec<ManagedRule>, ControlError> {
        // The chain's listing shares the privileged rule-table handle used
        // for writes, so even reads need elevation on this variant.
        self.gate.require_elevated()?;

        let rules = self.chain_rules().await?;
        Ok(rules
            .into_iter()
            .map(|rule| {
                let program = self
                    .inventory
                    .find_by_pid(rule.pid)
                    .map(|handle| handle.executable_path);
                let direction = rule.direction();
                ManagedRule {
                    name: rule.name,
                    program,
                    pid: Some(rule.pid),
                    direction,
                    action: RuleAction::Block,
                }
            })
            .collect())
    }

    async fn add_block_rule(
        &self,
        target: &ApplicationTarget,
        live: &[ProcessHandle],
    ) -> Result<(), ControlError> {
        self.gate.require_elevated()?;

        if live.is_empty() {
            // Rules bind to process ids on this variant; there is nothing
            // to attach a rule to until the target runs.
            return Err(ControlError::TargetNotFound(format!(
                "no running process to bind rules for {}",
                target.canonical_path().display()
            )));
        }

        let existing = self.list_managed_rules().await?;
        let covered: HashSet<u32> = existing
            .iter()
            .filter(|rule| rule.is_attributable_to(target))
            .filter_map(|rule| rule.pid)
            .collect();

        let tag = self.tag_for(target);
        for handle in live {
            if covered.contains(&handle.pid) {
                continue;
            }
            let outbound = self
                .run_owned(insert_args(&self.chain, handle.pid, &tag, false))
                .await?;
            if !outbound.success() {
                return Err(rule_error(
                    target,
                    format!(
                        "outbound rule for pid {}: {}",
                        handle.pid,
                        outbound.error_text()
                    ),
                ));
            }
            let inbound = self
                .run_owned(insert_args(&self.chain, handle.pid, &tag, true))
                .await?;
            if !inbound.success() {
                return Err(rule_error(
                    target,
                    format!(
                        "outbound rule for pid {} installed, inbound rule failed: {}",
                        handle.pid,
                        inbound.error_text()
                    ),
                ));
            }
            debug!(pid = handle.pid, tag = %tag, "installed block rule pair");
        }
        Ok(())
    }

    async fn remove_block_rule(
        &self,
        target: &ApplicationTarget,
        live: &[ProcessHandle],
    ) -> Result<(), ControlError> {
        self.gate.require_elevated()?;

        let rules = self.chain_rules().await?;
        let live_pids: HashSet<u32> = live.iter().map(|handle| handle.pid).collect();
        for rule in &rules {
            if rule.name == target.name() && live_pids.contains(&rule.pid) {
                let deleted = self.run_owned(delete_args(&self.chain, rule)).await?;
                if !deleted.success() {
                    return Err(rule_error(
                        target,
                        format!(
                            "deleting rule for pid {}: {}",
                            rule.pid,
                            deleted.error_text()
                        ),
                    ));
                }
            }
        }

        self.sweep_tagged_rows(target).await
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

/// One pid-bound rule as stored in the managed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChainRule {
    pid: u32,
    name: String,
    established: bool,
}

impl ChainRule {
    fn direction(&self) -> RuleDirection {
        if self.established {
            RuleDirection::Inbound
        } else {
            RuleDirection::Outbound
        }
    }
}

fn rule_match_args(pid: u32, tag: &str, established: bool) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        "owner".to_string(),
        "--pid-owner".to_string(),
        pid.to_string(),
    ];
    if established {
        args.extend([
            "-m".to_string(),
            "state".to_string(),
            "--state".to_string(),
            "ESTABLISHED,RELATED".to_string(),
        ]);
    }
    args.extend([
        "-m".to_string(),
        "comment".to_string(),
        "--comment".to_string(),
        tag.to_string(),
        "-j".to_string(),
        "DROP".to_string(),
    ]);
    args
}

fn insert_args(chain: &str, pid: u32, tag: &str, established: bool) -> Vec<String> {
    let mut args = vec!["-I".to_string(), chain.to_string()];
    args.extend(rule_match_args(pid, tag, established));
    args
}

fn delete_args(chain: &str, rule: &ChainRule) -> Vec<String> {
    let mut args = vec!["-D".to_string(), chain.to_string()];
    args.extend(rule_match_args(
        rule.pid,
        &format!("{TAG_PREFIX}{}", rule.name),
        rule.established,
    ));
    args
}

/// Split a save-format line into tokens, honoring double quotes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in line.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse save-format output (`-S <chain>`) into typed rules.
///
/// Rows that do not carry this system's comment tag, or that are missing
/// the pid binding or the drop verdict, are skipped rather than reported.
fn parse_save_listing(chain: &str, output: &str) -> Vec<ChainRule> {
    let mut rules = Vec::new();
    for line in output.lines() {
        let tokens = tokenize(line);
        if tokens.len() < 2 || tokens[0] != "-A" || tokens[1] != chain {
            continue;
        }

        let mut pid = None;
        let mut name = None;
        let mut established = false;
        let mut drops = false;
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            match token.as_str() {
                "--pid-owner" => {
                    pid = iter.next().and_then(|value| value.parse::<u32>().ok());
                }
                "--comment" => {
                    name = iter
                        .next()
                        .and_then(|value| value.strip_prefix(TAG_PREFIX))
                        .map(|payload| payload.to_string());
                }
                "--state" | "--ctstate" => {
                    established = iter
                        .next()
                        .is_some_and(|value| value.contains("ESTABLISHED"));
                }
                "-j" => {
                    drops = iter.next().is_some_and(|value| value == "DROP");
                }
                _ => {}
            }
        }

        if let (Some(pid), Some(name), true) = (pid, name, drops) {
            rules.push(ChainRule {
                pid,
                name,
                established,
            });
        }
    }
    rules
}

/// A row of the numbered human-readable listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NumberedRow {
    index: u32,
    line: String,
}

/// Parse `-L <chain> --line-numbers` output into typed rows.
///
/// Header and separator lines have no leading rule number and are dropped;
/// nothing past this adapter ever sees the raw listing text.
fn parse_numbered_listing(output: &str) -> Vec<NumberedRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let index = parts.next()?.parse::<u32>().ok()?;
            Some(NumberedRow {
                index,
                line: line.to_string(),
            })
        })
        .collect()
}
