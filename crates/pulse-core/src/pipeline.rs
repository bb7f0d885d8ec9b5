//! Heartbeat-of-heartbeats chains.
//!
//! A [`Chain`] runs one [`Stage`] over each tier ledger in turn. The report
//! for tier *k* is rolled up, built into a heartbeat whose monitor is
//! `<name>.tier<k+1>`, and appended to tier *k+1*. The top tier is evaluated
//! but feeds nothing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::append::{append_heartbeat, AppendReport};
use crate::config::MonitorProfile;
use crate::error::PulseError;
use crate::heartbeat::HeartbeatBuilder;
use crate::ledger::{read_ledger, read_ledger_or_empty, LedgerScan};
use crate::report::{HealthReport, ReportKind};
use crate::rollup::Rollup;
use crate::status::{RiskLevel, Status};
use crate::window::{evaluate_window, WindowReport, WindowSpec};

/// Monitor name used when the profile has none.
pub const DEFAULT_CHAIN_MONITOR: &str = "pulse";

/// One evaluation step applied to a ledger.
pub trait Stage {
    /// Report produced per ledger.
    type Report: HealthReport + Serialize;

    /// Evaluate `scan` under `profile`.
    fn ingest(
        &self,
        scan: &LedgerScan,
        profile: &MonitorProfile,
        now: DateTime<Utc>,
    ) -> Self::Report;
}

/// Window evaluation as a chain stage.
#[derive(Debug, Clone, Copy)]
pub struct WindowStage {
    /// Window applied at every tier.
    pub spec: WindowSpec,
}

impl Stage for WindowStage {
    type Report = WindowReport;

    fn ingest(
        &self,
        scan: &LedgerScan,
        profile: &MonitorProfile,
        now: DateTime<Utc>,
    ) -> WindowReport {
        evaluate_window(scan, self.spec, profile, now)
    }
}

/// What happened at one tier.
#[derive(Debug, Clone, Serialize)]
pub struct ChainStep {
    /// Tier index, 0 for the base ledger.
    pub tier: usize,
    /// Ledger path.
    pub ledger: String,
    /// Profile name used at this tier.
    pub monitor: String,
    /// Stage report for this tier.
    pub report: Value,
    /// Rollup fed to the next tier; absent at the top.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollup: Option<Rollup>,
    /// Append into the next tier; absent at the top.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<AppendReport>,
}

/// Outcome of a chain run.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    /// Always [`ReportKind::Chain`].
    pub report: ReportKind,
    /// Evaluation time.
    pub generated_at: DateTime<Utc>,
    /// `as_of` of the base tier's report.
    pub as_of: Option<DateTime<Utc>>,
    /// Base monitor name.
    pub monitor: String,
    /// Number of tiers.
    pub tiers: usize,
    /// Heartbeats appended across all upper tiers.
    pub appended: usize,
    /// Per-tier steps, bottom up.
    pub steps: Vec<ChainStep>,
    /// Worst status over all tiers.
    pub status: Status,
    /// Risk summary of `status`.
    pub risk_level: RiskLevel,
    /// Number of strict reasons.
    pub strict_fail_count: usize,
    /// Tier reasons, prefixed `tier<k>:`.
    pub strict_fail_reasons: Vec<String>,
}

/// A chain report plus the error that stopped the chain, if any.
#[derive(Debug)]
pub struct ChainRun {
    /// Steps completed before any failure.
    pub report: ChainReport,
    /// Read or append failure above the base tier.
    pub failure: Option<PulseError>,
}

/// A stage run across a stack of tier ledgers.
#[derive(Debug, Clone)]
pub struct Chain<S> {
    stage: S,
    profile: MonitorProfile,
    ledgers: Vec<PathBuf>,
}

impl<S: Stage> Chain<S> {
    /// Chain `stage` over `ledgers`, base tier first. `profile` applies to
    /// the base tier; upper tiers use defaults with the same precedence.
    #[must_use]
    pub fn new(stage: S, profile: MonitorProfile, ledgers: Vec<PathBuf>) -> Self {
        Self {
            stage,
            profile,
            ledgers,
        }
    }

    fn monitor(&self) -> &str {
        self.profile.name.as_deref().unwrap_or(DEFAULT_CHAIN_MONITOR)
    }

    fn tier_profile(&self, tier: usize) -> MonitorProfile {
        if tier == 0 {
            let mut profile = self.profile.clone();
            profile.name = Some(self.monitor().to_string());
            return profile;
        }
        MonitorProfile {
            precedence: self.profile.precedence,
            ..MonitorProfile::named(format!("{}.tier{tier}", self.monitor()))
        }
    }

    /// Run every tier once.
    ///
    /// A read or append failure above the base tier stops the chain. The
    /// steps completed so far, including appends already written, are kept
    /// in the returned [`ChainRun`] next to the error.
    ///
    /// # Errors
    ///
    /// [`PulseError::InvalidShape`] with fewer than two ledgers,
    /// [`PulseError::MissingInput`] if the base ledger does not exist, or an
    /// I/O error from reading it.
    pub fn run(&self, now: DateTime<Utc>) -> Result<ChainRun, PulseError> {
        let Some(base) = self.ledgers.first() else {
            return Err(PulseError::InvalidShape {
                path: PathBuf::new(),
                reason: "a chain needs at least two ledgers".to_string(),
            });
        };
        if self.ledgers.len() < 2 {
            return Err(PulseError::InvalidShape {
                path: base.clone(),
                reason: "a chain needs at least two ledgers".to_string(),
            });
        }
        let base_scan = read_ledger(base)?;

        let mut report = ChainReport {
            report: ReportKind::Chain,
            generated_at: now,
            as_of: None,
            monitor: self.monitor().to_string(),
            tiers: self.ledgers.len(),
            appended: 0,
            steps: Vec::with_capacity(self.ledgers.len()),
            status: Status::Ok,
            risk_level: Status::Ok.risk_level(),
            strict_fail_count: 0,
            strict_fail_reasons: Vec::new(),
        };
        let failure = self.run_tiers(base_scan, &mut report, now).err();
        if let Some(err) = &failure {
            warn!(completed = report.steps.len(), error = %err, "chain stopped early");
        }
        report.risk_level = report.status.risk_level();
        report.strict_fail_count = report.strict_fail_reasons.len();
        Ok(ChainRun { report, failure })
    }

    fn run_tiers(
        &self,
        base_scan: LedgerScan,
        report: &mut ChainReport,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        let mut scan = base_scan;
        for (tier, ledger) in self.ledgers.iter().enumerate() {
            if tier > 0 {
                scan = read_ledger_or_empty(ledger)?;
            }
            let profile = self.tier_profile(tier);
            let tier_report = self.stage.ingest(&scan, &profile, now);
            if tier == 0 {
                report.as_of = tier_report.as_of();
            }
            report.status = report.status.max(tier_report.status());
            report.strict_fail_reasons.extend(
                tier_report
                    .strict_fail_reasons()
                    .iter()
                    .map(|reason| format!("tier{tier}:{reason}")),
            );
            debug!(tier, status = %tier_report.status(), "chain tier evaluated");

            let mut step = ChainStep {
                tier,
                ledger: ledger.display().to_string(),
                monitor: profile.name.unwrap_or_default(),
                report: serde_json::to_value(&tier_report)?,
                rollup: None,
                append: None,
            };
            let Some(next) = self.ledgers.get(tier + 1) else {
                report.steps.push(step);
                break;
            };
            let rollup = Rollup::from_report(&tier_report);
            let fed = self.feed(tier + 1, next, &rollup, now);
            step.rollup = Some(rollup);
            match fed {
                Ok(append) => {
                    if append.appended {
                        report.appended += 1;
                    }
                    step.append = Some(append);
                    report.steps.push(step);
                },
                Err(err) => {
                    report.steps.push(step);
                    return Err(err);
                },
            }
        }
        Ok(())
    }

    fn feed(
        &self,
        tier: usize,
        ledger: &Path,
        rollup: &Rollup,
        now: DateTime<Utc>,
    ) -> Result<AppendReport, PulseError> {
        let digest = rollup.to_digest()?;
        let profile = self.tier_profile(tier);
        let append = match HeartbeatBuilder::new(&profile).build(&digest, now) {
            Ok(record) => append_heartbeat(ledger, &record)?,
            Err(errors) => {
                warn!(tier, errors = ?errors, "rollup rejected by builder");
                AppendReport::rejected(ledger, errors)?
            },
        };
        Ok(append)
    }
}

impl HealthReport for ChainReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Chain
    }

    fn status(&self) -> Status {
        self.status
    }

    fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    fn as_of(&self) -> Option<DateTime<Utc>> {
        self.as_of
    }

    fn strict_fail_reasons(&self) -> &[String] {
        &self.strict_fail_reasons
    }

    fn rollup_scalars(&self) -> Map<String, Value> {
        let mut scalars = Map::new();
        scalars.insert("tiers".to_string(), Value::from(self.tiers));
        scalars
    }
}
