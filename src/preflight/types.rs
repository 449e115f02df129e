//! Preflight check results for image builds.

/// Outcome of one check (engine reachable, manifest valid, ...).
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// `slipway build` would stop on this.
    Fail,
    /// Builds proceed, but the operator should look.
    Warn,
}

impl CheckStatus {
    fn label(self) -> (&'static str, &'static str) {
        match self {
            CheckStatus::Pass => ("✓", "PASS"),
            CheckStatus::Fail => ("✗", "FAIL"),
            CheckStatus::Warn => ("⚠", "WARN"),
        }
    }
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, details: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            status,
            details: details.map(str::to_string),
        }
    }

    pub fn pass(name: &str) -> Self {
        Self::new(name, CheckStatus::Pass, None)
    }

    pub fn pass_with(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Pass, Some(details))
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Fail, Some(details))
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Warn, Some(details))
    }

    fn line(&self) -> String {
        let (icon, label) = self.status.label();
        match &self.details {
            Some(details) => format!("  {} [{}] {}: {}", icon, label, self.name, details),
            None => format!("  {} [{}] {}", icon, label, self.name),
        }
    }
}

/// Every check from one `slipway preflight` run.
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// True when nothing would stop a build. Warnings do not count.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");
        for check in &self.checks {
            println!("{}", check.line());
        }

        println!();
        println!(
            "Summary: {}/{} passed",
            self.count(CheckStatus::Pass),
            self.checks.len()
        );
        match self.fail_count() {
            0 => {}
            n => println!("         {} FAILED - slipway build will stop early", n),
        }
        match self.warn_count() {
            0 => {}
            n => println!("         {} warnings", n),
        }
    }
}
