//! Built-in smoke checks.
//!
//! A short battery run against fresh sandboxes: a few expressions every
//! build must agree on, then the time and randomness behavior the policy
//! variant promises.

use corral_sandbox::{EnvironmentPolicy, Sandbox, SandboxConfig, SandboxError, Variant};
use serde::Serialize;

/// Expressions every variant must evaluate the same way
const COMMON_CASES: [(&str, &str); 5] = [
    ("1 + 2", "3"),
    ("'hello' + ' ' + 'world'", "hello world"),
    ("Math.sqrt(16)", "4"),
    ("JSON.stringify({a: 1})", r#"{"a":1}"#),
    ("var x = 10; x * 2", "20"),
];

/// Earliest wall-clock reading accepted as real, 2023-11-14
const REAL_TIME_FLOOR_MS: f64 = 1_700_000_000_000.0;

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeCase {
    /// What was checked
    pub name: String,
    /// Whether it held
    pub passed: bool,
    /// Observed output
    pub detail: String,
}

/// Outcome of a smoke run
#[derive(Debug, Clone, Serialize)]
pub struct SmokeReport {
    /// Variant under test
    pub variant: Variant,
    /// Checks in run order
    pub cases: Vec<SmokeCase>,
}

impl SmokeReport {
    /// Whether every check held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|case| case.passed)
    }

    fn check(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) {
        let case = SmokeCase {
            name: name.into(),
            passed,
            detail: detail.into(),
        };
        tracing::debug!(name = %case.name, passed, detail = %case.detail, "smoke check");
        self.cases.push(case);
    }
}

/// Run the battery under `policy`
///
/// # Errors
///
/// Returns error if a sandbox cannot be created with `config`
pub fn run(config: &SandboxConfig, policy: &EnvironmentPolicy) -> Result<SmokeReport, SandboxError> {
    let mut report = SmokeReport {
        variant: policy.variant(),
        cases: Vec::new(),
    };
    let mut sandbox = Sandbox::with_policy(config.clone(), policy.clone())?;

    for (source, expected) in COMMON_CASES {
        let outcome = describe(sandbox.eval(source));
        report.check(source, outcome == expected, outcome);
    }

    match policy.variant() {
        Variant::Inert => {
            let now = describe(sandbox.eval("Date.now()"));
            report.check("Date.now() is 0", now == "0", now);

            let first = first_random(config, policy)?;
            let second = first_random(config, policy)?;
            let passed = first == second;
            report.check(
                "Math.random() repeats across sandboxes",
                passed,
                format!("{first} / {second}"),
            );
        }
        Variant::HostBacked => {
            let now = describe(sandbox.eval("Date.now()"));
            let passed = now
                .parse::<f64>()
                .is_ok_and(|ms| ms.fract() == 0.0 && ms > REAL_TIME_FLOOR_MS);
            report.check("Date.now() reads the real clock", passed, now);

            let first = describe(sandbox.eval("Math.random()"));
            let second = describe(sandbox.eval("Math.random()"));
            report.check(
                "Math.random() varies",
                first != second,
                format!("{first} / {second}"),
            );
        }
    }

    for global in ["load('x')", "setTimeout(function () {}, 0)", "clearTimeout(0)"] {
        let outcome = describe(sandbox.eval(global));
        report.check(
            format!("{global} throws"),
            outcome.starts_with("error: TypeError"),
            outcome,
        );
    }

    Ok(report)
}

fn first_random(config: &SandboxConfig, policy: &EnvironmentPolicy) -> Result<String, SandboxError> {
    let mut sandbox = Sandbox::with_policy(config.clone(), policy.clone())?;
    Ok(describe(sandbox.eval("Math.random()")))
}

fn describe<T: std::fmt::Display, E: std::fmt::Display>(outcome: Result<T, E>) -> String {
    match outcome {
        Ok(text) => text.to_string(),
        Err(err) => format!("error: {err}"),
    }
}
