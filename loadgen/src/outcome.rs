use std::fmt;

use anyhow::Result;

/// One identifier that did not make it, with the flattened error chain.
#[derive(Debug, Clone)]
pub struct Failure {
    pub name: String,
    pub reason: String,
}

/// Aggregate outcome of a bulk operation. Bulk loops record every
/// per-identifier result here instead of silently continuing, so the final
/// summary can tell "0 succeeded" apart from "199 of 200 succeeded".
#[derive(Debug, Default)]
pub struct RunReport {
    pub ok: usize,
    pub failures: Vec<Failure>,
}

impl RunReport {
    pub fn record(&mut self, name: &str, result: Result<()>) {
        match result {
            Ok(()) => self.ok += 1,
            Err(e) => self.failures.push(Failure {
                name: name.to_string(),
                reason: format!("{:#}", e),
            }),
        }
    }

    pub fn attempted(&self) -> usize {
        self.ok + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: RunReport) {
        self.ok += other.ok;
        self.failures.extend(other.failures);
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} succeeded", self.ok, self.attempted())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn partial_failure_is_not_total_failure() {
        let mut report = RunReport::default();
        for i in 0..199 {
            report.record(&format!("ns-{}", i), Ok(()));
        }
        report.record("ns-199", Err(anyhow!("admission webhook denied")));

        assert_eq!(report.attempted(), 200);
        assert!(!report.is_success());
        assert_eq!(report.to_string(), "199 of 200 succeeded");
        assert_eq!(report.failures[0].name, "ns-199");
        assert!(report.failures[0].reason.contains("denied"));
    }

    #[test]
    fn merge_accumulates_both_sides() {
        let mut a = RunReport::default();
        a.record("x", Ok(()));
        let mut b = RunReport::default();
        b.record("y", Err(anyhow!("boom")));
        a.merge(b);
        assert_eq!(a.ok, 1);
        assert_eq!(a.failures.len(), 1);
    }
}
