use std::collections::BTreeMap;

use crate::types::RecordOutcome;

/// Stats from one pipeline pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub fetched: u32,
    pub rejected_malformed: u32,
    pub rejected_by_filter: u32,
    pub skipped_duplicate: u32,
    pub uploaded: u32,
    pub failed: u32,
    pub deferred: u32,
    pub upload_attempts: u32,
    pub matched_by_rule: BTreeMap<String, u32>,
}

impl PassStats {
    /// Fold one record's terminal state into the pass totals.
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.fetched += 1;
        match outcome {
            RecordOutcome::Malformed => self.rejected_malformed += 1,
            RecordOutcome::Rejected => self.rejected_by_filter += 1,
            RecordOutcome::Duplicate => self.skipped_duplicate += 1,
            RecordOutcome::Deferred => self.deferred += 1,
            RecordOutcome::Uploaded {
                matched_rules,
                attempts,
            } => {
                self.uploaded += 1;
                self.upload_attempts += attempts;
                self.count_rules(matched_rules);
            }
            RecordOutcome::Failed {
                matched_rules,
                attempts,
            } => {
                self.failed += 1;
                self.upload_attempts += attempts;
                self.count_rules(matched_rules);
            }
        }
    }

    fn count_rules(&mut self, rules: &[String]) {
        for rule in rules {
            *self.matched_by_rule.entry(rule.clone()).or_default() += 1;
        }
    }

    /// Every fetched record sits in exactly one terminal bucket.
    pub fn is_balanced(&self) -> bool {
        self.fetched
            == self.rejected_malformed
                + self.rejected_by_filter
                + self.skipped_duplicate
                + self.uploaded
                + self.failed
                + self.deferred
    }
}

impl std::fmt::Display for PassStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Pipeline Pass Complete ===")?;
        writeln!(f, "Fetched:            {}", self.fetched)?;
        writeln!(f, "Rejected malformed: {}", self.rejected_malformed)?;
        writeln!(f, "Rejected by filter: {}", self.rejected_by_filter)?;
        writeln!(f, "Skipped duplicate:  {}", self.skipped_duplicate)?;
        writeln!(f, "Uploaded:           {}", self.uploaded)?;
        writeln!(f, "Failed:             {}", self.failed)?;
        if self.deferred > 0 {
            writeln!(f, "Deferred:           {}", self.deferred)?;
        }
        writeln!(f, "Upload attempts:    {}", self.upload_attempts)?;
        if !self.matched_by_rule.is_empty() {
            writeln!(f, "\nBy rule:")?;
            for (rule, count) in &self.matched_by_rule {
                writeln!(f, "  {rule}: {count}")?;
            }
        }
        Ok(())
    }
}
