use std::collections::HashSet;

/// Whether a worker declaring `capabilities` may execute a job that lists
/// `requires`. True iff every required tag is declared; a job with no
/// requirements is eligible for any worker.
///
/// This is the only routing rule. Ties among eligible jobs are broken by
/// ascending `created_at` in the store's claim selection; there is no
/// priority ordering.
pub fn eligible(requires: &HashSet<String>, capabilities: &HashSet<String>) -> bool {
    requires.is_subset(capabilities)
}
