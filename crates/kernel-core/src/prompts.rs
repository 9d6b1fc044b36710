//! Human-readable text for contextual events. The engine only consumes the strings.

use std::collections::BTreeMap;

use contracts::ResourceView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestResult<'a> {
    pub agent_id: &'a str,
    pub submitted: u64,
    pub collected: u64,
    pub pool_before: u64,
    pub pool_after: u64,
    pub suspended: bool,
}

pub trait PromptTextProvider {
    fn pool_quantity(&self, pool_quantity: u64) -> String;

    fn harvest_result(&self, result: HarvestResult<'_>) -> String;

    fn universalization(&self, threshold: u64) -> String;

    /// `report` is keyed by display name.
    fn harvest_report(&self, report: &BTreeMap<String, ResourceView>) -> String;
}

/// Lake-and-fish wording used unless a driver supplies its own provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPrompts;

impl PromptTextProvider for StandardPrompts {
    fn pool_quantity(&self, pool_quantity: u64) -> String {
        format!("Before everyone fishes, there are {pool_quantity} tons of fish in the lake.")
    }

    fn harvest_result(&self, result: HarvestResult<'_>) -> String {
        if result.suspended {
            return format!(
                "I was suspended this month and caught no fish. The lake went from {} to {} tons.",
                result.pool_before, result.pool_after
            );
        }
        format!(
            "I wanted to catch {} tons of fish and caught {} tons. \
             The lake went from {} to {} tons.",
            result.submitted, result.collected, result.pool_before, result.pool_after
        )
    }

    fn universalization(&self, threshold: u64) -> String {
        format!(
            "Given the current situation, if everyone fishes more than {threshold} \
             every month, the lake will eventually be empty."
        )
    }

    fn harvest_report(&self, report: &BTreeMap<String, ResourceView>) -> String {
        let entries = report
            .iter()
            .map(|(name, view)| format!("{name}: {view}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Monthly harvest report: {{{entries}}}")
    }
}
