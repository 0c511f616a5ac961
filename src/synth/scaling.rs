//! Autoscaling merge and validation for a family.
//!
//! Folds the per-service scaling declarations into one family-level
//! policy set: capacity range by union, numeric tracking targets by
//! minimum, boolean flags by logical OR, step bands validated and sorted,
//! scheduled actions by replacement.

use tracing::warn;

use crate::compose::{parse_range, ScalingSpec, ScheduledActionSpec, StepSpec, TargetScalingSpec};
use crate::error::{ComposeError, Result, StacksmithError, SynthError};

/// Default scale-in cooldown, seconds.
const DEFAULT_SCALE_IN_COOLDOWN: u32 = 300;

/// Default scale-out cooldown, seconds.
const DEFAULT_SCALE_OUT_COOLDOWN: u32 = 60;

/// Merged target-tracking configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTracking {
    /// Average CPU utilization target, percent.
    pub cpu_target: Option<u32>,
    /// Average memory utilization target, percent.
    pub memory_target: Option<u32>,
    /// Request count per load-balancer target.
    pub targets_count: Option<u32>,
    /// Disables scale-in on the tracking policies.
    pub disable_scale_in: bool,
    /// Scale-in cooldown, seconds.
    pub scale_in_cooldown: u32,
    /// Scale-out cooldown, seconds.
    pub scale_out_cooldown: u32,
}

impl Default for TargetTracking {
    fn default() -> Self {
        Self {
            cpu_target: None,
            memory_target: None,
            targets_count: None,
            disable_scale_in: false,
            scale_in_cooldown: DEFAULT_SCALE_IN_COOLDOWN,
            scale_out_cooldown: DEFAULT_SCALE_OUT_COOLDOWN,
        }
    }
}

impl TargetTracking {
    /// Whether any tracking metric is configured.
    #[must_use]
    pub const fn has_metrics(&self) -> bool {
        self.cpu_target.is_some() || self.memory_target.is_some() || self.targets_count.is_some()
    }
}

/// The merged family scaling policy set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyScaling {
    /// Capacity range `(min, max)`.
    pub min_capacity: u32,
    /// Maximum capacity; may be raised to cover the top scaling step.
    pub max_capacity: u32,
    /// Target-tracking configuration.
    pub target_tracking: TargetTracking,
    /// Validated, ascending step bands.
    pub steps: Vec<StepSpec>,
    /// Scheduled capacity changes, last declaration winning.
    pub scheduled_actions: Vec<ScheduledActionSpec>,
}

/// Merges the scaling declarations of a family's services.
///
/// Returns `None` when no service declares a capacity range: without a
/// range there is no scalable target to attach policies to.
///
/// # Errors
///
/// Returns a configuration error for invalid ranges or step bounds.
pub fn merge_family_scaling(
    family: &str,
    declarations: &[&ScalingSpec],
) -> Result<Option<FamilyScaling>> {
    let mut range: Option<(u32, u32)> = None;
    let mut tracking = TargetTracking::default();
    let mut steps: Vec<StepSpec> = Vec::new();
    let mut scheduled: Vec<ScheduledActionSpec> = Vec::new();

    for declaration in declarations {
        if let Some(new_range) = &declaration.range {
            let (new_min, new_max) =
                parse_range(new_range).ok_or_else(|| {
                    StacksmithError::Compose(ComposeError::InvalidRange {
                        value: new_range.clone(),
                    })
                })?;
            range = Some(match range {
                Some((min, max)) => (min.min(new_min), max.max(new_max)),
                None => (new_min, new_max),
            });
        }

        if let Some(target) = &declaration.target_scaling {
            merge_target_tracking(&mut tracking, target);
        }

        if !declaration.steps.is_empty() {
            // Last full step declaration wins, like scheduled actions.
            steps = declaration.steps.clone();
        }

        if !declaration.scheduled_actions.is_empty() {
            scheduled = declaration.scheduled_actions.clone();
        }
    }

    let Some((min_capacity, mut max_capacity)) = range else {
        if !steps.is_empty() || tracking.has_metrics() {
            return Err(StacksmithError::Synth(SynthError::invalid_step(
                family,
                "scaling policies defined without a capacity range",
            )));
        }
        return Ok(None);
    };

    let steps = validate_steps(family, steps)?;

    if let Some(top) = steps.last()
        && top.count > max_capacity
    {
        warn!(
            "{family} - Scaling range maximum is {max_capacity} but the top step sets \
             {count}. Raising the maximum to match.",
            count = top.count
        );
        max_capacity = top.count;
    }

    Ok(Some(FamilyScaling {
        min_capacity,
        max_capacity,
        target_tracking: tracking,
        steps,
        scheduled_actions: scheduled,
    }))
}

/// Merges one target-tracking declaration into the accumulated one.
///
/// Numeric targets combine by minimum (most conservative); boolean flags
/// combine by logical OR with a warning on first enable.
fn merge_target_tracking(accumulated: &mut TargetTracking, incoming: &TargetScalingSpec) {
    merge_min(&mut accumulated.cpu_target, incoming.cpu_target);
    merge_min(&mut accumulated.memory_target, incoming.memory_target);
    merge_min(&mut accumulated.targets_count, incoming.targets_count);

    if incoming.disable_scale_in == Some(true) && !accumulated.disable_scale_in {
        warn!("At least one service enabled disable_scale_in. Enabling for the whole family.");
        accumulated.disable_scale_in = true;
    }

    if let Some(cooldown) = incoming.scale_in_cooldown {
        accumulated.scale_in_cooldown = accumulated.scale_in_cooldown.min(cooldown);
    }
    if let Some(cooldown) = incoming.scale_out_cooldown {
        accumulated.scale_out_cooldown = accumulated.scale_out_cooldown.min(cooldown);
    }
}

fn merge_min(accumulated: &mut Option<u32>, incoming: Option<u32>) {
    if let Some(value) = incoming {
        *accumulated = Some(accumulated.map_or(value, |current| current.min(value)));
    }
}

/// Validates a step set and returns it sorted ascending by lower bound.
///
/// Rules: each step's lower bound is strictly below its upper bound; each
/// step's lower bound is at least the previous step's upper bound; the
/// last step carries no upper bound (a declared one is cleared with a
/// warning).
///
/// # Errors
///
/// Returns a configuration error identifying the offending step.
pub fn validate_steps(family: &str, mut steps: Vec<StepSpec>) -> Result<Vec<StepSpec>> {
    if steps.is_empty() {
        return Ok(steps);
    }

    for step in &steps {
        if let Some(upper) = step.upper_bound
            && step.lower_bound >= upper
        {
            return Err(StacksmithError::Synth(SynthError::invalid_step(
                family,
                format!(
                    "lower bound {} must be strictly below upper bound {upper}",
                    step.lower_bound
                ),
            )));
        }
    }

    steps.sort_by_key(|step| step.lower_bound);

    let mut previous_upper: Option<u32> = None;
    for step in &steps {
        if let Some(upper) = previous_upper
            && step.lower_bound < upper
        {
            return Err(StacksmithError::Synth(SynthError::invalid_step(
                family,
                format!(
                    "lower bound {} is below the previous upper bound {upper}",
                    step.lower_bound
                ),
            )));
        }
        previous_upper = step.upper_bound;
    }

    if let Some(last) = steps.last_mut()
        && last.upper_bound.is_some()
    {
        warn!("{family} - The last step shall not set an upper bound. Clearing value to comply.");
        last.upper_bound = None;
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(lower: u32, upper: Option<u32>, count: u32) -> StepSpec {
        StepSpec {
            lower_bound: lower,
            upper_bound: upper,
            count,
        }
    }

    fn spec_with_range(range: &str) -> ScalingSpec {
        ScalingSpec {
            range: Some(String::from(range)),
            ..ScalingSpec::default()
        }
    }

    #[test]
    fn test_range_union() {
        let a = spec_with_range("2-6");
        let b = spec_with_range("1-4");
        let merged = merge_family_scaling("app", &[&a, &b]).unwrap().unwrap();
        assert_eq!(merged.min_capacity, 1);
        assert_eq!(merged.max_capacity, 6);
    }

    #[test]
    fn test_numeric_targets_combine_by_minimum() {
        let mut a = spec_with_range("1-10");
        a.target_scaling = Some(TargetScalingSpec {
            cpu_target: Some(80),
            ..TargetScalingSpec::default()
        });
        let mut b = spec_with_range("1-10");
        b.target_scaling = Some(TargetScalingSpec {
            cpu_target: Some(60),
            memory_target: Some(75),
            ..TargetScalingSpec::default()
        });

        let merged = merge_family_scaling("app", &[&a, &b]).unwrap().unwrap();
        assert_eq!(merged.target_tracking.cpu_target, Some(60));
        assert_eq!(merged.target_tracking.memory_target, Some(75));
    }

    #[test]
    fn test_disable_scale_in_or_combines() {
        let mut a = spec_with_range("1-10");
        a.target_scaling = Some(TargetScalingSpec {
            disable_scale_in: Some(true),
            ..TargetScalingSpec::default()
        });
        let b = spec_with_range("1-10");

        let merged = merge_family_scaling("app", &[&a, &b]).unwrap().unwrap();
        assert!(merged.target_tracking.disable_scale_in);
    }

    #[test]
    fn test_top_step_raises_max() {
        // Range max 3, top step sets 5: the maximum must be raised,
        // never silently truncated.
        let mut spec = spec_with_range("1-3");
        spec.steps = vec![step(0, Some(10), 1), step(10, None, 5)];
        let merged = merge_family_scaling("app", &[&spec]).unwrap().unwrap();
        assert_eq!(merged.max_capacity, 5);
    }

    #[test]
    fn test_overlapping_steps_rejected() {
        // Second step starts at 5, below the previous upper bound of 10.
        let mut spec = spec_with_range("1-10");
        spec.steps = vec![step(0, Some(10), 1), step(5, None, 5)];
        let result = merge_family_scaling("app", &[&spec]);
        assert!(matches!(
            result,
            Err(StacksmithError::Synth(SynthError::InvalidScalingStep { .. }))
        ));
    }

    #[test]
    fn test_inverted_step_bounds_rejected() {
        let result = validate_steps("app", vec![step(10, Some(5), 1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_steps_sorted_and_last_upper_cleared() {
        let steps = validate_steps(
            "app",
            vec![step(10, Some(20), 3), step(0, Some(10), 1), step(20, Some(30), 5)],
        )
        .unwrap();
        assert_eq!(
            steps.iter().map(|s| s.lower_bound).collect::<Vec<_>>(),
            vec![0, 10, 20]
        );
        // Monotonic: each upper bound meets the next lower bound.
        for window in steps.windows(2) {
            assert!(window[0].upper_bound.unwrap() <= window[1].lower_bound);
        }
        assert!(steps.last().unwrap().upper_bound.is_none());
    }

    #[test]
    fn test_steps_without_range_rejected() {
        let mut spec = ScalingSpec::default();
        spec.steps = vec![step(0, None, 1)];
        assert!(merge_family_scaling("app", &[&spec]).is_err());
    }

    #[test]
    fn test_scheduled_actions_replace() {
        let mut a = spec_with_range("1-5");
        a.scheduled_actions = vec![ScheduledActionSpec {
            name: Some(String::from("night")),
            schedule: String::from("cron(0 20 * * ? *)"),
            min_capacity: 0,
            max_capacity: 1,
        }];
        let mut b = spec_with_range("1-5");
        b.scheduled_actions = vec![ScheduledActionSpec {
            name: Some(String::from("weekend")),
            schedule: String::from("cron(0 0 ? * SAT *)"),
            min_capacity: 0,
            max_capacity: 0,
        }];

        let merged = merge_family_scaling("app", &[&a, &b]).unwrap().unwrap();
        assert_eq!(merged.scheduled_actions.len(), 1);
        assert_eq!(merged.scheduled_actions[0].name.as_deref(), Some("weekend"));
    }

    #[test]
    fn test_no_declarations_yield_none() {
        assert!(merge_family_scaling("app", &[]).unwrap().is_none());
    }
}
