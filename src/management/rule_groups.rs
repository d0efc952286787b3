//! Locating and maintaining the owned group inside a PrometheusRule.
//!
//! Nothing in here ever touches a group whose name differs from the owned one.

use crate::resources::{Rule, RuleGroup};

pub fn find_owned_group<'a>(groups: &'a [RuleGroup], name: &str) -> Option<&'a RuleGroup> {
    groups.iter().find(|g| g.name == name)
}

pub fn find_owned_group_mut<'a>(
    groups: &'a mut [RuleGroup],
    name: &str,
) -> Option<&'a mut RuleGroup> {
    groups.iter_mut().find(|g| g.name == name)
}

/// Return the owned group, appending an empty one at the end if there is none.
pub fn ensure_owned_group<'a>(groups: &'a mut Vec<RuleGroup>, name: &str) -> &'a mut RuleGroup {
    let index = match groups.iter().position(|g| g.name == name) {
        Some(index) => index,
        None => {
            groups.push(RuleGroup {
                name: name.into(),
                ..Default::default()
            });
            groups.len() - 1
        }
    };
    &mut groups[index]
}

/// Drop the owned group if it has no rules left. Returns whether it was removed.
pub fn prune_owned_group(groups: &mut Vec<RuleGroup>, name: &str) -> bool {
    match groups.iter().position(|g| g.name == name) {
        Some(index) if groups[index].rules.is_empty() => {
            groups.remove(index);
            true
        }
        _ => false,
    }
}

/// Position of the first rule matching (alert, severity) within a group.
pub fn position_of(group: &RuleGroup, alert: &str, severity: &str) -> Option<usize> {
    group.rules.iter().position(|r| r.matches(alert, severity))
}

/// First rule across all groups, owned or not, matching (alert, severity).
pub fn find_rule<'a>(groups: &'a [RuleGroup], alert: &str, severity: &str) -> Option<&'a Rule> {
    groups
        .iter()
        .flat_map(|g| g.rules.iter())
        .find(|r| r.matches(alert, severity))
}
