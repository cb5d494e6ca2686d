//! Match Engine — evaluates a rule's trigger predicate tree against
//! `(changes, current fields)`.

use cw_domain::record::{Change, Fields};
use cw_domain::rule::{Condition, Trigger};

/// Evaluate a single predicate against the observed changes and the
/// record's freshly fetched fields.
pub fn evaluate_condition(condition: &Condition, changes: &[Change], current: &Fields) -> bool {
    match condition {
        Condition::Changed { field } => changes.iter().any(|c| &c.field_name == field),
        Condition::Equals { field, value } => current
            .get(field)
            .map(|v| field_value_equals(v, value))
            .unwrap_or(false),
        Condition::In { field, values } => current
            .get(field)
            .map(|v| values.iter().any(|want| field_value_equals(v, want)))
            .unwrap_or(false),
        Condition::AnyFieldChanged { exclude } => {
            changes.iter().any(|c| !exclude.contains(&c.field_name))
        }
    }
}

fn field_value_equals(value: &cw_domain::record::Value, want: &serde_json::Value) -> bool {
    match want.as_str() {
        Some(s) => value.render() == s,
        None => serde_json::to_value(value).map(|v| &v == want).unwrap_or(false),
    }
}

/// Evaluate a trigger's full predicate tree: `field` (implicit `changed`),
/// `condition`, and the `all`/`any` combinators. An empty predicate tree
/// never matches (rules with no matchable predicate should already be
/// rejected at load time).
pub fn trigger_matches(trigger: &Trigger, changes: &[Change], current: &Fields) -> bool {
    if let Some(field) = &trigger.field {
        if !changes.iter().any(|c| &c.field_name == field) {
            return false;
        }
    }
    if let Some(condition) = &trigger.condition {
        if !evaluate_condition(condition, changes, current) {
            return false;
        }
    }
    if !trigger.all.is_empty() && !trigger.all.iter().all(|c| evaluate_condition(c, changes, current)) {
        return false;
    }
    if !trigger.any.is_empty() && !trigger.any.iter().any(|c| evaluate_condition(c, changes, current)) {
        return false;
    }
    trigger.has_matchable_predicate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_domain::record::Value;
    use cw_domain::rule::TriggerOn;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::Text(v.to_string()))).collect()
    }

    fn change(field: &str) -> Change {
        Change { field_name: field.to_string(), old: None, new: None }
    }

    #[test]
    fn changed_condition_matches_when_field_in_changeset() {
        let cond = Condition::Changed { field: "status".into() };
        assert!(evaluate_condition(&cond, &[change("status")], &Fields::new()));
        assert!(!evaluate_condition(&cond, &[change("other")], &Fields::new()));
    }

    #[test]
    fn equals_condition_matches_current_value() {
        let cond = Condition::Equals { field: "status".into(), value: serde_json::json!("done") };
        let current = fields(&[("status", "done")]);
        assert!(evaluate_condition(&cond, &[], &current));
        assert!(!evaluate_condition(&cond, &[], &fields(&[("status", "open")])));
    }

    #[test]
    fn any_field_changed_respects_exclude_list() {
        let cond = Condition::AnyFieldChanged { exclude: vec!["updated_at".into()] };
        assert!(!evaluate_condition(&cond, &[change("updated_at")], &Fields::new()));
        assert!(evaluate_condition(&cond, &[change("status")], &Fields::new()));
    }

    #[test]
    fn trigger_all_requires_every_condition() {
        let trigger = Trigger {
            on: vec![TriggerOn::Updated],
            field: None,
            condition: None,
            all: vec![
                Condition::Changed { field: "status".into() },
                Condition::Equals { field: "status".into(), value: serde_json::json!("done") },
            ],
            any: vec![],
        };
        let current = fields(&[("status", "done")]);
        assert!(trigger_matches(&trigger, &[change("status")], &current));
        assert!(!trigger_matches(&trigger, &[change("other")], &current));
    }

    #[test]
    fn trigger_any_requires_one_condition() {
        let trigger = Trigger {
            on: vec![TriggerOn::Updated],
            field: None,
            condition: None,
            all: vec![],
            any: vec![
                Condition::Changed { field: "status".into() },
                Condition::Changed { field: "priority".into() },
            ],
        };
        assert!(trigger_matches(&trigger, &[change("priority")], &Fields::new()));
        assert!(!trigger_matches(&trigger, &[change("other")], &Fields::new()));
    }

    #[test]
    fn trigger_with_implicit_field_is_shorthand_for_changed() {
        let trigger = Trigger {
            on: vec![TriggerOn::Updated],
            field: Some("status".into()),
            condition: None,
            all: vec![],
            any: vec![],
        };
        assert!(trigger_matches(&trigger, &[change("status")], &Fields::new()));
        assert!(!trigger_matches(&trigger, &[change("other")], &Fields::new()));
    }
}
