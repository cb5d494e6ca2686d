//! Rule, trigger, condition, and action types mirroring the declarative
//! rules-file YAML schema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOn {
    Created,
    Updated,
}

/// A single matchable predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Changed {
        field: String,
    },
    Equals {
        field: String,
        value: serde_json::Value,
    },
    In {
        field: String,
        values: Vec<serde_json::Value>,
    },
    AnyFieldChanged {
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl Condition {
    /// The field this predicate depends on, when it names exactly one.
    /// `AnyFieldChanged` depends on the whole record so has none.
    pub fn depends_on_field(&self) -> Option<&str> {
        match self {
            Condition::Changed { field }
            | Condition::Equals { field, .. }
            | Condition::In { field, .. } => Some(field),
            Condition::AnyFieldChanged { .. } => None,
        }
    }
}

/// A rule's trigger: the `on` set plus an optional predicate tree.
///
/// Invariant: must resolve to at least one matchable predicate — a rule
/// with no `field`, `condition`, `all`, or `any` never fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub on: Vec<TriggerOn>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub all: Vec<Condition>,
    #[serde(default)]
    pub any: Vec<Condition>,
}

impl Trigger {
    /// Whether this trigger has at least one matchable predicate.
    pub fn has_matchable_predicate(&self) -> bool {
        self.field.is_some()
            || self.condition.is_some()
            || !self.all.is_empty()
            || !self.any.is_empty()
    }

    /// Every field name this trigger's predicates reference, used to
    /// compute the minimal fetch set for the Processor.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(f) = &self.field {
            out.push(f.as_str());
        }
        if let Some(c) = &self.condition {
            if let Some(f) = c.depends_on_field() {
                out.push(f);
            }
        }
        for c in &self.all {
            if let Some(f) = c.depends_on_field() {
                out.push(f);
            }
        }
        for c in &self.any {
            if let Some(f) = c.depends_on_field() {
                out.push(f);
            }
        }
        out
    }

    /// Whether any predicate in this trigger is `any_field_changed`,
    /// which forces the Processor to fetch the full field set.
    pub fn uses_any_field_changed(&self) -> bool {
        let check = |c: &Condition| matches!(c, Condition::AnyFieldChanged { .. });
        self.condition.as_ref().is_some_and(&check)
            || self.all.iter().any(&check)
            || self.any.iter().any(&check)
    }
}

/// A table reference; `app_token` defaults to the server's configured
/// default when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(default)]
    pub app_token: Option<String>,
    pub table_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    LogWrite {
        template: String,
    },
    BitableUpdate {
        target: TableRef,
        fields: std::collections::BTreeMap<String, String>,
    },
    BitableUpsert {
        target: TableRef,
        anchor_field: String,
        fields: std::collections::BTreeMap<String, String>,
    },
    CalendarCreate {
        title: String,
        start_field: String,
        end_field: String,
    },
    HttpRequest {
        method: String,
        url: String,
        #[serde(default)]
        headers: std::collections::BTreeMap<String, String>,
        #[serde(default)]
        body: Option<serde_json::Value>,
    },
    Delay {
        seconds: u64,
        pipeline: Vec<Action>,
    },
}

impl Action {
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::LogWrite { .. } => "log.write",
            Action::BitableUpdate { .. } => "bitable.update",
            Action::BitableUpsert { .. } => "bitable.upsert",
            Action::CalendarCreate { .. } => "calendar.create",
            Action::HttpRequest { .. } => "http.request",
            Action::Delay { .. } => "delay",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub enabled: bool,
    pub table: TableRef,
    pub trigger: Trigger,
    pub pipeline: Vec<Action>,
    /// Runtime-only override (not persisted back to the rules file): set
    /// when the Schema Watcher finds the trigger field no longer exists.
    #[serde(skip)]
    pub runtime_disabled: bool,
}

impl Rule {
    /// Whether this rule is eligible to fire at all right now.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.runtime_disabled
    }
}

/// Top-level rules-file document: `rules: [...]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
rules:
  - id: R001
    enabled: true
    table:
      table_id: tbl_cases
    trigger:
      on: [updated]
      field: 案件分类
      condition: { kind: equals, field: 案件分类, value: 劳动争议 }
    pipeline:
      - { type: log.write, template: "分类变更: {案件分类}" }
      - { type: calendar.create, title: "开庭提醒", start_field: 开庭日, end_field: 开庭日 }
"#;

    #[test]
    fn parses_sample_rule_file() {
        let parsed: RuleFile = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        assert_eq!(parsed.rules.len(), 1);
        let rule = &parsed.rules[0];
        assert_eq!(rule.id, "R001");
        assert!(rule.trigger.has_matchable_predicate());
        assert_eq!(rule.pipeline.len(), 2);
        assert_eq!(rule.pipeline[0].type_name(), "log.write");
    }

    #[test]
    fn trigger_with_no_predicate_is_not_matchable() {
        let trigger = Trigger {
            on: vec![TriggerOn::Updated],
            field: None,
            condition: None,
            all: vec![],
            any: vec![],
        };
        assert!(!trigger.has_matchable_predicate());
    }

    #[test]
    fn referenced_fields_collects_from_all_and_any() {
        let trigger = Trigger {
            on: vec![TriggerOn::Updated],
            field: None,
            condition: None,
            all: vec![Condition::Changed { field: "a".into() }],
            any: vec![Condition::Equals {
                field: "b".into(),
                value: serde_json::json!("x"),
            }],
        };
        let fields = trigger.referenced_fields();
        assert!(fields.contains(&"a"));
        assert!(fields.contains(&"b"));
    }

    #[test]
    fn any_field_changed_forces_full_fetch() {
        let trigger = Trigger {
            on: vec![TriggerOn::Updated],
            field: None,
            condition: Some(Condition::AnyFieldChanged { exclude: vec![] }),
            all: vec![],
            any: vec![],
        };
        assert!(trigger.uses_any_field_changed());
    }

    #[test]
    fn rule_runtime_disabled_is_not_active() {
        let mut rule: Rule = serde_yaml::from_str(SAMPLE_YAML)
            .map(|f: RuleFile| f.rules.into_iter().next().unwrap())
            .unwrap();
        assert!(rule.is_active());
        rule.runtime_disabled = true;
        assert!(!rule.is_active());
    }
}
