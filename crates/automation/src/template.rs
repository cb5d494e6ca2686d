//! `{field}` placeholder rendering for action templates.

use cw_domain::record::Fields;

/// Replaces every `{field_name}` placeholder in `template` with the
/// rendered value of that field from `fields`, leaving unknown
/// placeholders untouched.
pub fn render_template(template: &str, fields: &Fields) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match fields.get(name) {
                    Some(value) => out.push_str(&value.render()),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Renders every value in a `{field_name: template}` map.
pub fn render_map(templates: &std::collections::BTreeMap<String, String>, fields: &Fields) -> cw_domain::record::Fields {
    templates
        .iter()
        .map(|(k, v)| (k.clone(), cw_domain::record::Value::Text(render_template(v, fields))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_domain::record::Value;

    #[test]
    fn substitutes_known_placeholder() {
        let fields: Fields = [("案由".to_string(), Value::Text("劳动争议".into()))].into_iter().collect();
        assert_eq!(render_template("分类变更: {案由}", &fields), "分类变更: 劳动争议");
    }

    #[test]
    fn leaves_unknown_placeholder_untouched() {
        let fields = Fields::new();
        assert_eq!(render_template("hello {missing}", &fields), "hello {missing}");
    }

    #[test]
    fn handles_unterminated_brace() {
        let fields = Fields::new();
        assert_eq!(render_template("hello {", &fields), "hello {");
    }
}
