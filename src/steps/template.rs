//! Minimal `{{name}}` substitution, deliberately not an expression language:
//! no conditionals, loops, or filters. Grounded in the teacher's
//! `utilities/string_utils.rs::interpolate_only`, adapted to double-brace
//! placeholders since this engine's prompts use that convention instead of
//! the teacher's single-brace one.

use std::collections::HashMap;

/// Replace every `{{key}}` occurrence with `vars[key]`, leaving unknown
/// placeholders untouched.
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("name", "ada");
        assert_eq!(render("hello {{name}}", &vars), "hello ada");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let vars = HashMap::new();
        assert_eq!(render("hello {{missing}}", &vars), "hello {{missing}}");
    }

    #[test]
    fn no_placeholders_is_identity() {
        let vars = HashMap::new();
        assert_eq!(render("plain text", &vars), "plain text");
    }
}
