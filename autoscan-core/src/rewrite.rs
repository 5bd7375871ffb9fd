use serde::Deserialize;

/// One prefix substitution rule, as configured in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rewrite {
    pub from: String,
    pub to: String,
}

/// Ordered prefix rewriter converting between trigger-visible and
/// target-visible paths. The first matching rule wins; a path matching no
/// rule passes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    rules: Vec<Rewrite>,
}

impl Rewriter {
    pub fn new(rules: Vec<Rewrite>) -> Self {
        Self { rules }
    }

    pub fn rewrite(&self, path: &str) -> String {
        for rule in &self.rules {
            if let Some(rest) = path.strip_prefix(&rule.from) {
                return format!("{}{}", rule.to, rest);
            }
        }

        path.to_string()
    }
}
