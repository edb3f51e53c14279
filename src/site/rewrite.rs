//! Rewrite rule compilation and application.
//!
//! A rule is gated by a regex over the full outbound URL; when it applies,
//! its body regex is replaced line by line. Rules apply in configured order,
//! each one seeing the output of the previous one.

use std::borrow::Cow;

use regex::Regex;

use crate::config::RewriteRuleConfig;

/// A compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    path: Regex,
    body: Regex,
    replacement: String,
}

impl RewriteRule {
    /// Compile a rule. The path pattern is anchored so it must match the whole URL.
    pub fn compile(config: &RewriteRuleConfig) -> Result<Self, regex::Error> {
        let body = Regex::new(&config.body_pattern)?;
        let replacement = expand_group_numbers(&config.replacement, body.captures_len());
        Ok(Self {
            path: Regex::new(&format!("^(?:{})$", config.path_pattern))?,
            body,
            replacement,
        })
    }

    pub fn applies_to(&self, url: &str) -> bool {
        self.path.is_match(url)
    }

    pub fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.body.replace_all(line, self.replacement.as_str())
    }
}

/// Brace every numbered reference in a replacement template.
///
/// `$12` names group 12 only if the pattern has that many groups; otherwise
/// it is group 1 followed by a literal `2`. Digits after a group number are
/// never folded into a longer name, so `$1x` is group 1 then `x`. `$$` and
/// `${...}` are left untouched.
fn expand_group_numbers(template: &str, groups: usize) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('{') => {
                out.push('$');
                for c in chars.by_ref() {
                    out.push(c);
                    if c == '}' {
                        break;
                    }
                }
            }
            Some(first) if first.is_ascii_digit() => {
                chars.next();
                let mut group = first.to_digit(10).unwrap_or_default() as usize;
                while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                    let longer = group * 10 + digit as usize;
                    if longer >= groups {
                        break;
                    }
                    group = longer;
                    chars.next();
                }
                out.push_str(&format!("${{{group}}}"));
            }
            _ => out.push('$'),
        }
    }
    out
}

/// All rules of a site, compiled at load time.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    /// Compile every rule, reporting the index of the first one that fails.
    pub fn compile(configs: &[RewriteRuleConfig]) -> Result<Self, (usize, regex::Error)> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(index, config)| RewriteRule::compile(config).map_err(|e| (index, e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The ordered subset of rules applying to `url`.
    pub fn matching(&self, url: &str) -> Rewrites {
        Rewrites {
            rules: self
                .rules
                .iter()
                .filter(|rule| rule.applies_to(url))
                .cloned()
                .collect(),
        }
    }
}

/// Rules selected for one request.
///
/// Empty means the body is relayed byte for byte.
#[derive(Debug, Clone, Default)]
pub struct Rewrites {
    rules: Vec<RewriteRule>,
}

impl Rewrites {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Run every selected rule over one line.
    pub fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(line);
        for rule in &self.rules {
            let replaced = match rule.apply(&out) {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                out = Cow::Owned(s);
            }
        }
        out
    }
}
