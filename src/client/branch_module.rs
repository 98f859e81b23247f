//! Extracting `(branch, module)` out of a commit's changed paths via a
//! small pipeline of user-supplied two-capture-group regexes.

use regex::Regex;

use crate::error::{Error, Result};

/// One compiled extraction rule. Must have exactly two capture groups
/// — anything else is rejected at construction, not at match time.
struct Rule {
    regex: Regex,
}

impl Rule {
    fn new(pattern: &str) -> Result<Rule> {
        let regex = Regex::new(pattern).map_err(|e| Error::BadBranchModuleRegex(e.to_string()))?;
        // `captures_len()` counts the implicit whole-match group 0.
        if regex.captures_len() != 3 {
            return Err(Error::BadBranchModuleRegex(format!(
                "{pattern} must have exactly two capture groups, found {}",
                regex.captures_len().saturating_sub(1)
            )));
        }
        Ok(Rule { regex })
    }
}

/// A sequence of rules applied in order; the first one that matches
/// from the start of the path wins ("first full match wins").
pub struct Pipeline {
    rules: Vec<Rule>,
    swap: bool,
}

impl Pipeline {
    /// `swap` mirrors `--branch-and-module-re-swap`: when set, a rule's
    /// first and second capture groups are read as `(module, branch)`
    /// instead of `(branch, module)`.
    pub fn new(patterns: &[String], swap: bool) -> Result<Pipeline> {
        let rules = patterns.iter().map(|p| Rule::new(p)).collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { rules, swap })
    }

    /// Apply the rules in order against every changed path at once:
    /// the first rule that fully matches (from the start) *any* of
    /// `paths` wins — trying all paths against one rule before moving
    /// on to the next, not the other way around. Its capture groups
    /// become `(branch, module)`, and its matched prefix is stripped
    /// from every path it matches; paths the winning rule doesn't
    /// match are returned unchanged. If no rule matches any path,
    /// every path comes back untouched.
    pub fn extract_all(&self, paths: &[&str]) -> (Option<String>, Option<String>, Vec<String>) {
        for rule in &self.rules {
            let first_match = paths.iter().find_map(|p| {
                let caps = rule.regex.captures(p)?;
                (caps.get(0).expect("group 0 always present on a match").start() == 0)
                    .then_some(caps)
            });
            let Some(caps) = first_match else { continue };

            let mut branch = caps.get(1).map(|m| m.as_str().to_string());
            let mut module = caps.get(2).map(|m| m.as_str().to_string());
            if self.swap {
                std::mem::swap(&mut branch, &mut module);
            }

            let stripped = paths
                .iter()
                .map(|p| match rule.regex.captures(p) {
                    Some(caps) if caps.get(0).expect("group 0 always present").start() == 0 => {
                        p[caps.get(0).unwrap().end()..].to_string()
                    }
                    _ => p.to_string(),
                })
                .collect();
            return (branch, module, stripped);
        }
        (None, None, paths.iter().map(|p| p.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_regex_without_two_groups() {
        assert!(Rule::new("^trunk/").is_err());
        assert!(Rule::new("^branches/([^/]+)/").is_err());
        assert!(Rule::new("^(a)(b)(c)").is_err());
    }

    #[test]
    fn accepts_regex_with_exactly_two_groups() {
        assert!(Rule::new(r"^branches/([^/]+)/(.*)$").is_ok());
    }

    #[test]
    fn first_matching_rule_wins_and_strips_prefix() {
        let pipeline = Pipeline::new(
            &[
                r"^tags/([^/]+)/(.*)$".to_string(),
                r"^branches/([^/]+)/(.*)$".to_string(),
            ],
            false,
        )
        .unwrap();
        let (branch, module, rest) = pipeline.extract_all(&["branches/1.0/src/main.rs"]);
        assert_eq!(branch.as_deref(), Some("1.0"));
        assert_eq!(module.as_deref(), Some("src/main.rs"));
        assert_eq!(rest, vec!["src/main.rs".to_string()]);
    }

    #[test]
    fn no_match_leaves_every_path_untouched() {
        let pipeline = Pipeline::new(&[r"^tags/([^/]+)/(.*)$".to_string()], false).unwrap();
        let (branch, module, rest) =
            pipeline.extract_all(&["trunk/src/main.rs", "trunk/src/lib.rs"]);
        assert_eq!(branch, None);
        assert_eq!(module, None);
        assert_eq!(
            rest,
            vec!["trunk/src/main.rs".to_string(), "trunk/src/lib.rs".to_string()]
        );
    }

    #[test]
    fn swap_flag_reverses_branch_and_module() {
        let swapped = Pipeline::new(&[r"^([^/]+)/(.*)$".to_string()], true).unwrap();
        let (branch, module, _) = swapped.extract_all(&["modname/branchname"]);
        assert_eq!(branch.as_deref(), Some("branchname"));
        assert_eq!(module.as_deref(), Some("modname"));
    }

    #[test]
    fn match_on_a_later_path_still_wins_and_strips_every_path() {
        // The first path doesn't match the branches/ rule at all; the
        // second does. The rule still applies across all paths: the
        // second path's prefix is stripped, and the first path (which
        // the rule never matched) is left as-is.
        let pipeline =
            Pipeline::new(&[r"^branches/([^/]+)/(.*)$".to_string()], false).unwrap();
        let (branch, module, rest) =
            pipeline.extract_all(&["README", "branches/2.0/src/main.rs"]);
        assert_eq!(branch.as_deref(), Some("2.0"));
        assert_eq!(module.as_deref(), Some("src/main.rs"));
        assert_eq!(rest, vec!["README".to_string(), "src/main.rs".to_string()]);
    }

    #[test]
    fn earlier_rule_wins_even_if_a_later_rule_would_match_more_paths() {
        // "first full match across all paths wins" is about rule
        // order, not about which rule matches the most paths.
        let pipeline = Pipeline::new(
            &[
                r"^tags/([^/]+)/(.*)$".to_string(),
                r"^branches/([^/]+)/(.*)$".to_string(),
            ],
            false,
        )
        .unwrap();
        let (branch, module, rest) = pipeline.extract_all(&[
            "branches/1.0/a.rs",
            "branches/1.0/b.rs",
            "tags/1.0-rc1/c.rs",
        ]);
        assert_eq!(branch.as_deref(), Some("1.0-rc1"));
        assert_eq!(module.as_deref(), Some("c.rs"));
        assert_eq!(
            rest,
            vec![
                "branches/1.0/a.rs".to_string(),
                "branches/1.0/b.rs".to_string(),
                "c.rs".to_string(),
            ]
        );
    }
}
