//! Data model: a single path `Change` and the `Commit` it belongs
//! to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a path in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Added,
    Modified,
    Deleted,
    Replaced,
}

impl Action {
    fn letter(self) -> char {
        match self {
            Action::Added => 'A',
            Action::Modified => 'M',
            Action::Deleted => 'D',
            Action::Replaced => 'R',
        }
    }

    fn from_letter(c: char) -> Option<Action> {
        match c {
            'A' => Some(Action::Added),
            'M' => Some(Action::Modified),
            'D' => Some(Action::Deleted),
            'R' => Some(Action::Replaced),
            _ => None,
        }
    }
}

/// One modified path in a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: Action,
    /// Textual, UTF-8. Leading "/" is stripped on display.
    pub path: String,
    /// Metadata-only modification.
    pub prop_change: bool,
}

impl Change {
    pub fn new(action: Action, path: impl Into<String>, prop_change: bool) -> Self {
        Change {
            action,
            path: path.into(),
            prop_change,
        }
    }

    /// Path with any leading "/" removed, for display.
    pub fn display_path(&self) -> &str {
        self.path.strip_prefix('/').unwrap_or(&self.path)
    }

    /// Parse the canonical string form `"(" action [+] ")" path`, or
    /// the abbreviated bare-path form (plain `M`, no prop change).
    ///
    /// Must be the exact inverse of [`Change::to_string`].
    pub fn parse(s: &str) -> crate::error::Result<Change> {
        if let Some(rest) = s.strip_prefix('(') {
            let close = rest
                .find(')')
                .ok_or_else(|| crate::error::Error::BadChange(s.to_string()))?;
            let tag = &rest[..close];
            let path = &rest[close + 1..];
            let mut chars = tag.chars();
            let letter = chars
                .next()
                .ok_or_else(|| crate::error::Error::BadChange(s.to_string()))?;
            let action = Action::from_letter(letter)
                .ok_or_else(|| crate::error::Error::BadChange(s.to_string()))?;
            let prop_change = match chars.next() {
                None => false,
                Some('+') if chars.next().is_none() => true,
                _ => return Err(crate::error::Error::BadChange(s.to_string())),
            };
            Ok(Change::new(action, path, prop_change))
        } else {
            // Bare path: implicitly "M", no prop_change.
            Ok(Change::new(Action::Modified, s, false))
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.action == Action::Modified && !self.prop_change {
            write!(f, "{}", self.path)
        } else {
            write!(
                f,
                "({}{}){}",
                self.action.letter(),
                if self.prop_change { "+" } else { "" },
                self.path
            )
        }
    }
}

/// A single accepted commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Opaque id: first 7 hex chars of the SHA for Git, decimal
    /// revision for Subversion.
    pub id: String,
    /// Short login, no domain.
    pub author: String,
    /// UTF-8 multi-line commit message.
    pub log: String,
    /// Ordered sequence of path changes, possibly empty.
    pub changes: Vec<Change>,
    pub branch: Option<String>,
    pub module: Option<String>,
}

impl Commit {
    /// Construct a commit, validating the UTF-8 invariant on `log`.
    ///
    /// `raw_log` is taken as owned bytes so construction is the single
    /// hard-error point for non-UTF-8 input.
    pub fn from_raw(
        id: impl Into<String>,
        author: impl Into<String>,
        raw_log: Vec<u8>,
        changes: Vec<Change>,
        branch: Option<String>,
        module: Option<String>,
    ) -> crate::error::Result<Commit> {
        let log = String::from_utf8(raw_log).map_err(|_| crate::error::Error::BadUtf8)?;
        Ok(Commit {
            id: id.into(),
            author: author.into(),
            log,
            changes,
            branch,
            module,
        })
    }

    /// The first 7 hex characters of `id`, used as the Git-style
    /// revision prefix shown in announcements (e.g. `<abc1234>`).
    pub fn short_id(&self) -> &str {
        let n = self.id.char_indices().nth(7).map(|(i, _)| i).unwrap_or(self.id.len());
        &self.id[..n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_roundtrip_add() {
        let c = Change::new(Action::Added, "/file", false);
        assert_eq!(c.to_string(), "(A)/file");
        assert_eq!(Change::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn change_modify_is_abbreviated() {
        let c = Change::new(Action::Modified, "/file", false);
        assert_eq!(c.to_string(), "/file");
        assert_eq!(Change::parse("/file").unwrap(), c);
    }

    #[test]
    fn change_modify_with_prop_change_is_not_abbreviated() {
        let c = Change::new(Action::Modified, "/file", true);
        assert_eq!(c.to_string(), "(M+)/file");
        assert_eq!(Change::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn change_delete_roundtrip() {
        let c = Change::new(Action::Deleted, "/file", false);
        assert_eq!(Change::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn change_replace_prop_change_roundtrip() {
        let c = Change::new(Action::Replaced, "/a/b/c", true);
        assert_eq!(c.to_string(), "(R+)/a/b/c");
        assert_eq!(Change::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn change_parse_rejects_garbage() {
        assert!(Change::parse("(Z)/file").is_err());
        assert!(Change::parse("(A").is_err());
    }

    #[test]
    fn display_path_strips_leading_slash() {
        let c = Change::new(Action::Added, "/a/b", false);
        assert_eq!(c.display_path(), "a/b");
    }

    #[test]
    fn commit_rejects_bad_utf8() {
        let bad = vec![0xff, 0xfe, 0xfd];
        let err = Commit::from_raw("1", "alice", bad, vec![], None, None).unwrap_err();
        assert!(matches!(err, crate::error::Error::BadUtf8));
    }

    #[test]
    fn commit_preserves_utf8_log() {
        let log = "über cléver cómmít with cyrillics: привет";
        let c = Commit::from_raw("1", "alice", log.as_bytes().to_vec(), vec![], None, None)
            .unwrap();
        assert_eq!(c.log, log);
    }

    #[test]
    fn short_id_is_seven_chars() {
        let c = Commit::from_raw("abcdef0123456", "a", b"log".to_vec(), vec![], None, None)
            .unwrap();
        assert_eq!(c.short_id(), "abcdef0");
    }

    #[test]
    fn short_id_handles_shorter_ids() {
        let c = Commit::from_raw("42", "a", b"log".to_vec(), vec![], None, None).unwrap();
        assert_eq!(c.short_id(), "42");
    }
}
