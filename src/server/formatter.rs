//! Turn one commit into a list of colourised IRC PRIVMSG payload
//! lines.

use std::collections::HashSet;

use crate::codec::CommitArgs;
use crate::color::{Color, Style};
use crate::commit::{Action, Change};

/// `"PRIVMSG "` is 8 bytes; kept as a named constant rather than a
/// literal so the MAX formula in [`max_line_len`] stays self-documenting.
const PRIVMSG_OVERHEAD: usize = 8; // len("PRIVMSG ")

fn style_repo() -> Style {
    Style::bold()
}
fn style_revision() -> Style {
    Style::bold()
}
fn style_path() -> Style {
    Style::color(Color::Teal)
}
fn style_author() -> Style {
    Style::color(Color::Green)
}
fn style_branch() -> Style {
    Style::color(Color::Brown)
}
fn style_module() -> Style {
    Style::color(Color::Purple)
}

fn style_for_change(c: &Change) -> Style {
    let mut style = match c.action {
        Action::Added => Style::color(Color::Green),
        Action::Modified => Style::color(Color::Teal),
        Action::Deleted => Style {
            bold: true,
            color: Some(Color::Red),
            ..Style::default()
        },
        Action::Replaced => Style::reverse(),
    };
    if c.prop_change {
        style.underline = true;
    }
    style
}

/// The longest a single PRIVMSG payload may be, given the
/// widest channel name this repository posts to.
pub fn max_line_len(channels: &[String]) -> usize {
    let widest = channels.iter().map(|c| c.len()).max().unwrap_or(0);
    400usize.saturating_sub(PRIVMSG_OVERHEAD).saturating_sub(widest)
}

/// The common directory, if one was collapsed,
/// and every path with that prefix stripped (paths not covered by the
/// common directory are left as their plain display path).
struct Collapsed {
    common: Option<String>,
    paths: Vec<String>,
}

fn ancestors(abs_path: &str) -> Vec<String> {
    let mut dirs = vec!["/".to_string()];
    let parts: Vec<&str> = abs_path.trim_start_matches('/').split('/').collect();
    if parts.len() <= 1 {
        return dirs;
    }
    let mut cur = String::new();
    for part in &parts[..parts.len() - 1] {
        cur.push('/');
        cur.push_str(part);
        dirs.push(cur.clone());
    }
    dirs
}

fn collapse_common_directory(changes: &[Change]) -> Collapsed {
    let display: Vec<&str> = changes.iter().map(|c| c.display_path()).collect();
    if display.len() < 2 {
        return Collapsed {
            common: None,
            paths: display.iter().map(|s| s.to_string()).collect(),
        };
    }

    let abs_paths: Vec<String> = display.iter().map(|p| format!("/{p}")).collect();
    let per_path_ancestors: Vec<Vec<String>> = abs_paths.iter().map(|p| ancestors(p)).collect();

    let mut candidates: HashSet<String> = HashSet::new();
    for dirs in &per_path_ancestors {
        for d in dirs {
            candidates.insert(d.clone());
        }
    }

    let mut best: Option<(String, usize)> = None;
    for dir in candidates {
        let count = per_path_ancestors.iter().filter(|dirs| dirs.contains(&dir)).count();
        best = match best {
            None => Some((dir, count)),
            Some((bd, bc)) => {
                if count > bc || (count == bc && dir.len() > bd.len()) {
                    Some((dir, count))
                } else {
                    Some((bd, bc))
                }
            }
        };
    }

    let (best_dir, _) = best.expect("candidates is non-empty because display.len() >= 2");
    if best_dir == "/" {
        return Collapsed {
            common: None,
            paths: display.iter().map(|s| s.to_string()).collect(),
        };
    }

    let prefix = format!("{best_dir}/");
    let paths = abs_paths
        .iter()
        .map(|abs| {
            abs.strip_prefix(&prefix)
                .map(|s| s.to_string())
                .unwrap_or_else(|| abs.trim_start_matches('/').to_string())
        })
        .collect();

    Collapsed {
        common: Some(best_dir.trim_start_matches('/').to_string()),
        paths,
    }
}

/// The colourised path-string for a set of changes.
fn path_string(changes: &[Change]) -> String {
    if changes.len() > 4 {
        let dirs: HashSet<&str> = changes
            .iter()
            .map(|c| {
                let p = c.display_path();
                match p.rfind('/') {
                    Some(i) => &p[..i],
                    None => "",
                }
            })
            .collect();
        return if dirs.len() > 1 {
            format!("({} files in {} dirs)", changes.len(), dirs.len())
        } else {
            format!("({} files)", changes.len())
        };
    }

    let collapsed = collapse_common_directory(changes);
    let colored_changes: Vec<String> = changes
        .iter()
        .zip(collapsed.paths.iter())
        .map(|(c, stripped_path)| {
            let mut relocated = c.clone();
            relocated.path = stripped_path.clone();
            style_for_change(&relocated).apply(&relocated.to_string())
        })
        .collect();

    match collapsed.common {
        Some(common) => format!("{}/ {}", style_path().apply(&common), colored_changes.join(" ")),
        None => colored_changes.join(" "),
    }
}

/// Build every PRIVMSG payload line for one commit, already chunked to
/// fit the channels it is headed to.
pub fn format_commit(repo: &str, args: &CommitArgs, channels: &[String]) -> Vec<String> {
    let changes: Vec<Change> = args
        .changes()
        .iter()
        .filter_map(|raw| Change::parse(raw).ok())
        .collect();

    let max = max_line_len(channels);
    let colored_repo = style_repo().apply(repo);
    let continuation_prefix = format!("{colored_repo} ");

    let mut lines = Vec::new();

    // Line 0.
    let mut head = format!("{colored_repo} {}", style_author().apply(args.author()));
    if let Some(branch) = args.branch() {
        head.push(' ');
        head.push_str(&style_branch().apply(branch));
    }
    head.push(' ');
    head.push_str(&style_revision().apply(&format!("{}{}", args.rev_prefix(), args.revision())));
    head.push(' ');
    if let Some(module) = args.module() {
        head.push_str(&style_module().apply(module));
        head.push(' ');
    }
    head.push_str(&path_string(&changes));
    lines.push(head);

    // Log lines.
    for line in args.log().lines().filter(|l| !l.is_empty()) {
        lines.push(format!("{colored_repo} {line}"));
    }

    // Chunking.
    let mut out = Vec::new();
    for line in lines {
        out.extend(chunk_line(&line, max, &continuation_prefix));
    }
    out
}

fn chunk_line(line: &str, max: usize, continuation_prefix: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = line.to_string();
    loop {
        if remaining.len() <= max {
            out.push(remaining);
            break;
        }
        let mut split_at = max.min(remaining.len());
        while split_at > 0 && !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let chunk = remaining[..split_at].to_string();
        let rest = remaining[split_at..].to_string();
        out.push(chunk);
        remaining = format!("{continuation_prefix}{rest}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::strip;

    fn v2(changes: Vec<&str>, log: &str, author: &str, rev: &str) -> CommitArgs {
        CommitArgs::V2 {
            repo_id: "test".into(),
            checksum: String::new(),
            rev_prefix: "r".into(),
            revision: rev.into(),
            changes: changes.into_iter().map(String::from).collect(),
            log: log.into(),
            author: author.into(),
            branch: None,
            module: None,
        }
    }

    #[test]
    fn s1_svn_add() {
        let args = v2(vec!["(A)/file"], "add file", "alice", "1");
        let lines = format_commit("test", &args, &["#test".into()]);
        assert_eq!(strip(&lines[0]), "test alice r1 (A)file");
    }

    #[test]
    fn s2_svn_modify_is_bare_path() {
        let args = v2(vec!["(M)/file"], "modify file", "alice", "2");
        let lines = format_commit("test", &args, &["#test".into()]);
        assert_eq!(strip(&lines[0]), "test alice r2 file");
    }

    #[test]
    fn s3_utf8_delete_emits_two_lines() {
        let args = v2(
            vec!["(D)/file"],
            "remove file. Über cool with cyrillics: здрасти",
            "alice",
            "4",
        );
        let lines = format_commit("test", &args, &["#test".into()]);
        assert_eq!(lines.len(), 2);
        assert_eq!(strip(&lines[0]), "test alice r4 (D)file");
        assert_eq!(
            strip(&lines[1]),
            "test remove file. Über cool with cyrillics: здрасти"
        );
    }

    #[test]
    fn common_directory_collapse_matches_spec_example() {
        let changes: Vec<Change> = ["foo/b", "foo/x", "foo/bar/a"]
            .iter()
            .map(|p| Change::new(Action::Modified, *p, false))
            .collect();
        let collapsed = collapse_common_directory(&changes);
        assert_eq!(collapsed.common.as_deref(), Some("foo"));
        assert_eq!(collapsed.paths, vec!["b", "x", "bar/a"]);
    }

    #[test]
    fn fewer_than_two_paths_no_collapse() {
        let changes = vec![Change::new(Action::Modified, "foo/b", false)];
        let collapsed = collapse_common_directory(&changes);
        assert_eq!(collapsed.common, None);
        assert_eq!(collapsed.paths, vec!["foo/b"]);
    }

    #[test]
    fn more_than_four_changes_emits_summary() {
        let changes: Vec<String> = (0..5).map(|i| format!("(M)/dir/file{i}")).collect();
        let args = CommitArgs::V2 {
            repo_id: "test".into(),
            checksum: String::new(),
            rev_prefix: "r".into(),
            revision: "9".into(),
            changes,
            log: "bulk change".into(),
            author: "bob".into(),
            branch: None,
            module: None,
        };
        let lines = format_commit("test", &args, &["#test".into()]);
        assert!(strip(&lines[0]).contains("(5 files)"));
    }

    #[test]
    fn more_than_four_changes_across_dirs_reports_dir_count() {
        let changes: Vec<String> = vec![
            "(M)/a/file1".into(),
            "(M)/a/file2".into(),
            "(M)/b/file3".into(),
            "(M)/b/file4".into(),
            "(M)/c/file5".into(),
        ];
        let args = CommitArgs::V2 {
            repo_id: "test".into(),
            checksum: String::new(),
            rev_prefix: "r".into(),
            revision: "9".into(),
            changes,
            log: "bulk change".into(),
            author: "bob".into(),
            branch: None,
            module: None,
        };
        let lines = format_commit("test", &args, &["#test".into()]);
        assert!(strip(&lines[0]).contains("(5 files in 3 dirs)"));
    }

    #[test]
    fn chunking_never_exceeds_max_and_reconstructs() {
        let prefix = "repo ";
        let long_line = format!("{prefix}{}", "x".repeat(1000));
        let max = 50;
        let chunks = chunk_line(&long_line, max, prefix);
        for c in &chunks {
            assert!(c.len() <= max, "chunk exceeded max: {} > {}", c.len(), max);
        }
        let mut reconstructed = chunks[0].clone();
        for c in &chunks[1..] {
            reconstructed.push_str(c.strip_prefix(prefix).unwrap());
        }
        assert_eq!(reconstructed, long_line);
    }

    #[test]
    fn branch_and_module_appear_in_expected_positions() {
        let args = CommitArgs::V2 {
            repo_id: "test".into(),
            checksum: String::new(),
            rev_prefix: "r".into(),
            revision: "10".into(),
            changes: vec!["(A)/1.0-release".into()],
            log: "Release 1.0".into(),
            author: "alice".into(),
            branch: Some("tags".into()),
            module: Some("relmod".into()),
        };
        let lines = format_commit("test", &args, &["#test".into()]);
        let plain = strip(&lines[0]);
        assert_eq!(plain, "test alice tags r10 relmod (A)1.0-release");
    }
}
