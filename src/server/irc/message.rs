//! A minimal RFC 1459/2812 line parser/serializer — just enough of
//! the wire grammar for KGB's needs (PING/PONG, NICK, JOIN/PART,
//! PRIVMSG, CTCP, numerics). Parses into owned `String`s since KGB
//! reads full UTF-8 lines off a `BufReader` rather than raw byte
//! buffers.

/// `\x01`, the CTCP delimiter.
pub const CTCP_MARKER: char = '\u{01}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `nick!user@host`, or a bare server name, if present.
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn parse(line: &str) -> Option<Message> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return None;
        }
        let mut rest = line;
        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
            prefix = Some(p.to_string());
            rest = r;
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((a, b)) => (a, Some(b.to_string())),
            None => (rest, None),
        };

        let mut params: Vec<String> = head.split_whitespace().map(String::from).collect();
        if params.is_empty() {
            return None;
        }
        let command = params.remove(0).to_ascii_uppercase();
        if let Some(t) = trailing {
            params.push(t);
        }

        Some(Message {
            prefix,
            command,
            params,
        })
    }

    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Split an RFC prefix into `(nick, user, host)`.
    pub fn prefix_parts(&self) -> Option<(&str, &str, &str)> {
        let prefix = self.prefix.as_deref()?;
        let (nick, rest) = prefix.split_once('!')?;
        let (user, host) = rest.split_once('@')?;
        Some((nick, user, host))
    }
}

/// Serialize a command with its arguments into a wire line. The last
/// argument becomes the trailing parameter (prefixed with `:`) when it
/// contains a space, is empty, or is explicitly forced via
/// [`raw_line`]'s caller.
pub fn raw_line(command: &str, args: &[&str]) -> String {
    let mut out = String::from(command);
    if let Some((last, rest)) = args.split_last() {
        for a in rest {
            out.push(' ');
            out.push_str(a);
        }
        out.push(' ');
        if last.is_empty() || last.contains(' ') || last.starts_with(':') {
            out.push(':');
        }
        out.push_str(last);
    }
    out.push_str("\r\n");
    out
}

pub fn ctcp_wrap(s: &str) -> String {
    format!("{CTCP_MARKER}{s}{CTCP_MARKER}")
}

pub fn ctcp_unwrap(s: &str) -> Option<&str> {
    s.strip_prefix(CTCP_MARKER)?.strip_suffix(CTCP_MARKER)
}
