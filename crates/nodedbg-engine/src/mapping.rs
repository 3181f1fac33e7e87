//! Path mapping between local files and the engine's script names.
//!
//! Each rule pairs a local directory prefix with a remote prefix. Rules are
//! tried in declaration order and the first match wins.

use nodedbg_config::MappingEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
struct MappingRule {
    /// Local prefix as configured, ending in `separator`.
    local: String,
    /// Local prefix with `/` separators and dot segments resolved.
    local_base: String,
    /// Remote prefix, ending in `/` or `\`.
    remote: String,
    /// Separator style of the local prefix.
    separator: char,
}

impl MappingRule {
    fn new(entry: &MappingEntry) -> Self {
        let separator = if entry.local.contains('\\') && !entry.local.contains('/') {
            '\\'
        } else {
            '/'
        };
        let mut local = entry.local.clone();
        if !local.ends_with(['/', '\\']) {
            local.push(separator);
        }
        let mut remote = entry.remote.clone();
        if !remote.ends_with(['/', '\\']) {
            remote.push('/');
        }
        let local_base = normalize_local(&local);
        Self {
            local,
            local_base,
            remote,
            separator,
        }
    }

    fn matches_local(&self, path: &str) -> Option<usize> {
        let base = self.local_base.as_str();
        let hit = if self.separator == '\\' {
            path.len() >= base.len() && path.is_char_boundary(base.len()) && path[..base.len()].eq_ignore_ascii_case(base)
        } else {
            path.starts_with(base)
        };
        hit.then_some(base.len())
    }
}

/// Ordered set of local/remote prefix rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMapping {
    rules: Vec<MappingRule>,
}

impl ScriptMapping {
    /// Build from config entries, keeping their order.
    pub fn new(entries: &[MappingEntry]) -> Self {
        Self {
            rules: entries.iter().map(MappingRule::new).collect(),
        }
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Map a remote script name to a local path.
    pub fn to_local(&self, remote_path: &str) -> Option<String> {
        for rule in &self.rules {
            if let Some(rest) = remote_path.strip_prefix(rule.remote.as_str()) {
                let rest = if rule.separator == '/' {
                    rest.to_string()
                } else {
                    rest.replace('/', "\\")
                };
                return Some(format!("{}{}", rule.local, rest));
            }
            if rule.remote.len() == remote_path.len() + 1 && rule.remote.starts_with(remote_path) {
                return Some(rule.local[..rule.local.len() - 1].to_string());
            }
        }
        None
    }

    /// Map a local path to a remote script name.
    pub fn to_remote(&self, local_path: &str) -> Option<String> {
        let path = normalize_local(local_path);
        for rule in &self.rules {
            if let Some(len) = rule.matches_local(&path) {
                return Some(format!("{}{}", rule.remote, &path[len..]));
            }
            let bare = rule.local_base.trim_end_matches('/');
            if !bare.is_empty() && path.trim_end_matches('/') == bare {
                return Some(rule.remote[..rule.remote.len() - 1].to_string());
            }
        }
        None
    }
}

/// Unify separators to `/` and resolve `.` and `..` segments lexically.
fn normalize_local(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trailing = unified.ends_with('/');
    let mut out: Vec<&str> = Vec::new();
    for (i, segment) in unified.split('/').enumerate() {
        match segment {
            "." => {}
            "" if i > 0 => {}
            ".." => match out.last().copied() {
                // Never climb above a root or a drive.
                Some("") => {}
                Some(last) if last.ends_with(':') => {}
                Some(last) if last != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            s => out.push(s),
        }
    }
    let mut joined = out.join("/");
    if trailing && !joined.ends_with('/') {
        joined.push('/');
    }
    joined
}
