//! robots.txt parser (§4.1).
//!
//! Groups are delimited by `User-agent:` lines; each group accumulates
//! `Disallow`, `Allow`, and `Crawl-delay` directives plus any `Sitemap:`
//! entries, which are global (not scoped to a group) per the de facto
//! standard.

use std::sync::LazyLock;

use regex::Regex;

static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([a-z-]+)\s*:\s*(.*?)\s*$").expect("valid regex"));

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt rules, scoped to the user-agent the caller fetched
/// with (§4.1). Constructed via [`parse`].
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<(bool, String)>, // (is_allow, path_pattern)
    crawl_delay: Option<f64>,
    pub sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Treat the site as "allow all" — used when robots.txt is missing or
    /// unreadable and `respect_robots` is still true (§4.1).
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether `path` (the URL path, e.g. `/docs/internal/x`) is allowed.
    ///
    /// Longest-match-wins per the de facto standard: the most specific
    /// matching rule (by pattern length) decides; ties favor Allow.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best_len = 0usize;
        let mut best_allow = true;
        let mut matched = false;

        for (is_allow, pattern) in &self.rules {
            if pattern.is_empty() || !matches_pattern(path, pattern) {
                continue;
            }
            let len = pattern.len();
            if !matched || len > best_len || (len == best_len && *is_allow) {
                best_len = len;
                best_allow = *is_allow;
                matched = true;
            }
        }

        !matched || best_allow
    }

    /// The `Crawl-delay` directive for the matched group, if any.
    pub fn crawl_delay(&self) -> Option<std::time::Duration> {
        self.crawl_delay.map(std::time::Duration::from_secs_f64)
    }
}

/// A glob-ish robots.txt path match: `*` wildcards and a trailing `$`
/// end-anchor, both per the de facto extension most crawlers honor.
fn matches_pattern(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = path;
    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            continue;
        }
        match rest.find(seg) {
            Some(pos) if i == 0 && pos != 0 => return false,
            Some(pos) => rest = &rest[pos + seg.len()..],
            None => return false,
        }
    }
    if anchored {
        rest.is_empty()
    } else {
        true
    }
}

/// Parse a robots.txt document, selecting the group matching
/// `user_agent` (falling back to `*`) and collecting all `Sitemap:`
/// entries regardless of group.
pub fn parse(content: &str, user_agent: &str) -> RobotsRules {
    let ua_lower = user_agent.to_ascii_lowercase();
    let mut groups: Vec<Group> = Vec::new();
    let mut sitemaps: Vec<String> = Vec::new();
    let mut current: Option<Group> = None;

    for raw_line in content.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = DIRECTIVE_RE.captures(line) else {
            continue;
        };
        let key = caps[1].to_ascii_lowercase();
        let value = caps[2].to_string();

        match key.as_str() {
            "user-agent" => {
                if current
                    .as_ref()
                    .is_some_and(|g| !g.disallow.is_empty() || !g.allow.is_empty() || g.crawl_delay.is_some())
                {
                    groups.push(current.take().unwrap());
                }
                let group = current.get_or_insert_with(Group::default);
                group.agents.push(value.to_ascii_lowercase());
            }
            "disallow" => {
                current.get_or_insert_with(Group::default).disallow.push(value);
            }
            "allow" => {
                current.get_or_insert_with(Group::default).allow.push(value);
            }
            "crawl-delay" => {
                if let Ok(secs) = value.parse::<f64>() {
                    current.get_or_insert_with(Group::default).crawl_delay = Some(secs);
                }
            }
            "sitemap" => sitemaps.push(value),
            _ => {}
        }
    }
    if let Some(group) = current {
        groups.push(group);
    }

    let chosen = groups
        .iter()
        .find(|g| g.agents.iter().any(|a| a != "*" && ua_lower.contains(a)))
        .or_else(|| groups.iter().find(|g| g.agents.iter().any(|a| a == "*")));

    let mut rules = Vec::new();
    let mut crawl_delay = None;
    if let Some(group) = chosen {
        for p in &group.disallow {
            rules.push((false, p.clone()));
        }
        for p in &group.allow {
            rules.push((true, p.clone()));
        }
        crawl_delay = group.crawl_delay;
    }

    RobotsRules {
        rules,
        crawl_delay,
        sitemaps,
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}
