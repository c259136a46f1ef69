//! Mention parsing: splits one input line into per-role segments
//!
//! Rules:
//! - `@Name` is a mention when `Name` is a known role (case-insensitive) and the
//!   marker starts the line or follows whitespace. Anything else stays literal text.
//! - Mentions separated only by whitespace form a cluster; a cluster shares one body.
//! - A cluster owns the text that follows it, up to the next cluster or end of line.
//! - Text before the first cluster belongs to the first cluster, so
//!   `Tell me about AI @Tech @Creative` sends the prefix to both roles.
//! - A later cluster with no body of its own yields an empty-body segment;
//!   its roles answer from the shared history.
//! - No mentions at all: the whole line goes to the default role.

use regex::Regex;
use std::sync::LazyLock;

use crate::roles::KnownRoles;
use crate::types::MentionSegment;

/// Default mention marker
pub const DEFAULT_MARKER: char = '@';

static ROLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+").expect("role name pattern is valid"));

/// A known-role mention located in the line (byte offsets include the marker)
#[derive(Debug, Clone, Copy)]
struct Mention<'r> {
    start: usize,
    end: usize,
    role: &'r str,
}

/// Consecutive mentions with only whitespace between them
#[derive(Debug)]
struct Cluster {
    roles: Vec<String>,
    start: usize,
    end: usize,
}

/// Splits raw input into [`MentionSegment`]s
#[derive(Debug, Clone, Copy)]
pub struct MentionParser {
    marker: char,
}

impl Default for MentionParser {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl MentionParser {
    pub fn new(marker: char) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    /// Parse one line. Total: never fails, and returns an empty list only for
    /// a blank line.
    pub fn parse(&self, line: &str, roles: &impl KnownRoles) -> Vec<MentionSegment> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let mentions = self.find_mentions(line, roles);
        if mentions.is_empty() {
            return vec![MentionSegment::new(
                vec![roles.default_id().to_string()],
                line,
            )];
        }

        let clusters = cluster_mentions(line, &mentions);
        let mut segments: Vec<MentionSegment> = clusters
            .iter()
            .enumerate()
            .map(|(i, cluster)| {
                let body_end = clusters.get(i + 1).map_or(line.len(), |next| next.start);
                MentionSegment::new(cluster.roles.clone(), line[cluster.end..body_end].trim())
            })
            .collect();

        let prefix = line[..clusters[0].start].trim();
        if !prefix.is_empty() {
            let first = &mut segments[0];
            first.text = join_text(prefix, &first.text);
        }

        segments
    }

    fn find_mentions<'r>(&self, line: &str, roles: &'r impl KnownRoles) -> Vec<Mention<'r>> {
        let mut mentions = Vec::new();
        for (idx, ch) in line.char_indices() {
            if ch != self.marker {
                continue;
            }
            let at_boundary = line[..idx]
                .chars()
                .next_back()
                .is_none_or(char::is_whitespace);
            if !at_boundary {
                continue;
            }
            let name_start = idx + ch.len_utf8();
            let Some(name) = ROLE_NAME.find(&line[name_start..]) else {
                continue;
            };
            if let Some(role) = roles.canonical_id(name.as_str()) {
                mentions.push(Mention {
                    start: idx,
                    end: name_start + name.end(),
                    role,
                });
            }
        }
        mentions
    }
}

fn cluster_mentions(line: &str, mentions: &[Mention<'_>]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for mention in mentions {
        match clusters.last_mut() {
            Some(current) if line[current.end..mention.start].trim().is_empty() => {
                push_unique(&mut current.roles, [mention.role.to_string()]);
                current.end = mention.end;
            }
            _ => clusters.push(Cluster {
                roles: vec![mention.role.to_string()],
                start: mention.start,
                end: mention.end,
            }),
        }
    }
    clusters
}

fn push_unique(target: &mut Vec<String>, ids: impl IntoIterator<Item = String>) {
    for id in ids {
        if !target.contains(&id) {
            target.push(id);
        }
    }
}

fn join_text(before: &str, after: &str) -> String {
    match (before.is_empty(), after.is_empty()) {
        (true, _) => after.to_string(),
        (_, true) => before.to_string(),
        _ => format!("{} {}", before, after),
    }
}
