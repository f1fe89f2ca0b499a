//! The agent's brain: turns a free-text task description into actions.
//!
//! Parsing is a fixed, ordered rule table. Every rule is tried against the
//! whole description and every rule that matches contributes an action, so
//! the output order is rule order (navigate, search, click, fill, scroll,
//! wait) and never the order the phrases appear in the text. When nothing
//! matches the whole description becomes a single `General` action.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Action, ScrollDirection};

static NAVIGATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:go to|navigate to|open)\s+(?:the\s+)?(?:website\s+)?(?:url\s+)?(\S+(?:\.\S+)+)")
        .expect("navigate pattern")
});

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:search for|look up|find)\s+(.+?)(?:\s+on|\s+in|$)").expect("search pattern")
});

static CLICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:click|press|select)\s+(?:on\s+)?(?:the\s+)?(.+?)(?:\s+button|\s+link|\s+element)?$")
        .expect("click pattern")
});

static FILL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:fill|enter|type)\s+(.+?)\s+(?:in|into|on)\s+(.+)").expect("fill pattern")
});

static WAIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)wait\s+(\d+)\s*(?:second|sec|s)?").expect("wait pattern")
});

/// One entry of the rule table. `triggers` is a cheap pre-check on the
/// lowercased text; `extract` pulls the action out of the original text.
struct Rule {
    name: &'static str,
    triggers: &'static [&'static str],
    extract: fn(description: &str, lower: &str) -> Option<Action>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "navigate",
        triggers: &["go to", "navigate to", "open"],
        extract: extract_navigate,
    },
    Rule {
        name: "search",
        triggers: &["search for", "look up", "find"],
        extract: extract_search,
    },
    Rule {
        name: "click",
        triggers: &["click", "press", "select"],
        extract: extract_click,
    },
    Rule {
        name: "fill",
        triggers: &["fill", "enter", "type"],
        extract: extract_fill,
    },
    Rule {
        name: "scroll",
        triggers: &["scroll"],
        extract: extract_scroll,
    },
    Rule {
        name: "wait",
        triggers: &["wait"],
        extract: extract_wait,
    },
];

/// Parse a task description into the ordered list of actions to run.
///
/// Total: never fails and never returns an empty list.
pub fn parse(description: &str) -> Vec<Action> {
    let lower = description.to_lowercase();

    let mut actions: Vec<Action> = RULES
        .iter()
        .filter(|rule| rule.triggers.iter().any(|t| lower.contains(t)))
        .filter_map(|rule| {
            let action = (rule.extract)(description, &lower);
            if action.is_none() {
                tracing::trace!(rule = rule.name, "trigger matched but nothing extracted");
            }
            action
        })
        .collect();

    if actions.is_empty() {
        actions.push(Action::General {
            description: description.to_string(),
        });
    }

    tracing::debug!(count = actions.len(), "parsed task description");
    actions
}

fn extract_navigate(description: &str, _lower: &str) -> Option<Action> {
    let caps = NAVIGATE_RE.captures(description)?;
    let raw = caps[1].trim_end_matches(['.', ',', ';', '!', '?']);
    if !raw.contains('.') {
        return None;
    }
    let url = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Some(Action::Navigate { url })
}

fn extract_search(description: &str, _lower: &str) -> Option<Action> {
    let caps = SEARCH_RE.captures(description)?;
    let query = caps[1].trim();
    (!query.is_empty()).then(|| Action::Search {
        query: query.to_string(),
    })
}

fn extract_click(description: &str, _lower: &str) -> Option<Action> {
    let caps = CLICK_RE.captures(description)?;
    let target = caps[1].trim();
    (!target.is_empty()).then(|| Action::Click {
        target: target.to_string(),
    })
}

fn extract_fill(description: &str, _lower: &str) -> Option<Action> {
    let caps = FILL_RE.captures(description)?;
    Some(Action::Fill {
        value: caps[1].trim().to_string(),
        field: caps[2].trim().to_string(),
    })
}

fn extract_scroll(_description: &str, lower: &str) -> Option<Action> {
    // "down" wins when both words appear.
    let direction = if lower.contains("down") {
        ScrollDirection::Down
    } else if lower.contains("up") {
        ScrollDirection::Up
    } else {
        return None;
    };
    Some(Action::Scroll { direction })
}

fn extract_wait(description: &str, _lower: &str) -> Option<Action> {
    let caps = WAIT_RE.captures(description)?;
    let seconds = caps[1].parse().ok()?;
    Some(Action::Wait { seconds })
}
