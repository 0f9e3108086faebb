// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Browser and OS strings from a `User-Agent` header.
//!
//! A small heuristic matcher covering the mainstream engines. Unknown agents
//! fall back to their leading product token.

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    family: &'static str,
}

fn rules(specs: &[(&str, &'static str)]) -> Vec<Rule> {
    specs
        .iter()
        .filter_map(|(pattern, family)| {
            Regex::new(pattern).ok().map(|pattern| Rule { pattern, family })
        })
        .collect()
}

// First match wins, so more specific tokens come before the engines they embed.
static BROWSERS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"Edg(?:e|A|iOS)?/([\d.]+)", "Edge"),
        (r"(?:OPR|Opera)/([\d.]+)", "Opera"),
        (r"MicroMessenger/([\d.]+)", "WeChat"),
        (r"Firefox/([\d.]+)", "Firefox"),
        (r"(?:Chrome|CriOS)/([\d.]+)", "Chrome"),
        (r"Version/([\d.]+).*Safari/", "Safari"),
        (r"(?:MSIE |rv:)([\d.]+)\) like Gecko|MSIE ([\d.]+)", "IE"),
    ])
});

static SYSTEMS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"Windows NT ([\d.]+)", "Windows"),
        (r"(?:iPhone|CPU) OS ([\d_]+)", "iOS"),
        (r"Android ([\d.]+)", "Android"),
        (r"Mac OS X ([\d_.]+)", "Mac OS X"),
        (r"(Linux)", "Linux"),
    ])
});

static PRODUCT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^([A-Za-z][\w.-]*)/([\w.]+)").ok());

/// `(browser, os)` for a User-Agent header value.
pub fn parse_user_agent(user_agent: &str) -> (Option<String>, Option<String>) {
    (browser(user_agent), operating_system(user_agent))
}

fn browser(ua: &str) -> Option<String> {
    for rule in BROWSERS.iter() {
        if let Some(caps) = rule.pattern.captures(ua) {
            let version = caps.iter().skip(1).flatten().next().map(|m| m.as_str());
            return Some(with_version(rule.family, version.map(major_minor)));
        }
    }
    let caps = PRODUCT.as_ref()?.captures(ua)?;
    Some(format!("{} {}", &caps[1], &caps[2]))
}

fn operating_system(ua: &str) -> Option<String> {
    for rule in SYSTEMS.iter() {
        if let Some(caps) = rule.pattern.captures(ua) {
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let version = match rule.family {
                "Windows" => windows_version(raw).map(str::to_string),
                "Linux" => None,
                _ => Some(raw.replace('_', ".")),
            };
            return Some(with_version(rule.family, version));
        }
    }
    None
}

fn with_version(family: &str, version: Option<String>) -> String {
    match version {
        Some(v) if !v.is_empty() => format!("{family} {v}"),
        _ => family.to_string(),
    }
}

fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

fn windows_version(nt: &str) -> Option<&'static str> {
    match nt {
        "10.0" => Some("10"),
        "6.3" => Some("8.1"),
        "6.2" => Some("8"),
        "6.1" => Some("7"),
        _ => None,
    }
}
