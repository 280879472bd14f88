//! User agent classification
//!
//! Each dimension is an ordered rule table evaluated first-match-wins.
//! The order of the tables is part of the contract: tablet markers before
//! the generic mobile marker, and the Edge token before Chrome, because
//! Edge user agents also carry the Chrome token.

use serde::Serialize;

use crate::models::DeviceType;

/// Result of classifying a single user agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub device_type: DeviceType,
    pub operating_system: Option<String>,
    pub browser: Option<String>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            device_type: DeviceType::Unknown,
            operating_system: None,
            browser: None,
        }
    }
}

/// One entry of an ordered rule table
pub struct Rule<T: 'static> {
    pub matches: fn(&str) -> bool,
    pub label: T,
}

pub const DEVICE_RULES: &[Rule<DeviceType>] = &[
    Rule {
        matches: |ua| ua.contains("Tablet") || ua.contains("iPad"),
        label: DeviceType::Tablet,
    },
    Rule {
        matches: |ua| ua.contains("Mobile"),
        label: DeviceType::Mobile,
    },
];

pub const OS_RULES: &[Rule<&str>] = &[
    Rule {
        matches: |ua| ua.contains("Windows NT 10.0"),
        label: "Windows 10",
    },
    Rule {
        matches: |ua| ua.contains("Windows NT 6.3"),
        label: "Windows 8.1",
    },
    Rule {
        matches: |ua| ua.contains("Windows NT 6.1"),
        label: "Windows 7",
    },
    Rule {
        matches: |ua| ua.contains("Mac OS X"),
        label: "Mac OS X",
    },
    Rule {
        matches: |ua| ua.contains("Linux"),
        label: "Linux",
    },
    Rule {
        matches: |ua| ua.contains("Android"),
        label: "Android",
    },
    Rule {
        matches: |ua| ua.contains("iOS"),
        label: "iOS",
    },
];

pub const BROWSER_RULES: &[Rule<&str>] = &[
    Rule {
        matches: |ua| ua.contains("Edg"),
        label: "Edge",
    },
    Rule {
        matches: |ua| ua.contains("Chrome"),
        label: "Chrome",
    },
    Rule {
        matches: |ua| ua.contains("Firefox"),
        label: "Firefox",
    },
    Rule {
        matches: |ua| ua.contains("Safari") && !ua.contains("Chrome"),
        label: "Safari",
    },
    Rule {
        matches: |ua| ua.contains("Trident") || ua.contains("MSIE"),
        label: "Internet Explorer",
    },
];

/// Label of the first rule that matches, if any
pub fn first_match<T: Copy>(rules: &[Rule<T>], user_agent: &str) -> Option<T> {
    rules
        .iter()
        .find(|rule| (rule.matches)(user_agent))
        .map(|rule| rule.label)
}

/// Classify a raw user agent. Never fails; a missing or empty user agent
/// yields `DeviceType::Unknown` with no OS or browser.
pub fn classify(user_agent: Option<&str>) -> Classification {
    let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
        return Classification::unknown();
    };

    Classification {
        device_type: first_match(DEVICE_RULES, ua).unwrap_or(DeviceType::Desktop),
        operating_system: first_match(OS_RULES, ua).map(str::to_string),
        browser: first_match(BROWSER_RULES, ua).map(str::to_string),
    }
}
