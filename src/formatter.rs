//! Result formatter: converts the service's markdown subset into display markup.
//!
//! The conversion is an ordered list of substitution rules, each applied once
//! over the whole text, left to right, never recursively:
//!
//! 1. `### text\n` → `<h3>text</h3>`
//! 2. `## text\n` → `<h2>text</h2>`
//! 3. `# text\n` → `<h1>text</h1>`
//! 4. `**text**` → `<strong>text</strong>`
//! 5. `*text*` → `<em>text</em>`
//! 6. `\n` → `<br>`
//!
//! Longer markers run first so a three-hash line is never taken for a one-hash
//! line, and the double-star rule runs before the single-star rule so it can
//! claim its pairs. Header rules consume their trailing newline.
//!
//! Known limitation: the output is idempotent only when header text contains no
//! literal emphasis markers (`# *a*` is emphasized inside the header).

use regex::Regex;
use std::sync::LazyLock;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule {
            pattern: Regex::new(r"#{3} (.*?)\n").unwrap(),
            replacement: "<h3>${1}</h3>",
        },
        Rule {
            pattern: Regex::new(r"#{2} (.*?)\n").unwrap(),
            replacement: "<h2>${1}</h2>",
        },
        Rule {
            pattern: Regex::new(r"#{1} (.*?)\n").unwrap(),
            replacement: "<h1>${1}</h1>",
        },
        Rule {
            pattern: Regex::new(r"\*\*(.*?)\*\*").unwrap(),
            replacement: "<strong>${1}</strong>",
        },
        Rule {
            pattern: Regex::new(r"\*(.*?)\*").unwrap(),
            replacement: "<em>${1}</em>",
        },
        Rule {
            pattern: Regex::new(r"\n").unwrap(),
            replacement: "<br>",
        },
    ]
});

/// Format analysis text for display.
///
/// # Examples
///
/// ```
/// use app_lib::formatter::format;
///
/// assert_eq!(format("### A\n## B\n"), "<h3>A</h3><h2>B</h2>");
/// assert_eq!(format("**Recyclable**\n"), "<strong>Recyclable</strong><br>");
/// ```
pub fn format(markdown: &str) -> String {
    RULES.iter().fold(markdown.to_string(), |text, rule| {
        rule.pattern
            .replace_all(&text, rule.replacement)
            .into_owned()
    })
}
