// Command line helpers shared by the plugins

/// A prefixed command split into its name, its whitespace separated arguments
/// and the raw text after the command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
    rest: &'a str,
}

impl<'a> Command<'a> {
    /// Returns `None` unless `content` starts with `prefix`.
    pub fn parse(content: &'a str, prefix: &str) -> Option<Self> {
        let body = content.strip_prefix(prefix)?;
        let mut words = body.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args = words.collect();

        let rest = body.trim_start();
        let rest = rest[name.len()..].trim_start();

        Some(Self { name, args, rest })
    }

    /// Text following the first `n` arguments, original spacing kept.
    pub fn text_after(&self, n: usize) -> &'a str {
        let mut rest = self.rest;
        for _ in 0..n {
            let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            rest = rest[word_end..].trim_start();
        }
        rest.trim_end()
    }
}

/// Integer parse that reads a leading sign and digits and ignores the rest,
/// so `"3x"` is 3 and `"abc"` is 0.
pub fn lenient_count(input: Option<&str>) -> i64 {
    let Some(input) = input else {
        return 0;
    };
    let input = input.trim();
    let (sign, digits) = match input.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, input.strip_prefix('+').unwrap_or(input)),
    };

    let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0;
    }
    digits.parse::<i64>().map(|n| sign * n).unwrap_or(i64::MAX * sign)
}

/// First `<@ID>` mention in a message.
pub fn first_mention(content: &str) -> Option<&str> {
    let mut rest = content;
    while let Some(start) = rest.find("<@") {
        let after = &rest[start + 2..];
        if let Some(end) = after.find('>') {
            let id = &after[..end];
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Some(id);
            }
        }
        rest = after;
    }
    None
}

pub fn md_bold(message: &str) -> String {
    format!("**{message}**")
}
