/// Upper bound on the number of vote options; tally storage is always this wide.
pub const MAX_OPTIONS: usize = 8;

/// Turns a chat message body into a 0-based option index.
#[derive(Debug, Clone, Copy)]
pub struct OptionResolver {
    max_options: usize,
    demo: bool,
}

impl OptionResolver {
    pub fn new(max_options: usize) -> Self {
        Self {
            max_options: max_options.clamp(1, MAX_OPTIONS),
            demo: false,
        }
    }

    /// In demo mode text that is not a vote is mapped onto a synthetic
    /// option derived from its first character.
    pub fn with_demo(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }

    pub fn max_options(&self) -> usize {
        self.max_options
    }

    /// Returns the option for a message whose first character is a digit in
    /// `1..=max_options`, or `None` for anything else.
    pub fn parse(&self, text: &str) -> Option<usize> {
        let first = text.chars().next()?;
        match first.to_digit(10) {
            Some(d) if first.is_ascii_digit() && d >= 1 && d as usize <= self.max_options => {
                Some(d as usize - 1)
            }
            _ if self.demo => Some(first as usize % self.max_options),
            _ => None,
        }
    }
}

impl Default for OptionResolver {
    fn default() -> Self {
        Self::new(MAX_OPTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_digits() {
        let resolver = OptionResolver::default();
        assert_eq!(resolver.parse("1"), Some(0));
        assert_eq!(resolver.parse("8"), Some(7));
        assert_eq!(resolver.parse("3abc"), Some(2));
        assert_eq!(resolver.parse("2 please"), Some(1));
    }

    #[test]
    fn test_parse_rejects_out_of_range_and_text() {
        let resolver = OptionResolver::default();
        assert_eq!(resolver.parse("9"), None);
        assert_eq!(resolver.parse("0"), None);
        assert_eq!(resolver.parse("abc"), None);
        assert_eq!(resolver.parse(""), None);
        assert_eq!(resolver.parse(" 1"), None);
        assert_eq!(resolver.parse("١"), None);
    }

    #[test]
    fn test_parse_respects_smaller_bound() {
        let resolver = OptionResolver::new(4);
        assert_eq!(resolver.parse("4"), Some(3));
        assert_eq!(resolver.parse("5"), None);
    }

    #[test]
    fn test_new_clamps_bound() {
        assert_eq!(OptionResolver::new(20).max_options(), MAX_OPTIONS);
        assert_eq!(OptionResolver::new(0).max_options(), 1);
    }

    #[test]
    fn test_demo_mode_synthesizes_index() {
        let resolver = OptionResolver::default().with_demo(true);
        // 'a' is 97, 97 % 8 == 1
        assert_eq!(resolver.parse("abc"), Some(1));
        assert_eq!(resolver.parse("abc"), resolver.parse("a"));
        assert_eq!(resolver.parse("3"), Some(2));
        assert_eq!(resolver.parse(""), None);
    }
}
