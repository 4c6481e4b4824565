/// Characters that always form a token of their own inside a substitution.
const SINGLE_CHAR_TOKENS: &[char] = &[
    '(', ')', '>', '<', '#', '~', '&', '|', '-', '!', ']', '@', '$', ':',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Open,
    Close,
    /// One of the single-character tokens other than parentheses.
    Sigil(char),
    /// A lone `%`, pasted as a space.
    Percent,
    /// `%%`, pasted as a literal `%`.
    DoublePercent,
    /// Maximal run of characters that are neither whitespace nor `)`.
    Word(&'a str),
}

impl Token<'_> {
    /// The source text of the token.
    pub(crate) fn text(&self) -> &str {
        match self {
            Token::Open => "(",
            Token::Close => ")",
            Token::Sigil(c) => sigil_str(*c),
            Token::Percent => "%",
            Token::DoublePercent => "%%",
            Token::Word(w) => w,
        }
    }
}

fn sigil_str(c: char) -> &'static str {
    match c {
        '>' => ">",
        '<' => "<",
        '#' => "#",
        '~' => "~",
        '&' => "&",
        '|' => "|",
        '-' => "-",
        '!' => "!",
        ']' => "]",
        '@' => "@",
        '$' => "$",
        ':' => ":",
        _ => "",
    }
}

/// Splits the text of a substitution into tokens.
///
/// The tokenizer is shared by nested substitutions: a `(` token hands the
/// same tokenizer to the recursive parse, which consumes up to and including
/// the matching `)`.
pub(crate) struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// The next raw character, without skipping whitespace.
    pub(crate) fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.skip_whitespace();
        let first = self.peek_char()?;

        // `-7` is a negative number, a lone `-` a sigil.
        let negative_number = first == '-'
            && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit());
        if SINGLE_CHAR_TOKENS.contains(&first) && !negative_number {
            self.bump();
            return Some(match first {
                '(' => Token::Open,
                ')' => Token::Close,
                other => Token::Sigil(other),
            });
        }

        if first == '%' {
            self.bump();
            if self.peek_char() == Some('%') {
                self.bump();
                return Some(Token::DoublePercent);
            }
            return Some(Token::Percent);
        }

        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || c == ')')
            .unwrap_or(rest.len());
        self.pos += len;
        Some(Token::Word(&rest[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(src: &str) -> Vec<Token<'_>> {
        Tokenizer::new(src).collect()
    }

    #[test]
    fn words_stop_at_whitespace_and_close_paren() {
        assert_eq!(
            tokens("+ 10 (#80))"),
            vec![
                Token::Word("+"),
                Token::Word("10"),
                Token::Open,
                Token::Sigil('#'),
                Token::Word("80"),
                Token::Close,
                Token::Close,
            ]
        );
    }

    #[test]
    fn percent_tokens_are_context_sensitive() {
        assert_eq!(
            tokens("foo %% % %x"),
            vec![
                Token::Word("foo"),
                Token::DoublePercent,
                Token::Percent,
                Token::Percent,
                Token::Word("x"),
            ]
        );
    }

    #[test]
    fn shorthand_sigils_split_from_following_text() {
        assert_eq!(
            tokens(":foo)"),
            vec![Token::Sigil(':'), Token::Word("foo"), Token::Close]
        );
        assert_eq!(tokens("a-b"), vec![Token::Word("a-b")]);
        assert_eq!(tokens("- -64"), vec![Token::Sigil('-'), Token::Word("-64")]);
    }
}
