//! Assembly source tokenizer.

/// Tokenizes assembly source into an ordered list of tokens.
///
/// Tokens are split on ASCII whitespace, except that once a token begins
/// with `"` and does not yet end with a closing `"` (or is only the opening
/// quote itself), following pieces are folded into it with single spaces
/// until a piece ending in `"` arrives. No escape sequences are processed.
/// Tokenization never fails; a string left open runs to the end of the input
/// and is rejected later when it is read as an operand.
pub fn tokenize(source: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();

    for piece in source.split_ascii_whitespace() {
        match tokens.last_mut() {
            Some(last) if mid_string(last) => {
                last.push(' ');
                last.push_str(piece);
            }
            _ => tokens.push(piece.to_string()),
        }
    }

    tokens
}

/// True while `token` is an opened string literal still missing its closing quote.
fn mid_string(token: &str) -> bool {
    token.starts_with('"') && (!token.ends_with('"') || token.len() == 1)
}
