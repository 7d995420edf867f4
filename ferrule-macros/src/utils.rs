use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Splits a `TokenStream` into top-level comma-separated arguments.
///
/// Groups (`(...)`, `{...}`, `[...]`) arrive as single token trees, so
/// commas nested inside them never split an argument.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens back into Rust source.
///
/// Consecutive identifiers are separated by a space so that
/// `async move` does not collapse into `asyncmove`.
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// Reads `worker_threads = N` out of an attribute argument list.
///
/// Unknown keys are ignored.
pub(crate) fn parse_worker_threads(attr: &TokenStream) -> Option<usize> {
    let attr = attr.to_string();

    attr.split(',').find_map(|part| {
        part.trim()
            .strip_prefix("worker_threads")
            .map(|v| v.trim_start().trim_start_matches('=').trim())
            .and_then(|v| v.parse::<usize>().ok())
    })
}

/// Returns the source of the `RuntimeBuilder` expression used by the
/// attribute macros.
pub(crate) fn builder_source(worker_threads: Option<usize>) -> String {
    let mut builder = String::from("::ferrule::RuntimeBuilder::new()");

    if let Some(n) = worker_threads {
        builder.push_str(&format!(".worker_threads({n})"));
    }

    builder.push_str(".build()");
    builder
}

/// Strips `async` from a function signature and swaps its body for the
/// one produced by `wrap`.
///
/// Returns `None` when the item has no brace-delimited body.
pub(crate) fn rewrite_async_fn(
    item: TokenStream,
    wrap: impl FnOnce(String) -> String,
) -> Option<Vec<TokenTree>> {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    if let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(async_pos);
    }

    let pos = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))?;

    let body = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => return None,
    };

    let new_body: TokenStream = wrap(body).parse().ok()?;
    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, new_body));

    Some(tokens)
}
