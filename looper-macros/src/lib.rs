//! Attribute macros that run an `async fn` on a [`looper::MainLoop`].
//!
//! - `#[looper::main]` binds the current thread as the main loop, blocks on
//!   the function body, then tears the main loop down.
//! - `#[looper::test]` does the same inside a `#[test]`.
//!
//! Both accept `allow_non_callbacks` (or `allow_non_callbacks = true`) to
//! prepare the looper accepting callback-less registrations.

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Builds the expression that creates the `MainLoop` from the attribute
/// arguments.
fn main_loop_expr(attr: &TokenStream) -> String {
    let attr_str = attr.to_string();
    let mut allow_non_callbacks = false;

    for part in attr_str.split(',') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("allow_non_callbacks") {
            let v = v.trim_start().trim_start_matches('=').trim();
            allow_non_callbacks = v.is_empty() || v == "true";
        }
    }

    format!(
        "::looper::MainLoop::with_options(\
            ::looper::LooperBuilder::new()\
                .allow_non_callbacks({allow_non_callbacks})\
                .options()\
        )"
    )
}

/// Strips `async` from the signature and replaces the body with `wrap(body)`.
fn rewrite(item: TokenStream, wrap: impl FnOnce(String) -> String) -> Vec<TokenTree> {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return tokens;
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    if let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(async_pos);
    }

    let new_block = wrap(block);
    let Some(last) = tokens.last_mut() else {
        return tokens;
    };

    match new_block.parse::<TokenStream>() {
        Ok(stream) => *last = TokenTree::Group(Group::new(Delimiter::Brace, stream)),
        Err(err) => {
            let msg = format!("looper macro error: {err}");
            *last = TokenTree::Group(Group::new(
                Delimiter::Brace,
                format!("compile_error!({msg:?});").parse().unwrap(),
            ));
        }
    }

    tokens
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let main_loop = main_loop_expr(&attr);

    rewrite(item, |block| {
        format!(
            "{{
                let main_loop = {main_loop};
                main_loop
                    .setup()
                    .expect(\"failed to set up the main loop\");
                let output = main_loop
                    .block_on(async move {{ {block} }})
                    .expect(\"main loop stopped before main completed\");
                main_loop
                    .teardown()
                    .expect(\"failed to tear down the main loop\");
                output
            }}"
        )
    })
    .into_iter()
    .collect()
}

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let main_loop = main_loop_expr(&attr);

    let tokens = rewrite(item, |block| {
        format!(
            "{{
                let main_loop = {main_loop};
                main_loop
                    .setup()
                    .expect(\"failed to set up the main loop\");
                main_loop
                    .block_on(async move {{ {block} }})
                    .expect(\"main loop stopped before the test completed\");
                main_loop
                    .teardown()
                    .expect(\"failed to tear down the main loop\");
            }}"
        )
    });

    let test_attr: TokenStream = "#[test]".parse().unwrap();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
