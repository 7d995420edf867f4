mod utils;

use proc_macro::{TokenStream, TokenTree};

/// Awaits several futures concurrently on the current task and returns
/// their outputs as a tuple, in argument order.
///
/// With a single future its output is returned as is.
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);
    let count = args.len();

    if count == 0 {
        return "()".parse().unwrap();
    }

    if count == 1 {
        let expr = utils::tokens_to_string(&args[0]);
        return format!("{{ ({expr}).await }}").parse().unwrap();
    }

    let mut output = String::new();
    output.push_str("{\n");

    for (i, expr_tokens) in args.iter().enumerate() {
        let idx = i + 1;
        let expr = utils::tokens_to_string(expr_tokens);
        output.push_str(&format!(
            "let mut __f{idx} = (::std::boxed::Box::pin({expr}), ::core::option::Option::None::<_>);\n"
        ));
    }

    output.push_str("::std::future::poll_fn(move |cx| {\n");
    output.push_str("    use ::std::future::Future;\n");
    output.push_str("    use ::std::task::Poll;\n");

    for i in 1..=count {
        output.push_str(&format!(
            "    if __f{i}.1.is_none() {{\n\
                    if let Poll::Ready(val) = __f{i}.0.as_mut().poll(cx) {{\n\
                        __f{i}.1 = ::core::option::Option::Some(val);\n\
                    }}\n\
                }}\n"
        ));
    }

    let all_done = (1..=count)
        .map(|i| format!("__f{i}.1.is_some()"))
        .collect::<Vec<_>>()
        .join(" && ");

    output.push_str(&format!("    if {all_done} {{\n"));
    output.push_str("        Poll::Ready((\n");

    for i in 1..=count {
        output.push_str(&format!("            __f{i}.1.take().unwrap(),\n"));
    }

    output.push_str("        ))\n");
    output.push_str("    } else {\n");
    output.push_str("        Poll::Pending\n");
    output.push_str("    }\n");
    output.push_str("}).await\n");
    output.push_str("}\n");

    match output.parse::<TokenStream>() {
        Ok(ts) => ts,
        Err(err) => format!("compile_error!(\"join macro error: {err}\");")
            .parse()
            .unwrap(),
    }
}

/// Runs an `async fn main` on a freshly built runtime.
///
/// Accepts an optional `worker_threads = N` argument.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = utils::builder_source(utils::parse_worker_threads(&attr));

    let rewritten = utils::rewrite_async_fn(item, |body| {
        format!(
            "{{
                let runtime = {builder};
                runtime.block_on(async move {{ {body} }})
            }}"
        )
    });

    match rewritten {
        Some(tokens) => tokens.into_iter().collect(),
        None => "compile_error!(\"#[ferrule::main] expects an async fn with a body\");"
            .parse()
            .unwrap(),
    }
}

/// Turns an `async fn` into a `#[test]` that runs on its own runtime.
///
/// Accepts an optional `worker_threads = N` argument.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = utils::builder_source(utils::parse_worker_threads(&attr));

    let rewritten = utils::rewrite_async_fn(item, |body| {
        format!(
            "{{
                let runtime = {builder};
                runtime.block_on(async move {{ {body} }});
            }}"
        )
    });

    let Some(tokens) = rewritten else {
        return "compile_error!(\"#[ferrule::test] expects an async fn with a body\");"
            .parse()
            .unwrap();
    };

    let test_attr: TokenStream = "#[test]".parse().unwrap();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
