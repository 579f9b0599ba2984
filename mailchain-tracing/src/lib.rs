#![warn(clippy::pedantic)]

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{
    ItemFn, Stmt,
    parse::{Parse, ParseStream},
    parse_macro_input, parse_quote,
};

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
    syn::custom_keyword!(level);
}

#[derive(PartialEq, Eq, Clone, Copy, Default)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
    Unspecified,
}

impl Precision {
    /// Closure used by the exit event to render the elapsed time.
    fn formatter(self) -> syn::Expr {
        match self {
            Self::Nanos => {
                parse_quote!(|d: std::time::Duration| format!("{} ns elapsed", d.as_nanos()))
            }
            Self::Micros => {
                parse_quote!(|d: std::time::Duration| format!("{} us elapsed", d.as_micros()))
            }
            Self::Millis => {
                parse_quote!(|d: std::time::Duration| format!("{} ms elapsed", d.as_millis()))
            }
            Self::Seconds => {
                parse_quote!(|d: std::time::Duration| format!("{} s elapsed", d.as_secs()))
            }
            Self::Unspecified => parse_quote!(|_: std::time::Duration| String::default()),
        }
    }
}

impl From<&str> for Precision {
    fn from(value: &str) -> Self {
        match value {
            "ns" | "nano" | "nanos" | "nanoseconds" => Self::Nanos,
            "us" | "micro" | "micros" | "microseconds" => Self::Micros,
            "ms" | "milli" | "millis" | "milliseconds" => Self::Millis,
            "s" | "sec" | "secs" | "seconds" => Self::Seconds,
            _ => Self::Unspecified,
        }
    }
}

impl Parse for Precision {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if !input.peek(syn::token::Paren) {
            return Ok(Self::default());
        }

        let content;
        let _ = syn::parenthesized!(content in input);
        let _ = content.parse::<keywords::precision>()?;
        let _ = content.parse::<syn::Token![=]>()?;
        let precision = content.parse::<syn::LitStr>()?.value();

        Ok(Self::from(precision.as_str()))
    }
}

/// Level of the enter/exit events emitted around the function body.
#[derive(Clone, Copy, Default)]
enum EventLevel {
    #[default]
    Trace,
    Debug,
    Info,
}

impl EventLevel {
    fn event_macro(self) -> syn::Path {
        match self {
            Self::Trace => parse_quote!(tracing::trace),
            Self::Debug => parse_quote!(tracing::debug),
            Self::Info => parse_quote!(tracing::info),
        }
    }
}

impl Parse for EventLevel {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let _ = input.parse::<syn::Token![=]>()?;
        let level = input.parse::<syn::LitStr>()?;

        match level.value().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(syn::Error::new(
                level.span(),
                format!("unsupported event level `{other}`, expected trace, debug or info"),
            )),
        }
    }
}

#[derive(Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
    level: Option<EventLevel>,
    warnings: Vec<syn::Error>,
}

impl Attributes {
    fn warnings(&self) -> TokenStream {
        let warnings = self.warnings.iter().map(|err| {
            let msg = format!("found unrecognized input, {err}");
            let msg = syn::LitStr::new(&msg, err.span());

            quote_spanned! {err.span()=>
                #[warn(deprecated)]
                {
                    #[deprecated(since = "not actually deprecated", note = #msg)]
                    const TRACED_ATTRIBUTE_WARNING: () = ();
                    let _ = TRACED_ATTRIBUTE_WARNING;
                }
            }
        });

        quote! {
            { #(#warnings)* }
        }
    }
}

impl Parse for Attributes {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut attributes = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::timing) {
                if attributes.timing.is_some() {
                    return Err(input.error("expected only a single `timing` argument"));
                }

                let _ = input.parse::<keywords::timing>()?;
                attributes.timing = Some(input.parse()?);
            } else if lookahead.peek(keywords::instrument) {
                if attributes.instrument.is_some() {
                    return Err(input.error("expected only a single `instrument` argument"));
                }

                let _ = input.parse::<keywords::instrument>()?;
                if input.peek(syn::token::Paren) {
                    let content;
                    let _ = syn::parenthesized!(content in input);
                    attributes.instrument = Some(content.parse()?);
                } else {
                    attributes.instrument = Some(TokenStream::new());
                }
            } else if lookahead.peek(keywords::level) {
                if attributes.level.is_some() {
                    return Err(input.error("expected only a single `level` argument"));
                }

                let _ = input.parse::<keywords::level>()?;
                attributes.level = Some(input.parse()?);
            } else if lookahead.peek(syn::Token![,]) {
                let _ = input.parse::<syn::Token![,]>()?;
            } else {
                attributes.warnings.push(lookahead.error());
                let _ = input.parse::<proc_macro2::TokenTree>();
            }
        }

        Ok(attributes)
    }
}

fn expand(args: &Attributes, item_fn: &mut ItemFn) {
    let warnings = args.warnings();
    let event = args.level.unwrap_or_default().event_macro();
    let id = item_fn.sig.ident.to_string();

    item_fn
        .attrs
        .push(parse_quote!(#[allow(clippy::items_after_statements)]));

    if let Some(fields) = &args.instrument {
        item_fn
            .attrs
            .push(parse_quote!(#[tracing::instrument(#fields)]));
    }

    let on_exit: Stmt = match args.timing {
        Some(precision) => {
            let formatter = precision.formatter();
            parse_quote! { #event!("OnExit: {} ({})", #id, (#formatter)(self.timer.elapsed())); }
        }
        None => parse_quote! { #event!("OnExit: {}", #id); },
    };

    let prelude: Vec<Stmt> = parse_quote! {
        struct __Traced {
            timer: std::time::Instant,
        }

        impl __Traced {
            fn enter() -> Self {
                #warnings

                #event!("OnEnter: {}", #id);
                Self {
                    timer: std::time::Instant::now(),
                }
            }
        }

        impl std::ops::Drop for __Traced {
            fn drop(&mut self) {
                let _ = self.timer;
                #on_exit
            }
        }

        let __traced = __Traced::enter();
    };

    item_fn.block.stmts.splice(0..0, prelude);
}

/// Emits enter and exit events around the attributed function, optionally
/// inside a `tracing::instrument` span and with the elapsed time on exit.
///
/// ```ignore
/// #[traced(instrument(level = "debug", skip_all), timing(precision = "ms"))]
/// async fn dispatch(&self) { .. }
/// ```
///
/// # Panics
///
/// When applied to anything other than a function.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(args as Attributes);
    let mut item_fn = parse_macro_input!(item as ItemFn);

    expand(&args, &mut item_fn);

    proc_macro::TokenStream::from(quote! { #item_fn })
}
