use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Environment variable consulted by [`init`] for the log level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Events about attempts handed to a sender.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($crate::tracing::Level::$level, "outgoing");
        let _enter = span.enter();

        $crate::tracing::event!($crate::tracing::Level::$level, $($msg)*)
    }};

    ($($msg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($msg)*)
    };
}

/// Events about the dispatcher's own bookkeeping.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($crate::tracing::Level::$level, "internal");
        let _enter = span.enter();

        $crate::tracing::event!($crate::tracing::Level::$level, $($msg)*)
    }};

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Installs the global subscriber.
///
/// Only events from `mailchain` targets are kept. The level comes from
/// `LOG_LEVEL`, defaulting to TRACE for debug builds and INFO otherwise.
///
/// # Panics
///
/// If a global subscriber has already been installed.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var(LOG_LEVEL_ENV).ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("mailchain")
                })),
        )
        .init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::{Event, Subscriber};
    use tracing_subscriber::{layer::Context, registry::LookupSpan};

    use super::*;

    #[derive(Clone, Default)]
    struct Recorded(Arc<Mutex<Vec<String>>>);

    impl<S> Layer<S> for Recorded
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let span = ctx
                .event_span(event)
                .map_or_else(String::new, |span| span.name().to_string());
            self.0
                .lock()
                .unwrap()
                .push(format!("{span} {}", event.metadata().level()));
        }
    }

    #[test]
    fn test_macros_wrap_events_in_named_spans() {
        let recorded = Recorded::default();
        let subscriber = tracing_subscriber::Registry::default().with(recorded.clone());

        tracing::subscriber::with_default(subscriber, || {
            crate::outgoing!(level = DEBUG, mailer = "relay", "Attempting delivery");
            crate::internal!(index = 1, "Trying mailer");
        });

        assert_eq!(
            *recorded.0.lock().unwrap(),
            vec!["outgoing DEBUG".to_string(), "internal TRACE".to_string()]
        );
    }

    #[test]
    fn test_level_from_env_value() {
        assert_eq!(level_from(Some("debug"), LevelFilter::INFO), LevelFilter::DEBUG);
        assert_eq!(level_from(Some("WARN"), LevelFilter::INFO), LevelFilter::WARN);
    }

    #[test]
    fn test_level_falls_back_to_default() {
        assert_eq!(level_from(None, LevelFilter::INFO), LevelFilter::INFO);
        assert_eq!(
            level_from(Some("chatty"), LevelFilter::TRACE),
            LevelFilter::TRACE
        );
    }
}
