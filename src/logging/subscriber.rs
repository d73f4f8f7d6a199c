//! Tracing subscriber setup: console formatter, per-run log file, and
//! attribution of events to the step that emitted them.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::span::{Attributes, Id};
use tracing_subscriber::registry::LookupSpan;

use super::utils::{header_timestamp, line_timestamp, log_file_path, previous_log_path, strip_ansi};

/// Name of the span the runner opens around each step.
pub const STEP_SPAN: &str = "step";

pub(super) const STAGE_TARGET: &str = "provision::stage";
pub(super) const DRY_RUN_TARGET: &str = "provision::dry_run";

/// Where console output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleOutput {
    /// Info and debug on stdout, warnings and errors on stderr.
    #[default]
    Split,
    /// Everything on stderr; stdout carries machine-readable output.
    Stderr,
}

/// Pulls the `message` field, or the `id` field of a step span.
#[derive(Default)]
struct FieldExtractor {
    message: String,
    step_id: Option<String>,
}

impl tracing::field::Visit for FieldExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "id" => self.step_id = Some(format!("{value:?}")),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "id" => self.step_id = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Span extension holding the step id recorded when the span was created.
struct StepId(String);

/// Id of the innermost step span around the current event, if any.
fn current_step<S>(ctx: &tracing_subscriber::layer::Context<'_, S>, event: &tracing::Event<'_>) -> Option<String>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    ctx.event_scope(event)?
        .find_map(|span| span.extensions().get::<StepId>().map(|s| s.0.clone()))
}

/// Appends every event, debug included, to the command's log file.
///
/// The previous run's file is kept as `<command>.log.1`.  Lines emitted
/// inside a step span carry the step id, so a run can be followed step by
/// step even when the console showed only the summary.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Rotate the old log aside and open a fresh one with a header.
    ///
    /// Returns `None` if the log directory or file cannot be created; the
    /// run continues with console output only.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        if path.exists() {
            fs::rename(&path, previous_log_path(&path)).ok();
        }
        let version =
            option_env!("PROVISION_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let mut file = fs::File::create(&path).ok()?;
        writeln!(
            file,
            "# provision {command} {version}, started {}",
            header_timestamp()
        )
        .ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }

    fn format_line(level: tracing::Level, target: &str, step: Option<&str>, msg: &str) -> String {
        let tag = match (level, target) {
            (tracing::Level::INFO, STAGE_TARGET) => "==>",
            (tracing::Level::INFO, DRY_RUN_TARGET) => "dry-run",
            (tracing::Level::ERROR, _) => "error",
            (tracing::Level::WARN, _) => "warn",
            (tracing::Level::DEBUG | tracing::Level::TRACE, _) => "debug",
            _ => "info",
        };
        let scope = step.map(|id| format!("[{id}] ")).unwrap_or_default();
        format!("{} {tag:<7} {scope}{msg}", line_timestamp())
    }
}

impl<S> tracing_subscriber::Layer<S> for FileLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &Attributes<'_>,
        id: &Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if attrs.metadata().name() != STEP_SPAN {
            return;
        }
        let mut fields = FieldExtractor::default();
        attrs.record(&mut fields);
        if let (Some(step_id), Some(span)) = (fields.step_id, ctx.span(id)) {
            span.extensions_mut().insert(StepId(step_id));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let mut fields = FieldExtractor::default();
        event.record(&mut fields);
        let step = current_step(&ctx, event);
        let line = Self::format_line(
            *metadata.level(),
            metadata.target(),
            step.as_deref(),
            &strip_ansi(&fields.message),
        );

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console formatter: `==>` stage headers, coloured warning and error tags,
/// indented detail lines.
struct ConsoleFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let mut fields = FieldExtractor::default();
        event.record(&mut fields);
        let msg = &fields.message;

        match (*metadata.level(), metadata.target()) {
            (tracing::Level::ERROR, _) => writeln!(writer, "  \x1b[31m✗\x1b[0m {msg}"),
            (tracing::Level::WARN, _) => writeln!(writer, "  \x1b[33m!\x1b[0m {msg}"),
            (tracing::Level::INFO, STAGE_TARGET) => {
                writeln!(writer, "\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            (tracing::Level::INFO, DRY_RUN_TARGET) => {
                writeln!(writer, "  \x1b[36m~\x1b[0m {msg}")
            }
            (tracing::Level::INFO, _) => writeln!(writer, "    {msg}"),
            _ => writeln!(writer, "    \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Install the global [`tracing`] subscriber.
///
/// The console shows info and above (debug with `verbose`) routed per
/// `output`; the log file under the cache directory receives everything.
/// A second call, as happens under an integration test harness, is ignored.
pub fn init_subscriber(verbose: bool, command: &str, output: ConsoleOutput) {
    use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt as _};
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = match output {
        ConsoleOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        ConsoleOutput::Split => BoxMakeWriter::new(
            std::io::stderr
                .with_max_level(tracing::Level::WARN)
                .and(std::io::stdout.with_min_level(tracing::Level::INFO)),
        ),
    };

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(make_writer)
        .with_filter(console_level);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn file_line_tags_level_and_step() {
        let line = FileLayer::format_line(
            tracing::Level::WARN,
            "workstation_provision::engine",
            Some("toolchain:go"),
            "using 1.22.1",
        );
        // Timestamp prefix is `HH:MM:SS.mmm `.
        assert_eq!(&line[13..], "warn    [toolchain:go] using 1.22.1");
    }

    #[test]
    fn file_line_without_step() {
        let line = FileLayer::format_line(tracing::Level::INFO, STAGE_TARGET, None, "Summary");
        assert_eq!(&line[13..], "==>     Summary");
    }

    #[test]
    fn dry_run_target_is_tagged() {
        let line = FileLayer::format_line(tracing::Level::INFO, DRY_RUN_TARGET, None, "would apply");
        assert_eq!(&line[13..], "dry-run would apply");
    }
}
