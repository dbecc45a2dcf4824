//! promq binary entrypoint.
//!
//! Loads the token and address files, runs the fixed instant query and exits
//! 0 only when a value came back without warnings.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

use promq::{Cli, Config, Deadline, LogFormat, QUERY_DEADLINE, ResultReporter, Verdict};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut reporter = ResultReporter::stdio(cli.format);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return reporter.report_error(&promq::Error::Io(e)).into(),
    };

    runtime.block_on(run(&cli, &mut reporter)).into()
}

async fn run(cli: &Cli, reporter: &mut ResultReporter<io::Stdout, io::Stderr>) -> Verdict {
    // Configuration is read before any network activity.
    let config = match Config::load(&cli.token_file, &cli.address_file) {
        Ok(config) => config,
        Err(e) => return reporter.report_error(&promq::Error::from(e)),
    };

    let client = match promq::connect(&config) {
        Ok(client) => client,
        Err(e) => return reporter.report_error(&promq::Error::Query(e.into())),
    };

    // The deadline covers the query call only, not client construction.
    let deadline = Deadline::after(QUERY_DEADLINE);
    let outcome = client.execute(&promq::default_query(), &deadline).await;
    debug!(success = outcome.is_success(), "query finished");
    reporter.report(outcome)
}

/// HTTP stack targets whose debug output includes the backend address.
const ADDRESS_LOGGING_TARGETS: [&str; 4] = ["reqwest", "hyper", "hyper_util", "h2"];

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// `RUST_LOG` (default `warn`) with the HTTP stack held at `warn`.
fn log_filter() -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    cap_address_logging(filter).unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn cap_address_logging(mut filter: EnvFilter) -> Result<EnvFilter, ParseError> {
    for target in ADDRESS_LOGGING_TARGETS {
        filter = filter.add_directive(format!("{target}=warn").parse()?);
    }
    Ok(filter)
}
