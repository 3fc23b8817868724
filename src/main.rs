use clap::Parser;
use log_tail::{BroadcastRegistry, LineStream, TailConfig, TailEngine};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Follow a log file, printing recent history and then every new line.
#[derive(Parser, Debug)]
#[command(name = "log-tail", version)]
struct Cli {
    /// File to follow
    file: PathBuf,

    /// Wait between polls, in milliseconds
    #[arg(long, default_value_t = 200)]
    poll_interval_ms: u64,

    /// Lines of history to print before following
    #[arg(long, default_value_t = log_tail::DEFAULT_INITIAL_LINES)]
    initial_lines: usize,

    /// Longest unterminated line kept before it is printed anyway
    #[arg(long, default_value_t = log_tail::DEFAULT_MAX_PARTIAL_LINE)]
    max_line_bytes: usize,

    /// Also follow content already in the file when it is first opened
    #[arg(long)]
    from_start: bool,

    /// Poll only, without filesystem notifications
    #[arg(long)]
    no_watch: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = TailConfig::new(&cli.file)
        .poll_interval(Duration::from_millis(cli.poll_interval_ms))
        .initial_lines(cli.initial_lines)
        .max_partial_line(cli.max_line_bytes)
        .start_at_end(!cli.from_start)
        .watch_events(!cli.no_watch);

    // Following from the start must not miss lines read before attaching
    let registry = Arc::new(BroadcastRegistry::new());
    let early_stream = cli.from_start.then(|| LineStream::subscribe(&registry));

    let engine = match TailEngine::with_registry(config, registry).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error setting up tail: {}", e);
            process::exit(1);
        }
    };

    let attached = match early_stream {
        Some(stream) => Ok((Vec::new(), stream)),
        None => engine.attach().await,
    };
    let (history, mut lines) = match attached {
        Ok(attached) => attached,
        Err(e) => {
            eprintln!("Error reading {}: {}", cli.file.display(), e);
            engine.stop().await;
            process::exit(1);
        }
    };

    for line in history {
        println!("{}", line);
    }

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(line) => println!("{}", line),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(lines);
    engine.stop().await;
}
