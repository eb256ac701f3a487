//! flowpipe - run a NetFlow segment pipeline described in a TOML file.
//!
//! Records are read and written by the `stdin` and `stdout` segments; logs
//! go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use flowpipe::{codec, Config, Pipeline, SegmentRegistry};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowpipe")]
#[command(about = "Run a pipeline of flow record segments")]
#[command(version)]
struct Cli {
    /// Pipeline definition
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print the available segment names and exit
    #[arg(long)]
    list_segments: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print pipeline metrics to stderr after shutdown
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    // A read of the process' stdin may still be parked on a blocking thread;
    // exiting here keeps runtime teardown from waiting for it.
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let registry = SegmentRegistry::with_builtin();

    if cli.list_segments {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    info!("Loading configuration from: {}", cli.config);
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    let mut pipeline =
        Pipeline::from_config(&config, &registry).context("failed to build pipeline")?;
    let metrics = pipeline.metrics();

    pipeline.start()?;

    let writer = if config.pipeline.auto_drain {
        pipeline.auto_drain();
        None
    } else {
        pipeline.take_output().map(|mut output| {
            tokio::spawn(async move {
                let mut stdout = tokio::io::stdout();
                while let Some(record) = output.recv().await {
                    let line = match codec::encode(&record) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!("dropping record that cannot be encoded: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write_record(&mut stdout, &line).await {
                        warn!("failed to write record: {}", e);
                    }
                }
            })
        })
    };

    let stop = pipeline.stop_token();
    let ctrl_c = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal (Ctrl+C)");
                stop.cancel();
            }
            Err(e) => error!("failed to listen for Ctrl+C: {}", e),
        }
    });

    // Nothing is injected from here, so shutdown closes the head queue right
    // away; the sources end at EOF or on Ctrl+C.
    let summary = pipeline.shutdown().await.context("pipeline failed")?;
    ctrl_c.abort();
    if let Some(writer) = writer {
        writer.await.context("output writer failed")?;
    }
    for segment in &summary.segments {
        info!(
            segment = %segment.segment,
            forwarded = segment.forwarded,
            dropped = segment.dropped,
            "segment finished"
        );
    }
    info!(drained = summary.drained, "pipeline finished");

    if cli.metrics {
        eprint!("{}", metrics.gather_text()?);
    }
    Ok(())
}

async fn write_record(stdout: &mut tokio::io::Stdout, line: &[u8]) -> std::io::Result<()> {
    stdout.write_all(line).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
