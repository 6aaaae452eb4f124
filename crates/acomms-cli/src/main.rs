//! Acomms - acoustic telemetry ingest CLI
//!
//! The `acomms` command runs each role of the pipeline as its own process.
//!
//! ## Commands
//!
//! - `listen`: Receive UDP datagrams into the raw log
//! - `classify`: Route raw log lines into per-queue files
//! - `watch`: Live text view over one or more queue files
//! - `spoof`: Send synthetic or replayed datagrams
//! - `digest`: Print the SHA-256 of every queue file

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, Level};

use acomms_core::{
    digest_queue_files, field_extent, parse_timestamp, repeated_timestamp, spoof, Classifier,
    ClassifierConfig, ClassifierCursor, CursorFile, Listener, LiveWindow, QueueStore, QueueType,
    RawLogWriter, RuleSet, Spoofer, TimeRange, WindowConfig, Zoom, METRICS,
};

#[derive(Parser)]
#[command(name = "acomms")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Acoustic telemetry listener, classifier and live window", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive datagrams and append them to the raw log
    Listen {
        /// Address to bind
        #[arg(short, long, env = "ACOMMS_IP", default_value = "0.0.0.0")]
        ip: String,

        /// UDP port to listen on
        #[arg(short, long, env = "ACOMMS_PORT", default_value = "52464")]
        port: u16,

        /// Raw log file
        #[arg(short, long, env = "ACOMMS_RAW_LOG", default_value = "raw.txt")]
        raw_log: PathBuf,

        /// Print every received datagram to stdout
        #[arg(long)]
        echo: bool,
    },

    /// Classify raw log lines into queue files
    Classify {
        /// Raw log file
        #[arg(short, long, env = "ACOMMS_RAW_LOG", default_value = "raw.txt")]
        raw_log: PathBuf,

        /// Directory holding the queue files
        #[arg(short, long, env = "ACOMMS_QUEUE_DIR", default_value = "queues")]
        queue_dir: PathBuf,

        /// Cursor file (default: <queue-dir>/cursor.json)
        #[arg(long, env = "ACOMMS_CURSOR")]
        cursor: Option<PathBuf>,

        /// Ignore the saved cursor and read the raw log from the top
        #[arg(long)]
        from_start: bool,

        /// Delete queue files and cursor, then classify the whole raw log
        #[arg(long, conflicts_with = "from_start")]
        rebuild: bool,

        /// Classify what is there and exit
        #[arg(long)]
        once: bool,

        /// Poll interval in milliseconds
        #[arg(long, env = "ACOMMS_POLL_MS", default_value = "1000")]
        interval_ms: u64,
    },

    /// Live view over queue files
    Watch {
        /// Directory holding the queue files
        #[arg(short, long, env = "ACOMMS_QUEUE_DIR", default_value = "queues")]
        queue_dir: PathBuf,

        /// Queue to follow (repeatable; default: all)
        #[arg(long = "queue")]
        queues: Vec<QueueType>,

        /// Records kept per queue
        #[arg(long, env = "ACOMMS_WINDOW_CAPACITY", default_value = "3600")]
        capacity: usize,

        /// Show only the N most recent records
        #[arg(long, conflicts_with_all = ["since", "until"])]
        last: Option<usize>,

        /// Show records at or after this time
        #[arg(long)]
        since: Option<String>,

        /// Show records at or before this time
        #[arg(long)]
        until: Option<String>,

        /// Print records as JSON lines instead of text
        #[arg(long)]
        records_json: bool,

        /// Render once and exit
        #[arg(long)]
        once: bool,

        /// Poll interval in milliseconds
        #[arg(long, env = "ACOMMS_POLL_MS", default_value = "1000")]
        interval_ms: u64,
    },

    /// Send synthetic datagrams to a listener
    Spoof {
        /// Destination address
        #[arg(short, long, env = "ACOMMS_IP", default_value = "127.0.0.1")]
        ip: String,

        /// Destination UDP port
        #[arg(short, long, env = "ACOMMS_PORT", default_value = "52464")]
        port: u16,

        /// Replay lines from this file instead of generating messages
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Delay between datagrams in milliseconds
        #[arg(long, env = "ACOMMS_SPOOF_MS", default_value = "20000")]
        interval_ms: u64,

        /// Stop after this many datagrams
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// LCG seed for synthetic messages
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Vehicle name used in synthetic messages
        #[arg(long, default_value = "SENTRY")]
        vehicle: String,

        /// Do not print sent datagrams
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the SHA-256 digest of every queue file
    Digest {
        /// Directory holding the queue files
        #[arg(short, long, env = "ACOMMS_QUEUE_DIR", default_value = "queues")]
        queue_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    acomms_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Listen {
            ip,
            port,
            raw_log,
            echo,
        } => cmd_listen(&ip, port, &raw_log, echo).await,
        Commands::Classify {
            raw_log,
            queue_dir,
            cursor,
            from_start,
            rebuild,
            once,
            interval_ms,
        } => {
            let cursor = cursor.unwrap_or_else(|| queue_dir.join("cursor.json"));
            cmd_classify(
                &raw_log,
                &queue_dir,
                &cursor,
                from_start,
                rebuild,
                once,
                Duration::from_millis(interval_ms),
            )
            .await
        }
        Commands::Watch {
            queue_dir,
            queues,
            capacity,
            last,
            since,
            until,
            records_json,
            once,
            interval_ms,
        } => {
            let zoom = zoom_from_args(last, since.as_deref(), until.as_deref())?;
            let config = WindowConfig {
                poll_interval: Duration::from_millis(interval_ms),
                ..WindowConfig::default()
            }
            .with_capacity(capacity)?;
            cmd_watch(&queue_dir, &queues, &config, zoom, records_json, once).await
        }
        Commands::Spoof {
            ip,
            port,
            file,
            interval_ms,
            count,
            seed,
            vehicle,
            quiet,
        } => {
            let target = resolve(&ip, port)?;
            let mut spoofer = match file {
                Some(path) => Spoofer::replay(&path)
                    .with_context(|| format!("Failed to load replay file {}", path.display()))?,
                None => Spoofer::synthetic(seed, vehicle, &[]),
            };
            cmd_spoof(&mut spoofer, target, Duration::from_millis(interval_ms), count, !quiet)
                .await
        }
        Commands::Digest { queue_dir } => cmd_digest(&queue_dir),
    };

    METRICS.flush();
    result
}

/// Watch channel flipped to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = tx.send(true);
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for Ctrl-C, stopping");
                let _ = tx.send(true);
            }
        }
    });
    rx
}

fn resolve(ip: &str, port: u16) -> Result<SocketAddr> {
    (ip, port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid address {ip}:{port}"))?
        .next()
        .ok_or_else(|| anyhow!("No address for {ip}:{port}"))
}

fn zoom_from_args(
    last: Option<usize>,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<Option<Zoom>> {
    if let Some(count) = last {
        return Ok(Some(Zoom::recent(count)));
    }
    let parse = |s: &str| -> Result<DateTime<Utc>> {
        parse_timestamp(s).with_context(|| format!("Invalid time bound {s:?}"))
    };
    let range = TimeRange {
        start: since.map(parse).transpose()?,
        end: until.map(parse).transpose()?,
    };
    Ok((range != TimeRange::default()).then(|| Zoom::range(range)))
}

async fn cmd_listen(ip: &str, port: u16, raw_log: &Path, echo: bool) -> Result<()> {
    let writer = RawLogWriter::open(raw_log)
        .with_context(|| format!("Failed to open raw log {}", raw_log.display()))?;
    let mut listener = Listener::bind((ip, port), writer)
        .await
        .with_context(|| format!("Failed to bind {ip}:{port}"))?
        .verbose(echo);

    info!(
        addr = %listener.local_addr()?,
        raw_log = %raw_log.display(),
        "listening"
    );
    listener.run(shutdown_signal()).await?;
    Ok(())
}

async fn cmd_classify(
    raw_log: &Path,
    queue_dir: &Path,
    cursor_path: &Path,
    from_start: bool,
    rebuild: bool,
    once: bool,
    poll_interval: Duration,
) -> Result<()> {
    let cursor_file = CursorFile::new(cursor_path);
    if rebuild {
        QueueStore::clear(queue_dir)
            .with_context(|| format!("Failed to clear {}", queue_dir.display()))?;
        cursor_file.reset()?;
        info!(queue_dir = %queue_dir.display(), "queue files cleared for rebuild");
    }

    let config = ClassifierConfig::from_env().context("Invalid classifier configuration")?;
    let store = QueueStore::open(queue_dir)
        .with_context(|| format!("Failed to open queue directory {}", queue_dir.display()))?;
    let rules = RuleSet::new(config);

    let mut classifier = if from_start {
        Classifier::with_cursor(raw_log, store, cursor_file, rules, ClassifierCursor::default())
            .context("Failed to roll back queue files")?
    } else {
        Classifier::open(raw_log, store, cursor_file, rules).context("Failed to load cursor")?
    };

    let summary = if once {
        classifier.classify_pending()?
    } else {
        classifier.run(poll_interval, shutdown_signal()).await?
    };

    let cursor = classifier.cursor();
    info!(
        lines = summary.lines,
        routed = summary.routed,
        rejected = summary.rejected,
        offset = cursor.offset,
        line = cursor.line,
        "classifier stopped"
    );
    Ok(())
}

async fn cmd_watch(
    queue_dir: &Path,
    queues: &[QueueType],
    config: &WindowConfig,
    zoom: Option<Zoom>,
    records_json: bool,
    once: bool,
) -> Result<()> {
    let queues = if queues.is_empty() {
        QueueType::ALL.to_vec()
    } else {
        queues.to_vec()
    };
    let mut window = LiveWindow::open(queue_dir, &queues, config);
    window.zoom(zoom);

    if once {
        window.tail()?;
        render(&window, &queues, records_json, false)?;
        window.close();
        return Ok(());
    }

    let mut render_error = None;
    window
        .run(config.poll_interval, shutdown_signal(), |w| {
            if render_error.is_none() {
                if let Err(e) = render(w, &queues, records_json, true) {
                    render_error = Some(e);
                }
            }
        })
        .await?;
    render_error.map_or(Ok(()), Err)
}

fn render(window: &LiveWindow, queues: &[QueueType], records_json: bool, redraw: bool) -> Result<()> {
    let view = window.merged_view(queues);

    if records_json {
        for record in &view {
            println!("{}", record.to_line()?);
        }
        return Ok(());
    }

    if redraw {
        print!("\x1b[2J\x1b[H");
    }
    let zoom = match window.zoom_bounds() {
        None => "all".to_string(),
        Some(Zoom::Recent { count }) => format!("last {count}"),
        Some(Zoom::Range { range }) => format!(
            "{} .. {}",
            range.start.map_or("*".to_string(), |t| t.to_rfc3339()),
            range.end.map_or("*".to_string(), |t| t.to_rfc3339())
        ),
    };
    println!(
        "acomms watch  session {}  showing {} of {} buffered  zoom: {}",
        window.session_id(),
        view.len(),
        window.total_len(),
        zoom
    );

    for queue in queues {
        let queue_view = window.view(*queue);
        let mut summary = format!("  {:<13} {:>5}", queue.as_str(), queue_view.len());
        if queue.is_positional() {
            for field in ["latitude", "longitude"] {
                if let Some(extent) = field_extent(&queue_view, field) {
                    summary.push_str(&format!("  {field} [{:.5}, {:.5}]", extent.min, extent.max));
                }
            }
        }
        if repeated_timestamp(&queue_view) {
            summary.push_str("  (repeated timestamp)");
        }
        println!("{summary}");
    }

    if queues.contains(&QueueType::PositionFix) && queues.contains(&QueueType::Science) {
        if let Some(pair) = window.aligned(QueueType::PositionFix, QueueType::Science).last() {
            let science = pair
                .data
                .map(|d| format_fields(&d.fields))
                .unwrap_or_else(|| "-".to_string());
            println!("  latest fix {}  science {}", pair.fix.timestamp.to_rfc3339(), science);
        }
    }

    println!();
    for record in &view {
        println!(
            "{}  {:<13} {}",
            acomms_core::format_receipt_time(&record.timestamp),
            record.queue.as_str(),
            format_fields(&record.fields)
        );
    }
    Ok(())
}

fn format_fields(fields: &std::collections::BTreeMap<String, acomms_core::FieldValue>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn cmd_spoof(
    spoofer: &mut Spoofer,
    target: SocketAddr,
    interval: Duration,
    count: Option<u64>,
    echo: bool,
) -> Result<()> {
    info!(target = %target, "spoofing datagrams");
    let sent = spoof::send(spoofer, target, interval, count, echo, shutdown_signal())
        .await
        .with_context(|| format!("Failed to send to {target}"))?;
    info!(sent = sent, "spoofer stopped");
    Ok(())
}

fn cmd_digest(queue_dir: &Path) -> Result<()> {
    let digests = digest_queue_files(queue_dir)
        .with_context(|| format!("Failed to read queue files in {}", queue_dir.display()))?;
    if digests.is_empty() {
        println!("No queue files in {}", queue_dir.display());
        return Ok(());
    }
    for (queue, digest) in digests {
        println!("{digest}  {}", queue.file_name());
    }
    Ok(())
}
