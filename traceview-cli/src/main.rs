//! CLI for the traceview log service.
//!
//! Provides commands for querying a running server, sending payloads to its
//! UDP port, and parsing payloads locally to see how they would be stored.

use std::io::BufRead;
use std::net::UdpSocket;

use clap::{Parser, Subcommand, ValueEnum};
use traceview::{EventRecord, PayloadParser, TraceConfig};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8969";

/// traceview: query and feed a traceview log server.
#[derive(Parser)]
#[command(name = "traceview", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List records in a time range.
    Query {
        /// Base URL of the server.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,

        /// Lower bound (RFC 3339). Omit with --to to page backwards.
        #[arg(long)]
        from: Option<String>,

        /// Upper bound (RFC 3339). Defaults to now on the server.
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of records (the server caps this at 100).
        #[arg(long)]
        count: Option<u32>,

        /// Exclude records stamped exactly on the bounds.
        #[arg(long)]
        exclusive: bool,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Fetch one record by id.
    Get {
        /// Record id.
        id: String,

        /// Base URL of the server.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,

        /// Print the retained original payload instead of the record.
        #[arg(long)]
        payload: bool,
    },

    /// Send payloads to the server's UDP port, one datagram each.
    Send {
        /// Target address.
        #[arg(long, default_value = "127.0.0.1:1969")]
        target: String,

        /// Payloads to send. Reads lines from stdin when none are given.
        payloads: Vec<String>,
    },

    /// Parse a payload locally and print the resulting record.
    Parse {
        /// Payload to parse. Reads stdin when omitted.
        payload: Option<String>,

        /// Timestamp field names, comma separated.
        #[arg(long, default_value = "")]
        timestamp_fields: String,

        /// Message field names, comma separated.
        #[arg(long, default_value = "")]
        message_fields: String,

        /// Level field names, comma separated.
        #[arg(long, default_value = "")]
        level_fields: String,

        /// Correlation id field names, comma separated.
        #[arg(long, default_value = "")]
        correlation_id_fields: String,
    },
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of records.
    Json,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Query {
            server,
            from,
            to,
            count,
            exclusive,
            format,
        } => cmd_query(&server, from, to, count, exclusive, &format),
        Commands::Get { id, server, payload } => cmd_get(&server, &id, payload),
        Commands::Send { target, payloads } => cmd_send(&target, payloads),
        Commands::Parse {
            payload,
            timestamp_fields,
            message_fields,
            level_fields,
            correlation_id_fields,
        } => {
            let config = TraceConfig {
                timestamp_fields: TraceConfig::split_names(&timestamp_fields),
                message_fields: TraceConfig::split_names(&message_fields),
                level_fields: TraceConfig::split_names(&level_fields),
                correlation_id_fields: TraceConfig::split_names(&correlation_id_fields),
                keep_original_payload: false,
            };
            cmd_parse(config, payload)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `traceview query`.
fn cmd_query(
    server: &str,
    from: Option<String>,
    to: Option<String>,
    count: Option<u32>,
    exclusive: bool,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut params: Vec<(&str, String)> = Vec::new();
    if let Some(from) = from {
        params.push(("from", from));
    }
    if let Some(to) = to {
        params.push(("to", to));
    }
    if let Some(count) = count {
        params.push(("count", count.to_string()));
    }
    if exclusive {
        params.push(("exclusive", "true".to_string()));
    }

    let url = format!("{}/api/traces", server.trim_end_matches('/'));
    let body = fetch(reqwest::blocking::Client::new().get(url).query(&params))?;
    let records: Vec<EventRecord> = serde_json::from_str(&body)?;

    match format {
        OutputFormat::Csv => {
            println!("# records={}", records.len());
            println!("id,timestamp,level,correlation_id,message");
            for record in &records {
                println!("{}", csv_row(record));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
    }

    Ok(())
}

/// Implements `traceview get <id>`.
fn cmd_get(server: &str, id: &str, payload: bool) -> Result<(), Box<dyn std::error::Error>> {
    let base = server.trim_end_matches('/');
    let url = if payload {
        format!("{base}/api/traces/{id}/payload")
    } else {
        format!("{base}/api/traces/{id}")
    };
    let body = fetch(reqwest::blocking::Client::new().get(url))?;

    if payload {
        println!("{body}");
    } else {
        let record: EventRecord = serde_json::from_str(&body)?;
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

/// Implements `traceview send`.
fn cmd_send(target: &str, payloads: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(target)?;

    let payloads = if payloads.is_empty() {
        std::io::stdin().lock().lines().collect::<Result<Vec<_>, _>>()?
    } else {
        payloads
    };

    let mut sent = 0usize;
    for payload in payloads.iter().filter(|p| !p.trim().is_empty()) {
        socket.send(payload.as_bytes())?;
        sent += 1;
    }
    eprintln!("sent {sent} payload(s) to {target}");
    Ok(())
}

/// Implements `traceview parse`.
fn cmd_parse(config: TraceConfig, payload: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let raw = match payload {
        Some(payload) => payload,
        None => std::io::read_to_string(std::io::stdin())?,
    };

    let (record, format) = PayloadParser::new(config).parse_detailed(raw.trim())?;
    eprintln!("format: {format:?}");
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Sends a request and returns the body, turning error statuses into errors
/// that carry the server's message.
fn fetch(request: reqwest::blocking::RequestBuilder) -> Result<String, Box<dyn std::error::Error>> {
    let response = request.send()?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        return Err(format!("server returned {status}: {message}").into());
    }
    Ok(body)
}

/// Formats one record as a CSV line.
fn csv_row(record: &EventRecord) -> String {
    [
        record.id().to_string(),
        record.timestamp().to_rfc3339(),
        csv_field(record.level()),
        csv_field(record.correlation_id()),
        csv_field(record.message()),
    ]
    .join(",")
}

/// Quotes a field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
