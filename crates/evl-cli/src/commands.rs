use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use tracing::debug;

use evl_ledger::{
    AuditReport, AuditScope, BackupFormat, Ledger, LedgerConfig, LedgerStatus, ObserveOptions,
    RawPrecondition, StreamOptions,
};
use evl_protocol::{CallerIdentity, LedgerService, ObserveRequest, Request, Response, ServiceError};
use evl_types::{Event, EventInput};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    // Only commands that write take the directory lock; readers follow the
    // log so they can run beside a writer.
    let ledger = if cli.command.mutates() {
        Ledger::open(&cli.data_dir, config)?
    } else {
        Ledger::open_read_only(&cli.data_dir, config)?
    };
    let service = LedgerService::new(ledger);
    let caller = local_caller();
    debug!(
        data_dir = %cli.data_dir.display(),
        caller = %caller,
        read_only = service.ledger().is_read_only(),
        "ledger opened"
    );

    match cli.command {
        Command::Observe(args) => cmd_observe(&service, &caller, args, cli.format),
        command => {
            let response = dispatch(&service, &caller, command)?;
            render(&response, cli.format)
        }
    }
}

fn local_caller() -> CallerIdentity {
    let name = std::env::var("USER").unwrap_or_else(|_| "local".into());
    CallerIdentity::new(name)
}

/// Run every one-shot command through the service.
fn dispatch(
    service: &LedgerService,
    caller: &CallerIdentity,
    command: Command,
) -> anyhow::Result<Response> {
    let request = match command {
        Command::Status => Request::GetStatus,
        Command::Subjects(args) => Request::GetSubjects { base: args.base },
        Command::Types => Request::GetTypes,
        Command::Stream(args) => {
            let mut options =
                stream_options(args.lower, args.exclusive_lower, args.upper, args.exclusive_upper)
                    .recursive(args.recursive);
            if let Some(event_type) = args.latest_type {
                options = options.latest_by_event_type(event_type);
            }
            Request::Stream {
                subject: args.subject,
                options,
            }
        }
        Command::Event(args) => Request::GetEvent { id: args.id },
        Command::Commit(args) => {
            let events: Vec<EventInput> = read_json(&args.file)?;
            let preconditions: Vec<RawPrecondition> = match &args.preconditions {
                Some(path) => read_json(path)?,
                None => Vec::new(),
            };
            Request::Commit {
                events,
                preconditions,
            }
        }
        Command::Audit(args) => Request::Audit {
            scope: args.subject.map_or(AuditScope::All, AuditScope::Subject),
        },
        Command::Erase(args) => Request::EraseSubject {
            subject: args.subject,
        },
        Command::Backup(args) => {
            let format = if args.compress {
                BackupFormat::JsonZstd
            } else {
                BackupFormat::Json
            };
            let response = call(service, caller, Request::CreateBackup { format })?;
            if let Response::Backup { data, .. } = &response {
                fs::write(&args.out, data)
                    .with_context(|| format!("cannot write {}", args.out.display()))?;
            }
            return Ok(response);
        }
        Command::Restore(args) => {
            let bytes = fs::read(&args.input)
                .with_context(|| format!("cannot read {}", args.input.display()))?;
            return service
                .restore_encoded(Some(caller), &bytes)
                .map_err(service_error);
        }
        Command::Observe(_) => anyhow::bail!("observe is not a one-shot command"),
    };
    call(service, caller, request)
}

fn call(service: &LedgerService, caller: &CallerIdentity, request: Request) -> anyhow::Result<Response> {
    service.handle(Some(caller), request).map_err(service_error)
}

fn service_error(err: ServiceError) -> anyhow::Error {
    anyhow::anyhow!("{}: {err}", err.code())
}

fn stream_options(
    lower: Option<u64>,
    exclusive_lower: bool,
    upper: Option<u64>,
    exclusive_upper: bool,
) -> StreamOptions {
    let mut options = StreamOptions::new();
    if let Some(id) = lower {
        options = options.lower_bound(id, !exclusive_lower);
    }
    if let Some(id) = upper {
        options = options.upper_bound(id, !exclusive_upper);
    }
    options
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON input", path.display()))
}

fn cmd_observe(
    service: &LedgerService,
    caller: &CallerIdentity,
    args: ObserveArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut options = ObserveOptions::new().recursive(args.recursive);
    if let Some(ms) = args.interval_ms {
        options = options.interval(Duration::from_millis(ms));
    }
    if let Some(id) = args.from {
        options = options.lower_bound(id, true);
    }
    let request = ObserveRequest {
        subject: args.subject,
        options,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut observation = service.observe(Some(caller), request).map_err(service_error)?;
        if format == OutputFormat::Text {
            eprintln!(
                "Observing {} after event {} (Ctrl-C to stop)",
                observation.subject().bold(),
                observation.last_delivered_id()
            );
        }
        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);
        loop {
            tokio::select! {
                _ = &mut interrupted => break,
                next = observation.next() => match next {
                    Some(event) => print_event(&event, format)?,
                    None => break,
                },
            }
        }
        observation.cancel();
        if format == OutputFormat::Text {
            eprintln!("Stopped after event {}", observation.last_delivered_id());
        }
        Ok::<_, anyhow::Error>(())
    })
}

fn print_event(event: &Event, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Text => println!("{}", event_line(event)),
    }
    Ok(())
}

fn event_line(event: &Event) -> String {
    let content = if event.is_erased() {
        "erased".red().to_string()
    } else {
        event.content.kind().dimmed().to_string()
    };
    format!(
        "{} {} {} {} {} [{}]",
        format!("#{}", event.id).yellow(),
        event.time.to_rfc3339(),
        event.subject.bold(),
        event.event_type.cyan(),
        event.hash.short_hex().dimmed(),
        content,
    )
}

fn render(response: &Response, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let value = match response {
            // Raw bytes are written to the output file, not echoed.
            Response::Backup { format, data } => serde_json::json!({
                "type": "Backup",
                "payload": { "format": format, "bytes": data.len() },
            }),
            other => serde_json::to_value(other)?,
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match response {
        Response::Pong => println!("pong"),
        Response::Status(status) => print_status(status),
        Response::Subjects { subjects } => print_list(subjects, "No subjects."),
        Response::Types { types } => print_list(types, "No event types."),
        Response::Events { events } => {
            if events.is_empty() {
                println!("No events.");
            }
            for event in events {
                println!("{}", event_line(event));
            }
        }
        Response::Event { event } => {
            println!("{}", event_line(event));
            println!("  Source: {}", event.source);
            println!("  Predecessor: {}", event.predecessorhash.to_hex().dimmed());
            println!("  Hash: {}", event.hash.to_hex());
            if let Some(parent) = &event.traceparent {
                println!("  Trace: {parent}");
            }
            println!("{}", serde_json::to_string_pretty(&event.content)?);
        }
        Response::Committed { events } => {
            println!("{} Committed {} event(s)", "✓".green().bold(), events.len());
            for event in events {
                println!("  {}", event_line(event));
            }
        }
        Response::Audit(report) => print_audit(report),
        Response::Erased { count } => {
            println!("{} Erased {} event payload(s)", "✓".green().bold(), count)
        }
        Response::Backup { format, data } => println!(
            "{} Backup written ({:?}, {} bytes)",
            "✓".green().bold(),
            format,
            data.len()
        ),
        Response::Restored { count } => {
            println!("{} Restored {} event(s)", "✓".green().bold(), count)
        }
    }
    Ok(())
}

fn print_status(status: &LedgerStatus) {
    println!("Events: {}", status.event_count.to_string().bold());
    println!("Subjects: {}", status.subject_count);
    println!("Event types: {}", status.type_count);
    println!("Last event: {}", format!("#{}", status.last_event_id).yellow());
    println!("Last hash: {}", status.last_event_hash.to_hex().cyan());
}

fn print_list(items: &[String], empty: &str) {
    if items.is_empty() {
        println!("{empty}");
    }
    for item in items {
        println!("{item}");
    }
}

fn print_audit(report: &AuditReport) {
    let scope = match &report.scope {
        AuditScope::All => "ledger".to_string(),
        AuditScope::Subject(subject) => subject.clone(),
    };
    match &report.first_break {
        None => {
            println!("{} Hash chain of {} verified", "✓".green().bold(), scope.bold());
            println!("  Events checked: {}", report.events_checked);
        }
        Some(br) => {
            println!("{} Hash chain of {} is broken", "✗".red().bold(), scope.bold());
            println!("  Intact events: {}", report.events_checked);
            println!("  First break: #{} ({:?})", br.id, br.kind);
            println!("  {}", br.reason.red());
        }
    }
}
