//! `pbdbg`: the adapter binary. Reads newline-delimited JSON requests from
//! stdin, writes newline-delimited JSON events to stdout, exits with the
//! codes documented in `spec.md` §6.

use clap::Parser;
use pbdbg_adapter::{Adapter, AdapterError, AdapterEvent, AdapterRequest};
use pbdbg_launcher::DebuggeeOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const EXIT_CLEAN: i32 = 0;
const EXIT_LAUNCH_FAILURE: i32 = 2;
const EXIT_HANDSHAKE_FAILURE: i32 = 3;
const EXIT_TRANSPORT_BROKEN: i32 = 4;
const EXIT_INVALID_CONFIG: i32 = 5;

#[derive(Parser, Debug)]
#[command(name = "pbdbg", about = "PureBasic debugger-protocol adapter")]
struct Args {
    /// Path to the compiled debuggee executable.
    #[arg(long)]
    exe: String,

    /// Extra argument passed to the debuggee; may be repeated.
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Defaults to on (`spec.md` §6) when omitted; pass `--unicode=false`
    /// to turn it off explicitly.
    #[arg(long)]
    unicode: Option<bool>,

    /// Defaults to on (`spec.md` §6) when omitted.
    #[arg(long)]
    stop_on_entry: Option<bool>,

    #[arg(long)]
    stop_on_end: Option<bool>,

    #[arg(long)]
    big_endian: Option<bool>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let exit_code = run(args).await;
    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    let mut adapter = Adapter::new();

    let options = DebuggeeOptions::with_overrides(args.unicode, args.stop_on_entry, args.stop_on_end, args.big_endian);

    if let Err(e) = adapter.launch(args.exe, args.args, options).await {
        tracing::error!(error = %e, "launch failed");
        emit(&AdapterEvent::Error { correlation_id: None, message: e.to_string() }).await;
        return exit_code_for(&e);
    }
    emit(&AdapterEvent::Initialized).await;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        match serde_json::from_str::<AdapterRequest>(&line) {
                            Ok(request) => {
                                let is_terminate = matches!(request, AdapterRequest::Terminate { .. });
                                let response = adapter.handle_request(request).await;
                                let is_error = matches!(response, AdapterEvent::Error { .. });
                                emit(&response).await;
                                if is_terminate && !is_error {
                                    // The adapter already tore down its engine; stop
                                    // here instead of racing a now-closed transport.
                                    return EXIT_CLEAN;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "malformed request line, ignored");
                            }
                        }
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => return EXIT_CLEAN,
                    Err(e) => {
                        tracing::error!(error = %e, "stdin read failed");
                        return EXIT_TRANSPORT_BROKEN;
                    }
                }
            }
            event = adapter.next_engine_event() => {
                match event {
                    Some(Ok(event)) => {
                        let is_exit = matches!(event, AdapterEvent::Exited { .. });
                        emit(&event).await;
                        if is_exit {
                            return EXIT_CLEAN;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "session error");
                        emit(&AdapterEvent::Error { correlation_id: None, message: e.to_string() }).await;
                        return exit_code_for(&e);
                    }
                    None => {
                        // No active session; only reachable before Launch,
                        // which already returned above on failure.
                        continue;
                    }
                }
            }
        }
    }
}

async fn emit(event: &AdapterEvent) {
    let line = serde_json::to_string(event).expect("AdapterEvent always serializes");
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(line.as_bytes()).await;
    let _ = stdout.write_all(b"\n").await;
    let _ = stdout.flush().await;
}

fn exit_code_for(error: &AdapterError) -> i32 {
    match error {
        AdapterError::Configuration(_) => EXIT_INVALID_CONFIG,
        AdapterError::LauncherFailed(_) => EXIT_LAUNCH_FAILURE,
        AdapterError::HandshakeFailed(_) => EXIT_HANDSHAKE_FAILURE,
        AdapterError::TransportTimeout | AdapterError::TransportBroken => EXIT_TRANSPORT_BROKEN,
        AdapterError::MalformedFrame(_) => EXIT_TRANSPORT_BROKEN,
        AdapterError::InvalidState(_) | AdapterError::OutOfRange(_) | AdapterError::Cancelled => EXIT_INVALID_CONFIG,
    }
}
