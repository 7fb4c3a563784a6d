//! agent-warden: command mediation for an autonomous coding agent.
//!
//! Reads one tool invocation request as JSON from stdin, resolves it
//! against the active policy, writes the decision as JSON to stdout,
//! and exits 0 (allow), 1 (deny), or 2 (ask). Requests naming tools
//! outside the mediated set pass through with exit 0 and no output.
//!
//! Flags:
//!   --policy PATH    load an operator policy instead of the embedded default
//!   --log-dir PATH   audit log directory (default ~/.local/share/agent-warden)
//!   --dump-policy    print the embedded reference policy and exit
//!   --verbose        debug-level diagnostics on stderr

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use agent_warden::audit::{AuditLogger, FileAuditLog};
use agent_warden::config::Policy;
use agent_warden::eval::Engine;
use agent_warden::eval::verdict::Outcome;
use agent_warden::request::WireRequest;

struct Args {
    policy_path: Option<String>,
    log_dir: Option<String>,
    dump_policy: bool,
    verbose: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        policy_path: None,
        log_dir: None,
        dump_policy: false,
        verbose: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--policy" => {
                args.policy_path = Some(iter.next().ok_or("--policy requires a path")?);
            }
            "--log-dir" => {
                args.log_dir = Some(iter.next().ok_or("--log-dir requires a path")?);
            }
            "--dump-policy" => args.dump_policy = true,
            "--verbose" => args.verbose = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    // Stderr only; stdout carries the decision JSON.
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    );
}

fn audit_dir(args: &Args) -> std::path::PathBuf {
    if let Some(dir) = &args.log_dir {
        return std::path::PathBuf::from(shellexpand::tilde(dir).into_owned());
    }
    match std::env::var_os("HOME") {
        Some(home) => std::path::Path::new(&home).join(".local/share/agent-warden"),
        None => std::path::PathBuf::from("/tmp/agent-warden"),
    }
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("agent-warden: {e}");
            return ExitCode::from(3);
        }
    };
    init_logging(args.verbose);

    let policy = match &args.policy_path {
        Some(path) => match Policy::load(std::path::Path::new(
            shellexpand::tilde(path).as_ref(),
        )) {
            Ok(policy) => policy,
            Err(e) => {
                eprintln!("agent-warden: policy error: {e}");
                return ExitCode::from(3);
            }
        },
        None => Policy::default_policy(),
    };

    if args.dump_policy {
        print!("{}", Policy::default_policy_source());
        return ExitCode::SUCCESS;
    }

    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        eprintln!("agent-warden: failed to read stdin: {e}");
        return ExitCode::from(1);
    }

    let wire: WireRequest = match serde_json::from_str(&input) {
        Ok(wire) => wire,
        Err(e) => {
            // Fail closed: a request we cannot parse is a request we deny.
            eprintln!("agent-warden: malformed request: {e}");
            return ExitCode::from(1);
        }
    };

    // Tools outside the mediated set pass through untouched.
    let Some(request) = wire.into_request() else {
        return ExitCode::SUCCESS;
    };

    let retention_days = policy.settings.retention_days;
    let engine = Engine::new(policy);
    let verdict = engine.resolve(&request);

    let logger = AuditLogger::new(Arc::new(FileAuditLog::new(
        audit_dir(&args),
        retention_days,
    )));
    logger.record_decision(&request, &verdict);

    let output = serde_json::json!({
        "decision": verdict.outcome.as_str(),
        "reason": verdict.reason,
    });
    match serde_json::to_string(&output) {
        Ok(line) => println!("{line}"),
        Err(e) => log::error!("could not serialize decision: {e}"),
    }

    if verdict.outcome == Outcome::Deny {
        eprintln!("deny: {}", verdict.reason);
    }
    ExitCode::from(verdict.outcome.exit_code())
}
