//! Stand-in for `ModellerBridge.py`.
//!
//! Accepts the same command line as the real bridge script, connects to the
//! host's endpoints and serves a fixed set of `stub.*` tools so the host side
//! can be exercised without an Emme installation.

use anyhow::{Context, bail};
use modeller_bridge::{Event, Request, connect_endpoints};

/// Positional arguments after the optional `-u` and the script path.
struct Invocation {
    project: String,
    user: String,
    performance: String,
    inbound: String,
    outbound: String,
    databank: Option<String>,
}

impl Invocation {
    fn parse(mut args: Vec<String>) -> anyhow::Result<Self> {
        if args.first().is_some_and(|a| a == "-u") {
            args.remove(0);
        }
        // Script path
        if !args.is_empty() {
            args.remove(0);
        }
        if args.len() < 5 {
            bail!("Expected: [-u] script project user performance inbound outbound [databank]");
        }
        let mut args = args.into_iter();
        Ok(Self {
            project: args.next().unwrap_or_default(),
            user: args.next().unwrap_or_default(),
            performance: args.next().unwrap_or_default(),
            inbound: args.next().unwrap_or_default(),
            outbound: args.next().unwrap_or_default(),
            databank: args.next(),
        })
    }
}

fn respond(invocation: &Invocation, request: Request) -> Vec<Event> {
    match request {
        Request::Run { tool, args } => match tool.as_str() {
            "stub.echo" => vec![Event::RunCompleteWithValue(args)],
            "stub.complete" => vec![Event::RunComplete],
            "stub.progress" => vec![
                Event::Progress(0.5),
                Event::Print("halfway\n".to_string()),
                Event::Progress(1.0),
                Event::RunComplete,
            ],
            "stub.parameter_error" => vec![Event::ParameterError(args)],
            "stub.runtime_error" => vec![Event::RuntimeError(args)],
            "stub.panic" => vec![Event::Terminated],
            "stub.identity" => vec![Event::RunCompleteWithValue(format!(
                "{}|{}|{}|{}",
                invocation.project,
                invocation.user,
                invocation.performance,
                invocation.databank.as_deref().unwrap_or_default()
            ))],
            _ => vec![Event::NamespaceNotFound(format!("{tool} not found"))],
        },
        Request::RunStructured { tool, parameters } => {
            if !tool.starts_with("stub.") {
                return vec![Event::NamespaceNotFound(format!("{tool} not found"))];
            }
            let joined = parameters
                .iter()
                .map(|p| format!("{}={}", p.name, p.value))
                .collect::<Vec<_>>()
                .join(";");
            vec![Event::RunCompleteWithValue(joined)]
        }
        Request::CheckNamespace { namespace } => {
            if namespace.starts_with("stub.") {
                vec![Event::RunComplete]
            } else {
                vec![Event::NamespaceNotFound(format!("{namespace} not found"))]
            }
        }
        Request::CleanLog | Request::DisableLog | Request::EnableLog => vec![Event::RunComplete],
        Request::Terminate => Vec::new(),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let invocation = Invocation::parse(std::env::args().skip(1).collect())?;
    let (mut writer, mut reader) = connect_endpoints(&invocation.inbound, &invocation.outbound)
        .context("Failed to connect to the host")?;

    Event::Ready.write_to(&mut writer)?;
    tracing::debug!(project = %invocation.project, "Stub engine ready");

    while let Some(request) = Request::read_from(&mut reader)? {
        if request == Request::Terminate {
            tracing::debug!("Termination requested");
            break;
        }
        for event in respond(&invocation, request) {
            event.write_to(&mut writer)?;
        }
    }

    Ok(())
}
