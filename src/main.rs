mod debug_report;

use std::io::{self, IsTerminal, Read};
use std::rc::Rc;

use futures::executor::LocalPool;
use tracing_subscriber::EnvFilter;
use treeroute::{MemoryLocation, ParamValues, Router, json_params, load_states};

use debug_report::{Outcome, Palette};

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    init_tracing();

    match run(&config) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

enum Step {
    Go { state: String, params: ParamValues },
    Url(String),
    Href { state: String, params: ParamValues },
}

struct CliConfig {
    states: String,
    steps: Vec<Step>,
    color: bool,
}

/// Run every step in order. Returns false when the last navigation was
/// rejected.
fn run(config: &CliConfig) -> Result<bool, Box<dyn std::error::Error>> {
    let palette = Palette::new(config.color);
    let router = Router::new()?;
    let registrations = load_states(&router, &config.states)?;
    debug_report::print_states(&router, registrations.len(), &palette);

    let location = MemoryLocation::new("/");
    router.url_router().attach(Rc::new(location.clone()));
    let mut pool = LocalPool::new();
    let mut last_ok = true;

    for step in &config.steps {
        match step {
            Step::Go { state, params } => {
                let navigation = router.go(state, params.clone());
                let first = navigation.transition().clone();
                let result = pool.run_until(navigation);
                last_ok = result.is_ok();
                let outcome = Outcome { label: format!("go {state}"), first, result };
                debug_report::print_outcome(&router, &outcome, &location.url(), &palette);
            }
            Step::Url(url) => {
                location.navigate(url);
                match router.sync() {
                    Some(navigation) => {
                        let first = navigation.transition().clone();
                        let result = pool.run_until(navigation);
                        last_ok = result.is_ok();
                        let outcome = Outcome { label: format!("url {url}"), first, result };
                        debug_report::print_outcome(&router, &outcome, &location.url(), &palette);
                    }
                    None => {
                        last_ok = false;
                        debug_report::print_unmatched(url, &palette);
                    }
                }
            }
            Step::Href { state, params } => {
                debug_report::print_href(state, router.href(state, params.clone()).as_deref(), &palette);
            }
        }
    }
    Ok(last_ok)
}

fn init_tracing() {
    let forced = std::env::var("TREEROUTE_DEBUG").is_ok_and(|v| v == "1");
    let filter = if forced {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn parse_args() -> Result<CliConfig, String> {
    let mut states_path: Option<String> = None;
    let mut steps = Vec::new();
    let mut params = ParamValues::new();
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| match inline.clone() {
            Some(value) => Ok(value),
            None => args.next().ok_or_else(|| format!("error: {name} expects a value")),
        };

        match flag.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("treeroute {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "-s" | "--states" => {
                if states_path.is_some() {
                    return Err("error: states provided multiple times".to_string());
                }
                states_path = Some(value("--states")?);
            }
            "-p" | "--params" => {
                let raw = value("--params")?;
                params = json_params(&raw).map_err(|err| format!("error: --params: {err}"))?;
            }
            "-g" | "--go" => {
                let state = value("--go")?;
                steps.push(Step::Go { state, params: std::mem::take(&mut params) });
            }
            "-u" | "--url" => steps.push(Step::Url(value("--url")?)),
            "--href" => {
                let state = value("--href")?;
                steps.push(Step::Href { state, params: std::mem::take(&mut params) });
            }
            _ => return Err(format!("error: unknown option '{arg}'\n\n{}", help_text())),
        }
    }

    let Some(states_path) = states_path else {
        return Err(format!("error: no state document provided\n\n{}", help_text()));
    };
    if steps.is_empty() {
        return Err(format!("error: nothing to do (add --go, --url or --href)\n\n{}", help_text()));
    }
    let states = read_states(&states_path)?;
    Ok(CliConfig { states, steps, color })
}

fn read_states(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
        return Ok(buffer);
    }
    std::fs::read_to_string(path).map_err(|err| format!("error: failed to read '{path}': {err}"))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "treeroute {version}

Load a state tree and run navigations against it.

Usage:
  treeroute --states <file> [STEPS...]

Options:
  -s, --states <file>        JSON state document ('-' reads stdin).
  -p, --params <json>        Parameters for the next --go or --href.
  -g, --go <state>           Navigate to a state (relative to the current one).
  -u, --url <url>            Change the location and navigate to what it matches.
      --href <state>         Print the link for a state.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Steps run in the order given.

Environment:
  RUST_LOG                   Log filter (default: warn).
  TREEROUTE_DEBUG=1          Log transition internals at debug level.

Exit codes:
  0  The last navigation succeeded.
  1  The last navigation was rejected, or the document was invalid.
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
