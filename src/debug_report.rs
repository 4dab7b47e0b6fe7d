use treeroute::{Rejection, Router, StateRef, Transition, TransitionMetrics};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
        if self.enabled { format!("{}{}{}", color, s.as_ref(), ansi::RESET) } else { s.as_ref().to_string() }
    }

    pub fn bold(&self, s: impl AsRef<str>) -> String {
        if self.enabled { format!("{}{}{}", ansi::BOLD, s.as_ref(), ansi::RESET) } else { s.as_ref().to_string() }
    }

    pub fn dim(&self, s: impl AsRef<str>) -> String {
        if self.enabled { format!("{}{}{}", ansi::DIM, s.as_ref(), ansi::RESET) } else { s.as_ref().to_string() }
    }
}

/// One navigation step as the CLI ran it.
pub struct Outcome {
    pub label: String,
    /// The first transition of the navigation (before redirects).
    pub first: Transition,
    pub result: Result<StateRef, Rejection>,
}

pub fn print_states(router: &Router, registered: usize, palette: &Palette) {
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Loaded {registered} states"), ansi::CYAN)));
    for state in router.states() {
        let url = state.url.as_ref().map(|u| u.pattern().to_string()).unwrap_or_default();
        let marker = if state.is_abstract() { palette.dim(" (abstract)") } else { String::new() };
        println!("  {}{} {}", palette.paint(&state.name, ansi::BLUE), marker, palette.dim(url));
    }
    for (state, parent) in router.pending_states() {
        println!("  {} {}", palette.paint(&state, ansi::YELLOW), palette.dim(format!("waiting for '{parent}'")));
    }
}

pub fn print_outcome(router: &Router, outcome: &Outcome, url: &str, palette: &Palette) {
    println!("\n{}", palette.paint(format!("━━━ {} ━━━", outcome.label), ansi::GRAY));

    let chain = transition_chain(router, outcome);
    for (idx, transition) in chain.iter().enumerate() {
        let arrow = if idx == 0 { "▶" } else { "↪" };
        println!(
            "  {} {} {} {}",
            palette.paint(arrow, ansi::GRAY),
            palette.paint(format!("#{}", transition.id()), ansi::GRAY),
            palette.paint(transition.from_state().display_name(), ansi::BLUE),
            palette.bold(format!("→ {}", transition.to_state().display_name())),
        );
        print_changes(transition, palette);
        if let Some(Err(rejection)) = transition.result() {
            print_rejection(&rejection, palette);
        }
        print_metrics(&transition.metrics(), palette);
    }

    match &outcome.result {
        Ok(state) => println!(
            "  {} {}  {} {}  {} {}",
            palette.paint("✓", ansi::GREEN),
            palette.bold(palette.paint(state.display_name(), ansi::GREEN)),
            palette.dim("│ params:"),
            palette.paint(router.params().to_string(), ansi::YELLOW),
            palette.dim("│ url:"),
            palette.paint(url, ansi::CYAN),
        ),
        Err(_) => println!(
            "  {} {} {}",
            palette.paint("✗", ansi::RED),
            palette.dim("still at"),
            palette.paint(router.current().display_name(), ansi::BLUE),
        ),
    }
}

pub fn print_unmatched(url: &str, palette: &Palette) {
    println!("\n{}", palette.paint(format!("━━━ url {url} ━━━"), ansi::GRAY));
    println!("  {} {}", palette.paint("✗", ansi::RED), palette.dim("no rule matched"));
}

pub fn print_href(state: &str, href: Option<&str>, palette: &Palette) {
    println!("\n{}", palette.paint(format!("━━━ href {state} ━━━"), ansi::GRAY));
    match href {
        Some(href) => println!("  {}", palette.paint(href, ansi::CYAN)),
        None => println!("  {}", palette.dim("no link (unknown state, no url, or invalid params)")),
    }
}

// The redirect chain, oldest first. Redirects are only reachable backwards
// from the transition that settled last.
fn transition_chain(router: &Router, outcome: &Outcome) -> Vec<Transition> {
    let last = match &outcome.result {
        Ok(_) => router.last_success().filter(|t| t.original().id() == outcome.first.id()),
        Err(_) => None,
    };
    let Some(last) = last else {
        return vec![outcome.first.clone()];
    };
    let mut chain = vec![last.clone()];
    let mut cursor = last;
    while let Some(previous) = cursor.redirected_from().cloned() {
        chain.push(previous.clone());
        cursor = previous;
    }
    chain.reverse();
    chain
}

fn print_changes(transition: &Transition, palette: &Palette) {
    let changes = transition.tree_changes();
    let list = |names: Vec<&str>| {
        if names.is_empty() {
            "-".to_string()
        } else {
            names.into_iter().map(|n| if n.is_empty() { "(root)" } else { n }).collect::<Vec<_>>().join(", ")
        }
    };
    println!(
        "      {} {}  {} {}  {} {}",
        palette.dim("exit:"),
        palette.paint(list(changes.exiting_names()), ansi::YELLOW),
        palette.dim("│ retain:"),
        palette.dim(list(changes.retained_names())),
        palette.dim("│ enter:"),
        palette.paint(list(changes.entering_names()), ansi::GREEN),
    );
}

fn print_rejection(rejection: &Rejection, palette: &Palette) {
    let color = if rejection.is_redirect() { ansi::GRAY } else { ansi::RED };
    let kind = if rejection.is_redirect() { "redirected".to_string() } else { rejection.kind.to_string() };
    println!("      {} {}", palette.paint(kind, color), palette.dim(&rejection.message));
}

fn print_metrics(metrics: &TransitionMetrics, palette: &Palette) {
    if metrics.phases.is_empty() {
        return;
    }
    let phases: Vec<String> = metrics
        .phases
        .iter()
        .map(|p| format!("{} {:?} ({} hooks)", p.kind, p.duration, p.hooks_run))
        .collect();
    println!(
        "      {} {}  {} {}",
        palette.dim("total:"),
        palette.paint(format!("{:?}", metrics.total), ansi::GREEN),
        palette.dim("│"),
        palette.dim(phases.join(" · ")),
    );
}
