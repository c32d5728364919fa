//! Live tail of captured queries
//!
//! A single task owns [`TailState`] and runs a `select!` loop over stdin
//! commands, fetch results, timer events and Ctrl-C. Fetches run as spawned
//! tasks and report back through the same channel.

pub mod debounce;
pub mod render;
pub mod schedule;
pub mod settings;
pub mod state;

use crate::client::{ClientError, LensClient};
use crate::output;
use anyhow::Result;
use debounce::Debouncer;
use lens_shared::types::page::{FilterKind, QueryPageResponse};
use lens_shared::types::record::RecordId;
use schedule::TaskSlot;
use settings::Settings;
use state::{Effect, FetchRequest, TailState};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

/// Options for one tail session.
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub filter: FilterKind,
    pub search: String,
    pub per_page: u32,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub settings_path: Option<PathBuf>,
}

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Filter(FilterKind),
    More,
    AcceptNew,
    ToggleAutoLoad,
    ToggleTime,
    Expand(RecordId),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("/search") {
            return Some(Command::Search(rest.trim().to_string()));
        }
        if let Some(rest) = line.strip_prefix("/filter") {
            return rest.trim().parse().ok().map(Command::Filter);
        }
        if let Some(rest) = line.strip_prefix("expand") {
            return rest.trim().parse().ok().map(Command::Expand);
        }
        match line {
            "" | "more" | "m" => Some(Command::More),
            "new" | "n" => Some(Command::AcceptNew),
            "auto" => Some(Command::ToggleAutoLoad),
            "time" => Some(Command::ToggleTime),
            "help" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

const HELP: &str = "Commands: /search <text>, /filter all|slow|failed, more, new, auto, time, expand <id>, quit";

enum Event {
    Line(String),
    InputClosed,
    Fetched(FetchRequest, Result<QueryPageResponse, ClientError>),
    PollDue(u64),
    SearchSettled(String),
}

pub async fn run(client: LensClient, options: TailOptions) -> Result<()> {
    let settings = options
        .settings_path
        .as_deref()
        .map(Settings::load)
        .unwrap_or_default();

    let mut state = TailState::new(settings, options.per_page, options.poll_interval);
    state.filter = options.filter;
    state.search = options.search.trim().to_string();

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    spawn_stdin_reader(tx.clone());

    let mut driver = Driver {
        client,
        tx,
        poll: TaskSlot::new(),
        settings_path: options.settings_path,
        interactive: std::io::stdout().is_terminal(),
    };
    let mut debouncer = Debouncer::new(options.debounce);

    output::info(&format!("Tailing {} ({})", driver.client.base(), HELP));
    let effects = state.start();
    driver.apply(&state, effects);

    loop {
        let effects = tokio::select! {
            event = rx.recv() => match event {
                Some(Event::Line(line)) => match Command::parse(&line) {
                    Some(Command::Quit) => break,
                    Some(Command::Search(term)) => {
                        debouncer.input(Event::SearchSettled(term), driver.tx.clone());
                        vec![]
                    }
                    Some(command) => handle_command(&mut state, command),
                    None => {
                        output::warning(&format!("Unknown command {:?}. {}", line.trim(), HELP));
                        vec![]
                    }
                },
                Some(Event::Fetched(request, result)) => {
                    let result = result.map_err(|e| e.to_string());
                    if let Err(e) = &result {
                        debug!("Fetch {:?} failed: {}", request.purpose, e);
                    }
                    state.on_response(&request, result)
                }
                Some(Event::PollDue(generation)) if generation == state.generation() => {
                    state.poll_due()
                }
                Some(Event::PollDue(_)) => vec![],
                Some(Event::SearchSettled(term)) => state.set_search(&term),
                Some(Event::InputClosed) => {
                    debug!("stdin closed; tailing until interrupted");
                    vec![]
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        driver.apply(&state, effects);
    }

    debouncer.cancel();
    driver.poll.cancel();
    Ok(())
}

fn handle_command(state: &mut TailState, command: Command) -> Vec<Effect> {
    match command {
        Command::Filter(filter) => state.set_filter(filter),
        Command::Search(term) => state.set_search(&term),
        Command::More => state.scroll_to_end(),
        Command::AcceptNew => state.accept_new_entries(),
        Command::ToggleAutoLoad => state.toggle_auto_load(),
        Command::ToggleTime => state.toggle_time_display(),
        Command::Expand(id) => state.toggle_expanded(id),
        Command::Help => {
            output::info(HELP);
            vec![]
        }
        Command::Quit => vec![],
    }
}

/// Reads stdin on a plain thread; a blocking read there cannot hold up
/// runtime shutdown.
fn spawn_stdin_reader(tx: UnboundedSender<Event>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Event::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
        let _ = tx.send(Event::InputClosed);
    });
}

/// Performs effects on behalf of the state machine.
struct Driver {
    client: LensClient,
    tx: UnboundedSender<Event>,
    poll: TaskSlot,
    settings_path: Option<PathBuf>,
    interactive: bool,
}

impl Driver {
    fn apply(&mut self, state: &TailState, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Fetch(request) => {
                    let client = self.client.clone();
                    let tx = self.tx.clone();
                    tokio::spawn(async move {
                        let result = client.fetch_page(&request.page).await;
                        let _ = tx.send(Event::Fetched(request, result));
                    });
                }
                Effect::SchedulePoll(delay) => {
                    let tx = self.tx.clone();
                    let generation = state.generation();
                    self.poll.schedule(delay, move || {
                        let _ = tx.send(Event::PollDue(generation));
                    });
                }
                Effect::CancelPoll => self.poll.cancel(),
                Effect::Render => self.render(state),
                Effect::PersistSettings(settings) => {
                    if let Some(path) = &self.settings_path {
                        if let Err(e) = settings.save(path) {
                            warn!("Failed to save settings: {:#}", e);
                        }
                    }
                }
            }
        }
    }

    fn render(&self, state: &TailState) {
        if self.interactive {
            print!("\x1B[2J\x1B[H");
        }
        println!("{}", render::render(state, chrono::Utc::now()));
    }
}
