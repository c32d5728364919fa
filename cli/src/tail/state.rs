//! Live-tail view state
//!
//! Pure: intents and fetch results go in, [`Effect`]s come out. The driver in
//! `tail::run` performs the effects (HTTP, timers, printing) and feeds the
//! results back. Every fetch carries the view generation it was issued
//! under; responses from an older generation are dropped.

use super::settings::Settings;
use crate::client::PageRequest;
use lens_shared::types::page::{FilterKind, QueryPageResponse};
use lens_shared::types::record::{DisplayRecord, RecordId};
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoadingInitial,
    IdleWatching,
    LoadingMore,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// First page after a view reset
    Reset,
    /// Next page for infinite scroll
    LoadMore,
    /// `perPage=1` head check for new entries
    HeadCheck,
    /// Reload page 1 in place
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub generation: u64,
    pub purpose: FetchPurpose,
    pub page: PageRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch(FetchRequest),
    SchedulePoll(Duration),
    CancelPoll,
    Render,
    PersistSettings(Settings),
}

#[derive(Debug, Clone)]
pub struct TailState {
    pub settings: Settings,
    pub filter: FilterKind,
    pub search: String,
    pub per_page: u32,
    pub poll_interval: Duration,

    pub records: Vec<DisplayRecord>,
    pub page: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,

    pub phase: Phase,
    pub error: Option<String>,
    pub has_new_entries: bool,
    pub expanded: HashSet<RecordId>,

    generation: u64,
    poll_in_flight: bool,
    refresh_in_flight: bool,
}

impl TailState {
    pub fn new(settings: Settings, per_page: u32, poll_interval: Duration) -> Self {
        Self {
            settings,
            filter: FilterKind::All,
            search: String::new(),
            per_page: per_page.max(1),
            poll_interval,
            records: Vec::new(),
            page: 1,
            total: 0,
            total_pages: 0,
            has_more: false,
            phase: Phase::LoadingInitial,
            error: None,
            has_new_entries: false,
            expanded: HashSet::new(),
            generation: 0,
            poll_in_flight: false,
            refresh_in_flight: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn request(&self, purpose: FetchPurpose, page: u32, per_page: u32) -> Effect {
        Effect::Fetch(FetchRequest {
            generation: self.generation,
            purpose,
            page: PageRequest {
                page,
                per_page,
                filter: self.filter,
                search: self.search.clone(),
            },
        })
    }

    /// Load the first page of the current view.
    pub fn start(&mut self) -> Vec<Effect> {
        self.reset()
    }

    fn reset(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.records.clear();
        self.expanded.clear();
        self.page = 1;
        self.total = 0;
        self.total_pages = 0;
        self.has_more = false;
        self.phase = Phase::LoadingInitial;
        self.error = None;
        self.has_new_entries = false;
        self.poll_in_flight = false;
        self.refresh_in_flight = false;

        vec![
            Effect::CancelPoll,
            self.request(FetchPurpose::Reset, 1, self.per_page),
            Effect::Render,
        ]
    }

    /// Replace page 1 without clearing what is shown. In-flight load-more
    /// results belong to the old view and are dropped.
    fn refresh(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.has_new_entries = false;
        self.poll_in_flight = false;
        self.refresh_in_flight = true;
        if self.phase == Phase::LoadingMore {
            self.phase = Phase::IdleWatching;
        }
        vec![
            Effect::CancelPoll,
            self.request(FetchPurpose::Refresh, 1, self.per_page),
        ]
    }

    pub fn set_filter(&mut self, filter: FilterKind) -> Vec<Effect> {
        if filter == self.filter {
            return vec![];
        }
        self.filter = filter;
        self.reset()
    }

    /// Apply a (debounced) search term.
    pub fn set_search(&mut self, search: &str) -> Vec<Effect> {
        let search = search.trim();
        if search == self.search {
            return vec![];
        }
        self.search = search.to_string();
        self.reset()
    }

    /// The last displayed record became visible.
    pub fn scroll_to_end(&mut self) -> Vec<Effect> {
        let ready = matches!(self.phase, Phase::IdleWatching | Phase::Error);
        if !ready || !self.has_more || self.refresh_in_flight || self.records.is_empty() {
            return vec![];
        }
        self.phase = Phase::LoadingMore;
        vec![
            self.request(FetchPurpose::LoadMore, self.page + 1, self.per_page),
            Effect::Render,
        ]
    }

    /// The poll timer fired.
    pub fn poll_due(&mut self) -> Vec<Effect> {
        if self.poll_in_flight
            || self.refresh_in_flight
            || self.has_new_entries
            || self.phase == Phase::LoadingInitial
        {
            return vec![];
        }
        self.poll_in_flight = true;
        vec![self.request(FetchPurpose::HeadCheck, 1, 1)]
    }

    /// Load entries announced in notify mode.
    pub fn accept_new_entries(&mut self) -> Vec<Effect> {
        if !self.has_new_entries {
            return vec![];
        }
        let mut effects = self.refresh();
        effects.push(Effect::Render);
        effects
    }

    pub fn toggle_auto_load(&mut self) -> Vec<Effect> {
        self.settings.auto_load = !self.settings.auto_load;
        let mut effects = vec![Effect::PersistSettings(self.settings), Effect::Render];
        if self.settings.auto_load && self.has_new_entries {
            effects.extend(self.refresh());
        }
        effects
    }

    pub fn toggle_time_display(&mut self) -> Vec<Effect> {
        self.settings.time_display = self.settings.time_display.toggled();
        vec![Effect::PersistSettings(self.settings), Effect::Render]
    }

    /// Expand or collapse a record's backtrace.
    pub fn toggle_expanded(&mut self, id: RecordId) -> Vec<Effect> {
        if !self.records.iter().any(|r| r.id == id) {
            return vec![];
        }
        if !self.expanded.remove(&id) {
            self.expanded.insert(id);
        }
        vec![Effect::Render]
    }

    /// Feed back the outcome of a fetch.
    pub fn on_response(
        &mut self,
        request: &FetchRequest,
        result: Result<QueryPageResponse, String>,
    ) -> Vec<Effect> {
        if request.generation != self.generation {
            return vec![];
        }

        match request.purpose {
            FetchPurpose::Reset | FetchPurpose::Refresh => {
                self.refresh_in_flight = false;
                match result {
                    Ok(resp) => {
                        self.apply_first_page(resp);
                        self.error = None;
                    }
                    Err(message) => {
                        self.error = Some(message);
                        self.phase = Phase::Error;
                    }
                }
                vec![Effect::Render, Effect::SchedulePoll(self.poll_interval)]
            }

            FetchPurpose::LoadMore => {
                match result {
                    Ok(resp) => {
                        self.append_page(resp);
                        self.error = None;
                        self.phase = Phase::IdleWatching;
                    }
                    Err(message) => {
                        self.error = Some(message);
                        self.phase = Phase::Error;
                    }
                }
                vec![Effect::Render]
            }

            FetchPurpose::HeadCheck => {
                self.poll_in_flight = false;
                match result {
                    Ok(resp) => self.on_head(resp),
                    Err(message) => {
                        self.error = Some(message);
                        vec![Effect::Render, Effect::SchedulePoll(self.poll_interval)]
                    }
                }
            }
        }
    }

    fn on_head(&mut self, resp: QueryPageResponse) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.error.take().is_some() {
            effects.push(Effect::Render);
        }

        let head = resp.queries.first().map(|r| r.id);
        let shown = self.records.first().map(|r| r.id);

        if head == shown {
            effects.push(Effect::SchedulePoll(self.poll_interval));
        } else if shown.is_none() || self.settings.auto_load {
            effects.extend(self.refresh());
        } else {
            self.has_new_entries = true;
            effects.push(Effect::Render);
        }
        effects
    }

    fn apply_first_page(&mut self, resp: QueryPageResponse) {
        let fetched = resp.queries.len();
        self.page = resp.page.max(1);
        self.total = resp.total;
        self.total_pages = resp.total_pages;
        self.has_more = self.more_after(fetched);
        self.expanded.retain(|id| resp.queries.iter().any(|r| r.id == *id));
        self.records = resp.queries;
        self.phase = Phase::IdleWatching;
        self.has_new_entries = false;
    }

    fn append_page(&mut self, resp: QueryPageResponse) {
        let fetched = resp.queries.len();
        self.page = resp.page;
        self.total = resp.total;
        self.total_pages = resp.total_pages;
        self.has_more = self.more_after(fetched);

        let seen: HashSet<RecordId> = self.records.iter().map(|r| r.id).collect();
        self.records
            .extend(resp.queries.into_iter().filter(|r| !seen.contains(&r.id)));
    }

    fn more_after(&self, fetched: usize) -> bool {
        fetched == self.per_page as usize && (self.page as u64) < self.total_pages
    }
}
