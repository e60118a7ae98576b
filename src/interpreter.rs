//! # Command interpreter
//!
//! Single-token dispatch over operator input. A line is split on whitespace
//! and its first token selects the transition:
//!
//! | token            | effect                                          | result        |
//! |------------------|-------------------------------------------------|---------------|
//! | `done`           | end selection, run the pipeline over the queue  | `StopLoop`    |
//! | `sel`            | list the queued observations                    | `Continue`    |
//! | *(empty)*        | input error                                     | `Continue`    |
//! | `back`           | drop the most recently queued observation       | `Continue`    |
//! | `cycle <n>`      | queue every catalog record of epoch `n`         | `Continue`    |
//! | `rm <id \| all>` | remove one observation or clear the queue       | `Continue`    |
//! | `settings`       | show the run configuration                      | `Continue`    |
//! | `exit`           | leave without processing                        | `Terminate`   |
//! | `<number>`       | queue it when larger than 10⁸, else unknown     | `Continue`    |
//!
//! Every keyword, `settings` and `exit` included, is matched case-insensitively,
//! as are the `all` and `back` arguments of `rm` (see [`RemoveTarget`]).
//! Observation identifiers and unknown tokens are kept as typed. The
//! dispatcher never exits the process: it
//! returns a [`CommandResult`] and the caller decides. Interactive
//! ([`CommandInterpreter::run_interactive`]) and single-shot
//! ([`CommandInterpreter::dispatch`]) modes share the same dispatch.
use std::io::{BufRead, Write};

use tracing::{info, warn};

use crate::{
    catalog::Catalog,
    constants::{ObsId, OBSID_MIN_VALUE},
    display::{queue_table, settings_table},
    queue::{AddOutcome, ObservationQueue, RemoveOutcome, RemoveTarget},
    settings::Settings,
    xtipipe_errors::XtiPipeError,
};

/// What the caller should do after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    /// Keep reading commands.
    Continue,
    /// Selection finished: hand the queue to the acquisition pipeline.
    StopLoop,
    /// Leave immediately; the queue is discarded.
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Done,
    Sel,
    Empty,
    Back,
    Cycle(Option<String>),
    Rm(Option<String>),
    Settings,
    Exit,
    ObsId(ObsId),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Command::Empty;
        };
        let arg = tokens.next().map(str::to_string);

        match first.to_lowercase().as_str() {
            "done" => Command::Done,
            "sel" => Command::Sel,
            "back" => Command::Back,
            "cycle" => Command::Cycle(arg),
            "rm" => Command::Rm(arg),
            "settings" => Command::Settings,
            "exit" => Command::Exit,
            _ => match first.parse::<u64>() {
                Ok(value) if value > OBSID_MIN_VALUE => Command::ObsId(first.to_string()),
                _ => Command::Unknown(first.to_string()),
            },
        }
    }
}

/// Observable effect of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Queued(AddOutcome),
    CycleQueued { cycle: u64, added: usize, already_queued: usize },
    Removed(RemoveOutcome),
    Listed(Vec<ObsId>),
    SettingsShown,
    InputError,
    InvalidArgument(String),
    UnknownEntry(String),
    Finished,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub result: CommandResult,
    pub outcome: Outcome,
}

impl Dispatch {
    fn next(outcome: Outcome) -> Self {
        Dispatch {
            result: CommandResult::Continue,
            outcome,
        }
    }
}

pub struct CommandInterpreter<'a> {
    catalog: &'a Catalog,
    settings: &'a Settings,
    queue: ObservationQueue,
}

impl<'a> CommandInterpreter<'a> {
    pub fn new(catalog: &'a Catalog, settings: &'a Settings) -> Self {
        CommandInterpreter {
            catalog,
            settings,
            queue: ObservationQueue::new(),
        }
    }

    pub fn queue(&self) -> &ObservationQueue {
        &self.queue
    }

    pub fn into_queue(self) -> ObservationQueue {
        self.queue
    }

    /// Dispatch one line of operator input.
    ///
    /// This is the single-shot mode: the line is handled exactly as it would
    /// be inside [`Self::run_interactive`], and the returned
    /// [`Dispatch::result`] tells the caller whether to continue.
    pub fn dispatch(&mut self, line: &str) -> Dispatch {
        match Command::parse(line) {
            Command::Done => Dispatch {
                result: CommandResult::StopLoop,
                outcome: Outcome::Finished,
            },
            Command::Exit => Dispatch {
                result: CommandResult::Terminate,
                outcome: Outcome::Terminated,
            },
            Command::Sel => {
                info!("Observations Selected:\n{}", queue_table(&self.queue));
                Dispatch::next(Outcome::Listed(
                    self.queue.list().into_iter().map(str::to_string).collect(),
                ))
            }
            Command::Empty => {
                warn!("Nothing entered... !!!ENTER SOMETHING!!!");
                Dispatch::next(Outcome::InputError)
            }
            Command::Back => Dispatch::next(Outcome::Removed(self.remove(&RemoveTarget::Back))),
            Command::Rm(Some(arg)) => {
                Dispatch::next(Outcome::Removed(self.remove(&RemoveTarget::from(arg.as_str()))))
            }
            Command::Rm(None) => invalid("rm requires an OBSID, back or all"),
            Command::Cycle(arg) => match arg.as_deref().and_then(parse_cycle) {
                Some(cycle) => self.queue_cycle(cycle),
                None => invalid("cycle requires a non-negative integer"),
            },
            Command::Settings => {
                info!("Current settings:\n{}", settings_table(self.settings));
                Dispatch::next(Outcome::SettingsShown)
            }
            Command::ObsId(obsid) => Dispatch::next(Outcome::Queued(self.add(&obsid))),
            Command::Unknown(token) => {
                warn!("Unknown Entry: {token}");
                Dispatch::next(Outcome::UnknownEntry(token))
            }
        }
    }

    /// Blocking prompt loop: read a line, dispatch, repeat until `done` or `exit`.
    ///
    /// End of input is handled as `exit`.
    ///
    /// Arguments
    /// -----------------
    /// * `input`: operator input, one command per line.
    /// * `output`: where the prompt is written.
    ///
    /// Return
    /// ----------
    /// * The terminal [`CommandResult`] (`StopLoop` or `Terminate`).
    pub fn run_interactive<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<CommandResult, XtiPipeError> {
        loop {
            write!(output, "xtipipe > ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(CommandResult::Terminate);
            }
            let dispatch = self.dispatch(&line);
            if dispatch.result != CommandResult::Continue {
                return Ok(dispatch.result);
            }
        }
    }

    fn add(&mut self, obsid: &str) -> AddOutcome {
        let outcome = self.queue.add(obsid, self.catalog);
        match &outcome {
            AddOutcome::Added(_) => info!("{outcome}"),
            _ => warn!("{outcome}"),
        }
        outcome
    }

    fn remove(&mut self, target: &RemoveTarget) -> RemoveOutcome {
        let outcome = self.queue.remove(target);
        match &outcome {
            RemoveOutcome::NothingToRemove => warn!("{outcome}"),
            _ => info!("{outcome}"),
        }
        outcome
    }

    fn queue_cycle(&mut self, cycle: u64) -> Dispatch {
        let catalog = self.catalog;
        let mut added = 0;
        let mut already_queued = 0;
        for record in catalog.cycle(cycle) {
            match self.add(&record.obsid) {
                AddOutcome::Added(_) => added += 1,
                AddOutcome::AlreadyQueued(_) => already_queued += 1,
                AddOutcome::NotFound(_) => {}
            }
        }
        if added + already_queued == 0 {
            warn!("No observations found for cycle {cycle}");
        }
        Dispatch::next(Outcome::CycleQueued {
            cycle,
            added,
            already_queued,
        })
    }
}

fn parse_cycle(arg: &str) -> Option<u64> {
    let value = arg.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as u64)
}

fn invalid(message: &str) -> Dispatch {
    warn!("{message}");
    Dispatch::next(Outcome::InvalidArgument(message.to_string()))
}
