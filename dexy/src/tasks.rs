//! A cooperative scheduler for the slow work on the control core, and the
//! tasks the engine itself needs.
//!
//! Tasks run in the order they were added, each at most once per pass of the
//! scheduler.  A task must never block, since that delays every task after it.

use arrayvec::{ArrayVec, CapacityError};
use log::{debug, warn};

use crate::error::{ErrorFlags, ErrorKind};
use crate::sync::LockedMailbox;

/// How often [ReportErrors] runs
pub const REPORT_ERRORS_INTERVAL_US: u64 = 1_000_000;
/// How often [WatchdogTask] runs
pub const WATCHDOG_INTERVAL_US: u64 = 100_000;
/// How late the watchdog task can be before it's flagged as an error
pub const WATCHDOG_TIMEOUT_US: u64 = 200_000;
/// How often [GateNotifier] polls for new notes
pub const GATE_NOTIFIER_INTERVAL_US: u64 = 10_000;

/// A monotonic microsecond time source
pub trait Clock {
    /// Microseconds since some fixed point in the past
    fn now_micros(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }
}

/// A hardware watchdog that resets the chip unless it's fed regularly
pub trait Watchdog {
    /// Restart the countdown
    fn feed(&mut self);
}

/// A periodic job
pub trait Task {
    /// Time between runs
    fn interval_micros(&self) -> u64;
    /// Called once, before the first [Task::execute]
    fn init(&mut self, _now: u64) {}
    /// Do the work
    fn execute(&mut self, now: u64);
}

struct Scheduled<T> {
    task: T,
    deadline: u64,
}

/// Runs up to `N` tasks of type `T`.  `T` is normally an enum with a variant
/// for each kind of task.
pub struct TaskScheduler<T: Task, const N: usize> {
    tasks: ArrayVec<Scheduled<T>, N>,
}

impl<T: Task, const N: usize> Default for TaskScheduler<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task, const N: usize> TaskScheduler<T, N> {
    /// An empty scheduler
    pub const fn new() -> Self {
        Self {
            tasks: ArrayVec::new_const(),
        }
    }
    /// Add a task to the end of the list.  It first runs on the next pass.
    pub fn add(&mut self, task: T) -> Result<(), CapacityError<T>> {
        self.tasks
            .try_push(Scheduled { task, deadline: 0 })
            .map_err(|e| CapacityError::new(e.element().task))
    }
    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
    /// True if no tasks have been added
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
    /// Look at a task
    pub fn task(&self, index: usize) -> Option<&T> {
        self.tasks.get(index).map(|s| &s.task)
    }
    /// Call every task's [Task::init]
    pub fn init_all(&mut self, now: u64) {
        debug!("starting {} tasks", self.tasks.len());
        for scheduled in self.tasks.iter_mut() {
            scheduled.task.init(now);
        }
    }
    /// Run every task that is due at `now`, returning how many ran
    pub fn run_pass(&mut self, now: u64) -> usize {
        let mut ran = 0;
        for scheduled in self.tasks.iter_mut() {
            if now >= scheduled.deadline {
                scheduled.deadline = now + scheduled.task.interval_micros();
                scheduled.task.execute(now);
                ran += 1;
            }
        }
        ran
    }
    /// Initialize the tasks and run them forever
    pub fn run(&mut self, clock: impl Clock) -> ! {
        self.init_all(clock.now_micros());
        loop {
            self.run_pass(clock.now_micros());
        }
    }
}

/// Logs and clears the sticky error flags
pub struct ReportErrors<'a> {
    errors: &'a ErrorFlags,
}

impl<'a> ReportErrors<'a> {
    /// Constructor
    pub fn new(errors: &'a ErrorFlags) -> Self {
        Self { errors }
    }
}

impl Task for ReportErrors<'_> {
    fn interval_micros(&self) -> u64 {
        REPORT_ERRORS_INTERVAL_US
    }
    fn execute(&mut self, _now: u64) {
        if !self.errors.any_set() {
            return;
        }
        for kind in self.errors.iter_set() {
            warn!("error: {}", kind);
            self.errors.clear(kind);
        }
    }
}

/// Feeds the hardware watchdog, and flags [ErrorKind::Watchdog] if the
/// scheduler got so far behind that the feed came late.
pub struct WatchdogTask<'a, W: Watchdog> {
    dog: W,
    errors: &'a ErrorFlags,
    deadline: u64,
}

impl<'a, W: Watchdog> WatchdogTask<'a, W> {
    /// Constructor
    pub fn new(dog: W, errors: &'a ErrorFlags) -> Self {
        Self {
            dog,
            errors,
            deadline: 0,
        }
    }
    /// The watchdog being fed
    pub fn watchdog(&self) -> &W {
        &self.dog
    }
    fn feed(&mut self, now: u64) {
        self.dog.feed();
        self.deadline = now + WATCHDOG_TIMEOUT_US;
    }
}

impl<W: Watchdog> Task for WatchdogTask<'_, W> {
    fn interval_micros(&self) -> u64 {
        WATCHDOG_INTERVAL_US
    }
    fn init(&mut self, now: u64) {
        self.feed(now);
    }
    fn execute(&mut self, now: u64) {
        if now > self.deadline {
            self.errors.set(ErrorKind::Watchdog);
        }
        self.feed(now);
    }
}

/// Picks up the "gate started" notifications from the audio core.  The
/// display hangs off the note count.
pub struct GateNotifier<'a> {
    gate_started: &'a LockedMailbox<()>,
    notes: u32,
}

impl<'a> GateNotifier<'a> {
    /// Constructor
    pub fn new(gate_started: &'a LockedMailbox<()>) -> Self {
        Self {
            gate_started,
            notes: 0,
        }
    }
    /// Notes seen so far.  Several notes between two polls count once.
    pub fn notes(&self) -> u32 {
        self.notes
    }
}

impl Task for GateNotifier<'_> {
    fn interval_micros(&self) -> u64 {
        GATE_NOTIFIER_INTERVAL_US
    }
    fn execute(&mut self, _now: u64) {
        let notes = &mut self.notes;
        self.gate_started.check_run(|()| *notes = notes.wrapping_add(1));
    }
}

/// The tasks the engine needs on the control core, for use with a
/// [TaskScheduler]
pub enum CoreTask<'a, W: Watchdog> {
    /// See [ReportErrors]
    ReportErrors(ReportErrors<'a>),
    /// See [WatchdogTask]
    Watchdog(WatchdogTask<'a, W>),
    /// See [GateNotifier]
    GateNotifier(GateNotifier<'a>),
}

impl<W: Watchdog> Task for CoreTask<'_, W> {
    fn interval_micros(&self) -> u64 {
        match self {
            Self::ReportErrors(t) => t.interval_micros(),
            Self::Watchdog(t) => t.interval_micros(),
            Self::GateNotifier(t) => t.interval_micros(),
        }
    }
    fn init(&mut self, now: u64) {
        match self {
            Self::ReportErrors(t) => t.init(now),
            Self::Watchdog(t) => t.init(now),
            Self::GateNotifier(t) => t.init(now),
        }
    }
    fn execute(&mut self, now: u64) {
        match self {
            Self::ReportErrors(t) => t.execute(now),
            Self::Watchdog(t) => t.execute(now),
            Self::GateNotifier(t) => t.execute(now),
        }
    }
}
