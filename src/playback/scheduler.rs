// Scheduler thread - drains commands, ticks the controller, sleeps until the
// next deadline

use crate::messaging::channels::CommandConsumer;
use crate::midi::sink::MidiSink;
use crate::playback::controller::PlaybackController;
use crate::timing::clock::MonotonicClock;
use ringbuf::traits::Consumer;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Run loop owning the controller
///
/// The loop never blocks on anything but its own sleep: commands arrive
/// through a lock-free ring and are applied at the start of each tick.
pub struct Scheduler<S: MidiSink> {
    controller: PlaybackController<S>,
    commands: CommandConsumer,
    clock: MonotonicClock,
    tick: Duration,
}

impl<S: MidiSink> Scheduler<S> {
    pub fn new(controller: PlaybackController<S>, commands: CommandConsumer, tick: Duration) -> Self {
        Self {
            controller,
            commands,
            clock: MonotonicClock::new(),
            tick: tick.max(Duration::from_micros(100)),
        }
    }

    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    pub fn controller(&self) -> &PlaybackController<S> {
        &self.controller
    }

    /// One iteration at `now`; returns false once `Quit` was received
    pub fn run_once(&mut self, now: u64) -> bool {
        while let Some(command) = self.commands.try_pop() {
            tracing::trace!(?command, "command");
            if !self.controller.handle_command(command, now) {
                return false;
            }
        }
        self.controller.tick(now);
        true
    }

    /// When the loop should wake up after a tick at `now`
    fn wake_at(&self, now: u64) -> Instant {
        let period = self.tick.as_micros() as u64;
        let next = self
            .controller
            .next_wakeup()
            .map_or(now + period, |at| at.clamp(now, now + period));
        self.clock.instant_at(next)
    }

    /// Loop until `Quit`; hanging notes are released before returning
    pub fn run(mut self) -> PlaybackController<S> {
        tracing::info!(tick_micros = self.tick.as_micros() as u64, "scheduler started");
        loop {
            let now = self.clock.now_micros();
            if !self.run_once(now) {
                break;
            }
            let wake = self.wake_at(now);
            let remaining = wake.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        self.controller.shutdown();
        tracing::info!("scheduler stopped");
        self.controller
    }
}

impl<S: MidiSink + Send + 'static> Scheduler<S> {
    /// Run on a dedicated thread; joining yields the controller back
    pub fn spawn(self) -> std::io::Result<JoinHandle<PlaybackController<S>>> {
        thread::Builder::new()
            .name("midistation-scheduler".into())
            .spawn(move || self.run())
    }
}
