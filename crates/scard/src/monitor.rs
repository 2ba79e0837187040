//! Background monitoring of reader and card events
//!
//! A [`Monitor`] runs the status-change wait on dedicated threads and turns
//! raw state transitions into [`CardEvent`]s and [`ReaderEvent`]s. Each
//! watcher owns its own session so that [`crate::Context::cancel`] can
//! unblock exactly one wait; shutdown raises a stop flag and keeps
//! cancelling until every watcher has exited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{CardEvent, CardEventSender, EventHandler, ReaderEvent, ReaderEventSender};
use crate::reader::ReaderState;
use crate::transport::Transport;
use crate::types::{Scope, StateFlags, PNP_NOTIFICATION};

/// Watches readers and cards in the background
///
/// Dropping the monitor stops all watcher threads.
#[derive(Debug)]
pub struct Monitor {
    transport: &'static dyn Transport,
    watchers: Vec<Watcher>,
    forwarders: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct Watcher {
    context: Arc<Context>,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Create a monitor over the platform resource manager
    #[cfg(unix)]
    pub fn create() -> Result<Self> {
        Ok(Self::with_transport(
            crate::transport::pcsclite::PcscLite::shared()?,
        ))
    }

    /// Create a monitor over a caller-supplied transport
    pub fn with_transport(transport: &'static dyn Transport) -> Self {
        Self {
            transport,
            watchers: Vec::new(),
            forwarders: Vec::new(),
        }
    }

    /// Start watching for card insertion and removal, delivering events on
    /// `sender`
    ///
    /// The watcher stops when the monitor is stopped or the receiving side
    /// of the channel is dropped.
    pub fn watch_cards(&mut self, sender: CardEventSender) -> Result<()> {
        let context = Arc::new(Context::with_transport(self.transport, Scope::System)?);
        let worker = Arc::clone(&context);
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopping);
        let thread = std::thread::spawn(move || card_loop(&worker, &flag, &sender));
        self.watchers.push(Watcher {
            context,
            stopping,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Start watching for readers appearing and disappearing
    pub fn watch_readers(&mut self, sender: ReaderEventSender) -> Result<()> {
        let context = Arc::new(Context::with_transport(self.transport, Scope::System)?);
        let worker = Arc::clone(&context);
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopping);
        let thread = std::thread::spawn(move || reader_loop(&worker, &flag, &sender));
        self.watchers.push(Watcher {
            context,
            stopping,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Start watching cards, delivering events to a handler closure
    pub fn on_card_events<H>(&mut self, mut handler: H) -> Result<()>
    where
        H: EventHandler<CardEvent> + 'static,
    {
        let (sender, receiver) = crate::event::card_event_channel();
        self.watch_cards(sender)?;
        self.forwarders.push(std::thread::spawn(move || {
            for event in receiver {
                handler.handle(event);
            }
        }));
        Ok(())
    }

    /// Stop all watcher threads and wait for them to exit
    ///
    /// Idempotent; also run on drop.
    pub fn stop(&mut self) {
        for watcher in &self.watchers {
            watcher.stopping.store(true, Ordering::Relaxed);
        }
        for watcher in &mut self.watchers {
            let Some(thread) = watcher.thread.take() else {
                continue;
            };
            // A cancel only lands on a wait already in flight; a watcher
            // still listing readers or processing events would miss a single
            // one. Keep re-issuing until the thread has seen the stop flag
            // or a cancelled wait.
            while !thread.is_finished() {
                if let Err(err) = watcher.context.cancel() {
                    warn!(%err, "failed to cancel watcher session");
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            let _ = thread.join();
        }
        self.watchers.clear();
        // Watcher exit drops the senders, which terminates the forwarders.
        for forwarder in self.forwarders.drain(..) {
            let _ = forwarder.join();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the watch list for the card loop: one descriptor per known reader
/// plus the plug-and-play pseudo-reader, preserving prior observations for
/// readers that survived a list change.
fn rebuild_states(context: &Context, previous: Vec<ReaderState>) -> Result<Vec<ReaderState>> {
    let names = context.list_readers()?;
    let mut previous: Vec<ReaderState> = previous;
    let mut states: Vec<ReaderState> = names
        .into_iter()
        .map(|name| {
            previous
                .iter()
                .position(|s| s.reader == name)
                .map_or_else(|| ReaderState::new(name.clone()), |i| previous.swap_remove(i))
        })
        .collect();
    states.push(
        previous
            .into_iter()
            .find(|s| s.reader == PNP_NOTIFICATION)
            .unwrap_or_else(ReaderState::pnp_notification),
    );
    Ok(states)
}

fn card_loop(context: &Context, stopping: &AtomicBool, sender: &CardEventSender) {
    let mut states = match rebuild_states(context, Vec::new()) {
        Ok(states) => states,
        Err(err) => {
            warn!(%err, "card watcher could not list readers");
            return;
        }
    };

    'outer: loop {
        if stopping.load(Ordering::Relaxed) {
            break;
        }
        match context.get_status_change(&mut states, None) {
            Ok(()) => {}
            Err(Error::Cancelled) => break,
            Err(Error::Timeout) => continue,
            Err(Error::UnknownReader | Error::NoReadersAvailable) => {
                // The reader set changed underneath the wait; rebuild around
                // the surviving descriptors so their observations carry over.
                states = match rebuild_states(context, std::mem::take(&mut states)) {
                    Ok(states) => states,
                    Err(err) => {
                        warn!(%err, "card watcher stopping: could not relist readers");
                        break;
                    }
                };
                continue;
            }
            Err(err) => {
                warn!(%err, "card watcher stopping on wait failure");
                break;
            }
        }

        let mut list_changed = false;
        for state in &mut states {
            if state.reader == PNP_NOTIFICATION {
                list_changed |= state.changed();
                state.sync();
                continue;
            }
            if state.changed() {
                let was_present = state.current_state.contains(StateFlags::PRESENT);
                let now_present = state.event_state.contains(StateFlags::PRESENT);
                let event = if now_present && !was_present {
                    Some(CardEvent::Inserted {
                        reader: state.reader.clone(),
                        atr: state.atr.clone(),
                    })
                } else if was_present && !now_present {
                    Some(CardEvent::Removed {
                        reader: state.reader.clone(),
                    })
                } else {
                    None
                };
                if let Some(event) = event {
                    debug!(?event, "card event");
                    if sender.send(event).is_err() {
                        break 'outer;
                    }
                }
            }
            state.sync();
        }

        if list_changed {
            states = match rebuild_states(context, states) {
                Ok(states) => states,
                Err(err) => {
                    warn!(%err, "card watcher stopping: could not relist readers");
                    break;
                }
            };
        }
    }
}

fn reader_loop(context: &Context, stopping: &AtomicBool, sender: &ReaderEventSender) {
    // No baseline means the initial listing failed; the first successful
    // listing then becomes the baseline without emitting events.
    let mut known: Option<Vec<String>> = match context.list_readers() {
        Ok(names) => Some(names),
        Err(err) => {
            warn!(%err, "reader watcher could not take an initial listing");
            None
        }
    };
    let mut states = vec![ReaderState::pnp_notification()];

    'outer: loop {
        if stopping.load(Ordering::Relaxed) {
            break;
        }
        match context.get_status_change(&mut states, None) {
            Ok(()) => {}
            Err(Error::Cancelled) => break,
            Err(Error::Timeout) => continue,
            Err(err) => {
                warn!(%err, "reader watcher stopping on wait failure");
                break;
            }
        }

        if states[0].changed() || known.is_none() {
            match context.list_readers() {
                Ok(current) => {
                    if let Some(previous) = &known {
                        for name in &current {
                            if !previous.contains(name)
                                && sender.send(ReaderEvent::Added(name.clone())).is_err()
                            {
                                break 'outer;
                            }
                        }
                        for name in previous {
                            if !current.contains(name)
                                && sender.send(ReaderEvent::Removed(name.clone())).is_err()
                            {
                                break 'outer;
                            }
                        }
                    }
                    known = Some(current);
                }
                // A failed listing is transient; keep the previous set and
                // diff again on the next wakeup.
                Err(err) => warn!(%err, "reader watcher could not list readers"),
            }
        }
        states[0].sync();
    }
}
