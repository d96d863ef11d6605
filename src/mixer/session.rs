//! Mix session
//!
//! Wraps a [`MixEngine`] shared with a repeating tick task. The task exists
//! only while the transport is playing: it is spawned on play and aborted on
//! pause, stop, completion and drop. Every change is published as a
//! [`TransportSnapshot`] on a watch channel.
//!
//! Sessions must be driven from inside a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::engine::{MixEngine, TransportSnapshot};
use super::media::MediaEvent;
use crate::error::Result;

fn lock(engine: &Mutex<MixEngine>) -> MutexGuard<'_, MixEngine> {
    engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MixSession {
    engine: Arc<Mutex<MixEngine>>,
    snapshots: Arc<watch::Sender<TransportSnapshot>>,
    ticker: Option<JoinHandle<()>>,
}

impl MixSession {
    pub fn new(engine: MixEngine) -> Self {
        let (tx, _) = watch::channel(engine.transport_snapshot());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            snapshots: Arc::new(tx),
            ticker: None,
        }
    }

    pub fn play(&mut self) -> bool {
        self.with_engine(MixEngine::play)
    }

    pub fn pause(&mut self) -> bool {
        self.with_engine(MixEngine::pause)
    }

    pub fn stop(&mut self) {
        self.with_engine(MixEngine::stop)
    }

    pub fn seek(&mut self, position: f64) -> f64 {
        self.with_engine(|engine| engine.seek(position))
    }

    pub fn handle_media_event(&mut self, track_id: &str, event: MediaEvent) -> Result<()> {
        self.with_engine(|engine| engine.handle_media_event(track_id, event))
    }

    /// Run `f` against the engine, then publish the transport state and start
    /// or stop the tick task to match it
    pub fn with_engine<R>(&mut self, f: impl FnOnce(&mut MixEngine) -> R) -> R {
        let (result, snapshot, playing) = {
            let mut engine = lock(&self.engine);
            let result = f(&mut engine);
            (result, engine.transport_snapshot(), engine.is_playing())
        };

        self.snapshots.send_replace(snapshot);
        self.reconcile_ticker(playing);
        result
    }

    fn reconcile_ticker(&mut self, playing: bool) {
        if playing {
            if !self.is_ticking() {
                let interval = lock(&self.engine).options().tick_interval;
                self.ticker = Some(tokio::spawn(run_ticker(
                    self.engine.clone(),
                    self.snapshots.clone(),
                    interval,
                )));
                tracing::debug!(?interval, "mix tick task started");
            }
        } else if let Some(handle) = self.ticker.take() {
            handle.abort();
            tracing::debug!("mix tick task stopped");
        }
    }

    /// Whether the tick task is alive
    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportSnapshot> {
        self.snapshots.subscribe()
    }
}

impl Drop for MixSession {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
        lock(&self.engine).teardown();
    }
}

async fn run_ticker(
    engine: Arc<Mutex<MixEngine>>,
    snapshots: Arc<watch::Sender<TransportSnapshot>>,
    interval: Duration,
) {
    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticks.tick().await;

    let mut last = Instant::now();
    loop {
        ticks.tick().await;
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        let (snapshot, playing) = {
            let mut engine = lock(&engine);
            engine.tick(elapsed);
            (engine.transport_snapshot(), engine.is_playing())
        };
        snapshots.send_replace(snapshot);

        if !playing {
            break;
        }
    }
}
