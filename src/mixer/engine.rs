//! Multi-track mix engine
//!
//! Owns the tracks of one mix and keeps them on a single transport. The
//! playhead follows the reference track (the first healthy track with media)
//! or, when no track has usable media, a simulated clock that advances with
//! wall time up to a nominal duration.

use std::time::Duration;

use serde::Serialize;

use super::gain::{any_soloed, effective_gain, MAX_VOLUME};
use super::media::{MediaEvent, MediaFactory};
use super::settings::{MixSettings, TrackMix};
use super::track::{StemSource, StemTrack, TrackAvailability, TrackView};
use super::transport::{TransportManager, TransportState};
use super::MixOptions;
use crate::error::{Result, StemError};

/// Where the playhead comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClockKind {
    /// Read from this track's media on every tick
    Reference { track_id: String },
    /// Advanced by wall time
    Simulated,
}

/// Transport state published to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportSnapshot {
    pub state: TransportState,
    pub current_time: f64,
    pub duration: f64,
    pub clock: ClockKind,
}

pub struct MixEngine {
    tracks: Vec<StemTrack>,
    transport: TransportManager,
    /// Index of the reference track; `None` runs the simulated clock
    reference: Option<usize>,
    options: MixOptions,
    factory: Option<Box<dyn MediaFactory>>,
}

impl MixEngine {
    /// Build an engine over `stems`, creating media for every stem with a URL.
    ///
    /// Without a factory, stems with URLs are marked unavailable and the mix
    /// runs on the simulated clock.
    pub fn new<I, S>(stems: I, factory: Option<Box<dyn MediaFactory>>, options: MixOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StemSource>,
    {
        let mut engine = Self {
            tracks: Vec::new(),
            transport: TransportManager::new(),
            reference: None,
            options,
            factory,
        };
        engine.build_tracks(stems.into_iter().map(Into::into));
        engine
    }

    /// Engine of placeholder tracks on the simulated clock
    pub fn simulated<I, S>(ids: I, options: MixOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ids.into_iter().map(|id| StemSource::placeholder(id)),
            None,
            options,
        )
    }

    /// Replace the stem set. Media of the previous set is released and the
    /// transport returns to a stopped state.
    pub fn set_stems<I, S>(&mut self, stems: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<StemSource>,
    {
        self.teardown();
        self.transport = TransportManager::new();
        self.build_tracks(stems.into_iter().map(Into::into));
    }

    fn build_tracks(&mut self, stems: impl Iterator<Item = StemSource>) {
        let volume = self.options.default_volume.min(MAX_VOLUME);

        for source in stems {
            if self.tracks.iter().any(|t| t.id == source.id) {
                tracing::warn!(track = %source.id, "duplicate stem id skipped");
                continue;
            }

            let mut track = StemTrack::new(source, volume);
            if let Some(url) = track.source_url.clone() {
                match self.factory.as_mut() {
                    Some(factory) => {
                        let mut media = factory.create(&track.id);
                        media.load(&url);
                        track.media = Some(media);
                    }
                    None => {
                        track.availability = TrackAvailability::Unavailable {
                            reason: "no media factory configured".to_string(),
                        };
                    }
                }
            }
            self.tracks.push(track);
        }

        self.apply_mix();
        self.elect_reference();
        self.refresh_duration();

        tracing::info!(
            tracks = self.tracks.len(),
            simulated = self.reference.is_none(),
            "mix initialized"
        );
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start every ready track together.
    ///
    /// Playback that had completed restarts from zero. Returns false when
    /// already playing or when there are no tracks.
    pub fn play(&mut self) -> bool {
        if self.tracks.is_empty() || self.transport.is_playing() {
            return false;
        }

        if self.transport.at_end() {
            self.seek_all(0.0);
        }

        self.transport.play();
        for track in &mut self.tracks {
            if let Some(media) = track.ready_media() {
                media.play();
            }
        }
        true
    }

    /// Stop every track together, leaving them aligned on the playhead
    pub fn pause(&mut self) -> bool {
        if !self.transport.is_playing() {
            return false;
        }

        self.sync_from_reference();
        self.transport.pause();

        let position = self.transport.position();
        for track in &mut self.tracks {
            if let Some(media) = track.ready_media() {
                media.pause();
                media.seek(position);
            }
        }
        true
    }

    /// Pause and return to the start
    pub fn stop(&mut self) {
        self.transport.stop();
        for track in &mut self.tracks {
            if let Some(media) = track.ready_media() {
                media.pause();
                media.seek(0.0);
            }
        }
    }

    /// Move every track to `position` before playback resumes.
    ///
    /// Returns the position applied after clamping to the mix duration.
    pub fn seek(&mut self, position: f64) -> f64 {
        let was_playing = self.transport.is_playing();

        if was_playing {
            for track in &mut self.tracks {
                if let Some(media) = track.ready_media() {
                    media.pause();
                }
            }
        }

        let applied = self.seek_all(position);

        if was_playing {
            for track in &mut self.tracks {
                if let Some(media) = track.ready_media() {
                    media.play();
                }
            }
        }
        applied
    }

    fn seek_all(&mut self, position: f64) -> f64 {
        let applied = self.transport.seek(position);
        for track in &mut self.tracks {
            if let Some(media) = track.ready_media() {
                media.seek(applied);
            }
        }
        applied
    }

    /// Advance the shared clock by one scheduling tick.
    ///
    /// Returns true when this tick completed playback.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        if !self.transport.is_playing() {
            return false;
        }

        match self.reference {
            Some(index) => {
                let track = &self.tracks[index];
                let Some(media) = track.media.as_ref().filter(|_| track.is_ready()) else {
                    // reference still loading; hold the playhead
                    return false;
                };

                let position = media.position();
                let reference_end = track.duration.is_some_and(|d| position >= d);
                self.transport.sync_position(position);

                if reference_end || self.transport.at_end() {
                    self.complete();
                    return true;
                }
                false
            }
            None => {
                if self.transport.advance(elapsed.as_secs_f64()) {
                    self.complete();
                    return true;
                }
                false
            }
        }
    }

    /// Stop playback and reset every track to zero
    fn complete(&mut self) {
        tracing::info!(duration = self.transport.duration(), "playback completed");
        self.transport.stop();
        for track in &mut self.tracks {
            if let Some(media) = track.ready_media() {
                media.pause();
                media.seek(0.0);
            }
        }
    }

    fn sync_from_reference(&mut self) {
        if let Some(index) = self.reference {
            let track = &self.tracks[index];
            if let Some(media) = track.media.as_ref().filter(|_| track.is_ready()) {
                let position = media.position();
                self.transport.sync_position(position);
            }
        }
    }

    // ========================================================================
    // Media events
    // ========================================================================

    /// Apply a readiness, end-of-media or failure report for one track
    pub fn handle_media_event(&mut self, track_id: &str, event: MediaEvent) -> Result<()> {
        let index = self.index_of(track_id)?;

        match event {
            MediaEvent::Ready { duration } => self.on_ready(index, duration),
            MediaEvent::Ended => {
                if self.reference == Some(index) && self.transport.is_playing() {
                    self.complete();
                }
            }
            MediaEvent::Failed { reason } => self.on_failed(index, reason),
        }
        Ok(())
    }

    fn on_ready(&mut self, index: usize, duration: f64) {
        let position = self.transport.position();
        let playing = self.transport.is_playing();
        let any = any_soloed(self.tracks.iter().map(|t| t.soloed));

        let track = &mut self.tracks[index];
        if track.media.is_none() {
            tracing::debug!(track = %track.id, "ready event for track without media ignored");
            return;
        }

        track.availability = TrackAvailability::Ready;
        track.duration = (duration.is_finite() && duration > 0.0).then_some(duration);

        let gain = effective_gain(track.volume, track.muted, track.soloed, any);
        if let Some(media) = track.media.as_mut() {
            media.set_gain(gain);
            media.seek(position);
            if playing {
                media.play();
            }
        }
        tracing::debug!(track = %track.id, duration, "track ready");

        self.elect_reference();
        self.refresh_duration();
    }

    fn on_failed(&mut self, index: usize, reason: String) {
        let was_reference = self.reference == Some(index);
        let position = self.transport.position();

        let track = &mut self.tracks[index];
        tracing::warn!(track = %track.id, %reason, "track unavailable");
        track.mark_unavailable(reason);

        if was_reference {
            self.elect_reference();
            match self.reference {
                Some(next) => {
                    tracing::info!(track = %self.tracks[next].id, "reference track changed");
                    if let Some(media) = self.tracks[next].ready_media() {
                        media.seek(position);
                    }
                }
                None => tracing::info!(position, "simulated clock takes over"),
            }
        }

        self.refresh_duration();
        self.transport.sync_position(position);
    }

    /// Keep a ready reference; otherwise prefer the first ready track, then
    /// the first track still loading.
    fn elect_reference(&mut self) {
        if let Some(index) = self.reference {
            if self.tracks.get(index).is_some_and(StemTrack::is_ready) {
                return;
            }
        }

        self.reference = self
            .tracks
            .iter()
            .position(StemTrack::is_ready)
            .or_else(|| self.tracks.iter().position(StemTrack::is_healthy_media));
    }

    fn refresh_duration(&mut self) {
        let known = self
            .tracks
            .iter()
            .filter(|t| t.is_ready())
            .filter_map(|t| t.duration)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

        let duration = match (known, self.reference) {
            (Some(d), _) => d,
            (None, None) if self.transport.duration() > 0.0 => self.transport.duration(),
            (None, None) => self.options.nominal_duration,
            (None, Some(_)) => 0.0,
        };
        self.transport.set_duration(duration);
    }

    // ========================================================================
    // Mix controls
    // ========================================================================

    /// Set a track's volume (clamped to 100)
    pub fn set_volume(&mut self, track_id: &str, volume: u8) -> Result<()> {
        let index = self.index_of(track_id)?;
        self.tracks[index].volume = volume.min(MAX_VOLUME);
        self.apply_mix();
        Ok(())
    }

    /// Flip a track's mute flag, returning the new value
    pub fn toggle_mute(&mut self, track_id: &str) -> Result<bool> {
        let index = self.index_of(track_id)?;
        let track = &mut self.tracks[index];
        track.muted = !track.muted;
        let muted = track.muted;
        self.apply_mix();
        Ok(muted)
    }

    /// Flip a track's solo flag, returning the new value
    pub fn toggle_solo(&mut self, track_id: &str) -> Result<bool> {
        let index = self.index_of(track_id)?;
        let track = &mut self.tracks[index];
        track.soloed = !track.soloed;
        let soloed = track.soloed;
        self.apply_mix();
        Ok(soloed)
    }

    /// Recompute every track's gain and push it to the media
    fn apply_mix(&mut self) {
        let any = any_soloed(self.tracks.iter().map(|t| t.soloed));
        for track in &mut self.tracks {
            let gain = effective_gain(track.volume, track.muted, track.soloed, any);
            if let Some(media) = track.media.as_mut() {
                media.set_gain(gain);
            }
        }
    }

    /// Current volume/mute/solo configuration in track order
    pub fn mix_settings(&self) -> MixSettings {
        MixSettings {
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackMix {
                    id: t.id.clone(),
                    volume: t.volume,
                    muted: t.muted,
                    soloed: t.soloed,
                })
                .collect(),
        }
    }

    /// Restore persisted settings. Unknown ids are ignored; returns how many
    /// tracks were updated.
    pub fn apply_mix_settings(&mut self, settings: &MixSettings) -> usize {
        let mut applied = 0;
        for saved in &settings.tracks {
            let Some(track) = self.tracks.iter_mut().find(|t| t.id == saved.id) else {
                tracing::debug!(track = %saved.id, "saved mix entry has no track");
                continue;
            };
            track.volume = saved.volume.min(MAX_VOLUME);
            track.muted = saved.muted;
            track.soloed = saved.soloed;
            applied += 1;
        }
        self.apply_mix();
        applied
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn index_of(&self, track_id: &str) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or_else(|| StemError::UnknownTrack {
                id: track_id.to_string(),
            })
    }

    pub fn track(&self, track_id: &str) -> Option<&StemTrack> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Gain a track currently plays at
    pub fn effective_gain(&self, track_id: &str) -> Result<f32> {
        let index = self.index_of(track_id)?;
        let any = any_soloed(self.tracks.iter().map(|t| t.soloed));
        let track = &self.tracks[index];
        Ok(effective_gain(track.volume, track.muted, track.soloed, any))
    }

    /// Position of one track: its media position when ready, otherwise the
    /// shared playhead
    pub fn track_position(&self, track_id: &str) -> Result<f64> {
        let index = self.index_of(track_id)?;
        Ok(self.position_of(&self.tracks[index]))
    }

    fn position_of(&self, track: &StemTrack) -> f64 {
        match track.media.as_ref() {
            Some(media) if track.is_ready() => media.position(),
            _ => self.transport.position(),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.transport.position()
    }

    pub fn duration(&self) -> f64 {
        self.transport.duration()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn is_simulated(&self) -> bool {
        self.reference.is_none()
    }

    pub fn reference_track(&self) -> Option<&str> {
        self.reference.map(|i| self.tracks[i].id.as_str())
    }

    pub fn options(&self) -> &MixOptions {
        &self.options
    }

    pub fn tracks(&self) -> Vec<TrackView> {
        let any = any_soloed(self.tracks.iter().map(|t| t.soloed));
        self.tracks
            .iter()
            .map(|t| TrackView {
                id: t.id.clone(),
                label: t.label.clone(),
                volume: t.volume,
                muted: t.muted,
                soloed: t.soloed,
                gain: effective_gain(t.volume, t.muted, t.soloed, any),
                availability: t.availability.clone(),
                position: self.position_of(t),
            })
            .collect()
    }

    pub fn transport_snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            state: self.transport.state(),
            current_time: self.transport.position(),
            duration: self.transport.duration(),
            clock: match self.reference {
                Some(index) => ClockKind::Reference {
                    track_id: self.tracks[index].id.clone(),
                },
                None => ClockKind::Simulated,
            },
        }
    }

    /// Release all media and drop the tracks
    pub fn teardown(&mut self) {
        self.transport.stop();
        for track in &mut self.tracks {
            track.release();
        }
        self.tracks.clear();
        self.reference = None;
    }
}

impl Drop for MixEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
