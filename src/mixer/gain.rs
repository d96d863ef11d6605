//! Mute/solo resolution
//!
//! When any track is soloed, exactly the soloed tracks are audible and mute
//! flags are ignored. Otherwise every unmuted track is audible. An audible
//! track plays at `volume / 100`; everything else is silent.

/// Highest accepted volume.
pub const MAX_VOLUME: u8 = 100;

/// Whether any track in the set is soloed
pub fn any_soloed<I>(soloed: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    soloed.into_iter().any(|s| s)
}

/// Whether a track can be heard given the mix-wide solo state
pub fn is_audible(muted: bool, soloed: bool, any_soloed: bool) -> bool {
    if any_soloed {
        soloed
    } else {
        !muted
    }
}

/// Linear gain a track plays at
pub fn effective_gain(volume: u8, muted: bool, soloed: bool, any_soloed: bool) -> f32 {
    if is_audible(muted, soloed, any_soloed) {
        f32::from(volume.min(MAX_VOLUME)) / 100.0
    } else {
        0.0
    }
}
