use serde::Serialize;

/// One phase of a reflow curve, for display purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Preheat,
    Soak,
    Ramp,
    Reflow,
    Cooling,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preheat => "Preheat",
            Phase::Soak => "Soak",
            Phase::Ramp => "Ramp",
            Phase::Reflow => "Reflow",
            Phase::Cooling => "Cooling",
        }
    }
}

/// A (duration, target temperature) pair. Segments are never mutated at
/// run time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReflowSegment {
    pub phase: Phase,
    pub duration_seconds: u16,
    pub target_celsius: f32,
}

/// Immutable ordered sequence of segments describing one heat curve. The
/// engine borrows a profile for the lifetime of a run; the same instance
/// may be reused across runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReflowProfile {
    pub name: &'static str,
    pub segments: &'static [ReflowSegment],
}

impl ReflowProfile {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, index: usize) -> &ReflowSegment {
        &self.segments[index]
    }

    /// Sum of all segment durations in seconds.
    pub fn total_duration(&self) -> u32 {
        self.segments
            .iter()
            .map(|s| s.duration_seconds as u32)
            .sum()
    }

    /// Cumulative elapsed seconds at which segment `index` ends. Segment
    /// boundaries are strict: the engine leaves segment `i` exactly when
    /// elapsed seconds reaches this value.
    pub(crate) fn segment_end(&self, index: usize) -> u32 {
        self.segments[..=index]
            .iter()
            .map(|s| s.duration_seconds as u32)
            .sum()
    }
}

/// Sn63/Pb37 curve, 225 °C peak.
pub static LEADED: ReflowProfile = ReflowProfile {
    name: "Leaded (Sn63/Pb37)",
    segments: &[
        ReflowSegment {
            phase: Phase::Preheat,
            duration_seconds: 90,
            target_celsius: 150.0,
        },
        ReflowSegment {
            phase: Phase::Soak,
            duration_seconds: 90,
            target_celsius: 165.0,
        },
        ReflowSegment {
            phase: Phase::Ramp,
            duration_seconds: 45,
            target_celsius: 225.0,
        },
        ReflowSegment {
            phase: Phase::Reflow,
            duration_seconds: 15,
            target_celsius: 225.0,
        },
        ReflowSegment {
            phase: Phase::Cooling,
            duration_seconds: 60,
            target_celsius: 100.0,
        },
    ],
};

/// SAC305 curve, 245 °C peak.
pub static LEAD_FREE: ReflowProfile = ReflowProfile {
    name: "Lead-free (SAC305)",
    segments: &[
        ReflowSegment {
            phase: Phase::Preheat,
            duration_seconds: 90,
            target_celsius: 150.0,
        },
        ReflowSegment {
            phase: Phase::Soak,
            duration_seconds: 120,
            target_celsius: 180.0,
        },
        ReflowSegment {
            phase: Phase::Ramp,
            duration_seconds: 45,
            target_celsius: 245.0,
        },
        ReflowSegment {
            phase: Phase::Reflow,
            duration_seconds: 15,
            target_celsius: 245.0,
        },
        ReflowSegment {
            phase: Phase::Cooling,
            duration_seconds: 60,
            target_celsius: 100.0,
        },
    ],
};
