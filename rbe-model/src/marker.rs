//! Named time points attached to sound files

/// A labeled point in time, such as the start of a note's release
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Marker {
    /// Time in seconds
    pub time: f64,
    /// Marker name
    pub name: String,
}

impl Marker {
    pub fn new(time: f64, name: impl Into<String>) -> Self {
        Self {
            time,
            name: name.into(),
        }
    }
}

/// Sort markers by increasing time
pub fn sort_markers_by_time(markers: &mut [Marker]) {
    markers.sort_by(|a, b| a.time.total_cmp(&b.time));
}

/// Sort markers alphabetically by name
pub fn sort_markers_by_name(markers: &mut [Marker]) {
    markers.sort_by(|a, b| a.name.cmp(&b.name));
}
