// Audio module - contains file detection, tag reading and bit depth probing

pub mod detection;
pub mod metadata;
pub mod probe;

pub use detection::{cue_sidecar_path, is_convertible_audio};
pub use metadata::{AlbumTags, read_album_tags, sanitize_component};
pub use probe::{BitDepth, BitDepthProber};
