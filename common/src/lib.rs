//! Detection types shared by the `facecam` server, its overlay painter and its HTTP API.
pub mod detection;
