/// Node identifiers are the string keys of the engine's prompt object.
pub type NodeId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
