/// Shots are identified by the id assigned upstream by the script parser.
pub type ShotId = String;

/// Shot groups are identified by a random UUID assigned at grouping time.
pub type GroupId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
