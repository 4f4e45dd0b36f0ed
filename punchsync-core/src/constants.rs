//! Protocol constants

/// Record separator
pub const RECORD_DELIMITER: u8 = b'\n';

/// Field separator within a record
pub const FIELD_DELIMITER: char = ',';

/// Minimum number of fields in a punch record
pub const MIN_FIELDS: usize = 3;

/// Longest partial record kept while waiting for its newline
pub const MAX_LINE_LEN: usize = 4096;

/// Read buffer size per connection
pub const READ_BUFFER_SIZE: usize = 1024;

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5;

/// Default write timeout (seconds)
pub const DEFAULT_WRITE_TIMEOUT: u64 = 5;

/// Default interval between fleet sweeps (seconds)
pub const DEFAULT_SWEEP_INTERVAL: u64 = 300;
