//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// Configuration error - missing or conflicting parameters
pub const CONFIG_ERROR: i32 = 2;

/// Template error - template missing or rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Variable error - invalid vars JSON, shadowed key or empty secret
pub const VARS_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// External command error - gcloud or kubectl failed
pub const COMMAND_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
