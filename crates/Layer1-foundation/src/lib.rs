//! # playpen-foundation
//!
//! Foundation layer for playpen:
//! - Error: 공통 에러 타입 (`Error`, `Result`)
//! - Config: 프로세스 실행 설정 (`ProcessConfig`)
//! - Id: 프로세스 ID 발급기 (`IdSource`)

pub mod config;
pub mod error;
pub mod id;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{ProcessConfig, DEFAULT_MESSAGE_LIMIT, PROCESS_CONFIG_FILE};

// ============================================================================
// Identity
// ============================================================================
pub use id::IdSource;
