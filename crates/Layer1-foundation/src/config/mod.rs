//! Config - 통합 설정 관리
//!
//! - `process.rs` - 프로세스 실행/출력 제한 설정

mod process;

pub use process::{ProcessConfig, DEFAULT_MESSAGE_LIMIT, PROCESS_CONFIG_FILE};
